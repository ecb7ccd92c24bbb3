//! Canonical unsigned transactions.
//!
//! The signing form of a transaction is a pure function of its fields:
//!
//! ```text
//! legacy:     rlp([nonce, gas_price, gas_limit, to, value, data, chain_id, 0, 0])
//! fee market: 0x02 || rlp([chain_id, nonce, max_priority_fee, max_fee,
//!                          gas_limit, to, value, data, []])
//! ```
//!
//! Its Keccak-256 digest is what the external signer signs.

use alloy::primitives::{Address, B256, Bytes, U256, keccak256};
use alloy::rlp::{Decodable, EMPTY_LIST_CODE, EMPTY_STRING_CODE, Encodable, Header};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WalletError};
use crate::fees::{FeeKind, FeeSpec};

/// EIP-2718 type byte of an EIP-1559 transaction.
pub const FEE_MARKET_TX_TYPE: u8 = 0x02;

/// A transaction ready to be hashed and signed externally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    /// Sender's transaction counter.
    pub nonce: u64,
    /// Recipient; `None` deploys a contract.
    pub to: Option<Address>,
    /// Native value in wei.
    pub value: U256,
    /// Call data.
    pub data: Bytes,
    /// Gas limit.
    pub gas_limit: u64,
    /// Replay-protection chain ID.
    pub chain_id: u64,
    /// Fee fields, which also select the envelope.
    pub fee: FeeSpec,
}

impl UnsignedTransaction {
    /// The envelope of this transaction.
    #[must_use]
    pub const fn kind(&self) -> FeeKind {
        self.fee.kind()
    }

    /// Canonical signing encoding.
    #[must_use]
    pub fn serialize(&self) -> Bytes {
        let encoded = match self.fee {
            FeeSpec::Legacy { .. } => rlp_list(|out| {
                self.encode_fields(out);
                self.chain_id.encode(out);
                0u8.encode(out);
                0u8.encode(out);
            }),
            FeeSpec::FeeMarket { .. } => typed(rlp_list(|out| self.encode_fields(out))),
        };
        encoded.into()
    }

    /// Keccak-256 of [`serialize`](Self::serialize): the digest to sign.
    #[must_use]
    pub fn signing_hash(&self) -> B256 {
        keccak256(self.serialize())
    }

    /// Network encoding with a signature in place of the replay-protection
    /// suffix (legacy) or appended to the field list (fee market).
    pub(crate) fn encode_signed(&self, recovery_id: u8, r: U256, s: U256) -> Vec<u8> {
        match self.fee {
            FeeSpec::Legacy { .. } => rlp_list(|out| {
                self.encode_fields(out);
                eip155_v(self.chain_id, recovery_id).encode(out);
                r.encode(out);
                s.encode(out);
            }),
            FeeSpec::FeeMarket { .. } => typed(rlp_list(|out| {
                self.encode_fields(out);
                recovery_id.encode(out);
                r.encode(out);
                s.encode(out);
            })),
        }
    }

    /// Every field shared by the signing and signed forms, in wire order.
    fn encode_fields(&self, out: &mut Vec<u8>) {
        match self.fee {
            FeeSpec::Legacy { gas_price } => {
                self.nonce.encode(out);
                gas_price.encode(out);
                self.gas_limit.encode(out);
                encode_to(self.to, out);
                self.value.encode(out);
                self.data.encode(out);
            }
            FeeSpec::FeeMarket {
                max_priority_fee,
                max_fee,
            } => {
                self.chain_id.encode(out);
                self.nonce.encode(out);
                max_priority_fee.encode(out);
                max_fee.encode(out);
                self.gas_limit.encode(out);
                encode_to(self.to, out);
                self.value.encode(out);
                self.data.encode(out);
                out.push(EMPTY_LIST_CODE);
            }
        }
    }

    /// Parse a signing encoding produced by [`serialize`](Self::serialize).
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::Decode`] for an unknown envelope, a non-canonical
    /// or truncated list, a non-empty access list, a legacy encoding without
    /// the `chain_id, 0, 0` suffix, or trailing bytes.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        match raw.first() {
            Some(&FEE_MARKET_TX_TYPE) => Self::decode_fee_market(&raw[1..]),
            Some(&b) if b >= EMPTY_LIST_CODE => Self::decode_legacy(raw),
            Some(&b) => Err(WalletError::decode(format!("unsupported transaction type 0x{b:02x}"))),
            None => Err(WalletError::decode("empty transaction")),
        }
    }

    fn decode_legacy(raw: &[u8]) -> Result<Self> {
        let mut fields = list_payload(raw)?;
        let buf = &mut fields;

        let nonce = u64::decode(buf)?;
        let gas_price = U256::decode(buf)?;
        let gas_limit = u64::decode(buf)?;
        let to = decode_to(buf)?;
        let value = U256::decode(buf)?;
        let data = Bytes::decode(buf)?;
        let chain_id = u64::decode(buf)?;
        if u8::decode(buf)? != 0 || u8::decode(buf)? != 0 {
            return Err(WalletError::decode("legacy signing suffix must be chain_id, 0, 0"));
        }
        ensure_consumed(buf)?;

        Ok(Self {
            nonce,
            to,
            value,
            data,
            gas_limit,
            chain_id,
            fee: FeeSpec::Legacy { gas_price },
        })
    }

    fn decode_fee_market(raw: &[u8]) -> Result<Self> {
        let mut fields = list_payload(raw)?;
        let buf = &mut fields;

        let chain_id = u64::decode(buf)?;
        let nonce = u64::decode(buf)?;
        let max_priority_fee = U256::decode(buf)?;
        let max_fee = U256::decode(buf)?;
        let gas_limit = u64::decode(buf)?;
        let to = decode_to(buf)?;
        let value = U256::decode(buf)?;
        let data = Bytes::decode(buf)?;
        let access_list = Header::decode(buf)?;
        if !access_list.list || access_list.payload_length != 0 {
            return Err(WalletError::decode("access list must be empty"));
        }
        ensure_consumed(buf)?;

        Ok(Self {
            nonce,
            to,
            value,
            data,
            gas_limit,
            chain_id,
            fee: FeeSpec::FeeMarket {
                max_priority_fee,
                max_fee,
            },
        })
    }
}

/// EIP-155 `v`. Computed in 256 bits so no chain ID can overflow it.
fn eip155_v(chain_id: u64, recovery_id: u8) -> U256 {
    U256::from(chain_id) * U256::from(2) + U256::from(35) + U256::from(recovery_id)
}

fn encode_to(to: Option<Address>, out: &mut Vec<u8>) {
    match to {
        Some(address) => address.encode(out),
        None => out.push(EMPTY_STRING_CODE),
    }
}

fn decode_to(buf: &mut &[u8]) -> Result<Option<Address>> {
    if buf.first() == Some(&EMPTY_STRING_CODE) {
        *buf = &buf[1..];
        return Ok(None);
    }
    Ok(Some(Address::decode(buf)?))
}

fn rlp_list(encode_payload: impl FnOnce(&mut Vec<u8>)) -> Vec<u8> {
    let mut payload = Vec::new();
    encode_payload(&mut payload);

    let header = Header {
        list: true,
        payload_length: payload.len(),
    };
    let mut out = Vec::with_capacity(header.length() + payload.len());
    header.encode(&mut out);
    out.extend_from_slice(&payload);
    out
}

fn typed(list: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(list.len() + 1);
    out.push(FEE_MARKET_TX_TYPE);
    out.extend_from_slice(&list);
    out
}

/// The payload of the single RLP list making up all of `raw`.
fn list_payload(raw: &[u8]) -> Result<&[u8]> {
    let mut buf = raw;
    let header = Header::decode(&mut buf)?;
    if !header.list {
        return Err(WalletError::decode("expected an RLP list"));
    }
    if buf.len() != header.payload_length {
        return Err(WalletError::decode(format!(
            "list declares {} payload bytes, found {}",
            header.payload_length,
            buf.len()
        )));
    }
    Ok(buf)
}

fn ensure_consumed(buf: &[u8]) -> Result<()> {
    if buf.is_empty() {
        Ok(())
    } else {
        Err(WalletError::decode(format!("{} unexpected trailing bytes", buf.len())))
    }
}
