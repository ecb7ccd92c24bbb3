//! Signature reattachment.
//!
//! The device hands back a recoverable signature over
//! [`UnsignedTransaction::signing_hash`]. Before anything is broadcast the
//! signature is checked to recover to the wallet's own address.

use std::fmt;

use alloy::hex;
use alloy::primitives::{Address, B256, Bytes, U256, keccak256};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::UnsignedTransaction;
use crate::error::{Result, WalletError};

/// Length of an `r || s || v` signature.
pub const SIGNATURE_LEN: usize = 65;

/// A recoverable secp256k1 signature produced outside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    r: U256,
    s: U256,
    recovery_id: u8,
}

impl Signature {
    /// Create a signature from its scalars and a recovery id of 0 or 1.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidSignature`] for any other recovery id or
    /// a zero scalar.
    pub fn new(r: U256, s: U256, recovery_id: u8) -> Result<Self> {
        if recovery_id > 1 {
            return Err(WalletError::InvalidSignature(format!(
                "recovery id must be 0 or 1, got {recovery_id}"
            )));
        }
        if r.is_zero() || s.is_zero() {
            return Err(WalletError::InvalidSignature("zero scalar".into()));
        }
        Ok(Self { r, s, recovery_id })
    }

    /// Parse the 65-byte `r || s || v` form; `v` may be 0, 1, 27 or 28.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidSignature`] for a wrong length or `v`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SIGNATURE_LEN {
            return Err(WalletError::InvalidSignature(format!(
                "expected {SIGNATURE_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let recovery_id = match bytes[64] {
            v @ (0 | 1) => v,
            v @ (27 | 28) => v - 27,
            v => {
                return Err(WalletError::InvalidSignature(format!("unsupported v value {v}")));
            }
        };
        Self::new(
            U256::from_be_slice(&bytes[..32]),
            U256::from_be_slice(&bytes[32..64]),
            recovery_id,
        )
    }

    /// Parse a base64-encoded [`from_bytes`](Self::from_bytes) form.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidSignature`] for bad base64 or bytes.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| WalletError::InvalidSignature(format!("base64: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Parse a hex-encoded (optionally `0x`-prefixed) [`from_bytes`](Self::from_bytes) form.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidSignature`] for bad hex or bytes.
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| WalletError::InvalidSignature(format!("hex: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// The `r` scalar.
    #[must_use]
    pub const fn r(&self) -> U256 {
        self.r
    }

    /// The `s` scalar.
    #[must_use]
    pub const fn s(&self) -> U256 {
        self.s
    }

    /// The recovery id (y parity), 0 or 1.
    #[must_use]
    pub const fn recovery_id(&self) -> u8 {
        self.recovery_id
    }

    /// The `r || s || recovery_id` form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        let mut out = [0u8; SIGNATURE_LEN];
        out[..32].copy_from_slice(&self.r.to_be_bytes::<32>());
        out[32..64].copy_from_slice(&self.s.to_be_bytes::<32>());
        out[64] = self.recovery_id;
        out
    }

    /// Recover the signing address for `hash`.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidSignature`] if no public key recovers.
    pub fn recover_address(&self, hash: &B256) -> Result<Address> {
        alloy::primitives::Signature::new(self.r, self.s, self.recovery_id == 1)
            .recover_address_from_prehash(hash)
            .map_err(|e| WalletError::InvalidSignature(e.to_string()))
    }
}

/// A signed transaction in its network encoding.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    unsigned: UnsignedTransaction,
    signature: Signature,
    raw: Bytes,
    hash: B256,
}

impl fmt::Debug for SignedTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedTransaction")
            .field("hash", &self.hash)
            .field("nonce", &self.unsigned.nonce)
            .field("kind", &self.unsigned.kind())
            .field("raw_len", &self.raw.len())
            .finish_non_exhaustive()
    }
}

impl SignedTransaction {
    /// The transaction that was signed.
    #[must_use]
    pub const fn unsigned(&self) -> &UnsignedTransaction {
        &self.unsigned
    }

    /// The attached signature.
    #[must_use]
    pub const fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Broadcast-ready bytes.
    #[must_use]
    pub const fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// `0x`-prefixed hex of [`raw`](Self::raw), as `eth_sendRawTransaction` takes it.
    #[must_use]
    pub fn raw_hex(&self) -> String {
        hex::encode_prefixed(&self.raw)
    }

    /// Network transaction hash: Keccak-256 of the raw bytes.
    #[must_use]
    pub const fn hash(&self) -> B256 {
        self.hash
    }
}

/// Verifies device signatures against the wallet's address and produces
/// the signed encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureReattacher {
    expected: Address,
}

impl SignatureReattacher {
    /// Create a reattacher for signatures from `expected`.
    #[must_use]
    pub const fn new(expected: Address) -> Self {
        Self { expected }
    }

    /// Attach `signature` to `unsigned`.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidSignature`] if nothing recovers and
    /// [`WalletError::SignatureAddressMismatch`] if the signer is not the
    /// expected address.
    pub fn attach(&self, unsigned: UnsignedTransaction, signature: Signature) -> Result<SignedTransaction> {
        let signing_hash = unsigned.signing_hash();
        let recovered = signature.recover_address(&signing_hash)?;
        if recovered != self.expected {
            return Err(WalletError::SignatureAddressMismatch {
                expected: self.expected,
                recovered,
            });
        }

        let raw = Bytes::from(unsigned.encode_signed(signature.recovery_id, signature.r, signature.s));
        let hash = keccak256(&raw);
        debug!(tx_hash = %hash, nonce = unsigned.nonce, kind = ?unsigned.kind(), "signature reattached");

        Ok(SignedTransaction {
            unsigned,
            signature,
            raw,
            hash,
        })
    }
}
