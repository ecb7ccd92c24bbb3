//! Hardware-signer transport format.
//!
//! The device receives the unsigned encoding together with a compact
//! payload telling it what to sign and with which key:
//!
//! ```text
//! payload   = signing_hash (32 bytes) || each path index as u16 little-endian
//! transport = hex(unsigned encoding) ":&" base64(payload)
//! frame     = "(" index "/" total ")" chunk      ; index from 0
//! ```
//!
//! A transport string too long for one QR code is shown as a sequence of
//! frames, each carrying its position.

use std::fmt;

use alloy::hex;
use alloy::primitives::B256;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use super::UnsignedTransaction;
use crate::error::{Result, WalletError};

/// Separator between the two halves of a transport string.
pub const TRANSPORT_SEPARATOR: &str = ":&";

/// Digest plus derivation indices, as the device expects them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningPayload {
    hash: B256,
    path: Vec<u16>,
}

impl SigningPayload {
    /// Create a payload for `hash` signed with the key at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::UnsupportedDerivation`] if an index does not
    /// fit the device's 16-bit encoding.
    pub fn new(hash: B256, path: &[u32]) -> Result<Self> {
        let path = path
            .iter()
            .map(|index| {
                u16::try_from(*index).map_err(|_| {
                    WalletError::UnsupportedDerivation(format!(
                        "index {index} exceeds the signer's 16-bit path encoding"
                    ))
                })
            })
            .collect::<Result<_>>()?;
        Ok(Self { hash, path })
    }

    /// The digest the device must sign.
    #[must_use]
    pub const fn hash(&self) -> B256 {
        self.hash
    }

    /// The derivation indices.
    #[must_use]
    pub fn path(&self) -> &[u16] {
        &self.path
    }

    /// Binary payload.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + 2 * self.path.len());
        out.extend_from_slice(self.hash.as_slice());
        for index in &self.path {
            out.extend_from_slice(&index.to_le_bytes());
        }
        out
    }

    /// Parse a binary payload.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::Decode`] if it is shorter than a hash or the
    /// path part has an odd length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 32 || (bytes.len() - 32) % 2 != 0 {
            return Err(WalletError::decode(format!(
                "signing payload of {} bytes is not hash || u16 indices",
                bytes.len()
            )));
        }
        let (hash, path) = bytes.split_at(32);
        Ok(Self {
            hash: B256::from_slice(hash),
            path: path
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect(),
        })
    }
}

/// An unsigned transaction packaged for the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningRequest {
    /// The transaction to sign.
    pub unsigned: UnsignedTransaction,
    /// What the device signs, and with which key.
    pub payload: SigningPayload,
}

impl SigningRequest {
    /// Package `unsigned` for signing with the key at `path`.
    ///
    /// # Errors
    ///
    /// See [`SigningPayload::new`].
    pub fn new(unsigned: UnsignedTransaction, path: &[u32]) -> Result<Self> {
        let payload = SigningPayload::new(unsigned.signing_hash(), path)?;
        Ok(Self { unsigned, payload })
    }

    /// `hex(unsigned) ":&" base64(payload)`.
    #[must_use]
    pub fn to_transport_string(&self) -> String {
        format!(
            "{}{TRANSPORT_SEPARATOR}{}",
            hex::encode(self.unsigned.serialize()),
            BASE64.encode(self.payload.to_bytes())
        )
    }

    /// Parse a transport string and check that the payload hash matches the
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidInput`] for bad framing or encodings and
    /// [`WalletError::Decode`] for an undecodable transaction or a payload
    /// whose hash does not belong to it.
    pub fn parse(transport: &str) -> Result<Self> {
        let (tx_hex, payload_b64) = transport
            .trim()
            .split_once(TRANSPORT_SEPARATOR)
            .ok_or_else(|| WalletError::invalid_input("missing ':&' separator"))?;

        let unsigned = UnsignedTransaction::decode(&hex::decode(tx_hex)?)?;
        let payload = SigningPayload::from_bytes(&BASE64.decode(payload_b64)?)?;
        if payload.hash != unsigned.signing_hash() {
            return Err(WalletError::decode("payload hash does not match the transaction"));
        }
        Ok(Self { unsigned, payload })
    }

    /// Split the transport string into labelled frames of at most
    /// `chunk_size` characters each.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidInput`] for a zero `chunk_size`.
    pub fn to_frames(&self, chunk_size: usize) -> Result<Vec<String>> {
        label_frames(&self.to_transport_string(), chunk_size)
    }
}

/// Split `text` into `(index/total)chunk` frames of at most `chunk_size`
/// characters.
///
/// # Errors
///
/// Returns [`WalletError::InvalidInput`] for a zero `chunk_size`.
pub fn label_frames(text: &str, chunk_size: usize) -> Result<Vec<String>> {
    if chunk_size == 0 {
        return Err(WalletError::invalid_input("frame chunk size must be positive"));
    }
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len().div_ceil(chunk_size);
    Ok(chars
        .chunks(chunk_size)
        .enumerate()
        .map(|(index, chunk)| format!("({index}/{total}){}", chunk.iter().collect::<String>()))
        .collect())
}

impl fmt::Display for SigningRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_transport_string())
    }
}

/// Re-encode a hex string (such as a transaction hash) as base64.
///
/// # Errors
///
/// Returns [`WalletError::InvalidInput`] for malformed hex.
pub fn hex_to_base64(hex_str: &str) -> Result<String> {
    Ok(BASE64.encode(hex::decode(hex_str.trim())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::eip155_example;

    #[test]
    fn test_payload_layout() {
        let hash = B256::repeat_byte(0xab);
        let payload = SigningPayload::new(hash, &[0, 5]).unwrap();
        let bytes = payload.to_bytes();

        assert_eq!(bytes.len(), 36);
        assert_eq!(&bytes[..32], hash.as_slice());
        assert_eq!(&bytes[32..], &[0x00, 0x00, 0x05, 0x00]);
        assert_eq!(SigningPayload::from_bytes(&bytes).unwrap(), payload);
    }

    #[test]
    fn test_wide_index_is_rejected() {
        let err = SigningPayload::new(B256::ZERO, &[0, 70_000]).unwrap_err();
        assert!(matches!(err, WalletError::UnsupportedDerivation(_)));
    }

    #[test]
    fn test_transport_string() {
        let tx = eip155_example();
        let request = SigningRequest::new(tx.clone(), &[0, 0]).unwrap();
        let transport = request.to_transport_string();

        let (tx_hex, payload_b64) = transport.split_once(":&").unwrap();
        assert_eq!(
            tx_hex,
            "ec098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080018080"
        );
        let payload = BASE64.decode(payload_b64).unwrap();
        assert_eq!(&payload[..32], tx.signing_hash().as_slice());
        assert_eq!(&payload[32..], &[0, 0, 0, 0]);

        assert_eq!(SigningRequest::parse(&transport).unwrap(), request);
        assert_eq!(request.to_string(), transport);
    }

    #[test]
    fn test_parse_rejects_mismatched_payload() {
        let request = SigningRequest::new(eip155_example(), &[0, 0]).unwrap();
        let other = SigningPayload::new(B256::ZERO, &[0, 0]).unwrap();
        let transport = format!(
            "{}:&{}",
            hex::encode(request.unsigned.serialize()),
            BASE64.encode(other.to_bytes())
        );
        assert!(matches!(SigningRequest::parse(&transport), Err(WalletError::Decode(_))));
        assert!(matches!(SigningRequest::parse("abcd"), Err(WalletError::InvalidInput(_))));
    }

    #[test]
    fn test_frames_carry_position_and_total() {
        let request = SigningRequest::new(eip155_example(), &[0, 0]).unwrap();
        let transport = request.to_transport_string();
        assert_eq!(transport.len(), 140);

        let frames = request.to_frames(50).unwrap();
        assert_eq!(frames.len(), 3);
        assert!(frames[0].starts_with("(0/3)ec0985"));
        assert!(frames[1].starts_with("(1/3)"));
        assert_eq!(frames[2].len(), "(2/3)".len() + 40);

        let joined: String = frames.iter().map(|frame| &frame[5..]).collect();
        assert_eq!(joined, transport);
    }

    #[test]
    fn test_short_text_is_one_frame() {
        assert_eq!(label_frames("abc", 10).unwrap(), vec!["(0/1)abc".to_string()]);
        assert_eq!(label_frames("abcd", 2).unwrap(), vec!["(0/2)ab", "(1/2)cd"]);
        assert!(label_frames("", 4).unwrap().is_empty());
        assert!(matches!(label_frames("abc", 0), Err(WalletError::InvalidInput(_))));
    }

    #[test]
    fn test_hex_to_base64() {
        assert_eq!(hex_to_base64("0x48656c6c6f").unwrap(), "SGVsbG8=");
        assert_eq!(hex_to_base64("48656c6c6f").unwrap(), "SGVsbG8=");
        assert!(matches!(hex_to_base64("0xzz"), Err(WalletError::InvalidInput(_))));
    }
}
