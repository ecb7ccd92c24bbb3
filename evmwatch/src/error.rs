//! Error types for the wallet engine.
//!
//! Every fallible operation returns [`WalletError`]. The variants are split
//! along the lines a caller needs to decide on a retry policy:
//! - key and derivation errors (never retryable)
//! - encoding and decoding errors (never retryable)
//! - transport failures ([`WalletError::Network`], the only retryable kind)
//! - node-reported errors ([`WalletError::Node`])

use alloy::primitives::Address;
use alloy::transports::{RpcError, TransportErrorKind};

/// Result type alias for wallet operations.
pub type Result<T> = std::result::Result<T, WalletError>;

/// The error type for every wallet engine operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum WalletError {
    /// The extended public key could not be decoded.
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// The derivation path is malformed or asks for a hardened child.
    #[error("unsupported derivation: {0}")]
    UnsupportedDerivation(String),

    /// The fee-rate multiplier is not a positive finite number, or an
    /// explicit fee pair is inconsistent.
    #[error("invalid fee rate: {0}")]
    InvalidFeeRate(f64),

    /// A contract call returned fewer bytes than the decoder needs.
    #[error("malformed call result: expected at least {expected} bytes, got {actual}")]
    MalformedCallResult {
        /// Minimum number of bytes the decoder expected.
        expected: usize,
        /// Number of bytes actually returned.
        actual: usize,
    },

    /// The signature recovers to an address other than the wallet's own.
    #[error("signature recovers to {recovered}, expected {expected}")]
    SignatureAddressMismatch {
        /// The wallet's own address.
        expected: Address,
        /// The address recovered from the signature.
        recovered: Address,
    },

    /// A prepared transaction holds the next nonce; broadcast it or
    /// release the reservation first.
    #[error("nonce {0} is reserved by a prepared transaction")]
    NonceReserved(u64),

    /// The signature bytes are malformed or do not recover to any key.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Transport-level failure (connection refused, timeout, TLS, ...).
    #[error("network error: {0}")]
    Network(String),

    /// The node answered with a JSON-RPC error object.
    #[error("node error {code}: {message}")]
    Node {
        /// JSON-RPC error code.
        code: i64,
        /// Error message reported by the node.
        message: String,
    },

    /// A response or encoded payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A caller-supplied value (address, amount, hex payload) is malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The wallet configuration is incomplete or invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl WalletError {
    /// Create a network error.
    #[must_use]
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a node-reported error.
    #[must_use]
    pub fn node(code: i64, message: impl Into<String>) -> Self {
        Self::Node {
            code,
            message: message.into(),
        }
    }

    /// Create a decode error.
    #[must_use]
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create an invalid input error.
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a malformed call result error.
    #[must_use]
    pub const fn malformed_call_result(expected: usize, actual: usize) -> Self {
        Self::MalformedCallResult { expected, actual }
    }

    /// Check if this error is a transient transport failure.
    ///
    /// Only idempotent reads may be retried on such an error. A failed
    /// `send_raw_transaction` may still have reached the node.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<RpcError<TransportErrorKind>> for WalletError {
    fn from(err: RpcError<TransportErrorKind>) -> Self {
        match err {
            RpcError::ErrorResp(payload) => Self::node(payload.code, payload.message.to_string()),
            RpcError::NullResp => Self::decode("node returned a null response"),
            RpcError::SerError(e) => Self::decode(format!("request serialization failed: {e}")),
            RpcError::DeserError { err, text } => {
                Self::decode(format!("unexpected response {text:?}: {err}"))
            }
            other => Self::network(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for WalletError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::decode(err.to_string())
        } else if err.is_timeout() {
            Self::network("request timed out")
        } else if err.is_connect() {
            Self::network(format!("connection failed: {err}"))
        } else {
            Self::network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(err: serde_json::Error) -> Self {
        Self::decode(err.to_string())
    }
}

impl From<alloy::rlp::Error> for WalletError {
    fn from(err: alloy::rlp::Error) -> Self {
        Self::decode(format!("rlp: {err}"))
    }
}

impl From<alloy::hex::FromHexError> for WalletError {
    fn from(err: alloy::hex::FromHexError) -> Self {
        Self::invalid_input(format!("hex: {err}"))
    }
}

impl From<base64::DecodeError> for WalletError {
    fn from(err: base64::DecodeError) -> Self {
        Self::invalid_input(format!("base64: {err}"))
    }
}
