//! Common imports for wallet sessions.

pub use alloy::primitives::{Address, B256, Bytes, U256};

pub use crate::abi::{CallEncoder, TokenCall, TokenMetadata, TokenStandard};
pub use crate::chain::{ChainClient, Direction, FeeSuggestion, RpcChainClient, TransactionRecord};
pub use crate::config::{FeePolicy, HttpClientConfig, IndexerConfig, RetryConfig, WalletConfig};
pub use crate::error::{Result, WalletError};
pub use crate::fees::{FeeEstimator, FeeKind, FeeRate, FeeSource, FeeSpec};
pub use crate::keys::{DerivedKey, KeyDeriver};
pub use crate::nonce::{NonceFeeTracker, NonceLagWarning, SyncOutcome};
pub use crate::tx::{
    Signature, SignatureReattacher, SignedTransaction, SigningPayload, SigningRequest,
    TransactionBuilder, UnsignedTransaction,
};
pub use crate::wallet::{Wallet, WalletBuilder};
