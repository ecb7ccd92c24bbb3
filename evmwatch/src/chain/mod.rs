//! Remote ledger access.
//!
//! This module defines the [`ChainClient`] trait that abstracts over the
//! node and indexer the wallet talks to. Every operation is a single
//! request/response: nothing here retries, caches or mutates wallet state.
//!
//! # Implementations
//!
//! - [`RpcChainClient`]: JSON-RPC node through an alloy provider, plus an
//!   optional [`IndexerClient`] for transaction history.

use alloy::primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

mod indexer;
mod rpc;

pub use indexer::{Direction, IndexerClient, TransactionRecord};
pub use rpc::RpcChainClient;

/// Current network fee conditions as reported by the node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSuggestion {
    /// Base fee of the pending block, in wei per gas.
    pub base_fee: U256,
    /// Suggested priority fee (tip), in wei per gas.
    pub priority_fee_hint: U256,
    /// Suggested legacy gas price, in wei per gas.
    pub legacy_gas_price_hint: U256,
}

/// Request/response access to a ledger node and its history indexer.
///
/// Errors are reported as [`WalletError::Network`](crate::WalletError::Network)
/// for transport failures, [`WalletError::Node`](crate::WalletError::Node) for
/// JSON-RPC error objects and [`WalletError::Decode`](crate::WalletError::Decode)
/// for malformed responses. Retry policy belongs to the caller.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Native balance of `address` at the latest block, in wei.
    async fn get_balance(&self, address: Address) -> Result<U256>;

    /// Number of transactions sent from `address` (its next nonce).
    async fn get_transaction_count(&self, address: Address) -> Result<u64>;

    /// Current base fee, priority-fee hint and legacy gas price.
    async fn suggest_fees(&self) -> Result<FeeSuggestion>;

    /// Read-only call simulation against `to` with `data`.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;

    /// Submit a signed, encoded transaction and return its hash.
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256>;

    /// Most recent transactions involving `address`, newest first.
    async fn get_transaction_history(
        &self,
        address: Address,
        page_size: usize,
    ) -> Result<Vec<TransactionRecord>>;
}
