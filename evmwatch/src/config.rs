//! Configuration types for the wallet engine.
//!
//! This module contains the session configuration, HTTP client settings,
//! the read-retry policy and the fee policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WalletError};

/// Default derivation path relative to the account-level extended key.
pub const DEFAULT_DERIVATION_PATH: &str = "m/0/0";

/// Session configuration for a [`Wallet`](crate::wallet::Wallet).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// JSON-RPC endpoint of the ledger node (API key embedded in the URL).
    pub rpc_url: String,
    /// Chain ID used for replay protection.
    pub chain_id: u64,
    /// Non-hardened derivation path below the extended public key.
    #[serde(default = "default_derivation_path")]
    pub derivation_path: String,
    /// Optional transaction-history indexer.
    #[serde(default)]
    pub indexer: Option<IndexerConfig>,
    /// HTTP client settings.
    #[serde(default)]
    pub http: HttpClientConfig,
    /// Retry policy for idempotent reads.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Fee and gas-limit policy.
    #[serde(default)]
    pub fees: FeePolicy,
}

fn default_derivation_path() -> String {
    DEFAULT_DERIVATION_PATH.to_owned()
}

impl WalletConfig {
    /// Create a configuration with defaults for everything but the endpoint.
    #[must_use]
    pub fn new(rpc_url: impl Into<String>, chain_id: u64) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            chain_id,
            derivation_path: default_derivation_path(),
            indexer: None,
            http: HttpClientConfig::default(),
            retry: RetryConfig::default(),
            fees: FeePolicy::default(),
        }
    }

    /// Check the configuration for values that can never work.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::Config`] if the RPC URL is empty or not a URL,
    /// the chain ID is zero, or the fee policy is degenerate.
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.trim().is_empty() {
            return Err(WalletError::config("rpc_url is required"));
        }
        reqwest::Url::parse(&self.rpc_url)
            .map_err(|e| WalletError::config(format!("invalid rpc_url '{}': {e}", self.rpc_url)))?;
        if self.chain_id == 0 {
            return Err(WalletError::config("chain_id must be non-zero"));
        }
        if let Some(indexer) = &self.indexer {
            indexer.validate()?;
        }
        self.fees.validate()
    }
}

/// Etherscan-style transaction-history indexer settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexerConfig {
    /// Base API URL, e.g. `https://api.etherscan.io/api`.
    pub base_url: String,
    /// API key appended to every request.
    pub api_key: String,
}

impl IndexerConfig {
    /// Create an indexer configuration.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.base_url).map_err(|e| {
            WalletError::config(format!("invalid indexer base_url '{}': {e}", self.base_url))
        })?;
        if self.api_key.trim().is_empty() {
            return Err(WalletError::config("indexer api_key is required"));
        }
        Ok(())
    }
}

/// Shared HTTP client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpClientConfig {
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// User agent string.
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Some(30),
            user_agent: None,
        }
    }
}

impl HttpClientConfig {
    /// Build a reqwest client with this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::Config`] if the client cannot be built.
    pub fn build_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        if let Some(ref user_agent) = self.user_agent {
            builder = builder.user_agent(user_agent);
        }

        builder
            .build()
            .map_err(|e| WalletError::config(format!("failed to build HTTP client: {e}")))
    }
}

/// Retry policy for idempotent reads.
///
/// Broadcasts are never retried: a transport failure on submission does not
/// prove the node did not receive the transaction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Initial delay between attempts in milliseconds.
    pub initial_delay_ms: u64,
    /// Exponential backoff multiplier.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 250,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// A policy that performs a single attempt.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    /// Calculate the delay before a given retry (0-indexed).
    #[must_use]
    #[allow(
        clippy::cast_possible_wrap,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(delay_ms as u64)
    }
}

/// Fee and gas-limit policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeePolicy {
    /// Base-fee multiplier used for `max_fee` in fee-market quotes.
    pub base_fee_multiplier: u64,
    /// Gas limit for plain value transfers.
    pub transfer_gas_limit: u64,
    /// Gas limit for token contract calls.
    pub token_gas_limit: u64,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            base_fee_multiplier: 2,
            transfer_gas_limit: 21_000,
            token_gas_limit: 160_000,
        }
    }
}

impl FeePolicy {
    fn validate(&self) -> Result<()> {
        if self.base_fee_multiplier == 0 {
            return Err(WalletError::config("base_fee_multiplier must be at least 1"));
        }
        if self.transfer_gas_limit == 0 || self.token_gas_limit == 0 {
            return Err(WalletError::config("gas limits must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_config_default() {
        let config = HttpClientConfig::default();
        assert_eq!(config.timeout_secs, Some(30));
        assert!(config.user_agent.is_none());
    }

    #[test]
    fn test_retry_delay_backs_off() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for_attempt(0), Duration::from_millis(250));
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(1000));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: WalletConfig = serde_json::from_value(serde_json::json!({
            "rpc_url": "https://mainnet.example.org/v3/key",
            "chain_id": 1
        }))
        .unwrap();
        assert_eq!(config.derivation_path, "m/0/0");
        assert_eq!(config.fees, FeePolicy::default());
        assert!(config.indexer.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(WalletConfig::new("", 1).validate().is_err());
        assert!(WalletConfig::new("not a url", 1).validate().is_err());
        assert!(WalletConfig::new("https://node.example.org", 0).validate().is_err());

        let mut config = WalletConfig::new("https://node.example.org", 1);
        config.fees.base_fee_multiplier = 0;
        assert!(matches!(config.validate(), Err(WalletError::Config(_))));

        let mut config = WalletConfig::new("https://node.example.org", 1);
        config.indexer = Some(IndexerConfig::new("https://api.example.org/api", " "));
        assert!(config.validate().is_err());
    }
}
