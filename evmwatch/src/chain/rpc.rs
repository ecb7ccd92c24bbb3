//! JSON-RPC node client built on an alloy provider.

use std::fmt;
use std::sync::Arc;

use alloy::network::{Ethereum, TransactionBuilder};
use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{BlockNumberOrTag, TransactionRequest};
use async_trait::async_trait;
use tracing::debug;

use super::{ChainClient, FeeSuggestion, IndexerClient, TransactionRecord};
use crate::config::WalletConfig;
use crate::error::{Result, WalletError};

/// [`ChainClient`] backed by a JSON-RPC node and an optional history indexer.
///
/// The provider is built without fillers or a wallet: this client only
/// reads state and forwards already-signed bytes.
#[derive(Clone)]
pub struct RpcChainClient {
    /// Type-erased provider for RPC calls.
    provider: Arc<DynProvider<Ethereum>>,
    /// History indexer, when configured.
    indexer: Option<IndexerClient>,
}

impl fmt::Debug for RpcChainClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcChainClient")
            .field("indexer", &self.indexer)
            .finish_non_exhaustive()
    }
}

impl RpcChainClient {
    /// Connect to the node named by `config.rpc_url`.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::Config`] if the endpoint is invalid or the
    /// indexer client cannot be built.
    pub async fn connect(config: &WalletConfig) -> Result<Self> {
        let provider: DynProvider<Ethereum> = ProviderBuilder::new()
            .disable_recommended_fillers()
            .connect(&config.rpc_url)
            .await
            .map_err(|e| WalletError::config(format!("failed to connect to node: {e}")))?
            .erased();

        let indexer = config
            .indexer
            .as_ref()
            .map(|indexer| IndexerClient::new(indexer, &config.http, config.chain_id))
            .transpose()?;

        Ok(Self::from_provider(provider, indexer))
    }

    /// Wrap an existing provider.
    #[must_use]
    pub fn from_provider(provider: DynProvider<Ethereum>, indexer: Option<IndexerClient>) -> Self {
        Self {
            provider: Arc::new(provider),
            indexer,
        }
    }

    /// Get a reference to the underlying provider.
    #[must_use]
    pub fn provider(&self) -> &DynProvider<Ethereum> {
        &self.provider
    }

    async fn latest_base_fee(&self) -> Result<U256> {
        let history = self
            .provider
            .get_fee_history(1, BlockNumberOrTag::Latest, &[])
            .await?;
        history
            .base_fee_per_gas
            .last()
            .copied()
            .map(U256::from)
            .ok_or_else(|| WalletError::decode("fee history has no base fee (pre-London chain?)"))
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn get_balance(&self, address: Address) -> Result<U256> {
        debug!(method = "eth_getBalance", address = %address);
        Ok(self.provider.get_balance(address).await?)
    }

    async fn get_transaction_count(&self, address: Address) -> Result<u64> {
        debug!(method = "eth_getTransactionCount", address = %address);
        Ok(self.provider.get_transaction_count(address).await?)
    }

    async fn suggest_fees(&self) -> Result<FeeSuggestion> {
        debug!(method = "eth_feeHistory");
        let base_fee = self.latest_base_fee().await?;
        let priority_fee_hint = U256::from(self.provider.get_max_priority_fee_per_gas().await?);
        let legacy_gas_price_hint = U256::from(self.provider.get_gas_price().await?);

        Ok(FeeSuggestion {
            base_fee,
            priority_fee_hint,
            legacy_gas_price_hint,
        })
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        debug!(method = "eth_call", to = %to, data_len = data.len());
        let request = TransactionRequest::default().with_to(to).with_input(data);
        Ok(self.provider.call(request).await?)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256> {
        debug!(method = "eth_sendRawTransaction", len = raw.len());
        let pending = self.provider.send_raw_transaction(&raw).await?;
        Ok(*pending.tx_hash())
    }

    async fn get_transaction_history(
        &self,
        address: Address,
        page_size: usize,
    ) -> Result<Vec<TransactionRecord>> {
        let indexer = self
            .indexer
            .as_ref()
            .ok_or_else(|| WalletError::config("no transaction-history indexer configured"))?;
        indexer.transaction_history(address, page_size).await
    }
}
