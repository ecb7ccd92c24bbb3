//! Watch-only EVM wallet.
//!
//! Provides [`Wallet`], which derives its address from an extended public
//! key, tracks nonce and balance against a node, prepares transactions for
//! an external signer, and broadcasts them once the signature is back.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use alloy::hex;
use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::providers::Provider;
use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::abi::{CallEncoder, TokenCall, TokenMetadata};
use crate::chain::{ChainClient, RpcChainClient, TransactionRecord};
use crate::config::{FeePolicy, HttpClientConfig, IndexerConfig, RetryConfig, WalletConfig};
use crate::error::{Result, WalletError};
use crate::fees::{FeeEstimator, FeeKind, FeeRate, FeeSource, FeeSpec};
use crate::keys::{DerivedKey, KeyDeriver};
use crate::nonce::{NonceFeeTracker, SyncOutcome};
use crate::tx::{
    Signature, SignatureReattacher, SignedTransaction, SigningRequest, TransactionBuilder,
    UnsignedTransaction,
};

/// Builder for constructing a [`Wallet`].
///
/// Created by [`Wallet::builder`]. Use method chaining to configure
/// the wallet, then call [`build`](Self::build).
///
/// # Examples
///
/// ```rust,ignore
/// let wallet = Wallet::builder()
///     .extended_public_key("xpub6C...")
///     .rpc_url("https://mainnet.infura.io/v3/xxx")
///     .chain_id(1)
///     .indexer("https://api.etherscan.io/v2/api", "KEY")
///     .build()
///     .await?;
/// ```
#[derive(Default)]
pub struct WalletBuilder {
    /// Serialized account-level extended public key.
    extended_public_key: Option<String>,
    /// JSON-RPC endpoint URL.
    rpc_url: Option<String>,
    /// Chain ID, checked against the node.
    chain_id: Option<u64>,
    /// Derivation path below the extended key.
    derivation_path: Option<String>,
    indexer: Option<IndexerConfig>,
    http: HttpClientConfig,
    retry: RetryConfig,
    fees: FeePolicy,
}

impl fmt::Debug for WalletBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletBuilder")
            .field("rpc_url", &self.rpc_url.as_ref().map(|_| "[REDACTED]"))
            .field("chain_id", &self.chain_id)
            .field("derivation_path", &self.derivation_path)
            .field("indexer", &self.indexer.as_ref().map(|i| &i.base_url))
            .finish_non_exhaustive()
    }
}

impl WalletBuilder {
    /// Set the extended public key (`xpub`, `tpub` or a SLIP-132 variant).
    #[must_use]
    pub fn extended_public_key(mut self, key: impl Into<String>) -> Self {
        self.extended_public_key = Some(key.into());
        self
    }

    /// Set the JSON-RPC endpoint URL.
    #[must_use]
    pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = Some(url.into());
        self
    }

    /// Set the chain ID.
    #[must_use]
    pub const fn chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    /// Set the derivation path (default `m/0/0`).
    #[must_use]
    pub fn derivation_path(mut self, path: impl Into<String>) -> Self {
        self.derivation_path = Some(path.into());
        self
    }

    /// Enable transaction history through an Etherscan-style indexer.
    #[must_use]
    pub fn indexer(mut self, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        self.indexer = Some(IndexerConfig::new(base_url, api_key));
        self
    }

    /// Set the HTTP client settings.
    #[must_use]
    pub fn http(mut self, http: HttpClientConfig) -> Self {
        self.http = http;
        self
    }

    /// Set the retry policy for idempotent reads.
    #[must_use]
    pub const fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the fee and gas-limit policy.
    #[must_use]
    pub const fn fees(mut self, fees: FeePolicy) -> Self {
        self.fees = fees;
        self
    }

    /// Assemble the [`WalletConfig`] without connecting.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::Config`] if the endpoint or chain ID is missing
    /// or the result does not validate.
    pub fn into_config(self) -> Result<(String, WalletConfig)> {
        let key = self
            .extended_public_key
            .ok_or_else(|| WalletError::config("extended_public_key is required"))?;
        let rpc_url = self
            .rpc_url
            .ok_or_else(|| WalletError::config("rpc_url is required"))?;
        let chain_id = self
            .chain_id
            .ok_or_else(|| WalletError::config("chain_id is required"))?;

        let mut config = WalletConfig::new(rpc_url, chain_id);
        if let Some(path) = self.derivation_path {
            config.derivation_path = path;
        }
        config.indexer = self.indexer;
        config.http = self.http;
        config.retry = self.retry;
        config.fees = self.fees;
        config.validate()?;
        Ok((key, config))
    }

    /// Build the [`Wallet`]: derive the address, connect to the node and
    /// check that it serves the configured chain.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::Config`] for an incomplete configuration or a
    /// chain ID mismatch, key errors from [`KeyDeriver`], and network errors
    /// from the chain ID query.
    pub async fn build(self) -> Result<Wallet> {
        let (key, config) = self.into_config()?;
        let client = RpcChainClient::connect(&config).await?;

        let node_chain_id = client.provider().get_chain_id().await?;
        if node_chain_id != config.chain_id {
            return Err(WalletError::config(format!(
                "node serves chain {node_chain_id}, configured for {}",
                config.chain_id
            )));
        }

        Wallet::with_client(&key, config, Arc::new(client))
    }
}

/// A watch-only wallet for one derived account.
///
/// The address is derived once at construction and never changes. Nonce
/// and balance are cached behind an async mutex: every operation that reads
/// the nonce for a new transaction or advances it holds the lock for its
/// whole duration, so concurrent callers are serialized and a cancelled
/// network call leaves the cache as it was.
///
/// # Lifecycle
///
/// ```rust,ignore
/// wallet.sync().await?;
/// let request = wallet.prepare_transfer(to, value, FeeSource::default()).await?;
/// // hand request.to_transport_string() to the device, get a signature back
/// let signed = wallet.reattach(request.unsigned, signature)?;
/// let tx_hash = wallet.broadcast(&signed).await?;
/// ```
pub struct Wallet {
    /// Ledger node and indexer access.
    client: Arc<dyn ChainClient>,
    /// The derived account key.
    key: DerivedKey,
    config: WalletConfig,
    estimator: FeeEstimator,
    reattacher: SignatureReattacher,
    tracker: Mutex<NonceFeeTracker>,
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.key.address)
            .field("chain_id", &self.config.chain_id)
            .field("derivation_path", &self.config.derivation_path)
            .finish_non_exhaustive()
    }
}

impl Wallet {
    /// Create a builder for constructing a [`Wallet`].
    #[must_use]
    pub fn builder() -> WalletBuilder {
        WalletBuilder::default()
    }

    /// Create a wallet on top of an existing [`ChainClient`].
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::Config`] for an invalid configuration and the
    /// [`KeyDeriver`] error for bad key material or paths.
    pub fn with_client(
        extended_public_key: &str,
        config: WalletConfig,
        client: Arc<dyn ChainClient>,
    ) -> Result<Self> {
        config.validate()?;
        let key = KeyDeriver::derive_key(
            extended_public_key,
            &config.derivation_path,
            config.chain_id,
        )?;

        info!(
            address = %key.address,
            chain_id = config.chain_id,
            path = %config.derivation_path,
            "watch-only wallet initialized",
        );

        Ok(Self {
            client,
            estimator: FeeEstimator::new(&config.fees),
            reattacher: SignatureReattacher::new(key.address),
            key,
            config,
            tracker: Mutex::new(NonceFeeTracker::new()),
        })
    }

    /// Get the wallet's address.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.key.address
    }

    /// Get the checksummed address string.
    #[must_use]
    pub fn address_string(&self) -> String {
        self.key.address.to_checksum(None)
    }

    /// Get the chain ID.
    #[must_use]
    pub const fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    /// Get the derived key.
    #[must_use]
    pub const fn key(&self) -> &DerivedKey {
        &self.key
    }

    /// Get the session configuration.
    #[must_use]
    pub const fn config(&self) -> &WalletConfig {
        &self.config
    }

    /// Get the chain client.
    #[must_use]
    pub fn client(&self) -> &dyn ChainClient {
        self.client.as_ref()
    }

    /// Refresh nonce and balance from the node.
    ///
    /// Transport failures are retried per [`RetryConfig`]; both values are
    /// stored only once both have been fetched.
    ///
    /// # Errors
    ///
    /// Returns the last client error once retries are exhausted, or the
    /// first non-retryable one.
    pub async fn sync(&self) -> Result<SyncOutcome> {
        let mut tracker = self.tracker.lock().await;
        let client = self.client.as_ref();
        let address = self.key.address;

        let (node_nonce, balance) = self
            .retry_read("sync", move || async move {
                futures::try_join!(
                    client.get_transaction_count(address),
                    client.get_balance(address)
                )
            })
            .await?;

        let outcome = tracker.apply(node_nonce, balance);
        info!(
            address = %address,
            nonce = outcome.nonce,
            balance = %outcome.balance,
            lagging = outcome.warning.is_some(),
            "wallet synced",
        );
        Ok(outcome)
    }

    /// The nonce the next prepared transaction will use.
    pub async fn nonce(&self) -> u64 {
        self.tracker.lock().await.next_nonce()
    }

    /// The cached native balance, in wei.
    pub async fn balance(&self) -> U256 {
        self.tracker.lock().await.balance()
    }

    /// Quote fees at `rate` for a `kind` envelope.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidFeeRate`] for a bad rate, or the
    /// client's error.
    pub async fn estimate_fee(&self, rate: FeeRate, gas_limit: u64, kind: FeeKind) -> Result<FeeSpec> {
        self.estimator
            .estimate(self.client.as_ref(), rate, gas_limit, kind)
            .await
    }

    /// A builder pre-set with this wallet's chain ID.
    pub fn transaction(&self) -> TransactionBuilder {
        TransactionBuilder::new(self.config.chain_id)
    }

    /// Build a transaction at the cached nonce and package it for the device.
    ///
    /// The nonce stays reserved for this transaction until it is
    /// [broadcast](Self::broadcast) or [released](Self::release); preparing
    /// another transaction in the meantime fails. A failed build reserves
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::NonceReserved`] while an earlier prepared
    /// transaction holds the nonce, the [`TransactionBuilder::build`] error,
    /// or [`WalletError::UnsupportedDerivation`] if the path does not fit
    /// the device encoding.
    pub async fn prepare(&self, builder: TransactionBuilder) -> Result<SigningRequest> {
        let mut tracker = self.tracker.lock().await;
        tracker.ensure_unreserved()?;
        let unsigned = builder
            .build(&tracker, &self.estimator, self.client.as_ref())
            .await?;
        let request = SigningRequest::new(unsigned, &self.key.path)?;
        let nonce = tracker.reserve()?;
        debug!(nonce, "nonce reserved for prepared transaction");
        Ok(request)
    }

    /// Drop the reservation of a prepared transaction that will not be
    /// broadcast, returning its nonce.
    pub async fn release(&self) -> Option<u64> {
        let released = self.tracker.lock().await.release();
        if let Some(nonce) = released {
            debug!(nonce, "nonce reservation released");
        }
        released
    }

    /// Prepare a native value transfer.
    ///
    /// # Errors
    ///
    /// See [`prepare`](Self::prepare).
    pub async fn prepare_transfer(&self, to: Address, value: U256, fee: FeeSource) -> Result<SigningRequest> {
        let builder = TransactionBuilder::transfer(
            self.config.chain_id,
            to,
            value,
            self.config.fees.transfer_gas_limit,
        )
        .fee(fee);
        self.prepare(builder).await
    }

    /// Prepare a state-changing token call on `contract`.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidInput`] for a read-only call, otherwise
    /// see [`prepare`](Self::prepare).
    pub async fn prepare_token_call(
        &self,
        contract: Address,
        call: &TokenCall,
        fee: FeeSource,
    ) -> Result<SigningRequest> {
        if call.is_read_only() {
            return Err(WalletError::invalid_input(format!(
                "{} is a read-only call",
                call.signature()
            )));
        }
        let builder = TransactionBuilder::token_call(
            self.config.chain_id,
            contract,
            call,
            self.config.fees.token_gas_limit,
        )
        .fee(fee);
        self.prepare(builder).await
    }

    /// Attach a device signature to `unsigned`.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidInput`] for a transaction on another
    /// chain and [`WalletError::SignatureAddressMismatch`] if the signature
    /// is not from this wallet's key.
    pub fn reattach(&self, unsigned: UnsignedTransaction, signature: Signature) -> Result<SignedTransaction> {
        if unsigned.chain_id != self.config.chain_id {
            return Err(WalletError::invalid_input(format!(
                "transaction is for chain {}, wallet is on chain {}",
                unsigned.chain_id, self.config.chain_id
            )));
        }
        self.reattacher.attach(unsigned, signature)
    }

    /// [`reattach`](Self::reattach) from the strings the device channel
    /// carries: the unsigned encoding in hex and the signature in base64.
    ///
    /// # Errors
    ///
    /// Returns decoding errors for either string, then as
    /// [`reattach`](Self::reattach).
    pub fn reattach_encoded(&self, unsigned_hex: &str, signature_base64: &str) -> Result<SignedTransaction> {
        let unsigned = UnsignedTransaction::decode(&hex::decode(unsigned_hex.trim())?)?;
        let signature = Signature::from_base64(signature_base64)?;
        self.reattach(unsigned, signature)
    }

    /// Submit `signed` and advance the nonce on success, ending its
    /// reservation.
    ///
    /// Never retried. On error or cancellation the nonce and its reservation
    /// are left as they were, so the same transaction can be submitted again.
    ///
    /// # Errors
    ///
    /// Returns the client's error.
    pub async fn broadcast(&self, signed: &SignedTransaction) -> Result<B256> {
        let mut tracker = self.tracker.lock().await;
        let nonce = signed.unsigned().nonce;

        let tx_hash = self.client.send_raw_transaction(signed.raw().clone()).await?;

        if nonce == tracker.next_nonce() {
            tracker.advance();
        } else {
            debug!(nonce, local = tracker.next_nonce(), "broadcast nonce differs from local; not advancing");
        }
        info!(tx_hash = %tx_hash, nonce, next_nonce = tracker.next_nonce(), "transaction broadcast");
        Ok(tx_hash)
    }

    /// This wallet's balance on one ERC-20 contract.
    ///
    /// # Errors
    ///
    /// Returns the client's error or [`WalletError::MalformedCallResult`].
    pub async fn erc20_balance(&self, contract: Address) -> Result<U256> {
        let data = TokenCall::Erc20BalanceOf {
            owner: self.key.address,
        }
        .encode();
        let output = self.read_call("balanceOf", contract, data).await?;
        CallEncoder::decode_balance(&output)
    }

    /// This wallet's balances on several ERC-20 contracts.
    ///
    /// One call per contract, issued concurrently. Results are in input
    /// order and a failing contract does not affect the others.
    pub async fn erc20_balances(&self, contracts: &[Address]) -> Vec<Result<U256>> {
        let results = join_all(contracts.iter().map(|c| self.erc20_balance(*c))).await;
        for (contract, result) in contracts.iter().zip(&results) {
            if let Err(err) = result {
                warn!(contract = %contract, error = %err, "token balance query failed");
            }
        }
        results
    }

    /// Owner of an ERC-721 token.
    ///
    /// # Errors
    ///
    /// Returns the client's error or [`WalletError::MalformedCallResult`].
    pub async fn nft_owner(&self, contract: Address, token_id: U256) -> Result<Address> {
        let data = TokenCall::Erc721OwnerOf { token_id }.encode();
        let output = self.read_call("ownerOf", contract, data).await?;
        CallEncoder::decode_owner(&output)
    }

    /// Number of ERC-721 tokens this wallet holds on `contract`.
    ///
    /// # Errors
    ///
    /// Returns the client's error or [`WalletError::MalformedCallResult`].
    pub async fn nft_balance(&self, contract: Address) -> Result<U256> {
        let data = TokenCall::Erc721BalanceOf {
            owner: self.key.address,
        }
        .encode();
        let output = self.read_call("balanceOf", contract, data).await?;
        CallEncoder::decode_balance(&output)
    }

    /// This wallet's balance of ERC-1155 token `id`.
    ///
    /// # Errors
    ///
    /// Returns the client's error or [`WalletError::MalformedCallResult`].
    pub async fn erc1155_balance(&self, contract: Address, id: U256) -> Result<U256> {
        let data = TokenCall::Erc1155BalanceOf {
            owner: self.key.address,
            id,
        }
        .encode();
        let output = self.read_call("balanceOf", contract, data).await?;
        CallEncoder::decode_balance(&output)
    }

    /// Decimals, symbol and name of a fungible token.
    ///
    /// Doubles as a contract check: an address without code answers with
    /// empty output.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::MalformedCallResult`] if `contract` is not a
    /// token, or the client's error.
    pub async fn token_metadata(&self, contract: Address) -> Result<TokenMetadata> {
        let (decimals, symbol, name) = futures::try_join!(
            self.read_call("decimals", contract, CallEncoder::decimals()),
            self.read_call("symbol", contract, CallEncoder::symbol()),
            self.read_call("name", contract, CallEncoder::name()),
        )?;
        Ok(TokenMetadata {
            decimals: CallEncoder::decode_decimals(&decimals)?,
            symbol: CallEncoder::decode_string(&symbol)?,
            name: CallEncoder::decode_string(&name)?,
        })
    }

    /// The `page_size` most recent transactions of this wallet.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::Config`] if no indexer is configured, or the
    /// indexer's error.
    pub async fn transaction_history(&self, page_size: usize) -> Result<Vec<TransactionRecord>> {
        let client = self.client.as_ref();
        let address = self.key.address;
        self.retry_read("history", move || async move {
            client.get_transaction_history(address, page_size).await
        })
        .await
    }

    async fn read_call(&self, op: &'static str, to: Address, data: Bytes) -> Result<Bytes> {
        let client = self.client.as_ref();
        self.retry_read(op, move || {
            let data = data.clone();
            async move { client.call(to, data).await }
        })
        .await
    }

    /// Run an idempotent read, retrying transport failures with backoff.
    async fn retry_read<T, F, Fut>(&self, op: &'static str, mut read: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            match read().await {
                Err(err) if err.is_retryable() && attempt + 1 < retry.max_attempts => {
                    let delay = retry.delay_for_attempt(attempt);
                    warn!(op, attempt, error = %err, delay = ?delay, "retrying read");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
