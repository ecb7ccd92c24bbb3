//! Transaction-history indexer client.
//!
//! Talks to an Etherscan-compatible `module=account&action=txlist` endpoint.
//! The indexer is optional: a wallet without one can still do everything
//! except list its history.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::{HttpClientConfig, IndexerConfig};
use crate::error::{Result, WalletError};

/// Message the indexer uses for an empty (but successful) result set.
const NO_TRANSACTIONS: &str = "No transactions found";

/// Direction of a transaction relative to the wallet's address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// The wallet received the transaction.
    In,
    /// The wallet sent the transaction.
    Out,
    /// The wallet sent the transaction to itself.
    SelfTransfer,
}

/// One entry of an address's transaction history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Transaction hash.
    pub hash: B256,
    /// Block the transaction was included in.
    pub block_number: u64,
    /// Block timestamp (seconds since the Unix epoch).
    pub timestamp: u64,
    /// Sender.
    pub from: Address,
    /// Recipient, `None` for contract creation.
    pub to: Option<Address>,
    /// Transferred value in wei.
    pub value: U256,
    /// Gas consumed by execution.
    pub gas_used: u64,
    /// Whether execution failed.
    pub is_error: bool,
    /// Direction relative to the queried address.
    pub direction: Direction,
}

/// Raw entry as returned by the indexer: every field is a string.
#[derive(Debug, Deserialize)]
struct RawTransaction {
    #[serde(rename = "blockNumber")]
    block_number: String,
    #[serde(rename = "timeStamp")]
    timestamp: String,
    hash: String,
    from: String,
    #[serde(default)]
    to: String,
    value: String,
    #[serde(rename = "gasUsed", default)]
    gas_used: String,
    #[serde(rename = "isError", default)]
    is_error: String,
}

#[derive(Debug, Deserialize)]
struct IndexerResponse {
    status: String,
    message: String,
    result: Value,
}

impl RawTransaction {
    fn into_record(self, owner: Address) -> Result<TransactionRecord> {
        let from = parse_field::<Address>("from", &self.from)?;
        let to = if self.to.is_empty() {
            None
        } else {
            Some(parse_field::<Address>("to", &self.to)?)
        };

        let direction = match (from == owner, to == Some(owner)) {
            (true, true) => Direction::SelfTransfer,
            (true, false) => Direction::Out,
            _ => Direction::In,
        };

        Ok(TransactionRecord {
            hash: parse_field("hash", &self.hash)?,
            block_number: parse_field("blockNumber", &self.block_number)?,
            timestamp: parse_field("timeStamp", &self.timestamp)?,
            from,
            to,
            value: U256::from_str_radix(&self.value, 10)
                .map_err(|e| WalletError::decode(format!("value '{}': {e}", self.value)))?,
            gas_used: if self.gas_used.is_empty() {
                0
            } else {
                parse_field("gasUsed", &self.gas_used)?
            },
            is_error: self.is_error == "1",
            direction,
        })
    }
}

fn parse_field<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.parse()
        .map_err(|e| WalletError::decode(format!("{name} '{raw}': {e}")))
}

/// Client for an Etherscan-compatible history API.
#[derive(Clone)]
pub struct IndexerClient {
    http_client: reqwest::Client,
    base_url: Arc<str>,
    api_key: Arc<str>,
    chain_id: u64,
}

impl fmt::Debug for IndexerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexerClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

impl IndexerClient {
    /// Create an indexer client.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &IndexerConfig, http: &HttpClientConfig, chain_id: u64) -> Result<Self> {
        Ok(Self {
            http_client: http.build_client()?,
            base_url: config.base_url.as_str().into(),
            api_key: config.api_key.as_str().into(),
            chain_id,
        })
    }

    /// Fetch the `page_size` most recent transactions of `address`.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::Network`] on transport failure,
    /// [`WalletError::Node`] when the indexer reports an error status, and
    /// [`WalletError::Decode`] when an entry cannot be parsed.
    pub async fn transaction_history(
        &self,
        address: Address,
        page_size: usize,
    ) -> Result<Vec<TransactionRecord>> {
        if page_size == 0 {
            return Ok(Vec::new());
        }

        let url = reqwest::Url::parse_with_params(
            &self.base_url,
            &[
                ("chainid", self.chain_id.to_string()),
                ("module", "account".to_owned()),
                ("action", "txlist".to_owned()),
                ("address", address.to_string()),
                ("startblock", "0".to_owned()),
                ("endblock", "99999999".to_owned()),
                ("page", "1".to_owned()),
                ("offset", page_size.to_string()),
                ("sort", "desc".to_owned()),
                ("apikey", self.api_key.to_string()),
            ],
        )
        .map_err(|e| WalletError::config(format!("invalid indexer url: {e}")))?;

        debug!(address = %address, page_size, "fetching transaction history");

        let response = self.http_client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WalletError::network(format!("indexer returned HTTP {status}")));
        }

        let body: IndexerResponse = response.json().await?;
        parse_history(body, address, page_size)
    }
}

fn parse_history(
    body: IndexerResponse,
    owner: Address,
    page_size: usize,
) -> Result<Vec<TransactionRecord>> {
    if body.status != "1" {
        if body.message.starts_with(NO_TRANSACTIONS) {
            return Ok(Vec::new());
        }
        let detail = match &body.result {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(WalletError::node(0, format!("{}: {detail}", body.message)));
    }

    let raw: Vec<RawTransaction> = serde_json::from_value(body.result)?;
    raw.into_iter()
        .take(page_size)
        .map(|tx| tx.into_record(owner))
        .collect()
}
