//! Transaction assembly.

use alloy::primitives::{Address, Bytes, U256};
use tracing::debug;

use super::UnsignedTransaction;
use crate::abi::TokenCall;
use crate::chain::ChainClient;
use crate::error::{Result, WalletError};
use crate::fees::{FeeEstimator, FeeKind, FeeRate, FeeSource, FeeSpec};
use crate::nonce::NonceFeeTracker;

/// Builder for an [`UnsignedTransaction`].
///
/// Destination, value, data and gas limit are set by the caller; the nonce
/// comes from the [`NonceFeeTracker`] and the fee from the [`FeeEstimator`]
/// (or from an explicit [`FeeSpec`]).
///
/// # Examples
///
/// ```rust,ignore
/// let unsigned = TransactionBuilder::new(1)
///     .to(recipient)
///     .value(U256::from(10).pow(U256::from(16)))
///     .gas_limit(21_000)
///     .fee_rate(FeeRate::Fast, FeeKind::FeeMarket)
///     .build(&tracker, &estimator, &client)
///     .await?;
/// ```
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct TransactionBuilder {
    chain_id: u64,
    to: Option<Address>,
    value: U256,
    data: Bytes,
    gas_limit: u64,
    fee: FeeSource,
}

impl TransactionBuilder {
    /// Start a transaction on `chain_id`.
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            to: None,
            value: U256::ZERO,
            data: Bytes::new(),
            gas_limit: 0,
            fee: FeeSource::default(),
        }
    }

    /// A plain value transfer.
    pub fn transfer(chain_id: u64, to: Address, value: U256, gas_limit: u64) -> Self {
        Self::new(chain_id).to(to).value(value).gas_limit(gas_limit)
    }

    /// A zero-value call of `call` on `contract`.
    pub fn token_call(chain_id: u64, contract: Address, call: &TokenCall, gas_limit: u64) -> Self {
        Self::new(chain_id)
            .to(contract)
            .data(call.encode())
            .gas_limit(gas_limit)
    }

    /// Set the recipient.
    pub const fn to(mut self, to: Address) -> Self {
        self.to = Some(to);
        self
    }

    /// Set the native value in wei.
    pub const fn value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    /// Set the call data.
    pub fn data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    /// Set the gas limit.
    pub const fn gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    /// Set where the fee comes from.
    pub const fn fee(mut self, fee: FeeSource) -> Self {
        self.fee = fee;
        self
    }

    /// Estimate the fee at `rate` for a `kind` envelope.
    pub fn fee_rate(self, rate: impl Into<FeeRate>, kind: FeeKind) -> Self {
        self.fee(FeeSource::estimate(rate, kind))
    }

    /// Use `fee` as given.
    pub const fn explicit_fee(self, fee: FeeSpec) -> Self {
        self.fee(FeeSource::Explicit(fee))
    }

    /// Gas limit currently set.
    #[must_use]
    pub const fn current_gas_limit(&self) -> u64 {
        self.gas_limit
    }

    /// Resolve the fee and assemble the transaction at the tracker's nonce.
    ///
    /// Nothing is mutated: the tracker only advances after a broadcast.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidFeeRate`] for a bad rate or explicit fee
    /// pair, [`WalletError::InvalidInput`] for a zero gas limit, or the
    /// client's error while fetching fee conditions.
    pub async fn build(
        self,
        tracker: &NonceFeeTracker,
        estimator: &FeeEstimator,
        client: &dyn ChainClient,
    ) -> Result<UnsignedTransaction> {
        self.check_gas_limit()?;
        let fee = match self.fee {
            FeeSource::Estimate { rate, kind } => {
                estimator.estimate(client, rate, self.gas_limit, kind).await?
            }
            FeeSource::Explicit(fee) => fee,
        };
        self.build_with(tracker.next_nonce(), fee)
    }

    /// Assemble the transaction with a known nonce and fee.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidFeeRate`] if `fee` is inconsistent and
    /// [`WalletError::InvalidInput`] for a zero gas limit.
    pub fn build_with(self, nonce: u64, fee: FeeSpec) -> Result<UnsignedTransaction> {
        self.check_gas_limit()?;
        fee.validate()?;

        let unsigned = UnsignedTransaction {
            nonce,
            to: self.to,
            value: self.value,
            data: self.data,
            gas_limit: self.gas_limit,
            chain_id: self.chain_id,
            fee,
        };
        debug!(
            nonce,
            kind = ?unsigned.kind(),
            gas_limit = unsigned.gas_limit,
            signing_hash = %unsigned.signing_hash(),
            "transaction built"
        );
        Ok(unsigned)
    }

    fn check_gas_limit(&self) -> Result<()> {
        if self.gas_limit == 0 {
            return Err(WalletError::invalid_input("gas limit must be non-zero"));
        }
        Ok(())
    }
}
