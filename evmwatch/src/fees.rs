//! Fee quotes.
//!
//! A caller picks a fee rate (a preset or a raw multiplier) and a fee kind;
//! the [`FeeEstimator`] scales the node's current suggestion by that rate.
//! A multiplier is applied as the exact binary fraction the `f64` holds
//! (`mantissa * 2^exponent`), in 256-bit integers, rounding half up.

use std::fmt;

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chain::{ChainClient, FeeSuggestion};
use crate::config::FeePolicy;
use crate::error::{Result, WalletError};

/// Which transaction envelope a fee is for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeKind {
    /// Single gas price, type-0 envelope with EIP-155 replay protection.
    Legacy,
    /// Priority fee plus fee cap, EIP-1559 type-2 envelope.
    #[default]
    FeeMarket,
}

/// Concrete per-gas fee fields of a transaction, in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeeSpec {
    /// Legacy gas price.
    Legacy {
        /// Price per unit of gas.
        gas_price: U256,
    },
    /// EIP-1559 fee pair.
    FeeMarket {
        /// Tip paid to the block producer per unit of gas.
        max_priority_fee: U256,
        /// Cap on the total price per unit of gas.
        max_fee: U256,
    },
}

impl FeeSpec {
    /// The envelope this fee belongs to.
    #[must_use]
    pub const fn kind(&self) -> FeeKind {
        match self {
            Self::Legacy { .. } => FeeKind::Legacy,
            Self::FeeMarket { .. } => FeeKind::FeeMarket,
        }
    }

    /// The most the sender can pay per unit of gas.
    #[must_use]
    pub const fn max_price_per_gas(&self) -> U256 {
        match self {
            Self::Legacy { gas_price } => *gas_price,
            Self::FeeMarket { max_fee, .. } => *max_fee,
        }
    }

    /// Reject a fee-market pair whose cap is below its tip.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidFeeRate`] carrying `max_fee / max_priority_fee`.
    pub fn validate(&self) -> Result<()> {
        if let Self::FeeMarket {
            max_priority_fee,
            max_fee,
        } = self
            && max_fee < max_priority_fee
        {
            return Err(WalletError::InvalidFeeRate(
                approx_f64(*max_fee) / approx_f64(*max_priority_fee),
            ));
        }
        Ok(())
    }
}

/// Lossy conversion used only for error reporting.
#[allow(clippy::cast_precision_loss)]
fn approx_f64(value: U256) -> f64 {
    u128::try_from(value).unwrap_or(u128::MAX) as f64
}

/// How aggressively to bid relative to the node's suggestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeRate {
    /// 1.0x the suggestion.
    Slow,
    /// 1.5x the suggestion.
    #[default]
    Medium,
    /// 2.0x the suggestion.
    Fast,
    /// Any positive finite multiplier.
    Custom(f64),
}

impl FeeRate {
    /// The raw multiplier.
    #[must_use]
    pub const fn multiplier(self) -> f64 {
        match self {
            Self::Slow => 1.0,
            Self::Medium => 1.5,
            Self::Fast => 2.0,
            Self::Custom(m) => m,
        }
    }

    /// The multiplier, checked to be a positive finite number.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidFeeRate`] otherwise.
    pub fn checked_multiplier(self) -> Result<f64> {
        let m = self.multiplier();
        if !m.is_finite() || m <= 0.0 {
            return Err(WalletError::InvalidFeeRate(m));
        }
        Ok(m)
    }

    /// `round(value * multiplier)`, exact and rounding half up.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidFeeRate`] for an invalid multiplier, a
    /// product that does not fit 256 bits, or a non-zero `value` scaled
    /// down to zero.
    pub fn apply(self, value: U256) -> Result<U256> {
        let m = self.checked_multiplier()?;
        let (mantissa, exponent) = decompose(m);
        let product = value
            .checked_mul(U256::from(mantissa))
            .ok_or(WalletError::InvalidFeeRate(m))?;

        let scaled = if exponent >= 0 {
            product
                .checked_shl(exponent.unsigned_abs() as usize)
                .ok_or(WalletError::InvalidFeeRate(m))?
        } else {
            shr_round_half_up(product, exponent.unsigned_abs() as usize)
        };

        if scaled.is_zero() && !value.is_zero() {
            return Err(WalletError::InvalidFeeRate(m));
        }
        Ok(scaled)
    }
}

/// Split a positive finite `f64` into `mantissa * 2^exponent` exactly.
fn decompose(value: f64) -> (u64, i32) {
    const FRACTION_BITS: u32 = 52;
    const EXPONENT_BIAS: i32 = 1075;

    let bits = value.to_bits();
    let fraction = bits & ((1u64 << FRACTION_BITS) - 1);
    #[allow(clippy::cast_possible_truncation)]
    let biased = ((bits >> FRACTION_BITS) & 0x7ff) as i32;
    if biased == 0 {
        // subnormal
        (fraction, 1 - EXPONENT_BIAS)
    } else {
        (fraction | (1u64 << FRACTION_BITS), biased - EXPONENT_BIAS)
    }
}

/// `value / 2^shift`, rounding half up.
fn shr_round_half_up(value: U256, shift: usize) -> U256 {
    if shift == 0 {
        return value;
    }
    if shift > U256::BITS {
        return U256::ZERO;
    }
    let quotient = if shift == U256::BITS {
        U256::ZERO
    } else {
        value >> shift
    };
    if value.bit(shift - 1) {
        quotient + U256::from(1)
    } else {
        quotient
    }
}

impl From<f64> for FeeRate {
    fn from(multiplier: f64) -> Self {
        Self::Custom(multiplier)
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slow => f.write_str("slow"),
            Self::Medium => f.write_str("medium"),
            Self::Fast => f.write_str("fast"),
            Self::Custom(m) => write!(f, "{m}x"),
        }
    }
}

/// Where the fee fields of a new transaction come from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeSource {
    /// Scale the node's current suggestion.
    Estimate {
        /// Multiplier applied to the suggestion.
        rate: FeeRate,
        /// Envelope to quote for.
        kind: FeeKind,
    },
    /// Use caller-supplied fields unchanged, e.g. from a dApp request.
    Explicit(FeeSpec),
}

impl FeeSource {
    /// Shorthand for [`FeeSource::Estimate`].
    #[must_use]
    pub fn estimate(rate: impl Into<FeeRate>, kind: FeeKind) -> Self {
        Self::Estimate {
            rate: rate.into(),
            kind,
        }
    }
}

impl Default for FeeSource {
    fn default() -> Self {
        Self::Estimate {
            rate: FeeRate::default(),
            kind: FeeKind::default(),
        }
    }
}

/// Turns a fee rate into concrete fee fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEstimator {
    base_fee_multiplier: u64,
}

impl Default for FeeEstimator {
    fn default() -> Self {
        Self::new(&FeePolicy::default())
    }
}

impl FeeEstimator {
    /// Create an estimator from the fee policy.
    #[must_use]
    pub const fn new(policy: &FeePolicy) -> Self {
        Self {
            base_fee_multiplier: policy.base_fee_multiplier,
        }
    }

    /// Quote fees against an already fetched suggestion.
    ///
    /// `max_fee = base_fee_multiplier * base_fee + max_priority_fee`, so the
    /// cap never falls below the tip.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidFeeRate`] for a non-positive or
    /// non-finite rate, or one that scales a non-zero hint to zero or past
    /// 256 bits.
    pub fn quote(&self, suggestion: &FeeSuggestion, rate: FeeRate, kind: FeeKind) -> Result<FeeSpec> {
        let fee = match kind {
            FeeKind::Legacy => FeeSpec::Legacy {
                gas_price: rate.apply(suggestion.legacy_gas_price_hint)?,
            },
            FeeKind::FeeMarket => {
                let max_priority_fee = rate.apply(suggestion.priority_fee_hint)?;
                let max_fee = suggestion
                    .base_fee
                    .saturating_mul(U256::from(self.base_fee_multiplier))
                    .saturating_add(max_priority_fee);
                FeeSpec::FeeMarket {
                    max_priority_fee,
                    max_fee,
                }
            }
        };
        Ok(fee)
    }

    /// Fetch the node's fee suggestion and quote against it.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidFeeRate`] before any request is made if
    /// the rate is invalid, otherwise the client's error.
    pub async fn estimate(
        &self,
        client: &dyn ChainClient,
        rate: FeeRate,
        gas_limit: u64,
        kind: FeeKind,
    ) -> Result<FeeSpec> {
        rate.checked_multiplier()?;
        let suggestion = client.suggest_fees().await?;
        let fee = self.quote(&suggestion, rate, kind)?;
        debug!(
            rate = %rate,
            ?kind,
            gas_limit,
            max_price_per_gas = %fee.max_price_per_gas(),
            budget = %Self::estimate_total_cost(&fee, gas_limit),
            "fee quoted"
        );
        Ok(fee)
    }

    /// Worst-case fee budget: `max_price_per_gas * gas_limit`.
    #[must_use]
    pub fn estimate_total_cost(fee: &FeeSpec, gas_limit: u64) -> U256 {
        fee.max_price_per_gas().saturating_mul(U256::from(gas_limit))
    }
}

/// Render an integer amount with `decimals` fractional digits, dropping
/// trailing zeros (`1500000000000000000`, 18 → `"1.5"`).
///
/// # Errors
///
/// Returns [`WalletError::InvalidInput`] if `decimals` exceeds 77.
pub fn format_units(value: U256, decimals: u8) -> Result<String> {
    let formatted = alloy::primitives::utils::format_units(value, decimals)
        .map_err(|e| WalletError::invalid_input(format!("format_units: {e}")))?;
    if !formatted.contains('.') {
        return Ok(formatted);
    }
    Ok(formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockChainClient;

    fn suggestion(base: u64, prio: u64, legacy: u64) -> FeeSuggestion {
        FeeSuggestion {
            base_fee: U256::from(base),
            priority_fee_hint: U256::from(prio),
            legacy_gas_price_hint: U256::from(legacy),
        }
    }

    #[test]
    fn test_fee_market_scenario() {
        let estimator = FeeEstimator::default();
        let fee = estimator
            .quote(&suggestion(100, 2, 0), FeeRate::Custom(1.0), FeeKind::FeeMarket)
            .unwrap();
        assert_eq!(
            fee,
            FeeSpec::FeeMarket {
                max_priority_fee: U256::from(2),
                max_fee: U256::from(202),
            }
        );
        assert_eq!(
            FeeEstimator::estimate_total_cost(&fee, 21_000),
            U256::from(202u64 * 21_000)
        );
    }

    #[test]
    fn test_legacy_rounds_half_up() {
        let estimator = FeeEstimator::default();
        let fee = estimator
            .quote(&suggestion(0, 0, 3), FeeRate::Medium, FeeKind::Legacy)
            .unwrap();
        // 3 * 1.5 = 4.5
        assert_eq!(fee, FeeSpec::Legacy { gas_price: U256::from(5) });
        assert_eq!(FeeEstimator::estimate_total_cost(&fee, 21_000), U256::from(105_000));
    }

    #[test]
    fn test_multiplier_is_applied_exactly() {
        let estimator = FeeEstimator::default();
        let base = suggestion(0, 0, 20_000_000_000);
        let price = |rate| match estimator.quote(&base, rate, FeeKind::Legacy).unwrap() {
            FeeSpec::Legacy { gas_price } => gas_price,
            FeeSpec::FeeMarket { .. } => unreachable!(),
        };
        assert_eq!(price(FeeRate::Custom(1e-7)), U256::from(2_000));
        assert_eq!(price(FeeRate::Custom(1.000_000_4)), U256::from(20_000_008_000u64));
        assert_eq!(price(FeeRate::Custom(0.25)), U256::from(5_000_000_000u64));
    }

    #[test]
    fn test_apply_rounds_half_up() {
        assert_eq!(FeeRate::Custom(0.5).apply(U256::from(1)).unwrap(), U256::from(1));
        assert_eq!(FeeRate::Custom(0.5).apply(U256::from(3)).unwrap(), U256::from(2));
        assert_eq!(FeeRate::Custom(0.25).apply(U256::from(5)).unwrap(), U256::from(1));
        assert_eq!(FeeRate::Custom(0.75).apply(U256::ZERO).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_large_multiplier_is_exact() {
        let m = 2f64.powi(60);
        assert_eq!(
            FeeRate::Custom(m).apply(U256::from(3)).unwrap(),
            U256::from(3u128 << 60)
        );
    }

    #[test]
    fn test_multiplier_scaling_to_zero_is_rejected() {
        let err = FeeRate::Custom(1e-12).apply(U256::from(20)).unwrap_err();
        assert_eq!(err, WalletError::InvalidFeeRate(1e-12));
        let err = FeeRate::Custom(f64::MIN_POSITIVE).apply(U256::MAX).unwrap_err();
        assert!(matches!(err, WalletError::InvalidFeeRate(_)));
    }

    #[test]
    fn test_overflowing_multiplier_is_rejected() {
        let err = FeeRate::Custom(1e30).apply(U256::MAX >> 10).unwrap_err();
        assert!(matches!(err, WalletError::InvalidFeeRate(_)));
        let err = FeeRate::Custom(f64::MAX).apply(U256::from(1)).unwrap_err();
        assert!(matches!(err, WalletError::InvalidFeeRate(_)));
    }

    #[test]
    fn test_presets() {
        let estimator = FeeEstimator::default();
        let base = suggestion(0, 0, 20_000_000_000);
        let price = |rate| match estimator.quote(&base, rate, FeeKind::Legacy).unwrap() {
            FeeSpec::Legacy { gas_price } => gas_price,
            FeeSpec::FeeMarket { .. } => unreachable!(),
        };
        assert_eq!(price(FeeRate::Slow), U256::from(20_000_000_000u64));
        assert_eq!(price(FeeRate::Medium), U256::from(30_000_000_000u64));
        assert_eq!(price(FeeRate::Fast), U256::from(40_000_000_000u64));
    }

    #[test]
    fn test_base_fee_multiplier_is_configurable() {
        let policy = FeePolicy {
            base_fee_multiplier: 3,
            ..FeePolicy::default()
        };
        let fee = FeeEstimator::new(&policy)
            .quote(&suggestion(100, 2, 0), FeeRate::Slow, FeeKind::FeeMarket)
            .unwrap();
        assert_eq!(fee.max_price_per_gas(), U256::from(302));
    }

    #[test]
    fn test_invalid_rates_are_rejected() {
        let estimator = FeeEstimator::default();
        for m in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = estimator
                .quote(&suggestion(1, 1, 1), FeeRate::Custom(m), FeeKind::Legacy)
                .unwrap_err();
            assert!(matches!(err, WalletError::InvalidFeeRate(_)), "{m}");
        }
    }

    #[test]
    fn test_explicit_fee_validation() {
        let ok = FeeSpec::FeeMarket {
            max_priority_fee: U256::from(2),
            max_fee: U256::from(2),
        };
        assert!(ok.validate().is_ok());

        let inverted = FeeSpec::FeeMarket {
            max_priority_fee: U256::from(4),
            max_fee: U256::from(2),
        };
        assert_eq!(inverted.validate(), Err(WalletError::InvalidFeeRate(0.5)));
    }

    #[tokio::test]
    async fn test_estimate_uses_node_suggestion() {
        let client = MockChainClient::new().with_fees(100, 2, 50);
        let fee = FeeEstimator::default()
            .estimate(&client, FeeRate::Slow, 21_000, FeeKind::FeeMarket)
            .await
            .unwrap();
        assert_eq!(fee.max_price_per_gas(), U256::from(202));
        assert_eq!(fee.kind(), FeeKind::FeeMarket);
    }

    #[test]
    fn test_format_units() {
        let wei = U256::from(1_500_000_000_000_000_000u128);
        assert_eq!(format_units(wei, 18).unwrap(), "1.5");
        assert_eq!(format_units(U256::from(1_000_000u64), 6).unwrap(), "1");
        assert_eq!(format_units(U256::from(10u64), 0).unwrap(), "10");
        assert_eq!(format_units(U256::from(1u64), 18).unwrap(), "0.000000000000000001");
        assert!(format_units(U256::from(1u64), 80).is_err());
    }
}
