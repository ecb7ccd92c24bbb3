//! Cached nonce and balance for the wallet's address.
//!
//! The tracker advances its nonce optimistically after each broadcast so a
//! second transaction can be prepared before the node has seen the first.
//! A later [`sync`](NonceFeeTracker::sync) never moves the nonce backwards:
//! a node that reports a smaller value is assumed to be lagging, and the
//! caller gets a [`NonceLagWarning`] instead.
//!
//! The next nonce is handed to one prepared transaction at a time:
//! [`reserve`](NonceFeeTracker::reserve) claims it until the transaction is
//! broadcast ([`advance`](NonceFeeTracker::advance)) or the caller gives up
//! ([`release`](NonceFeeTracker::release)).

use std::fmt;

use alloy::primitives::{Address, U256};
use tracing::{debug, warn};

use crate::chain::ChainClient;
use crate::error::{Result, WalletError};

/// The node reported a nonce below the locally tracked one.
///
/// Non-fatal: the local value is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceLagWarning {
    /// Locally tracked nonce, which was kept.
    pub local: u64,
    /// Nonce reported by the node.
    pub node: u64,
}

impl fmt::Display for NonceLagWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "node reports nonce {} below local nonce {}; keeping local value",
            self.node, self.local
        )
    }
}

/// Result of a successful [`NonceFeeTracker::sync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Nonce after the sync.
    pub nonce: u64,
    /// Balance after the sync, in wei.
    pub balance: U256,
    /// Set when the node lagged behind the local nonce.
    pub warning: Option<NonceLagWarning>,
}

/// Nonce and balance cache for one address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NonceFeeTracker {
    nonce: u64,
    balance: U256,
    synced: bool,
    reserved: Option<u64>,
}

impl NonceFeeTracker {
    /// Create an empty tracker (nonce 0, balance 0, never synced).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh nonce and balance from the node.
    ///
    /// Both values are fetched before either is stored, so a failure leaves
    /// the cache untouched.
    ///
    /// # Errors
    ///
    /// Propagates the [`ChainClient`] error of whichever request failed.
    pub async fn sync(&mut self, client: &dyn ChainClient, address: Address) -> Result<SyncOutcome> {
        let node_nonce = client.get_transaction_count(address).await?;
        let balance = client.get_balance(address).await?;
        Ok(self.apply(node_nonce, balance))
    }

    /// Store freshly fetched node values, keeping the nonce monotonic.
    pub fn apply(&mut self, node_nonce: u64, balance: U256) -> SyncOutcome {
        let warning = if node_nonce < self.nonce {
            let warning = NonceLagWarning {
                local: self.nonce,
                node: node_nonce,
            };
            warn!(local = warning.local, node = warning.node, "node nonce lags local nonce");
            Some(warning)
        } else {
            self.nonce = node_nonce;
            None
        };
        self.drop_stale_reservation();

        self.balance = balance;
        self.synced = true;
        debug!(nonce = self.nonce, balance = %self.balance, "tracker synced");

        SyncOutcome {
            nonce: self.nonce,
            balance: self.balance,
            warning,
        }
    }

    /// The nonce to use for the next transaction.
    #[must_use]
    pub const fn next_nonce(&self) -> u64 {
        self.nonce
    }

    /// The cached balance, in wei.
    #[must_use]
    pub const fn balance(&self) -> U256 {
        self.balance
    }

    /// Whether [`sync`](Self::sync) has completed at least once.
    #[must_use]
    pub const fn is_synced(&self) -> bool {
        self.synced
    }

    /// Record a successful broadcast by moving to the next nonce.
    ///
    /// Also ends the reservation of the broadcast nonce.
    pub fn advance(&mut self) {
        self.nonce = self.nonce.saturating_add(1);
        self.drop_stale_reservation();
    }

    /// Claim the next nonce for a transaction about to be prepared.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::NonceReserved`] while another prepared
    /// transaction holds it.
    pub fn reserve(&mut self) -> Result<u64> {
        if let Some(nonce) = self.reserved {
            return Err(WalletError::NonceReserved(nonce));
        }
        self.reserved = Some(self.nonce);
        Ok(self.nonce)
    }

    /// Fail if the next nonce is reserved, without claiming it.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::NonceReserved`] while it is held.
    pub const fn ensure_unreserved(&self) -> Result<()> {
        match self.reserved {
            Some(nonce) => Err(WalletError::NonceReserved(nonce)),
            None => Ok(()),
        }
    }

    /// The reserved nonce, if a prepared transaction holds one.
    #[must_use]
    pub const fn reserved(&self) -> Option<u64> {
        self.reserved
    }

    /// Give up a reservation whose transaction will not be broadcast.
    pub fn release(&mut self) -> Option<u64> {
        self.reserved.take()
    }

    fn drop_stale_reservation(&mut self) {
        if self.reserved.is_some_and(|nonce| nonce < self.nonce) {
            self.reserved = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockChainClient;

    #[test]
    fn test_apply_takes_larger_node_nonce() {
        let mut tracker = NonceFeeTracker::new();
        let outcome = tracker.apply(7, U256::from(100));
        assert_eq!(outcome.nonce, 7);
        assert_eq!(outcome.warning, None);
        assert_eq!(tracker.next_nonce(), 7);
        assert_eq!(tracker.balance(), U256::from(100));
        assert!(tracker.is_synced());
    }

    #[test]
    fn test_lag_forgiven_when_node_catches_up() {
        let mut tracker = NonceFeeTracker::new();
        tracker.apply(3, U256::ZERO);
        tracker.advance();
        tracker.advance();
        assert_eq!(tracker.next_nonce(), 5);

        // Node has now seen both broadcasts, and one more from elsewhere.
        let outcome = tracker.apply(6, U256::ZERO);
        assert_eq!(outcome.warning, None);
        assert_eq!(tracker.next_nonce(), 6);
    }

    #[test]
    fn test_lag_warns_without_reverting() {
        let mut tracker = NonceFeeTracker::new();
        tracker.apply(3, U256::from(10));
        tracker.advance();

        let outcome = tracker.apply(3, U256::from(9));
        assert_eq!(outcome.warning, Some(NonceLagWarning { local: 4, node: 3 }));
        assert_eq!(outcome.nonce, 4);
        assert_eq!(tracker.next_nonce(), 4);
        // The balance is still refreshed.
        assert_eq!(tracker.balance(), U256::from(9));
    }

    #[test]
    fn test_equal_nonce_is_not_a_lag() {
        let mut tracker = NonceFeeTracker::new();
        tracker.apply(4, U256::ZERO);
        assert_eq!(tracker.apply(4, U256::ZERO).warning, None);
    }

    #[test]
    fn test_reservation_blocks_until_advance() {
        let mut tracker = NonceFeeTracker::new();
        tracker.apply(5, U256::ZERO);

        assert_eq!(tracker.reserve(), Ok(5));
        assert_eq!(tracker.reserve(), Err(WalletError::NonceReserved(5)));
        assert_eq!(tracker.ensure_unreserved(), Err(WalletError::NonceReserved(5)));

        tracker.advance();
        assert_eq!(tracker.reserved(), None);
        assert_eq!(tracker.reserve(), Ok(6));
    }

    #[test]
    fn test_release_returns_the_nonce() {
        let mut tracker = NonceFeeTracker::new();
        tracker.apply(2, U256::ZERO);
        tracker.reserve().unwrap();

        assert_eq!(tracker.release(), Some(2));
        assert_eq!(tracker.release(), None);
        assert_eq!(tracker.reserve(), Ok(2));
    }

    #[test]
    fn test_sync_past_reservation_drops_it() {
        let mut tracker = NonceFeeTracker::new();
        tracker.apply(2, U256::ZERO);
        tracker.reserve().unwrap();

        // Same nonce from the node: the prepared transaction is still pending.
        tracker.apply(2, U256::ZERO);
        assert_eq!(tracker.reserved(), Some(2));

        // The node has seen it through another channel.
        tracker.apply(3, U256::ZERO);
        assert_eq!(tracker.reserved(), None);
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let client = MockChainClient::new().with_nonce(12).with_balance(U256::from(5_000));
        let address = Address::repeat_byte(0x11);
        let mut tracker = NonceFeeTracker::new();

        let first = tracker.sync(&client, address).await.unwrap();
        let snapshot = tracker.clone();
        let second = tracker.sync(&client, address).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(tracker, snapshot);
        assert_eq!(first.nonce, 12);
        assert_eq!(first.balance, U256::from(5_000));
    }

    #[tokio::test]
    async fn test_failed_sync_leaves_cache_untouched() {
        let client = MockChainClient::new().with_nonce(12).with_balance(U256::from(5_000));
        let address = Address::repeat_byte(0x11);
        let mut tracker = NonceFeeTracker::new();
        tracker.sync(&client, address).await.unwrap();

        client.set_nonce(20);
        client.fail_balance(WalletError::network("connection reset"));
        let err = tracker.sync(&client, address).await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(tracker.next_nonce(), 12);
        assert_eq!(tracker.balance(), U256::from(5_000));
    }
}
