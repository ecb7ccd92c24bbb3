#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(tail_expr_drop_order)]
//! Evmwatch is a watch-only wallet engine for EVM chains.
//!
//! It derives an account address from an extended public key, tracks the
//! account's nonce and balance against a JSON-RPC node, estimates fees,
//! builds legacy (EIP-155) and fee-market (EIP-1559) transactions for an
//! external signing device, reattaches the device's signature after
//! checking it recovers to the wallet address, and broadcasts the result.
//! Private keys never enter the process.
//!
//! Start with [`Wallet::builder`], or [`prelude`] for the common imports.

pub mod abi;
pub mod chain;
pub mod config;
pub mod error;
pub mod fees;
pub mod keys;
pub mod nonce;
pub mod prelude;
pub mod tx;
pub mod wallet;

#[cfg(test)]
mod test_support;

pub use error::{Result, WalletError};
pub use wallet::{Wallet, WalletBuilder};
