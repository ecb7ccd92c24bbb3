//! The watch-only wallet.
//!
//! # Architecture
//!
//! ```text
//! Wallet (xpub-derived address + ChainClient + nonce tracker)
//!   ├── builder()            → WalletBuilder → build()
//!   ├── sync()               → refresh nonce and balance
//!   ├── prepare_transfer()   → SigningRequest for the device
//!   ├── prepare_token_call() → SigningRequest for ERC-20/721/1155
//!   ├── release()            → give up the prepared transaction's nonce
//!   ├── reattach()           → SignedTransaction, signer checked
//!   ├── broadcast()          → submit and advance the nonce
//!   └── erc20_balances(), nft_owner(), token_metadata(), transaction_history()
//! ```
//!
//! No private key is ever held: signing happens on an external device that
//! receives [`SigningRequest::to_transport_string`](crate::tx::SigningRequest::to_transport_string).
//!
//! # Examples
//!
//! ```rust,ignore
//! use evmwatch::prelude::*;
//!
//! let wallet = Wallet::builder()
//!     .extended_public_key(xpub)
//!     .rpc_url("https://sepolia.infura.io/v3/KEY")
//!     .chain_id(11_155_111)
//!     .build()
//!     .await?;
//!
//! wallet.sync().await?;
//! let request = wallet
//!     .prepare_transfer(to, U256::from(10).pow(U256::from(16)), FeeSource::default())
//!     .await?;
//! ```

mod evm;

pub use evm::{Wallet, WalletBuilder};
