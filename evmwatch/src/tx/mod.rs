//! Transactions across the external-signing boundary.
//!
//! ```text
//! TransactionBuilder ──build──▶ UnsignedTransaction ──signing_hash──▶ device
//!                                        │                              │
//!                                        └──── SignatureReattacher ◀────┘
//!                                                      │
//!                                              SignedTransaction ──▶ broadcast
//! ```
//!
//! [`SigningRequest`] is the wire form handed to the device.

mod builder;
mod payload;
mod signed;
mod unsigned;

pub use builder::TransactionBuilder;
pub use payload::{SigningPayload, SigningRequest, TRANSPORT_SEPARATOR, hex_to_base64, label_frames};
pub use signed::{SIGNATURE_LEN, Signature, SignatureReattacher, SignedTransaction};
pub use unsigned::{FEE_MARKET_TX_TYPE, UnsignedTransaction};
