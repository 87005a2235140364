//! # Transaction Model
//!
//! The minimal transaction and script representation the notification
//! codec works over. Signing, fee estimation beyond the notification
//! policy, and mempool concerns all belong to the embedding wallet
//! framework; what lives here is exactly what is needed to assemble a
//! notification transaction and to pick one apart again: outpoints,
//! inputs, outputs, P2PKH and `OP_RETURN` scripts, and wire
//! serialization for transaction ids.

pub mod script;
pub mod types;

pub use types::{OutPoint, Transaction, TxError, TxIn, TxOut};
