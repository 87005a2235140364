//! # SPV Collaborator Interfaces
//!
//! The header store, block chain and peer group are external
//! subsystems; this crate only declares what it needs from them. An
//! embedding wallet framework implements these traits over its own SPV
//! machinery and hands the wallet an [`SpvStack`] at boot.
//!
//! Implementations are expected to be scoped handles: whatever
//! resources they hold (store files, sockets) must be released when the
//! stack is dropped. The wallet drops its stack in `stop()` and keeps
//! no other path to the resources, so release-on-drop is the whole
//! shutdown story.

use std::path::Path;
use thiserror::Error;

use crate::params::NetworkParams;
use crate::transaction::Transaction;

/// A failure inside the external SPV machinery.
#[derive(Debug, Error)]
#[error("spv: {0}")]
pub struct SpvError(pub String);

/// Control surface of the header chain.
pub trait ChainControl: Send {
    /// Height of the best block this wallet has processed, -1 before
    /// any block arrives.
    fn last_seen_height(&self) -> i64;

    /// Rolls the header store back so blocks above `height` are
    /// downloaded and processed again.
    fn rollback_to(&self, height: i64) -> Result<(), SpvError>;
}

/// Control surface of the peer group.
pub trait PeerGroup: Send {
    /// Starts peer connections and header download.
    fn start(&self) -> Result<(), SpvError>;

    /// Hands a transaction to peers for broadcast.
    fn broadcast(&self, tx: &Transaction) -> Result<(), SpvError>;

    /// Stops peer connections. Called once from `Wallet::stop`.
    fn stop(&self) -> Result<(), SpvError>;
}

/// The pair of handles a wallet drives.
pub struct SpvStack {
    pub chain: Box<dyn ChainControl>,
    pub peer_group: Box<dyn PeerGroup>,
}

/// Opens the SPV stack over a chain file. Implemented by the embedding
/// framework; called once during wallet boot, after any restore has
/// deleted a stale chain file.
pub trait SpvFactory {
    fn open(&self, params: &NetworkParams, chain_file: &Path) -> Result<SpvStack, SpvError>;
}
