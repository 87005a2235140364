//! # Payment Channels
//!
//! A [`Channel`] is the per-counterparty state machine: which addresses
//! they will pay us on, which addresses we have paid them on, and
//! whether our notification transaction has been committed.
//!
//! ## Address lookahead
//!
//! When a channel is created (because we received a notification, or
//! because the user pasted a payment code to start sending), ten
//! incoming addresses are derived up front and their keys handed to the
//! wallet for watching. Every time one of them is seen in a
//! transaction, it is marked and the window slides: the next index is
//! derived and imported, so at least ten unused addresses always sit
//! past the most recently used one.
//!
//! Index advances never skip. The wallet serializes all mutating calls
//! per channel under its lock; this module just enforces the local
//! invariants (contiguous indices from zero, monotonic status).
//!
//! ## Persistence shape
//!
//! Channels serialize to the sidecar JSON schema with camelCase field
//! names and the long-standing status integer convention (-1 not sent,
//! 1 sent), so existing sidecar files load unchanged. Unknown fields
//! are ignored for forward compatibility.

use secp256k1::{All, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::LOOKAHEAD;
use crate::crypto::ecdh::{self, EcdhError};
use crate::crypto::hd::KeyError;
use crate::identity::account::{Account, AccountError};
use crate::identity::address::Address;
use crate::identity::payment_code::{CodeError, PaymentCode};

/// Errors from channel derivation.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The stored peer payment code failed to parse.
    #[error(transparent)]
    Code(#[from] CodeError),

    /// Account-side derivation failed.
    #[error(transparent)]
    Account(#[from] AccountError),

    /// A private key was required but the account is watch-only.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// ECDH failed for this index; BIP-47 says skip it.
    #[error(transparent)]
    Ecdh(#[from] EcdhError),
}

/// Whether we have announced ourselves to the peer yet. Once sent,
/// a channel never goes back by itself; the reset exists for manual
/// repair after a reorg drops the notification transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum ChannelStatus {
    NotificationNotSent,
    NotificationSent,
}

impl TryFrom<i32> for ChannelStatus {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(ChannelStatus::NotificationNotSent),
            1 => Ok(ChannelStatus::NotificationSent),
            other => Err(format!("unknown channel status {other}")),
        }
    }
}

impl From<ChannelStatus> for i32 {
    fn from(status: ChannelStatus) -> i32 {
        match status {
            ChannelStatus::NotificationNotSent => -1,
            ChannelStatus::NotificationSent => 1,
        }
    }
}

/// One incoming address of a channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAddress {
    pub address: String,
    pub index: u32,
    pub seen: bool,
}

/// A derived key the wallet must start watching.
#[derive(Clone)]
pub struct ImportedKey {
    pub address: Address,
    pub secret: SecretKey,
}

/// Per-counterparty channel state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// The peer's Base58 payment code; the channel map key.
    payment_code: String,
    #[serde(default)]
    label: String,
    /// Addresses the peer will pay us on, contiguous from index 0.
    #[serde(default)]
    incoming_addresses: Vec<ChannelAddress>,
    /// Addresses we have paid the peer on.
    #[serde(default)]
    outgoing_addresses: Vec<String>,
    #[serde(default = "default_status")]
    status: ChannelStatus,
    #[serde(default)]
    current_outgoing_index: u32,
    /// Highest generated incoming index; -1 before the first lookahead.
    #[serde(default = "default_incoming_index")]
    current_incoming_index: i64,
}

fn default_status() -> ChannelStatus {
    ChannelStatus::NotificationNotSent
}

fn default_incoming_index() -> i64 {
    -1
}

impl Channel {
    /// Creates an empty channel for a peer payment code.
    pub fn new(payment_code: &str) -> Self {
        Self::with_label(payment_code, "")
    }

    /// Creates an empty channel with a user-facing label.
    pub fn with_label(payment_code: &str, label: &str) -> Self {
        Self {
            payment_code: payment_code.to_string(),
            label: label.to_string(),
            incoming_addresses: Vec::new(),
            outgoing_addresses: Vec::new(),
            status: ChannelStatus::NotificationNotSent,
            current_outgoing_index: 0,
            current_incoming_index: -1,
        }
    }

    pub fn payment_code(&self) -> &str {
        &self.payment_code
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: &str) {
        self.label = label.to_string();
    }

    pub fn incoming_addresses(&self) -> &[ChannelAddress] {
        &self.incoming_addresses
    }

    pub fn outgoing_addresses(&self) -> &[String] {
        &self.outgoing_addresses
    }

    pub fn current_incoming_index(&self) -> i64 {
        self.current_incoming_index
    }

    pub fn current_outgoing_index(&self) -> u32 {
        self.current_outgoing_index
    }

    pub fn is_notification_sent(&self) -> bool {
        self.status == ChannelStatus::NotificationSent
    }

    /// Records that our notification transaction was committed.
    pub fn set_status_sent(&mut self) {
        self.status = ChannelStatus::NotificationSent;
    }

    /// Manual reset, for when a reorg drops the notification.
    pub fn set_status_not_sent(&mut self) {
        self.status = ChannelStatus::NotificationNotSent;
    }

    /// Finds an incoming address entry by its text form.
    pub fn find_incoming(&self, address: &str) -> Option<&ChannelAddress> {
        self.incoming_addresses.iter().find(|a| a.address == address)
    }

    /// Derives the initial lookahead window of incoming addresses and
    /// returns the keys the wallet must import. No-op on a channel that
    /// already has addresses, so replaying a notification cannot reset
    /// the window.
    pub fn generate_lookahead(
        &mut self,
        secp: &Secp256k1<All>,
        account: &Account,
    ) -> Result<Vec<ImportedKey>, ChannelError> {
        if !self.incoming_addresses.is_empty() {
            return Ok(Vec::new());
        }

        let peer = PaymentCode::decode(&self.payment_code)?;
        let mut imports = Vec::with_capacity(LOOKAHEAD as usize);
        for index in 0..LOOKAHEAD {
            let imported = derive_incoming(secp, account, &peer, index)?;
            debug!(address = %imported.address, index, "new incoming address generated");
            self.incoming_addresses.push(ChannelAddress {
                address: imported.address.to_string(),
                index,
                seen: false,
            });
            imports.push(imported);
        }
        self.current_incoming_index = i64::from(LOOKAHEAD) - 1;
        Ok(imports)
    }

    /// Marks an incoming address as seen and slides the window: the
    /// next index is derived, appended and returned for import.
    ///
    /// Returns `Ok(None)` when the address does not belong to this
    /// channel or was already seen.
    pub fn mark_seen_and_extend(
        &mut self,
        secp: &Secp256k1<All>,
        account: &Account,
        address: &str,
    ) -> Result<Option<ImportedKey>, ChannelError> {
        let Some(entry) = self
            .incoming_addresses
            .iter_mut()
            .find(|a| a.address == address)
        else {
            return Ok(None);
        };
        if entry.seen {
            return Ok(None);
        }
        entry.seen = true;

        let next_index = (self.current_incoming_index + 1) as u32;
        let peer = PaymentCode::decode(&self.payment_code)?;
        let imported = derive_incoming(secp, account, &peer, next_index)?;
        debug!(address = %imported.address, index = next_index, "lookahead extended");
        self.incoming_addresses.push(ChannelAddress {
            address: imported.address.to_string(),
            index: next_index,
            seen: false,
        });
        self.current_incoming_index = i64::from(next_index);
        Ok(Some(imported))
    }

    /// Re-derives the keys for every incoming address already in this
    /// channel. Used at boot to rebuild the wallet's watched keyset
    /// from a loaded sidecar; derivation is deterministic, so the keys
    /// do not need to be persisted.
    pub fn rebuild_imports(
        &self,
        secp: &Secp256k1<All>,
        account: &Account,
    ) -> Result<Vec<ImportedKey>, ChannelError> {
        let peer = PaymentCode::decode(&self.payment_code)?;
        self.incoming_addresses
            .iter()
            .map(|entry| derive_incoming(secp, account, &peer, entry.index))
            .collect()
    }

    /// The address we would pay the peer on next, without committing
    /// the index.
    pub fn outgoing_address_at(
        &self,
        secp: &Secp256k1<All>,
        account: &Account,
        index: u32,
    ) -> Result<Address, ChannelError> {
        let peer = PaymentCode::decode(&self.payment_code)?;
        let our0 = account.key_at(secp, 0)?.secret_key()?;
        let peer_key = peer.derive_pub_key_at(secp, index)?;
        let effective = ecdh::send_public_key(secp, &our0, &peer_key)?;
        Ok(Address::p2pkh(account.params(), &effective))
    }

    /// Derives the next outgoing address, records it and advances the
    /// outgoing index.
    pub fn next_outgoing_address(
        &mut self,
        secp: &Secp256k1<All>,
        account: &Account,
    ) -> Result<Address, ChannelError> {
        let address = self.outgoing_address_at(secp, account, self.current_outgoing_index)?;
        self.outgoing_addresses.push(address.to_string());
        self.current_outgoing_index += 1;
        Ok(address)
    }
}

/// Effective incoming key at `index`: our payment key tweaked by the
/// shared secret with the peer's 0th code key.
fn derive_incoming(
    secp: &Secp256k1<All>,
    account: &Account,
    peer: &PaymentCode,
    index: u32,
) -> Result<ImportedKey, ChannelError> {
    let our_key = account.key_at(secp, index)?.secret_key()?;
    let peer_zero = peer.derive_pub_key_at(secp, 0)?;
    let effective = ecdh::receive_private_key(secp, &our_key, &peer_zero)?;
    let address = Address::p2pkh(account.params(), &PublicKey::from_secret_key(secp, &effective));
    Ok(ImportedKey {
        address,
        secret: effective,
    })
}
