//! # Wallet Coordinator
//!
//! The [`Wallet`] ties everything together for one coin: it owns the
//! seed, the BIP-47 account, the channel map, the sidecar file and the
//! handles into the external SPV stack. Per-coin state lives in a
//! dedicated directory:
//!
//! ```text
//! <root>/<COIN>/<COIN>.wallet     seed record
//! <root>/<COIN>/<COIN>.spvchain   external SPV header store
//! <root>/<COIN>/<COIN>.bip47      channel sidecar (JSON)
//! ```
//!
//! ## Locking
//!
//! One `parking_lot::Mutex` guards all mutable wallet state: the
//! channel map, the watched keyset and the sidecar writes. SPV
//! callbacks arrive on the peer group's threads and take the lock for
//! their whole reaction, so a notification's side effects (channel,
//! lookahead, key import, sidecar write) are complete before the
//! callback returns. Payment transactions later in the same block
//! therefore see the imported keys.
//!
//! ## The rollback dance
//!
//! A notification and the first payments over its channel can share a
//! block. When a block arrives, its transactions are matched against
//! the Bloom filter as it stood *before* the notification imported
//! fresh keys, so those payments would be missed. The first time a
//! valid notification is seen, the wallet rolls the chain back one
//! block and lets it re-download; by then the keys are in place.

use parking_lot::Mutex;
use secp256k1::{All, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::channel::{Channel, ChannelError, ImportedKey};
use crate::config::{
    CHAIN_FILE_EXT, FILTER_EXHAUSTION_NTX_THRESHOLD, SIDECAR_FILE_EXT, WALLET_FILE_EXT,
};
use crate::crypto::mnemonic::{Seed, SeedError};
use crate::identity::account::{Account, AccountError};
use crate::identity::address::Address;
use crate::identity::payment_code::{CodeError, PaymentCode};
use crate::notification::{self, FundingInput, NotificationError};
use crate::params::NetworkParams;
use crate::transaction::{script, Transaction};

pub mod sidecar;
pub mod spv;

pub use sidecar::SidecarError;
pub use spv::{ChainControl, PeerGroup, SpvError, SpvFactory, SpvStack};

/// Errors surfaced by wallet operations.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error(transparent)]
    Seed(#[from] SeedError),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Key(#[from] crate::crypto::hd::KeyError),

    #[error(transparent)]
    Code(#[from] CodeError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Notification(#[from] NotificationError),

    #[error(transparent)]
    Spv(#[from] SpvError),

    #[error(transparent)]
    Sidecar(#[from] SidecarError),

    #[error("wallet io: {0}")]
    Io(#[from] std::io::Error),

    #[error("wallet file: {0}")]
    WalletFile(#[from] serde_json::Error),

    /// An operation referenced a payment code with no channel.
    #[error("no channel for payment code {0}")]
    UnknownChannel(String),
}

/// What an inbound transaction turned out to be.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Received {
    /// A notification transaction; the channel for this code now
    /// exists with a full lookahead window.
    Notification { payment_code: String },
    /// A payment to a channel's incoming address; the window slid.
    ChannelPayment {
        payment_code: String,
        address: String,
    },
    /// Paid us on a non-channel watched address, or not ours at all.
    Unrelated,
}

/// On-disk wallet record. The wallet file format of the embedding
/// framework is opaque to the protocol; this record is the part this
/// crate owns, the seed.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletFileRecord {
    coin: String,
    seed: Seed,
}

struct WalletState {
    channels: BTreeMap<String, Channel>,
    /// Effective channel keys by address text, plus the notification
    /// key. What the Bloom filter watches.
    watched: HashMap<String, SecretKey>,
    /// Notification transactions already reacted to; the rollback must
    /// fire once per transaction, not on every relay.
    notification_txids: HashSet<[u8; 32]>,
    /// Notification count for the block at the given height, feeding
    /// the filter-exhaustion check.
    ntx_block: (i64, u32),
    spv: Option<SpvStack>,
    replay_requested: bool,
}

/// A BIP-47 wallet for one coin, running against an external SPV stack.
pub struct Wallet {
    params: NetworkParams,
    directory: PathBuf,
    secp: Secp256k1<All>,
    seed: Seed,
    account: Account,
    notification_address: Address,
    state: Mutex<WalletState>,
}

impl Wallet {
    /// Opens (or creates) the wallet under `<root>/<COIN>/`.
    ///
    /// Passing a seed means *restore*: the seed is written to the
    /// wallet file and any existing chain file is deleted so the chain
    /// replays from scratch. Passing `None` loads the stored seed, or
    /// generates a fresh one for a brand-new directory.
    pub fn open(
        params: NetworkParams,
        root: &Path,
        restore_seed: Option<Seed>,
        factory: &dyn SpvFactory,
    ) -> Result<Self, WalletError> {
        let secp = Secp256k1::new();
        let directory = root.join(params.coin);
        fs::create_dir_all(&directory)?;

        let wallet_file = file_in(&directory, params.coin, WALLET_FILE_EXT);
        let chain_file = file_in(&directory, params.coin, CHAIN_FILE_EXT);
        let sidecar_file = file_in(&directory, params.coin, SIDECAR_FILE_EXT);

        let wallet_existed = wallet_file.exists();
        let chain_existed = chain_file.exists();
        let restoring = restore_seed.is_some();

        let seed = match restore_seed {
            Some(seed) => seed,
            None if wallet_existed => {
                let raw = fs::read_to_string(&wallet_file)?;
                let record: WalletFileRecord = serde_json::from_str(&raw)?;
                record.seed
            }
            None => {
                info!(coin = params.coin, "creating fresh wallet seed");
                Seed::generate()
            }
        };

        // A wallet whose chain file vanished, or an explicit restore,
        // must replay the chain to rediscover its transactions.
        let replay_requested = (wallet_existed && !chain_existed) || restoring;
        if restoring && chain_existed {
            info!(coin = params.coin, "deleting chain file in preparation for restore");
            fs::remove_file(&chain_file)?;
        }

        let account = Account::from_seed(&secp, params.clone(), seed.bytes(), 0)?;
        let notification_address = account.notification_address(&secp)?;
        debug!(coin = params.coin, address = %notification_address, "wallet notification address");

        let spv = factory.open(&params, &chain_file)?;

        let wallet = Self {
            params,
            directory,
            secp,
            seed,
            account,
            notification_address,
            state: Mutex::new(WalletState {
                channels: BTreeMap::new(),
                watched: HashMap::new(),
                notification_txids: HashSet::new(),
                ntx_block: (-1, 0),
                spv: Some(spv),
                replay_requested,
            }),
        };

        {
            let mut state = wallet.state.lock();

            // The notification key is always watched.
            let notification_key = wallet
                .account
                .notification_key(&wallet.secp)?
                .secret_key()?;
            state
                .watched
                .insert(wallet.notification_address.to_string(), notification_key);

            // Sidecar errors leave the channel map empty; losing labels
            // and indexes is recoverable, failing to boot is not.
            let channels = match sidecar::load(&sidecar_file) {
                Ok(channels) => channels,
                Err(e) => {
                    warn!(error = %e, "could not load sidecar, starting with empty channel map");
                    Vec::new()
                }
            };
            for channel in channels {
                for imported in channel.rebuild_imports(&wallet.secp, &wallet.account)? {
                    state
                        .watched
                        .insert(imported.address.to_string(), imported.secret);
                }
                state
                    .channels
                    .insert(channel.payment_code().to_string(), channel);
            }
        }

        wallet.save_wallet_file()?;
        Ok(wallet)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    pub fn coin(&self) -> &'static str {
        self.params.coin
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Our own payment code, the thing to hand to counterparties.
    pub fn payment_code(&self) -> String {
        self.account.payment_code_string()
    }

    /// The backup mnemonic.
    pub fn mnemonic(&self) -> &str {
        self.seed.mnemonic()
    }

    pub fn notification_address(&self) -> &Address {
        &self.notification_address
    }

    /// Whether the chain must be replayed from scratch (restore, or a
    /// lost chain file). The embedder checks this before starting the
    /// blockchain download.
    pub fn needs_replay(&self) -> bool {
        self.state.lock().replay_requested
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().spv.is_some()
    }

    /// Snapshot of all channels.
    pub fn channels(&self) -> Vec<Channel> {
        self.state.lock().channels.values().cloned().collect()
    }

    /// Snapshot of one channel.
    pub fn channel(&self, payment_code: &str) -> Option<Channel> {
        self.state.lock().channels.get(payment_code).cloned()
    }

    fn wallet_file(&self) -> PathBuf {
        file_in(&self.directory, self.params.coin, WALLET_FILE_EXT)
    }

    fn sidecar_file(&self) -> PathBuf {
        file_in(&self.directory, self.params.coin, SIDECAR_FILE_EXT)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Starts peer connections and the header download.
    pub fn start(&self) -> Result<(), WalletError> {
        let state = self.state.lock();
        if let Some(spv) = &state.spv {
            debug!(coin = self.params.coin, "starting blockchain download");
            spv.peer_group.start()?;
        }
        Ok(())
    }

    /// Stops the peer group, saves the wallet file and releases the
    /// SPV handles. Idempotent; after it returns no callbacks fire.
    pub fn stop(&self) {
        let stack = {
            let mut state = self.state.lock();
            state.spv.take()
        };
        let Some(stack) = stack else {
            return;
        };

        debug!(coin = self.params.coin, "stopping peer group");
        if let Err(e) = stack.peer_group.stop() {
            error!(error = %e, "peer group did not stop cleanly");
        }
        if let Err(e) = self.save_wallet_file() {
            error!(error = %e, "failed to save wallet file on stop");
        }
        // Dropping the stack closes the header store.
        drop(stack);
        debug!(coin = self.params.coin, "wallet stopped");
    }

    // -----------------------------------------------------------------------
    // Inbound transactions
    // -----------------------------------------------------------------------

    /// Reacts to a transaction the SPV layer delivered, whether from a
    /// block or the mempool. All side effects (channel creation,
    /// lookahead, key imports, sidecar write) complete before this
    /// returns.
    pub fn on_transaction_received(&self, tx: &Transaction) -> Result<Received, WalletError> {
        let mut state = self.state.lock();

        let Some(address) = self.address_of_received(tx, &state) else {
            return Ok(Received::Unrelated);
        };

        if address == self.notification_address.to_string() {
            return self.handle_notification(tx, &mut state);
        }

        // A payment into one of the channel windows?
        let mut hit: Option<(String, Option<ImportedKey>)> = None;
        for channel in state.channels.values_mut() {
            if channel.find_incoming(&address).is_some() {
                let imported =
                    channel.mark_seen_and_extend(&self.secp, &self.account, &address)?;
                hit = Some((channel.payment_code().to_string(), imported));
                break;
            }
        }
        if let Some((code, imported)) = hit {
            if let Some(imported) = imported {
                state
                    .watched
                    .insert(imported.address.to_string(), imported.secret);
                self.persist(&state)?;
            }
            return Ok(Received::ChannelPayment {
                payment_code: code,
                address,
            });
        }

        Ok(Received::Unrelated)
    }

    fn handle_notification(
        &self,
        tx: &Transaction,
        state: &mut WalletState,
    ) -> Result<Received, WalletError> {
        let notification_key = self.account.notification_key(&self.secp)?.secret_key()?;
        let code = notification::parse_notification(&self.secp, &notification_key, tx)?;
        let code_text = code.to_string();

        let txid = tx.txid();
        let first_sighting = state.notification_txids.insert(txid);
        if first_sighting {
            info!(code = %code_text, "valid notification transaction found for the first time");

            // Track notifications per block for filter exhaustion.
            let height = state
                .spv
                .as_ref()
                .map(|spv| spv.chain.last_seen_height())
                .unwrap_or(-1);
            if state.ntx_block.0 == height {
                state.ntx_block.1 += 1;
            } else {
                state.ntx_block = (height, 1);
            }

            // Replay one block so payments sharing the block with this
            // notification are matched against the updated filter.
            if let Some(spv) = &state.spv {
                let rollback_to = spv.chain.last_seen_height() - 1;
                if rollback_to >= 0 {
                    debug!(height = rollback_to, "replaying a block back");
                    if let Err(e) = spv.chain.rollback_to(rollback_to) {
                        error!(error = %e, "could not rollback block store");
                    }
                }
            }
        }

        let channel = state
            .channels
            .entry(code_text.clone())
            .or_insert_with(|| Channel::new(&code_text));
        let imports = channel.generate_lookahead(&self.secp, &self.account)?;
        for imported in imports {
            state
                .watched
                .insert(imported.address.to_string(), imported.secret);
        }
        self.persist(state)?;

        Ok(Received::Notification {
            payment_code: code_text,
        })
    }

    /// Whether any output pays our notification address.
    pub fn is_notification_transaction(&self, tx: &Transaction) -> bool {
        notification::is_notification_transaction(tx, &self.notification_address)
    }

    /// Whether any output pays a watched channel address.
    pub fn is_to_channel_address(&self, tx: &Transaction) -> bool {
        let state = self.state.lock();
        self.address_of_received(tx, &state)
            .map(|addr| addr != self.notification_address.to_string())
            .unwrap_or(false)
    }

    /// The block at the current height accumulated enough notification
    /// transactions that the external Bloom filter should be rebuilt.
    pub fn filter_exhausted(&self) -> bool {
        self.state.lock().ntx_block.1 >= FILTER_EXHAUSTION_NTX_THRESHOLD
    }

    /// First watched output address of `tx`, if any.
    fn address_of_received(&self, tx: &Transaction, state: &WalletState) -> Option<String> {
        tx.outputs.iter().find_map(|out| {
            let hash = script::p2pkh_destination(&out.script_pubkey)?;
            let address = Address::from_hash160(&self.params, hash).to_string();
            state.watched.contains_key(&address).then_some(address)
        })
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Builds the notification transaction announcing us to `peer_code`,
    /// spending the given funding input. The transaction still needs
    /// external signing before broadcast.
    pub fn make_notification_transaction(
        &self,
        peer_code: &str,
        funding: &FundingInput,
    ) -> Result<Transaction, WalletError> {
        let peer = PaymentCode::decode(peer_code)?;
        let tx = notification::build_notification_transaction(
            &self.secp,
            &self.account,
            &peer,
            funding,
            &self.params,
        )?;
        Ok(tx)
    }

    /// Hands a signed transaction to the peer group.
    pub fn broadcast_transaction(&self, tx: &Transaction) -> Result<(), WalletError> {
        let state = self.state.lock();
        let spv = state
            .spv
            .as_ref()
            .ok_or_else(|| SpvError("wallet is stopped".into()))?;
        spv.peer_group.broadcast(tx)?;
        Ok(())
    }

    /// Creates or relabels the channel for a peer payment code.
    /// Returns whether anything changed.
    pub fn put_channel(&self, peer_code: &str, label: &str) -> Result<bool, WalletError> {
        use std::collections::btree_map::Entry;

        let mut state = self.state.lock();
        let changed = match state.channels.entry(peer_code.to_string()) {
            Entry::Occupied(mut entry) => {
                let channel = entry.get_mut();
                if channel.label() == label {
                    false
                } else {
                    channel.set_label(label);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Channel::with_label(peer_code, label));
                true
            }
        };
        if changed {
            self.persist(&state)?;
        }
        Ok(changed)
    }

    /// Marks the channel's notification as sent, creating the channel
    /// if needed. Called once the notification transaction commits.
    pub fn mark_notification_sent(&self, peer_code: &str) -> Result<(), WalletError> {
        let mut state = self.state.lock();
        state
            .channels
            .entry(peer_code.to_string())
            .or_insert_with(|| Channel::new(peer_code))
            .set_status_sent();
        self.persist(&state)?;
        Ok(())
    }

    /// Next address for paying this peer; advances and persists the
    /// outgoing index.
    pub fn next_outgoing_address(&self, peer_code: &str) -> Result<String, WalletError> {
        let mut state = self.state.lock();
        let channel = state
            .channels
            .get_mut(peer_code)
            .ok_or_else(|| WalletError::UnknownChannel(peer_code.to_string()))?;
        let address = channel.next_outgoing_address(&self.secp, &self.account)?;
        self.persist(&state)?;
        Ok(address.to_string())
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    /// The channel owning an incoming address.
    pub fn channel_for_incoming_address(&self, address: &str) -> Option<Channel> {
        let state = self.state.lock();
        state
            .channels
            .values()
            .find(|c| c.find_incoming(address).is_some())
            .cloned()
    }

    /// The peer payment code owning an incoming address.
    pub fn payment_code_for_address(&self, address: &str) -> Option<String> {
        self.channel_for_incoming_address(address)
            .map(|c| c.payment_code().to_string())
    }

    /// The channel that was paid on an outgoing address.
    pub fn channel_for_outgoing_address(&self, address: &str) -> Option<Channel> {
        let state = self.state.lock();
        state
            .channels
            .values()
            .find(|c| c.outgoing_addresses().iter().any(|a| a == address))
            .cloned()
    }

    /// The private key of a watched address, if we hold one.
    pub fn watched_key(&self, address: &str) -> Option<SecretKey> {
        self.state.lock().watched.get(address).copied()
    }

    /// All watched addresses, channel windows plus the notification
    /// address. What the embedder puts in its Bloom filter.
    pub fn watched_addresses(&self) -> Vec<String> {
        self.state.lock().watched.keys().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Writes the sidecar and the wallet file. Callers hold the lock.
    fn persist(&self, state: &WalletState) -> Result<(), WalletError> {
        let channels: Vec<&Channel> = state.channels.values().collect();
        sidecar::store(&self.sidecar_file(), &channels)?;
        self.save_wallet_file()?;
        Ok(())
    }

    fn save_wallet_file(&self) -> Result<(), WalletError> {
        let record = WalletFileRecord {
            coin: self.params.coin.to_string(),
            seed: self.seed.clone(),
        };
        let json = serde_json::to_string_pretty(&record)?;

        let path = self.wallet_file();
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl Drop for Wallet {
    fn drop(&mut self) {
        // Last-chance shutdown for wallets the embedder forgot to stop.
        self.stop();
    }
}

fn file_in(directory: &Path, coin: &str, ext: &str) -> PathBuf {
    directory.join(format!("{coin}.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Network;
    use crate::transaction::{OutPoint, TxOut};
    use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
    use std::sync::Arc;

    const ALICE_MNEMONIC: &str =
        "response seminar brave tip suit recall often sound stick owner lottery motion";
    const BOB_MNEMONIC: &str =
        "reward upper indicate eight swift arch injury crystal super wrestle already dentist";
    const ALICE_CODE: &str =
        "PM8TJTLJbPRGxSbc8EJi42Wrr6QbNSaSSVJ5Y3E4pbCYiTHUskHg13935Ubb7q8tx9GVbh2UuRnBc3WSyJHhUrw8KhprKnn9eDznYGieTzFcwQRya4GA";
    const BOB_CODE: &str =
        "PM8TJS2JxQ5ztXUpBBRnpTbcUXbUHy2T1abfrb3KkAAtMEGNbey4oumH7Hc578WgQJhPjBxteQ5GHHToTYHE3A1w6p7tU6KSoFmWBVbFGjKPisZDbP97";
    const FIRST_CHANNEL_ADDRESS: &str = "141fi7TY3h936vRUKh1qfUZr8rSBuYbVBK";

    /// Shared call log behind the mock SPV handles.
    #[derive(Default)]
    struct SpvLog {
        height: AtomicI64,
        rollbacks: Mutex<Vec<i64>>,
        broadcasts: AtomicU32,
        starts: AtomicU32,
        stops: AtomicU32,
    }

    struct MockChain(Arc<SpvLog>);

    impl ChainControl for MockChain {
        fn last_seen_height(&self) -> i64 {
            self.0.height.load(Ordering::SeqCst)
        }

        fn rollback_to(&self, height: i64) -> Result<(), SpvError> {
            self.0.rollbacks.lock().push(height);
            Ok(())
        }
    }

    struct MockPeers(Arc<SpvLog>);

    impl PeerGroup for MockPeers {
        fn start(&self) -> Result<(), SpvError> {
            self.0.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn broadcast(&self, _tx: &Transaction) -> Result<(), SpvError> {
            self.0.broadcasts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&self) -> Result<(), SpvError> {
            self.0.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct MockFactory(Arc<SpvLog>);

    impl SpvFactory for MockFactory {
        fn open(&self, _params: &NetworkParams, chain_file: &Path) -> Result<SpvStack, SpvError> {
            // A real header store creates its file on open.
            if !chain_file.exists() {
                fs::write(chain_file, b"").map_err(|e| SpvError(e.to_string()))?;
            }
            Ok(SpvStack {
                chain: Box::new(MockChain(self.0.clone())),
                peer_group: Box::new(MockPeers(self.0.clone())),
            })
        }
    }

    fn open_wallet(
        root: &Path,
        mnemonic: Option<&str>,
    ) -> (Wallet, Arc<SpvLog>) {
        let log = Arc::new(SpvLog::default());
        let seed = mnemonic.map(|m| Seed::from_mnemonic(m, "").unwrap());
        let wallet = Wallet::open(
            NetworkParams::for_network(Network::Bitcoin),
            root,
            seed,
            &MockFactory(log.clone()),
        )
        .unwrap();
        (wallet, log)
    }

    fn alice_notification_to_bob(root: &Path) -> Transaction {
        let (alice, _) = open_wallet(root, Some(ALICE_MNEMONIC));
        let funding = FundingInput {
            outpoint: OutPoint {
                txid: [0x55; 32],
                vout: 0,
            },
            value: 1_000_000,
            key: SecretKey::from_slice(&[0x11; 32]).unwrap(),
        };
        alice.make_notification_transaction(BOB_CODE, &funding).unwrap()
    }

    #[test]
    fn open_creates_wallet_file_and_watches_notification_address() {
        let dir = tempfile::tempdir().unwrap();
        let (wallet, _) = open_wallet(dir.path(), Some(ALICE_MNEMONIC));

        assert!(dir.path().join("BTC/BTC.wallet").exists());
        assert_eq!(wallet.payment_code(), ALICE_CODE);
        assert_eq!(wallet.mnemonic(), ALICE_MNEMONIC);
        assert!(wallet
            .watched_addresses()
            .contains(&wallet.notification_address().to_string()));
    }

    #[test]
    fn fresh_wallet_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let (first_code, first_mnemonic) = {
            let (wallet, _) = open_wallet(dir.path(), None);
            let out = (wallet.payment_code(), wallet.mnemonic().to_string());
            wallet.stop();
            out
        };

        // Reopen with no seed: the stored one must come back.
        let (reopened, _) = open_wallet(dir.path(), None);
        assert_eq!(reopened.payment_code(), first_code);
        assert_eq!(reopened.mnemonic(), first_mnemonic);
        assert!(!reopened.needs_replay());
    }

    #[test]
    fn restore_deletes_chain_file_and_requests_replay() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (wallet, _) = open_wallet(dir.path(), None);
            wallet.stop();
        }
        let chain_file = dir.path().join("BTC/BTC.spvchain");
        fs::write(&chain_file, b"stale headers").unwrap();

        let (wallet, _) = open_wallet(dir.path(), Some(BOB_MNEMONIC));
        // The stale store was deleted before the factory opened a fresh one.
        assert_ne!(fs::read(&chain_file).unwrap(), b"stale headers".to_vec());
        assert!(wallet.needs_replay());
        assert_eq!(
            wallet.payment_code(),
            BOB_CODE,
            "restore seed must replace the stored one"
        );
    }

    #[test]
    fn missing_chain_file_requests_replay() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (wallet, _) = open_wallet(dir.path(), None);
            wallet.stop();
        }
        // A wallet file without its chain file must replay.
        fs::remove_file(dir.path().join("BTC/BTC.spvchain")).unwrap();
        let (wallet, _) = open_wallet(dir.path(), None);
        assert!(wallet.needs_replay());
    }

    #[test]
    fn notification_creates_channel_and_rolls_back_once() {
        let alice_dir = tempfile::tempdir().unwrap();
        let bob_dir = tempfile::tempdir().unwrap();
        let ntx = alice_notification_to_bob(alice_dir.path());

        let (bob, log) = open_wallet(bob_dir.path(), Some(BOB_MNEMONIC));
        log.height.store(100, Ordering::SeqCst);

        assert!(bob.is_notification_transaction(&ntx));
        let received = bob.on_transaction_received(&ntx).unwrap();
        assert_eq!(
            received,
            Received::Notification {
                payment_code: ALICE_CODE.to_string()
            }
        );

        let channel = bob.channel(ALICE_CODE).unwrap();
        assert_eq!(channel.incoming_addresses().len(), 10);
        assert_eq!(channel.current_incoming_index(), 9);
        assert!(bob.watched_addresses().contains(&FIRST_CHANNEL_ADDRESS.to_string()));
        assert_eq!(*log.rollbacks.lock(), vec![99]);

        // The sidecar was written.
        let stored = sidecar::load(&bob_dir.path().join("BTC/BTC.bip47")).unwrap();
        assert_eq!(stored.len(), 1);

        // A relay of the same transaction does not roll back again.
        bob.on_transaction_received(&ntx).unwrap();
        assert_eq!(log.rollbacks.lock().len(), 1);
    }

    #[test]
    fn channel_state_survives_reopen_with_watched_keys() {
        let alice_dir = tempfile::tempdir().unwrap();
        let bob_dir = tempfile::tempdir().unwrap();
        let ntx = alice_notification_to_bob(alice_dir.path());

        {
            let (bob, _) = open_wallet(bob_dir.path(), Some(BOB_MNEMONIC));
            bob.on_transaction_received(&ntx).unwrap();
            bob.stop();
        }

        let (bob, _) = open_wallet(bob_dir.path(), None);
        let channel = bob.channel(ALICE_CODE).unwrap();
        assert_eq!(channel.incoming_addresses().len(), 10);
        // The effective keys were re-derived, not just the addresses.
        assert!(bob.watched_key(FIRST_CHANNEL_ADDRESS).is_some());
    }

    #[test]
    fn payment_to_channel_address_slides_window() {
        let alice_dir = tempfile::tempdir().unwrap();
        let bob_dir = tempfile::tempdir().unwrap();
        let ntx = alice_notification_to_bob(alice_dir.path());

        let (bob, _) = open_wallet(bob_dir.path(), Some(BOB_MNEMONIC));
        bob.on_transaction_received(&ntx).unwrap();

        let params = NetworkParams::for_network(Network::Bitcoin);
        let target = Address::from_base58(&params, FIRST_CHANNEL_ADDRESS).unwrap();
        let payment = Transaction {
            version: 1,
            inputs: vec![],
            outputs: vec![TxOut {
                value: 50_000,
                script_pubkey: script::p2pkh_script(target.hash160()),
            }],
            lock_time: 0,
        };

        assert!(bob.is_to_channel_address(&payment));
        let received = bob.on_transaction_received(&payment).unwrap();
        assert_eq!(
            received,
            Received::ChannelPayment {
                payment_code: ALICE_CODE.to_string(),
                address: FIRST_CHANNEL_ADDRESS.to_string(),
            }
        );

        let channel = bob.channel(ALICE_CODE).unwrap();
        assert_eq!(channel.current_incoming_index(), 10);
        assert!(channel.find_incoming(FIRST_CHANNEL_ADDRESS).unwrap().seen);
        assert_eq!(
            bob.payment_code_for_address(FIRST_CHANNEL_ADDRESS),
            Some(ALICE_CODE.to_string())
        );
    }

    #[test]
    fn five_notifications_in_one_block_exhaust_the_filter() {
        let alice_dir = tempfile::tempdir().unwrap();
        let bob_dir = tempfile::tempdir().unwrap();
        let (alice, _) = open_wallet(alice_dir.path(), Some(ALICE_MNEMONIC));
        let (bob, log) = open_wallet(bob_dir.path(), Some(BOB_MNEMONIC));
        log.height.store(500, Ordering::SeqCst);

        for vout in 0..5u32 {
            let funding = FundingInput {
                outpoint: OutPoint {
                    txid: [0x66; 32],
                    vout,
                },
                value: 1_000_000,
                key: SecretKey::from_slice(&[0x11; 32]).unwrap(),
            };
            let ntx = alice.make_notification_transaction(BOB_CODE, &funding).unwrap();
            bob.on_transaction_received(&ntx).unwrap();
            if vout < 4 {
                assert!(!bob.filter_exhausted());
            }
        }
        assert!(bob.filter_exhausted());
    }

    #[test]
    fn outgoing_flow_marks_status_and_advances_index() {
        let dir = tempfile::tempdir().unwrap();
        let (alice, log) = open_wallet(dir.path(), Some(ALICE_MNEMONIC));

        assert!(alice.put_channel(BOB_CODE, "Bob").unwrap());
        // Same label again is a no-op.
        assert!(!alice.put_channel(BOB_CODE, "Bob").unwrap());

        let first = alice.next_outgoing_address(BOB_CODE).unwrap();
        assert_eq!(first, FIRST_CHANNEL_ADDRESS);
        assert_eq!(
            alice
                .channel_for_outgoing_address(&first)
                .unwrap()
                .payment_code(),
            BOB_CODE
        );

        let funding = FundingInput {
            outpoint: OutPoint {
                txid: [0x77; 32],
                vout: 1,
            },
            value: 1_000_000,
            key: SecretKey::from_slice(&[0x22; 32]).unwrap(),
        };
        let ntx = alice.make_notification_transaction(BOB_CODE, &funding).unwrap();
        alice.broadcast_transaction(&ntx).unwrap();
        assert_eq!(log.broadcasts.load(Ordering::SeqCst), 1);

        alice.mark_notification_sent(BOB_CODE).unwrap();
        assert!(alice.channel(BOB_CODE).unwrap().is_notification_sent());
    }

    #[test]
    fn unknown_channel_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (alice, _) = open_wallet(dir.path(), Some(ALICE_MNEMONIC));
        assert!(matches!(
            alice.next_outgoing_address(BOB_CODE),
            Err(WalletError::UnknownChannel(_))
        ));
    }

    #[test]
    fn stop_is_idempotent_and_stops_peers() {
        let dir = tempfile::tempdir().unwrap();
        let (wallet, log) = open_wallet(dir.path(), Some(ALICE_MNEMONIC));
        wallet.start().unwrap();
        assert!(wallet.is_started());

        wallet.stop();
        wallet.stop();
        assert!(!wallet.is_started());
        assert_eq!(log.starts.load(Ordering::SeqCst), 1);
        assert_eq!(log.stops.load(Ordering::SeqCst), 1);

        // Stopped wallets refuse broadcast.
        let funding_tx = Transaction {
            version: 1,
            inputs: vec![],
            outputs: vec![],
            lock_time: 0,
        };
        assert!(wallet.broadcast_transaction(&funding_tx).is_err());
    }
}
