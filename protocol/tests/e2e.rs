//! End-to-end channel flow: Alice announces herself to Bob, Bob builds
//! his watch window, Alice pays, the window slides, and everything
//! survives a wallet restart. Exercises the public API only, the way an
//! embedding wallet application would.

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use secp256k1::SecretKey;

use paycode_protocol::channel::Channel;
use paycode_protocol::crypto::mnemonic::Seed;
use paycode_protocol::notification::FundingInput;
use paycode_protocol::params::{Network, NetworkParams};
use paycode_protocol::transaction::{script, OutPoint, Transaction, TxOut};
use paycode_protocol::wallet::{
    ChainControl, PeerGroup, Received, SpvError, SpvFactory, SpvStack, Wallet,
};

const ALICE_MNEMONIC: &str =
    "response seminar brave tip suit recall often sound stick owner lottery motion";
const BOB_MNEMONIC: &str =
    "reward upper indicate eight swift arch injury crystal super wrestle already dentist";

const ALICE_CODE: &str =
    "PM8TJTLJbPRGxSbc8EJi42Wrr6QbNSaSSVJ5Y3E4pbCYiTHUskHg13935Ubb7q8tx9GVbh2UuRnBc3WSyJHhUrw8KhprKnn9eDznYGieTzFcwQRya4GA";
const BOB_CODE: &str =
    "PM8TJS2JxQ5ztXUpBBRnpTbcUXbUHy2T1abfrb3KkAAtMEGNbey4oumH7Hc578WgQJhPjBxteQ5GHHToTYHE3A1w6p7tU6KSoFmWBVbFGjKPisZDbP97";

const BOB_NOTIFICATION_ADDRESS: &str = "1ChvUUvht2hUQufHBXF8NgLhW8SwE2ecGV";

const CHANNEL_ADDRESSES: [&str; 10] = [
    "141fi7TY3h936vRUKh1qfUZr8rSBuYbVBK",
    "12u3Uued2fuko2nY4SoSFGCoGLCBUGPkk6",
    "1FsBVhT5dQutGwaPePTYMe5qvYqqjxyftc",
    "1CZAmrbKL6fJ7wUxb99aETwXhcGeG3CpeA",
    "1KQvRShk6NqPfpr4Ehd53XUhpemBXtJPTL",
    "1KsLV2F47JAe6f8RtwzfqhjVa8mZEnTM7t",
    "1DdK9TknVwvBrJe7urqFmaxEtGF2TMWxzD",
    "16DpovNuhQJH7JUSZQFLBQgQYS4QB9Wy8e",
    "17qK2RPGZMDcci2BLQ6Ry2PDGJErrNojT5",
    "1GxfdfP286uE24qLZ9YRP3EWk2urqXgC4s",
];

struct StubChain(Arc<AtomicI64>);

impl ChainControl for StubChain {
    fn last_seen_height(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }

    fn rollback_to(&self, height: i64) -> Result<(), SpvError> {
        self.0.store(height, Ordering::SeqCst);
        Ok(())
    }
}

struct StubPeers;

impl PeerGroup for StubPeers {
    fn start(&self) -> Result<(), SpvError> {
        Ok(())
    }

    fn broadcast(&self, _tx: &Transaction) -> Result<(), SpvError> {
        Ok(())
    }

    fn stop(&self) -> Result<(), SpvError> {
        Ok(())
    }
}

struct StubFactory;

impl SpvFactory for StubFactory {
    fn open(&self, _params: &NetworkParams, chain_file: &Path) -> Result<SpvStack, SpvError> {
        if !chain_file.exists() {
            std::fs::write(chain_file, b"").map_err(|e| SpvError(e.to_string()))?;
        }
        Ok(SpvStack {
            chain: Box::new(StubChain(Arc::new(AtomicI64::new(1000)))),
            peer_group: Box::new(StubPeers),
        })
    }
}

fn open(root: &Path, mnemonic: Option<&str>) -> Wallet {
    let seed = mnemonic.map(|m| Seed::from_mnemonic(m, "").unwrap());
    Wallet::open(
        NetworkParams::for_network(Network::Bitcoin),
        root,
        seed,
        &StubFactory,
    )
    .unwrap()
}

fn funding(vout: u32) -> FundingInput {
    FundingInput {
        outpoint: OutPoint {
            txid: [0xAA; 32],
            vout,
        },
        value: 1_000_000,
        key: SecretKey::from_slice(&[0x33; 32]).unwrap(),
    }
}

#[test]
fn full_channel_flow() {
    let alice_dir = tempfile::tempdir().unwrap();
    let bob_dir = tempfile::tempdir().unwrap();

    let alice = open(alice_dir.path(), Some(ALICE_MNEMONIC));
    let bob = open(bob_dir.path(), Some(BOB_MNEMONIC));

    assert_eq!(alice.payment_code(), ALICE_CODE);
    assert_eq!(bob.payment_code(), BOB_CODE);
    assert_eq!(
        bob.notification_address().to_string(),
        BOB_NOTIFICATION_ADDRESS
    );

    // Alice announces herself to Bob and records the send.
    let ntx = alice
        .make_notification_transaction(BOB_CODE, &funding(0))
        .unwrap();
    alice.put_channel(BOB_CODE, "Bob").unwrap();
    alice.broadcast_transaction(&ntx).unwrap();
    alice.mark_notification_sent(BOB_CODE).unwrap();

    // Bob receives it and builds his watch window.
    assert!(bob.is_notification_transaction(&ntx));
    let received = bob.on_transaction_received(&ntx).unwrap();
    assert_eq!(
        received,
        Received::Notification {
            payment_code: ALICE_CODE.to_string()
        }
    );

    let channel = bob.channel(ALICE_CODE).unwrap();
    let bob_window: Vec<&str> = channel
        .incoming_addresses()
        .iter()
        .map(|a| a.address.as_str())
        .collect();
    assert_eq!(bob_window, CHANNEL_ADDRESSES);

    // Alice derives her outgoing addresses; they are exactly Bob's
    // window, in order.
    for expected in CHANNEL_ADDRESSES.iter().take(3) {
        assert_eq!(alice.next_outgoing_address(BOB_CODE).unwrap(), *expected);
    }

    // One of Alice's payments lands; Bob's window slides.
    let params = NetworkParams::for_network(Network::Bitcoin);
    let paid = paycode_protocol::identity::Address::from_base58(&params, CHANNEL_ADDRESSES[0])
        .unwrap();
    let payment = Transaction {
        version: 1,
        inputs: vec![],
        outputs: vec![TxOut {
            value: 75_000,
            script_pubkey: script::p2pkh_script(paid.hash160()),
        }],
        lock_time: 0,
    };
    let received = bob.on_transaction_received(&payment).unwrap();
    assert_eq!(
        received,
        Received::ChannelPayment {
            payment_code: ALICE_CODE.to_string(),
            address: CHANNEL_ADDRESSES[0].to_string(),
        }
    );
    assert_eq!(bob.channel(ALICE_CODE).unwrap().current_incoming_index(), 10);

    alice.stop();
    bob.stop();

    // Both sides reopen from disk with their state intact.
    let alice = open(alice_dir.path(), None);
    let bob = open(bob_dir.path(), None);

    assert_eq!(alice.mnemonic(), ALICE_MNEMONIC);
    let alice_channel = alice.channel(BOB_CODE).unwrap();
    assert!(alice_channel.is_notification_sent());
    assert_eq!(alice_channel.current_outgoing_index(), 3);
    assert_eq!(alice_channel.label(), "Bob");

    let bob_channel = bob.channel(ALICE_CODE).unwrap();
    assert_eq!(bob_channel.current_incoming_index(), 10);
    assert!(bob_channel.find_incoming(CHANNEL_ADDRESSES[0]).unwrap().seen);
    // The fourth address is still unseen and still watched after reload.
    assert!(bob.watched_key(CHANNEL_ADDRESSES[3]).is_some());
}

#[test]
fn sidecar_roundtrip_preserves_channel_map() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("map.bip47");

    let mut a = Channel::with_label(ALICE_CODE, "Alice");
    a.set_status_sent();
    let b = Channel::new(BOB_CODE);

    paycode_protocol::wallet::sidecar::store(&path, &[&a, &b]).unwrap();
    let loaded = paycode_protocol::wallet::sidecar::load(&path).unwrap();
    assert_eq!(loaded, vec![a, b]);
}
