//! # Network Parameters
//!
//! Chain constants for the four supported networks: Bitcoin and Bitcoin
//! Cash, mainnet and testnet3 each. Unlike the classic inheritance-heavy
//! designs, parameters here are a plain immutable value: construct one
//! with [`NetworkParams::for_network`] and pass it around by reference.
//! No process-wide singletons, and tests never need a global.
//!
//! The set of chains is closed, so per-chain behavior differences
//! (fork-id signing, CashAddr prefixes, the DAA activation height) are
//! plain data on the struct rather than virtual methods.

pub mod daa;
pub(crate) mod u256;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Target seconds between blocks, shared by all four chains.
pub const TARGET_SPACING: u32 = 600;

/// Blocks per classic retarget interval (two weeks of target spacing).
pub const INTERVAL: u32 = 2016;

/// Seconds per classic retarget interval.
pub const TARGET_TIMESPAN: u32 = INTERVAL * TARGET_SPACING;

/// The compact-bits form of the proof-of-work limit on all four chains.
pub const MAX_TARGET_BITS: u32 = 0x1d00_ffff;

/// The four supported chains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
    /// Bitcoin mainnet ("BTC").
    Bitcoin,
    /// Bitcoin testnet3 ("tBTC").
    BitcoinTestnet,
    /// Bitcoin Cash mainnet ("BCH").
    BitcoinCash,
    /// Bitcoin Cash testnet3 ("tBCH").
    BitcoinCashTestnet,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(NetworkParams::for_network(*self).coin)
    }
}

/// Immutable constants for one chain.
///
/// Everything a wallet, the address codec or the difficulty validator
/// needs to know about a network, in one value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkParams {
    /// Which chain this is.
    pub network: Network,
    /// Short coin identifier used in file names: BTC, tBTC, BCH, tBCH.
    pub coin: &'static str,
    /// Registered BIP-44 coin type. Carried as metadata; the BIP-47
    /// account derivation uses coin type 0 on every chain for
    /// compatibility with existing wallets.
    pub bip44_coin_type: u32,
    /// First four bytes of every P2P message on this chain.
    pub packet_magic: u32,
    /// Default P2P port.
    pub port: u16,
    /// Version byte of legacy P2PKH addresses.
    pub address_header: u8,
    /// Version byte of legacy P2SH addresses.
    pub p2sh_header: u8,
    /// Version byte of WIF-dumped private keys.
    pub dumped_private_key_header: u8,
    /// BIP-32 serialization bytes for extended public keys ("xpub"/"tpub").
    pub bip32_header_pub: u32,
    /// BIP-32 serialization bytes for extended private keys ("xprv"/"tprv").
    pub bip32_header_priv: u32,
    /// Hex hash of the genesis block.
    pub genesis_hash: &'static str,
    /// DNS seeds for peer discovery.
    pub dns_seeds: &'static [&'static str],
    /// Known-good block hashes by height, for fast sync validation.
    pub checkpoints: &'static [(u32, &'static str)],
    /// Height at which the Bitcoin Cash difficulty adjustment algorithm
    /// activates. `None` on chains that never switch.
    pub daa_activation_height: Option<u32>,
    /// Whether the 20-minute minimum-difficulty rule applies (testnets).
    pub allow_min_difficulty: bool,
    /// Whether transactions sign with the Bitcoin Cash fork-id flag.
    pub use_fork_id: bool,
    /// Payment URI scheme.
    pub uri_scheme: &'static str,
    /// CashAddr human-readable prefix, on Bitcoin Cash chains only.
    pub cash_addr_prefix: Option<&'static str>,
    /// Smallest output value relay policy treats as non-dust, satoshis.
    pub min_non_dust_output: u64,
    /// Consensus maximum block size in bytes.
    pub max_block_size: u32,
}

const MAINNET_GENESIS: &str =
    "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f";
const TESTNET_GENESIS: &str =
    "000000000933ea01ad0ee984209779baaec3ced90fa3f408719526f8d77f4943";

/// Checkpoints shared by both mainnet chains up to the fork point.
/// The first four are the non-BIP30-compliant blocks.
const MAINNET_CHECKPOINTS: &[(u32, &str)] = &[
    (91_722, "00000000000271a2dc26e7667f8419f2e15416dc6955e5a6c6cdf3f2574dd08e"),
    (91_812, "00000000000af0aed4792b1acee3d966af36cf5def14935db8de83d6f9306f2f"),
    (91_842, "00000000000a4d0a398161ffc163c503763b1f4360639393e0e4c8e300e0caec"),
    (91_880, "00000000000743f190a18c5577a3c2d2a1f610ae9601ac046a38084ccb7cd721"),
    (200_000, "000000000000034a7dedef4a161fa058a2d67a173a90155f3a2fe6fc132e0ebf"),
];

const BCH_MAINNET_CHECKPOINTS: &[(u32, &str)] = &[
    (91_722, "00000000000271a2dc26e7667f8419f2e15416dc6955e5a6c6cdf3f2574dd08e"),
    (91_812, "00000000000af0aed4792b1acee3d966af36cf5def14935db8de83d6f9306f2f"),
    (91_842, "00000000000a4d0a398161ffc163c503763b1f4360639393e0e4c8e300e0caec"),
    (91_880, "00000000000743f190a18c5577a3c2d2a1f610ae9601ac046a38084ccb7cd721"),
    (200_000, "000000000000034a7dedef4a161fa058a2d67a173a90155f3a2fe6fc132e0ebf"),
    // August 1st 2017 UAHF fork block.
    (478_559, "000000000000000000651ef99cb9fcbe0dadde1d424bd9f15ff20136191a5eec"),
    // November 13th 2017 new DAA fork.
    (504_031, "0000000000000000011ebf65b60d0a3de80b8175be709d653b4c1a1beeb6ab9c"),
    // May 15th 2018 re-enabled opcodes and 32 MB blocks.
    (530_359, "0000000000000000011ada8bd08f46074f44a8f155396f43e38acf9501c49103"),
    // November 15th 2018 LTOR and DSV.
    (556_767, "0000000000000000004626ff6e3b936941d341c5932ece4357eeccac44e6d56c"),
    // May 15th 2019 Schnorr and segwit recovery.
    (582_680, "000000000000000001b4b8e36aec7d4f9671a47872cb9a74dc16ca398c7dcc18"),
];

impl NetworkParams {
    /// Returns the parameter set for a chain.
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Bitcoin => Self {
                network,
                coin: "BTC",
                bip44_coin_type: 0,
                packet_magic: 0xf9be_b4d9,
                port: 8333,
                address_header: 0,
                p2sh_header: 5,
                dumped_private_key_header: 128,
                bip32_header_pub: 0x0488_B21E,
                bip32_header_priv: 0x0488_ADE4,
                genesis_hash: MAINNET_GENESIS,
                dns_seeds: &[
                    "seed.bitcoin.sipa.be",
                    "dnsseed.bluematt.me",
                    "dnsseed.bitcoin.dashjr.org",
                    "seed.bitcoinstats.com",
                    "seed.bitcoin.jonasschnelli.ch",
                    "seed.btc.petertodd.org",
                ],
                checkpoints: MAINNET_CHECKPOINTS,
                daa_activation_height: None,
                allow_min_difficulty: false,
                use_fork_id: false,
                uri_scheme: "bitcoin",
                cash_addr_prefix: None,
                min_non_dust_output: 546,
                max_block_size: 1_000_000,
            },
            Network::BitcoinTestnet => Self {
                network,
                coin: "tBTC",
                bip44_coin_type: 1,
                packet_magic: 0x0b11_0907,
                port: 18333,
                address_header: 111,
                p2sh_header: 196,
                dumped_private_key_header: 239,
                bip32_header_pub: 0x0435_87CF,
                bip32_header_priv: 0x0435_8394,
                genesis_hash: TESTNET_GENESIS,
                dns_seeds: &[
                    "testnet-seed.bitcoin.jonasschnelli.ch",
                    "testnet-seed.bluematt.me",
                    "testnet-seed.bitcoin.petertodd.org",
                ],
                checkpoints: &[],
                daa_activation_height: None,
                allow_min_difficulty: true,
                use_fork_id: false,
                uri_scheme: "bitcoin",
                cash_addr_prefix: None,
                min_non_dust_output: 546,
                max_block_size: 1_000_000,
            },
            Network::BitcoinCash => Self {
                network,
                coin: "BCH",
                bip44_coin_type: 145,
                packet_magic: 0xe3e1_f3e8,
                port: 8333,
                // Legacy address headers are shared with Bitcoin; only the
                // CashAddr prefix disambiguates the two in text form.
                address_header: 0,
                p2sh_header: 5,
                dumped_private_key_header: 128,
                bip32_header_pub: 0x0488_B21E,
                bip32_header_priv: 0x0488_ADE4,
                genesis_hash: MAINNET_GENESIS,
                dns_seeds: &[
                    "seed.bitcoinabc.org",
                    "btccash-seeder.bitcoinunlimited.info",
                    "seed.bitprim.org",
                    "seed.deadalnix.me",
                    "seeder.criptolayer.net",
                ],
                checkpoints: BCH_MAINNET_CHECKPOINTS,
                daa_activation_height: Some(504_032),
                allow_min_difficulty: false,
                use_fork_id: true,
                uri_scheme: "bitcoincash",
                cash_addr_prefix: Some("bitcoincash"),
                min_non_dust_output: 546,
                max_block_size: 32_000_000,
            },
            Network::BitcoinCashTestnet => Self {
                network,
                coin: "tBCH",
                bip44_coin_type: 1,
                packet_magic: 0xf4e5_f3f4,
                port: 18333,
                address_header: 111,
                p2sh_header: 196,
                dumped_private_key_header: 239,
                bip32_header_pub: 0x0435_87CF,
                bip32_header_priv: 0x0435_8394,
                genesis_hash: TESTNET_GENESIS,
                dns_seeds: &[
                    "testnet-seed.bitcoinabc.org",
                    "testnet-seed-abc.bitcoinforks.org",
                    "testnet-seed.bitprim.org",
                    "testnet-seed.deadalnix.me",
                    "testnet-seeder.criptolayer.net",
                ],
                checkpoints: &[],
                daa_activation_height: Some(1_188_697),
                allow_min_difficulty: true,
                use_fork_id: true,
                uri_scheme: "bchtest",
                cash_addr_prefix: Some("bchtest"),
                min_non_dust_output: 546,
                max_block_size: 32_000_000,
            },
        }
    }

    /// Looks a chain up by its coin identifier string.
    pub fn from_coin(coin: &str) -> Option<Self> {
        let network = match coin {
            "BTC" => Network::Bitcoin,
            "tBTC" => Network::BitcoinTestnet,
            "BCH" => Network::BitcoinCash,
            "tBCH" => Network::BitcoinCashTestnet,
            _ => return None,
        };
        Some(Self::for_network(network))
    }

    /// Whether this chain is a Bitcoin Cash variant.
    pub fn is_bitcoin_cash(&self) -> bool {
        self.cash_addr_prefix.is_some()
    }

    /// Whether the checkpoint at `height`, if any, matches `hash_hex`.
    /// Heights without a checkpoint always pass.
    pub fn passes_checkpoint(&self, height: u32, hash_hex: &str) -> bool {
        match self.checkpoints.iter().find(|(h, _)| *h == height) {
            Some((_, expected)) => expected.eq_ignore_ascii_case(hash_hex),
            None => true,
        }
    }
}
