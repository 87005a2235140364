//! # Seed Handling
//!
//! A [`Seed`] wraps a BIP-39 mnemonic together with its derived 64-byte
//! seed material and a creation timestamp. The mnemonic is the canonical
//! backup: everything else in the wallet, accounts, payment codes,
//! channel keys, is re-derived from it deterministically.
//!
//! The PBKDF2-HMAC-SHA-512 stretch (2048 rounds, salt `"mnemonic" ||
//! passphrase`) happens inside the `bip39` crate. We don't reimplement
//! standards that already have audited implementations.

use bip39::{Language, Mnemonic};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur while creating or restoring a seed.
#[derive(Debug, Error)]
pub enum SeedError {
    /// The mnemonic phrase failed BIP-39 validation (bad word, bad
    /// checksum, unsupported word count).
    #[error("invalid mnemonic phrase: {0}")]
    InvalidMnemonic(String),
}

/// A BIP-39 seed: mnemonic words, optional passphrase, creation epoch.
///
/// The derived seed bytes are cached at construction so later BIP-32
/// derivations never re-run PBKDF2.
///
/// ## Serialization
///
/// `Seed` serializes the mnemonic and passphrase in the clear, the same
/// trust model as the wallet file it is stored in. Protecting that file
/// is the embedding application's job.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "SeedRecord", into = "SeedRecord")]
pub struct Seed {
    mnemonic: String,
    passphrase: String,
    created_at: DateTime<Utc>,
    bytes: [u8; 64],
}

/// The on-disk shape of a seed. Only the recoverable fields are stored;
/// the 64 seed bytes are re-derived on load.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedRecord {
    mnemonic: String,
    passphrase: String,
    created_at: DateTime<Utc>,
}

impl Seed {
    /// Generate a fresh seed from 256 bits of OS entropy.
    ///
    /// Twenty-four words. If your OS RNG is broken you have much bigger
    /// problems than this wallet.
    pub fn generate() -> Self {
        let mut entropy = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut entropy);
        let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy)
            .expect("32 bytes of entropy is always a valid BIP-39 size");
        Self::from_parts(mnemonic, String::new(), Utc::now())
    }

    /// Restore a seed from an existing mnemonic phrase and passphrase.
    ///
    /// # Errors
    ///
    /// Returns [`SeedError::InvalidMnemonic`] if the phrase does not
    /// validate under BIP-39.
    pub fn from_mnemonic(phrase: &str, passphrase: &str) -> Result<Self, SeedError> {
        let mnemonic = Mnemonic::parse_in(Language::English, phrase)
            .map_err(|e| SeedError::InvalidMnemonic(e.to_string()))?;
        Ok(Self::from_parts(mnemonic, passphrase.to_string(), Utc::now()))
    }

    /// Restore a seed with an explicit creation time, used when loading
    /// from the wallet file.
    pub fn from_mnemonic_at(
        phrase: &str,
        passphrase: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Self, SeedError> {
        let mnemonic = Mnemonic::parse_in(Language::English, phrase)
            .map_err(|e| SeedError::InvalidMnemonic(e.to_string()))?;
        Ok(Self::from_parts(mnemonic, passphrase.to_string(), created_at))
    }

    fn from_parts(mnemonic: Mnemonic, passphrase: String, created_at: DateTime<Utc>) -> Self {
        let bytes = mnemonic.to_seed(&passphrase);
        Self {
            mnemonic: mnemonic.to_string(),
            passphrase,
            created_at,
            bytes,
        }
    }

    /// The space-joined mnemonic phrase. This is the backup; treat it
    /// like the money it controls.
    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    /// The 64-byte BIP-32 seed material.
    pub fn bytes(&self) -> &[u8; 64] {
        &self.bytes
    }

    /// When this seed was first created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl TryFrom<SeedRecord> for Seed {
    type Error = SeedError;

    fn try_from(record: SeedRecord) -> Result<Self, Self::Error> {
        Seed::from_mnemonic_at(&record.mnemonic, &record.passphrase, record.created_at)
    }
}

impl From<Seed> for SeedRecord {
    fn from(seed: Seed) -> Self {
        SeedRecord {
            mnemonic: seed.mnemonic,
            passphrase: seed.passphrase,
            created_at: seed.created_at,
        }
    }
}

impl PartialEq for Seed {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for Seed {}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print seed material or the phrase in debug output.
        write!(f, "Seed(created_at={})", self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE_MNEMONIC: &str =
        "response seminar brave tip suit recall often sound stick owner lottery motion";
    const ALICE_SEED_HEX: &str =
        "64dca76abc9c6f0cf3d212d248c380c4622c8f93b2c425ec6a5567fd5db57e10\
         d3e6f94a2f6af4ac2edb8998072aad92098db73558c323777abf5bd1082d970a";

    const BOB_MNEMONIC: &str =
        "reward upper indicate eight swift arch injury crystal super wrestle already dentist";
    const BOB_SEED_HEX: &str =
        "87eaaac5a539ab028df44d9110defbef3797ddb805ca309f61a69ff96dbaa7ab\
         5b24038cf029edec5235d933110f0aea8aeecf939ed14fc20730bba71e4b1110";

    #[test]
    fn alice_seed_vector() {
        let seed = Seed::from_mnemonic(ALICE_MNEMONIC, "").unwrap();
        assert_eq!(hex::encode(seed.bytes()), ALICE_SEED_HEX);
        assert_eq!(seed.mnemonic(), ALICE_MNEMONIC);
    }

    #[test]
    fn bob_seed_vector() {
        let seed = Seed::from_mnemonic(BOB_MNEMONIC, "").unwrap();
        assert_eq!(hex::encode(seed.bytes()), BOB_SEED_HEX);
    }

    #[test]
    fn invalid_phrase_rejected() {
        assert!(Seed::from_mnemonic("definitely not twelve valid words", "").is_err());
    }

    #[test]
    fn generated_seed_restores() {
        let seed = Seed::generate();
        let restored = Seed::from_mnemonic(seed.mnemonic(), "").unwrap();
        assert_eq!(seed.bytes(), restored.bytes());
    }

    #[test]
    fn passphrase_changes_seed() {
        let plain = Seed::from_mnemonic(ALICE_MNEMONIC, "").unwrap();
        let salted = Seed::from_mnemonic(ALICE_MNEMONIC, "hunter2").unwrap();
        assert_ne!(plain.bytes(), salted.bytes());
    }

    #[test]
    fn serde_roundtrip_rederives_bytes() {
        let seed = Seed::from_mnemonic(ALICE_MNEMONIC, "").unwrap();
        let json = serde_json::to_string(&seed).unwrap();
        let back: Seed = serde_json::from_str(&json).unwrap();
        assert_eq!(seed, back);
        assert_eq!(hex::encode(back.bytes()), ALICE_SEED_HEX);
    }

    #[test]
    fn debug_does_not_leak_phrase() {
        let seed = Seed::from_mnemonic(ALICE_MNEMONIC, "").unwrap();
        let debug = format!("{:?}", seed);
        assert!(!debug.contains("seminar"));
    }
}
