//! # BIP-32 Hierarchical Deterministic Keys
//!
//! Extended keys over secp256k1: a keypair (or just the public half)
//! plus a 32-byte chain code, derivable into a tree of children. Every
//! other derivation in this crate, accounts, notification keys, payment
//! keys, is built from the two CKD functions here.
//!
//! A payment code is itself an extended *public* key in disguise, which
//! is why [`ExtendedKey::from_public_parts`] exists: the identity layer
//! reconstitutes one from the 33-byte pubkey and chain code carried in
//! the 80-byte payload.

use hmac::{Hmac, Mac};
use secp256k1::{All, PublicKey, Scalar, Secp256k1, SecretKey};
use sha2::Sha512;
use thiserror::Error;

use crate::crypto::hash::hash160;

/// Bit marking a child number as hardened.
pub const HARDENED: u32 = 0x8000_0000;

/// Errors that can occur during key derivation.
#[derive(Debug, Error)]
pub enum KeyError {
    /// The seed was too short or too long for HMAC-based master key
    /// generation (BIP-32 allows 16 to 64 bytes).
    #[error("seed length {0} outside the 16..=64 byte range")]
    InvalidSeedLength(usize),

    /// The master or child key material fell outside the curve order.
    /// Astronomically unlikely; BIP-32 says skip to the next index.
    #[error("derived key material is not a valid secp256k1 scalar")]
    InvalidChildKey,

    /// Hardened derivation was requested on a public-only key.
    #[error("cannot derive hardened child {0:#010x} without a private key")]
    HardenedFromPublic(u32),

    /// A private-key operation was requested on a watch-only key.
    #[error("extended key has no private component")]
    MissingPrivateKey,
}

/// The key material inside an [`ExtendedKey`]: a full keypair for owned
/// branches, or just the point for watch-only branches.
#[derive(Clone, Debug)]
enum KeyMaterial {
    Private(SecretKey),
    Public(PublicKey),
}

/// A BIP-32 extended key: key material, chain code and position in the
/// derivation tree.
#[derive(Clone, Debug)]
pub struct ExtendedKey {
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
    chain_code: [u8; 32],
    key: KeyMaterial,
}

impl ExtendedKey {
    /// Derives the master key from seed bytes, per BIP-32:
    /// `HMAC-SHA-512(key = "Bitcoin seed", data = seed)`.
    pub fn master(seed: &[u8]) -> Result<Self, KeyError> {
        if seed.len() < 16 || seed.len() > 64 {
            return Err(KeyError::InvalidSeedLength(seed.len()));
        }

        let i = hmac_sha512(b"Bitcoin seed", seed);
        let secret =
            SecretKey::from_slice(&i[..32]).map_err(|_| KeyError::InvalidChildKey)?;
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&i[32..]);

        Ok(Self {
            depth: 0,
            parent_fingerprint: [0u8; 4],
            child_number: 0,
            chain_code,
            key: KeyMaterial::Private(secret),
        })
    }

    /// Reconstitutes a watch-only extended key from its public parts.
    ///
    /// `depth` and `child_number` only matter for xpub serialization;
    /// derivation works regardless.
    pub fn from_public_parts(
        pubkey: PublicKey,
        chain_code: [u8; 32],
        depth: u8,
        child_number: u32,
    ) -> Self {
        Self {
            depth,
            parent_fingerprint: [0u8; 4],
            child_number,
            chain_code,
            key: KeyMaterial::Public(pubkey),
        }
    }

    /// Derives the child at `child`. Set the [`HARDENED`] bit for
    /// hardened derivation, which requires the private key.
    pub fn derive(&self, secp: &Secp256k1<All>, child: u32) -> Result<Self, KeyError> {
        let hardened = child & HARDENED != 0;

        let mut data = Vec::with_capacity(37);
        match (&self.key, hardened) {
            (KeyMaterial::Private(sk), true) => {
                data.push(0);
                data.extend_from_slice(&sk.secret_bytes());
            }
            (KeyMaterial::Private(sk), false) => {
                data.extend_from_slice(&PublicKey::from_secret_key(secp, sk).serialize());
            }
            (KeyMaterial::Public(_), true) => {
                return Err(KeyError::HardenedFromPublic(child));
            }
            (KeyMaterial::Public(pk), false) => {
                data.extend_from_slice(&pk.serialize());
            }
        }
        data.extend_from_slice(&child.to_be_bytes());

        let i = hmac_sha512(&self.chain_code, &data);
        let tweak =
            SecretKey::from_slice(&i[..32]).map_err(|_| KeyError::InvalidChildKey)?;
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&i[32..]);

        let key = match &self.key {
            KeyMaterial::Private(sk) => {
                let child_sk = tweak
                    .add_tweak(&Scalar::from(*sk))
                    .map_err(|_| KeyError::InvalidChildKey)?;
                KeyMaterial::Private(child_sk)
            }
            KeyMaterial::Public(pk) => {
                let child_pk = pk
                    .add_exp_tweak(secp, &Scalar::from(tweak))
                    .map_err(|_| KeyError::InvalidChildKey)?;
                KeyMaterial::Public(child_pk)
            }
        };

        Ok(Self {
            depth: self.depth + 1,
            parent_fingerprint: self.fingerprint(secp),
            child_number: child,
            chain_code,
            key,
        })
    }

    /// The compressed public key of this node.
    pub fn public_key(&self, secp: &Secp256k1<All>) -> PublicKey {
        match &self.key {
            KeyMaterial::Private(sk) => PublicKey::from_secret_key(secp, sk),
            KeyMaterial::Public(pk) => *pk,
        }
    }

    /// The private key, if this branch is owned.
    pub fn secret_key(&self) -> Result<SecretKey, KeyError> {
        match &self.key {
            KeyMaterial::Private(sk) => Ok(*sk),
            KeyMaterial::Public(_) => Err(KeyError::MissingPrivateKey),
        }
    }

    /// Whether this key can sign and derive hardened children.
    pub fn has_private(&self) -> bool {
        matches!(self.key, KeyMaterial::Private(_))
    }

    /// The 32-byte chain code.
    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    /// Depth of this node in the derivation tree (master = 0).
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// The child number this node was derived at, hardened bit included.
    pub fn child_number(&self) -> u32 {
        self.child_number
    }

    /// First four bytes of HASH-160 of the compressed public key.
    pub fn fingerprint(&self, secp: &Secp256k1<All>) -> [u8; 4] {
        let h = hash160(&self.public_key(secp).serialize());
        [h[0], h[1], h[2], h[3]]
    }

    /// Serializes the public half of this node as a Base58Check xpub
    /// under the given BIP-32 version bytes (0x0488B21E for mainnet
    /// "xpub", 0x043587CF for testnet "tpub").
    pub fn to_xpub(&self, secp: &Secp256k1<All>, version: u32) -> String {
        let mut raw = Vec::with_capacity(78);
        raw.extend_from_slice(&version.to_be_bytes());
        raw.push(self.depth);
        raw.extend_from_slice(&self.parent_fingerprint);
        raw.extend_from_slice(&self.child_number.to_be_bytes());
        raw.extend_from_slice(&self.chain_code);
        raw.extend_from_slice(&self.public_key(secp).serialize());
        bs58::encode(raw).with_check().into_string()
    }
}

/// HMAC-SHA-512 with the conventional (key, data) argument order.
fn hmac_sha512(key: &[u8], data: &[u8]) -> [u8; 64] {
    let mut mac = Hmac::<Sha512>::new_from_slice(key)
        .expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}
