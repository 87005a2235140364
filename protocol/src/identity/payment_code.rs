//! # Payment Codes
//!
//! The 80-byte stealth identity at the heart of BIP-47:
//!
//! ```text
//! version(1) | features(1) | sign(1) | x(32) | chain code(32) | reserved(13)
//! ```
//!
//! Bytes 2..35 are a compressed secp256k1 public key; together with the
//! chain code they form a BIP-32 extended public key, which is how
//! counterparties derive payment keys from a code they were handed.
//!
//! In text form a payment code is Base58Check of `0x47 || payload`,
//! always 116 characters and always starting `PM8T` for version 1.
//!
//! Blinding XORs a 64-byte mask over bytes 3..67, the x coordinate and
//! the chain code. The sign byte at offset 2 is left in the clear; that
//! is the interoperable v1 behavior and every deployed wallet depends
//! on it.

use secp256k1::{All, PublicKey, Secp256k1};
use std::fmt;
use thiserror::Error;

use crate::config::{
    BLIND_REGION_LEN, BLIND_REGION_START, PAYMENT_CODE_LEN, PAYMENT_CODE_PREFIX,
    PAYMENT_CODE_VERSION_1,
};
use crate::crypto::hd::{ExtendedKey, KeyError, HARDENED};
use crate::identity::address::Address;
use crate::params::NetworkParams;

/// Errors from payment-code parsing and derivation.
#[derive(Debug, Error)]
pub enum CodeError {
    /// The text was not valid Base58Check or lacked the 0x47 prefix.
    #[error("invalid payment code encoding: {0}")]
    BadFormat(String),

    /// The binary payload was not exactly 80 bytes.
    #[error("payment code payload length {0}, expected 80")]
    BadLength(usize),

    /// The version byte was not 0x01. Versions 2 and 3 exist in the
    /// wild but are out of scope here.
    #[error("unsupported payment code version {0:#04x}")]
    UnsupportedVersion(u8),

    /// The sign byte was neither 0x02 nor 0x03.
    #[error("payment code sign byte {0:#04x} is not a point parity")]
    BadSignByte(u8),

    /// The embedded x coordinate is not on the curve.
    #[error("payment code does not encode a secp256k1 point")]
    InvalidPoint,

    /// Child derivation failed.
    #[error("payment code derivation: {0}")]
    Derivation(#[from] KeyError),

    /// A hardened index was requested; payment codes only derive
    /// non-hardened children.
    #[error("child index {0:#010x} has the hardened bit set")]
    HardenedIndex(u32),
}

/// A version 1 payment code.
///
/// Construction always validates, so a held `PaymentCode` is known to
/// carry a real curve point and a supported version.
#[derive(Clone)]
pub struct PaymentCode {
    payload: [u8; PAYMENT_CODE_LEN],
    pubkey: PublicKey,
    chain_code: [u8; 32],
}

impl PaymentCode {
    /// Builds a payment code from an account's public key and chain
    /// code, the owner-side constructor.
    pub fn from_key_material(pubkey: &PublicKey, chain_code: &[u8; 32]) -> Self {
        let mut payload = [0u8; PAYMENT_CODE_LEN];
        payload[0] = PAYMENT_CODE_VERSION_1;
        payload[1] = 0x00;
        payload[2..35].copy_from_slice(&pubkey.serialize());
        payload[35..67].copy_from_slice(chain_code);
        Self {
            payload,
            pubkey: *pubkey,
            chain_code: *chain_code,
        }
    }

    /// Validates and wraps an 80-byte payload.
    pub fn from_payload(payload: &[u8]) -> Result<Self, CodeError> {
        if payload.len() != PAYMENT_CODE_LEN {
            return Err(CodeError::BadLength(payload.len()));
        }
        if payload[0] != PAYMENT_CODE_VERSION_1 {
            return Err(CodeError::UnsupportedVersion(payload[0]));
        }
        if payload[2] != 0x02 && payload[2] != 0x03 {
            return Err(CodeError::BadSignByte(payload[2]));
        }
        let pubkey =
            PublicKey::from_slice(&payload[2..35]).map_err(|_| CodeError::InvalidPoint)?;
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&payload[35..67]);

        let mut fixed = [0u8; PAYMENT_CODE_LEN];
        fixed.copy_from_slice(payload);
        Ok(Self {
            payload: fixed,
            pubkey,
            chain_code,
        })
    }

    /// Decodes the Base58Check text form.
    pub fn decode(text: &str) -> Result<Self, CodeError> {
        let bytes = bs58::decode(text)
            .with_check(None)
            .into_vec()
            .map_err(|e| CodeError::BadFormat(e.to_string()))?;
        match bytes.split_first() {
            Some((&PAYMENT_CODE_PREFIX, payload)) => Self::from_payload(payload),
            Some((other, _)) => Err(CodeError::BadFormat(format!(
                "prefix byte {other:#04x}, expected 0x47"
            ))),
            None => Err(CodeError::BadFormat("empty payload".into())),
        }
    }

    /// The raw 80-byte payload.
    pub fn payload(&self) -> &[u8; PAYMENT_CODE_LEN] {
        &self.payload
    }

    /// The embedded compressed public key, `sign || x`.
    pub fn pub_key(&self) -> PublicKey {
        self.pubkey
    }

    /// The embedded chain code.
    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    /// Version byte of this code.
    pub fn version(&self) -> u8 {
        self.payload[0]
    }

    /// Derives the non-hardened child public key at `idx`, treating the
    /// code as a BIP-32 extended public key. For the code's owner this
    /// equals `account.key_at(idx)`'s public key.
    pub fn derive_pub_key_at(
        &self,
        secp: &Secp256k1<All>,
        idx: u32,
    ) -> Result<PublicKey, CodeError> {
        if idx & HARDENED != 0 {
            return Err(CodeError::HardenedIndex(idx));
        }
        let xpub = ExtendedKey::from_public_parts(self.pubkey, self.chain_code, 3, 0);
        Ok(xpub.derive(secp, idx)?.public_key(secp))
    }

    /// P2PKH address of child 0, where notification transactions for
    /// the code's owner are sent.
    pub fn notification_address(
        &self,
        secp: &Secp256k1<All>,
        params: &NetworkParams,
    ) -> Result<Address, CodeError> {
        Ok(Address::p2pkh(params, &self.derive_pub_key_at(secp, 0)?))
    }

    /// XORs a 64-byte mask over the maskable region of a payload,
    /// bytes 3..67. Applying the same mask twice round-trips, so this
    /// is both `blind` and `unblind`.
    pub fn blind(payload: &mut [u8; PAYMENT_CODE_LEN], mask: &[u8; BLIND_REGION_LEN]) {
        for (byte, m) in payload[BLIND_REGION_START..BLIND_REGION_START + BLIND_REGION_LEN]
            .iter_mut()
            .zip(mask.iter())
        {
            *byte ^= m;
        }
    }

    /// Alias of [`blind`](Self::blind); XOR is its own inverse.
    pub fn unblind(payload: &mut [u8; PAYMENT_CODE_LEN], mask: &[u8; BLIND_REGION_LEN]) {
        Self::blind(payload, mask);
    }
}

impl fmt::Display for PaymentCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut extended = [0u8; 1 + PAYMENT_CODE_LEN];
        extended[0] = PAYMENT_CODE_PREFIX;
        extended[1..].copy_from_slice(&self.payload);
        f.write_str(&bs58::encode(extended).with_check().into_string())
    }
}

impl fmt::Debug for PaymentCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.to_string();
        write!(f, "PaymentCode({}…)", &text[..12.min(text.len())])
    }
}

impl PartialEq for PaymentCode {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload
    }
}

impl Eq for PaymentCode {}
