//! # Cryptographic Primitives
//!
//! Everything below the identity layer lives here: seed handling,
//! hierarchical deterministic derivation and the ECDH machinery that
//! powers payment channels.
//!
//! The curve is secp256k1 throughout, because that is what the chains
//! we speak to use. Digests are SHA-256, double SHA-256, RIPEMD-160 and
//! HMAC-SHA-512, the classic bitcoin set. None of these routines block
//! or suspend; all the I/O lives in the wallet module.

pub mod ecdh;
pub mod hash;
pub mod hd;
pub mod mnemonic;

pub use ecdh::{blinding_mask, secret_point, EcdhError};
pub use hd::{ExtendedKey, KeyError, HARDENED};
pub use mnemonic::{Seed, SeedError};
