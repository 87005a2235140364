//! # ECDH Mask Engine
//!
//! The Diffie-Hellman machinery behind payment channels. Two flavors of
//! shared secret come out of here:
//!
//! - the **payment tweak**: `SHA-256(Sx)` of the secret point between a
//!   payment key and the counterparty's 0th code key, added to a key or
//!   point to produce the effective one-time payment key;
//! - the **blinding mask**: `HMAC-SHA-512(key = outpoint, data = Sx)`
//!   between the notification key and the designated input key, XORed
//!   over the payment code payload inside a notification transaction.
//!
//! Both sides of a channel compute the same secrets from opposite key
//! halves, since `a·B == b·A` on the curve. The tests pin this with the
//! published BIP-47 vectors.

use hmac::{Hmac, Mac};
use secp256k1::{All, PublicKey, Scalar, Secp256k1, SecretKey};
use sha2::Sha512;
use thiserror::Error;

use crate::crypto::hash::sha256;

/// Wire size of the outpoint keying the blinding mask: txid plus vout.
pub const OUTPOINT_LEN: usize = 36;

/// Errors from shared-secret derivation.
#[derive(Debug, Error)]
pub enum EcdhError {
    /// A scalar was zero or at least the curve order, or a point
    /// operation produced the point at infinity.
    #[error("value is not usable on secp256k1")]
    NotSecp256k1,
}

/// Computes the shared secret point `S = a·B` and returns its 32-byte
/// X coordinate.
pub fn secret_point(
    secp: &Secp256k1<All>,
    secret: &SecretKey,
    public: &PublicKey,
) -> Result<[u8; 32], EcdhError> {
    let shared = public
        .mul_tweak(secp, &Scalar::from(*secret))
        .map_err(|_| EcdhError::NotSecp256k1)?;
    let mut x = [0u8; 32];
    x.copy_from_slice(&shared.serialize()[1..33]);
    Ok(x)
}

/// Derives the additive payment tweak `SHA-256(Sx)` as a secret key.
///
/// The digest must itself be a valid scalar; BIP-47 says increment the
/// index and retry when it is not. That rejection surfaces here as
/// [`EcdhError::NotSecp256k1`].
pub fn payment_tweak(secret_point_x: &[u8; 32]) -> Result<SecretKey, EcdhError> {
    SecretKey::from_slice(&sha256(secret_point_x)).map_err(|_| EcdhError::NotSecp256k1)
}

/// Computes the 64-byte notification blinding mask:
/// `HMAC-SHA-512(key = outpoint, data = Sx)`.
///
/// `outpoint` is the 36-byte wire form (txid followed by the
/// little-endian output index) of the notification transaction's first
/// input. Sender and receiver arrive at the same mask from opposite key
/// halves.
pub fn blinding_mask(secret_point_x: &[u8; 32], outpoint: &[u8; OUTPOINT_LEN]) -> [u8; 64] {
    let mut mac = Hmac::<Sha512>::new_from_slice(outpoint)
        .expect("HMAC accepts keys of any length");
    mac.update(secret_point_x);
    mac.finalize().into_bytes().into()
}

/// Effective private key for receiving payment `i` over a channel:
/// `(our_i + SHA-256(Sx)) mod n` where `S = our_i · peer_0`.
pub fn receive_private_key(
    secp: &Secp256k1<All>,
    our_payment_key: &SecretKey,
    peer_code_key_0: &PublicKey,
) -> Result<SecretKey, EcdhError> {
    let sx = secret_point(secp, our_payment_key, peer_code_key_0)?;
    let tweak = payment_tweak(&sx)?;
    our_payment_key
        .add_tweak(&Scalar::from(tweak))
        .map_err(|_| EcdhError::NotSecp256k1)
}

/// Effective public key for sending payment `i` over a channel:
/// `peer_i + SHA-256(Sx)·G` where `S = our_0 · peer_i`.
pub fn send_public_key(
    secp: &Secp256k1<All>,
    our_code_key_0: &SecretKey,
    peer_payment_key: &PublicKey,
) -> Result<PublicKey, EcdhError> {
    let sx = secret_point(secp, our_code_key_0, peer_payment_key)?;
    let tweak = payment_tweak(&sx)?;
    peer_payment_key
        .add_exp_tweak(secp, &Scalar::from(tweak))
        .map_err(|_| EcdhError::NotSecp256k1)
}
