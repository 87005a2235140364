//! # Hashing Utilities
//!
//! Thin named helpers over the digest crates so the rest of the code can
//! say what it means: `hash160` instead of a RIPEMD-over-SHA two-liner
//! repeated in five places.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Single SHA-256. 32 bytes out.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Double SHA-256, the bitcoin workhorse. Used for transaction ids,
/// block header hashes and Base58Check checksums.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    Sha256::digest(Sha256::digest(data)).into()
}

/// RIPEMD-160 over SHA-256. This is what sits inside every P2PKH address.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(Sha256::digest(data)).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_empty_vector() {
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256d_is_double_hash() {
        let once = sha256(b"paycode");
        assert_eq!(sha256d(b"paycode"), sha256(&once));
    }

    #[test]
    fn hash160_known_vector() {
        // hash160 of the generator point's compressed encoding.
        let g = hex::decode("0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798")
            .unwrap();
        assert_eq!(
            hex::encode(hash160(&g)),
            "751e76e8199196d454941c45d1b3a323f1433bd6"
        );
    }
}
