//! # Legacy Addresses
//!
//! Base58Check P2PKH addresses under a network's version byte. This is
//! the only address form the BIP-47 core needs: notification addresses
//! and channel payment addresses are all pay-to-pubkey-hash. CashAddr
//! text encoding is the embedding wallet's concern; the params carry
//! the prefix strings for it.

use secp256k1::PublicKey;
use std::fmt;
use thiserror::Error;

use crate::crypto::hash::hash160;
use crate::params::NetworkParams;

/// Errors from address parsing.
#[derive(Debug, Error)]
pub enum AddressError {
    /// Not valid Base58Check.
    #[error("invalid base58check: {0}")]
    BadFormat(String),

    /// Decoded payload was not version byte plus 20-byte hash.
    #[error("address payload length {0}, expected 21")]
    BadLength(usize),

    /// The version byte belongs to no address type of this network.
    #[error("address version {version} does not belong to {coin}")]
    WrongNetwork { version: u8, coin: &'static str },
}

/// A legacy Base58Check address: one version byte and a 160-bit hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    version: u8,
    hash: [u8; 20],
}

impl Address {
    /// P2PKH address of a compressed public key under the network's
    /// address header.
    pub fn p2pkh(params: &NetworkParams, pubkey: &PublicKey) -> Self {
        Self {
            version: params.address_header,
            hash: hash160(&pubkey.serialize()),
        }
    }

    /// Builds an address directly from a hash-160, used when parsing
    /// scriptPubKeys.
    pub fn from_hash160(params: &NetworkParams, hash: [u8; 20]) -> Self {
        Self {
            version: params.address_header,
            hash,
        }
    }

    /// Parses a Base58Check address and checks it belongs to `params`.
    pub fn from_base58(params: &NetworkParams, text: &str) -> Result<Self, AddressError> {
        let payload = bs58::decode(text)
            .with_check(None)
            .into_vec()
            .map_err(|e| AddressError::BadFormat(e.to_string()))?;
        if payload.len() != 21 {
            return Err(AddressError::BadLength(payload.len()));
        }
        let version = payload[0];
        if version != params.address_header && version != params.p2sh_header {
            return Err(AddressError::WrongNetwork {
                version,
                coin: params.coin,
            });
        }
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&payload[1..]);
        Ok(Self { version, hash })
    }

    /// The 20-byte pubkey hash.
    pub fn hash160(&self) -> &[u8; 20] {
        &self.hash
    }

    /// The version byte this address was encoded under.
    pub fn version(&self) -> u8 {
        self.version
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut payload = [0u8; 21];
        payload[0] = self.version;
        payload[1..].copy_from_slice(&self.hash);
        f.write_str(&bs58::encode(payload).with_check().into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Network;
    use secp256k1::Secp256k1;

    #[test]
    fn genesis_pubkey_address() {
        // The coinbase key of block 0, compressed.
        let params = NetworkParams::for_network(Network::Bitcoin);
        let pubkey = PublicKey::from_slice(
            &hex::decode("0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798")
                .unwrap(),
        )
        .unwrap();
        let addr = Address::p2pkh(&params, &pubkey);
        assert_eq!(addr.to_string(), "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH");
    }

    #[test]
    fn base58_roundtrip() {
        let params = NetworkParams::for_network(Network::Bitcoin);
        let text = "1JDdmqFLhpzcUwPeinhJbUPw4Co3aWLyzW";
        let addr = Address::from_base58(&params, text).unwrap();
        assert_eq!(addr.to_string(), text);
        assert_eq!(addr.version(), params.address_header);
    }

    #[test]
    fn testnet_address_rejected_on_mainnet() {
        let mainnet = NetworkParams::for_network(Network::Bitcoin);
        let testnet = NetworkParams::for_network(Network::BitcoinTestnet);
        let secp = Secp256k1::new();
        let secret = secp256k1::SecretKey::from_slice(&[0x42; 32]).unwrap();
        let pubkey = PublicKey::from_secret_key(&secp, &secret);
        let text = Address::p2pkh(&testnet, &pubkey).to_string();
        assert!(matches!(
            Address::from_base58(&mainnet, &text),
            Err(AddressError::WrongNetwork { .. })
        ));
    }

    #[test]
    fn garbage_rejected() {
        let params = NetworkParams::for_network(Network::Bitcoin);
        assert!(matches!(
            Address::from_base58(&params, "definitely not an address"),
            Err(AddressError::BadFormat(_))
        ));
        assert!(matches!(
            Address::from_base58(&params, "1JDdmqFLhpzcUwPeinhJbUPw4Co3aWLyzX"),
            Err(AddressError::BadFormat(_))
        ));
    }
}
