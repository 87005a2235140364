//! # BIP-47 Accounts
//!
//! An [`Account`] anchors payment channels for one coin: the hardened
//! node at `m/47'/coin_type'/identity'`, from which come
//!
//! - the **notification key**, non-hardened child 0, whose P2PKH
//!   address receives notification transactions;
//! - the **payment keys**, non-hardened children `n`, tweaked per
//!   counterparty into the actual one-time addresses.
//!
//! For compatibility with deployed wallets the coin-type level is
//! always derived at `0'`, whatever the chain; the registered BIP-44
//! coin types are carried in [`NetworkParams`] as metadata only. One
//! consequence is that a seed produces the same payment code on every
//! supported network.
//!
//! An account built from a counterparty's Base58 code is watch-only:
//! public derivations work, private ones fail.

use secp256k1::{All, Secp256k1};
use thiserror::Error;

use crate::config::PURPOSE_BIP47;
use crate::crypto::hd::{ExtendedKey, KeyError, HARDENED};
use crate::identity::address::Address;
use crate::identity::payment_code::{CodeError, PaymentCode};
use crate::params::NetworkParams;

/// Errors from account construction and derivation.
#[derive(Debug, Error)]
pub enum AccountError {
    /// BIP-32 derivation failed.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// The supplied payment code was invalid.
    #[error(transparent)]
    Code(#[from] CodeError),
}

/// A BIP-47 account bound to one network's parameters.
#[derive(Clone, Debug)]
pub struct Account {
    params: NetworkParams,
    key: ExtendedKey,
    identity: u32,
    payment_code: PaymentCode,
}

impl Account {
    /// Derives the account at `m/47'/0'/identity'` from seed bytes.
    pub fn from_seed(
        secp: &Secp256k1<All>,
        params: NetworkParams,
        seed: &[u8],
        identity: u32,
    ) -> Result<Self, AccountError> {
        let master = ExtendedKey::master(seed)?;
        let purpose = master.derive(secp, PURPOSE_BIP47 | HARDENED)?;
        let coin_type = purpose.derive(secp, HARDENED)?;
        Self::new(secp, params, &coin_type, identity)
    }

    /// Builds the account at hardened child `identity` of a coin-type
    /// node.
    pub fn new(
        secp: &Secp256k1<All>,
        params: NetworkParams,
        coin_type: &ExtendedKey,
        identity: u32,
    ) -> Result<Self, AccountError> {
        let key = coin_type.derive(secp, identity | HARDENED)?;
        let payment_code =
            PaymentCode::from_key_material(&key.public_key(secp), key.chain_code());
        Ok(Self {
            params,
            key,
            identity,
            payment_code,
        })
    }

    /// Instantiates a watch-only account from a counterparty's Base58
    /// payment code. Only public derivations will succeed.
    pub fn from_payment_code(params: NetworkParams, text: &str) -> Result<Self, AccountError> {
        let payment_code = PaymentCode::decode(text)?;
        let key = ExtendedKey::from_public_parts(
            payment_code.pub_key(),
            *payment_code.chain_code(),
            3,
            0,
        );
        Ok(Self {
            params,
            key,
            identity: 0,
            payment_code,
        })
    }

    /// The network this account lives on.
    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    /// The account identity index, the `a` in `m/47'/0'/a'`.
    pub fn identity(&self) -> u32 {
        self.identity
    }

    /// Whether private derivations are available.
    pub fn has_private(&self) -> bool {
        self.key.has_private()
    }

    /// This account's payment code.
    pub fn payment_code(&self) -> &PaymentCode {
        &self.payment_code
    }

    /// The Base58Check text of this account's payment code.
    pub fn payment_code_string(&self) -> String {
        self.payment_code.to_string()
    }

    /// The notification key, non-hardened child 0 of the account node.
    pub fn notification_key(&self, secp: &Secp256k1<All>) -> Result<ExtendedKey, AccountError> {
        Ok(self.key.derive(secp, 0)?)
    }

    /// P2PKH address of the notification key under this network's
    /// address header.
    pub fn notification_address(&self, secp: &Secp256k1<All>) -> Result<Address, AccountError> {
        let key = self.notification_key(secp)?;
        Ok(Address::p2pkh(&self.params, &key.public_key(secp)))
    }

    /// The payment key at non-hardened index `n`.
    pub fn key_at(&self, secp: &Secp256k1<All>, n: u32) -> Result<ExtendedKey, AccountError> {
        Ok(self.key.derive(secp, n)?)
    }

    /// The account node serialized as an extended public key under this
    /// network's BIP-32 version bytes.
    pub fn xpub(&self, secp: &Secp256k1<All>) -> String {
        self.key.to_xpub(secp, self.params.bip32_header_pub)
    }
}
