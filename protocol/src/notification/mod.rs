//! # Notification Transactions
//!
//! The on-chain handshake that opens a payment channel. To start paying
//! Bob, Alice sends one transaction to Bob's notification address
//! carrying her own payment code in an `OP_RETURN` output, blinded so
//! that only Bob can read it:
//!
//! 1. Alice picks a funding UTXO. Its outpoint and the key that will
//!    sign it (the *designated* key) feed the blinding mask.
//! 2. She computes `S = designated_priv · bob_notification_pub`, then
//!    `mask = HMAC-SHA-512(outpoint, Sx)`, and XORs the mask over her
//!    payment code payload.
//! 3. The transaction carries a dust output to Bob's notification
//!    address and a zero-value `OP_RETURN` with the 80 blinded bytes.
//!
//! Bob watches his notification address. On a match he reads the
//! designated pubkey out of the first input's scriptSig, runs the same
//! ECDH from his side, unblinds, and learns Alice's payment code. From
//! that moment both sides can derive the channel's address sequence and
//! no further coordination is ever needed.
//!
//! Everyone else sees a dust payment and 80 bytes of noise.

use secp256k1::{All, PublicKey, Secp256k1, SecretKey};
use thiserror::Error;
use tracing::debug;

use crate::config::{
    BLIND_REGION_LEN, DEFAULT_FEE_PER_KB, NON_FORK_ID_FEE_PER_KB, PAYMENT_CODE_LEN,
    PAYMENT_CODE_VERSION_1,
};
use crate::crypto::ecdh::{self, EcdhError};
use crate::identity::account::{Account, AccountError};
use crate::identity::address::Address;
use crate::identity::payment_code::{CodeError, PaymentCode};
use crate::params::NetworkParams;
use crate::transaction::script;
use crate::transaction::{OutPoint, Transaction, TxIn, TxOut};

/// Errors from building or parsing notification transactions.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// No `OP_RETURN` output carrying a plausible v1 payload was found.
    #[error("transaction has no payment code OP_RETURN output")]
    NoOpReturn,

    /// The first input's scriptSig exposes no public key, so there is
    /// nothing to run ECDH against.
    #[error("no designated public key in the first input")]
    NoDesignatedKey,

    /// The mask material was not the 64 bytes the XOR region needs.
    #[error("blinding mask length {0}, expected 64")]
    BadMaskLength(usize),

    /// Unblinding produced bytes that are not a valid v1 payment code.
    #[error("unblinded payload is not a valid payment code: {0}")]
    InvalidUnblindedCode(#[from] CodeError),

    /// The funding input cannot cover the dust output plus fee.
    #[error("insufficient money: {required} satoshis required, {available} available")]
    InsufficientMoney { required: u64, available: u64 },

    /// ECDH failed (zero scalar, invalid point).
    #[error(transparent)]
    Ecdh(#[from] EcdhError),

    /// Account derivation failed.
    #[error(transparent)]
    Account(#[from] AccountError),
}

/// The UTXO a notification transaction spends, together with the key
/// that will sign it. Coin selection happens in the embedding wallet;
/// this crate only needs the winner.
#[derive(Clone)]
pub struct FundingInput {
    pub outpoint: OutPoint,
    /// Value of the spent output, satoshis.
    pub value: u64,
    /// The designated private key. Its public key ends up in the clear
    /// in the scriptSig, which is what makes unblinding possible.
    pub key: SecretKey,
}

/// Assembles the notification transaction announcing `sender`'s payment
/// code to the owner of `recipient`.
///
/// The returned transaction carries the designated public key in the
/// input's scriptSig; the external signer prepends the signature when
/// finalizing. Any funding excess beyond dust plus fee is left for the
/// signer's change handling.
pub fn build_notification_transaction(
    secp: &Secp256k1<All>,
    sender: &Account,
    recipient: &PaymentCode,
    funding: &FundingInput,
    params: &NetworkParams,
) -> Result<Transaction, NotificationError> {
    let recipient_key = recipient.derive_pub_key_at(secp, 0)?;
    let recipient_address = Address::p2pkh(params, &recipient_key);
    let value = params.min_non_dust_output;

    debug!(to = %recipient_address, value, "building notification transaction");

    // Blind our payload under the designated key and the outpoint.
    let sx = ecdh::secret_point(secp, &funding.key, &recipient_key)?;
    let mask = ecdh::blinding_mask(&sx, &funding.outpoint.to_wire_bytes());
    let mut payload = *sender.payment_code().payload();
    PaymentCode::blind(&mut payload, &mask);

    let designated_pub = PublicKey::from_secret_key(secp, &funding.key);
    let mut script_sig = Vec::with_capacity(34);
    script_sig.push(33);
    script_sig.extend_from_slice(&designated_pub.serialize());

    let tx = Transaction {
        version: 1,
        inputs: vec![TxIn {
            previous_output: funding.outpoint,
            script_sig,
            sequence: 0xffff_ffff,
        }],
        outputs: vec![
            TxOut {
                value,
                script_pubkey: script::p2pkh_script(recipient_address.hash160()),
            },
            TxOut {
                value: 0,
                script_pubkey: script::op_return_script(&payload),
            },
        ],
        lock_time: 0,
    };

    // Chains without fork-id signing get the bumped fee rate.
    let fee_per_kb = if params.use_fork_id {
        DEFAULT_FEE_PER_KB
    } else {
        NON_FORK_ID_FEE_PER_KB
    };
    let fee = fee_per_kb * tx.weight_estimate() as u64 / 1000;
    let required = value + fee;
    if funding.value < required {
        return Err(NotificationError::InsufficientMoney {
            required,
            available: funding.value,
        });
    }

    Ok(tx)
}

/// Extracts the sender's payment code from an inbound notification
/// transaction, using our notification private key.
pub fn parse_notification(
    secp: &Secp256k1<All>,
    notification_key: &SecretKey,
    tx: &Transaction,
) -> Result<PaymentCode, NotificationError> {
    let blinded = find_blinded_payload(tx).ok_or(NotificationError::NoOpReturn)?;

    let first_input = tx.inputs.first().ok_or(NotificationError::NoDesignatedKey)?;
    let designated = script::designated_pubkey(&first_input.script_sig)
        .ok_or(NotificationError::NoDesignatedKey)?;

    let sx = ecdh::secret_point(secp, notification_key, &designated)?;
    let mask = ecdh::blinding_mask(&sx, &first_input.previous_output.to_wire_bytes());

    let payload = unblind_payload(blinded, &mask)?;
    let code = PaymentCode::from_payload(&payload)?;
    debug!(code = %code, "notification transaction unblinded");
    Ok(code)
}

/// Whether any output of `tx` pays the given notification address.
pub fn is_notification_transaction(tx: &Transaction, notification_address: &Address) -> bool {
    tx.outputs.iter().any(|out| {
        script::p2pkh_destination(&out.script_pubkey).as_ref()
            == Some(notification_address.hash160())
    })
}

/// Locates the unique `OP_RETURN` output whose data is an 80-byte v1
/// payment code payload (`0x01 0x00` prefix).
fn find_blinded_payload(tx: &Transaction) -> Option<&[u8]> {
    tx.outputs.iter().find_map(|out| {
        let data = script::op_return_payload(&out.script_pubkey)?;
        if data.len() == PAYMENT_CODE_LEN && data[0] == PAYMENT_CODE_VERSION_1 && data[1] == 0x00 {
            Some(data)
        } else {
            None
        }
    })
}

/// XORs `mask` over the maskable region of `blinded` with defensive
/// length checks on both slices.
fn unblind_payload(
    blinded: &[u8],
    mask: &[u8],
) -> Result<[u8; PAYMENT_CODE_LEN], NotificationError> {
    if blinded.len() != PAYMENT_CODE_LEN {
        return Err(NotificationError::NoOpReturn);
    }
    let mask: &[u8; BLIND_REGION_LEN] = mask
        .try_into()
        .map_err(|_| NotificationError::BadMaskLength(mask.len()))?;
    let mut payload = [0u8; PAYMENT_CODE_LEN];
    payload.copy_from_slice(blinded);
    PaymentCode::unblind(&mut payload, mask);
    Ok(payload)
}
