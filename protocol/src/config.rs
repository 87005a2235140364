//! # Protocol Constants
//!
//! Every magic number of the payment-code protocol lives here. The values
//! are consensus- or interop-relevant: changing any of them silently breaks
//! compatibility with every other BIP-47 wallet on the network, so don't.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Payment Code Wire Format
// ---------------------------------------------------------------------------

/// Binary length of a serialized payment code payload.
pub const PAYMENT_CODE_LEN: usize = 80;

/// The single prefix byte prepended before Base58Check encoding.
/// 0x47 makes every encoded v1 payment code start with "PM8T".
pub const PAYMENT_CODE_PREFIX: u8 = 0x47;

/// Version byte of a v1 payment code. v2 and v3 are out of scope.
pub const PAYMENT_CODE_VERSION_1: u8 = 0x01;

/// Character length of a Base58Check-encoded v1 payment code.
pub const PAYMENT_CODE_TEXT_LEN: usize = 116;

/// Offset of the maskable region inside the payload: the 64 bytes of
/// pubkey-x plus chain code. The sign byte at offset 2 is never masked.
pub const BLIND_REGION_START: usize = 3;

/// Length of the maskable region (and of the HMAC-SHA-512 mask).
pub const BLIND_REGION_LEN: usize = 64;

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// BIP-43 purpose index for payment codes: m/47'.
pub const PURPOSE_BIP47: u32 = 47;

/// How many incoming addresses a channel keeps ahead of the last one seen.
/// Ten is what the rest of the ecosystem generates, so ten it is.
pub const LOOKAHEAD: u32 = 10;

// ---------------------------------------------------------------------------
// Notification Transactions
// ---------------------------------------------------------------------------

/// Default fee rate in satoshis per 1000 bytes.
pub const DEFAULT_FEE_PER_KB: u64 = 100_000;

/// Fee rate, in satoshis per 1000 bytes, applied when building
/// transactions on chains that do not sign with the fork-id flag.
pub const NON_FORK_ID_FEE_PER_KB: u64 = 141_000;

/// How many notification transactions in a single block trigger a Bloom
/// filter rebuild via the external filter-exhaustion mechanism.
pub const FILTER_EXHAUSTION_NTX_THRESHOLD: u32 = 5;

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// The wallet file is autosaved at most this often by the embedding
/// wallet framework. The sidecar is written on every mutation instead.
pub const WALLET_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(5);

/// File extension of the serialized wallet, e.g. `BTC.wallet`.
pub const WALLET_FILE_EXT: &str = "wallet";

/// File extension of the SPV header chain, e.g. `BTC.spvchain`.
pub const CHAIN_FILE_EXT: &str = "spvchain";

/// File extension of the BIP-47 sidecar, e.g. `BTC.bip47`.
pub const SIDECAR_FILE_EXT: &str = "bip47";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blind_region_covers_pubkey_and_chain_code() {
        // version + features + sign byte, then 32 + 32 maskable bytes,
        // then 13 reserved bytes.
        assert_eq!(BLIND_REGION_START, 3);
        assert_eq!(BLIND_REGION_START + BLIND_REGION_LEN + 13, PAYMENT_CODE_LEN);
    }

    #[test]
    fn lookahead_is_positive() {
        assert!(LOOKAHEAD > 0);
    }

    #[test]
    fn autosave_interval_sanity() {
        assert_eq!(WALLET_AUTOSAVE_INTERVAL.as_secs(), 5);
    }
}
