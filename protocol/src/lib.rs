// Copyright (c) 2026 Paycode Labs. MIT License.
// See LICENSE for details.

//! # Paycode Protocol — Core Library
//!
//! This crate is the cryptographic and state-machine core of a BIP-47
//! wallet running in SPV mode. BIP-47 lets a sender pay a recipient
//! through a sequence of unlinkable one-time addresses derived from a
//! shared identifier called a *payment code*. One out-of-band handshake,
//! zero on-chain address reuse.
//!
//! Four chains are supported: Bitcoin and Bitcoin Cash, mainnet and
//! testnet3 each. Only version 1 payment codes are implemented.
//!
//! ## Architecture
//!
//! The crate is split into modules that mirror the actual concerns of a
//! payment-code wallet:
//!
//! - **crypto** — BIP-39 seeds, BIP-32 derivation, ECDH secret points
//!   and the notification blinding mask. Don't roll your own.
//! - **identity** — payment codes, BIP-47 accounts and P2PKH addresses.
//! - **transaction** — the minimal transaction and script model the
//!   notification codec needs. Signing lives outside this crate.
//! - **notification** — building and parsing the on-chain notification
//!   transaction that bootstraps a payment channel.
//! - **channel** — per-counterparty address lookahead and channel state.
//! - **wallet** — the coordinator that owns the seed, the channels and
//!   the sidecar file, and reacts to SPV callbacks.
//! - **params** — per-chain constants and header difficulty validation,
//!   including the Bitcoin Cash DAA.
//! - **config** — protocol constants. If you are hardcoding a constant
//!   somewhere else, you are doing it wrong.
//!
//! ## Design Philosophy
//!
//! 1. Deterministic derivation everywhere. Same seed, same keys, always.
//! 2. No global network state. Parameters are plain values passed in.
//! 3. Data errors are `Result`s, not panics. If it touches money, it
//!    has tests. Plural.

pub mod channel;
pub mod config;
pub mod crypto;
pub mod identity;
pub mod notification;
pub mod params;
pub mod transaction;
pub mod wallet;
