//! Transaction structures and wire serialization.
//!
//! Byte order follows the bitcoin wire format: integers little-endian,
//! transaction and block hashes in internal (non-display) order. The
//! hex people read on block explorers is these 32 bytes reversed.

use std::fmt;
use thiserror::Error;

use crate::crypto::ecdh::OUTPOINT_LEN;
use crate::crypto::hash::sha256d;

/// Errors from transaction deserialization.
#[derive(Debug, Error)]
pub enum TxError {
    /// Ran out of bytes mid-structure.
    #[error("transaction truncated")]
    Truncated,

    /// A length prefix exceeded sane bounds.
    #[error("transaction length field too large")]
    Oversize,

    /// Bytes were left over after the last field.
    #[error("{0} trailing bytes after transaction")]
    TrailingBytes(usize),
}

/// Reference to an output of a previous transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OutPoint {
    /// Funding transaction id, internal byte order.
    pub txid: [u8; 32],
    /// Index of the spent output.
    pub vout: u32,
}

impl OutPoint {
    /// The 36-byte wire form, which also keys the notification
    /// blinding mask.
    pub fn to_wire_bytes(&self) -> [u8; OUTPOINT_LEN] {
        let mut out = [0u8; OUTPOINT_LEN];
        out[..32].copy_from_slice(&self.txid);
        out[32..].copy_from_slice(&self.vout.to_le_bytes());
        out
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut display = self.txid;
        display.reverse();
        write!(f, "{}:{}", hex::encode(display), self.vout)
    }
}

/// A transaction input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxIn {
    pub previous_output: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

/// A transaction output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOut {
    /// Value in satoshis.
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

/// A non-segwit transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    /// Wire serialization.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.weight_estimate());
        out.extend_from_slice(&self.version.to_le_bytes());
        write_varint(&mut out, self.inputs.len() as u64);
        for input in &self.inputs {
            out.extend_from_slice(&input.previous_output.to_wire_bytes());
            write_varint(&mut out, input.script_sig.len() as u64);
            out.extend_from_slice(&input.script_sig);
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_varint(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            out.extend_from_slice(&output.value.to_le_bytes());
            write_varint(&mut out, output.script_pubkey.len() as u64);
            out.extend_from_slice(&output.script_pubkey);
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out
    }

    /// Parses a wire-format transaction. The whole slice must be
    /// consumed.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, TxError> {
        let mut cursor = Cursor { bytes, pos: 0 };

        let version = i32::from_le_bytes(cursor.take_array::<4>()?);
        let input_count = cursor.take_varint()?;
        let mut inputs = Vec::with_capacity(input_count.min(1024) as usize);
        for _ in 0..input_count {
            let txid = cursor.take_array::<32>()?;
            let vout = u32::from_le_bytes(cursor.take_array::<4>()?);
            let script_len = cursor.take_varint()?;
            let script_sig = cursor.take_bytes(script_len)?.to_vec();
            let sequence = u32::from_le_bytes(cursor.take_array::<4>()?);
            inputs.push(TxIn {
                previous_output: OutPoint { txid, vout },
                script_sig,
                sequence,
            });
        }
        let output_count = cursor.take_varint()?;
        let mut outputs = Vec::with_capacity(output_count.min(1024) as usize);
        for _ in 0..output_count {
            let value = u64::from_le_bytes(cursor.take_array::<8>()?);
            let script_len = cursor.take_varint()?;
            let script_pubkey = cursor.take_bytes(script_len)?.to_vec();
            outputs.push(TxOut {
                value,
                script_pubkey,
            });
        }
        let lock_time = u32::from_le_bytes(cursor.take_array::<4>()?);

        if cursor.pos != bytes.len() {
            return Err(TxError::TrailingBytes(bytes.len() - cursor.pos));
        }
        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    /// Transaction id: double SHA-256 of the serialization, internal
    /// byte order.
    pub fn txid(&self) -> [u8; 32] {
        sha256d(&self.serialize())
    }

    /// The display form of the transaction id, reversed hex.
    pub fn txid_hex(&self) -> String {
        let mut id = self.txid();
        id.reverse();
        hex::encode(id)
    }

    /// Rough serialized size for fee math, assuming inputs will carry a
    /// typical P2PKH scriptSig once signed.
    pub fn weight_estimate(&self) -> usize {
        let inputs: usize = self
            .inputs
            .iter()
            .map(|i| 40 + i.script_sig.len().max(107) + 1)
            .sum();
        let outputs: usize = self
            .outputs
            .iter()
            .map(|o| 9 + o.script_pubkey.len())
            .sum();
        10 + inputs + outputs
    }
}

fn write_varint(out: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => out.push(value as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take_bytes(&mut self, len: u64) -> Result<&'a [u8], TxError> {
        let len = usize::try_from(len).map_err(|_| TxError::Oversize)?;
        let end = self.pos.checked_add(len).ok_or(TxError::Oversize)?;
        if end > self.bytes.len() {
            return Err(TxError::Truncated);
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], TxError> {
        let slice = self.take_bytes(N as u64)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn take_varint(&mut self) -> Result<u64, TxError> {
        let first = self.take_array::<1>()?[0];
        Ok(match first {
            0xfd => u16::from_le_bytes(self.take_array::<2>()?) as u64,
            0xfe => u32::from_le_bytes(self.take_array::<4>()?) as u64,
            0xff => u64::from_le_bytes(self.take_array::<8>()?),
            n => n as u64,
        })
    }
}
