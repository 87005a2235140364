//! Script building and parsing helpers.
//!
//! Only the two templates BIP-47 cares about: P2PKH outputs and the
//! 80-byte `OP_RETURN` data push of a notification transaction, plus
//! extraction of the designated public key from a scriptSig.

use secp256k1::PublicKey;

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_RETURN: u8 = 0x6a;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;

/// Builds the canonical P2PKH scriptPubKey:
/// `OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG`.
pub fn p2pkh_script(hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    script.push(20);
    script.extend_from_slice(hash);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

/// Extracts the pubkey hash from a P2PKH scriptPubKey, if it is one.
pub fn p2pkh_destination(script: &[u8]) -> Option<[u8; 20]> {
    if script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 20
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
    {
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&script[3..23]);
        Some(hash)
    } else {
        None
    }
}

/// Builds an `OP_RETURN <data>` scriptPubKey. Pushes over 75 bytes use
/// `OP_PUSHDATA1`, which is how the 80-byte payment code payload goes
/// on the wire.
pub fn op_return_script(data: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(data.len() + 3);
    script.push(OP_RETURN);
    push_data(&mut script, data);
    script
}

/// Returns the single data push of an `OP_RETURN` output, if the script
/// is one.
pub fn op_return_payload(script: &[u8]) -> Option<&[u8]> {
    if script.first() != Some(&OP_RETURN) {
        return None;
    }
    let mut pushes = PushIter::new(&script[1..]);
    let data = pushes.next()?;
    // A second push or trailing opcodes make this something else.
    if pushes.next().is_some() {
        return None;
    }
    Some(data)
}

/// Finds the first push in a scriptSig that parses as a secp256k1
/// public key. For a P2PKH spend this is the key that signed, the
/// "designated" key of a notification transaction.
pub fn designated_pubkey(script_sig: &[u8]) -> Option<PublicKey> {
    PushIter::new(script_sig).find_map(|push| PublicKey::from_slice(push).ok())
}

fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    match data.len() {
        0..=75 => script.push(data.len() as u8),
        76..=255 => {
            script.push(OP_PUSHDATA1);
            script.push(data.len() as u8);
        }
        _ => {
            script.push(OP_PUSHDATA2);
            script.extend_from_slice(&(data.len() as u16).to_le_bytes());
        }
    }
    script.extend_from_slice(data);
}

/// Iterates over the data pushes of a script, skipping non-push
/// opcodes. Malformed tails terminate the iteration.
struct PushIter<'a> {
    script: &'a [u8],
    pos: usize,
}

impl<'a> PushIter<'a> {
    fn new(script: &'a [u8]) -> Self {
        Self { script, pos: 0 }
    }
}

impl<'a> Iterator for PushIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        while self.pos < self.script.len() {
            let opcode = self.script[self.pos];
            self.pos += 1;
            let len = match opcode {
                1..=75 => opcode as usize,
                OP_PUSHDATA1 => {
                    let len = *self.script.get(self.pos)? as usize;
                    self.pos += 1;
                    len
                }
                OP_PUSHDATA2 => {
                    let lo = *self.script.get(self.pos)? as usize;
                    let hi = *self.script.get(self.pos + 1)? as usize;
                    self.pos += 2;
                    lo | (hi << 8)
                }
                _ => continue,
            };
            let end = self.pos.checked_add(len)?;
            if end > self.script.len() {
                return None;
            }
            let data = &self.script[self.pos..end];
            self.pos = end;
            return Some(data);
        }
        None
    }
}
