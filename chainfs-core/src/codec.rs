//! Symbol codec: bijective mapping between raw bytes and store tokens.
//! Two bytes map to one pair token; an odd trailing byte is spelled out as
//! eight single-bit tokens rather than through a second 8-bit table.

use crate::catalog::{Alphabet, Symbol};
use crate::error::{ChainFsError, Result};
use crate::store::{Fingerprint, TokenId};

pub fn encode(alphabet: &impl Alphabet, data: &[u8]) -> Vec<TokenId> {
    let mut out = Vec::with_capacity(data.len() / 2 + 8);
    let mut pairs = data.chunks_exact(2);
    for pair in &mut pairs {
        let value = u16::from_be_bytes([pair[0], pair[1]]);
        out.push(alphabet.token_for_pair(value).clone());
    }
    if let [tail] = pairs.remainder() {
        for i in (0..8).rev() {
            out.push(alphabet.token_for_bit(tail >> i & 1 == 1).clone());
        }
    }
    out
}

pub fn decode(alphabet: &impl Alphabet, fingerprints: &[Fingerprint]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(fingerprints.len() * 2);
    // Bit accumulator; a symbol contributes 16 or 1 bits.
    let mut acc: u32 = 0;
    let mut acc_len: u32 = 0;
    for fingerprint in fingerprints {
        let symbol = alphabet.symbol_for(fingerprint).ok_or_else(|| {
            ChainFsError::CodecLookup(format!("unknown token fingerprint {fingerprint:?}"))
        })?;
        match symbol {
            Symbol::Pair(v) => {
                acc = acc << 16 | v as u32;
                acc_len += 16;
            }
            Symbol::Bit(b) => {
                acc = acc << 1 | b as u32;
                acc_len += 1;
            }
        }
        while acc_len >= 8 {
            acc_len -= 8;
            out.push((acc >> acc_len) as u8);
            acc &= (1 << acc_len) - 1;
        }
    }
    if acc_len != 0 {
        return Err(ChainFsError::CodecLookup(format!(
            "decoded bit stream is not byte aligned ({acc_len} stray bits)"
        )));
    }
    Ok(out)
}
