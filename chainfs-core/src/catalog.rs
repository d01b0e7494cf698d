//! Reference catalog: the frozen bijection between bit-strings and store
//! tokens. Established once out of band and never changed afterwards —
//! changing it invalidates everything already stored.

use std::collections::HashMap;
use std::collections::hash_map::Entry as MapEntry;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ChainFsError, Result};
use crate::store::{Fingerprint, TokenId};

/// Bits one pair token carries.
pub const SYMBOL_WIDTH: u32 = 16;
/// Pair-table size: one token per 16-bit value.
pub const PAIR_TABLE_LEN: usize = 1 << SYMBOL_WIDTH;

/// What one listed token decodes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Symbol {
    /// A full 16-bit group (two payload bytes).
    Pair(u16),
    /// A single bit of an odd tail byte.
    Bit(bool),
}

/// One usable remote token: the handle appends are made with, and the stable
/// fingerprint it resolves to in listing responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenRef {
    pub id: TokenId,
    pub fingerprint: Fingerprint,
}

/// The fixed bijection the symbol codec runs against.
pub trait Alphabet {
    fn token_for_pair(&self, value: u16) -> &TokenId;

    fn token_for_bit(&self, bit: bool) -> &TokenId;

    fn symbol_for(&self, fingerprint: &str) -> Option<Symbol>;
}

/// On-disk shape; the reverse table is rebuilt on load.
#[derive(Serialize, Deserialize)]
struct CatalogFile {
    pairs: Vec<TokenRef>,
    bits: [TokenRef; 2],
}

#[derive(Debug)]
pub struct Catalog {
    /// Indexed by the 16-bit value the token encodes.
    pairs: Vec<TokenRef>,
    /// Tokens for the single bits 0 and 1.
    bits: [TokenRef; 2],
    reverse: HashMap<Fingerprint, Symbol>,
}

impl Catalog {
    /// Validates partition sizes and fingerprint uniqueness across both
    /// partitions; violations are configuration errors.
    pub fn new(pairs: Vec<TokenRef>, bits: [TokenRef; 2]) -> Result<Self> {
        if pairs.len() != PAIR_TABLE_LEN {
            return Err(ChainFsError::Config(format!(
                "catalog pair table holds {} tokens, expected {PAIR_TABLE_LEN}",
                pairs.len()
            )));
        }
        let mut reverse = HashMap::with_capacity(PAIR_TABLE_LEN + 2);
        let symbols = pairs
            .iter()
            .enumerate()
            .map(|(i, t)| (t, Symbol::Pair(i as u16)))
            .chain(
                bits.iter()
                    .zip([Symbol::Bit(false), Symbol::Bit(true)])
                    .map(|(t, s)| (t, s)),
            );
        for (token, symbol) in symbols {
            match reverse.entry(token.fingerprint.clone()) {
                MapEntry::Vacant(slot) => {
                    slot.insert(symbol);
                }
                MapEntry::Occupied(_) => {
                    return Err(ChainFsError::Config(format!(
                        "catalog fingerprint {:?} is not unique",
                        token.fingerprint
                    )));
                }
            }
        }
        Ok(Self {
            pairs,
            bits,
            reverse,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| ChainFsError::Config(format!("catalog {}: {e}", path.display())))?;
        let file: CatalogFile = ciborium::de::from_reader(bytes.as_slice())
            .map_err(|e| ChainFsError::Config(format!("catalog {}: {e}", path.display())))?;
        Self::new(file.pairs, file.bits)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        #[derive(Serialize)]
        struct CatalogFileRef<'a> {
            pairs: &'a [TokenRef],
            bits: &'a [TokenRef; 2],
        }
        let mut buf = Vec::new();
        ciborium::ser::into_writer(
            &CatalogFileRef {
                pairs: &self.pairs,
                bits: &self.bits,
            },
            &mut buf,
        )
        .map_err(|e| ChainFsError::Format(format!("catalog: {e}")))?;
        std::fs::write(path, buf)?;
        Ok(())
    }

    /// Deterministic catalog whose fingerprints equal the token ids; pairs
    /// with the in-memory and directory-backed stores and with tests. Real
    /// remote catalogs are built out of band and loaded from disk.
    pub fn synthetic() -> Self {
        let pairs: Vec<TokenRef> = (0..PAIR_TABLE_LEN)
            .map(|v| {
                let name = format!("pair-{v:04x}");
                TokenRef {
                    id: name.clone(),
                    fingerprint: name,
                }
            })
            .collect();
        let bits = [0u8, 1].map(|b| {
            let name = format!("bit-{b}");
            TokenRef {
                id: name.clone(),
                fingerprint: name,
            }
        });
        let mut reverse = HashMap::with_capacity(PAIR_TABLE_LEN + 2);
        for (i, t) in pairs.iter().enumerate() {
            reverse.insert(t.fingerprint.clone(), Symbol::Pair(i as u16));
        }
        reverse.insert(bits[0].fingerprint.clone(), Symbol::Bit(false));
        reverse.insert(bits[1].fingerprint.clone(), Symbol::Bit(true));
        Self {
            pairs,
            bits,
            reverse,
        }
    }
}

impl Alphabet for Catalog {
    fn token_for_pair(&self, value: u16) -> &TokenId {
        &self.pairs[value as usize].id
    }

    fn token_for_bit(&self, bit: bool) -> &TokenId {
        &self.bits[bit as usize].id
    }

    fn symbol_for(&self, fingerprint: &str) -> Option<Symbol> {
        self.reverse.get(fingerprint).copied()
    }
}
