//! Chain writer/reader: carries an arbitrary byte stream across one or more
//! linked blocks. The payload travels as base64 text, cut into fixed-length
//! chunks; each chunk rides in one record, padded to a constant size, sealed,
//! and symbol-encoded into the block's tokens.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::client::Client;
use crate::codec;
use crate::crypto::{cipher, kdf::SecretKey};
use crate::error::{ChainFsError, Result};
use crate::frame;
use crate::store::{BLOCK_CAPACITY, BlockId, BlockMeta, RawStore, TokenId};
use crate::util::random_hex;

/// Base64 characters of payload carried per block.
pub const CHUNK_LEN: usize = 18_800;
/// Serialized records are padded to this length before sealing. The slack
/// above `CHUNK_LEN` absorbs CBOR overhead, the forward link and header
/// fields; the sealed frame must still symbol-encode within `BLOCK_CAPACITY`.
pub const RECORD_SIZE: usize = CHUNK_LEN + 512;

/// Free-form metadata carried on a chain's head record (e.g. the filename).
pub type Header = BTreeMap<String, String>;

/// Logical content of one block, pre-padding and pre-encryption. Only the
/// head record carries header fields; the last record has no `next`.
#[derive(Debug, Serialize, Deserialize)]
struct Record {
    content: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    next: Option<BlockId>,
    #[serde(flatten)]
    header: Header,
}

pub struct ChainStore<S: RawStore> {
    client: Client<S>,
    catalog: Catalog,
    key: SecretKey,
}

impl<S: RawStore> ChainStore<S> {
    pub fn new(client: Client<S>, catalog: Catalog, key: SecretKey) -> Self {
        Self {
            client,
            catalog,
            key,
        }
    }

    pub fn key(&self) -> &SecretKey {
        &self.key
    }

    pub fn client_mut(&mut self) -> &mut Client<S> {
        &mut self.client
    }

    pub fn into_client(self) -> Client<S> {
        self.client
    }

    /// Upload `data` as a fresh chain; returns the head block id.
    ///
    /// All blocks are created before any record is written, so forward links
    /// always point at existing blocks. `label`, when given, becomes the
    /// head block's title (deterministic, discoverable); every other piece
    /// of block metadata is random hex and purely opaque.
    pub fn upload(&mut self, data: &[u8], header: &Header, label: Option<&str>) -> Result<BlockId> {
        let text = BASE64.encode(data);
        // base64 is ASCII, so byte offsets are char boundaries
        let chunks: Vec<&str> = if text.is_empty() {
            vec![""]
        } else {
            (0..text.len())
                .step_by(CHUNK_LEN)
                .map(|i| &text[i..(i + CHUNK_LEN).min(text.len())])
                .collect()
        };

        let mut ids = Vec::with_capacity(chunks.len());
        for i in 0..chunks.len() {
            let title = match (i, label) {
                (0, Some(l)) => l.to_string(),
                _ => random_hex::<16>()?,
            };
            let meta = BlockMeta {
                title,
                description: random_hex::<16>()?,
            };
            ids.push(self.client.create(&meta)?);
        }

        for (i, chunk) in chunks.iter().enumerate() {
            let record = Record {
                content: (*chunk).to_string(),
                next: ids.get(i + 1).cloned(),
                header: if i == 0 { header.clone() } else { Header::new() },
            };
            let tokens = self.encode_record(&record, &ids[i])?;
            self.client.append(&ids[i], &tokens)?;
        }
        info!("uploaded chain of {} block(s), head {}", ids.len(), ids[0]);
        Ok(ids.swap_remove(0))
    }

    /// Download a whole chain; returns the head record's header fields and
    /// the original bytes. Any failure along the walk aborts the read —
    /// partial content is never returned.
    pub fn download(&mut self, head: &BlockId) -> Result<(Header, Vec<u8>)> {
        let mut record = self.read_record(head)?;
        let header = std::mem::take(&mut record.header);
        let mut text = record.content;
        while let Some(next) = record.next.take() {
            record = self.read_record(&next)?;
            text.push_str(&record.content);
        }
        let data = BASE64
            .decode(text.as_bytes())
            .map_err(|e| ChainFsError::Format(format!("chain {head}: invalid payload text: {e}")))?;
        debug!("downloaded {} bytes from chain {head}", data.len());
        Ok((header, data))
    }

    /// Delete every block of a chain. The chain is walked first to learn
    /// its membership, then deleted front to back; an interruption mid-way
    /// leaves the not-yet-deleted tail blocks orphaned.
    pub fn remove(&mut self, head: &BlockId) -> Result<()> {
        let mut ids = vec![head.clone()];
        let mut record = self.read_record(head)?;
        while let Some(next) = record.next.take() {
            record = self.read_record(&next)?;
            ids.push(next);
        }
        for id in &ids {
            self.client.delete(id)?;
        }
        info!("removed chain of {} block(s), head {head}", ids.len());
        Ok(())
    }

    fn encode_record(&self, record: &Record, id: &BlockId) -> Result<Vec<TokenId>> {
        let mut raw = Vec::with_capacity(RECORD_SIZE);
        ciborium::ser::into_writer(record, &mut raw)
            .map_err(|e| ChainFsError::Format(format!("record for block {id}: {e}")))?;
        let framed = frame::pad(&raw, RECORD_SIZE)?;
        let sealed = cipher::seal(self.key.cipher_key(), &framed)?;
        let tokens = codec::encode(&self.catalog, &sealed);
        if tokens.len() > BLOCK_CAPACITY {
            return Err(ChainFsError::Capacity {
                needed: tokens.len(),
                capacity: BLOCK_CAPACITY,
            });
        }
        Ok(tokens)
    }

    fn read_record(&mut self, id: &BlockId) -> Result<Record> {
        let fingerprints = self.client.list(id)?;
        if fingerprints.is_empty() {
            return Err(ChainFsError::CodecLookup(format!(
                "block {id} holds no tokens (incomplete chain?)"
            )));
        }
        let sealed = codec::decode(&self.catalog, &fingerprints)?;
        let framed = cipher::open(self.key.cipher_key(), &sealed)?;
        let raw = frame::unpad(&framed)?;
        ciborium::de::from_reader(raw)
            .map_err(|e| ChainFsError::Format(format!("record in block {id}: {e}")))
    }
}
