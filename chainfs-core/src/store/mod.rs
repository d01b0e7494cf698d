//! The remote object-store seam: opaque containers holding bounded metadata
//! and an ordered, capacity-limited sequence of tokens.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Hard cap on tokens one block can hold.
pub const BLOCK_CAPACITY: usize = 10_000;
/// Tokens accepted by one raw append call.
pub const APPEND_BATCH: usize = 100;
/// Fingerprints returned per listing page.
pub const LIST_PAGE: usize = 100;

/// Opaque id of one remote container.
pub type BlockId = String;
/// Opaque handle used to append a token to a block.
pub type TokenId = String;
/// Stable identity of a token as it appears in listing responses.
pub type Fingerprint = String;

/// The two short text fields a block carries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockMeta {
    pub title: String,
    pub description: String,
}

/// One page of a block's token listing.
#[derive(Debug)]
pub struct Page {
    pub fingerprints: Vec<Fingerprint>,
    pub next: Option<u64>,
}

/// One page of the caller-owned block listing.
#[derive(Debug)]
pub struct OwnedPage {
    pub blocks: Vec<(BlockId, BlockMeta)>,
    pub next: Option<u64>,
}

/// Transport to the remote store: one raw call per method. Pacing, retry,
/// append batching and pagination draining all live in the client wrapper;
/// a throttling response surfaces as `ChainFsError::RateLimited`.
pub trait RawStore {
    fn create(&mut self, meta: &BlockMeta) -> Result<BlockId>;

    fn append_batch(&mut self, id: &BlockId, tokens: &[TokenId]) -> Result<()>;

    fn list_page(&mut self, id: &BlockId, cursor: Option<u64>) -> Result<Page>;

    fn delete(&mut self, id: &BlockId) -> Result<()>;

    fn list_owned_page(&mut self, cursor: Option<u64>) -> Result<OwnedPage>;
}

pub mod fs;
pub mod mem;
