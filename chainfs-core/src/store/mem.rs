//! In-memory store backend. Fingerprints are the token ids themselves.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{ChainFsError, Result};
use crate::store::{
    BLOCK_CAPACITY, BlockId, BlockMeta, OwnedPage, Page, RawStore, TokenId,
};

pub struct MemStore {
    blocks: HashMap<BlockId, (BlockMeta, Vec<TokenId>)>,
    /// Creation order, for a stable owned-blocks listing.
    order: Vec<BlockId>,
    next_id: u64,
    /// Listing page size; small values exercise pagination in tests.
    pub page_size: usize,
    /// While nonzero, every raw call fails with a throttling signal and
    /// decrements the counter. Lets tests script consecutive throttles.
    pub throttle_next: u32,
    /// Suggested wait attached to injected throttles.
    pub retry_after: Option<Duration>,
    /// Raw calls attempted, throttled ones included.
    pub calls: u32,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            blocks: HashMap::new(),
            order: Vec::new(),
            next_id: 0,
            page_size: super::LIST_PAGE,
            throttle_next: 0,
            retry_after: None,
            calls: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn gate(&mut self) -> Result<()> {
        self.calls += 1;
        if self.throttle_next > 0 {
            self.throttle_next -= 1;
            return Err(ChainFsError::RateLimited {
                retry_after: self.retry_after,
            });
        }
        Ok(())
    }

    fn block(&self, id: &BlockId) -> Result<&(BlockMeta, Vec<TokenId>)> {
        self.blocks
            .get(id)
            .ok_or_else(|| ChainFsError::Remote(format!("no such block {id}")))
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RawStore for MemStore {
    fn create(&mut self, meta: &BlockMeta) -> Result<BlockId> {
        self.gate()?;
        let id = format!("mem-{:06}", self.next_id);
        self.next_id += 1;
        self.blocks.insert(id.clone(), (meta.clone(), Vec::new()));
        self.order.push(id.clone());
        Ok(id)
    }

    fn append_batch(&mut self, id: &BlockId, tokens: &[TokenId]) -> Result<()> {
        self.gate()?;
        let (_, stored) = self
            .blocks
            .get_mut(id)
            .ok_or_else(|| ChainFsError::Remote(format!("no such block {id}")))?;
        if stored.len() + tokens.len() > BLOCK_CAPACITY {
            return Err(ChainFsError::Remote(format!("block {id} is full")));
        }
        stored.extend_from_slice(tokens);
        Ok(())
    }

    fn list_page(&mut self, id: &BlockId, cursor: Option<u64>) -> Result<Page> {
        self.gate()?;
        let (_, tokens) = self.block(id)?;
        let start = cursor.unwrap_or(0) as usize;
        let end = (start + self.page_size).min(tokens.len());
        Ok(Page {
            fingerprints: tokens[start..end].to_vec(),
            next: (end < tokens.len()).then_some(end as u64),
        })
    }

    fn delete(&mut self, id: &BlockId) -> Result<()> {
        self.gate()?;
        if self.blocks.remove(id).is_none() {
            return Err(ChainFsError::Remote(format!("no such block {id}")));
        }
        self.order.retain(|o| o != id);
        Ok(())
    }

    fn list_owned_page(&mut self, cursor: Option<u64>) -> Result<OwnedPage> {
        self.gate()?;
        let start = cursor.unwrap_or(0) as usize;
        let end = (start + self.page_size).min(self.order.len());
        let blocks = self.order[start..end]
            .iter()
            .map(|id| (id.clone(), self.blocks[id].0.clone()))
            .collect();
        Ok(OwnedPage {
            blocks,
            next: (end < self.order.len()).then_some(end as u64),
        })
    }
}
