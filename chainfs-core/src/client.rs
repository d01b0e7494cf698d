//! Rate-limited, retrying wrapper around the raw transport. The only layer
//! that retries anything: throttling signals back off with a bounded budget,
//! every other error propagates untouched.

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::config::Config;
use crate::error::{ChainFsError, Result};
use crate::store::{
    APPEND_BATCH, BLOCK_CAPACITY, BlockId, BlockMeta, Fingerprint, RawStore, TokenId,
};

/// Single-lane pacing gate: no two remote calls dispatch closer together
/// than `min_interval`, regardless of caller concurrency.
pub struct RateLimiter {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    /// Blocks until at least `min_interval` has passed since the previous
    /// dispatch. The lock is held across the sleep, so concurrent callers
    /// queue up behind it.
    pub fn pace(&self) {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                thread::sleep(self.min_interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Exponential backoff, unless the store suggested its own wait.
    fn delay(&self, attempt: u32, suggested: Option<Duration>) -> Duration {
        suggested.unwrap_or_else(|| self.base_delay.saturating_mul(1 << attempt.min(16)))
    }
}

pub struct Client<S: RawStore> {
    store: S,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl<S: RawStore> Client<S> {
    pub fn new(store: S, config: &Config) -> Self {
        Self {
            store,
            limiter: RateLimiter::new(config.min_interval),
            retry: RetryPolicy {
                max_attempts: config.max_attempts,
                base_delay: config.retry_base,
            },
        }
    }

    pub fn raw(&self) -> &S {
        &self.store
    }

    pub fn raw_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    /// Pace, dispatch, and retry throttles with an explicit bounded loop.
    fn call<T>(&mut self, mut op: impl FnMut(&mut S) -> Result<T>) -> Result<T> {
        let mut attempt = 0u32;
        loop {
            self.limiter.pace();
            match op(&mut self.store) {
                Err(ChainFsError::RateLimited { retry_after }) => {
                    attempt += 1;
                    if attempt > self.retry.max_attempts {
                        warn!("rate limit budget exhausted after {attempt} attempts");
                        return Err(ChainFsError::RateLimited { retry_after });
                    }
                    let wait = self.retry.delay(attempt - 1, retry_after);
                    debug!("throttled, backing off {wait:?} (attempt {attempt})");
                    thread::sleep(wait);
                }
                other => return other,
            }
        }
    }

    pub fn create(&mut self, meta: &BlockMeta) -> Result<BlockId> {
        self.call(|s| s.create(meta))
    }

    /// Append tokens in transport-sized batches, after checking the block's
    /// token budget up front so nothing is written on overflow.
    pub fn append(&mut self, id: &BlockId, tokens: &[TokenId]) -> Result<()> {
        if tokens.len() > BLOCK_CAPACITY {
            return Err(ChainFsError::Capacity {
                needed: tokens.len(),
                capacity: BLOCK_CAPACITY,
            });
        }
        for batch in tokens.chunks(APPEND_BATCH) {
            self.call(|s| s.append_batch(id, batch))?;
        }
        Ok(())
    }

    /// All token fingerprints of a block, in order, following continuation
    /// cursors until exhausted.
    pub fn list(&mut self, id: &BlockId) -> Result<Vec<Fingerprint>> {
        let mut out = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.call(|s| s.list_page(id, cursor))?;
            out.extend(page.fingerprints);
            match page.next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        Ok(out)
    }

    pub fn delete(&mut self, id: &BlockId) -> Result<()> {
        self.call(|s| s.delete(id))
    }

    /// Every block the caller owns, with its metadata.
    pub fn list_owned(&mut self) -> Result<Vec<(BlockId, BlockMeta)>> {
        let mut out = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.call(|s| s.list_owned_page(cursor))?;
            out.extend(page.blocks);
            match page.next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mem::MemStore;

    fn meta() -> BlockMeta {
        BlockMeta {
            title: "t".to_string(),
            description: String::new(),
        }
    }

    fn client(store: MemStore) -> Client<MemStore> {
        let config = Config {
            min_interval: Duration::ZERO,
            max_attempts: 3,
            retry_base: Duration::from_millis(1),
        };
        Client::new(store, &config)
    }

    fn tokens(n: usize) -> Vec<TokenId> {
        (0..n).map(|i| format!("tok-{i}")).collect()
    }

    #[test]
    fn pacing_spaces_out_calls() {
        let limiter = RateLimiter::new(Duration::from_millis(20));
        let start = Instant::now();
        for _ in 0..4 {
            limiter.pace();
        }
        // 4 dispatches need at least 3 full intervals between them.
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn throttles_are_retried() {
        let mut store = MemStore::new();
        store.throttle_next = 2;
        let mut client = client(store);
        let id = client.create(&meta()).unwrap();
        assert!(!id.is_empty());
        assert_eq!(client.raw().calls, 3);
    }

    #[test]
    fn throttling_exhausts_the_budget() {
        let mut store = MemStore::new();
        store.throttle_next = 10;
        let mut client = client(store);
        let err = client.create(&meta()).unwrap_err();
        assert!(matches!(err, ChainFsError::RateLimited { .. }));
        // initial call plus max_attempts retries
        assert_eq!(client.raw().calls, 4);
    }

    #[test]
    fn suggested_wait_is_honored() {
        let mut store = MemStore::new();
        store.throttle_next = 1;
        store.retry_after = Some(Duration::from_millis(5));
        let mut client = Client::new(
            store,
            &Config {
                min_interval: Duration::ZERO,
                max_attempts: 3,
                retry_base: Duration::from_secs(5),
            },
        );
        let start = Instant::now();
        client.create(&meta()).unwrap();
        // The 5s exponential base would blow way past this bound.
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn oversized_append_is_rejected_before_dispatch() {
        let mut client = client(MemStore::new());
        let id = client.create(&meta()).unwrap();
        let err = client.append(&id, &tokens(BLOCK_CAPACITY + 1)).unwrap_err();
        assert!(matches!(err, ChainFsError::Capacity { .. }));
        // only the create reached the store
        assert_eq!(client.raw().calls, 1);
    }

    #[test]
    fn appends_are_batched() {
        let mut client = client(MemStore::new());
        let id = client.create(&meta()).unwrap();
        client.append(&id, &tokens(250)).unwrap();
        // create + ceil(250 / APPEND_BATCH) appends
        assert_eq!(client.raw().calls, 4);
        assert_eq!(client.list(&id).unwrap().len(), 250);
    }

    #[test]
    fn listing_drains_all_pages() {
        let mut store = MemStore::new();
        store.page_size = 10;
        let mut client = client(store);
        let id = client.create(&meta()).unwrap();
        let all = tokens(35);
        client.append(&id, &all).unwrap();
        assert_eq!(client.list(&id).unwrap(), all);
    }

    #[test]
    fn non_throttle_errors_propagate_immediately() {
        let mut client = client(MemStore::new());
        let before = client.raw().calls;
        let err = client.delete(&"missing".to_string()).unwrap_err();
        assert!(matches!(err, ChainFsError::Remote(_)));
        assert_eq!(client.raw().calls, before + 1);
    }
}
