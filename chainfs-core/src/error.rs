use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainFsError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("capacity exceeded: {needed} tokens > block capacity {capacity}")]
    Capacity { needed: usize, capacity: usize },

    #[error("codec lookup failed: {0}")]
    CodecLookup(String),

    #[error("decryption failed (wrong key or corrupted block)")]
    Decryption,

    /// Throttling signal from the remote store. Retried internally by the
    /// client; surfaces only once the attempt budget is exhausted.
    #[error("rate limited by remote store")]
    RateLimited { retry_after: Option<Duration> },

    #[error("remote store error: {0}")]
    Remote(String),

    #[error("tree navigation: {0}")]
    TreeNavigation(String),

    #[error("format error: {0}")]
    Format(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, ChainFsError>;
