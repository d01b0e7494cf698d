#![forbid(unsafe_code)]

pub mod config;
pub mod error;

mod util;

pub mod store;

pub mod client;

pub mod catalog;
pub mod codec;

pub mod crypto {
    pub mod cipher;
    pub mod kdf;
}

pub mod chain;
pub mod frame;

pub mod vfs;

// Re-exports: stable API surface
pub use catalog::{Alphabet, Catalog};
pub use chain::{ChainStore, Header};
pub use client::Client;
pub use config::Config;
pub use error::{ChainFsError, Result};
pub use vfs::Vfs;
