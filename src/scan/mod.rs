//! Streaming scan of downloaded files
//!
//! Each downloaded body is consumed in fixed-size chunks by a [`ChunkScanner`],
//! which tracks the offset of the first target occurrence relative to the whole
//! file. Every chunk is handed to the [`crate::store::ShardStore`] as it passes
//! through, and the final offset is reported to the shared [`IndexAggregator`].
//!
//! # Components
//!
//! - [`scanner`] - stateful per-file search and frame rechunking
//! - [`index`] - run-wide minimum offset and winner set
//! - [`handler`] - the [`crate::downloader::BodyHandler`] tying both to storage

pub mod handler;
pub mod index;
pub mod scanner;

pub use handler::ScanHandler;
pub use index::{GlobalIndex, IndexAggregator};
pub use scanner::{ChunkScanner, Rechunker, Target, DEFAULT_CHUNK_SIZE};

use crate::store::StoreError;

/// Scan errors
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// Target is not exactly one character
    #[error("'{0}' is not a single character")]
    InvalidTarget(String),

    /// Chunk size of zero
    #[error("chunk size must be at least 1 byte")]
    InvalidChunkSize,

    /// Response body failed mid-stream
    #[error("stream error: {0}")]
    StreamError(String),

    /// Shard storage failed
    #[error("store error: {0}")]
    StoreError(#[from] StoreError),
}
