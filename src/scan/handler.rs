//! Scan-and-store body handler

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use metrics::counter;
use tracing::{debug, warn};

use super::index::IndexAggregator;
use super::scanner::{ChunkScanner, Rechunker, Target};
use super::ScanError;
use crate::downloader::{BodyHandler, BodyStream, HandlerError};
use crate::store::ShardStore;

/// How a single file's scan ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileScan {
    /// Whole body consumed and stored
    Completed(Option<u64>),
    /// Stopped once the file could no longer reach the best offset
    Pruned { at_chunk: u64 },
}

/// Streams a body through a [`ChunkScanner`] into the shard store
#[derive(Debug, Clone)]
pub struct ScanHandler {
    target: Target,
    chunk_size: usize,
    store: Arc<ShardStore>,
    index: Arc<IndexAggregator>,
}

impl ScanHandler {
    /// Create a handler. `chunk_size` must be non-zero.
    pub fn new(
        target: Target,
        chunk_size: usize,
        store: Arc<ShardStore>,
        index: Arc<IndexAggregator>,
    ) -> Result<Self, ScanError> {
        if chunk_size == 0 {
            return Err(ScanError::InvalidChunkSize);
        }
        Ok(Self {
            target,
            chunk_size,
            store,
            index,
        })
    }

    /// Scan and store one body. Returns the file's first-occurrence offset
    /// when the file ran to completion and matched.
    ///
    /// The candidate is reported only after every chunk has been stored, so
    /// any file in the winner set has its full content on disk.
    pub async fn process(&self, filename: &str, body: BodyStream) -> Result<Option<u64>, ScanError> {
        match self.scan_and_store(filename, body).await {
            Ok(FileScan::Completed(Some(offset))) => {
                if !self.index.report_candidate(filename, offset).await {
                    self.discard(filename).await;
                }
                Ok(Some(offset))
            }
            Ok(FileScan::Completed(None)) => {
                debug!(file = %filename, target = %self.target, "No match in file");
                self.discard(filename).await;
                Ok(None)
            }
            Ok(FileScan::Pruned { at_chunk }) => {
                counter!("scans_pruned_total").increment(1);
                debug!(file = %filename, chunk = at_chunk, "Scan pruned, file cannot win");
                self.discard(filename).await;
                Ok(None)
            }
            Err(e) => {
                self.discard(filename).await;
                Err(e)
            }
        }
    }

    async fn scan_and_store(&self, filename: &str, mut body: BodyStream) -> Result<FileScan, ScanError> {
        let mut scanner = ChunkScanner::new(self.target.clone(), self.chunk_size);
        let mut rechunker = Rechunker::new(self.chunk_size);

        while let Some(frame) = body.next().await {
            let frame = frame.map_err(|e| ScanError::StreamError(e.to_string()))?;
            for chunk in rechunker.push(&frame) {
                if let Some(pruned) = self.scan_chunk(filename, &mut scanner, &chunk).await? {
                    return Ok(pruned);
                }
            }
        }
        if let Some(chunk) = rechunker.finish() {
            if let Some(pruned) = self.scan_chunk(filename, &mut scanner, &chunk).await? {
                return Ok(pruned);
            }
        }

        Ok(FileScan::Completed(scanner.matched()))
    }

    async fn scan_chunk(
        &self,
        filename: &str,
        scanner: &mut ChunkScanner,
        chunk: &[u8],
    ) -> Result<Option<FileScan>, ScanError> {
        if let Some(offset) = scanner.feed(chunk) {
            debug!(file = %filename, offset, "Target located");
        }

        if !scanner.can_still_win(self.index.best_hint()) {
            return Ok(Some(FileScan::Pruned {
                at_chunk: scanner.chunks_seen(),
            }));
        }

        self.store
            .store_shard(filename, scanner.chunks_seen(), chunk)
            .await?;
        counter!("shards_written_total").increment(1);
        counter!("shard_bytes_written_total").increment(chunk.len() as u64);
        Ok(None)
    }

    async fn discard(&self, filename: &str) {
        if let Err(e) = self.store.discard(filename).await {
            warn!("Failed to discard shards of '{}': {}", filename, e);
        }
    }
}

#[async_trait]
impl BodyHandler for ScanHandler {
    async fn on_body(&self, filename: &str, body: BodyStream) -> Result<(), HandlerError> {
        self.process(filename, body).await?;
        Ok(())
    }
}
