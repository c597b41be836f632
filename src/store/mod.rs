//! On-disk shard storage for downloaded file content
//!
//! Every downloaded file is persisted as a sequence of fixed-size shards in a
//! run-scoped temporary directory. Shards are appended as the scanner consumes
//! the response body, so no file is ever held in memory as a whole. Once the
//! winners are known, [`ShardStore::assemble`] stitches their shards back
//! together into a single ZIP archive.
//!
//! # Layout
//!
//! ```text
//! {temp root}/
//!   0/                  one directory per registered file (registration ordinal)
//!     a.txt1.tmp        shard 1 of "a.txt"
//!     a.txt2.tmp        shard 2 of "a.txt"
//!   1/
//!     b.txt1.tmp
//! ```
//!
//! The per-file directory keeps `{filename}{seq}.tmp` names unambiguous
//! (`a1` + `0` would otherwise collide with `a` + `10`).
//!
//! # Cleanup
//!
//! The temporary root is a [`tempfile::TempDir`], so every shard is removed when
//! the store is dropped, including on error paths and cancellation.
//! [`ShardStore::cleanup`] does the same eagerly and reports failures.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub mod archive;

use archive::ArchiveEntry;

/// Shard store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `assemble` was called without any filename
    #[error("no files to save")]
    NoFilesToSave,

    /// The filename was never registered with this store
    #[error("unknown file: {0}")]
    UnknownFile(String),

    /// Temporary storage error
    #[error("IO error: {0}")]
    IoError(String),

    /// Archive creation error
    #[error("archive error: {0}")]
    ArchiveError(String),
}

/// Result type for shard store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Reference to a single on-disk shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardRef {
    /// 1-based sequence number within the file
    pub seq: u64,
    /// Location of the shard blob
    pub path: PathBuf,
    /// Number of bytes in the shard
    pub len: usize,
}

/// Per-filename shard bookkeeping
#[derive(Debug, Clone)]
pub struct FileRecord {
    dir: PathBuf,
    shard_prefix: String,
    shards: Vec<ShardRef>,
}

impl FileRecord {
    /// Shards recorded so far, in arrival order
    pub fn shards(&self) -> &[ShardRef] {
        &self.shards
    }

    fn shard_path(&self, seq: u64) -> PathBuf {
        self.dir.join(format!("{}{}.tmp", self.shard_prefix, seq))
    }

    fn ordered_paths(&self) -> Vec<PathBuf> {
        let mut shards: Vec<&ShardRef> = self.shards.iter().collect();
        shards.sort_by_key(|s| s.seq);
        shards.into_iter().map(|s| s.path.clone()).collect()
    }
}

#[derive(Debug, Default)]
struct Registry {
    records: HashMap<String, FileRecord>,
    next_ordinal: usize,
}

/// Run-scoped store of file shards
#[derive(Debug)]
pub struct ShardStore {
    root: TempDir,
    registry: Mutex<Registry>,
}

impl ShardStore {
    /// Create a store rooted in a fresh directory under the OS temp dir
    pub fn new() -> StoreResult<Self> {
        let root = TempDir::with_prefix("charscan-")
            .map_err(|e| StoreError::IoError(format!("Failed to create temp dir: {e}")))?;
        Ok(Self::with_root(root))
    }

    /// Create a store rooted in a fresh directory under `parent`
    pub fn new_in<P: AsRef<Path>>(parent: P) -> StoreResult<Self> {
        let parent = parent.as_ref();
        let root = TempDir::with_prefix_in("charscan-", parent).map_err(|e| {
            StoreError::IoError(format!("Failed to create temp dir in {parent:?}: {e}"))
        })?;
        Ok(Self::with_root(root))
    }

    fn with_root(root: TempDir) -> Self {
        debug!("Shard store rooted at {:?}", root.path());
        Self {
            root,
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Temporary directory holding every shard of this run
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Register a file. Returns `false` if it was already registered.
    pub async fn register_file(&self, filename: &str) -> StoreResult<bool> {
        let dir = {
            let mut registry = self.registry.lock().await;
            if registry.records.contains_key(filename) {
                return Ok(false);
            }
            let dir = self.root.path().join(registry.next_ordinal.to_string());
            registry.next_ordinal += 1;
            registry.records.insert(
                filename.to_string(),
                FileRecord {
                    dir: dir.clone(),
                    shard_prefix: shard_prefix(filename),
                    shards: Vec::new(),
                },
            );
            dir
        };

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::IoError(format!("Failed to create {dir:?}: {e}")))?;
        Ok(true)
    }

    /// Copy of a file's record, if registered
    pub async fn record(&self, filename: &str) -> Option<FileRecord> {
        self.registry.lock().await.records.get(filename).cloned()
    }

    /// Persist one chunk of `filename` as shard `seq`
    pub async fn store_shard(&self, filename: &str, seq: u64, bytes: &[u8]) -> StoreResult<()> {
        let path = {
            let registry = self.registry.lock().await;
            registry
                .records
                .get(filename)
                .ok_or_else(|| StoreError::UnknownFile(filename.to_string()))?
                .shard_path(seq)
        };

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StoreError::IoError(format!("Failed to write shard {path:?}: {e}")))?;

        let mut registry = self.registry.lock().await;
        match registry.records.get_mut(filename) {
            Some(record) => {
                record.shards.push(ShardRef {
                    seq,
                    path,
                    len: bytes.len(),
                });
                Ok(())
            }
            None => {
                // Record was purged by cleanup while the shard was being written
                drop(registry);
                if let Err(e) = remove_if_exists(&path).await {
                    warn!("Failed to remove orphaned shard of '{}': {}", filename, e);
                }
                Err(StoreError::UnknownFile(filename.to_string()))
            }
        }
    }

    /// Drop every shard of `filename` while keeping it registered
    pub async fn discard(&self, filename: &str) -> StoreResult<usize> {
        let shards = {
            let mut registry = self.registry.lock().await;
            match registry.records.get_mut(filename) {
                Some(record) => std::mem::take(&mut record.shards),
                None => return Err(StoreError::UnknownFile(filename.to_string())),
            }
        };

        for shard in &shards {
            remove_if_exists(&shard.path).await?;
        }
        debug!(file = %filename, shards = shards.len(), "Discarded shards");
        Ok(shards.len())
    }

    /// Write the given files into `output_dir/archive_name`
    ///
    /// The archive is staged next to its destination and only moved into place
    /// once every entry has been written, so a failed assembly never leaves a
    /// truncated archive behind.
    pub async fn assemble(
        &self,
        output_dir: &Path,
        archive_name: &str,
        filenames: &[String],
    ) -> StoreResult<PathBuf> {
        if filenames.is_empty() {
            return Err(StoreError::NoFilesToSave);
        }

        let entries = {
            let registry = self.registry.lock().await;
            filenames
                .iter()
                .map(|name| {
                    registry
                        .records
                        .get(name)
                        .map(|record| ArchiveEntry {
                            name: name.clone(),
                            shards: record.ordered_paths(),
                        })
                        .ok_or_else(|| StoreError::UnknownFile(name.clone()))
                })
                .collect::<StoreResult<Vec<_>>>()?
        };

        let output_dir = output_dir.to_path_buf();
        let archive_name = archive_name.to_string();
        let path = tokio::task::spawn_blocking(move || {
            archive::write_archive(&output_dir, &archive_name, &entries)
        })
        .await
        .map_err(|e| StoreError::ArchiveError(format!("Archive task failed: {e}")))??;

        info!(
            archive = %path.display(),
            files = filenames.len(),
            "Archive assembled"
        );
        Ok(path)
    }

    /// Remove every shard and forget all records
    ///
    /// Returns the number of files purged. The temporary root itself goes away
    /// when the store is dropped.
    pub async fn cleanup(&self) -> StoreResult<usize> {
        let records: Vec<FileRecord> = {
            let mut registry = self.registry.lock().await;
            registry.records.drain().map(|(_, record)| record).collect()
        };

        let mut first_error = None;
        for record in &records {
            if let Err(e) = tokio::fs::remove_dir_all(&record.dir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove shard directory {:?}: {}", record.dir, e);
                    first_error.get_or_insert(StoreError::IoError(format!(
                        "Failed to remove {:?}: {e}",
                        record.dir
                    )));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                debug!(files = records.len(), "Shard store cleaned up");
                Ok(records.len())
            }
        }
    }
}

/// Filesystem-safe stand-in for a remote filename
fn shard_prefix(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

async fn remove_if_exists(path: &Path) -> StoreResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::IoError(format!("Failed to remove {path:?}: {e}"))),
    }
}
