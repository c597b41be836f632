//! ZIP assembly from on-disk shards

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use super::{StoreError, StoreResult};

/// One archive entry and the shards that make up its content
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Entry name inside the archive (the original filename)
    pub name: String,
    /// Shard blobs, already in sequence order
    pub shards: Vec<PathBuf>,
}

/// Write `entries` into `output_dir/archive_name`
///
/// Entries use a fixed modification time so identical input produces a
/// byte-identical archive.
pub fn write_archive(
    output_dir: &Path,
    archive_name: &str,
    entries: &[ArchiveEntry],
) -> StoreResult<PathBuf> {
    let destination = output_dir.join(archive_name);
    let staging = NamedTempFile::new_in(output_dir).map_err(|e| {
        StoreError::ArchiveError(format!("Failed to create archive in {output_dir:?}: {e}"))
    })?;

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    let mut writer = ZipWriter::new(staging);
    for entry in entries {
        writer
            .start_file(entry.name.as_str(), options)
            .map_err(|e| {
                StoreError::ArchiveError(format!("Failed to add {} to archive: {e}", entry.name))
            })?;

        for shard in &entry.shards {
            let mut blob = File::open(shard).map_err(|e| {
                StoreError::IoError(format!("Failed to read shard {shard:?}: {e}"))
            })?;
            io::copy(&mut blob, &mut writer).map_err(|e| {
                StoreError::ArchiveError(format!("Failed to write {} to archive: {e}", entry.name))
            })?;
        }
        debug!(entry = %entry.name, shards = entry.shards.len(), "Archive entry written");
    }

    let staging = writer
        .finish()
        .map_err(|e| StoreError::ArchiveError(format!("Failed to finalize archive: {e}")))?;
    staging
        .as_file()
        .sync_all()
        .map_err(|e| StoreError::IoError(format!("Failed to flush archive: {e}")))?;
    staging.persist(&destination).map_err(|e| {
        StoreError::ArchiveError(format!("Failed to move archive to {destination:?}: {}", e.error))
    })?;

    Ok(destination)
}
