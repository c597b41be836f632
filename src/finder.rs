//! End-to-end run: list, download, scan, archive
//!
//! [`CharFinder::run`] drives one complete pass:
//!
//! 1. list candidate files from the base URL
//! 2. register each distinct filename with a fresh [`ShardStore`]
//! 3. download and scan every file through the [`ConcurrentDownloader`]
//! 4. archive the files that hold the target at the smallest offset
//!
//! The shard store lives only for the duration of the run, so its temporary
//! directory is removed on every exit path, including shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::downloader::{
    config::{default_workers, HTTP_REQUEST_TIMEOUT_SECS},
    BodyHandler, ConcurrentDownloader, DownloadError, DownloaderConfig,
};
use crate::listing::{FileLister, HtmlIndexLister, ListError};
use crate::scan::{IndexAggregator, ScanError, ScanHandler, Target, DEFAULT_CHUNK_SIZE};
use crate::shutdown::{SharedShutdown, ShutdownCoordinator};
use crate::store::{ShardStore, StoreError};

/// Default server URL
pub const DEFAULT_URL: &str = "http://localhost:8080/";

/// Default archive filename
pub const DEFAULT_ARCHIVE_NAME: &str = "matches.zip";

/// Run errors
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Invalid target or chunk size
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ScanError),

    /// Index page could not be listed
    #[error("couldn't list '{url}': {source}")]
    ListingError {
        /// Listed URL
        url: String,
        /// Underlying error
        source: ListError,
    },

    /// Index page listed no files
    #[error("requested path is empty")]
    EmptyListing,

    /// Downloader rejected the batch
    #[error("download error: {0}")]
    DownloadError(#[from] DownloadError),

    /// Shard store could not be set up
    #[error("storage error: {0}")]
    StorageError(StoreError),

    /// Winning files could not be archived
    #[error("error on saving file(s): {0}")]
    AssemblyError(StoreError),

    /// Shutdown was requested before the run finished
    #[error("run interrupted")]
    Interrupted,
}

/// Terminal result of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Winners archived at `path`
    Archived {
        /// Archive location
        path: PathBuf,
        /// Global minimum offset
        offset: u64,
        /// Archived filenames, sorted
        files: Vec<String>,
    },
    /// No file contains the target
    NoMatch,
}

/// Settings for one run
#[derive(Debug, Clone)]
pub struct FinderConfig {
    /// Base URL serving the index page and the files
    pub url: String,
    /// Character to look for
    pub target: char,
    /// Maximum number of concurrent downloads
    pub workers: usize,
    /// Directory receiving the archive
    pub download_path: PathBuf,
    /// Archive filename
    pub archive_name: String,
    /// Scan and shard chunk size in bytes
    pub chunk_size: usize,
    /// Per-file request timeout
    pub request_timeout: Duration,
    /// Parent directory for shards (OS temp dir when unset)
    pub temp_dir: Option<PathBuf>,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            target: 'A',
            workers: default_workers(),
            download_path: PathBuf::from("./"),
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            request_timeout: Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS),
            temp_dir: None,
        }
    }
}

/// Finds the files holding a character earliest and archives them
pub struct CharFinder {
    config: FinderConfig,
    target: Target,
    lister: Arc<dyn FileLister>,
    downloader: ConcurrentDownloader,
    shutdown: SharedShutdown,
}

impl CharFinder {
    /// Create a finder listing files from the configured URL's HTML index
    pub fn new(config: FinderConfig) -> Result<Self, RunError> {
        if config.chunk_size == 0 {
            return Err(ScanError::InvalidChunkSize.into());
        }

        let downloader_config = DownloaderConfig::default()
            .with_workers(config.workers)
            .with_request_timeout(config.request_timeout);
        let client = downloader_config.build_client()?;
        let shutdown = ShutdownCoordinator::shared();
        let downloader = ConcurrentDownloader::with_client(client.clone(), config.workers)
            .with_shutdown(shutdown.clone());

        Ok(Self {
            target: Target::new(config.target),
            lister: Arc::new(HtmlIndexLister::new(client)),
            downloader,
            shutdown,
            config,
        })
    }

    /// Replace the file lister
    pub fn with_lister(mut self, lister: Arc<dyn FileLister>) -> Self {
        self.lister = lister;
        self
    }

    /// Report per-file progress on `progress`
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.downloader = self.downloader.with_progress(progress);
        self
    }

    /// Abandon the run once `shutdown` is requested
    ///
    /// No archive is written for an interrupted run and its shards are removed
    /// before [`run`](Self::run) returns [`RunError::Interrupted`].
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.downloader = self.downloader.with_shutdown(shutdown.clone());
        self.shutdown = shutdown;
        self
    }

    /// Perform one complete run
    pub async fn run(&self) -> Result<RunOutcome, RunError> {
        let filenames = self
            .lister
            .list(&self.config.url)
            .await
            .map_err(|source| RunError::ListingError {
                url: self.config.url.clone(),
                source,
            })?;
        if filenames.is_empty() {
            return Err(RunError::EmptyListing);
        }
        info!("Files list: {:?}", filenames);

        let store = Arc::new(
            match &self.config.temp_dir {
                Some(dir) => ShardStore::new_in(dir),
                None => ShardStore::new(),
            }
            .map_err(RunError::StorageError)?,
        );

        let result = self.process(&store, filenames).await;

        match store.cleanup().await {
            Ok(files) => debug!(files, "Temporary shards removed"),
            Err(e) => warn!("Shard cleanup incomplete: {}", e),
        }
        result
    }

    async fn process(
        &self,
        store: &Arc<ShardStore>,
        filenames: Vec<String>,
    ) -> Result<RunOutcome, RunError> {
        let mut queue = Vec::with_capacity(filenames.len());
        for filename in filenames {
            if store
                .register_file(&filename)
                .await
                .map_err(RunError::StorageError)?
            {
                queue.push(filename);
            }
        }

        let index = Arc::new(IndexAggregator::new());
        let handler: Arc<dyn BodyHandler> = Arc::new(ScanHandler::new(
            self.target.clone(),
            self.config.chunk_size,
            store.clone(),
            index.clone(),
        )?);

        self.downloader
            .subscribe(&self.config.url, queue, Some(handler))?;
        let report = self.downloader.start().await?;
        if self.shutdown.is_shutdown_requested() {
            warn!(
                cancelled = report.cancelled,
                "Shutdown requested, skipping archive"
            );
            return Err(RunError::Interrupted);
        }

        let Some((offset, winners)) = index.snapshot().await.into_result() else {
            info!(
                "No files found including character '{}' on url '{}'",
                self.target, self.config.url
            );
            return Ok(RunOutcome::NoMatch);
        };

        info!(
            offset,
            files = ?winners,
            "Character '{}' found earliest",
            self.target
        );
        let path = store
            .assemble(
                &self.config.download_path,
                &self.config.archive_name,
                &winners,
            )
            .await
            .map_err(RunError::AssemblyError)?;
        info!("File(s) downloaded successfully in '{}'", path.display());

        Ok(RunOutcome::Archived {
            path,
            offset,
            files: winners,
        })
    }
}
