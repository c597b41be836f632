//! Download configuration constants

use std::time::Duration;

use reqwest::Client;

use super::DownloadError;

/// HTTP connect timeout (seconds) - time to establish TCP connection
pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;

/// HTTP request timeout (seconds) - overall time for a single file fetch,
/// body included
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Worker count when the platform cannot report its parallelism
const FALLBACK_WORKERS: usize = 4;

/// Default pool size: one worker per available processing unit
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(FALLBACK_WORKERS)
}

/// Downloader tuning
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Maximum number of files in flight
    pub workers: usize,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
}

impl DownloaderConfig {
    /// Set the pool size (clamped to at least 1)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Build the shared HTTP client
    pub fn build_client(&self) -> Result<Client, DownloadError> {
        Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| DownloadError::HttpClientError(e.to_string()))
    }
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            request_timeout: Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS),
        }
    }
}
