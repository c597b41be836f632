//! Bounded-concurrency file downloader
//!
//! The downloader fetches a queue of filenames from a base URL with at most W
//! requests in flight, streaming each successful response body to a
//! [`BodyHandler`].
//!
//! # Overview
//!
//! 1. **Subscribe**: register the base URL, the filename queue and the handler
//!    with [`ConcurrentDownloader::subscribe`]
//! 2. **Start**: [`ConcurrentDownloader::start`] drains the queue through a
//!    fixed-size worker pool and returns once every file has been attempted
//! 3. **Reset**: the downloader is idle again and can take a new subscription
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use charscan_downloader::downloader::{
//!     BodyHandler, BodyStream, ConcurrentDownloader, DownloaderConfig, HandlerError,
//! };
//!
//! struct Discard;
//!
//! #[async_trait::async_trait]
//! impl BodyHandler for Discard {
//!     async fn on_body(&self, _filename: &str, _body: BodyStream) -> Result<(), HandlerError> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = ConcurrentDownloader::new(DownloaderConfig::default().with_workers(4))?;
//! let handler: Arc<dyn BodyHandler> = Arc::new(Discard);
//! downloader.subscribe(
//!     "http://localhost:8080",
//!     vec!["a.txt".to_string(), "b.txt".to_string()],
//!     Some(handler),
//! )?;
//! let report = downloader.start().await?;
//! println!("{} of {} files fetched", report.succeeded, report.attempted);
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Only misuse of the API surfaces as a [`DownloadError`]. Transport failures
//! ([`FetchError`]) and handler failures are logged per file and never abort the
//! batch.

use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;

pub mod config;
pub mod executor;

pub use config::DownloaderConfig;
pub use executor::{ConcurrentDownloader, DownloadReport};

/// Downloader API errors
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Base URL is empty
    #[error("the subscribed url is empty")]
    EmptyTarget,

    /// Filename queue is empty
    #[error("the subscribed filenames queue is empty")]
    EmptyQueue,

    /// No body handler supplied
    #[error("the subscribed response handler is missing")]
    NoHandler,

    /// A batch is already running
    #[error("downloader is already started")]
    AlreadyStarted,

    /// `start` called without a subscription
    #[error("downloader is not subscribed yet")]
    NotSubscribed,

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    HttpClientError(String),
}

/// Per-file transport errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Connection or body read failure
    #[error("network error: {0}")]
    Network(String),

    /// Request exceeded its timeout
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Non-success HTTP status
    #[error("unexpected HTTP status {0}")]
    Status(u16),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(e.to_string())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

/// Streamed response body
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, FetchError>> + Send>>;

/// Error returned by a [`BodyHandler`]
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Consumer of successfully fetched bodies
///
/// Called once per downloaded file, from the worker that fetched it. The worker
/// keeps its pool slot until this returns.
#[async_trait::async_trait]
pub trait BodyHandler: Send + Sync {
    /// Consume the body of `filename`
    async fn on_body(&self, filename: &str, body: BodyStream) -> Result<(), HandlerError>;
}
