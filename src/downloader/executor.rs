//! Worker pool draining one subscription
//!
//! Files are fetched by spawned tasks, at most `workers` at a time. A slot is
//! refilled only after its whole pipeline (request, body handling, storage)
//! completes, which bounds open sockets and outstanding disk writes to the pool
//! size. [`ConcurrentDownloader::start`] resolves only after the last task
//! finishes.
//!
//! Once shutdown is requested no further file is scheduled and the files in
//! flight are aborted. `start` still waits for every aborted task to be torn
//! down before it returns.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future;
use futures::stream::{self, StreamExt};
use futures_util::TryStreamExt;
use indicatif::ProgressBar;
use reqwest::Client;
use serde::Serialize;
use tokio::task::AbortHandle;
use tracing::{debug, error, info};

use super::config::DownloaderConfig;
use super::{BodyHandler, BodyStream, DownloadError, FetchError};
use crate::metrics::FetchMetrics;
use crate::shutdown::{SharedShutdown, ShutdownCoordinator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DownloaderState {
    Idle,
    Started,
}

struct Subscription {
    base_url: String,
    queue: Vec<String>,
    handler: Option<Arc<dyn BodyHandler>>,
    state: DownloaderState,
}

impl Subscription {
    fn idle() -> Self {
        Self {
            base_url: String::new(),
            queue: Vec::new(),
            handler: None,
            state: DownloaderState::Idle,
        }
    }

    fn reset(&mut self) {
        *self = Self::idle();
    }
}

/// Summary of one `start` run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    /// Files attempted (every queued file, exactly once)
    pub attempted: usize,
    /// Files downloaded and handled without error
    pub succeeded: usize,
    /// Files whose download or handling failed
    pub failed: usize,
    /// Files aborted or never scheduled because of shutdown
    pub cancelled: usize,
    /// Highest number of files in flight at the same time
    pub peak_in_flight: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Processed,
    FetchFailed,
    HandlerFailed,
    Cancelled,
}

impl DownloadReport {
    fn from_outcomes(queued: usize, outcomes: &[FileOutcome], peak_in_flight: usize) -> Self {
        let mut report = Self {
            attempted: outcomes.len(),
            // Files never scheduled
            cancelled: queued.saturating_sub(outcomes.len()),
            peak_in_flight,
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome {
                FileOutcome::Processed => report.succeeded += 1,
                FileOutcome::FetchFailed | FileOutcome::HandlerFailed => report.failed += 1,
                FileOutcome::Cancelled => report.cancelled += 1,
            }
        }
        report
    }
}

/// Fetches a queue of files with bounded concurrency
pub struct ConcurrentDownloader {
    client: Client,
    workers: usize,
    subscription: Mutex<Subscription>,
    progress: Option<ProgressBar>,
    shutdown: SharedShutdown,
}

impl ConcurrentDownloader {
    /// Create a downloader with its own HTTP client
    pub fn new(config: DownloaderConfig) -> Result<Self, DownloadError> {
        let client = config.build_client()?;
        Ok(Self::with_client(client, config.workers))
    }

    /// Create a downloader around an existing client
    pub fn with_client(client: Client, workers: usize) -> Self {
        Self {
            client,
            workers: workers.max(1),
            subscription: Mutex::new(Subscription::idle()),
            progress: None,
            shutdown: ShutdownCoordinator::shared(),
        }
    }

    /// Advance `progress` by one for every finished file
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Stop scheduling and abort in-flight files once `shutdown` is requested
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Whether a batch is currently running
    pub fn is_started(&self) -> bool {
        self.lock().state == DownloaderState::Started
    }

    fn lock(&self) -> MutexGuard<'_, Subscription> {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the next batch
    ///
    /// Fails without touching the current subscription if the batch is
    /// invalid or a batch is already running.
    pub fn subscribe(
        &self,
        base_url: &str,
        filenames: Vec<String>,
        handler: Option<Arc<dyn BodyHandler>>,
    ) -> Result<(), DownloadError> {
        let mut subscription = self.lock();
        if subscription.state == DownloaderState::Started {
            return Err(DownloadError::AlreadyStarted);
        }
        if base_url.is_empty() {
            return Err(DownloadError::EmptyTarget);
        }
        if filenames.is_empty() {
            return Err(DownloadError::EmptyQueue);
        }
        let handler = handler.ok_or(DownloadError::NoHandler)?;

        subscription.base_url = base_url.trim_end_matches('/').to_string();
        subscription.queue = filenames;
        subscription.handler = Some(handler);
        Ok(())
    }

    /// Download every subscribed file and wait for all of them
    ///
    /// Per-file failures are logged and counted in the report. The downloader
    /// is back to idle when this returns, whatever the outcome.
    pub async fn start(&self) -> Result<DownloadReport, DownloadError> {
        let (base_url, queue, handler) = {
            let mut subscription = self.lock();
            if subscription.state == DownloaderState::Started {
                return Err(DownloadError::AlreadyStarted);
            }
            let handler = match (&subscription.handler, subscription.queue.is_empty()) {
                (Some(handler), false) => handler.clone(),
                _ => return Err(DownloadError::NotSubscribed),
            };
            subscription.state = DownloaderState::Started;
            (
                subscription.base_url.clone(),
                std::mem::take(&mut subscription.queue),
                handler,
            )
        };
        let _reset = ResetOnDrop {
            subscription: &self.subscription,
        };

        let queued = queue.len();
        let pool_size = self.workers.min(queued);
        info!(
            files = queued,
            workers = pool_size,
            "Starting downloads from {}",
            base_url
        );

        let in_flight = Arc::new(InFlight::default());
        let outcomes: Vec<FileOutcome> = stream::iter(queue)
            .take_while(|_| future::ready(!self.shutdown.is_shutdown_requested()))
            .map(|filename| {
                let task = FetchTask {
                    client: self.client.clone(),
                    url: format!("{base_url}/{filename}"),
                    filename,
                    handler: handler.clone(),
                    in_flight: in_flight.clone(),
                };
                run_task(task, self.shutdown.clone())
            })
            .buffer_unordered(pool_size)
            .inspect(|_| {
                if let Some(progress) = &self.progress {
                    progress.inc(1);
                }
            })
            .collect()
            .await;

        let report = DownloadReport::from_outcomes(queued, &outcomes, in_flight.peak());
        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            cancelled = report.cancelled,
            "Fetching files' content done"
        );
        Ok(report)
    }
}

struct ResetOnDrop<'a> {
    subscription: &'a Mutex<Subscription>,
}

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
    }
}

/// Aborts the spawned worker if the pool itself is dropped mid-batch
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Debug, Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(self: &Arc<Self>) -> InFlightSlot {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightSlot(self.clone())
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InFlightSlot(Arc<InFlight>);

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

struct FetchTask {
    client: Client,
    url: String,
    filename: String,
    handler: Arc<dyn BodyHandler>,
    in_flight: Arc<InFlight>,
}

async fn run_task(task: FetchTask, shutdown: SharedShutdown) -> FileOutcome {
    let filename = task.filename.clone();
    let mut handle = tokio::spawn(task.run());
    let _abort = AbortOnDrop(handle.abort_handle());

    tokio::select! {
        joined = &mut handle => match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Worker for file '{}' did not complete: {}", filename, e);
                FileOutcome::HandlerFailed
            }
        },
        _ = shutdown.wait_for_shutdown() => {
            handle.abort();
            // Resolves once the task has dropped its body and handler
            match handle.await {
                Ok(outcome) => outcome,
                Err(_) => {
                    debug!(file = %filename, "Download cancelled");
                    FileOutcome::Cancelled
                }
            }
        }
    }
}

impl FetchTask {
    async fn run(self) -> FileOutcome {
        let _slot = self.in_flight.enter();
        let metrics = FetchMetrics::start(&self.filename);
        debug!(file = %self.filename, url = %self.url, "Downloading file");

        let body = match self.fetch().await {
            Ok(body) => body,
            Err(e) => {
                error!("Couldn't download file '{}': {}", self.filename, e);
                metrics.record_failure(&e.to_string());
                return FileOutcome::FetchFailed;
            }
        };

        match self.handler.on_body(&self.filename, body).await {
            Ok(()) => {
                metrics.record_success();
                FileOutcome::Processed
            }
            Err(e) => {
                error!("Failed to process file '{}': {}", self.filename, e);
                metrics.record_failure("handler");
                FileOutcome::HandlerFailed
            }
        }
    }

    async fn fetch(&self) -> Result<BodyStream, FetchError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(Box::pin(response.bytes_stream().map_err(FetchError::from)))
    }
}
