//! Observability metrics for download and scan runs
//!
//! ## Architecture
//!
//! - Uses the `metrics` crate facade; without an installed recorder every call
//!   is a cheap no-op
//! - Optional Prometheus exporter for a scrape endpoint (`--metrics-addr`)
//! - Per-file fetch timing via [`FetchMetrics`]

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Metrics setup errors
#[derive(Debug, thiserror::Error)]
#[error("failed to install Prometheus exporter: {0}")]
pub struct MetricsError(String);

/// Install the Prometheus exporter listening on `addr`
///
/// Idempotent: later calls after a successful install are ignored.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    if is_initialized() {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError(e.to_string()))?;

    describe_counter!(
        "files_downloaded_total",
        Unit::Count,
        "Files fetched and scanned successfully"
    );
    describe_counter!(
        "files_failed_total",
        Unit::Count,
        "Files whose download or processing failed"
    );
    describe_histogram!(
        "file_download_duration_seconds",
        Unit::Seconds,
        "Time from request to end of body processing"
    );
    describe_counter!(
        "shards_written_total",
        Unit::Count,
        "Shards persisted to temporary storage"
    );
    describe_counter!(
        "shard_bytes_written_total",
        Unit::Bytes,
        "Bytes persisted to temporary storage"
    );
    describe_counter!(
        "scans_pruned_total",
        Unit::Count,
        "File scans stopped early because they could not win"
    );
    describe_counter!(
        "candidates_reported_total",
        Unit::Count,
        "Offsets reported to the index, labelled by acceptance"
    );

    METRICS_INITIALIZED.store(true, Ordering::SeqCst);
    info!("Metrics exporter listening on {}", addr);
    Ok(())
}

/// Whether the exporter has been installed
pub fn is_initialized() -> bool {
    METRICS_INITIALIZED.load(Ordering::SeqCst)
}

/// Timing and outcome of a single file fetch
pub struct FetchMetrics {
    filename: String,
    start_time: Instant,
}

impl FetchMetrics {
    /// Start timing `filename`
    pub fn start(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            start_time: Instant::now(),
        }
    }

    /// Record a fully processed file
    pub fn record_success(&self) {
        let duration = self.start_time.elapsed();
        counter!("files_downloaded_total").increment(1);
        histogram!("file_download_duration_seconds").record(duration.as_secs_f64());

        debug!(
            file = %self.filename,
            duration_ms = duration.as_millis(),
            "File processed"
        );
    }

    /// Record a failed file
    pub fn record_failure(&self, reason: &str) {
        let duration = self.start_time.elapsed();
        counter!("files_failed_total").increment(1);
        histogram!("file_download_duration_seconds").record(duration.as_secs_f64());

        debug!(
            file = %self.filename,
            reason = %reason,
            duration_ms = duration.as_millis(),
            "File failed"
        );
    }
}
