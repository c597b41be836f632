//! CLI error types and conversions

use crate::finder::RunError;
use crate::metrics::MetricsError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Run failed
    #[error("{0}")]
    RunError(#[from] RunError),

    /// Metrics exporter could not start
    #[error("metrics error: {0}")]
    MetricsError(#[from] MetricsError),
}

impl CliError {
    /// Whether the run stopped because shutdown was requested
    pub fn is_interrupted(&self) -> bool {
        matches!(self, CliError::RunError(RunError::Interrupted))
    }
}
