//! Command-line interface

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use crate::downloader::config::{default_workers, HTTP_REQUEST_TIMEOUT_SECS};
use crate::finder::{
    CharFinder, FinderConfig, RunError, RunOutcome, DEFAULT_ARCHIVE_NAME, DEFAULT_URL,
};
use crate::metrics;
use crate::scan::{Target, DEFAULT_CHUNK_SIZE};
use crate::shutdown::SharedShutdown;

pub mod error;

pub use error::CliError;

/// Upper bound on concurrent downloads
const MAX_CONCURRENCY: usize = 1024;

/// Parse and validate the target character
fn parse_target(s: &str) -> Result<char, String> {
    Target::parse(s)
        .map(|target| target.char())
        .map_err(|e| e.to_string())
}

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Parse and validate chunk size
fn parse_chunk_size(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("chunk size must be at least 1 byte".to_string()),
        Ok(value) => Ok(value),
        Err(_) => Err(format!("'{s}' is not a valid number")),
    }
}

/// Result output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

/// Downloads the files listed at a URL and archives those containing a
/// character at the smallest byte offset
#[derive(Parser, Debug)]
#[command(name = "charscan-downloader")]
#[command(about = "Archive the listed files that contain a character earliest", long_about = None)]
#[command(version)]
pub struct Cli {
    /// The requested file server's URL
    #[arg(long, default_value = DEFAULT_URL)]
    pub url: String,

    /// The character to match
    #[arg(long = "char", default_value = "A", value_parser = parse_target)]
    pub target: char,

    /// Maximum number of concurrent downloads (default: available CPUs)
    #[arg(long, default_value_t = default_workers(), value_parser = parse_concurrency)]
    pub max_concurrent_downloads: usize,

    /// Directory the archive is written to
    #[arg(long, default_value = "./")]
    pub download_path: PathBuf,

    /// Archive filename
    #[arg(long, default_value = DEFAULT_ARCHIVE_NAME)]
    pub archive_name: String,

    /// Scan and shard chunk size in bytes
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, value_parser = parse_chunk_size)]
    pub chunk_size: usize,

    /// Per-file request timeout in seconds
    #[arg(long, default_value_t = HTTP_REQUEST_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout_secs: u64,

    /// Parent directory for temporary shards (default: OS temp dir)
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// Output format (json or human)
    #[arg(long, default_value = "human")]
    pub output_format: OutputFormat,

    /// Expose Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,

    /// Debug-level logging unless RUST_LOG says otherwise
    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

impl Cli {
    /// Run settings derived from the flags
    pub fn finder_config(&self) -> FinderConfig {
        FinderConfig {
            url: self.url.clone(),
            target: self.target,
            workers: self.max_concurrent_downloads,
            download_path: self.download_path.clone(),
            archive_name: self.archive_name.clone(),
            chunk_size: self.chunk_size,
            request_timeout: Duration::from_secs(self.timeout_secs),
            temp_dir: self.temp_dir.clone(),
        }
    }

    /// Execute one run and print its result
    ///
    /// The run is abandoned, and its shards removed, once `shutdown` is
    /// requested.
    pub async fn execute(&self, shutdown: SharedShutdown) -> Result<RunOutcome, CliError> {
        if let Some(addr) = self.metrics_addr {
            metrics::init_metrics(addr)?;
        }

        info!("Initializing...");
        let mut finder = CharFinder::new(self.finder_config())?.with_shutdown(shutdown);
        let progress = match self.output_format {
            OutputFormat::Human => Some(create_progress_bar()),
            OutputFormat::Json => None,
        };
        if let Some(progress) = &progress {
            finder = finder.with_progress(progress.clone());
        }

        let result = finder.run().await;

        if let Some(progress) = progress {
            progress.finish_and_clear();
        }
        match self.output_format {
            OutputFormat::Json => output_json(self, &result),
            OutputFormat::Human => output_human(self, &result),
        }

        result.map_err(CliError::from)
    }
}

/// Output result as JSON
fn output_json(cli: &Cli, result: &Result<RunOutcome, RunError>) {
    let output = match result {
        Ok(outcome) => serde_json::json!({
            "success": true,
            "url": cli.url,
            "char": cli.target.to_string(),
            "result": outcome,
            "error": null,
        }),
        Err(e) => serde_json::json!({
            "success": false,
            "url": cli.url,
            "char": cli.target.to_string(),
            "result": null,
            "error": e.to_string(),
        }),
    };
    println!("{output}");
}

/// Output result in human-readable format
fn output_human(cli: &Cli, result: &Result<RunOutcome, RunError>) {
    match result {
        Ok(RunOutcome::Archived {
            path,
            offset,
            files,
        }) => {
            println!("\nCharacter '{}' first found at byte {}", cli.target, offset);
            println!("Files: {}", files.join(", "));
            println!("Archive: {}", path.display());
        }
        Ok(RunOutcome::NoMatch) => {
            println!(
                "\nNo files found including character '{}' on url '{}'",
                cli.target, cli.url
            );
        }
        Err(e) => {
            eprintln!("\nRun failed!");
            eprintln!("Error: {e}");
            error!("Run failed: {}", e);
        }
    }
}

/// Spinner counting finished files
fn create_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} file(s) processed {msg}")
            .expect("hardcoded template is valid"),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
