//! # Charscan Downloader Library
//!
//! Concurrently downloads every file listed on an HTTP index page, finds the
//! files in which a target character appears at the smallest byte offset, and
//! packs exactly those files into a single zip archive.
//!
//! ## Features
//!
//! - **Bounded Concurrency**: a fixed-size worker pool, each worker streaming one file
//! - **Streaming Scan**: bodies are scanned chunk by chunk and never held whole in memory
//! - **Early Pruning**: a file stops downloading once it can no longer beat the best offset
//! - **Shard Storage**: chunks are written to a self-cleaning temporary directory
//! - **Deterministic Archive**: identical shards produce a byte-identical zip
//!
//! ## Quick Start
//!
//! ```no_run
//! use charscan_downloader::{CharFinder, FinderConfig, RunOutcome};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FinderConfig {
//!     url: "http://localhost:8080/".to_string(),
//!     target: 'A',
//!     ..FinderConfig::default()
//! };
//!
//! match CharFinder::new(config)?.run().await? {
//!     RunOutcome::Archived { path, offset, files } => {
//!         println!("{files:?} hold 'A' at byte {offset}, archived in {}", path.display());
//!     }
//!     RunOutcome::NoMatch => println!("no file holds 'A'"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`listing`] - Candidate filenames from an HTML index page
//! - [`downloader`] - Bounded worker pool streaming bodies to a handler
//! - [`scan`] - Chunked target search and the global minimum-offset index
//! - [`store`] - Temporary shard storage and archive assembly
//! - [`finder`] - One complete run wiring the pieces together
//! - [`shutdown`] - Ctrl+C handling that drains in-flight downloads
//! - [`metrics`] - Optional Prometheus exporter

#![warn(missing_docs)]
#![warn(clippy::all)]

/// CLI command implementation
pub mod cli;

/// Concurrent download orchestration
pub mod downloader;

/// End-to-end run
pub mod finder;

/// Remote file listing
pub mod listing;

/// Metrics collection and export
pub mod metrics;

/// Chunked scanning and offset aggregation
pub mod scan;

/// Graceful shutdown coordination
pub mod shutdown;

/// Shard storage and archive assembly
pub mod store;

// Re-export commonly used types
pub use finder::{CharFinder, FinderConfig, RunError, RunOutcome};
