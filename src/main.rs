//! Main entry point for the charscan-downloader CLI

use std::process::ExitCode;

use charscan_downloader::cli::Cli;
use charscan_downloader::shutdown::ShutdownCoordinator;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit status of a run stopped by Ctrl+C
const EXIT_INTERRUPTED: u8 = 130;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing(debug: bool) {
    // Check if JSON output is requested via environment variable
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("charscan_downloader={default_level}")));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let shutdown = ShutdownCoordinator::shared();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl+C received - discarding partial downloads");
                shutdown.request_shutdown();
            }
        }
    });

    // The run drains its own workers on shutdown, so the shard store is gone
    // by the time execute returns.
    match cli.execute(shutdown).await {
        Ok(_) => {
            info!("Client stopped");
            ExitCode::SUCCESS
        }
        Err(e) if e.is_interrupted() => ExitCode::from(EXIT_INTERRUPTED),
        Err(e) => {
            error!("Command failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
