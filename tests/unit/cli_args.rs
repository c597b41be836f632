//! Unit tests for CLI argument parsing

use std::path::PathBuf;
use std::time::Duration;

use charscan_downloader::cli::{Cli, OutputFormat};
use clap::Parser;

#[test]
fn test_cli_defaults() {
    let cli = Cli::parse_from(["charscan-downloader"]);

    assert_eq!(cli.url, "http://localhost:8080/");
    assert_eq!(cli.target, 'A');
    assert!(cli.max_concurrent_downloads >= 1);
    assert_eq!(cli.download_path, PathBuf::from("./"));
    assert_eq!(cli.archive_name, "matches.zip");
    assert_eq!(cli.chunk_size, 4096);
    assert_eq!(cli.timeout_secs, 30);
    assert_eq!(cli.temp_dir, None);
    assert_eq!(cli.output_format, OutputFormat::Human);
    assert_eq!(cli.metrics_addr, None);
    assert!(!cli.debug);
}

#[test]
fn test_cli_custom_values_reach_finder_config() {
    let cli = Cli::parse_from([
        "charscan-downloader",
        "--url",
        "http://files.local:9000/",
        "--char",
        "é",
        "--max-concurrent-downloads",
        "7",
        "--download-path",
        "/tmp/out",
        "--archive-name",
        "winners.zip",
        "--chunk-size",
        "16",
        "--timeout-secs",
        "5",
        "--temp-dir",
        "/tmp/shards",
        "--output-format",
        "json",
        "--metrics-addr",
        "127.0.0.1:9100",
    ]);

    assert_eq!(cli.output_format, OutputFormat::Json);
    assert_eq!(cli.metrics_addr, Some("127.0.0.1:9100".parse().unwrap()));

    let config = cli.finder_config();
    assert_eq!(config.url, "http://files.local:9000/");
    assert_eq!(config.target, 'é');
    assert_eq!(config.workers, 7);
    assert_eq!(config.download_path, PathBuf::from("/tmp/out"));
    assert_eq!(config.archive_name, "winners.zip");
    assert_eq!(config.chunk_size, 16);
    assert_eq!(config.request_timeout, Duration::from_secs(5));
    assert_eq!(config.temp_dir, Some(PathBuf::from("/tmp/shards")));
}

#[test]
fn test_cli_rejects_invalid_values() {
    let invalid: [&[&str]; 6] = [
        &["--char", "AB"],
        &["--char", ""],
        &["--max-concurrent-downloads", "0"],
        &["--chunk-size", "0"],
        &["--timeout-secs", "0"],
        &["--output-format", "xml"],
    ];

    for args in invalid {
        let argv = std::iter::once("charscan-downloader").chain(args.iter().copied());
        assert!(
            Cli::try_parse_from(argv).is_err(),
            "should reject {args:?}"
        );
    }
}
