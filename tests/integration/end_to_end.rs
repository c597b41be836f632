//! End-to-end runs against a mock file server

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use charscan_downloader::finder::RunError;
use charscan_downloader::listing::StaticLister;
use charscan_downloader::shutdown::ShutdownCoordinator;
use charscan_downloader::{CharFinder, FinderConfig, RunOutcome};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Serve an HTML index of `files` at `/` and each file at `/<name>`
async fn serve(files: &[(&str, &[u8])]) -> MockServer {
    let server = MockServer::start().await;

    let items: String = files
        .iter()
        .map(|(name, _)| format!("<li><a href=\"{name}\">{name}</a></li>\n"))
        .collect();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "<html><body><h1>Directory listing for /</h1><ul>\n{items}</ul></body></html>"
        )))
        .mount(&server)
        .await;

    for (name, body) in files {
        Mock::given(method("GET"))
            .and(path(format!("/{name}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(&server)
            .await;
    }
    server
}

struct Dirs {
    output: TempDir,
    shards: TempDir,
}

impl Dirs {
    fn new() -> Self {
        Self {
            output: TempDir::new().unwrap(),
            shards: TempDir::new().unwrap(),
        }
    }

    fn config(&self, server: &MockServer) -> FinderConfig {
        FinderConfig {
            url: format!("{}/", server.uri()),
            target: 'A',
            workers: 4,
            download_path: self.output.path().to_path_buf(),
            archive_name: "matches.zip".to_string(),
            chunk_size: 4,
            request_timeout: Duration::from_secs(5),
            temp_dir: Some(self.shards.path().to_path_buf()),
        }
    }

    fn shard_dir_is_empty(&self) -> bool {
        std::fs::read_dir(self.shards.path()).unwrap().next().is_none()
    }
}

fn read_archive(path: &Path) -> BTreeMap<String, Vec<u8>> {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut entries = BTreeMap::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        let name = entry.name().to_string();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        entries.insert(name, content);
    }
    entries
}

fn archived(outcome: RunOutcome) -> (PathBuf, u64, Vec<String>) {
    match outcome {
        RunOutcome::Archived {
            path,
            offset,
            files,
        } => (path, offset, files),
        RunOutcome::NoMatch => panic!("expected an archive, got no match"),
    }
}

#[tokio::test]
async fn test_earliest_file_is_archived() {
    let server = serve(&[("a.txt", b"xxA"), ("b.txt", b"Axx")]).await;
    let dirs = Dirs::new();

    let outcome = CharFinder::new(dirs.config(&server))
        .unwrap()
        .run()
        .await
        .unwrap();

    let (path, offset, files) = archived(outcome);
    assert_eq!(offset, 0);
    assert_eq!(files, vec!["b.txt"]);
    assert_eq!(path, dirs.output.path().join("matches.zip"));

    let entries = read_archive(&path);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries["b.txt"], b"Axx");
    assert!(dirs.shard_dir_is_empty());
}

#[tokio::test]
async fn test_tied_files_are_all_archived() {
    let server = serve(&[("a.txt", b"xA"), ("b.txt", b"yA"), ("c.txt", b"zzz")]).await;
    let dirs = Dirs::new();

    let outcome = CharFinder::new(dirs.config(&server))
        .unwrap()
        .run()
        .await
        .unwrap();

    let (path, offset, files) = archived(outcome);
    assert_eq!(offset, 1);
    assert_eq!(files, vec!["a.txt", "b.txt"]);

    let entries = read_archive(&path);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries["a.txt"], b"xA");
    assert_eq!(entries["b.txt"], b"yA");
}

#[tokio::test]
async fn test_multi_chunk_file_is_reassembled_in_order() {
    let big: Vec<u8> = b"0123456789abcdefghijklmnopqrstuvwxyz"
        .iter()
        .cycle()
        .take(1000)
        .copied()
        .chain(*b"A tail after the match")
        .collect();
    let server = serve(&[("big.bin", &big), ("none.txt", b"nothing here")]).await;
    let dirs = Dirs::new();

    let outcome = CharFinder::new(dirs.config(&server))
        .unwrap()
        .run()
        .await
        .unwrap();

    let (path, offset, files) = archived(outcome);
    assert_eq!(offset, 1000);
    assert_eq!(files, vec!["big.bin"]);
    assert_eq!(read_archive(&path)["big.bin"], big);
}

#[tokio::test]
async fn test_no_match_writes_no_archive() {
    let server = serve(&[("a.txt", b"xyz"), ("b.txt", b"")]).await;
    let dirs = Dirs::new();

    let outcome = CharFinder::new(dirs.config(&server))
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(outcome, RunOutcome::NoMatch);
    assert!(!dirs.output.path().join("matches.zip").exists());
    assert!(dirs.shard_dir_is_empty());
}

#[tokio::test]
async fn test_missing_file_is_not_fatal() {
    let server = serve(&[("b.txt", b"xA")]).await;
    let dirs = Dirs::new();
    let lister = StaticLister::new(["missing.txt", "b.txt"]);

    let outcome = CharFinder::new(dirs.config(&server))
        .unwrap()
        .with_lister(Arc::new(lister))
        .run()
        .await
        .unwrap();

    let (_, offset, files) = archived(outcome);
    assert_eq!(offset, 1);
    assert_eq!(files, vec!["b.txt"]);
}

#[tokio::test]
async fn test_duplicate_listing_entries_fetch_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"A".to_vec()))
        .expect(1)
        .mount(&server)
        .await;
    let dirs = Dirs::new();
    let lister = StaticLister::new(["a.txt", "a.txt"]);

    let outcome = CharFinder::new(dirs.config(&server))
        .unwrap()
        .with_lister(Arc::new(lister))
        .run()
        .await
        .unwrap();

    let (path, _, files) = archived(outcome);
    assert_eq!(files, vec!["a.txt"]);
    assert_eq!(read_archive(&path).len(), 1);
}

#[tokio::test]
async fn test_result_does_not_depend_on_worker_count() {
    let files: Vec<(String, Vec<u8>)> = (0..12)
        .map(|i| {
            let mut body = vec![b'.'; 3 + (i % 5)];
            if i % 3 != 2 {
                body.push(b'A');
            }
            (format!("f{i:02}.txt"), body)
        })
        .collect();
    let borrowed: Vec<(&str, &[u8])> = files
        .iter()
        .map(|(name, body)| (name.as_str(), body.as_slice()))
        .collect();
    let server = serve(&borrowed).await;

    let mut results = Vec::new();
    for workers in [1, 3, 8] {
        let dirs = Dirs::new();
        let config = FinderConfig {
            workers,
            ..dirs.config(&server)
        };
        let outcome = CharFinder::new(config).unwrap().run().await.unwrap();
        let (path, offset, names) = archived(outcome);
        results.push((offset, names, read_archive(&path)));
    }

    // Offset 3 for i in {0, 5, 10}; f05 has no match
    assert_eq!(results[0].0, 3);
    assert_eq!(results[0].1, vec!["f00.txt", "f10.txt"]);
    assert_eq!(results[0], results[1]);
    assert_eq!(results[0], results[2]);
}

#[tokio::test]
async fn test_repeated_runs_produce_identical_archives() {
    let server = serve(&[("a.txt", b"hello A"), ("b.txt", b"world A")]).await;
    let dirs = Dirs::new();

    let first = CharFinder::new(FinderConfig {
        archive_name: "first.zip".to_string(),
        ..dirs.config(&server)
    })
    .unwrap()
    .run()
    .await
    .unwrap();
    let second = CharFinder::new(FinderConfig {
        archive_name: "second.zip".to_string(),
        ..dirs.config(&server)
    })
    .unwrap()
    .run()
    .await
    .unwrap();

    let (first, _, _) = archived(first);
    let (second, _, _) = archived(second);
    assert_eq!(std::fs::read(first).unwrap(), std::fs::read(second).unwrap());
}

#[tokio::test]
async fn test_index_failure_aborts_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let dirs = Dirs::new();

    let result = CharFinder::new(dirs.config(&server)).unwrap().run().await;

    assert!(matches!(result, Err(RunError::ListingError { .. })));
    assert!(dirs.shard_dir_is_empty());
}

#[tokio::test]
async fn test_empty_index_page_is_an_error() {
    let server = serve(&[]).await;
    let dirs = Dirs::new();

    let result = CharFinder::new(dirs.config(&server)).unwrap().run().await;

    assert!(matches!(result, Err(RunError::EmptyListing)));
}

#[tokio::test]
async fn test_shutdown_mid_download_removes_shards() {
    let server = serve(&[("fast.txt", b"xxxxxxxxA")]).await;
    Mock::given(method("GET"))
        .and(path("/slow.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("A")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;
    let dirs = Dirs::new();

    let shutdown = ShutdownCoordinator::shared();
    let finder = CharFinder::new(dirs.config(&server))
        .unwrap()
        .with_lister(Arc::new(StaticLister::new(["fast.txt", "slow.txt"])))
        .with_shutdown(shutdown.clone());
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        shutdown.request_shutdown();
    });

    let started = Instant::now();
    let result = finder.run().await;

    assert!(matches!(result, Err(RunError::Interrupted)));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(dirs.shard_dir_is_empty());
    assert!(!dirs.output.path().join("matches.zip").exists());
}
