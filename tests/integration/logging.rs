//! Integration tests for logging and tracing

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use charscan_downloader::listing::StaticLister;
use charscan_downloader::{CharFinder, FinderConfig};
use tempfile::TempDir;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// In-memory log sink shared with the subscriber
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn test_env_filter_parsing() {
    for directive in [
        "info",
        "charscan_downloader=debug",
        "warn,charscan_downloader::scan=trace",
        "charscan_downloader::downloader=debug,charscan_downloader=info",
    ] {
        assert!(
            EnvFilter::try_new(directive).is_ok(),
            "directive should parse: {directive}"
        );
    }
}

#[tokio::test]
async fn test_run_emits_milestone_events() {
    let server = MockServer::start().await;
    for (name, body) in [("a.txt", "xxA"), ("b.txt", "Axx")] {
        Mock::given(method("GET"))
            .and(path(format!("/{name}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
    }
    let output = TempDir::new().unwrap();

    let logs = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_env_filter(EnvFilter::new("charscan_downloader=debug"))
        .finish();
    // Current-thread runtime: spawned workers log on this thread too
    let _guard = tracing::subscriber::set_default(subscriber);

    let finder = CharFinder::new(FinderConfig {
        url: format!("{}/", server.uri()),
        workers: 2,
        download_path: output.path().to_path_buf(),
        request_timeout: Duration::from_secs(5),
        ..FinderConfig::default()
    })
    .unwrap()
    .with_lister(Arc::new(StaticLister::new(["a.txt", "b.txt", "missing.txt"])));
    finder.run().await.unwrap();

    let text = logs.text();
    for expected in [
        "Files list",
        "Couldn't download file 'missing.txt'",
        "Candidate reported",
        "Character 'A' found earliest",
        "Archive assembled",
    ] {
        assert!(text.contains(expected), "missing {expected:?} in:\n{text}");
    }
    assert!(text.contains("ERROR"));
    assert!(!text.contains("TRACE"));
}
