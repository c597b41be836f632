//! Unit tests for index page listing

use charscan_downloader::listing::{FileLister, HtmlIndexLister, ListError};
use reqwest::Client;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_html_index_lister_returns_links_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><ul>
<li><a href="c.txt">c.txt</a></li>
<li><a href="a.txt">a.txt</a></li>
<li><a href="c.txt">c.txt</a></li>
</ul></body></html>"#,
        ))
        .mount(&server)
        .await;

    let lister = HtmlIndexLister::new(Client::new());
    let files = lister.list(&format!("{}/", server.uri())).await.unwrap();

    assert_eq!(files, vec!["c.txt", "a.txt", "c.txt"]);
}

#[tokio::test]
async fn test_html_index_lister_empty_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&server)
        .await;

    let lister = HtmlIndexLister::new(Client::new());
    let files = lister.list(&format!("{}/", server.uri())).await.unwrap();

    assert!(files.is_empty());
}

#[tokio::test]
async fn test_html_index_lister_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let lister = HtmlIndexLister::new(Client::new());
    let result = lister.list(&format!("{}/", server.uri())).await;

    assert!(matches!(result, Err(ListError::HttpStatus(404))));
}

#[tokio::test]
async fn test_html_index_lister_unreachable_host() {
    let lister = HtmlIndexLister::new(Client::new());
    // Port 9 (discard) is closed on test hosts
    let result = lister.list("http://127.0.0.1:9/").await;

    assert!(matches!(result, Err(ListError::NetworkError(_))));
}
