//! Integration tests for the PDF download batch

use crate::common::{config_for, CookieContains};
use readingroom_harvest::crawler::{CookieJar, HttpTransport, Shutdown};
use readingroom_harvest::download::{BatchStop, DownloadSettings, Downloader};
use readingroom_harvest::DocumentRecord;
use std::collections::BTreeMap;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn pdf_bytes() -> Vec<u8> {
    let mut body = b"%PDF-1.4\n".to_vec();
    body.extend(std::iter::repeat(b'0').take(2_000));
    body
}

fn downloader(base_url: &str, pdf_dir: &std::path::Path) -> Downloader<HttpTransport> {
    let config = config_for(base_url);
    let cookies: BTreeMap<String, String> = [("_session_".to_string(), "abc".to_string())].into();
    let jar = CookieJar::with_cookies(base_url, &cookies).unwrap();
    let transport = HttpTransport::new(&config.http, jar).unwrap();
    let settings = DownloadSettings {
        pdf_dir: pdf_dir.to_path_buf(),
        delay: Duration::ZERO,
        overwrite: false,
    };
    Downloader::new(&config, settings, transport, Shutdown::never()).unwrap()
}

#[tokio::test]
async fn test_download_saves_pdf_and_manifest() {
    let server = MockServer::start().await;
    let doc_url = format!("{}/readingroom/document/doc-1", server.uri());

    Mock::given(method("GET"))
        .and(path("/readingroom/document/doc-1"))
        .and(CookieContains("_session_=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>document</html>"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/readingroom/docs/DOC-1.pdf"))
        .and(header("referer", doc_url.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pdf_bytes()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut downloader = downloader(&server.uri(), dir.path());
    let report = downloader
        .run(&[DocumentRecord::new(&doc_url, "Document 1")])
        .await
        .unwrap();

    assert_eq!(report.downloaded, 1);
    assert_eq!(report.failed, 0);
    assert!(report.stop.is_none());
    assert_eq!(std::fs::read(dir.path().join("doc-1.pdf")).unwrap(), pdf_bytes());

    let manifest = std::fs::read_to_string(downloader.manifest_path()).unwrap();
    let entry: serde_json::Value = serde_json::from_str(manifest.trim()).unwrap();
    assert_eq!(entry["url"], doc_url);
    assert_eq!(entry["file"], "doc-1.pdf");
    assert_eq!(entry["bytes"], 2_009);
    assert_eq!(entry["sha256"].as_str().unwrap().len(), 64);

    // A second run finds the file already on disk
    let report = downloader
        .run(&[DocumentRecord::new(&doc_url, "Document 1")])
        .await
        .unwrap();
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn test_expired_session_stops_batch() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/readingroom/document/doc-1"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/user/login"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/readingroom/document/doc-2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let items = vec![
        DocumentRecord::new(format!("{}/readingroom/document/doc-1", server.uri()), "One"),
        DocumentRecord::new(format!("{}/readingroom/document/doc-2", server.uri()), "Two"),
    ];
    let report = downloader(&server.uri(), dir.path())
        .run(&items)
        .await
        .unwrap();

    assert!(matches!(
        report.stop,
        Some(BatchStop::AuthExpired { status: 302, .. })
    ));
    assert_eq!(report.downloaded, 0);
}

#[tokio::test]
async fn test_html_instead_of_pdf_is_counted_as_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/readingroom/document/doc-3"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>document</html>"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/readingroom/docs/DOC-3.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>Access Denied</html>"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let item = DocumentRecord::new(format!("{}/readingroom/document/doc-3", server.uri()), "Three");
    let report = downloader(&server.uri(), dir.path())
        .run(&[item])
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
    assert!(report.stop.is_none());
    assert!(!dir.path().join("doc-3.pdf").exists());
}
