//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the search endpoint and run the
//! full crawl cycle over real HTTP, including the checkpoint files.

use crate::common::{
    config_for, credentials, fast_settings, refused_base_url, results_page, CookieContains,
    NoQuery, SEARCH_PATH,
};
use async_trait::async_trait;
use readingroom_harvest::config::StorageBackend;
use readingroom_harvest::credentials::StaticCredentials;
use readingroom_harvest::crawler::{
    crawl, prepare_crawl, CookieJar, HttpRequest, HttpTransport, RawResponse,
    ResultsPageExtractor, Shutdown, Transport, TransportError, FIXED_OFFSET,
};
use readingroom_harvest::storage::{open_store, CheckpointStore, JsonCheckpointStore};
use readingroom_harvest::{HarvestError, Orchestrator, SearchTarget, StopReason};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn page_ok(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(body)
}

#[tokio::test]
async fn test_crawl_reaches_end_of_results() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(NoQuery)
        .and(CookieContains("_session_=abc"))
        .respond_with(page_ok(results_page(&[1, 2], true)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("page", "1"))
        .respond_with(page_ok(results_page(&[2, 3], false)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let report = crawl(
        "stargate",
        &config_for(&server.uri()),
        fast_settings(dir.path()),
        &credentials(),
        Shutdown::never(),
    )
    .await
    .unwrap();

    assert_eq!(report.stop, StopReason::EndOfResults { page: 1 });
    assert_eq!(report.pages_committed, 2);
    assert_eq!(report.total_items, 3);
    assert_eq!(report.next_page, 2);

    let progress: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("STARGATE.progress.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(progress["search_term"], "stargate");
    assert_eq!(progress["last_page"], 1);
    assert_eq!(progress["pages_scraped"], json!([0, 1]));
    assert_eq!(progress["all_urls"].as_array().unwrap().len(), 3);

    let jsonl = std::fs::read_to_string(dir.path().join("STARGATE.jsonl")).unwrap();
    let first: serde_json::Value = serde_json::from_str(jsonl.lines().next().unwrap()).unwrap();
    assert_eq!(jsonl.lines().count(), 3);
    assert_eq!(
        first["url"],
        format!("{}/readingroom/document/doc-1", server.uri())
    );
    assert_eq!(first["title"], "Document 1");
}

#[tokio::test]
async fn test_redirect_stops_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/user/login"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let report = crawl(
        "stargate",
        &config_for(&server.uri()),
        fast_settings(dir.path()),
        &credentials(),
        Shutdown::never(),
    )
    .await
    .unwrap();

    assert!(matches!(
        report.stop,
        StopReason::AuthExpired { page: 0, status: 302, ref location } if location.ends_with("/user/login")
    ));
    assert!(!dir.path().join("STARGATE.progress.json").exists());
}

#[tokio::test]
async fn test_rate_limited_page_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(page_ok(results_page(&[1], false)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let report = crawl(
        "stargate",
        &config_for(&server.uri()),
        fast_settings(dir.path()),
        &credentials(),
        Shutdown::never(),
    )
    .await
    .unwrap();

    assert_eq!(report.stop, StopReason::EndOfResults { page: 0 });
    assert_eq!(report.total_items, 1);
}

#[tokio::test]
async fn test_retries_exhausted_after_persistent_unavailability() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let report = crawl(
        "stargate",
        &config_for(&server.uri()),
        fast_settings(dir.path()),
        &credentials(),
        Shutdown::never(),
    )
    .await
    .unwrap();

    assert_eq!(
        report.stop,
        StopReason::RetriesExhausted {
            page: 0,
            attempts: 3
        }
    );
}

#[tokio::test]
async fn test_challenge_is_solved_and_cookie_carried_into_replay() {
    let server = MockServer::start().await;
    let challenge = r#"<html><script>var i = 5;
        var payload = {"bm-verify": "tok-xyz"};
        fetch("/_sec/verify?provider=interstitial", {method: "POST"});</script></html>"#;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(page_ok(challenge.to_string()))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/_sec/verify"))
        .and(query_param("provider", "interstitial"))
        .and(body_json(json!({"bm-verify": "tok-xyz", "pow": 5 + FIXED_OFFSET})))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("set-cookie", "ak_bmsc=cleared; Path=/; HttpOnly")
                .set_body_string("{\"reload\":true}"),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(CookieContains("ak_bmsc=cleared"))
        .respond_with(page_ok(results_page(&[9], false)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let report = crawl(
        "stargate",
        &config_for(&server.uri()),
        fast_settings(dir.path()),
        &credentials(),
        Shutdown::never(),
    )
    .await
    .unwrap();

    assert_eq!(report.stop, StopReason::EndOfResults { page: 0 });
    assert_eq!(report.total_items, 1);
}

#[tokio::test]
async fn test_undersized_page_is_saved_for_inspection() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(page_ok("<html>Access Denied</html>".to_string()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let report = crawl(
        "stargate",
        &config_for(&server.uri()),
        fast_settings(dir.path()),
        &credentials(),
        Shutdown::never(),
    )
    .await
    .unwrap();

    assert!(matches!(
        report.stop,
        StopReason::UndersizedResponse { page: 0, .. }
    ));
    let dump = dir.path().join("debug_page_0_STARGATE.html");
    assert_eq!(
        std::fs::read_to_string(dump).unwrap(),
        "<html>Access Denied</html>"
    );
}

#[tokio::test]
async fn test_resume_from_existing_progress_file() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let existing = json!({
        "search_term": "stargate",
        "last_page": 0,
        "pages_scraped": [0],
        "all_urls": [
            {"url": format!("{}/readingroom/document/doc-1", server.uri()), "title": "Document 1"}
        ],
        "last_updated": "2024-05-01T12:00:00.123456"
    });
    std::fs::write(
        dir.path().join("STARGATE.progress.json"),
        serde_json::to_string_pretty(&existing).unwrap(),
    )
    .unwrap();

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(NoQuery)
        .respond_with(page_ok(results_page(&[1], true)))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("page", "1"))
        .respond_with(page_ok(results_page(&[1, 2], false)))
        .expect(1)
        .mount(&server)
        .await;

    let report = crawl(
        "stargate",
        &config_for(&server.uri()),
        fast_settings(dir.path()),
        &credentials(),
        Shutdown::never(),
    )
    .await
    .unwrap();

    assert_eq!(report.stop, StopReason::EndOfResults { page: 1 });
    assert_eq!(report.new_items, 1);
    assert_eq!(report.total_items, 2);
}

#[tokio::test]
async fn test_max_pages_limits_the_run() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(NoQuery)
        .respond_with(page_ok(results_page(&[1], true)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("page", "1"))
        .respond_with(page_ok(results_page(&[2], true)))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut settings = fast_settings(dir.path());
    settings.max_pages = Some(1);

    let report = crawl(
        "stargate",
        &config_for(&server.uri()),
        settings,
        &credentials(),
        Shutdown::never(),
    )
    .await
    .unwrap();

    assert_eq!(report.stop, StopReason::MaxPagesReached { limit: 1 });
    assert_eq!(report.next_page, 1);
}

#[tokio::test]
async fn test_sqlite_backend_persists_checkpoint() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(page_ok(results_page(&[1, 2], false)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = config_for(&server.uri());
    config.storage.backend = StorageBackend::Sqlite;
    let settings = fast_settings(dir.path());

    crawl(
        "stargate",
        &config,
        settings.clone(),
        &credentials(),
        Shutdown::never(),
    )
    .await
    .unwrap();

    let store = open_store(&config, &settings).unwrap();
    let checkpoint = store.load("stargate").unwrap().unwrap();
    assert_eq!(checkpoint.items().len(), 2);
    assert!(checkpoint.is_scraped(0));
    assert!(dir.path().join("STARGATE.jsonl").exists());
}

#[tokio::test]
async fn test_missing_cookies_refuse_to_start() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let result = prepare_crawl(
        "stargate",
        &config_for(&server.uri()),
        fast_settings(dir.path()),
        &StaticCredentials::default(),
        Shutdown::never(),
    );

    assert!(matches!(result, Err(HarvestError::Credentials(_))));
}

/// Real transport that counts how often it was replaced
struct CountingTransport {
    inner: HttpTransport,
    recycles: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for CountingTransport {
    async fn send(&mut self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        self.inner.send(request).await
    }

    fn recycled(&self) -> Result<Self, TransportError> {
        self.recycles.fetch_add(1, Ordering::SeqCst);
        Ok(Self {
            inner: self.inner.recycled()?,
            recycles: Arc::clone(&self.recycles),
        })
    }

    fn cookies(&self) -> &CookieJar {
        self.inner.cookies()
    }
}

#[tokio::test]
async fn test_timed_out_page_is_retried_on_fresh_connection() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(
            page_ok(results_page(&[1], false)).set_delay(Duration::from_secs(4)),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(CookieContains("_session_=abc"))
        .respond_with(page_ok(results_page(&[1, 2], false)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = config_for(&server.uri());
    config.http.request_timeout = 1;

    let recycles = Arc::new(AtomicUsize::new(0));
    let cookies: BTreeMap<String, String> =
        [("_session_".to_string(), "abc".to_string())].into();
    let jar = CookieJar::with_cookies(&server.uri(), &cookies).unwrap();
    let transport = CountingTransport {
        inner: HttpTransport::new(&config.http, jar).unwrap(),
        recycles: Arc::clone(&recycles),
    };

    let mut orchestrator = Orchestrator::new(
        SearchTarget::new("stargate", &config.site).unwrap(),
        &config,
        fast_settings(dir.path()),
        transport,
        JsonCheckpointStore::new(dir.path()),
        ResultsPageExtractor::new(&config.site),
        Shutdown::never(),
    )
    .unwrap();
    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.stop, StopReason::EndOfResults { page: 0 });
    assert_eq!(report.total_items, 2);
    assert_eq!(recycles.load(Ordering::SeqCst), 1);
    assert!(orchestrator.checkpoint().is_scraped(0));
    assert!(dir.path().join("STARGATE.progress.json").exists());
}

#[tokio::test]
async fn test_refused_connection_is_fatal() {
    let dir = TempDir::new().unwrap();
    let report = crawl(
        "stargate",
        &config_for(&refused_base_url()),
        fast_settings(dir.path()),
        &credentials(),
        Shutdown::never(),
    )
    .await
    .unwrap();

    assert!(matches!(report.stop, StopReason::Fatal { page: 0, .. }));
    assert_eq!(report.pages_committed, 0);
    assert!(!dir.path().join("STARGATE.progress.json").exists());
}
