//! Integration tests for the reqwest transport
//!
//! These run real requests against wiremock to check how failures are
//! reported and how the cookie jar follows the server's `Set-Cookie` headers.

use crate::common::{config_for, refused_base_url, sent_cookies};
use readingroom_harvest::crawler::{CookieJar, HttpRequest, HttpTransport, Transport};
use reqwest::header::HeaderMap;
use std::collections::BTreeMap;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport(base_url: &str) -> HttpTransport {
    let cookies: BTreeMap<String, String> = [
        ("_session_".to_string(), "abc".to_string()),
        ("ak_bmsc".to_string(), "stale".to_string()),
    ]
    .into();
    let jar = CookieJar::with_cookies(base_url, &cookies).unwrap();
    HttpTransport::new(&config_for(base_url).http, jar).unwrap()
}

fn get(url: String, timeout: Duration) -> HttpRequest {
    HttpRequest::get(url, HeaderMap::new(), timeout)
}

#[tokio::test]
async fn test_slow_response_is_a_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let mut transport = transport(&server.uri());
    let err = transport
        .send(&get(
            format!("{}/slow", server.uri()),
            Duration::from_millis(300),
        ))
        .await
        .unwrap_err();

    assert!(err.is_timeout(), "expected a timeout, got {}", err);
}

#[tokio::test]
async fn test_refused_connection_is_not_a_timeout() {
    let base_url = refused_base_url();
    let mut transport = transport(&base_url);

    let err = transport
        .send(&get(format!("{}/", base_url), Duration::from_secs(5)))
        .await
        .unwrap_err();

    assert!(!err.is_timeout(), "unexpected timeout: {}", err);
}

#[tokio::test]
async fn test_expired_cookie_is_not_sent_again() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/expire"))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header(
                    "set-cookie",
                    "ak_bmsc=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Path=/",
                )
                .append_header("set-cookie", "bm_sv=fresh; Path=/"),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/next"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut transport = transport(&server.uri());
    let timeout = Duration::from_secs(5);
    transport
        .send(&get(format!("{}/expire", server.uri()), timeout))
        .await
        .unwrap();

    assert_eq!(transport.cookies().get("ak_bmsc"), None);
    assert_eq!(transport.cookies().get("bm_sv").as_deref(), Some("fresh"));

    // The copy handed to a recycled transport no longer has it either
    let mut fresh = transport.recycled().unwrap();
    fresh
        .send(&get(format!("{}/next", server.uri()), timeout))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let first = sent_cookies(&requests[0]);
    let last = sent_cookies(&requests[1]);
    assert!(first.contains("ak_bmsc=stale"));
    assert!(!last.contains("ak_bmsc"));
    assert!(last.contains("_session_=abc"));
    assert!(last.contains("bm_sv=fresh"));
}
