//! Shared fixtures for the integration tests

use readingroom_harvest::config::Config;
use readingroom_harvest::credentials::StaticCredentials;
use readingroom_harvest::CrawlConfig;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use wiremock::{Match, Request};

pub const SEARCH_PATH: &str = "/readingroom/search/site/STARGATE";

/// Profile pointing every site path at the mock server
pub fn config_for(base_url: &str) -> Config {
    let mut config = Config::default();
    config.site.base_url = base_url.to_string();
    config.http.request_timeout = 5;
    config.http.challenge_timeout = 5;
    config
}

/// Run parameters without any waiting
pub fn fast_settings(output_dir: &Path) -> CrawlConfig {
    CrawlConfig {
        output_dir: output_dir.to_path_buf(),
        delay: Duration::ZERO,
        unavailable_wait: Duration::ZERO,
        max_retries: 3,
        ..CrawlConfig::default()
    }
}

pub fn credentials() -> StaticCredentials {
    let cookies: BTreeMap<String, String> = [("_session_".to_string(), "abc".to_string())].into();
    StaticCredentials::new(cookies)
}

/// A results page listing `docs`, padded past the content threshold
pub fn results_page(docs: &[u32], has_next: bool) -> String {
    let entries: String = docs
        .iter()
        .map(|d| {
            format!(
                r#"<li><h3 class="title"><a href="/readingroom/document/doc-{d}">Document {d}</a></h3></li>"#
            )
        })
        .collect();
    let pager = if has_next {
        r#"<li class="pager-next"><a href="?page=next">next</a></li>"#
    } else {
        ""
    };
    format!(
        r#"<html><body><ol class="search-results">{}</ol><ul class="pager">{}</ul><!-- {} --></body></html>"#,
        entries,
        pager,
        "x".repeat(12_000)
    )
}

/// Matches requests without a query string (the first results page)
pub struct NoQuery;

impl Match for NoQuery {
    fn matches(&self, request: &Request) -> bool {
        request.url.query().is_none()
    }
}

/// Matches requests whose `Cookie` header contains `needle`
pub struct CookieContains(pub &'static str);

impl Match for CookieContains {
    fn matches(&self, request: &Request) -> bool {
        request
            .headers
            .iter()
            .filter(|(name, _)| name.as_str().eq_ignore_ascii_case("cookie"))
            .flat_map(|(_, values)| values.iter())
            .any(|value| value.as_str().contains(self.0))
    }
}

/// Base URL of a local port nothing listens on
pub fn refused_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

/// Every `Cookie` header value a recorded request carried, joined
pub fn sent_cookies(request: &Request) -> String {
    request
        .headers
        .iter()
        .filter(|(name, _)| name.as_str().eq_ignore_ascii_case("cookie"))
        .flat_map(|(_, values)| values.iter())
        .map(|value| value.as_str().to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
