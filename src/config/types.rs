use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Site profile for Readingroom-Harvest
///
/// Every section has a built-in default matching the public reading room,
/// so an empty TOML file (or no file at all) yields a usable profile.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub credentials: CredentialConfig,
}

/// Remote endpoint layout
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Scheme and host, without trailing slash
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Path prefix of the search endpoint; the encoded term is appended
    #[serde(rename = "search-path")]
    pub search_path: String,

    /// Landing page used as the referer of the first results page
    #[serde(rename = "landing-path")]
    pub landing_path: String,

    /// Path (with query) the interstitial verification payload is posted to
    #[serde(rename = "verify-path")]
    pub verify_path: String,

    /// Only links containing this fragment count as documents
    #[serde(rename = "document-marker")]
    pub document_marker: String,

    /// Directory path under which `<DOCID>.pdf` files are served
    #[serde(rename = "pdf-path")]
    pub pdf_path: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.cia.gov".to_string(),
            search_path: "/readingroom/search/site/".to_string(),
            landing_path: "/readingroom/".to_string(),
            verify_path: "/_sec/verify?provider=interstitial".to_string(),
            document_marker: "/readingroom/document/".to_string(),
            pdf_path: "/readingroom/docs/".to_string(),
        }
    }
}

/// Transport behaviour and the browser header profile
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Timeout for a single page request (seconds)
    #[serde(rename = "request-timeout")]
    pub request_timeout: u64,

    /// Timeout for the verification POST and the replay GET (seconds)
    #[serde(rename = "challenge-timeout")]
    pub challenge_timeout: u64,

    /// Let the client resolve redirects instead of reporting them
    #[serde(rename = "follow-redirects")]
    pub follow_redirects: bool,

    /// Open a fresh connection after every committed page
    #[serde(rename = "recycle-between-pages")]
    pub recycle_between_pages: bool,

    /// Headers sent with every request
    pub headers: BTreeMap<String, String>,
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn challenge_timeout(&self) -> Duration {
        Duration::from_secs(self.challenge_timeout)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: 60,
            challenge_timeout: 30,
            follow_redirects: false,
            recycle_between_pages: true,
            headers: default_headers(),
        }
    }
}

fn default_headers() -> BTreeMap<String, String> {
    [
        (
            "accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
        ),
        ("accept-language", "en-US,en;q=0.9"),
        ("cache-control", "max-age=0"),
        ("priority", "u=0, i"),
        (
            "sec-ch-ua",
            "\"Not(A:Brand\";v=\"8\", \"Chromium\";v=\"144\", \"Brave\";v=\"144\"",
        ),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-platform", "\"Linux\""),
        ("sec-fetch-dest", "document"),
        ("sec-fetch-mode", "navigate"),
        ("sec-fetch-site", "same-origin"),
        ("sec-fetch-user", "?1"),
        ("sec-gpc", "1"),
        ("upgrade-insecure-requests", "1"),
        (
            "user-agent",
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/144.0.0.0 Safari/537.36",
        ),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Bot-detection heuristics
///
/// None of these have ground truth; they are kept overridable because the
/// remote server's behaviour drifts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Bodies shorter than this are not real result pages (bytes)
    #[serde(rename = "content-threshold")]
    pub content_threshold: usize,

    /// Consecutive empty result pages treated as end of results
    #[serde(rename = "max-consecutive-empty")]
    pub max_consecutive_empty: u32,

    /// Empty pages larger than this are saved for inspection (bytes)
    #[serde(rename = "empty-page-dump-threshold")]
    pub empty_page_dump_threshold: usize,

    /// Downloaded PDFs smaller than this are rejected (bytes)
    #[serde(rename = "min-pdf-size")]
    pub min_pdf_size: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            content_threshold: 10_000,
            max_consecutive_empty: 2,
            empty_page_dump_threshold: 50_000,
            min_pdf_size: 500,
        }
    }
}

/// Checkpoint backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// SQLite file; defaults to `<output-dir>/checkpoints.db`
    #[serde(rename = "sqlite-path")]
    pub sqlite_path: Option<PathBuf>,
}

/// Where session cookies come from
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Cookie name -> environment variable holding its value
    pub cookies: BTreeMap<String, String>,

    /// Cookie names without which a crawl must not start
    pub required: Vec<String>,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        let cookies = [("_session_", "COOKIE_SESSION"), ("ak_bmsc", "COOKIE_AK_BMSC")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            cookies,
            required: Vec::new(),
        }
    }
}

/// Immutable per-run crawl parameters
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Directory receiving the checkpoint, item list and diagnostics
    pub output_dir: PathBuf,

    /// Pause after every successful page
    pub delay: Duration,

    /// Pause after a rate-limited or timed-out attempt
    pub unavailable_wait: Duration,

    /// Attempts per page before the run is abandoned
    pub max_retries: u32,

    /// Page numbers this run may walk through, counted from the start page
    pub max_pages: Option<u32>,

    /// Overrides the resume point
    pub start_page: Option<u32>,

    /// Discard the prior checkpoint
    pub reset: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            delay: Duration::from_secs(90),
            unavailable_wait: Duration::from_secs(120),
            max_retries: 10,
            max_pages: None,
            start_page: None,
            reset: false,
        }
    }
}
