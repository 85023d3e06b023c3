//! HTTP transport
//!
//! This module issues single requests with a fixed browser header profile and
//! an explicitly owned cookie jar. It never retries; the orchestrator decides
//! what a failure means. Redirect following is off by default so that a 3xx
//! reaches the classifier instead of being resolved silently.

use crate::config::HttpConfig;
use crate::ConfigError;
use async_trait::async_trait;
use cookie_store::CookieStore;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, LOCATION};
use reqwest::{redirect::Policy, Client, Method};
use reqwest_cookie_store::CookieStoreMutex;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// Failure to obtain a response at all
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} timed out: {detail}")]
    Timeout { url: String, detail: String },

    #[error("request to {url} failed: {detail}")]
    Io { url: String, detail: String },

    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("invalid session cookie for {origin}: {detail}")]
    Cookie { origin: String, detail: String },
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    fn from_reqwest(url: &str, error: reqwest::Error) -> Self {
        let detail = error.to_string();
        let lowered = detail.to_lowercase();
        if error.is_timeout() || lowered.contains("timed out") || lowered.contains("deadline") {
            Self::Timeout {
                url: url.to_string(),
                detail,
            }
        } else {
            Self::Io {
                url: url.to_string(),
                detail,
            }
        }
    }
}

/// A single outgoing request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>, headers: HeaderMap, timeout: Duration) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers,
            body: None,
            timeout,
        }
    }

    /// POST with a JSON body; sets `content-type: application/json`
    pub fn post_json(
        url: impl Into<String>,
        mut headers: HeaderMap,
        payload: &serde_json::Value,
        timeout: Duration,
    ) -> Self {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            method: Method::POST,
            url: url.into(),
            headers,
            body: Some(payload.to_string().into_bytes()),
            timeout,
        }
    }
}

/// Everything the classifier may look at
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub elapsed: Duration,
}

impl RawResponse {
    /// Body decoded as UTF-8, lossily
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Session cookies carried across requests and connection recycles
///
/// Storage and expiry follow RFC 6265 through `cookie_store`; the client
/// reads and updates the same store on every request and response. Cookies
/// are scoped to the site origin the jar was created for.
#[derive(Clone)]
pub struct CookieJar {
    store: Arc<CookieStoreMutex>,
    origin: Url,
}

impl CookieJar {
    /// An empty jar for `origin`
    pub fn new(origin: &str) -> Result<Self, TransportError> {
        let origin = Url::parse(origin).map_err(|e| TransportError::Cookie {
            origin: origin.to_string(),
            detail: e.to_string(),
        })?;
        Ok(Self {
            store: Arc::new(CookieStoreMutex::new(CookieStore::default())),
            origin,
        })
    }

    /// A jar for `origin` seeded with name -> value pairs
    pub fn with_cookies(
        origin: &str,
        cookies: &BTreeMap<String, String>,
    ) -> Result<Self, TransportError> {
        let jar = Self::new(origin)?;
        for (name, value) in cookies {
            jar.insert(name, value)?;
        }
        Ok(jar)
    }

    /// Sets a session cookie for the whole origin
    pub fn insert(&self, name: &str, value: &str) -> Result<(), TransportError> {
        self.lock()
            .parse(&format!("{}={}; Path=/", name, value), &self.origin)
            .map(|_| ())
            .map_err(|e| TransportError::Cookie {
                origin: self.origin.to_string(),
                detail: format!("cookie '{}': {}", name, e),
            })
    }

    /// Current value of an unexpired cookie sent to the origin
    pub fn get(&self, name: &str) -> Option<String> {
        let store = self.lock();
        let value = store
            .get_request_values(&self.origin)
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.to_string());
        value
    }

    pub fn len(&self) -> usize {
        self.lock().matches(&self.origin).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `Cookie` header a request to the origin would carry
    pub fn header_value(&self) -> Option<String> {
        let store = self.lock();
        let pairs: Vec<String> = store
            .get_request_values(&self.origin)
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        (!pairs.is_empty()).then(|| pairs.join("; "))
    }

    /// An independent copy of the current cookies
    pub fn snapshot(&self) -> Self {
        let copy = self.lock().clone();
        Self {
            store: Arc::new(CookieStoreMutex::new(copy)),
            origin: self.origin.clone(),
        }
    }

    pub(crate) fn provider(&self) -> Arc<CookieStoreMutex> {
        Arc::clone(&self.store)
    }

    fn lock(&self) -> MutexGuard<'_, CookieStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CookieJar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieJar")
            .field("origin", &self.origin.as_str())
            .field("cookies", &self.len())
            .finish()
    }
}

/// Builds the header map sent with every request
pub fn header_profile(http: &HttpConfig) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &http.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ConfigError::InvalidHeader(format!("invalid header name '{}'", name)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| ConfigError::InvalidHeader(format!("invalid value for '{}'", name)))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// One-shot request executor with an owned cookie jar
///
/// `recycled` returns a replacement built from the same settings and a copy
/// of the current cookies; the orchestrator swaps it in rather than mutating
/// the live handle.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, request: &HttpRequest) -> Result<RawResponse, TransportError>;

    fn recycled(&self) -> Result<Self, TransportError>
    where
        Self: Sized;

    fn cookies(&self) -> &CookieJar;
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: Client,
    cookies: CookieJar,
    follow_redirects: bool,
}

impl HttpTransport {
    /// Builds a transport with a fresh connection pool
    ///
    /// The client reads cookies from `cookies` and stores every `Set-Cookie`
    /// it receives back into it.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use readingroom_harvest::config::HttpConfig;
    /// use readingroom_harvest::crawler::{CookieJar, HttpTransport};
    ///
    /// let jar = CookieJar::new("https://www.cia.gov").unwrap();
    /// jar.insert("_session_", "abc").unwrap();
    /// let transport = HttpTransport::new(&HttpConfig::default(), jar).unwrap();
    /// ```
    pub fn new(http: &HttpConfig, cookies: CookieJar) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_http_client(http.follow_redirects, &cookies)?,
            cookies,
            follow_redirects: http.follow_redirects,
        })
    }
}

/// Builds an HTTP client with the crawler's connection settings
fn build_http_client(follow_redirects: bool, cookies: &CookieJar) -> Result<Client, TransportError> {
    let policy = if follow_redirects {
        Policy::limited(10)
    } else {
        Policy::none()
    };

    Client::builder()
        .redirect(policy)
        .cookie_provider(cookies.provider())
        .connect_timeout(Duration::from_secs(30))
        .gzip(true)
        .brotli(true)
        .build()
        .map_err(TransportError::Build)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&mut self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone())
            .timeout(request.timeout);

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let started = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&request.url, e))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(&request.url, e))?
            .to_vec();

        Ok(RawResponse {
            status,
            headers,
            body,
            elapsed: started.elapsed(),
        })
    }

    fn recycled(&self) -> Result<Self, TransportError> {
        let cookies = self.cookies.snapshot();
        Ok(Self {
            client: build_http_client(self.follow_redirects, &cookies)?,
            cookies,
            follow_redirects: self.follow_redirects,
        })
    }

    fn cookies(&self) -> &CookieJar {
        &self.cookies
    }
}
