//! Scripted transport and in-memory store for unit tests

use crate::crawler::transport::{CookieJar, HttpRequest, RawResponse, Transport, TransportError};
use crate::state::CrawlCheckpoint;
use crate::storage::{CheckpointStore, StorageResult};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Reply = Result<RawResponse, TransportError>;

#[derive(Default)]
struct Script {
    replies: HashMap<String, VecDeque<Reply>>,
    sent: Vec<HttpRequest>,
    recycles: usize,
}

/// Transport that answers from per-URL queues
///
/// Clones and recycled instances share one script, so a test keeps a handle
/// and inspects every request the crawl made.
#[derive(Clone)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
    cookies: CookieJar,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        let cookies = CookieJar::new("https://www.cia.gov").unwrap();
        cookies.insert("_session_", "test-session").unwrap();
        Self {
            script: Arc::new(Mutex::new(Script::default())),
            cookies,
        }
    }

    pub fn push(&self, url: &str, reply: Reply) -> &Self {
        self.script
            .lock()
            .unwrap()
            .replies
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn push_status(&self, url: &str, status: u16, body: &str) -> &Self {
        self.push(url, Ok(response(status, body)))
    }

    pub fn sent(&self) -> Vec<HttpRequest> {
        self.script.lock().unwrap().sent.clone()
    }

    pub fn sent_urls(&self) -> Vec<String> {
        self.sent().into_iter().map(|r| r.url).collect()
    }

    pub fn recycles(&self) -> usize {
        self.script.lock().unwrap().recycles
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&mut self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.sent.push(request.clone());
        script
            .replies
            .get_mut(&request.url)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(TransportError::Io {
                    url: request.url.clone(),
                    detail: "no scripted reply".to_string(),
                })
            })
    }

    fn recycled(&self) -> Result<Self, TransportError> {
        self.script.lock().unwrap().recycles += 1;
        Ok(Self {
            script: Arc::clone(&self.script),
            cookies: self.cookies.snapshot(),
        })
    }

    fn cookies(&self) -> &CookieJar {
        &self.cookies
    }
}

pub fn response(status: u16, body: &str) -> RawResponse {
    RawResponse {
        status,
        headers: HeaderMap::new(),
        body: body.as_bytes().to_vec(),
        elapsed: Duration::ZERO,
    }
}

pub fn timeout(url: &str) -> Reply {
    Err(TransportError::Timeout {
        url: url.to_string(),
        detail: "operation timed out".to_string(),
    })
}

/// A full-size results page listing `docs` with an optional next link
pub fn results_page(docs: &[u32], has_next: bool) -> String {
    let mut html = String::from("<html><body><ol class=\"search-results\">");
    for doc in docs {
        html.push_str(&format!(
            "<li><h3 class=\"title\"><a href=\"/readingroom/document/doc-{doc}\">Document {doc}</a></h3></li>"
        ));
    }
    html.push_str("</ol><ul class=\"pager\">");
    if has_next {
        html.push_str("<li class=\"pager-next\"><a href=\"?page=next\">next</a></li>");
    }
    html.push_str("</ul>");
    html.push_str(&format!("<!-- {} -->", "x".repeat(12_000)));
    html.push_str("</body></html>");
    html
}

pub fn doc_url(doc: u32) -> String {
    format!("https://www.cia.gov/readingroom/document/doc-{}", doc)
}

/// Checkpoint store kept in memory, recording every commit
#[derive(Clone, Default)]
pub struct MemoryStore {
    saved: Arc<Mutex<Option<CrawlCheckpoint>>>,
    history: Arc<Mutex<Vec<CrawlCheckpoint>>>,
}

impl MemoryStore {
    pub fn with(checkpoint: CrawlCheckpoint) -> Self {
        let store = Self::default();
        *store.saved.lock().unwrap() = Some(checkpoint);
        store
    }

    pub fn saved(&self) -> Option<CrawlCheckpoint> {
        self.saved.lock().unwrap().clone()
    }

    pub fn history(&self) -> Vec<CrawlCheckpoint> {
        self.history.lock().unwrap().clone()
    }
}

impl CheckpointStore for MemoryStore {
    fn load(&self, _search_term: &str) -> StorageResult<Option<CrawlCheckpoint>> {
        Ok(self.saved())
    }

    fn commit(&mut self, checkpoint: &CrawlCheckpoint) -> StorageResult<()> {
        *self.saved.lock().unwrap() = Some(checkpoint.clone());
        self.history.lock().unwrap().push(checkpoint.clone());
        Ok(())
    }

    fn location(&self, search_term: &str) -> String {
        format!("memory:{}", search_term)
    }
}
