//! PDF download batch job
//!
//! Reads the item list a crawl produced and fetches each document's PDF:
//! - The document page is requested first (it also proves the session works)
//! - The PDF URL comes from the document id, or the first `.pdf` link
//! - Only bodies that look like a PDF and exceed the minimum size are kept
//! - Every saved file gets a line in `manifest.jsonl` with its SHA-256
//!
//! A redirect ends the batch: the cookies have expired and every later
//! request would fail the same way.

use crate::config::{Config, SiteConfig};
use crate::crawler::{header_profile, HttpRequest, RawResponse, Shutdown, Transport};
use crate::state::DocumentRecord;
use crate::storage::write_atomic;
use crate::url::{pdf_url_for_document, slug_from_url};
use crate::Result;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

/// Batch parameters
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub pdf_dir: PathBuf,
    pub delay: Duration,
    pub overwrite: bool,
}

/// One line of `manifest.jsonl`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub url: String,
    pub title: String,
    pub file: String,
    pub bytes: u64,
    pub sha256: String,
}

/// Why a batch ended before the last document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStop {
    AuthExpired {
        url: String,
        status: u16,
        location: String,
    },
    Interrupted,
}

impl fmt::Display for BatchStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthExpired {
                url,
                status,
                location,
            } => write!(
                f,
                "redirect {} to {} while fetching {}; session cookies have expired",
                status, location, url
            ),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DownloadReport {
    pub total: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub stop: Option<BatchStop>,
}

enum DocumentResult {
    Saved(ManifestEntry),
    Skipped,
    Failed(String),
    Stop(BatchStop),
}

pub struct Downloader<T> {
    transport: T,
    site: SiteConfig,
    min_pdf_size: usize,
    headers: HeaderMap,
    timeout: Duration,
    settings: DownloadSettings,
    shutdown: Shutdown,
}

impl<T: Transport> Downloader<T> {
    pub fn new(
        config: &Config,
        settings: DownloadSettings,
        transport: T,
        shutdown: Shutdown,
    ) -> Result<Self> {
        Ok(Self {
            transport,
            site: config.site.clone(),
            min_pdf_size: config.policy.min_pdf_size,
            headers: header_profile(&config.http)?,
            timeout: config.http.request_timeout(),
            settings,
            shutdown,
        })
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.settings.pdf_dir.join("manifest.jsonl")
    }

    /// Downloads every item in order
    ///
    /// Per-document failures are counted and logged; only local I/O errors
    /// are returned as errors.
    pub async fn run(&mut self, items: &[DocumentRecord]) -> Result<DownloadReport> {
        let mut report = DownloadReport {
            total: items.len(),
            ..DownloadReport::default()
        };
        std::fs::create_dir_all(&self.settings.pdf_dir)?;

        for (index, item) in items.iter().enumerate() {
            if self.shutdown.is_triggered() {
                report.stop = Some(BatchStop::Interrupted);
                break;
            }

            tracing::info!("[{}/{}] {}", index + 1, items.len(), item.url);
            match self.fetch_document(item).await? {
                DocumentResult::Skipped => {
                    report.skipped += 1;
                    continue;
                }
                DocumentResult::Saved(entry) => {
                    tracing::info!("Saved {} ({} bytes)", entry.file, entry.bytes);
                    self.append_manifest(&entry)?;
                    report.downloaded += 1;
                }
                DocumentResult::Failed(reason) => {
                    tracing::warn!("Skipping {}: {}", item.url, reason);
                    report.failed += 1;
                }
                DocumentResult::Stop(stop) => {
                    tracing::error!("{}", stop);
                    report.stop = Some(stop);
                    break;
                }
            }

            if index + 1 < items.len() && self.shutdown.sleep(self.settings.delay).await.is_err() {
                report.stop = Some(BatchStop::Interrupted);
                break;
            }
        }

        Ok(report)
    }

    async fn fetch_document(&mut self, item: &DocumentRecord) -> Result<DocumentResult> {
        let file = format!("{}.pdf", slug_from_url(&item.url));
        let pdf_path = self.settings.pdf_dir.join(&file);
        if pdf_path.exists() && !self.settings.overwrite {
            tracing::info!("Already downloaded: {}", file);
            return Ok(DocumentResult::Skipped);
        }

        let landing = format!("{}{}", self.site.base_url, self.site.landing_path);
        let page = match self.get(&item.url, &landing, None).await {
            Ok(response) => response,
            Err(result) => return Ok(result),
        };

        let Some(pdf_url) = pdf_url_for_document(&item.url, &page.text(), &self.site) else {
            return Ok(DocumentResult::Failed("no PDF link on document page".to_string()));
        };
        tracing::debug!("PDF URL: {}", pdf_url);

        let pdf = match self
            .get(&pdf_url, &item.url, Some("application/pdf,*/*;q=0.8"))
            .await
        {
            Ok(response) => response,
            Err(result) => return Ok(result),
        };

        if !pdf.body.starts_with(b"%PDF") || pdf.body.len() <= self.min_pdf_size {
            return Ok(DocumentResult::Failed(format!(
                "not a PDF ({} bytes from {})",
                pdf.body.len(),
                pdf_url
            )));
        }

        write_atomic(&pdf_path, &pdf.body)?;

        Ok(DocumentResult::Saved(ManifestEntry {
            url: item.url.clone(),
            title: item.title.clone(),
            file,
            bytes: pdf.body.len() as u64,
            sha256: hex::encode(Sha256::digest(&pdf.body)),
        }))
    }

    /// GET with the header profile; non-success outcomes come back as `Err`
    async fn get(
        &mut self,
        url: &str,
        referer: &str,
        accept: Option<&'static str>,
    ) -> std::result::Result<RawResponse, DocumentResult> {
        let mut headers = self.headers.clone();
        if let Ok(value) = HeaderValue::from_str(referer) {
            headers.insert(REFERER, value);
        }
        if let Some(accept) = accept {
            headers.insert(ACCEPT, HeaderValue::from_static(accept));
        }

        let request = HttpRequest::get(url, headers, self.timeout);
        let response = self
            .transport
            .send(&request)
            .await
            .map_err(|e| DocumentResult::Failed(e.to_string()))?;

        if response.is_redirect() {
            return Err(DocumentResult::Stop(BatchStop::AuthExpired {
                url: url.to_string(),
                status: response.status,
                location: response.location().unwrap_or("N/A").to_string(),
            }));
        }
        if !response.is_success() {
            return Err(DocumentResult::Failed(format!(
                "HTTP {} from {}",
                response.status, url
            )));
        }
        Ok(response)
    }

    fn append_manifest(&self, entry: &ManifestEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.manifest_path())?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}
