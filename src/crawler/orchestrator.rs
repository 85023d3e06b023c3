//! Crawl orchestrator - the page loop
//!
//! This module drives one search term through its result pages:
//! - Resuming from the stored checkpoint and skipping committed pages
//! - Retrying rate-limited and timed-out pages with a fixed wait
//! - Handing interstitial challenges to the solver
//! - Committing the checkpoint and item list after every productive page
//! - Deciding when the run is over and why
//!
//! Pages are fetched strictly one at a time with a pause between them.

use crate::config::{Config, CrawlConfig, PolicyConfig};
use crate::crawler::challenge::{ChallengeSolver, SolveResult};
use crate::crawler::classifier::Classifier;
use crate::crawler::extractor::Extractor;
use crate::crawler::pacing::Shutdown;
use crate::crawler::transport::{header_profile, HttpRequest, RawResponse, Transport};
use crate::output::{ArtifactKind, ArtifactWriter, JsonlExporter};
use crate::state::{CrawlCheckpoint, DocumentRecord, PageOutcome};
use crate::storage::CheckpointStore;
use crate::url::SearchTarget;
use crate::Result;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, REFERER};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Where the orchestrator is in its page loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlPhase {
    Idle,
    FetchingPage,
    Retrying,
    Advancing,
    Stopped,
}

/// Why a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// A productive page had no next-page link
    EndOfResults { page: u32 },

    /// Too many empty pages in a row
    ConsecutiveEmptyPages { page: u32, count: u32 },

    /// The per-run page limit was reached
    MaxPagesReached { limit: u32 },

    /// A redirect; the session cookies need refreshing
    AuthExpired {
        page: u32,
        status: u16,
        location: String,
    },

    /// The interstitial challenge could not be cleared
    ChallengeUnsolved {
        page: u32,
        artifact: Option<PathBuf>,
    },

    /// The server sent a body too small to be a results page
    UndersizedResponse {
        page: u32,
        bytes: usize,
        artifact: Option<PathBuf>,
    },

    /// Every attempt for a page was rate limited or timed out
    RetriesExhausted { page: u32, attempts: u32 },

    /// Unexpected HTTP status or transport failure
    Fatal { page: u32, detail: String },

    /// The operator asked the run to stop
    Interrupted { page: u32 },
}

impl StopReason {
    /// True for the ways a crawl is expected to finish
    pub fn is_natural_end(&self) -> bool {
        matches!(
            self,
            Self::EndOfResults { .. }
                | Self::ConsecutiveEmptyPages { .. }
                | Self::MaxPagesReached { .. }
        )
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfResults { page } => write!(f, "end of results after page {}", page),
            Self::ConsecutiveEmptyPages { page, count } => {
                write!(f, "{} consecutive empty pages ending at page {}", count, page)
            }
            Self::MaxPagesReached { limit } => write!(f, "page limit of {} reached", limit),
            Self::AuthExpired {
                page,
                status,
                location,
            } => write!(
                f,
                "redirect {} to {} on page {}; session cookies have expired, refresh them and rerun",
                status, location, page
            ),
            Self::ChallengeUnsolved { page, artifact } => {
                write!(f, "challenge on page {} could not be solved", page)?;
                write_artifact(f, artifact)
            }
            Self::UndersizedResponse {
                page,
                bytes,
                artifact,
            } => {
                write!(
                    f,
                    "page {} returned only {} bytes (probable block)",
                    page, bytes
                )?;
                write_artifact(f, artifact)
            }
            Self::RetriesExhausted { page, attempts } => {
                write!(f, "page {} still unavailable after {} attempts", page, attempts)
            }
            Self::Fatal { page, detail } => write!(f, "page {} failed: {}", page, detail),
            Self::Interrupted { page } => write!(f, "interrupted before page {}", page),
        }
    }
}

fn write_artifact(f: &mut fmt::Formatter<'_>, artifact: &Option<PathBuf>) -> fmt::Result {
    match artifact {
        Some(path) => write!(f, "; body saved to {}", path.display()),
        None => Ok(()),
    }
}

/// Summary of one run
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub stop: StopReason,
    pub pages_committed: u32,
    pub new_items: usize,
    pub total_items: usize,
    /// Page the next run resumes from
    pub next_page: u32,
}

enum Step {
    Advance,
    Stop(StopReason),
}

/// Drives the crawl for one search term
pub struct Orchestrator<T, S, E> {
    target: SearchTarget,
    settings: CrawlConfig,
    policy: PolicyConfig,
    headers: HeaderMap,
    request_timeout: Duration,
    recycle_between_pages: bool,
    transport: T,
    store: S,
    classifier: Classifier<E>,
    solver: ChallengeSolver,
    shutdown: Shutdown,
    artifacts: ArtifactWriter,
    exporter: JsonlExporter,
    checkpoint: CrawlCheckpoint,
    phase: CrawlPhase,
    page_limit: Option<u32>,
    consecutive_empty: u32,
    pages_committed: u32,
    new_items: usize,
}

impl<T, S, E> Orchestrator<T, S, E>
where
    T: Transport,
    S: CheckpointStore,
    E: Extractor,
{
    /// Creates an orchestrator and loads (or resets) the checkpoint
    ///
    /// # Arguments
    ///
    /// * `target` - The search being crawled
    /// * `config` - Site profile
    /// * `settings` - Run parameters
    /// * `transport` - Authenticated transport
    /// * `store` - Checkpoint backend
    /// * `extractor` - Results page extractor
    /// * `shutdown` - Interrupt listener
    ///
    /// # Returns
    ///
    /// * `Ok(Orchestrator)` - Ready to run
    /// * `Err(HarvestError)` - The checkpoint could not be read or reset
    pub fn new(
        target: SearchTarget,
        config: &Config,
        settings: CrawlConfig,
        transport: T,
        mut store: S,
        extractor: E,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let headers = header_profile(&config.http)?;
        let exporter = JsonlExporter::new(&settings.output_dir, target.term());
        let artifacts = ArtifactWriter::new(&settings.output_dir, target.term());

        let checkpoint = if settings.reset {
            tracing::info!("Reset requested, discarding previous progress");
            let fresh = CrawlCheckpoint::new(target.term());
            store.commit(&fresh)?;
            exporter.write(fresh.items())?;
            fresh
        } else {
            match store.load(target.term())? {
                Some(checkpoint) => {
                    tracing::info!(
                        "Resuming from {}: {} pages, {} documents, last page {}",
                        store.location(target.term()),
                        checkpoint.pages_scraped().len(),
                        checkpoint.items().len(),
                        checkpoint.last_page()
                    );
                    checkpoint
                }
                None => {
                    tracing::info!("No previous progress for '{}'", target.term());
                    CrawlCheckpoint::new(target.term())
                }
            }
        };

        Ok(Self {
            classifier: Classifier::new(extractor, &config.policy),
            solver: ChallengeSolver::new(&config.site, &config.http, &config.policy),
            policy: config.policy.clone(),
            request_timeout: config.http.request_timeout(),
            recycle_between_pages: config.http.recycle_between_pages,
            target,
            settings,
            headers,
            transport,
            store,
            shutdown,
            artifacts,
            exporter,
            checkpoint,
            phase: CrawlPhase::Idle,
            page_limit: None,
            consecutive_empty: 0,
            pages_committed: 0,
            new_items: 0,
        })
    }

    pub fn checkpoint(&self) -> &CrawlCheckpoint {
        &self.checkpoint
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    /// First page this run will consider
    pub fn start_page(&self) -> u32 {
        self.settings
            .start_page
            .unwrap_or_else(|| self.checkpoint.resume_page())
    }

    /// Runs the page loop to a stop condition
    ///
    /// Transport and parsing failures end the run through a [`StopReason`];
    /// only a failed commit is returned as an error.
    pub async fn run(&mut self) -> Result<CrawlReport> {
        let start_page = self.start_page();
        self.page_limit = self
            .settings
            .max_pages
            .map(|max| start_page.saturating_add(max));

        tracing::info!(
            "Crawling '{}' from page {}{}",
            self.target.term(),
            start_page,
            self.settings
                .max_pages
                .map(|m| format!(" (at most {} pages)", m))
                .unwrap_or_default()
        );

        let mut page = start_page;
        let stop = loop {
            if self.limit_reached(page) {
                let limit = self.settings.max_pages.unwrap_or_default();
                tracing::info!("Reached the limit of {} pages for this run", limit);
                break StopReason::MaxPagesReached { limit };
            }

            if self.checkpoint.is_scraped(page) {
                tracing::debug!("Page {} already committed, skipping", page);
                page += 1;
                continue;
            }

            if self.shutdown.is_triggered() {
                break StopReason::Interrupted { page };
            }

            match self.crawl_page(page).await? {
                Step::Advance => page += 1,
                Step::Stop(reason) => break reason,
            }
        };

        self.set_phase(CrawlPhase::Stopped);

        Ok(CrawlReport {
            stop,
            pages_committed: self.pages_committed,
            new_items: self.new_items,
            total_items: self.checkpoint.items().len(),
            next_page: self.checkpoint.resume_page(),
        })
    }

    fn limit_reached(&self, page: u32) -> bool {
        self.page_limit.map(|limit| page >= limit).unwrap_or(false)
    }

    /// Fetches one page until it yields something other than a retryable outcome
    async fn crawl_page(&mut self, page: u32) -> Result<Step> {
        let url = self.target.page_url(page);
        let request = HttpRequest::get(&url, self.page_headers(page), self.request_timeout);
        let max_retries = self.settings.max_retries;

        tracing::info!("Fetching page {}: {}", page, url);

        for attempt in 1..=max_retries {
            self.set_phase(CrawlPhase::FetchingPage);
            let (outcome, body) = self.attempt(&request).await;
            tracing::debug!(
                "Page {} attempt {}/{}: {}",
                page,
                attempt,
                max_retries,
                outcome.label()
            );

            let stop = match outcome {
                PageOutcome::Success {
                    items,
                    has_next_page,
                } => {
                    return self
                        .handle_success(page, items, has_next_page, body.as_deref())
                        .await
                }
                PageOutcome::RateLimited => {
                    tracing::warn!(
                        "Page {} unavailable or rate limited (attempt {}/{})",
                        page,
                        attempt,
                        max_retries
                    );
                    if let Some(stop) = self.back_off(page, attempt).await {
                        return Ok(Step::Stop(stop));
                    }
                    continue;
                }
                PageOutcome::TimedOut { detail } => {
                    tracing::warn!(
                        "Page {} timed out (attempt {}/{}): {}",
                        page,
                        attempt,
                        max_retries,
                        detail
                    );
                    self.recycle_transport();
                    if let Some(stop) = self.back_off(page, attempt).await {
                        return Ok(Step::Stop(stop));
                    }
                    continue;
                }
                PageOutcome::Redirected { status, location } => {
                    tracing::error!(
                        "Redirect {} to {} on page {}: session cookies have expired",
                        status,
                        location,
                        page
                    );
                    StopReason::AuthExpired {
                        page,
                        status,
                        location,
                    }
                }
                PageOutcome::ChallengePresented { raw } | PageOutcome::ChallengeUnsolved { raw } => {
                    tracing::error!("Could not get past the challenge on page {}", page);
                    let artifact = self.artifacts.save(ArtifactKind::Blocked, page, &raw);
                    StopReason::ChallengeUnsolved { page, artifact }
                }
                PageOutcome::TooSmall { raw } => {
                    tracing::error!(
                        "Page {} returned {} bytes, likely blocked",
                        page,
                        raw.len()
                    );
                    let artifact = self.artifacts.save(ArtifactKind::Blocked, page, &raw);
                    StopReason::UndersizedResponse {
                        page,
                        bytes: raw.len(),
                        artifact,
                    }
                }
                PageOutcome::FatalError { detail } => {
                    tracing::error!("Page {} failed: {}", page, detail);
                    StopReason::Fatal { page, detail }
                }
            };

            return Ok(Step::Stop(stop));
        }

        tracing::error!("Giving up on page {} after {} attempts", page, max_retries);
        Ok(Step::Stop(StopReason::RetriesExhausted {
            page,
            attempts: max_retries,
        }))
    }

    /// One classified attempt, solving an interstitial if one appears
    ///
    /// Also returns the body the outcome was derived from.
    async fn attempt(&mut self, request: &HttpRequest) -> (PageOutcome, Option<String>) {
        let response = self.transport.send(request).await;
        if let Ok(r) = &response {
            log_response(r);
        }
        let body = response.as_ref().ok().map(|r| r.text().into_owned());

        let outcome = self.classifier.classify(&response, &request.url);
        let raw = match outcome {
            PageOutcome::ChallengePresented { raw } => raw,
            other => return (other, body),
        };

        tracing::info!("Interstitial challenge on {}, solving", request.url);
        match self
            .solver
            .try_solve(&mut self.transport, &raw, request)
            .await
        {
            SolveResult::Solved(replayed) => {
                log_response(&replayed);
                let body = Some(replayed.text().into_owned());
                let outcome = match self.classifier.classify(&Ok(replayed), &request.url) {
                    PageOutcome::ChallengePresented { raw } => PageOutcome::ChallengeUnsolved { raw },
                    other => other,
                };
                (outcome, body)
            }
            SolveResult::Unsolved { body, reason } => {
                tracing::warn!("Challenge not solved: {}", reason);
                (
                    PageOutcome::ChallengeUnsolved { raw: body.clone() },
                    Some(body),
                )
            }
        }
    }

    async fn handle_success(
        &mut self,
        page: u32,
        items: Vec<DocumentRecord>,
        has_next_page: bool,
        body: Option<&str>,
    ) -> Result<Step> {
        if items.is_empty() {
            self.consecutive_empty += 1;
            tracing::warn!(
                "No documents on page {} ({} empty in a row)",
                page,
                self.consecutive_empty
            );

            if let Some(body) = body {
                if body.len() > self.policy.empty_page_dump_threshold {
                    self.artifacts.save(ArtifactKind::EmptyPage, page, body);
                }
            }

            if self.consecutive_empty >= self.policy.max_consecutive_empty {
                tracing::info!(
                    "{} consecutive empty pages, assuming end of results",
                    self.consecutive_empty
                );
                return Ok(Step::Stop(StopReason::ConsecutiveEmptyPages {
                    page,
                    count: self.consecutive_empty,
                }));
            }

            return Ok(self.advance(page).await);
        }

        self.consecutive_empty = 0;
        let found = items.len();
        let added = self.checkpoint.record_page(page, &items);
        self.store.commit(&self.checkpoint)?;
        self.exporter.write(self.checkpoint.items())?;
        self.pages_committed += 1;
        self.new_items += added;

        tracing::info!(
            "Page {}: {} documents ({} new), {} total",
            page,
            found,
            added,
            self.checkpoint.items().len()
        );

        if !has_next_page {
            tracing::info!("No next page after page {}, end of results", page);
            return Ok(Step::Stop(StopReason::EndOfResults { page }));
        }

        Ok(self.advance(page).await)
    }

    /// Pauses before the next page; recycles the connection if configured
    async fn advance(&mut self, page: u32) -> Step {
        self.set_phase(CrawlPhase::Advancing);
        let next = page + 1;

        if self.limit_reached(next) {
            return Step::Advance;
        }

        if self.recycle_between_pages {
            self.recycle_transport();
        }

        tracing::info!("Waiting {}s before page {}", self.settings.delay.as_secs(), next);
        match self.shutdown.sleep(self.settings.delay).await {
            Ok(()) => Step::Advance,
            Err(_) => {
                tracing::warn!("Interrupted, stopping before page {}", next);
                Step::Stop(StopReason::Interrupted { page: next })
            }
        }
    }

    /// Waits before a retry; `Some` when the run should stop instead
    async fn back_off(&mut self, page: u32, attempt: u32) -> Option<StopReason> {
        if attempt >= self.settings.max_retries {
            return None;
        }

        self.set_phase(CrawlPhase::Retrying);
        tracing::info!(
            "Waiting {}s before retrying page {}",
            self.settings.unavailable_wait.as_secs(),
            page
        );
        match self.shutdown.sleep(self.settings.unavailable_wait).await {
            Ok(()) => None,
            Err(_) => Some(StopReason::Interrupted { page }),
        }
    }

    /// Swaps in a fresh transport carrying the current cookies
    fn recycle_transport(&mut self) {
        match self.transport.recycled() {
            Ok(fresh) => {
                tracing::debug!(
                    "Recycled connection ({} cookies carried over)",
                    fresh.cookies().len()
                );
                self.transport = fresh;
            }
            Err(e) => tracing::warn!("Keeping the current connection, recycle failed: {}", e),
        }
    }

    fn page_headers(&self, page: u32) -> HeaderMap {
        let mut headers = self.headers.clone();
        match HeaderValue::from_str(&self.target.referer(page)) {
            Ok(referer) => {
                headers.insert(REFERER, referer);
            }
            Err(e) => tracing::warn!("Sending page {} without referer: {}", page, e),
        }
        headers
    }

    fn set_phase(&mut self, phase: CrawlPhase) {
        if self.phase != phase {
            tracing::trace!("{:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }
}

fn log_response(response: &RawResponse) {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }

    let header = |name: reqwest::header::HeaderName| {
        response
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("N/A")
            .to_string()
    };
    tracing::debug!(
        "Response {} in {:?}: content-type={}, content-length={}, {} bytes",
        response.status,
        response.elapsed,
        header(CONTENT_TYPE),
        header(CONTENT_LENGTH),
        response.body.len()
    );
    let preview: String = response.text().chars().take(500).collect();
    tracing::debug!("Body preview: {}", preview);
}
