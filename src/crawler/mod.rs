//! Crawler module for paging through a protected search endpoint
//!
//! This module contains the core crawling logic, including:
//! - HTTP transport with an owned cookie jar
//! - Response classification into page outcomes
//! - Interstitial challenge solving
//! - Results page extraction
//! - Pacing, interruption and the page loop itself

mod challenge;
mod classifier;
mod extractor;
mod orchestrator;
mod pacing;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use challenge::{is_interstitial, ChallengeSolver, Interstitial, SolveResult, FIXED_OFFSET};
pub use classifier::Classifier;
pub use extractor::{Extraction, Extractor, ResultsPageExtractor};
pub use orchestrator::{CrawlPhase, CrawlReport, Orchestrator, StopReason};
pub use pacing::{shutdown_channel, Interrupted, Shutdown, ShutdownTrigger};
pub use transport::{
    header_profile, CookieJar, HttpRequest, HttpTransport, RawResponse, Transport, TransportError,
};

use crate::config::{Config, CrawlConfig};
use crate::credentials::CredentialSource;
use crate::storage::{open_store, CheckpointStore};
use crate::url::SearchTarget;
use crate::Result;

/// Orchestrator wired to the live site
pub type LiveOrchestrator = Orchestrator<HttpTransport, Box<dyn CheckpointStore>, ResultsPageExtractor>;

/// Prepares a crawl without touching the network
///
/// Loads cookies, opens the checkpoint backend and reads (or resets) the
/// checkpoint. Every failure here happens before the first request.
///
/// # Arguments
///
/// * `term` - The search phrase
/// * `config` - Site profile
/// * `settings` - Run parameters
/// * `credentials` - Cookie source
/// * `shutdown` - Interrupt listener
///
/// # Returns
///
/// * `Ok(LiveOrchestrator)` - Ready to run
/// * `Err(HarvestError)` - Missing cookies, bad term, or unreadable checkpoint
pub fn prepare_crawl(
    term: &str,
    config: &Config,
    settings: CrawlConfig,
    credentials: &dyn CredentialSource,
    shutdown: Shutdown,
) -> Result<LiveOrchestrator> {
    let target = SearchTarget::new(term, &config.site)?;
    let cookies = credentials.load_cookies()?;
    tracing::info!("Loaded {} session cookies", cookies.len());

    let jar = CookieJar::with_cookies(&config.site.base_url, &cookies)?;
    let transport = HttpTransport::new(&config.http, jar)?;
    let store = open_store(config, &settings)?;
    tracing::debug!("Checkpoint at {}", store.location(target.term()));

    Orchestrator::new(
        target,
        config,
        settings,
        transport,
        store,
        ResultsPageExtractor::new(&config.site),
        shutdown,
    )
}

/// Runs a complete crawl for one search term
///
/// # Returns
///
/// * `Ok(CrawlReport)` - The run ended; see `stop` for why
/// * `Err(HarvestError)` - Startup failed or a commit could not be written
pub async fn crawl(
    term: &str,
    config: &Config,
    settings: CrawlConfig,
    credentials: &dyn CredentialSource,
    shutdown: Shutdown,
) -> Result<CrawlReport> {
    prepare_crawl(term, config, settings, credentials, shutdown)?
        .run()
        .await
}
