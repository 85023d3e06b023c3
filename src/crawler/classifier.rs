//! Response classification
//!
//! Reduces a fetch attempt to exactly one [`PageOutcome`]. The checks run in
//! a fixed order and the first match wins:
//!
//! 1. 3xx status: redirected (expired session)
//! 2. 503, or "unavailable" anywhere in the body: rate limited
//! 3. transport timeout, then any other transport failure
//! 4. any other non-2xx status: fatal
//! 5. undersized body with challenge markers: challenge presented
//! 6. undersized body: too small
//! 7. otherwise: success, with the extractor's items

use crate::config::PolicyConfig;
use crate::crawler::challenge::is_interstitial;
use crate::crawler::extractor::Extractor;
use crate::crawler::transport::{RawResponse, TransportError};
use crate::state::PageOutcome;

/// Stateless classifier over a pluggable extractor
pub struct Classifier<E> {
    extractor: E,
    content_threshold: usize,
}

impl<E: Extractor> Classifier<E> {
    pub fn new(extractor: E, policy: &PolicyConfig) -> Self {
        Self {
            extractor,
            content_threshold: policy.content_threshold,
        }
    }

    pub fn content_threshold(&self) -> usize {
        self.content_threshold
    }

    /// Classifies one attempt at `page_url`
    pub fn classify(
        &self,
        attempt: &Result<RawResponse, TransportError>,
        page_url: &str,
    ) -> PageOutcome {
        let response = match attempt {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return PageOutcome::TimedOut {
                    detail: e.to_string(),
                }
            }
            Err(e) => {
                return PageOutcome::FatalError {
                    detail: e.to_string(),
                }
            }
        };

        if response.is_redirect() {
            return PageOutcome::Redirected {
                status: response.status,
                location: response.location().unwrap_or("N/A").to_string(),
            };
        }

        let text = response.text();
        if response.status == 503 || text.to_lowercase().contains("unavailable") {
            return PageOutcome::RateLimited;
        }

        if !response.is_success() {
            return PageOutcome::FatalError {
                detail: format!("HTTP {} from {}", response.status, page_url),
            };
        }

        if response.body.len() < self.content_threshold {
            let raw = text.into_owned();
            return if is_interstitial(&raw) {
                PageOutcome::ChallengePresented { raw }
            } else {
                PageOutcome::TooSmall { raw }
            };
        }

        let extraction = self.extractor.extract(&text, page_url);
        PageOutcome::Success {
            items: extraction.items,
            has_next_page: extraction.has_next_page,
        }
    }
}
