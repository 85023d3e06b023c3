//! Interstitial challenge solver
//!
//! The protected site sometimes answers with a small verification page
//! instead of results. That page embeds a numeric seed and a token; posting
//! the token together with `seed + FIXED_OFFSET` to the verify endpoint
//! makes the next request for the original URL return real content.

use crate::config::{HttpConfig, PolicyConfig, SiteConfig};
use crate::crawler::transport::{HttpRequest, RawResponse, Transport};
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use std::sync::OnceLock;
use std::time::Duration;

/// Constant added to the page's seed to produce the proof value
pub const FIXED_OFFSET: u64 = 902_645_594;

static SEED_PATTERN: OnceLock<Regex> = OnceLock::new();
static TOKEN_PATTERN: OnceLock<Regex> = OnceLock::new();

fn seed_pattern() -> &'static Regex {
    SEED_PATTERN.get_or_init(|| Regex::new(r"var\s+i\s*=\s*(\d+)\s*;").expect("valid seed regex"))
}

fn token_pattern() -> &'static Regex {
    TOKEN_PATTERN
        .get_or_init(|| Regex::new(r#""bm-verify"\s*:\s*"([^"]+)""#).expect("valid token regex"))
}

/// True when a body carries both verification markers
pub fn is_interstitial(body: &str) -> bool {
    body.contains("_sec/verify") && body.contains("bm-verify")
}

/// Parameters embedded in an interstitial page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interstitial {
    pub token: String,
    pub seed: u64,
}

impl Interstitial {
    /// Extracts the seed and token, or `None` if either is missing
    pub fn parse(body: &str) -> Option<Self> {
        let seed = seed_pattern()
            .captures(body)?
            .get(1)?
            .as_str()
            .parse::<u64>()
            .ok()?;
        let token = token_pattern().captures(body)?.get(1)?.as_str().to_string();
        Some(Self { token, seed })
    }

    pub fn proof(&self) -> Option<u64> {
        self.seed.checked_add(FIXED_OFFSET)
    }

    /// JSON body for the verify endpoint
    pub fn payload(&self) -> Option<serde_json::Value> {
        let proof = self.proof()?;
        Some(serde_json::json!({
            "bm-verify": self.token,
            "pow": proof,
        }))
    }
}

/// Result of one solve attempt
#[derive(Debug)]
pub enum SolveResult {
    /// The replayed GET returned a full-size body
    Solved(RawResponse),

    /// The challenge is still in the way; `body` is the original challenge page
    Unsolved { body: String, reason: String },
}

/// Answers interstitial challenges through the caller's transport
///
/// The verify POST and the replay GET go through the same transport so that
/// any cookies the verify endpoint sets are carried into the replay.
pub struct ChallengeSolver {
    verify_url: String,
    content_threshold: usize,
    timeout: Duration,
}

impl ChallengeSolver {
    pub fn new(site: &SiteConfig, http: &HttpConfig, policy: &PolicyConfig) -> Self {
        Self {
            verify_url: format!("{}{}", site.base_url, site.verify_path),
            content_threshold: policy.content_threshold,
            timeout: http.challenge_timeout(),
        }
    }

    pub fn verify_url(&self) -> &str {
        &self.verify_url
    }

    /// Attempts to clear the challenge and replay the original request
    ///
    /// # Arguments
    ///
    /// * `transport` - Transport whose cookie jar receives the clearance
    /// * `challenge_body` - The interstitial page
    /// * `original` - The GET that produced the interstitial
    ///
    /// # Returns
    ///
    /// * `Solved` - The replay produced a body at or above the content threshold
    /// * `Unsolved` - Parameters missing, verify failed, or the replay was still small
    pub async fn try_solve<T: Transport>(
        &self,
        transport: &mut T,
        challenge_body: &str,
        original: &HttpRequest,
    ) -> SolveResult {
        let unsolved = |reason: String| SolveResult::Unsolved {
            body: challenge_body.to_string(),
            reason,
        };

        let Some(challenge) = Interstitial::parse(challenge_body) else {
            return unsolved("challenge parameters not found in page".to_string());
        };
        let Some(payload) = challenge.payload() else {
            return unsolved(format!("seed {} out of range", challenge.seed));
        };

        tracing::debug!(
            "Challenge seed={}, posting proof to {}",
            challenge.seed,
            self.verify_url
        );

        let mut headers: HeaderMap = original.headers.clone();
        match HeaderValue::from_str(&original.url) {
            Ok(referer) => {
                headers.insert(REFERER, referer);
            }
            Err(_) => return unsolved(format!("unusable referer {}", original.url)),
        }

        let verify = HttpRequest::post_json(&self.verify_url, headers, &payload, self.timeout);
        match transport.send(&verify).await {
            Ok(response) => {
                tracing::debug!("Verify endpoint answered {}", response.status);
            }
            Err(e) => return unsolved(format!("verify request failed: {}", e)),
        }

        let replay = match transport.send(original).await {
            Ok(response) => response,
            Err(e) => return unsolved(format!("replay request failed: {}", e)),
        };

        if replay.body.len() >= self.content_threshold {
            tracing::info!("Challenge solved ({} bytes)", replay.body.len());
            SolveResult::Solved(replay)
        } else {
            unsolved(format!(
                "replay still undersized ({} bytes, status {})",
                replay.body.len(),
                replay.status
            ))
        }
    }
}
