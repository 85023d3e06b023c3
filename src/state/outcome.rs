//! Page outcome definitions for driving retry and stop decisions
//!
//! Every fetch attempt is reduced to exactly one of these variants before the
//! orchestrator looks at it.
use crate::state::DocumentRecord;
use std::fmt;

/// Classified result of one page-fetch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    // ===== Success =====
    /// Real content; items come from the extractor
    Success {
        items: Vec<DocumentRecord>,
        has_next_page: bool,
    },

    // ===== Retryable =====
    /// HTTP 503 or an "unavailable" page
    RateLimited,

    /// The request did not finish within its timeout
    TimedOut { detail: String },

    // ===== Needs the challenge solver =====
    /// A small interstitial page carrying the verification marker
    ChallengePresented { raw: String },

    // ===== Terminal =====
    /// 3xx; the session cookies have expired
    Redirected { status: u16, location: String },

    /// The interstitial could not be solved
    ChallengeUnsolved { raw: String },

    /// Undersized body without a recognizable challenge
    TooSmall { raw: String },

    /// Any other transport or HTTP failure
    FatalError { detail: String },
}

impl PageOutcome {
    /// Rate limits and timeouts are retried on the same page
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::TimedOut { .. })
    }

    /// Outcomes that end the whole run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Redirected { .. }
                | Self::ChallengeUnsolved { .. }
                | Self::TooSmall { .. }
                | Self::FatalError { .. }
        )
    }

    /// A successful page the extractor found nothing on
    ///
    /// An empty extraction may mean the layout changed rather than that the
    /// results ran out, so its next-page signal is not trusted.
    pub fn is_empty_page(&self) -> bool {
        matches!(self, Self::Success { items, .. } if items.is_empty())
    }

    /// Body preserved for offline inspection, if any
    pub fn raw_body(&self) -> Option<&str> {
        match self {
            Self::ChallengePresented { raw }
            | Self::ChallengeUnsolved { raw }
            | Self::TooSmall { raw } => Some(raw),
            _ => None,
        }
    }

    /// Short stable label used in logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::RateLimited => "rate_limited",
            Self::TimedOut { .. } => "timed_out",
            Self::ChallengePresented { .. } => "challenge_presented",
            Self::Redirected { .. } => "redirected",
            Self::ChallengeUnsolved { .. } => "challenge_unsolved",
            Self::TooSmall { .. } => "too_small",
            Self::FatalError { .. } => "fatal_error",
        }
    }
}

impl fmt::Display for PageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success {
                items,
                has_next_page,
            } => write!(
                f,
                "success ({} items, next page: {})",
                items.len(),
                has_next_page
            ),
            Self::Redirected { status, location } => {
                write!(f, "redirected ({} -> {})", status, location)
            }
            Self::TimedOut { detail } | Self::FatalError { detail } => {
                write!(f, "{} ({})", self.label(), detail)
            }
            Self::ChallengePresented { raw }
            | Self::ChallengeUnsolved { raw }
            | Self::TooSmall { raw } => write!(f, "{} ({} bytes)", self.label(), raw.len()),
            Self::RateLimited => write!(f, "{}", self.label()),
        }
    }
}
