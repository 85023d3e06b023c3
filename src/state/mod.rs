//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlCheckpoint`: durable progress of one search term (pages, items)
//! - `DocumentRecord`: a discovered document, deduplicated by URL
//! - `PageOutcome`: the classified result of one page-fetch attempt

mod checkpoint;
mod outcome;

// Re-export main types
pub use checkpoint::{CrawlCheckpoint, DocumentRecord};
pub use outcome::PageOutcome;
