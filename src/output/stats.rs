//! Statistics for a stored checkpoint
//!
//! This module summarizes crawl progress for the `status` command.

use crate::state::CrawlCheckpoint;
use chrono::{DateTime, Utc};

/// Checkpoint statistics summary
#[derive(Debug, Clone)]
pub struct CheckpointStatistics {
    /// The search term the checkpoint belongs to
    pub search_term: String,

    /// Number of committed pages
    pub pages_committed: usize,

    /// Highest committed page, if any
    pub last_page: Option<u32>,

    /// Page the next run starts from
    pub resume_page: u32,

    /// Distinct document URLs discovered
    pub total_items: usize,

    /// Pages below the highest committed one that were never committed
    pub gaps: Vec<u32>,

    /// Time of the last commit
    pub last_updated: DateTime<Utc>,
}

/// Computes statistics from a checkpoint
pub fn checkpoint_statistics(checkpoint: &CrawlCheckpoint) -> CheckpointStatistics {
    let pages = checkpoint.pages_scraped();
    let last_page = u32::try_from(checkpoint.last_page()).ok();

    let gaps = match last_page {
        Some(last) => (0..last).filter(|p| !pages.contains(p)).collect(),
        None => Vec::new(),
    };

    CheckpointStatistics {
        search_term: checkpoint.search_term().to_string(),
        pages_committed: pages.len(),
        last_page,
        resume_page: checkpoint.resume_page(),
        total_items: checkpoint.items().len(),
        gaps,
        last_updated: checkpoint.last_updated(),
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
/// * `location` - Where the checkpoint lives
pub fn print_statistics(stats: &CheckpointStatistics, location: &str) {
    println!("=== Crawl Progress: {} ===\n", stats.search_term);

    println!("Checkpoint: {}", location);
    println!("  Last updated: {}", stats.last_updated.to_rfc3339());
    println!("  Pages committed: {}", stats.pages_committed);
    match stats.last_page {
        Some(page) => println!("  Last page: {}", page),
        None => println!("  Last page: none"),
    }
    println!("  Next run starts at page: {}", stats.resume_page);
    println!("  Documents discovered: {}", stats.total_items);

    if stats.pages_committed > 0 {
        println!(
            "  Average documents per page: {:.1}",
            stats.total_items as f64 / stats.pages_committed as f64
        );
    }

    if !stats.gaps.is_empty() {
        println!();
        println!("Skipped pages ({}):", stats.gaps.len());
        for page in stats.gaps.iter().take(20) {
            println!("  - {}", page);
        }
        if stats.gaps.len() > 20 {
            println!("  ... and {} more", stats.gaps.len() - 20);
        }
    }
}
