//! Durable crawl progress for one search term
//!
//! A checkpoint only ever grows: pages are added to the scraped set, items
//! are appended in discovery order and `last_page` never decreases.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// A discovered document
///
/// Two records describe the same document when their URLs match; titles
/// are informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub url: String,
    #[serde(default)]
    pub title: String,
}

impl DocumentRecord {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }
}

/// The crawl's durable state
#[derive(Debug, Clone)]
pub struct CrawlCheckpoint {
    search_term: String,
    last_page: i64,
    pages_scraped: BTreeSet<u32>,
    items: Vec<DocumentRecord>,
    seen_urls: HashSet<String>,
    last_updated: DateTime<Utc>,
}

impl CrawlCheckpoint {
    /// An empty checkpoint: no pages, `last_page` of -1
    pub fn new(search_term: impl Into<String>) -> Self {
        Self {
            search_term: search_term.into(),
            last_page: -1,
            pages_scraped: BTreeSet::new(),
            items: Vec::new(),
            seen_urls: HashSet::new(),
            last_updated: Utc::now(),
        }
    }

    /// Rebuilds a checkpoint from persisted parts
    ///
    /// Duplicate URLs keep their first occurrence, and `last_page` is raised
    /// to the highest scraped page if the stored value lags behind it.
    pub fn from_parts(
        search_term: impl Into<String>,
        last_page: i64,
        pages_scraped: impl IntoIterator<Item = u32>,
        items: impl IntoIterator<Item = DocumentRecord>,
        last_updated: DateTime<Utc>,
    ) -> Self {
        let mut checkpoint = Self::new(search_term);
        checkpoint.pages_scraped = pages_scraped.into_iter().collect();
        let highest = checkpoint
            .pages_scraped
            .iter()
            .next_back()
            .map(|&p| i64::from(p))
            .unwrap_or(-1);
        let max_page = i64::from(u32::MAX) - 1;
        if last_page > max_page {
            tracing::warn!(
                "Stored last page {} for '{}' is out of range, clamping to {}",
                last_page,
                checkpoint.search_term,
                max_page
            );
        }
        checkpoint.last_page = last_page.min(max_page).max(highest).max(-1);
        checkpoint.merge_items(items);
        checkpoint.last_updated = last_updated;
        checkpoint
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    /// Highest page number committed, -1 when none
    pub fn last_page(&self) -> i64 {
        self.last_page
    }

    pub fn pages_scraped(&self) -> &BTreeSet<u32> {
        &self.pages_scraped
    }

    /// Items in discovery order
    pub fn items(&self) -> &[DocumentRecord] {
        &self.items
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn is_scraped(&self, page: u32) -> bool {
        self.pages_scraped.contains(&page)
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.seen_urls.contains(url)
    }

    /// The page a resumed crawl starts at
    pub fn resume_page(&self) -> u32 {
        u32::try_from((self.last_page + 1).max(0)).unwrap_or(u32::MAX)
    }

    /// Records one successfully classified page
    ///
    /// Appends the items not already present, marks the page scraped and
    /// stamps the update time. Returns how many items were new.
    pub fn record_page(&mut self, page: u32, items: &[DocumentRecord]) -> usize {
        let added = self.merge_items(items.iter().cloned());
        self.pages_scraped.insert(page);
        self.last_page = self.last_page.max(i64::from(page));
        self.last_updated = Utc::now();
        added
    }

    fn merge_items(&mut self, items: impl IntoIterator<Item = DocumentRecord>) -> usize {
        let mut added = 0;
        for item in items {
            if self.seen_urls.insert(item.url.clone()) {
                self.items.push(item);
                added += 1;
            }
        }
        added
    }
}
