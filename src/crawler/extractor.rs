//! Results page extraction
//!
//! Pulls document links and the next-page signal out of a search results
//! page. Markup that does not match yields an empty extraction rather than an
//! error; the orchestrator treats an empty page as inconclusive.

use crate::config::SiteConfig;
use crate::state::DocumentRecord;
use crate::url::resolve_link;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Items and pagination signal from one results page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub items: Vec<DocumentRecord>,
    pub has_next_page: bool,
}

/// Turns a results page body into an [`Extraction`]
pub trait Extractor: Send + Sync {
    fn extract(&self, body: &str, page_url: &str) -> Extraction;
}

/// Extractor for the reading room's search result markup
///
/// * results: `ol.search-results > li`, link in `h3.title a[href]`
/// * next page: `ul.pager li.pager-next`
#[derive(Debug, Clone)]
pub struct ResultsPageExtractor {
    document_marker: String,
}

impl ResultsPageExtractor {
    pub fn new(site: &SiteConfig) -> Self {
        Self {
            document_marker: site.document_marker.clone(),
        }
    }
}

impl Extractor for ResultsPageExtractor {
    fn extract(&self, body: &str, page_url: &str) -> Extraction {
        let document = Html::parse_document(body);
        let base = match Url::parse(page_url) {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!("Cannot resolve links against {}: {}", page_url, e);
                return Extraction::default();
            }
        };

        let mut items = Vec::new();
        if let (Ok(entry_selector), Ok(link_selector)) = (
            Selector::parse("ol.search-results > li"),
            Selector::parse("h3.title a[href]"),
        ) {
            for entry in document.select(&entry_selector) {
                let Some(link) = entry.select(&link_selector).next() else {
                    continue;
                };
                let Some(href) = link.value().attr("href") else {
                    continue;
                };
                if !href.contains(&self.document_marker) {
                    continue;
                }
                if let Some(url) = resolve_link(href, &base) {
                    items.push(DocumentRecord::new(url, element_text(&link)));
                }
            }
        }

        let has_next_page = Selector::parse("ul.pager li.pager-next")
            .map(|sel| document.select(&sel).next().is_some())
            .unwrap_or(false);

        Extraction {
            items,
            has_next_page,
        }
    }
}

/// Element text with whitespace collapsed
fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
