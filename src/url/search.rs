use crate::config::SiteConfig;
use crate::{UrlError, UrlResult};
use url::form_urlencoded;

/// File-name stem for a search phrase: upper-cased, spaces as `_`
pub fn output_stem(term: &str) -> String {
    term.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase()
}

/// A search phrase bound to the site it is run against
///
/// The phrase is the crawl's identity: it keys the checkpoint and names every
/// artifact written for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTarget {
    term: String,
    base_url: String,
    search_path: String,
    landing_path: String,
}

impl SearchTarget {
    /// Binds a search phrase to a site
    ///
    /// Whitespace runs inside the phrase collapse to a single space, so
    /// `["cold", "war"]` joined by the CLI and `"cold  war"` name the same
    /// crawl.
    ///
    /// # Examples
    ///
    /// ```
    /// use readingroom_harvest::config::SiteConfig;
    /// use readingroom_harvest::url::SearchTarget;
    ///
    /// let target = SearchTarget::new("remote viewing", &SiteConfig::default()).unwrap();
    /// assert_eq!(
    ///     target.page_url(2),
    ///     "https://www.cia.gov/readingroom/search/site/REMOTE+VIEWING?page=2"
    /// );
    /// assert_eq!(target.output_stem(), "REMOTE_VIEWING");
    /// ```
    pub fn new(term: &str, site: &SiteConfig) -> UrlResult<Self> {
        let term = term.split_whitespace().collect::<Vec<_>>().join(" ");
        if term.is_empty() {
            return Err(UrlError::EmptySearchTerm);
        }

        Ok(Self {
            term,
            base_url: site.base_url.clone(),
            search_path: site.search_path.clone(),
            landing_path: site.landing_path.clone(),
        })
    }

    /// The normalized search phrase
    pub fn term(&self) -> &str {
        &self.term
    }

    /// File-name stem for this crawl's artifacts
    pub fn output_stem(&self) -> String {
        output_stem(&self.term)
    }

    /// URL of a results page; page 0 carries no page parameter
    pub fn page_url(&self, page: u32) -> String {
        self.search_url(&self.term.to_uppercase(), page)
    }

    /// Referer a browser would send when arriving at `page`
    ///
    /// The site links between results pages with the lower-cased phrase, so
    /// the referer for page N is the lower-cased URL of page N-1.
    pub fn referer(&self, page: u32) -> String {
        match page {
            0 => self.landing_url(),
            n => self.search_url(&self.term.to_lowercase(), n - 1),
        }
    }

    /// The reading room landing page
    pub fn landing_url(&self) -> String {
        format!("{}{}", self.base_url, self.landing_path)
    }

    fn search_url(&self, term: &str, page: u32) -> String {
        let encoded: String = form_urlencoded::byte_serialize(term.as_bytes()).collect();
        let base = format!("{}{}{}", self.base_url, self.search_path, encoded);
        if page > 0 {
            format!("{}?page={}", base, page)
        } else {
            base
        }
    }
}
