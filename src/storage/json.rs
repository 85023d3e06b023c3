//! JSON file checkpoint backend
//!
//! ## File Layout
//!
//! ```text
//! {root}/
//! ├── {STEM}.progress.json   # Current checkpoint (written by every commit)
//! ├── {STEM}.json            # Legacy per-page output (read-only migration)
//! └── {STEM}.progress.json.corrupt  # Unparseable checkpoint moved aside
//! ```

use crate::state::{CrawlCheckpoint, DocumentRecord};
use crate::storage::traits::{CheckpointStore, StorageError, StorageResult};
use crate::storage::write_atomic;
use crate::url::output_stem;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// On-disk shape of the progress file
#[derive(Debug, Serialize, Deserialize)]
struct ProgressFile {
    #[serde(default)]
    search_term: String,
    #[serde(default)]
    last_page: Option<i64>,
    #[serde(default)]
    pages_scraped: Vec<u32>,
    #[serde(default)]
    all_urls: Vec<DocumentRecord>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    last_updated: Option<DateTime<Utc>>,
}

/// Older output shape that nested items under per-page records
#[derive(Debug, Deserialize)]
struct LegacyOutput {
    #[serde(default)]
    progress: LegacyProgress,
    #[serde(default)]
    pages: Vec<LegacyPage>,
    #[serde(default)]
    all_urls: Vec<DocumentRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct LegacyProgress {
    #[serde(default)]
    last_page: Option<i64>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct LegacyPage {
    #[serde(default)]
    page_number: Option<u32>,
    #[serde(default)]
    urls: Vec<DocumentRecord>,
}

/// Accepts RFC 3339 as well as naive ISO-8601 timestamps (read as UTC)
///
/// An unreadable timestamp is dropped rather than failing the whole file.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| parse_timestamp(&s)))
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// JSON file checkpoint backend
#[derive(Debug, Clone)]
pub struct JsonCheckpointStore {
    root_dir: PathBuf,
    set_aside_corrupt: bool,
}

impl JsonCheckpointStore {
    /// Create a store rooted at the given directory
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            set_aside_corrupt: true,
        }
    }

    /// A store whose `load` never touches the directory
    ///
    /// A corrupt progress file is reported as absent but left in place.
    pub fn read_only(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            set_aside_corrupt: false,
        }
    }

    /// Path of the progress file for a search term
    pub fn progress_path(&self, search_term: &str) -> PathBuf {
        self.root_dir
            .join(format!("{}.progress.json", output_stem(search_term)))
    }

    /// Path of the legacy output file for a search term
    pub fn legacy_path(&self, search_term: &str) -> PathBuf {
        self.root_dir.join(format!("{}.json", output_stem(search_term)))
    }

    /// Reads a file, mapping "not found" to None
    fn read_optional(path: &Path) -> StorageResult<Option<Vec<u8>>> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    fn load_progress(&self, search_term: &str) -> StorageResult<Option<CrawlCheckpoint>> {
        let path = self.progress_path(search_term);
        let Some(bytes) = Self::read_optional(&path)? else {
            return Ok(None);
        };

        match serde_json::from_slice::<ProgressFile>(&bytes) {
            Ok(file) => {
                if !file.search_term.is_empty() && file.search_term != search_term {
                    tracing::debug!(
                        "Progress file {} was written for '{}', loading it for '{}'",
                        path.display(),
                        file.search_term,
                        search_term
                    );
                }
                let checkpoint = CrawlCheckpoint::from_parts(
                    search_term,
                    file.last_page.unwrap_or(-1),
                    file.pages_scraped,
                    file.all_urls,
                    file.last_updated.unwrap_or_else(Utc::now),
                );
                tracing::info!(
                    "Found progress file {}: {} pages, {} URLs, last page {}",
                    path.display(),
                    checkpoint.pages_scraped().len(),
                    checkpoint.items().len(),
                    checkpoint.last_page()
                );
                Ok(Some(checkpoint))
            }
            Err(e) => {
                tracing::warn!(
                    "Ignoring unreadable progress file {}: {}",
                    path.display(),
                    e
                );
                if self.set_aside_corrupt {
                    self.set_aside(&path);
                }
                Ok(None)
            }
        }
    }

    fn load_legacy(&self, search_term: &str) -> StorageResult<Option<CrawlCheckpoint>> {
        let path = self.legacy_path(search_term);
        let Some(bytes) = Self::read_optional(&path)? else {
            return Ok(None);
        };

        let legacy = match serde_json::from_slice::<LegacyOutput>(&bytes) {
            Ok(legacy) => legacy,
            Err(e) => {
                tracing::warn!("Ignoring unreadable legacy file {}: {}", path.display(), e);
                return Ok(None);
            }
        };

        let pages_scraped: Vec<u32> = legacy.pages.iter().filter_map(|p| p.page_number).collect();
        let items = legacy
            .all_urls
            .into_iter()
            .chain(legacy.pages.into_iter().flat_map(|p| p.urls));

        let checkpoint = CrawlCheckpoint::from_parts(
            search_term,
            legacy.progress.last_page.unwrap_or(-1),
            pages_scraped,
            items,
            legacy.progress.last_updated.unwrap_or_else(Utc::now),
        );
        tracing::info!(
            "Migrated legacy output {}: {} pages, {} URLs",
            path.display(),
            checkpoint.pages_scraped().len(),
            checkpoint.items().len()
        );
        Ok(Some(checkpoint))
    }

    /// Moves a corrupt progress file out of the way of the next commit
    fn set_aside(&self, path: &Path) {
        let mut aside = path.as_os_str().to_owned();
        aside.push(".corrupt");
        match std::fs::rename(path, &aside) {
            Ok(()) => tracing::warn!("Moved corrupt checkpoint to {}", Path::new(&aside).display()),
            Err(e) => tracing::warn!("Could not move corrupt checkpoint aside: {}", e),
        }
    }
}

impl CheckpointStore for JsonCheckpointStore {
    fn load(&self, search_term: &str) -> StorageResult<Option<CrawlCheckpoint>> {
        if let Some(checkpoint) = self.load_progress(search_term)? {
            return Ok(Some(checkpoint));
        }
        self.load_legacy(search_term)
    }

    fn commit(&mut self, checkpoint: &CrawlCheckpoint) -> StorageResult<()> {
        let file = ProgressFile {
            search_term: checkpoint.search_term().to_string(),
            last_page: Some(checkpoint.last_page()),
            pages_scraped: checkpoint.pages_scraped().iter().copied().collect(),
            all_urls: checkpoint.items().to_vec(),
            last_updated: Some(checkpoint.last_updated()),
        };
        let bytes = serde_json::to_vec_pretty(&file)?;

        let path = self.progress_path(checkpoint.search_term());
        write_atomic(&path, &bytes).map_err(|e| StorageError::io(&path, e))
    }

    fn location(&self, search_term: &str) -> String {
        self.progress_path(search_term).display().to_string()
    }
}
