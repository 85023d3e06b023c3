//! Diagnostic page dumps
//!
//! Bodies the crawl could not use are written next to the checkpoint so the
//! operator can see what the server actually sent. Failing to write a dump
//! is logged and otherwise ignored.

use crate::url::output_stem;
use std::path::{Path, PathBuf};

/// Why a body is being kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Undersized or unsolved-challenge body that stopped the run
    Blocked,

    /// Large page on which the extractor found nothing
    EmptyPage,
}

impl ArtifactKind {
    fn prefix(self) -> &'static str {
        match self {
            Self::Blocked => "debug_page",
            Self::EmptyPage => "debug_empty_page",
        }
    }
}

pub struct ArtifactWriter {
    dir: PathBuf,
    stem: String,
}

impl ArtifactWriter {
    pub fn new(output_dir: &Path, search_term: &str) -> Self {
        Self {
            dir: output_dir.to_path_buf(),
            stem: output_stem(search_term),
        }
    }

    pub fn path_for(&self, kind: ArtifactKind, page: u32) -> PathBuf {
        self.dir
            .join(format!("{}_{}_{}.html", kind.prefix(), page, self.stem))
    }

    /// Writes `body`; returns the path on success
    pub fn save(&self, kind: ArtifactKind, page: u32, body: &str) -> Option<PathBuf> {
        let path = self.path_for(kind, page);
        let result = std::fs::create_dir_all(&self.dir).and_then(|_| std::fs::write(&path, body));
        match result {
            Ok(()) => {
                tracing::info!("Saved page body to {} for inspection", path.display());
                Some(path)
            }
            Err(e) => {
                tracing::warn!("Could not save {}: {}", path.display(), e);
                None
            }
        }
    }
}
