//! Storage traits and error types
//!
//! This module defines the trait interface for checkpoint backends and
//! associated error types.

use crate::state::CrawlCheckpoint;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StorageError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for checkpoint backends
///
/// One checkpoint exists per search term, and the term is the storage key.
/// Backends assume a single writer: two processes committing the same key
/// race, and the last commit wins.
pub trait CheckpointStore {
    /// Loads the checkpoint for `search_term`
    ///
    /// A missing or corrupt record is reported as `Ok(None)` after logging a
    /// warning; only failures to reach the backend at all are errors.
    fn load(&self, search_term: &str) -> StorageResult<Option<CrawlCheckpoint>>;

    /// Atomically replaces the persisted checkpoint
    ///
    /// Either the previous record or the new one survives a crash, never a
    /// mix of both.
    fn commit(&mut self, checkpoint: &CrawlCheckpoint) -> StorageResult<()>;

    /// Human-readable location of the record for `search_term`
    fn location(&self, search_term: &str) -> String;
}
