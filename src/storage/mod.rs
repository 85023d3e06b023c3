//! Storage module for persisting crawl checkpoints
//!
//! This module handles durable crawl progress, including:
//! - The JSON progress file (default) and its legacy read-only predecessor
//! - An SQLite backend holding the same checkpoint in tables
//! - Atomic file replacement shared by every writer in the crate

mod json;
mod schema;
mod sqlite;
mod traits;

pub use json::JsonCheckpointStore;
pub use sqlite::SqliteCheckpointStore;
pub use traits::{CheckpointStore, StorageError, StorageResult};

use crate::config::{Config, CrawlConfig, StorageBackend};
use crate::state::CrawlCheckpoint;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Opens the checkpoint backend selected by the profile
///
/// # Arguments
///
/// * `config` - The site profile (backend selection)
/// * `crawl` - Run parameters (output directory)
///
/// # Returns
///
/// * `Ok(Box<dyn CheckpointStore>)` - Ready-to-use backend
/// * `Err(StorageError)` - The backend could not be opened
pub fn open_store(config: &Config, crawl: &CrawlConfig) -> StorageResult<Box<dyn CheckpointStore>> {
    match config.storage.backend {
        StorageBackend::Json => Ok(Box::new(JsonCheckpointStore::new(&crawl.output_dir))),
        StorageBackend::Sqlite => Ok(Box::new(SqliteCheckpointStore::new(&sqlite_path(
            config, crawl,
        ))?)),
    }
}

/// Opens the selected backend for inspection only
///
/// Loading through the returned store creates, renames and rewrites nothing.
pub fn open_store_read_only(
    config: &Config,
    crawl: &CrawlConfig,
) -> StorageResult<Box<dyn CheckpointStore>> {
    match config.storage.backend {
        StorageBackend::Json => Ok(Box::new(JsonCheckpointStore::read_only(&crawl.output_dir))),
        StorageBackend::Sqlite => Ok(Box::new(SqliteCheckpointStore::open_read_only(
            &sqlite_path(config, crawl),
        )?)),
    }
}

fn sqlite_path(config: &Config, crawl: &CrawlConfig) -> PathBuf {
    config
        .storage
        .sqlite_path
        .clone()
        .unwrap_or_else(|| crawl.output_dir.join("checkpoints.db"))
}

impl<S: CheckpointStore + ?Sized> CheckpointStore for Box<S> {
    fn load(&self, search_term: &str) -> StorageResult<Option<CrawlCheckpoint>> {
        (**self).load(search_term)
    }

    fn commit(&mut self, checkpoint: &CrawlCheckpoint) -> StorageResult<()> {
        (**self).commit(checkpoint)
    }

    fn location(&self, search_term: &str) -> String {
        (**self).location(search_term)
    }
}

/// Write bytes atomically (write to a sibling temp file, sync, then rename)
///
/// A crash at any point leaves either the old file or the new one in place.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");

    let mut file = std::fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&tmp, path)
}
