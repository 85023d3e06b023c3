//! SQLite checkpoint backend
//!
//! Each commit rewrites one search term's rows inside a single transaction,
//! which gives the same all-or-nothing guarantee as the JSON backend's
//! write-then-rename.

use crate::state::{CrawlCheckpoint, DocumentRecord};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{CheckpointStore, StorageResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};

/// SQLite checkpoint backend
pub struct SqliteCheckpointStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteCheckpointStore {
    /// Opens (or creates) the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| crate::storage::StorageError::io(parent, e))?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA foreign_keys = ON;
        ",
        )?;
        initialize_schema(&conn)?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Opens an existing database without write access
    ///
    /// A missing file is not created; the store then reports every term as
    /// absent.
    pub fn open_read_only(path: &Path) -> StorageResult<Self> {
        let conn = if path.exists() {
            Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        } else {
            tracing::debug!("No checkpoint database at {}", path.display());
            let conn = Connection::open_in_memory()?;
            initialize_schema(&conn)?;
            conn
        };

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn load(&self, search_term: &str) -> StorageResult<Option<CrawlCheckpoint>> {
        let row: Option<(i64, String)> = self
            .conn
            .query_row(
                "SELECT last_page, last_updated FROM checkpoints WHERE search_term = ?1",
                params![search_term],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((last_page, last_updated)) = row else {
            return Ok(None);
        };

        let last_updated = DateTime::parse_from_rfc3339(&last_updated)
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(|e| {
                tracing::warn!("Unreadable last_updated for '{}': {}", search_term, e);
                Utc::now()
            });

        let mut stmt = self
            .conn
            .prepare("SELECT page FROM scraped_pages WHERE search_term = ?1 ORDER BY page")?;
        let pages = stmt
            .query_map(params![search_term], |row| row.get::<_, u32>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT url, title FROM items WHERE search_term = ?1 ORDER BY position",
        )?;
        let items = stmt
            .query_map(params![search_term], |row| {
                Ok(DocumentRecord {
                    url: row.get(0)?,
                    title: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(CrawlCheckpoint::from_parts(
            search_term,
            last_page,
            pages,
            items,
            last_updated,
        )))
    }

    fn commit(&mut self, checkpoint: &CrawlCheckpoint) -> StorageResult<()> {
        let term = checkpoint.search_term();
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO checkpoints (search_term, last_page, last_updated) VALUES (?1, ?2, ?3)
             ON CONFLICT(search_term) DO UPDATE SET
                last_page = excluded.last_page,
                last_updated = excluded.last_updated",
            params![
                term,
                checkpoint.last_page(),
                checkpoint.last_updated().to_rfc3339()
            ],
        )?;

        tx.execute("DELETE FROM scraped_pages WHERE search_term = ?1", params![term])?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO scraped_pages (search_term, page) VALUES (?1, ?2)")?;
            for page in checkpoint.pages_scraped() {
                stmt.execute(params![term, page])?;
            }
        }

        tx.execute("DELETE FROM items WHERE search_term = ?1", params![term])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO items (search_term, position, url, title) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (position, item) in checkpoint.items().iter().enumerate() {
                stmt.execute(params![term, position as i64, item.url, item.title])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn location(&self, search_term: &str) -> String {
        format!("{} (search term '{}')", self.path.display(), search_term)
    }
}
