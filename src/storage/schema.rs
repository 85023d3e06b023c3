//! Database schema definitions
//!
//! This module contains the SQL schema for the SQLite checkpoint backend.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per search term
CREATE TABLE IF NOT EXISTS checkpoints (
    search_term TEXT PRIMARY KEY,
    last_page INTEGER NOT NULL,
    last_updated TEXT NOT NULL
);

-- Committed page numbers
CREATE TABLE IF NOT EXISTS scraped_pages (
    search_term TEXT NOT NULL REFERENCES checkpoints(search_term) ON DELETE CASCADE,
    page INTEGER NOT NULL,
    PRIMARY KEY (search_term, page)
);

-- Discovered documents in discovery order
CREATE TABLE IF NOT EXISTS items (
    search_term TEXT NOT NULL REFERENCES checkpoints(search_term) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    url TEXT NOT NULL,
    title TEXT NOT NULL,
    PRIMARY KEY (search_term, position),
    UNIQUE (search_term, url)
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
