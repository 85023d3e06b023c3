//! JSON Lines item list
//!
//! One `{"url", "title"}` object per line, in discovery order. The whole
//! file is rewritten atomically from the checkpoint after each commit, so it
//! never holds a partial line or an item the checkpoint does not know about.

use crate::state::DocumentRecord;
use crate::storage::write_atomic;
use crate::url::output_stem;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Writes `{STEM}.jsonl` under the output directory
#[derive(Debug, Clone)]
pub struct JsonlExporter {
    path: PathBuf,
}

impl JsonlExporter {
    pub fn new(output_dir: &Path, search_term: &str) -> Self {
        Self {
            path: output_dir.join(format!("{}.jsonl", output_stem(search_term))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the file with `items`
    pub fn write(&self, items: &[DocumentRecord]) -> Result<(), crate::HarvestError> {
        let mut buf = String::new();
        for item in items {
            buf.push_str(&serde_json::to_string(item)?);
            buf.push('\n');
        }
        write_atomic(&self.path, buf.as_bytes())?;
        Ok(())
    }
}

/// Reads a JSON Lines item list, skipping blank and malformed lines
pub fn read_items(path: &Path) -> Result<Vec<DocumentRecord>, crate::HarvestError> {
    let file = std::fs::File::open(path)?;
    let mut items = Vec::new();

    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<DocumentRecord>(line) {
            Ok(item) => items.push(item),
            Err(e) => tracing::warn!("Skipping line {} of {}: {}", number + 1, path.display(), e),
        }
    }

    Ok(items)
}
