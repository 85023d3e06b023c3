//! Output module for crawl artifacts and summaries
//!
//! This module handles:
//! - The JSON Lines item list rewritten after every committed page
//! - Diagnostic dumps of pages the crawl could not use
//! - Checkpoint statistics for the `status` command

mod artifacts;
mod jsonl;
pub mod stats;

pub use artifacts::{ArtifactKind, ArtifactWriter};
pub use jsonl::{read_items, JsonlExporter};
pub use stats::{checkpoint_statistics, print_statistics, CheckpointStatistics};
