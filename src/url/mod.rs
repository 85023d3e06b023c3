//! URL handling module for Readingroom-Harvest
//!
//! This module builds the paginated search URLs and their referers, derives
//! the on-disk stem for a search term, and maps document pages to the PDF
//! artifacts they reference.

mod document;
mod search;

pub use document::{pdf_url_for_document, resolve_link, slug_from_url};
pub use search::{output_stem, SearchTarget};
