//! Configuration module for Readingroom-Harvest
//!
//! Two layers: the site profile (optional TOML file, built-in defaults) and
//! the per-run crawl parameters assembled from the command line.
//!
//! # Example
//!
//! ```no_run
//! use readingroom_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("profile.toml")).unwrap();
//! println!("Content threshold: {}", config.policy.content_threshold);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlConfig, CredentialConfig, HttpConfig, PolicyConfig, SiteConfig, StorageBackend,
    StorageConfig,
};

// Re-export parser functions
pub use parser::{load_config, load_config_with_hash, load_or_default, parse_config, profile_hash};
pub use validation::{validate, validate_crawl_config};
