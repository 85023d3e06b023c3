use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a site profile from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML profile
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated profile
/// * `Err(ConfigError)` - Failed to load, parse, or validate the profile
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use readingroom_harvest::config::load_config;
///
/// let config = load_config(Path::new("profile.toml")).unwrap();
/// println!("Searching {}", config.site.base_url);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates a profile from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// SHA-256 of the profile text, hex encoded
///
/// Logged at startup so a checkpoint can be traced back to the profile that
/// produced it.
pub fn profile_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Loads a profile and returns both the profile and the hash of the exact
/// text that was parsed
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, profile_hash(&content)))
}

/// Loads the profile at `path`, or validates the built-in one when absent
///
/// The returned hash is `None` for the built-in profile.
pub fn load_or_default(path: Option<&Path>) -> Result<(Config, Option<String>), ConfigError> {
    match path {
        Some(path) => {
            let (config, hash) = load_config_with_hash(path)?;
            Ok((config, Some(hash)))
        }
        None => {
            let config = Config::default();
            validate(&config)?;
            Ok((config, None))
        }
    }
}
