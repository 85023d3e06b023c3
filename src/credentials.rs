//! Session cookie loading
//!
//! The crawl refuses to start unauthenticated: the remote site answers
//! anonymous sessions with challenges and redirects.

use crate::config::CredentialConfig;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no session cookies found; set {0} (a .env file is read if present)")]
    NoCookies(String),

    #[error("required cookie '{name}' is missing; set {var}")]
    MissingRequired { name: String, var: String },
}

/// Source of session cookies
pub trait CredentialSource {
    /// Returns cookie name -> value
    fn load_cookies(&self) -> Result<BTreeMap<String, String>, CredentialError>;
}

/// Reads cookies from environment variables, after loading `.env`
pub struct EnvCredentials {
    config: CredentialConfig,
}

impl EnvCredentials {
    pub fn new(config: CredentialConfig) -> Self {
        Self { config }
    }

    /// Resolves cookies through an arbitrary lookup (the environment in
    /// production, a map in tests)
    fn resolve<F>(&self, lookup: F) -> Result<BTreeMap<String, String>, CredentialError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cookies: BTreeMap<String, String> = self
            .config
            .cookies
            .iter()
            .filter_map(|(name, var)| {
                lookup(var)
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .map(|v| (name.clone(), v))
            })
            .collect();

        if cookies.is_empty() {
            let vars: Vec<&str> = self.config.cookies.values().map(String::as_str).collect();
            return Err(CredentialError::NoCookies(vars.join(", ")));
        }

        for name in &self.config.required {
            if !cookies.contains_key(name) {
                let var = self.config.cookies.get(name).cloned().unwrap_or_default();
                return Err(CredentialError::MissingRequired {
                    name: name.clone(),
                    var,
                });
            }
        }

        Ok(cookies)
    }
}

impl CredentialSource for EnvCredentials {
    fn load_cookies(&self) -> Result<BTreeMap<String, String>, CredentialError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!("Ignoring unreadable .env file: {}", e),
        }
        self.resolve(|var| std::env::var(var).ok())
    }
}

/// Fixed cookie set, for callers that already hold the values
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    cookies: BTreeMap<String, String>,
}

impl StaticCredentials {
    pub fn new(cookies: BTreeMap<String, String>) -> Self {
        Self { cookies }
    }
}

impl CredentialSource for StaticCredentials {
    fn load_cookies(&self) -> Result<BTreeMap<String, String>, CredentialError> {
        if self.cookies.is_empty() {
            return Err(CredentialError::NoCookies("at least one cookie".to_string()));
        }
        Ok(self.cookies.clone())
    }
}
