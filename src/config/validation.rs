use crate::config::types::{Config, CrawlConfig, CredentialConfig, HttpConfig, PolicyConfig, SiteConfig};
use crate::ConfigError;
use reqwest::header::{HeaderName, HeaderValue};
use url::Url;

/// Validates the entire site profile
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_http_config(&config.http)?;
    validate_policy_config(&config.policy)?;
    validate_credential_config(&config.credentials)?;
    Ok(())
}

/// Validates per-run parameters coming from the command line
pub fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.max_retries < 1 {
        return Err(ConfigError::Validation(
            "max_retries must be >= 1".to_string(),
        ));
    }

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1 when given".to_string(),
        ));
    }

    if config.output_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "output_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let base = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if base.scheme() != "https" && base.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    if config.base_url.ends_with('/') {
        return Err(ConfigError::Validation(format!(
            "base-url '{}' must not end with '/'",
            config.base_url
        )));
    }

    for (name, path) in [
        ("search-path", &config.search_path),
        ("landing-path", &config.landing_path),
        ("verify-path", &config.verify_path),
        ("pdf-path", &config.pdf_path),
    ] {
        if !path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "{} must start with '/', got '{}'",
                name, path
            )));
        }
    }

    if config.document_marker.is_empty() {
        return Err(ConfigError::Validation(
            "document-marker cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.request_timeout < 1 {
        return Err(ConfigError::Validation(format!(
            "request-timeout must be >= 1s, got {}s",
            config.request_timeout
        )));
    }

    if config.challenge_timeout < 1 {
        return Err(ConfigError::Validation(format!(
            "challenge-timeout must be >= 1s, got {}s",
            config.challenge_timeout
        )));
    }

    for (name, value) in &config.headers {
        HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ConfigError::InvalidHeader(format!("invalid header name '{}'", name)))?;
        HeaderValue::from_str(value).map_err(|_| {
            ConfigError::InvalidHeader(format!("invalid value for header '{}'", name))
        })?;
    }

    Ok(())
}

fn validate_policy_config(config: &PolicyConfig) -> Result<(), ConfigError> {
    if config.content_threshold == 0 {
        return Err(ConfigError::Validation(
            "content-threshold must be > 0".to_string(),
        ));
    }

    if config.max_consecutive_empty < 1 {
        return Err(ConfigError::Validation(format!(
            "max-consecutive-empty must be >= 1, got {}",
            config.max_consecutive_empty
        )));
    }

    Ok(())
}

fn validate_credential_config(config: &CredentialConfig) -> Result<(), ConfigError> {
    if config.cookies.is_empty() {
        return Err(ConfigError::Validation(
            "credentials.cookies must name at least one cookie".to_string(),
        ));
    }

    for name in config.cookies.keys() {
        validate_cookie_name(name)?;
    }

    for name in &config.required {
        if !config.cookies.contains_key(name) {
            return Err(ConfigError::Validation(format!(
                "required cookie '{}' has no entry in credentials.cookies",
                name
            )));
        }
    }

    Ok(())
}

/// Cookie names are RFC 6265 tokens
fn validate_cookie_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::Validation(
            "cookie name cannot be empty".to_string(),
        ));
    }

    let forbidden = "()<>@,;:\\\"/[]?={} \t";
    if name
        .chars()
        .any(|c| c.is_control() || !c.is_ascii() || forbidden.contains(c))
    {
        return Err(ConfigError::Validation(format!(
            "cookie name '{}' contains invalid characters",
            name
        )));
    }

    Ok(())
}
