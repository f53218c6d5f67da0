//! Client configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration pointing at the public Blockset endpoint.
//!
//! ```toml
//! base_url = "https://api.blockset.com"
//! address_chunk_size = 50
//! max_page_size = 100
//! request_timeout_secs = 30
//! error_policy = "drain"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::chunked::ErrorPolicy;

pub const DEFAULT_BASE_URL: &str = "https://api.blockset.com";

/// Addresses per request for address-filtered queries.
pub const DEFAULT_ADDRESS_CHUNK_SIZE: usize = 50;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub base_url: String,
    pub address_chunk_size: usize,
    /// Sent as `max_page_size` when a request does not set its own.
    pub max_page_size: Option<u32>,
    /// Upper bound on pages followed for one query.
    pub max_pages: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub error_policy: ErrorPolicy,
    /// Sent as `authorization: Bearer <token>` by `ReqwestTransport`.
    pub bearer_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            address_chunk_size: DEFAULT_ADDRESS_CHUNK_SIZE,
            max_page_size: None,
            max_pages: None,
            request_timeout_secs: None,
            error_policy: ErrorPolicy::default(),
            bearer_token: None,
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| ConfigError::Invalid(format!("base_url {}: {e}", self.base_url)))?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::Invalid(format!(
                "base_url {} cannot be a base",
                self.base_url
            )));
        }
        if self.address_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "address_chunk_size must be positive".to_string(),
            ));
        }
        if self.max_page_size == Some(0) {
            return Err(ConfigError::Invalid(
                "max_page_size must be positive".to_string(),
            ));
        }
        if self.max_pages == Some(0) {
            return Err(ConfigError::Invalid("max_pages must be positive".to_string()));
        }
        if self.request_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.address_chunk_size, 50);
        assert_eq!(config.error_policy, ErrorPolicy::Cancel);
    }

    #[test]
    fn parses_all_fields() {
        let config = ClientConfig::from_toml_str(
            r#"
            base_url = "http://127.0.0.1:3000"
            address_chunk_size = 25
            max_page_size = 100
            max_pages = 1000
            request_timeout_secs = 15
            error_policy = "drain"
            bearer_token = "secret"
            "#,
        )
        .unwrap();
        assert_eq!(config.base_url, "http://127.0.0.1:3000");
        assert_eq!(config.address_chunk_size, 25);
        assert_eq!(config.max_page_size, Some(100));
        assert_eq!(config.max_pages, Some(1000));
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(15)));
        assert_eq!(config.error_policy, ErrorPolicy::Drain);
        assert_eq!(config.bearer_token.as_deref(), Some("secret"));
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let err = ClientConfig::from_toml_str("address_chunk_size = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = ClientConfig::from_toml_str("request_timeout_secs = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("request_timeout_secs")));
    }

    #[test]
    fn rejects_bad_base_url() {
        let err = ClientConfig::from_toml_str(r#"base_url = "::nope""#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = ClientConfig::from_toml_str("chunk = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ClientConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
