//! Provider client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, Result};

/// Configuration for the provider client.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Personal access token. Required for every call.
    #[serde(default)]
    pub token: Option<String>,
    /// Base URL of the API, without the version segment.
    pub base_url: String,
    /// API version segment appended to the base URL.
    pub api_version: String,
    /// Optional prefix for the `User-Agent` header.
    #[serde(default)]
    pub ua_prefix: Option<String>,
    /// Delay between event polls in milliseconds.
    pub event_poll_ms: u64,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Page size for list endpoints.
    pub page_size: u32,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("ua_prefix", &self.ua_prefix)
            .field("event_poll_ms", &self.event_poll_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: "https://api.linode.com".to_string(),
            api_version: "v4".to_string(),
            ua_prefix: None,
            event_poll_ms: 300,
            request_timeout_secs: 30,
            page_size: 100,
        }
    }
}

impl ProviderConfig {
    /// Create a config for the default API endpoint with the given token.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `LINODE_TOKEN`: personal access token
    /// - `LINODE_URL`: API base URL
    /// - `LINODE_API_VERSION`: API version segment
    /// - `LINODE_UA_PREFIX`: `User-Agent` prefix
    /// - `LINODE_EVENT_POLL_MS`: delay between event polls
    /// - `LINODE_REQUEST_TIMEOUT_SECS`: per-request timeout
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("LINODE_TOKEN") {
            if !val.is_empty() {
                config.token = Some(val);
            }
        }
        if let Ok(val) = std::env::var("LINODE_URL") {
            config.base_url = val.trim_end_matches('/').to_string();
        }
        if let Ok(val) = std::env::var("LINODE_API_VERSION") {
            config.api_version = val;
        }
        if let Ok(val) = std::env::var("LINODE_UA_PREFIX") {
            config.ua_prefix = Some(val);
        }
        if let Ok(val) = std::env::var("LINODE_EVENT_POLL_MS") {
            if let Ok(n) = val.parse() {
                config.event_poll_ms = n;
            }
        }
        if let Ok(val) = std::env::var("LINODE_REQUEST_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                config.request_timeout_secs = n;
            }
        }

        config
    }

    /// Root URL all endpoint paths are appended to.
    #[must_use]
    pub fn api_root(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.api_version
        )
    }

    /// Delay between event polls.
    #[must_use]
    pub const fn event_poll_interval(&self) -> Duration {
        Duration::from_millis(self.event_poll_ms)
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Value for the `User-Agent` header.
    #[must_use]
    pub fn user_agent(&self) -> String {
        let base = concat!("shapectl/", env!("CARGO_PKG_VERSION"));
        match &self.ua_prefix {
            Some(prefix) if !prefix.is_empty() => format!("{prefix} {base}"),
            _ => base.to_string(),
        }
    }

    /// Check the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is missing, the URL is not HTTP(S), or
    /// the poll interval is zero.
    pub fn validate(&self) -> Result<()> {
        if self.token.as_deref().map_or(true, str::is_empty) {
            return Err(ProviderError::Config(
                "an API token is required (set LINODE_TOKEN)".to_string(),
            ));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ProviderError::Config(format!(
                "API URL must use http or https: {}",
                self.base_url
            )));
        }
        if self.event_poll_ms == 0 {
            return Err(ProviderError::Config(
                "event poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ProviderConfig::default();
        assert_eq!(config.api_root(), "https://api.linode.com/v4");
        assert_eq!(config.event_poll_interval(), Duration::from_millis(300));
        assert!(config.user_agent().starts_with("shapectl/"));
    }

    #[test]
    fn user_agent_prefix() {
        let config = ProviderConfig {
            ua_prefix: Some("ci-runner".to_string()),
            ..ProviderConfig::with_token("t")
        };
        assert!(config.user_agent().starts_with("ci-runner shapectl/"));
    }

    #[test]
    fn validate_requires_token() {
        assert!(ProviderConfig::default().validate().is_err());
        assert!(ProviderConfig::with_token("abc").validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_url_and_zero_poll() {
        let mut config = ProviderConfig::with_token("abc");
        config.base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        let mut config = ProviderConfig::with_token("abc");
        config.event_poll_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_redacts_token() {
        let rendered = format!("{:?}", ProviderConfig::with_token("super-secret"));
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
