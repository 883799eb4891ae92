//! LMS client configuration.
//!
//! One base URL serves both the enrollment and course catalog APIs. The
//! client is optional: when `LMS_BASE_URL` is unset the API falls back to an
//! in-process LMS.

use url::Url;

/// Configuration for connecting to the LMS.
///
/// Custom `Debug` implementation redacts the `api_token` field.
#[derive(Clone)]
pub struct LmsConfig {
    /// LMS root, e.g. `https://courses.example.com`.
    pub base_url: Url,
    /// Bearer token sent with every request, if set.
    pub api_token: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for LmsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmsConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl LmsConfig {
    /// Build a configuration for the given base URL with default settings.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_url("base_url", base_url)?,
            api_token: None,
            timeout_secs: 30,
        })
    }

    /// Load configuration from environment variables.
    ///
    /// Returns `Ok(None)` when `LMS_BASE_URL` is not set.
    ///
    /// Variables:
    /// - `LMS_BASE_URL`
    /// - `LMS_API_TOKEN` (optional)
    /// - `LMS_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(raw) = std::env::var("LMS_BASE_URL") else {
            return Ok(None);
        };
        Ok(Some(Self {
            base_url: parse_url("LMS_BASE_URL", &raw)?,
            api_token: std::env::var("LMS_API_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            timeout_secs: std::env::var("LMS_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }))
    }

    /// Join a path onto the base URL without doubling slashes.
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn parse_url(name: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(name.to_string(), e.to_string()))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("LMS_API_TOKEN contains characters not allowed in a header")]
    InvalidToken,
}
