//! Configuration types for book-dl
//!
//! A [`Config`] is built once at startup, either directly or from the process
//! environment with [`Config::from_env`], and passed by reference to every stage.

use crate::error::{Error, Result};
use crate::types::FailurePolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Book identifier (required)
pub const ENV_BOOK_ID: &str = "BOOK_ID";
/// Number of leading manifest pages to skip (required)
pub const ENV_START_PAGE: &str = "START_PAGE";
/// Content service base URL
pub const ENV_BASE_URL: &str = "BOOK_DL_BASE_URL";
/// Number of concurrent page fetch workers
pub const ENV_CONCURRENCY: &str = "BOOK_DL_CONCURRENCY";
/// Output document path
pub const ENV_OUTPUT: &str = "BOOK_DL_OUTPUT";
/// Per-request timeout in seconds
pub const ENV_TIMEOUT_SECS: &str = "BOOK_DL_TIMEOUT_SECS";
/// Failure policy (`write-partial`, `abort`, `max-failures:<n>`)
pub const ENV_FAILURE_POLICY: &str = "BOOK_DL_FAILURE_POLICY";
/// Retry attempts for transient page fetch failures
pub const ENV_RETRIES: &str = "BOOK_DL_RETRIES";

/// Content service settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the content service (default: "https://learn.eltngl.com")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout applied to every HTTP request (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Retry behavior for page fetches
///
/// Disabled by default (`max_attempts = 0`): each page is requested exactly once.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 0)
    #[serde(default)]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for a book download run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Identifier of the book on the content service
    pub book_id: String,

    /// Number of leading manifest pages to skip
    #[serde(default)]
    pub start_page: usize,

    /// Content service settings
    #[serde(default)]
    pub service: ServiceConfig,

    /// Number of concurrent page fetch workers (default: 10)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Merged document destination (default: "output/downloaded.pdf")
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// What to do when some pages fail (default: write partial output)
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Retry behavior for page fetches
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            book_id: String::new(),
            start_page: 0,
            service: ServiceConfig::default(),
            concurrency: default_concurrency(),
            output_path: default_output_path(),
            failure_policy: FailurePolicy::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Configuration for a book with every other setting at its default
    pub fn new(book_id: impl Into<String>, start_page: usize) -> Self {
        Self {
            book_id: book_id.into(),
            start_page,
            ..Default::default()
        }
    }

    /// Load configuration from the process environment
    ///
    /// A `.env` file in the working directory is loaded first when present;
    /// variables already set in the environment take precedence.
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env file"),
            Err(e) if e.not_found() => tracing::debug!("No .env file found"),
            Err(e) => {
                return Err(Error::config(
                    ".env",
                    format!("failed to load .env file: {e}"),
                ));
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let book_id = lookup(ENV_BOOK_ID)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::config(ENV_BOOK_ID, "BOOK_ID is required"))?;

        let start_page = parse_var::<usize>(&lookup, ENV_START_PAGE)?.ok_or_else(|| {
            Error::config(ENV_START_PAGE, "START_PAGE is required")
        })?;

        let mut config = Config::new(book_id, start_page);

        if let Some(base_url) = lookup(ENV_BASE_URL) {
            config.service.base_url = base_url.trim().to_string();
        }
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_TIMEOUT_SECS)? {
            config.service.request_timeout = Duration::from_secs(secs);
        }
        if let Some(concurrency) = parse_var::<usize>(&lookup, ENV_CONCURRENCY)? {
            config.concurrency = concurrency;
        }
        if let Some(output) = lookup(ENV_OUTPUT) {
            config.output_path = PathBuf::from(output.trim());
        }
        if let Some(policy) = lookup(ENV_FAILURE_POLICY) {
            config.failure_policy = policy.parse()?;
        }
        if let Some(retries) = parse_var::<u32>(&lookup, ENV_RETRIES)? {
            config.retry.max_attempts = retries;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check invariants that do not depend on the manifest
    pub fn validate(&self) -> Result<()> {
        if self.book_id.is_empty() {
            return Err(Error::config(ENV_BOOK_ID, "book id must not be empty"));
        }
        if self
            .book_id
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#'))
        {
            return Err(Error::config(
                ENV_BOOK_ID,
                format!("book id '{}' contains characters not allowed in a URL path segment", self.book_id),
            ));
        }
        if self.concurrency == 0 {
            return Err(Error::config(ENV_CONCURRENCY, "concurrency must be at least 1"));
        }
        if self.service.request_timeout.is_zero() {
            return Err(Error::config(ENV_TIMEOUT_SECS, "request timeout must be positive"));
        }
        match url::Url::parse(&self.service.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(Error::config(
                    ENV_BASE_URL,
                    format!("unsupported URL scheme '{}'", url.scheme()),
                ));
            }
            Err(e) => {
                return Err(Error::config(
                    ENV_BASE_URL,
                    format!("invalid base URL '{}': {e}", self.service.base_url),
                ));
            }
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(Error::config(ENV_OUTPUT, "output path must not be empty"));
        }
        Ok(())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::config(key, format!("invalid value '{raw}' for {key}: {e}"))),
    }
}

fn default_base_url() -> String {
    "https://learn.eltngl.com".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_concurrency() -> usize {
    10
}

fn default_output_path() -> PathBuf {
    PathBuf::from("output/downloaded.pdf")
}

fn default_true() -> bool {
    true
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
