//! Error types for book-dl
//!
//! This module provides the error handling for the library, including:
//! - A single crate-wide [`Error`] type for fatal run failures
//! - [`FetchFailure`] for network/decode failures, tagged with the pipeline stage
//! - Machine-readable error codes for the final log line

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for book-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for book-dl
///
/// Per-page failures never surface through this type while a run is in progress;
/// they are collected into a [`crate::types::FetchReport`]. Everything here is fatal
/// to the run that produced it.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "START_PAGE")
        key: Option<String>,
    },

    /// Network, read, decode or extract failure
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchFailure),

    /// Output directory or file could not be created or written
    #[error("failed to write output {path}: {source}")]
    OutputIo {
        /// Destination that could not be written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Merged document could not be serialized
    #[error("codec error: {0}")]
    Codec(String),

    /// The failure policy rejected a run with failed pages
    #[error("{failed} of {total} pages failed, exceeding the configured failure policy")]
    FailureThreshold {
        /// Number of pages that failed
        failed: usize,
        /// Number of pages attempted
        total: usize,
    },

    /// The run was cancelled before it could complete
    #[error("run cancelled")]
    Cancelled,
}

impl Error {
    /// Shorthand for a configuration error bound to a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Get the machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Fetch(f) => match f.stage {
                FetchStage::Manifest => "manifest_fetch_error",
                FetchStage::ManifestRead => "manifest_read_error",
                FetchStage::PageFetch => "page_fetch_error",
                FetchStage::PageRead => "page_read_error",
                FetchStage::Decode => "page_decode_error",
                FetchStage::Extract => "page_extract_error",
                FetchStage::Cancelled => "cancelled",
                FetchStage::WorkerLost => "worker_lost",
            },
            Error::OutputIo { .. } => "output_io_error",
            Error::Codec(_) => "codec_error",
            Error::FailureThreshold { .. } => "failure_threshold",
            Error::Cancelled => "cancelled",
        }
    }
}

/// Pipeline stage at which a fetch failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchStage {
    /// Transport failure requesting the manifest
    Manifest,
    /// Failure reading the manifest body
    ManifestRead,
    /// Transport failure requesting a page
    PageFetch,
    /// Failure reading a page body
    PageRead,
    /// The repaired page bytes could not be decoded
    Decode,
    /// The decoded container held no page
    Extract,
    /// The job was cancelled before completing
    Cancelled,
    /// The worker running the job exited without reporting
    WorkerLost,
}

impl FetchStage {
    /// Stable label for logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStage::Manifest => "manifest",
            FetchStage::ManifestRead => "manifest-read",
            FetchStage::PageFetch => "page-fetch",
            FetchStage::PageRead => "page-read",
            FetchStage::Decode => "decode",
            FetchStage::Extract => "extract",
            FetchStage::Cancelled => "cancelled",
            FetchStage::WorkerLost => "worker-lost",
        }
    }
}

impl fmt::Display for FetchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure at one stage of fetching a manifest or page
#[derive(Debug, Clone, Error)]
#[error("{stage} failed for {url}: {reason}")]
pub struct FetchFailure {
    /// Stage that failed
    pub stage: FetchStage,
    /// URL being fetched
    pub url: String,
    /// Description of the underlying cause
    pub reason: String,
    /// Whether the underlying cause was a timeout or connection error
    pub transient: bool,
}

impl FetchFailure {
    /// Create a non-transient failure
    pub fn new(stage: FetchStage, url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stage,
            url: url.into(),
            reason: reason.into(),
            transient: false,
        }
    }

    /// Create a failure from a reqwest error, classifying timeouts and connect errors as transient
    pub fn from_reqwest(stage: FetchStage, url: impl Into<String>, err: &reqwest::Error) -> Self {
        let url = url.into();
        let reason = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else {
            err.to_string()
        };
        Self {
            stage,
            url,
            reason,
            transient: err.is_timeout() || err.is_connect(),
        }
    }
}
