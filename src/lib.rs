//! # book-dl
//!
//! Downloads a paginated e-book from a content-delivery service and merges its
//! pages into a single PDF.
//!
//! A run fetches the book's manifest, extracts the ordered list of page files,
//! downloads every page from the configured start offset on a bounded worker pool,
//! repairs the corrupted magic header each page is served with, and writes the
//! pages to one document in manifest order. Pages that fail are logged and left
//! out; what happens to a run with failed pages is decided by the configured
//! [`FailurePolicy`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use book_dl::{BookDownloader, Config};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::new("my-book", 0);
//!     let downloader = BookDownloader::new(config)?;
//!
//!     let summary = downloader.run(&CancellationToken::new()).await?;
//!     println!("wrote {} pages to {}", summary.pages_written, summary.output_path.display());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Ordered merge and atomic write of the output document
pub mod assembler;
/// Endpoint layout and the shared HTTP client
pub mod client;
/// PDF page-container decoding and document building
pub mod codec;
/// Configuration types
pub mod config;
/// Bounded worker pool for page fetches
pub mod coordinator;
/// Top-level download run
pub mod downloader;
/// Error types
pub mod error;
/// Page fetching and header repair
pub mod fetcher;
/// Manifest retrieval and page identifier extraction
pub mod manifest;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types
pub mod types;

pub use config::{Config, RetryConfig, ServiceConfig};
pub use downloader::BookDownloader;
pub use error::{Error, FetchFailure, FetchStage, Result};
pub use fetcher::{HttpPageFetcher, PageFetcher};
pub use types::{FailurePolicy, FetchReport, PageId, RunSummary};

use tokio_util::sync::CancellationToken;

/// Run a download, cancelling it on SIGTERM or SIGINT
///
/// In-flight page fetches are abandoned when a signal arrives, and the run ends
/// with [`Error::Cancelled`] without writing output.
///
/// # Example
///
/// ```no_run
/// use book_dl::{BookDownloader, Config, run_until_signal};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = BookDownloader::new(Config::from_env()?)?;
///     let summary = run_until_signal(&downloader).await?;
///     println!("{} pages written", summary.pages_written);
///     Ok(())
/// }
/// ```
pub async fn run_until_signal(downloader: &BookDownloader) -> Result<RunSummary> {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let watcher = tokio::spawn(async move {
        wait_for_signal().await;
        tracing::warn!("Shutdown requested, cancelling outstanding page fetches");
        trigger.cancel();
    });

    let result = downloader.run(&cancel).await;
    watcher.abort();
    result
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            ctrl_c_or_never().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c_or_never().await;
}

/// Wait for Ctrl+C; if no handler can be installed, never resolve so the run
/// is not cancelled spuriously.
async fn ctrl_c_or_never() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            std::future::pending::<()>().await;
        }
    }
}
