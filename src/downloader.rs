//! Top-level run: manifest, fetch, failure policy, output.

use crate::assembler::assemble;
use crate::client::{Endpoints, build_http_client};
use crate::config::Config;
use crate::coordinator::FetchCoordinator;
use crate::error::{Error, Result};
use crate::fetcher::{HttpPageFetcher, PageFetcher};
use crate::manifest::ManifestResolver;
use crate::types::RunSummary;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Downloads one book and writes it as a single merged document
pub struct BookDownloader {
    config: Config,
    resolver: ManifestResolver,
    coordinator: FetchCoordinator,
}

impl BookDownloader {
    /// Validate `config` and build a downloader that fetches pages over HTTP
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let client = build_http_client(&config.service)?;
        let fetcher = Arc::new(HttpPageFetcher::new(client.clone()));
        Ok(Self::from_parts(config, client, fetcher))
    }

    /// Build a downloader with a custom page source
    ///
    /// The manifest is still fetched over HTTP from the configured base URL.
    pub fn with_fetcher(config: Config, fetcher: Arc<dyn PageFetcher>) -> Result<Self> {
        config.validate()?;
        let client = build_http_client(&config.service)?;
        Ok(Self::from_parts(config, client, fetcher))
    }

    fn from_parts(config: Config, client: reqwest::Client, fetcher: Arc<dyn PageFetcher>) -> Self {
        let endpoints = Arc::new(Endpoints::new(&config.service.base_url, &config.book_id));
        let resolver = ManifestResolver::new(client, Arc::clone(&endpoints));
        let coordinator = FetchCoordinator::new(fetcher, endpoints, config.concurrency)
            .with_retry(config.retry.clone());
        Self {
            config,
            resolver,
            coordinator,
        }
    }

    /// The validated configuration this downloader runs with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the whole pipeline once
    ///
    /// A manifest failure, an out-of-range start page, cancellation or a failure
    /// policy violation ends the run without touching the output path. Otherwise
    /// every successfully fetched page is written, in manifest order.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunSummary> {
        let page_ids = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            resolved = self.resolver.resolve() => resolved?,
        };
        let manifest_pages = page_ids.len();

        let report = self
            .coordinator
            .run(&page_ids, self.config.start_page, cancel)
            .await?;

        if cancel.is_cancelled() {
            warn!(
                fetched = report.pages.len(),
                total = report.total_jobs,
                "Run cancelled, not writing output"
            );
            return Err(Error::Cancelled);
        }

        let failed = report.failed_count();
        if !self.config.failure_policy.permits(failed) {
            error!(
                failed,
                total = report.total_jobs,
                policy = ?self.config.failure_policy,
                "Too many pages failed, not writing output"
            );
            return Err(Error::FailureThreshold {
                failed,
                total: report.total_jobs,
            });
        }

        let total_jobs = report.total_jobs;
        let failed_indices = report.failed_indices();
        let pages_written = assemble(report.pages, &self.config.output_path).await?;

        if failed_indices.is_empty() {
            info!(pages = pages_written, "Book downloaded");
        } else {
            warn!(
                pages = pages_written,
                missing = ?failed_indices,
                "Book downloaded with missing pages"
            );
        }

        Ok(RunSummary {
            manifest_pages,
            total_jobs,
            pages_written,
            failed_indices,
            output_path: self.config.output_path.clone(),
        })
    }
}
