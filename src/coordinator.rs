//! Fetch coordination
//!
//! A fixed pool of worker tasks drains a shared job queue and reports exactly one
//! [`PageOutcome`] per job over a single channel. Completion order is arbitrary;
//! the coordinator buckets outcomes by sequence index once every worker has exited,
//! so the returned pages are always in manifest order.

use crate::client::Endpoints;
use crate::codec::Page;
use crate::config::RetryConfig;
use crate::error::{Error, FetchFailure, FetchStage, Result};
use crate::fetcher::PageFetcher;
use crate::retry::fetch_with_retry;
use crate::types::{FetchJob, FetchReport, PageFailure, PageId, PageOutcome};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Slice the identifier list at `offset` and number the remaining pages from zero
///
/// Fails with a configuration error when `offset` is past the end of the list.
/// An offset equal to the list length yields no jobs.
pub fn plan_jobs(page_ids: &[PageId], offset: usize, endpoints: &Endpoints) -> Result<Vec<FetchJob>> {
    let remaining = page_ids.get(offset..).ok_or_else(|| {
        Error::config(
            "START_PAGE",
            format!(
                "start page {offset} is past the end of the manifest ({} pages)",
                page_ids.len()
            ),
        )
    })?;

    Ok(remaining
        .iter()
        .enumerate()
        .map(|(index, page)| FetchJob {
            index,
            page: page.clone(),
            url: endpoints.page_url(page),
        })
        .collect())
}

/// Runs page fetches on a bounded worker pool and restores manifest order
pub struct FetchCoordinator {
    fetcher: Arc<dyn PageFetcher>,
    endpoints: Arc<Endpoints>,
    concurrency: usize,
    retry: RetryConfig,
}

impl FetchCoordinator {
    /// Create a coordinator running at most `concurrency` fetches at once
    pub fn new(fetcher: Arc<dyn PageFetcher>, endpoints: Arc<Endpoints>, concurrency: usize) -> Self {
        Self {
            fetcher,
            endpoints,
            concurrency: concurrency.max(1),
            retry: RetryConfig::default(),
        }
    }

    /// Retry transient page fetch failures with the given policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch every page from `offset` onward
    ///
    /// Per-page failures are recorded in the returned report. The only error is an
    /// out-of-range offset, detected before any page is requested.
    pub async fn run(
        &self,
        page_ids: &[PageId],
        offset: usize,
        cancel: &CancellationToken,
    ) -> Result<FetchReport> {
        let jobs = plan_jobs(page_ids, offset, &self.endpoints)?;
        Ok(self.run_jobs(jobs, cancel).await)
    }

    /// Fetch a planned job list, waiting for every job to finish
    pub async fn run_jobs(&self, jobs: Vec<FetchJob>, cancel: &CancellationToken) -> FetchReport {
        let total_jobs = jobs.len();
        let worker_count = self.concurrency.min(total_jobs);
        info!(
            jobs = total_jobs,
            workers = worker_count,
            "Starting page fetch workers"
        );

        let ledger: Vec<(PageId, String)> = jobs
            .iter()
            .map(|job| (job.page.clone(), job.url.clone()))
            .collect();
        let queue = Arc::new(Mutex::new(VecDeque::from(jobs)));
        // Sized so workers never wait on the sink.
        let (results_tx, mut results_rx) = mpsc::channel::<PageOutcome>(total_jobs.max(1));

        let mut workers = JoinSet::new();
        for id in 0..worker_count {
            let worker = Worker {
                id,
                queue: Arc::clone(&queue),
                fetcher: Arc::clone(&self.fetcher),
                retry: self.retry.clone(),
                cancel: cancel.clone(),
                results: results_tx.clone(),
            };
            workers.spawn(worker.run());
        }
        drop(results_tx);

        let mut slots: Vec<Option<std::result::Result<Page, FetchFailure>>> =
            (0..total_jobs).map(|_| None).collect();
        while let Some(outcome) = results_rx.recv().await {
            match slots.get_mut(outcome.index) {
                Some(slot) if slot.is_none() => *slot = Some(outcome.result),
                Some(_) => warn!(index = outcome.index, "Duplicate outcome for page, ignoring"),
                None => warn!(index = outcome.index, "Outcome for unknown page index, ignoring"),
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Fetch worker exited abnormally");
            }
        }

        let mut report = FetchReport {
            total_jobs,
            ..FetchReport::default()
        };
        for (index, ((page, url), slot)) in ledger.into_iter().zip(slots).enumerate() {
            let failure = match slot {
                Some(Ok(decoded)) => {
                    report.pages.push(decoded);
                    continue;
                }
                Some(Err(failure)) => failure,
                None => FetchFailure::new(
                    FetchStage::WorkerLost,
                    url,
                    "worker exited before reporting a result",
                ),
            };
            report.failures.push(PageFailure {
                index,
                page,
                failure,
            });
        }

        if report.is_complete() {
            info!(pages = report.pages.len(), "All pages fetched");
        } else {
            warn!(
                pages = report.pages.len(),
                failed = report.failed_count(),
                failed_indices = ?report.failed_indices(),
                "Some pages could not be fetched"
            );
        }
        report
    }
}

/// One member of the fetch pool
struct Worker {
    id: usize,
    queue: Arc<Mutex<VecDeque<FetchJob>>>,
    fetcher: Arc<dyn PageFetcher>,
    retry: RetryConfig,
    cancel: CancellationToken,
    results: mpsc::Sender<PageOutcome>,
}

impl Worker {
    async fn run(self) {
        loop {
            let Some(job) = self.queue.lock().await.pop_front() else {
                break;
            };

            let result = self.fetch(&job).await;
            match &result {
                Ok(_) => debug!(worker = self.id, index = job.index, page = %job.page, "Page fetched"),
                Err(e) => warn!(
                    worker = self.id,
                    index = job.index,
                    page = %job.page,
                    stage = %e.stage,
                    error = %e,
                    "Failed to fetch page"
                ),
            }

            let outcome = PageOutcome {
                index: job.index,
                result,
            };
            if self.results.send(outcome).await.is_err() {
                warn!(worker = self.id, "Result channel closed, stopping worker");
                break;
            }
        }
    }

    /// Fetch one job on its own task, so a panicking fetch loses only that job
    async fn fetch(&self, job: &FetchJob) -> std::result::Result<Page, FetchFailure> {
        let cancelled = || {
            FetchFailure::new(
                FetchStage::Cancelled,
                job.url.as_str(),
                "run cancelled before the page was fetched",
            )
        };
        if self.cancel.is_cancelled() {
            return Err(cancelled());
        }

        let fetcher = Arc::clone(&self.fetcher);
        let retry = self.retry.clone();
        let url = job.url.clone();
        let mut task =
            tokio::spawn(async move { fetch_with_retry(&retry, || fetcher.fetch(&url)).await });

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                task.abort();
                Err(cancelled())
            }
            joined = &mut task => joined.unwrap_or_else(|e| {
                Err(FetchFailure::new(
                    FetchStage::WorkerLost,
                    job.url.as_str(),
                    format!("page fetch task failed: {e}"),
                ))
            }),
        }
    }
}
