//! Core types: page identifiers, fetch jobs, per-page outcomes and run reports

use crate::codec::Page;
use crate::error::{Error, FetchFailure};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Name of one remote page resource, e.g. `page-0a3.pdf`
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(pub String);

impl PageId {
    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PageId {
    fn from(value: &str) -> Self {
        PageId(value.to_string())
    }
}

/// One unit of work for a fetch worker
///
/// `index` is the position of the job within the offset-sliced identifier list
/// and is used only to restore manifest order after concurrent completion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchJob {
    /// Zero-based position in the sliced identifier list
    pub index: usize,
    /// Page identifier being fetched
    pub page: PageId,
    /// Fully built page URL
    pub url: String,
}

/// Result emitted by a worker for exactly one job
#[derive(Debug)]
pub struct PageOutcome {
    /// Sequence index of the job that produced this outcome
    pub index: usize,
    /// Decoded page, or the failure that prevented it
    pub result: std::result::Result<Page, FetchFailure>,
}

/// A page that could not be fetched, tagged with its sequence index
#[derive(Clone, Debug)]
pub struct PageFailure {
    /// Sequence index of the failed job
    pub index: usize,
    /// Identifier of the failed page
    pub page: PageId,
    /// Underlying cause
    pub failure: FetchFailure,
}

/// Everything the coordinator learned from one pass over the job list
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Successfully fetched pages in manifest order
    pub pages: Vec<Page>,
    /// Failed pages in sequence-index order
    pub failures: Vec<PageFailure>,
    /// Number of jobs that were scheduled
    pub total_jobs: usize,
}

impl FetchReport {
    /// Number of failed pages
    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    /// True when every scheduled job produced a page
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Sequence indices of failed pages
    pub fn failed_indices(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.index).collect()
    }
}

/// What to do when some pages fail to download
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Write whatever was fetched (default)
    #[default]
    WritePartial,
    /// Fail the run if any page failed
    Abort,
    /// Tolerate up to this many failed pages
    MaxFailures(usize),
}

impl FailurePolicy {
    /// Whether a run with `failed` failures is allowed to produce output
    pub fn permits(&self, failed: usize) -> bool {
        match self {
            FailurePolicy::WritePartial => true,
            FailurePolicy::Abort => failed == 0,
            FailurePolicy::MaxFailures(max) => failed <= *max,
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_ascii_lowercase();
        match value.as_str() {
            "write-partial" | "write_partial" | "partial" => Ok(FailurePolicy::WritePartial),
            "abort" => Ok(FailurePolicy::Abort),
            other => {
                let max = other
                    .strip_prefix("max-failures:")
                    .or_else(|| other.strip_prefix("max_failures:"))
                    .ok_or_else(|| {
                        Error::config(
                            "BOOK_DL_FAILURE_POLICY",
                            format!(
                                "unknown failure policy '{s}' (expected write-partial, abort or max-failures:<n>)"
                            ),
                        )
                    })?;
                max.trim().parse().map(FailurePolicy::MaxFailures).map_err(|_| {
                    Error::config(
                        "BOOK_DL_FAILURE_POLICY",
                        format!("invalid failure count in '{s}'"),
                    )
                })
            }
        }
    }
}

/// Outcome of a completed run
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    /// Pages listed in the manifest
    pub manifest_pages: usize,
    /// Jobs scheduled after applying the start offset
    pub total_jobs: usize,
    /// Pages written to the output document
    pub pages_written: usize,
    /// Sequence indices that failed
    pub failed_indices: Vec<usize>,
    /// Where the merged document was written
    pub output_path: PathBuf,
}
