//! Page index resolution
//!
//! The manifest is treated as unstructured text: every `page-<id>.pdf` token is
//! collected in order of first appearance, and that order is the book's page order.

use crate::client::{Endpoints, get_body};
use crate::error::{FetchStage, Result};
use crate::types::PageId;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::info;

/// Page file token as it appears in the manifest
const PAGE_FILE_PATTERN: &str = r"page-[0-9a-z]*\.pdf";

// The pattern is a compile-time constant, so compilation cannot fail at runtime.
#[allow(clippy::expect_used)]
static PAGE_FILE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PAGE_FILE_PATTERN).expect("page file pattern is valid"));

/// Extract every non-overlapping page file token, first to last
pub fn extract_page_ids(manifest: &str) -> Vec<PageId> {
    PAGE_FILE_REGEX
        .find_iter(manifest)
        .map(|m| PageId::from(m.as_str()))
        .collect()
}

/// Fetches a book's manifest and resolves its ordered page list
pub struct ManifestResolver {
    client: reqwest::Client,
    endpoints: Arc<Endpoints>,
}

impl ManifestResolver {
    /// Create a resolver sharing the given HTTP client
    pub fn new(client: reqwest::Client, endpoints: Arc<Endpoints>) -> Self {
        Self { client, endpoints }
    }

    /// Fetch the manifest and return its page identifiers in manifest order
    ///
    /// An empty list is a valid result.
    pub async fn resolve(&self) -> Result<Vec<PageId>> {
        let url = self.endpoints.manifest_url();
        info!(book_id = self.endpoints.book_id(), url = %url, "Fetching manifest");

        let body = get_body(&self.client, &url, FetchStage::Manifest, FetchStage::ManifestRead)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to fetch manifest"))?;

        let page_ids = extract_page_ids(&String::from_utf8_lossy(&body));
        info!(page_count = page_ids.len(), "Found page file names");
        Ok(page_ids)
    }
}
