//! Page fetching: download one page container, repair its header, decode its page.

use crate::client::get_body;
use crate::codec::{self, CodecError, Page};
use crate::error::{FetchFailure, FetchStage};
use tracing::debug;

/// Magic header as served by the content service
pub const CORRUPTED_HEADER: &[u8] = b"%ADF-1.6";

/// Magic header expected by PDF readers
pub const PDF_HEADER: &[u8] = b"%PDF-1.6";

/// Replace the first occurrence of the corrupted magic header with the correct one
///
/// Later occurrences are left alone. Returns whether a replacement was made.
pub fn repair_header(body: &mut [u8]) -> bool {
    let Some(pos) = body
        .windows(CORRUPTED_HEADER.len())
        .position(|window| window == CORRUPTED_HEADER)
    else {
        return false;
    };
    body[pos..pos + PDF_HEADER.len()].copy_from_slice(PDF_HEADER);
    true
}

/// Abstraction over page retrieval, enabling testability.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch and decode the page at `url`
    async fn fetch(&self, url: &str) -> Result<Page, FetchFailure>;
}

/// Production [`PageFetcher`] that downloads page containers over HTTP.
pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    /// Create a fetcher sharing the given HTTP client
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<Page, FetchFailure> {
        debug!(url = %url, "Fetching page");
        let mut body = get_body(&self.client, url, FetchStage::PageFetch, FetchStage::PageRead).await?;

        if repair_header(&mut body) {
            debug!(url = %url, "Repaired corrupted page header");
        }

        decode_page(url, body).await
    }
}

/// Decode a repaired page container off the async runtime
async fn decode_page(url: &str, body: Vec<u8>) -> Result<Page, FetchFailure> {
    let decoded = tokio::task::spawn_blocking(move || codec::decode_first_page(&body))
        .await
        .map_err(|e| FetchFailure::new(FetchStage::Decode, url, format!("decode task failed: {e}")))?;

    decoded.map_err(|e| match e {
        CodecError::NoPage => FetchFailure::new(FetchStage::Extract, url, e.to_string()),
        other => FetchFailure::new(FetchStage::Decode, url, other.to_string()),
    })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::fixtures::{corrupt_header, empty_container, single_page_pdf};
    use crate::config::RetryConfig;
    use crate::retry::fetch_with_retry;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn repairs_corrupted_magic() {
        let mut body = b"%ADF-1.6\n%rest".to_vec();
        assert!(repair_header(&mut body));
        assert_eq!(body, b"%PDF-1.6\n%rest");
    }

    #[test]
    fn correct_header_passes_through_unchanged() {
        let original = b"%PDF-1.6\n1 0 obj\n".to_vec();
        let mut body = original.clone();
        assert!(!repair_header(&mut body));
        assert_eq!(body, original);
    }

    #[test]
    fn only_first_occurrence_is_replaced() {
        let mut body = b"%ADF-1.6 stream %ADF-1.6 end".to_vec();
        assert!(repair_header(&mut body));
        assert_eq!(body, b"%PDF-1.6 stream %ADF-1.6 end");
    }

    #[test]
    fn first_occurrence_need_not_be_at_offset_zero() {
        let mut body = b"\xEF\xBB\xBF%ADF-1.6".to_vec();
        assert!(repair_header(&mut body));
        assert_eq!(body, b"\xEF\xBB\xBF%PDF-1.6");
    }

    #[test]
    fn short_bodies_are_left_alone() {
        let mut body = b"%ADF".to_vec();
        assert!(!repair_header(&mut body));
        let mut empty: Vec<u8> = Vec::new();
        assert!(!repair_header(&mut empty));
    }

    fn fetcher() -> HttpPageFetcher {
        HttpPageFetcher::new(
            reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn fetches_and_decodes_corrupted_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cdn_proxy/b/media/page-1.pdf"))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(corrupt_header(single_page_pdf(11))),
            )
            .mount(&server)
            .await;

        let url = format!("{}/cdn_proxy/b/media/page-1.pdf", server.uri());
        let page = fetcher().fetch(&url).await.unwrap();
        let marker = page
            .dictionary()
            .and_then(|d| d.get(b"Marker").ok())
            .and_then(|m| m.as_i64().ok());
        assert_eq!(marker, Some(11));
    }

    #[tokio::test]
    async fn undecodable_body_fails_at_decode_stage() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%ADF-1.6 garbage".to_vec()))
            .mount(&server)
            .await;

        let url = format!("{}/cdn_proxy/b/media/page-2.pdf", server.uri());
        let failure = fetcher().fetch(&url).await.unwrap_err();
        assert_eq!(failure.stage, FetchStage::Decode);
        assert_eq!(failure.url, url);
    }

    #[tokio::test]
    async fn missing_page_fails_at_page_fetch_stage() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = format!("{}/cdn_proxy/b/media/page-3.pdf", server.uri());
        let failure = fetcher().fetch(&url).await.unwrap_err();
        assert_eq!(failure.stage, FetchStage::PageFetch);
    }

    #[tokio::test]
    async fn container_without_pages_fails_at_extract_stage() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(corrupt_header(empty_container())))
            .mount(&server)
            .await;

        let url = format!("{}/cdn_proxy/b/media/page-4.pdf", server.uri());
        let failure = fetcher().fetch(&url).await.unwrap_err();
        assert_eq!(failure.stage, FetchStage::Extract);
        assert_eq!(failure.url, url);
    }

    #[tokio::test]
    async fn server_error_is_retried_when_retries_are_enabled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(corrupt_header(single_page_pdf(5))),
            )
            .mount(&server)
            .await;

        let retry = RetryConfig {
            max_attempts: 1,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 1.0,
            jitter: false,
        };
        let url = format!("{}/cdn_proxy/b/media/page-5.pdf", server.uri());
        let fetcher = fetcher();
        let page = fetch_with_retry(&retry, || fetcher.fetch(&url)).await.unwrap();
        assert!(page.dictionary().is_some());
    }
}
