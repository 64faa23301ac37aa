//! HTTP plumbing shared by the manifest resolver and the page fetcher

use crate::config::ServiceConfig;
use crate::error::{Error, FetchFailure, FetchStage, Result};
use crate::types::PageId;

/// URL templates for one book on the content service
#[derive(Clone, Debug)]
pub struct Endpoints {
    base_url: String,
    book_id: String,
}

impl Endpoints {
    /// Bind the URL templates to a service base URL and a book
    pub fn new(base_url: &str, book_id: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            book_id: book_id.to_string(),
        }
    }

    /// `{base}/cdn_proxy/{book}/data.js`
    pub fn manifest_url(&self) -> String {
        format!("{}/cdn_proxy/{}/data.js", self.base_url, self.book_id)
    }

    /// `{base}/cdn_proxy/{book}/media/{page}`
    pub fn page_url(&self, page: &PageId) -> String {
        format!(
            "{}/cdn_proxy/{}/media/{}",
            self.base_url, self.book_id, page
        )
    }

    /// Book these endpoints belong to
    pub fn book_id(&self) -> &str {
        &self.book_id
    }
}

/// Build the shared HTTP client with the configured per-request timeout
pub fn build_http_client(service: &ServiceConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(service.request_timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Config {
            message: format!("failed to create HTTP client: {e}"),
            key: None,
        })
}

/// GET a URL and read the whole body
///
/// Transport failures and non-success statuses are reported at `request_stage`,
/// body read failures at `read_stage`.
pub(crate) async fn get_body(
    client: &reqwest::Client,
    url: &str,
    request_stage: FetchStage,
    read_stage: FetchStage,
) -> std::result::Result<Vec<u8>, FetchFailure> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| FetchFailure::from_reqwest(request_stage, url, &e))?;

    let status = response.status();
    if !status.is_success() {
        let mut failure = FetchFailure::new(request_stage, url, format!("HTTP status {status}"));
        failure.transient = status.is_server_error();
        return Err(failure);
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| FetchFailure::from_reqwest(read_stage, url, &e))?;
    Ok(body.to_vec())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> reqwest::Client {
        build_http_client(&ServiceConfig {
            base_url: "http://unused".to_string(),
            request_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn endpoints_follow_cdn_proxy_layout() {
        let endpoints = Endpoints::new("https://learn.example.com/", "book-42");
        assert_eq!(
            endpoints.manifest_url(),
            "https://learn.example.com/cdn_proxy/book-42/data.js"
        );
        assert_eq!(
            endpoints.page_url(&PageId::from("page-0a3.pdf")),
            "https://learn.example.com/cdn_proxy/book-42/media/page-0a3.pdf"
        );
        assert_eq!(endpoints.book_id(), "book-42");
    }

    #[tokio::test]
    async fn get_body_returns_bytes_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blob"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"abc".to_vec()))
            .mount(&server)
            .await;

        let url = format!("{}/blob", server.uri());
        let body = get_body(&client(), &url, FetchStage::PageFetch, FetchStage::PageRead)
            .await
            .unwrap();
        assert_eq!(body, b"abc");
    }

    #[tokio::test]
    async fn http_error_status_fails_at_request_stage() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = format!("{}/missing", server.uri());
        let failure = get_body(&client(), &url, FetchStage::Manifest, FetchStage::ManifestRead)
            .await
            .unwrap_err();
        assert_eq!(failure.stage, FetchStage::Manifest);
        assert!(failure.reason.contains("404"), "got: {}", failure.reason);
        assert!(!failure.transient);
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let url = format!("{}/busy", server.uri());
        let failure = get_body(&client(), &url, FetchStage::PageFetch, FetchStage::PageRead)
            .await
            .unwrap_err();
        assert_eq!(failure.stage, FetchStage::PageFetch);
        assert!(failure.transient);
    }

    #[tokio::test]
    async fn connection_refused_is_transient_transport_failure() {
        // Bind then drop a listener so the port is very likely closed.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = format!("http://127.0.0.1:{port}/data.js");

        let failure = get_body(&client(), &url, FetchStage::Manifest, FetchStage::ManifestRead)
            .await
            .unwrap_err();
        assert_eq!(failure.stage, FetchStage::Manifest);
        assert!(failure.transient);
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let client = build_http_client(&ServiceConfig {
            base_url: server.uri(),
            request_timeout: Duration::from_millis(100),
        })
        .unwrap();
        let url = format!("{}/slow", server.uri());
        let failure = get_body(&client, &url, FetchStage::PageFetch, FetchStage::PageRead)
            .await
            .unwrap_err();
        assert_eq!(failure.stage, FetchStage::PageFetch);
        assert!(failure.transient);
        assert!(failure.reason.contains("timed out"), "got: {}", failure.reason);
    }
}
