//! Common test utilities for book-dl integration tests

#[allow(dead_code)]
pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::*;

use book_dl::Config;
use std::path::Path;
use std::time::Duration;
use wiremock::MockServer;

/// Book identifier served by the mock content service
pub const BOOK_ID: &str = "test-book";

/// Configuration pointed at `server`, writing to `output`
#[allow(dead_code)]
pub fn config_for(server: &MockServer, start_page: usize, output: &Path) -> Config {
    let mut config = Config::new(BOOK_ID, start_page);
    config.service.base_url = server.uri();
    config.service.request_timeout = Duration::from_secs(5);
    config.concurrency = 4;
    config.output_path = output.to_path_buf();
    config
}
