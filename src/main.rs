use book_dl::{BookDownloader, Config, RunSummary, run_until_signal};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(summary) => {
            info!(
                pages = summary.pages_written,
                failed = summary.failed_indices.len(),
                path = %summary.output_path.display(),
                "Done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, code = e.error_code(), "Download failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> book_dl::Result<RunSummary> {
    let downloader = BookDownloader::new(Config::from_env()?)?;
    let config = downloader.config();
    info!(
        book_id = %config.book_id,
        start_page = config.start_page,
        concurrency = config.concurrency,
        output = %config.output_path.display(),
        "Starting download"
    );
    run_until_signal(&downloader).await
}
