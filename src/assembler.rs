//! Output assembly
//!
//! Appends fetched pages to a fresh document in sequence order and writes it to
//! disk. The file is written to a temporary sibling first and renamed into place,
//! so an interrupted run never leaves a truncated document at the destination.

use crate::codec::{DocumentBuilder, Page};
use crate::error::{Error, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tracing::{debug, info};

/// Merge `pages` in the given order and write the result to `destination`
///
/// Missing parent directories are created. Returns the number of pages written.
/// An empty page list produces a valid zero-page document.
pub async fn assemble(pages: Vec<Page>, destination: &Path) -> Result<usize> {
    let destination_owned = destination.to_path_buf();
    // Serialization and file I/O are blocking; keep them off the async runtime
    let written = spawn_blocking(move || write_document(pages, &destination_owned))
        .await
        .map_err(|e| Error::Codec(format!("assembly task panicked: {e}")))??;

    info!(pages = written, path = %destination.display(), "Wrote merged document");
    Ok(written)
}

/// Blocking half of [`assemble`]
pub fn write_document(pages: Vec<Page>, destination: &Path) -> Result<usize> {
    let mut builder = DocumentBuilder::new();
    for page in pages {
        builder
            .append(page)
            .map_err(|e| Error::Codec(e.to_string()))?;
    }
    let count = builder.page_count();
    let bytes = builder.to_bytes().map_err(|e| Error::Codec(e.to_string()))?;
    debug!(pages = count, bytes = bytes.len(), "Serialized merged document");

    let directory = output_directory(destination);
    std::fs::create_dir_all(&directory).map_err(|e| output_error(&directory, e))?;

    let mut staged =
        tempfile::NamedTempFile::new_in(&directory).map_err(|e| output_error(&directory, e))?;
    staged
        .write_all(&bytes)
        .and_then(|()| staged.as_file().sync_all())
        .map_err(|e| output_error(destination, e))?;
    staged
        .persist(destination)
        .map_err(|e| output_error(destination, e.error))?;

    Ok(count)
}

fn output_directory(destination: &Path) -> PathBuf {
    match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn output_error(path: &Path, source: std::io::Error) -> Error {
    Error::OutputIo {
        path: path.to_path_buf(),
        source,
    }
}
