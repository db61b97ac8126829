//! Atomic promotion of a fully staged payload to its destination path.
//!
//! The payload is first copied to a sibling staging file, stamped with the
//! remote modification time when known, then renamed onto the destination in
//! one step. The destination is never truncated in place: a crash before the
//! rename leaves any previous destination untouched, with at most one stray
//! staging or temporary file behind.

use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter, SeekFrom};
use tracing::debug;

use super::error::FetchError;
use super::record::TempRecord;

/// Suffix of the transient staging file next to the destination.
pub const STAGING_SUFFIX: &str = ".ok";

/// Returns the staging path for a destination (`<destination>.ok`).
#[must_use]
pub fn staging_path(destination: &Path) -> PathBuf {
    let mut s = destination.as_os_str().to_os_string();
    s.push(STAGING_SUFFIX);
    PathBuf::from(s)
}

/// Publishes a record's payload to `destination` and removes the record.
///
/// Returns the number of payload bytes promoted.
///
/// # Errors
///
/// Returns [`FetchError::Io`] on any copy, timestamp, rename, or unlink
/// failure. A failure before the rename leaves the previous destination
/// byte-identical and the temporary file resumable.
pub async fn publish(record: TempRecord, destination: &Path) -> Result<u64, FetchError> {
    let (mut source, temp_path, header_len, metadata) = record.into_parts();

    source
        .seek(SeekFrom::Start(header_len))
        .await
        .map_err(|e| FetchError::io(&temp_path, e))?;

    let staging = staging_path(destination);
    let staging_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&staging)
        .await
        .map_err(|e| FetchError::io(&staging, e))?;

    let mut writer = BufWriter::new(staging_file);
    let copied = tokio::io::copy(&mut source, &mut writer)
        .await
        .map_err(|e| FetchError::io(&staging, e))?;
    writer
        .flush()
        .await
        .map_err(|e| FetchError::io(&staging, e))?;

    // Stamp the remote Last-Modified before the rename so the destination
    // appears with its final timestamp. Rename preserves it.
    let staging_std = writer.into_inner().into_std().await;
    if let Some(last_modified) = metadata.last_modified {
        staging_std
            .set_modified(last_modified)
            .map_err(|e| FetchError::io(&staging, e))?;
    }
    drop(staging_std);

    tokio::fs::rename(&staging, destination)
        .await
        .map_err(|e| FetchError::io(destination, e))?;

    drop(source);
    tokio::fs::remove_file(&temp_path)
        .await
        .map_err(|e| FetchError::io(&temp_path, e))?;

    debug!(
        destination = %destination.display(),
        bytes = copied,
        "published staged payload"
    );
    Ok(copied)
}
