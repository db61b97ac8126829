//! Owned handle over the on-disk partial-download file.
//!
//! A temporary record is the metadata header plus whatever payload bytes have
//! already been staged. The handle is moved through each state transition of
//! the fetcher and released on every exit path by drop, so no step captures
//! an open file implicitly.

use std::path::{Path, PathBuf};

use futures_util::{Stream, StreamExt};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tracing::debug;

use super::error::FetchError;
use super::metadata::{self, PartialMetadata};

/// An open partial-download file: decoded header plus staged payload tail.
#[derive(Debug)]
pub struct TempRecord {
    path: PathBuf,
    file: File,
    metadata: PartialMetadata,
    header_len: u64,
    len: u64,
}

impl TempRecord {
    /// Opens an existing record for read/write.
    ///
    /// Returns `Ok(None)` when no file exists at `path`.
    ///
    /// # Errors
    ///
    /// Any open failure other than not-found propagates as [`FetchError::Io`];
    /// an undecodable header propagates as [`FetchError::CorruptMetadata`].
    pub async fn open(path: &Path) -> Result<Option<Self>, FetchError> {
        let mut file = match OpenOptions::new().read(true).write(true).open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(FetchError::io(path, e)),
        };

        let (metadata, header_len) = metadata::read_from(path, &mut file).await?;
        let len = file
            .metadata()
            .await
            .map_err(|e| FetchError::io(path, e))?
            .len();

        debug!(
            path = %path.display(),
            expected_len = metadata.expected_len,
            staged = len - header_len,
            "opened partial-download record"
        );

        Ok(Some(Self {
            path: path.to_path_buf(),
            file,
            metadata,
            header_len,
            len,
        }))
    }

    /// Creates a fresh record at `path`, truncating anything already there,
    /// and writes the encoded header.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidMetadata`] if the metadata cannot be
    /// encoded, or [`FetchError::Io`] on filesystem failure.
    pub async fn create(path: &Path, metadata: PartialMetadata) -> Result<Self, FetchError> {
        let header = metadata::encode(&metadata)?;
        let mut file = OpenOptions::new()
            .write(true)
            .read(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await
            .map_err(|e| FetchError::io(path, e))?;
        file.write_all(&header)
            .await
            .map_err(|e| FetchError::io(path, e))?;
        file.flush().await.map_err(|e| FetchError::io(path, e))?;

        let header_len = header.len() as u64;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            metadata,
            header_len,
            len: header_len,
        })
    }

    /// The metadata this partial download was started against.
    #[must_use]
    pub fn metadata(&self) -> &PartialMetadata {
        &self.metadata
    }

    /// Bytes of payload already durably staged (file size minus header).
    #[must_use]
    pub fn payload_offset(&self) -> u64 {
        self.len - self.header_len
    }

    /// Appends body chunks at the current end of file, one write at a time.
    ///
    /// Nothing is buffered beyond a single chunk. On failure the prefix
    /// written so far remains on disk and the record stays resumable.
    ///
    /// # Errors
    ///
    /// Propagates the first failed chunk ([`FetchError::Network`] from the
    /// stream) or write ([`FetchError::Io`]).
    pub async fn append_from<S, B>(&mut self, mut body: S) -> Result<u64, FetchError>
    where
        S: Stream<Item = Result<B, FetchError>> + Unpin,
        B: AsRef<[u8]>,
    {
        self.file
            .seek(SeekFrom::End(0))
            .await
            .map_err(|e| FetchError::io(&self.path, e))?;

        let mut appended: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            let chunk = chunk.as_ref();
            self.file
                .write_all(chunk)
                .await
                .map_err(|e| FetchError::io(&self.path, e))?;
            self.len += chunk.len() as u64;
            appended += chunk.len() as u64;
        }

        self.file
            .flush()
            .await
            .map_err(|e| FetchError::io(&self.path, e))?;
        Ok(appended)
    }

    /// Removes the record from disk, consuming the handle.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Io`] if the unlink fails.
    pub async fn discard(self) -> Result<(), FetchError> {
        debug!(path = %self.path.display(), "discarding partial-download record");
        drop(self.file);
        tokio::fs::remove_file(&self.path)
            .await
            .map_err(|e| FetchError::io(&self.path, e))
    }

    /// Consumes the record, handing the open file, its path, and the payload
    /// start offset to the publisher.
    pub(crate) fn into_parts(self) -> (File, PathBuf, u64, PartialMetadata) {
        (self.file, self.path, self.header_len, self.metadata)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use futures_util::stream;
    use tempfile::TempDir;

    use super::*;

    fn sample_metadata() -> PartialMetadata {
        PartialMetadata {
            expected_len: 11,
            last_modified: Some(UNIX_EPOCH + Duration::from_secs(1_600_000_000)),
        }
    }

    fn ok_chunks(
        chunks: &[&'static [u8]],
    ) -> impl Stream<Item = Result<&'static [u8], FetchError>> + Unpin {
        stream::iter(chunks.iter().map(|c| Ok(*c)).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn test_open_absent_file_returns_none() {
        let tmp = TempDir::new().unwrap();
        let result = TempRecord::open(&tmp.path().join("missing.part")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_create_then_open_round_trips_metadata() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("photo.jpg.part");
        let metadata = sample_metadata();

        let record = TempRecord::create(&path, metadata).await.unwrap();
        assert_eq!(record.payload_offset(), 0);
        drop(record);

        let reopened = TempRecord::open(&path).await.unwrap().unwrap();
        assert_eq!(*reopened.metadata(), metadata);
        assert_eq!(reopened.payload_offset(), 0);
    }

    #[tokio::test]
    async fn test_append_advances_payload_offset() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("photo.jpg.part");

        let mut record = TempRecord::create(&path, sample_metadata()).await.unwrap();
        let appended = record.append_from(ok_chunks(&[b"hello", b" worl"])).await.unwrap();
        assert_eq!(appended, 10);
        assert_eq!(record.payload_offset(), 10);

        // A reopened handle sees the same durably staged tail.
        drop(record);
        let reopened = TempRecord::open(&path).await.unwrap().unwrap();
        assert_eq!(reopened.payload_offset(), 10);
    }

    #[tokio::test]
    async fn test_append_resumes_at_end_of_existing_payload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("photo.jpg.part");

        let mut record = TempRecord::create(&path, sample_metadata()).await.unwrap();
        record.append_from(ok_chunks(&[b"hello "])).await.unwrap();
        drop(record);

        let mut reopened = TempRecord::open(&path).await.unwrap().unwrap();
        reopened.append_from(ok_chunks(&[b"world"])).await.unwrap();
        assert_eq!(reopened.payload_offset(), 11);

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.ends_with(b"hello world"));
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_written_prefix_resumable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("photo.jpg.part");

        let mut record = TempRecord::create(&path, sample_metadata()).await.unwrap();
        let body = stream::iter(vec![
            Ok(b"hel" as &[u8]),
            Err(FetchError::missing_body("http://example/x", 11)),
        ]);
        let result = record.append_from(body).await;
        assert!(result.is_err());
        assert_eq!(record.payload_offset(), 3);

        drop(record);
        let reopened = TempRecord::open(&path).await.unwrap().unwrap();
        assert_eq!(reopened.payload_offset(), 3);
    }

    #[tokio::test]
    async fn test_open_corrupt_header_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("photo.jpg.part");
        std::fs::write(&path, [0x00, 0x05, b'n', b'o', b'p', b'e', b'!']).unwrap();

        let result = TempRecord::open(&path).await;
        assert!(matches!(result, Err(FetchError::CorruptMetadata { .. })));
    }

    #[tokio::test]
    async fn test_discard_removes_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("photo.jpg.part");

        let record = TempRecord::create(&path, sample_metadata()).await.unwrap();
        record.discard().await.unwrap();
        assert!(!path.exists());
    }
}
