//! Resumable, cache-aware single-file fetcher.
//!
//! One `fetch` call reconciles three independent truths — the destination
//! file's modification time, the local partial-download record, and the
//! server's current state — into one safe action: a no-op, a resumed
//! transfer, or a fresh download, always finished by an atomic rename.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use futures_util::{Stream, StreamExt};
use reqwest::header::{HeaderMap, IF_MODIFIED_SINCE, IF_RANGE, LAST_MODIFIED, RANGE};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, info, instrument, warn};

use super::decision::{Action, plan};
use super::error::FetchError;
use super::metadata::PartialMetadata;
use super::publish;
use super::record::TempRecord;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default whole-request timeout (5 minutes, sized for large photos).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Suffix of the partial-download file next to the destination.
pub const PART_SUFFIX: &str = ".part";

/// Maximum characters of an error response body kept for diagnostics.
const SNIPPET_LEN: usize = 200;

const USER_AGENT: &str = concat!("piwigo-dl/", env!("CARGO_PKG_VERSION"));

/// Returns the partial-download path for a destination (`<destination>.part`).
#[must_use]
pub fn part_path(destination: &Path) -> PathBuf {
    let mut s = destination.as_os_str().to_os_string();
    s.push(PART_SUFFIX);
    PathBuf::from(s)
}

/// Terminal state of a successful fetch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The destination already reflects the remote state; nothing was written.
    NotModified,
    /// A full body was downloaded and promoted to the destination.
    Downloaded {
        /// Payload bytes promoted.
        bytes: u64,
    },
    /// An existing partial download was completed (or promoted) and published.
    Resumed {
        /// Payload bytes promoted.
        bytes: u64,
    },
}

/// HTTP fetcher for downloading one file per call, with resume support.
///
/// Designed to be created once and reused across downloads to benefit from
/// connection pooling. A single call issues at most two requests (a resume
/// that falls back to a fresh download); there is no internal retry loop.
///
/// Callers must not run two calls against the same destination path
/// concurrently; distinct destinations are independent.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher {
    /// Creates a fetcher with default timeouts.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a fetcher with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        // No transparent decompression here: Content-Length and Range offsets
        // must stay byte-accurate against the stored record.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .gzip(false)
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Fetches `url` to `destination`, resuming or skipping work where the
    /// local state allows it.
    ///
    /// `headers` are attached verbatim to every request the call issues
    /// (typically a session cookie).
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] per the taxonomy in [`super::error`]; the
    /// call performs no retries. On error the local state is one of: an
    /// untouched previous destination, a resumable partial file, or (rarely,
    /// between staging and rename) a stray staging file — never a corrupted
    /// destination.
    #[instrument(skip(self, headers), fields(destination = %destination.display(), url = %url))]
    pub async fn fetch(
        &self,
        destination: &Path,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<FetchOutcome, FetchError> {
        let temp_path = part_path(destination);
        let dest_mtime = stat_mtime(destination).await?;
        let record = TempRecord::open(&temp_path).await?;

        let action = plan(dest_mtime, record.as_ref().map(TempRecord::metadata));
        debug!(?action, "planned fetch action");

        match (action, record) {
            (Action::Fresh, record) => {
                // A record without a usable last-modified cannot be validated
                // against the server; creating the fresh temp file truncates it.
                drop(record);
                self.fresh(destination, &temp_path, url, headers, None).await
            }
            (Action::Resume, Some(record)) => {
                self.resume(destination, &temp_path, url, headers, record)
                    .await
            }
            // plan() never yields Resume without a record.
            (Action::Resume, None) => self.fresh(destination, &temp_path, url, headers, None).await,
            (Action::Refresh { since }, record) => {
                drop(record);
                self.refresh(destination, &temp_path, url, headers, since)
                    .await
            }
            (Action::DiscardThenRefresh { since }, Some(record)) => {
                record.discard().await?;
                self.refresh(destination, &temp_path, url, headers, since)
                    .await
            }
            (Action::DiscardThenRefresh { since }, None) => {
                self.refresh(destination, &temp_path, url, headers, since)
                    .await
            }
        }
    }

    /// Unconditional download of the full body into a fresh temporary file,
    /// then promotion. `response` carries a 200 already received by a
    /// conditional request that found the cached state unusable.
    async fn fresh(
        &self,
        destination: &Path,
        temp_path: &Path,
        url: &str,
        headers: &HeaderMap,
        response: Option<Response>,
    ) -> Result<FetchOutcome, FetchError> {
        let response = match response {
            Some(response) => response,
            None => {
                debug!("fresh request");
                self.send(url, self.request(url, headers)).await?
            }
        };
        if response.status() != StatusCode::OK {
            return Err(status_error(url, response).await);
        }

        let expected_len = response.content_length().unwrap_or(0);
        let last_modified = header_last_modified(&response);
        debug!(
            expected_len,
            last_modified = ?last_modified,
            temp = %temp_path.display(),
            "staging fresh download"
        );

        let mut record = TempRecord::create(
            temp_path,
            PartialMetadata {
                expected_len,
                last_modified,
            },
        )
        .await?;

        let url_owned = url.to_string();
        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| FetchError::network(url_owned.clone(), e)));
        stage_body(&mut record, url, expected_len, body).await?;

        let bytes = publish::publish(record, destination).await?;
        info!(bytes, "download complete");
        Ok(FetchOutcome::Downloaded { bytes })
    }

    /// Conditional GET validating the existing destination.
    async fn refresh(
        &self,
        destination: &Path,
        temp_path: &Path,
        url: &str,
        headers: &HeaderMap,
        since: SystemTime,
    ) -> Result<FetchOutcome, FetchError> {
        let since_http = httpdate::fmt_http_date(since);
        debug!(if_modified_since = %since_http, "refresh request");

        let request = self
            .request(url, headers)
            .header(IF_MODIFIED_SINCE, &since_http);
        let response = self.send(url, request).await?;

        match response.status() {
            StatusCode::NOT_MODIFIED => {
                debug!("refresh: not modified");
                Ok(FetchOutcome::NotModified)
            }
            StatusCode::OK => {
                warn!("refresh: destination is stale, downloading");
                self.fresh(destination, temp_path, url, headers, Some(response))
                    .await
            }
            _ => Err(status_error(url, response).await),
        }
    }

    /// Continues an existing record: a ranged request when payload is
    /// missing, or a validation of a fully staged body that was never
    /// promoted (e.g. a crash between staging and publish).
    async fn resume(
        &self,
        destination: &Path,
        temp_path: &Path,
        url: &str,
        headers: &HeaderMap,
        mut record: TempRecord,
    ) -> Result<FetchOutcome, FetchError> {
        let metadata = *record.metadata();
        let Some(last_modified) = metadata.last_modified else {
            // plan() only routes records with a known last-modified here.
            drop(record);
            return self.fresh(destination, temp_path, url, headers, None).await;
        };

        let offset = record.payload_offset();
        let expected = metadata.expected_len;
        if offset == expected {
            return self
                .promote_staged(destination, temp_path, url, headers, record, last_modified)
                .await;
        }

        let since_http = httpdate::fmt_http_date(last_modified);
        debug!(offset, expected, if_range = %since_http, "resume request");

        let request = self
            .request(url, headers)
            .header(IF_RANGE, &since_http)
            .header(RANGE, format!("bytes={offset}-"));
        let response = self.send(url, request).await?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => {
                debug!("resume: partial content");
                let url_owned = url.to_string();
                let body = response
                    .bytes_stream()
                    .map(move |chunk| chunk.map_err(|e| FetchError::network(url_owned.clone(), e)));
                record.append_from(body).await?;

                let staged = record.payload_offset();
                if staged != expected {
                    return Err(FetchError::short_read(temp_path, expected, staged));
                }
                let bytes = publish::publish(record, destination).await?;
                info!(bytes, resumed_from = offset, "resumed download complete");
                Ok(FetchOutcome::Resumed { bytes })
            }
            StatusCode::OK => {
                // Server ignored the range: no partial support, or the
                // representation changed under us.
                warn!("resume: server ignored range, restarting");
                drop(record);
                self.fresh(destination, temp_path, url, headers, Some(response))
                    .await
            }
            StatusCode::RANGE_NOT_SATISFIABLE => {
                warn!("resume: range no longer satisfiable, restarting");
                record.discard().await?;
                self.fresh(destination, temp_path, url, headers, None).await
            }
            _ => Err(status_error(url, response).await),
        }
    }

    /// All payload bytes are staged; ask the server whether they are still
    /// current, and promote them without re-reading the body if so.
    async fn promote_staged(
        &self,
        destination: &Path,
        temp_path: &Path,
        url: &str,
        headers: &HeaderMap,
        record: TempRecord,
        last_modified: SystemTime,
    ) -> Result<FetchOutcome, FetchError> {
        let since_http = httpdate::fmt_http_date(last_modified);
        debug!(
            expected = record.metadata().expected_len,
            if_modified_since = %since_http,
            "fully staged, validating against server"
        );

        let request = self
            .request(url, headers)
            .header(IF_MODIFIED_SINCE, &since_http);
        let response = self.send(url, request).await?;

        match response.status() {
            StatusCode::NOT_MODIFIED => {
                let bytes = publish::publish(record, destination).await?;
                info!(bytes, "promoted fully staged download");
                Ok(FetchOutcome::Resumed { bytes })
            }
            StatusCode::OK => {
                warn!("staged payload is stale, downloading");
                drop(record);
                self.fresh(destination, temp_path, url, headers, Some(response))
                    .await
            }
            _ => Err(status_error(url, response).await),
        }
    }

    fn request(&self, url: &str, headers: &HeaderMap) -> reqwest::RequestBuilder {
        self.client.get(url).headers(headers.clone())
    }

    async fn send(
        &self,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Response, FetchError> {
        request
            .send()
            .await
            .map_err(|e| FetchError::network(url, e))
    }
}

/// Streams a full body into the record, rejecting a stream that ends cleanly
/// without delivering any of the bytes the response advertised.
async fn stage_body<S, B>(
    record: &mut TempRecord,
    url: &str,
    expected_len: u64,
    body: S,
) -> Result<u64, FetchError>
where
    S: Stream<Item = Result<B, FetchError>> + Unpin,
    B: AsRef<[u8]>,
{
    let written = record.append_from(body).await?;
    if expected_len > 0 && written == 0 {
        return Err(FetchError::missing_body(url, expected_len));
    }
    Ok(written)
}

/// Builds the fatal error for a status outside the recognized set, keeping a
/// short body snippet for diagnostics.
async fn status_error(url: &str, response: Response) -> FetchError {
    let status = response.status().as_u16();
    let snippet = response
        .text()
        .await
        .ok()
        .map(|text| text.chars().take(SNIPPET_LEN).collect::<String>())
        .filter(|s| !s.is_empty());
    FetchError::http_status(url, status, snippet)
}

/// Modification time of an existing file, `None` when absent.
async fn stat_mtime(path: &Path) -> Result<Option<SystemTime>, FetchError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => {
            let mtime = meta.modified().map_err(|e| FetchError::io(path, e))?;
            Ok(Some(mtime))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(FetchError::io(path, e)),
    }
}

fn header_last_modified(response: &Response) -> Option<SystemTime> {
    response
        .headers()
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_part_path_appends_suffix() {
        assert_eq!(
            part_path(Path::new("/albums/12/photo.jpg")),
            PathBuf::from("/albums/12/photo.jpg.part")
        );
    }

    #[test]
    fn test_part_path_keeps_existing_extension() {
        let p = part_path(Path::new("photo.jpg"));
        assert_eq!(p, PathBuf::from("photo.jpg.part"));
    }

    #[tokio::test]
    async fn test_stat_mtime_absent_file_is_none() {
        let tmp = TempDir::new().unwrap();
        let mtime = stat_mtime(&tmp.path().join("missing")).await.unwrap();
        assert!(mtime.is_none());
    }

    #[tokio::test]
    async fn test_stat_mtime_existing_file_is_some() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("present");
        std::fs::write(&path, b"x").unwrap();
        let mtime = stat_mtime(&path).await.unwrap();
        assert!(mtime.is_some());
    }

    fn empty_body() -> impl Stream<Item = Result<&'static [u8], FetchError>> + Unpin {
        futures_util::stream::iter(Vec::new())
    }

    #[tokio::test]
    async fn test_stage_body_rejects_clean_empty_stream_with_advertised_length() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("img.jpg.part");
        let mut record = TempRecord::create(
            &path,
            PartialMetadata {
                expected_len: 5,
                last_modified: None,
            },
        )
        .await
        .unwrap();

        let err = stage_body(&mut record, "http://gallery.example/img.jpg", 5, empty_body())
            .await
            .unwrap_err();

        match err {
            FetchError::MissingBody { advertised, .. } => assert_eq!(advertised, 5),
            other => panic!("expected MissingBody, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stage_body_accepts_empty_stream_when_length_is_unknown() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("img.jpg.part");
        let mut record = TempRecord::create(
            &path,
            PartialMetadata {
                expected_len: 0,
                last_modified: None,
            },
        )
        .await
        .unwrap();

        let written = stage_body(&mut record, "http://gallery.example/img.jpg", 0, empty_body())
            .await
            .unwrap();
        assert_eq!(written, 0);
    }

    #[tokio::test]
    async fn test_stage_body_passes_through_delivered_bytes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("img.jpg.part");
        let mut record = TempRecord::create(
            &path,
            PartialMetadata {
                expected_len: 4,
                last_modified: None,
            },
        )
        .await
        .unwrap();

        let body = futures_util::stream::iter(vec![Ok::<&'static [u8], FetchError>(b"data")]);
        let written = stage_body(&mut record, "http://gallery.example/img.jpg", 4, body)
            .await
            .unwrap();
        assert_eq!(written, 4);
        assert_eq!(record.payload_offset(), 4);
    }
}
