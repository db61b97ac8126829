//! Error types for the fetch module.
//!
//! Every failure of a single fetch call maps onto exactly one of these
//! variants; the fetcher performs no retries and no backoff, so each error
//! is surfaced once to the caller with its full context attached.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching one remote resource to disk.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level error reaching the server (DNS, connect, TLS, broken stream).
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// Response status outside the recognized set for the current state.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned the status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// A short prefix of the response body, when one was readable.
        snippet: Option<String>,
    },

    /// Local filesystem failure (open/read/write/rename/remove).
    #[error("IO error at {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Partial-download metadata cannot be represented in the wire format.
    #[error("invalid partial-download metadata: {reason}")]
    InvalidMetadata {
        /// Why the record is unrepresentable.
        reason: String,
    },

    /// An existing temporary file's header does not parse per the schema.
    #[error("corrupt partial-download metadata in {path}: {reason}")]
    CorruptMetadata {
        /// The temporary file whose header failed to parse.
        path: PathBuf,
        /// Parse failure detail.
        reason: String,
    },

    /// A 206 response delivered fewer payload bytes than the record required.
    #[error("short read for {path}: expected {expected} payload bytes, got {actual}")]
    ShortRead {
        /// The temporary file left behind (still resumable).
        path: PathBuf,
        /// Total payload bytes the record expects.
        expected: u64,
        /// Payload bytes actually staged.
        actual: u64,
    },

    /// A success status arrived with no readable body bytes at all.
    #[error("empty body from {url}: server advertised {advertised} bytes but sent none")]
    MissingBody {
        /// The URL whose response carried no body.
        url: String,
        /// The Content-Length the server claimed.
        advertised: u64,
    },
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error with an optional body snippet.
    pub fn http_status(url: impl Into<String>, status: u16, snippet: Option<String>) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            snippet,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid-metadata error.
    pub fn invalid_metadata(reason: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            reason: reason.into(),
        }
    }

    /// Creates a corrupt-metadata error.
    pub fn corrupt_metadata(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptMetadata {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a short-read error.
    pub fn short_read(path: impl Into<PathBuf>, expected: u64, actual: u64) -> Self {
        Self::ShortRead {
            path: path.into(),
            expected,
            actual,
        }
    }

    /// Creates a missing-body error.
    pub fn missing_body(url: impl Into<String>, advertised: u64) -> Self {
        Self::MissingBody {
            url: url.into(),
            advertised,
        }
    }
}

// Note on From trait implementations:
// There is intentionally no `From<std::io::Error>` or `From<reqwest::Error>`
// here. The variants require context (url, path) that the source errors do
// not carry, so callers go through the helper constructors instead.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_display_includes_status_and_url() {
        let error = FetchError::http_status("https://example.com/a.jpg", 418, None);
        let msg = error.to_string();
        assert!(msg.contains("418"), "Expected '418' in: {msg}");
        assert!(
            msg.contains("https://example.com/a.jpg"),
            "Expected URL in: {msg}"
        );
    }

    #[test]
    fn test_io_display_includes_path() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = FetchError::io(PathBuf::from("/tmp/photo.jpg.part"), io_error);
        let msg = error.to_string();
        assert!(msg.contains("/tmp/photo.jpg.part"), "Expected path in: {msg}");
    }

    #[test]
    fn test_short_read_display_includes_counts() {
        let error = FetchError::short_read("/tmp/x.part", 100, 42);
        let msg = error.to_string();
        assert!(msg.contains("100"), "Expected expected-count in: {msg}");
        assert!(msg.contains("42"), "Expected actual-count in: {msg}");
    }

    #[test]
    fn test_corrupt_metadata_display_includes_reason() {
        let error = FetchError::corrupt_metadata("/tmp/x.part", "missing field `l`");
        let msg = error.to_string();
        assert!(msg.contains("missing field `l`"), "Expected reason in: {msg}");
    }

    #[test]
    fn test_missing_body_display_includes_advertised_length() {
        let error = FetchError::missing_body("https://example.com/a.jpg", 512);
        let msg = error.to_string();
        assert!(msg.contains("512"), "Expected advertised length in: {msg}");
    }
}
