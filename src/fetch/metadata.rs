//! Fixed-format header describing a partial download.
//!
//! The temporary file starts with a 2-byte big-endian length prefix followed
//! by that many bytes of a UTF-8 JSON record `{"l": <total length>, "m":
//! <unix seconds, 0 = unknown>}`. Everything after the header is raw payload
//! bytes already downloaded.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::FetchError;

/// Size of the big-endian length prefix in bytes.
const PREFIX_LEN: usize = 2;

/// Metadata a partial download was started against.
///
/// `expected_len` is the full remote content length observed when the
/// partial download began; it never changes for the life of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialMetadata {
    /// Full remote content length in bytes.
    pub expected_len: u64,
    /// Remote `Last-Modified` timestamp, when the server supplied one.
    pub last_modified: Option<SystemTime>,
}

/// On-disk JSON shape of the record. `m == 0` means "unknown".
#[derive(Debug, Serialize, Deserialize)]
struct WireRecord {
    l: u64,
    m: u64,
}

/// Encodes metadata into the length-prefixed wire format.
///
/// # Errors
///
/// Returns [`FetchError::InvalidMetadata`] when the timestamp predates the
/// Unix epoch or the encoded record exceeds the 2-byte length prefix.
pub fn encode(metadata: &PartialMetadata) -> Result<Vec<u8>, FetchError> {
    let m = match metadata.last_modified {
        None => 0,
        Some(t) => t
            .duration_since(UNIX_EPOCH)
            .map_err(|_| FetchError::invalid_metadata("last-modified predates the Unix epoch"))?
            .as_secs(),
    };
    let record = serde_json::to_vec(&WireRecord {
        l: metadata.expected_len,
        m,
    })
    .map_err(|e| FetchError::invalid_metadata(e.to_string()))?;

    let len = u16::try_from(record.len()).map_err(|_| {
        FetchError::invalid_metadata(format!("record of {} bytes exceeds prefix range", record.len()))
    })?;

    let mut buf = Vec::with_capacity(PREFIX_LEN + record.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&record);
    Ok(buf)
}

/// Decodes a header from an in-memory buffer.
///
/// Returns the metadata and the header length (prefix + record) in bytes.
///
/// # Errors
///
/// Returns [`FetchError::CorruptMetadata`] when fewer bytes are available
/// than the prefix claims or a required field is absent or mistyped.
pub fn decode(path: &Path, buf: &[u8]) -> Result<(PartialMetadata, u64), FetchError> {
    if buf.len() < PREFIX_LEN {
        return Err(FetchError::corrupt_metadata(path, "missing length prefix"));
    }
    let record_len = usize::from(u16::from_be_bytes([buf[0], buf[1]]));
    let Some(record) = buf.get(PREFIX_LEN..PREFIX_LEN + record_len) else {
        return Err(FetchError::corrupt_metadata(
            path,
            format!("prefix claims {record_len} record bytes, fewer available"),
        ));
    };
    let metadata = parse_record(path, record)?;
    Ok((metadata, (PREFIX_LEN + record_len) as u64))
}

/// Reads and decodes a header from the start of an open file.
///
/// Reads exactly 2 prefix bytes, then exactly the claimed record length.
///
/// # Errors
///
/// Returns [`FetchError::CorruptMetadata`] when the file is shorter than the
/// header it claims or the record does not match the schema; any other read
/// failure propagates as [`FetchError::Io`].
pub async fn read_from<R>(path: &Path, reader: &mut R) -> Result<(PartialMetadata, u64), FetchError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; PREFIX_LEN];
    read_exact_header(path, reader, &mut prefix).await?;
    let record_len = usize::from(u16::from_be_bytes(prefix));

    let mut record = vec![0u8; record_len];
    read_exact_header(path, reader, &mut record).await?;

    let metadata = parse_record(path, &record)?;
    Ok((metadata, (PREFIX_LEN + record_len) as u64))
}

/// `read_exact` with truncation mapped to `CorruptMetadata` rather than `Io`.
async fn read_exact_header<R>(path: &Path, reader: &mut R, buf: &mut [u8]) -> Result<(), FetchError>
where
    R: AsyncRead + Unpin,
{
    reader.read_exact(buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            FetchError::corrupt_metadata(path, "file shorter than its header claims")
        } else {
            FetchError::io(path, e)
        }
    })?;
    Ok(())
}

fn parse_record(path: &Path, record: &[u8]) -> Result<PartialMetadata, FetchError> {
    let wire: WireRecord = serde_json::from_slice(record)
        .map_err(|e| FetchError::corrupt_metadata(path, e.to_string()))?;
    let last_modified = if wire.m == 0 {
        None
    } else {
        Some(UNIX_EPOCH + Duration::from_secs(wire.m))
    };
    Ok(PartialMetadata {
        expected_len: wire.l,
        last_modified,
    })
}
