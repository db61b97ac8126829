//! Album download orchestration: list an album's images, give each a unique
//! local filename, and fetch them one at a time.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use tracing::{debug, info, instrument};

use crate::fetch::{FetchError, FetchOutcome, Fetcher};
use crate::piwigo::{Client, PiwigoError};

/// Images requested per listing page.
const PAGE_SIZE: u64 = 100;

/// Errors from downloading an album.
#[derive(Debug, thiserror::Error)]
pub enum AlbumError {
    /// The Piwigo web service failed.
    #[error(transparent)]
    Api(#[from] PiwigoError),

    /// Downloading one image failed.
    #[error("downloading {file} failed: {source}")]
    Fetch {
        file: String,
        #[source]
        source: FetchError,
    },

    /// A local filesystem operation failed.
    #[error("filesystem operation on {path} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The session cookie cannot be carried as an HTTP header.
    #[error("session cookie is not a valid header value")]
    InvalidCookie,
}

impl AlbumError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// One image to download: its id, unique local filename, and source URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumImage {
    pub id: u64,
    pub file: String,
    pub url: String,
}

/// Outcome counts for one album run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AlbumStats {
    /// Images listed in the album.
    pub images: usize,
    /// Images downloaded in full.
    pub downloaded: usize,
    /// Images completed from a partial download.
    pub resumed: usize,
    /// Images already up to date locally.
    pub unchanged: usize,
}

/// Lists every image of an album, paginating until the service returns an
/// empty page.
///
/// Listing order follows first appearance (the service orders by id). An id
/// seen on a later page updates the earlier entry in place rather than
/// duplicating it; distinct images sharing a filename get `stem_id.ext`
/// names so they cannot overwrite each other on disk.
///
/// # Errors
///
/// Propagates [`PiwigoError`] from any listing page.
#[instrument(skip(client))]
pub async fn list_album(client: &Client, album_id: &str) -> Result<Vec<AlbumImage>, AlbumError> {
    let mut images: Vec<AlbumImage> = Vec::new();
    let mut by_id: HashMap<u64, usize> = HashMap::new();
    let mut names: HashSet<String> = HashSet::new();

    let mut page = 0;
    loop {
        let result = client.get_images(album_id, page, PAGE_SIZE).await?;
        if result.images.is_empty() {
            break;
        }
        debug!(page, count = result.images.len(), "listed album page");
        page += 1;

        for image in result.images {
            let file = unique_name(&mut names, image.id, &safe_name(image.id, &image.file));
            names.insert(file.clone());

            if let Some(&index) = by_id.get(&image.id) {
                images[index].url = image.element_url;
                images[index].file = file;
            } else {
                by_id.insert(image.id, images.len());
                images.push(AlbumImage {
                    id: image.id,
                    file,
                    url: image.element_url,
                });
            }
        }
    }
    Ok(images)
}

/// Downloads every image of `album_id` into `<output_root>/<album_id>/`,
/// sequentially, resuming or skipping files that are already current.
///
/// # Errors
///
/// Stops at the first failure: a listing error, a directory creation error,
/// or a fetch error for one image (earlier images stay published, the failed
/// one stays resumable).
#[instrument(skip(client, fetcher, output_root), fields(output_root = %output_root.display()))]
pub async fn download_album(
    client: &Client,
    fetcher: &Fetcher,
    output_root: &Path,
    album_id: &str,
) -> Result<AlbumStats, AlbumError> {
    let dir = output_root.join(album_id);
    info!(dir = %dir.display(), "downloading album");
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| AlbumError::io(&dir, e))?;

    let images = list_album(client, album_id).await?;
    info!(count = images.len(), "album listed");

    let headers = session_headers(client).await?;
    let mut stats = AlbumStats {
        images: images.len(),
        ..AlbumStats::default()
    };

    for (i, image) in images.iter().enumerate() {
        info!(
            "{}/{} id={} file={}",
            i + 1,
            images.len(),
            image.id,
            image.file
        );
        let destination = dir.join(&image.file);
        let outcome = fetcher
            .fetch(&destination, &image.url, &headers)
            .await
            .map_err(|source| AlbumError::Fetch {
                file: image.file.clone(),
                source,
            })?;
        match outcome {
            FetchOutcome::Downloaded { .. } => stats.downloaded += 1,
            FetchOutcome::Resumed { .. } => stats.resumed += 1,
            FetchOutcome::NotModified => stats.unchanged += 1,
        }
    }
    Ok(stats)
}

/// Headers carried on every image request: the session cookie when logged in.
async fn session_headers(client: &Client) -> Result<HeaderMap, AlbumError> {
    let mut headers = HeaderMap::new();
    if let Some(cookie) = client.session_cookie().await? {
        let value = HeaderValue::from_str(&cookie).map_err(|_| AlbumError::InvalidCookie)?;
        headers.insert(COOKIE, value);
    }
    Ok(headers)
}

/// Replaces a server-supplied filename that could escape the album directory.
fn safe_name(id: u64, file: &str) -> String {
    if file.is_empty() || file.contains(['/', '\\']) || file.contains("..") {
        format!("image_{id}")
    } else {
        file.to_string()
    }
}

/// Returns `file` unchanged when free, otherwise `stem_id.ext`.
fn unique_name(names: &mut HashSet<String>, id: u64, file: &str) -> String {
    if !names.contains(file) {
        names.insert(file.to_string());
        return file.to_string();
    }
    let (stem, ext) = split_filename(file);
    format!("{stem}_{id}{ext}")
}

/// Splits at the last dot; the extension keeps its dot, or is empty.
fn split_filename(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) => (&name[..i], &name[i..]),
        None => (name, ""),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_split_filename_with_extension() {
        assert_eq!(split_filename("photo.jpg"), ("photo", ".jpg"));
    }

    #[test]
    fn test_split_filename_without_extension() {
        assert_eq!(split_filename("README"), ("README", ""));
    }

    #[test]
    fn test_split_filename_keeps_earlier_dots_in_stem() {
        assert_eq!(split_filename("archive.tar.gz"), ("archive.tar", ".gz"));
    }

    #[test]
    fn test_safe_name_passes_ordinary_filenames() {
        assert_eq!(safe_name(1, "photo.jpg"), "photo.jpg");
    }

    #[test]
    fn test_safe_name_rejects_traversal() {
        assert_eq!(safe_name(9, "../etc/passwd"), "image_9");
        assert_eq!(safe_name(9, "a/b.jpg"), "image_9");
        assert_eq!(safe_name(9, "a\\b.jpg"), "image_9");
        assert_eq!(safe_name(9, ""), "image_9");
    }

    #[test]
    fn test_unique_name_first_use_is_verbatim() {
        let mut names = HashSet::new();
        assert_eq!(unique_name(&mut names, 1, "photo.jpg"), "photo.jpg");
    }

    #[test]
    fn test_unique_name_collision_appends_id() {
        let mut names = HashSet::new();
        assert_eq!(unique_name(&mut names, 1, "photo.jpg"), "photo.jpg");
        assert_eq!(unique_name(&mut names, 2, "photo.jpg"), "photo_2.jpg");
    }
}
