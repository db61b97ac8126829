//! Wire types for the Piwigo web-service JSON responses.

use serde::Deserialize;

/// Outer envelope every Piwigo web-service response is wrapped in.
///
/// `stat` is `"ok"` on success; on failure `err` and `message` describe the
/// problem and `result` is absent.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Envelope<T> {
    pub stat: String,
    #[serde(default)]
    pub err: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result: Option<T>,
}

impl<T> Envelope<T> {
    /// Whether the service reported success.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.stat == "ok"
    }
}

/// Pagination block of a `pwg.categories.getImages` result.
#[derive(Debug, Deserialize)]
pub struct Paging {
    pub page: u64,
    pub per_page: u64,
    pub count: u64,
}

/// One image entry of a `pwg.categories.getImages` result.
///
/// Only the fields the downloader consumes are modeled; the service returns
/// many more, which serde ignores.
#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    pub id: u64,
    pub file: String,
    #[serde(default)]
    pub name: Option<String>,
    pub element_url: String,
}

/// Result payload of `pwg.categories.getImages`.
#[derive(Debug, Deserialize)]
pub struct GetImagesResult {
    pub paging: Paging,
    pub images: Vec<Image>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_envelope_parses_result() {
        let body = r#"{
            "stat": "ok",
            "result": {
                "paging": {"page": 0, "per_page": 100, "count": 1},
                "images": [
                    {"id": 42, "file": "sunset.jpg", "name": "Sunset",
                     "element_url": "https://gallery.example/upload/sunset.jpg",
                     "width": 4000, "height": 3000}
                ]
            }
        }"#;
        let envelope: Envelope<GetImagesResult> = serde_json::from_str(body).unwrap();
        assert!(envelope.is_ok());

        let result = envelope.result.unwrap();
        assert_eq!(result.paging.count, 1);
        assert_eq!(result.images[0].id, 42);
        assert_eq!(result.images[0].file, "sunset.jpg");
    }

    #[test]
    fn test_fail_envelope_parses_error_fields() {
        let body = r#"{"stat": "fail", "err": 999, "message": "Invalid security token"}"#;
        let envelope: Envelope<GetImagesResult> = serde_json::from_str(body).unwrap();
        assert!(!envelope.is_ok());
        assert_eq!(envelope.err, Some(999));
        assert_eq!(envelope.message.as_deref(), Some("Invalid security token"));
        assert!(envelope.result.is_none());
    }

    #[test]
    fn test_image_without_name_parses() {
        let body = r#"{"id": 7, "file": "a.png", "element_url": "https://x/a.png"}"#;
        let image: Image = serde_json::from_str(body).unwrap();
        assert!(image.name.is_none());
    }
}
