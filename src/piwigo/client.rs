//! Piwigo web-service client: session login and album listing.

use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, SET_COOKIE};
use tokio::sync::Mutex;
use url::Url;
use tracing::{debug, info, instrument};

use super::model::{Envelope, GetImagesResult};

/// How long a login cookie is trusted before logging in again (5 hours).
const SESSION_TTL: Duration = Duration::from_secs(5 * 3600);

/// Name of the Piwigo session cookie.
const COOKIE_NAME: &str = "pwg_id";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors from the Piwigo web service.
#[derive(Debug, thiserror::Error)]
pub enum PiwigoError {
    /// The request never produced a response.
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered outside the 2xx range.
    #[error("{url} answered HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// The service answered `stat: fail`.
    #[error("{method} failed (err {code}): {message}")]
    Api {
        method: String,
        code: i64,
        message: String,
    },

    /// A `stat: ok` response arrived without its result payload.
    #[error("{method} answered ok without a result")]
    MissingResult { method: String },

    /// Login succeeded but no `pwg_id` cookie was offered.
    #[error("login response carried no {COOKIE_NAME} cookie")]
    MissingSessionCookie,
}

impl PiwigoError {
    fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    fn http_status(url: impl Into<String>, status: StatusCode) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status: status.as_u16(),
        }
    }

    fn api<T>(method: &str, envelope: &Envelope<T>) -> Self {
        Self::Api {
            method: method.to_string(),
            code: envelope.err.unwrap_or(0),
            message: envelope
                .message
                .clone()
                .unwrap_or_else(|| "unspecified error".to_string()),
        }
    }
}

/// A cached login cookie and when it was acquired.
#[derive(Debug, Clone)]
struct SessionCookie {
    value: String,
    acquired_at: Instant,
}

impl SessionCookie {
    fn is_valid(&self) -> bool {
        self.acquired_at.elapsed() < SESSION_TTL
    }
}

/// Client for one Piwigo endpoint (`.../ws.php`), with credential-backed
/// session caching.
///
/// Anonymous when the username or password is empty: requests are then sent
/// without a cookie and only public albums are visible.
#[derive(Debug)]
pub struct Client {
    http: reqwest::Client,
    ws_url: Url,
    username: String,
    password: String,
    // Serializes logins: a second caller blocks until the first login lands.
    session: Mutex<Option<SessionCookie>>,
}

impl Client {
    /// Creates a client for `ws_url`, the full web-service endpoint.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(ws_url: Url, username: impl Into<String>, password: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("piwigo-dl/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self {
            http,
            ws_url,
            username: username.into(),
            password: password.into(),
            session: Mutex::new(None),
        }
    }

    /// Returns a `Cookie` header value for authenticated requests, logging in
    /// (or reusing a cached session) as needed.
    ///
    /// Returns `Ok(None)` when the client has no credentials.
    ///
    /// # Errors
    ///
    /// Propagates login failures as [`PiwigoError`].
    pub async fn session_cookie(&self) -> Result<Option<String>, PiwigoError> {
        if self.username.is_empty() || self.password.is_empty() {
            return Ok(None);
        }

        let mut session = self.session.lock().await;
        if let Some(cookie) = session.as_ref() {
            if cookie.is_valid() {
                return Ok(Some(cookie.value.clone()));
            }
            debug!("session cookie expired, logging in again");
        }

        let cookie = self.login().await?;
        let value = cookie.value.clone();
        *session = Some(cookie);
        Ok(Some(value))
    }

    #[instrument(skip(self))]
    async fn login(&self) -> Result<SessionCookie, PiwigoError> {
        let url = self.ws_url.as_str();
        let response = self
            .http
            .post(self.ws_url.clone())
            .query(&[("method", "pwg.session.login"), ("format", "json")])
            .header(ACCEPT, "application/json")
            .form(&[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| PiwigoError::network(url, e))?;

        if response.status() != StatusCode::OK {
            return Err(PiwigoError::http_status(url, response.status()));
        }

        // The cookie lives in the response headers; take it before the body
        // read consumes the response.
        let cookie = extract_session_cookie(&response);

        let envelope: Envelope<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| PiwigoError::network(url, e))?;
        if !envelope.is_ok() {
            return Err(PiwigoError::api("pwg.session.login", &envelope));
        }

        let value = cookie.ok_or(PiwigoError::MissingSessionCookie)?;
        info!("logged in as {}", self.username);
        Ok(SessionCookie {
            value,
            acquired_at: Instant::now(),
        })
    }

    /// Fetches one page of an album's image listing, ordered by image id.
    ///
    /// # Errors
    ///
    /// Returns [`PiwigoError`] on transport failure, a non-200 status, a
    /// `stat: fail` envelope, or an ok envelope missing its result.
    #[instrument(skip(self))]
    pub async fn get_images(
        &self,
        album_id: &str,
        page: u64,
        per_page: u64,
    ) -> Result<GetImagesResult, PiwigoError> {
        const METHOD: &str = "pwg.categories.getImages";

        let cookie = self.session_cookie().await?;
        let url = self.ws_url.as_str();

        let mut request = self
            .http
            .get(self.ws_url.clone())
            .query(&[
                ("method", METHOD),
                ("format", "json"),
                ("cat_id", album_id),
                ("page", &page.to_string()),
                ("per_page", &per_page.to_string()),
                ("order", "id"),
            ])
            .header(ACCEPT, "application/json");
        if let Some(cookie) = cookie {
            request = request.header(reqwest::header::COOKIE, cookie);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PiwigoError::network(url, e))?;
        if response.status() != StatusCode::OK {
            return Err(PiwigoError::http_status(url, response.status()));
        }

        let envelope: Envelope<GetImagesResult> = response
            .json()
            .await
            .map_err(|e| PiwigoError::network(url, e))?;
        if !envelope.is_ok() {
            return Err(PiwigoError::api(METHOD, &envelope));
        }
        envelope.result.ok_or_else(|| PiwigoError::MissingResult {
            method: METHOD.to_string(),
        })
    }
}

/// Pulls the `pwg_id` cookie pair out of the `Set-Cookie` headers.
fn extract_session_cookie(response: &reqwest::Response) -> Option<String> {
    let tag = format!("{COOKIE_NAME}=");
    for header in response.headers().get_all(SET_COOKIE) {
        let Ok(text) = header.to_str() else { continue };
        let Some(start) = text.find(&tag) else { continue };
        let rest = &text[start..];
        let pair = rest.split(';').next().unwrap_or(rest);
        return Some(pair.to_string());
    }
    None
}
