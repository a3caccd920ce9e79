//! HTTP client for CalDAV operations.
//!
//! Wraps `reqwest` with the WebDAV verbs the provider needs (PROPFIND,
//! REPORT, GET, PUT, DELETE), Basic/Digest authentication, and the
//! concurrency preconditions for writes: `If-None-Match: *` on create and
//! `If-Match: <etag>` on update/delete. A failed precondition surfaces as a
//! 412 error, never a silent overwrite.

use reqwest::{Client, Method, Response, StatusCode};
use tracing::{debug, trace, warn};

use crate::error::{ProviderError, ProviderResult, code_for_status};

use super::auth::Authenticator;
use super::config::CalDavConfig;

/// Write precondition carried as a concurrency header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// The target must not exist yet (`If-None-Match: *`).
    TargetAbsent,
    /// The stored entity must still carry this etag (`If-Match`).
    EtagMatches(String),
}

/// HTTP client for CalDAV operations.
pub struct CalDavClient {
    /// The underlying HTTP client.
    client: Client,
    /// Configuration.
    config: CalDavConfig,
    /// Negotiated authentication state.
    auth: Authenticator,
}

impl CalDavClient {
    /// Creates a new CalDAV client with the given configuration.
    pub fn new(config: CalDavConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| ProviderError::network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            auth: Authenticator::default(),
        })
    }

    /// Performs a PROPFIND request (discovery and property retrieval).
    pub async fn propfind(&mut self, url: &str, body: &str, depth: u8) -> ProviderResult<String> {
        let response = self
            .send("PROPFIND", url, Some(body), Some(depth), None)
            .await?;
        read_body(response).await
    }

    /// Performs a REPORT request (calendar-query, sync-collection).
    pub async fn report(&mut self, url: &str, body: &str) -> ProviderResult<String> {
        let response = self.send("REPORT", url, Some(body), Some(1), None).await?;
        read_body(response).await
    }

    /// Fetches a single entity, returning its body and etag.
    pub async fn get(&mut self, url: &str) -> ProviderResult<(String, Option<String>)> {
        let response = self.send("GET", url, None, None, None).await?;
        let etag = etag_header(&response);
        let body = read_body(response).await?;
        Ok((body, etag))
    }

    /// Stores an iCalendar entity under the write precondition.
    ///
    /// Returns the new etag when the server reports one; some servers omit
    /// it, forcing a refetch before the next guarded write.
    pub async fn put(
        &mut self,
        url: &str,
        ics: &str,
        precondition: Precondition,
    ) -> ProviderResult<Option<String>> {
        let response = self
            .send("PUT", url, Some(ics), None, Some(&precondition))
            .await?;
        complete_write(response).await
    }

    /// Deletes an entity guarded by its etag.
    pub async fn delete(&mut self, url: &str, etag: &str) -> ProviderResult<()> {
        let precondition = Precondition::EtagMatches(etag.to_string());
        let response = self
            .send("DELETE", url, None, None, Some(&precondition))
            .await?;
        complete_write(response).await.map(|_| ())
    }

    /// Sends a request, answering an authentication challenge once.
    async fn send(
        &mut self,
        method: &str,
        url: &str,
        body: Option<&str>,
        depth: Option<u8>,
        precondition: Option<&Precondition>,
    ) -> ProviderResult<Response> {
        let response = self
            .send_once(method, url, body, depth, precondition)
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let challenge = response
            .headers()
            .get("www-authenticate")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let Some(challenge) = challenge else {
            return Err(ProviderError::authentication(
                "server returned 401 without a WWW-Authenticate challenge",
            ));
        };

        debug!(method, url, "answering authentication challenge");
        if !self.auth.accept_challenge(&challenge) && !self.config.has_credentials() {
            return Err(ProviderError::authentication(
                "server requires an authentication scheme we cannot satisfy",
            ));
        }

        self.send_once(method, url, body, depth, precondition).await
    }

    /// Builds and sends one HTTP request.
    async fn send_once(
        &mut self,
        method: &str,
        url: &str,
        body: Option<&str>,
        depth: Option<u8>,
        precondition: Option<&Precondition>,
    ) -> ProviderResult<Response> {
        let http_method = Method::from_bytes(method.as_bytes())
            .map_err(|_| ProviderError::internal(format!("invalid HTTP method: {}", method)))?;

        let mut request = self.client.request(http_method, url);

        if body.is_some() {
            let content_type = if method == "PUT" {
                "text/calendar; charset=utf-8"
            } else {
                "application/xml; charset=utf-8"
            };
            request = request.header("Content-Type", content_type);
        }

        if let Some(d) = depth {
            request = request.header("Depth", d.to_string());
        }

        match precondition {
            Some(Precondition::TargetAbsent) => {
                request = request.header("If-None-Match", "*");
            }
            Some(Precondition::EtagMatches(etag)) => {
                request = request.header("If-Match", quote_etag(etag));
            }
            None => {}
        }

        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            let uri_path = url::Url::parse(url)
                .map(|u| u.path().to_string())
                .unwrap_or_else(|_| url.to_string());
            if let Some(header) = self.auth.authorize(method, &uri_path, username, password) {
                request = request.header("Authorization", header);
            }
        }

        if let Some(b) = body {
            request = request.body(b.to_string());
        }

        trace!(method, url, "sending request");

        request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::timeout(format!("request timed out: {}", e))
            } else {
                ProviderError::network(format!("request failed: {}", e))
            }
        })
    }
}

/// Reads the body of a 200/207 response, mapping anything else to an error.
async fn read_body(response: Response) -> ProviderResult<String> {
    let status = response.status();
    trace!(status = %status, "received response");

    match status {
        StatusCode::OK | StatusCode::MULTI_STATUS => response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("failed to read response: {}", e))),
        _ => Err(error_for(status, response).await),
    }
}

/// Completes a PUT/DELETE, returning the etag when the server sent one.
async fn complete_write(response: Response) -> ProviderResult<Option<String>> {
    let status = response.status();
    trace!(status = %status, "received write response");

    match status {
        StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT => {
            Ok(etag_header(&response))
        }
        _ => Err(error_for(status, response).await),
    }
}

/// Maps an error response to a [`ProviderError`].
///
/// The body is inspected for the `valid-sync-token` precondition element,
/// which servers report when an incremental token has been invalidated; it
/// maps to [`SyncTokenInvalid`](crate::error::ProviderErrorCode) so callers
/// can fall back to a full resync instead of failing the cycle.
async fn error_for(status: StatusCode, response: Response) -> ProviderError {
    let body = response.text().await.unwrap_or_default();

    if body.contains("valid-sync-token") {
        return ProviderError::sync_token_invalid(format!(
            "server invalidated the sync token ({})",
            status
        ));
    }

    let code = code_for_status(status.as_u16());
    let detail = match status {
        StatusCode::UNAUTHORIZED => "authentication failed: invalid credentials".to_string(),
        StatusCode::FORBIDDEN => "access denied to calendar".to_string(),
        StatusCode::NOT_FOUND => "calendar or entity not found".to_string(),
        StatusCode::PRECONDITION_FAILED => {
            "precondition failed: the entity changed remotely or already exists".to_string()
        }
        StatusCode::TOO_MANY_REQUESTS => "too many requests to server".to_string(),
        s => {
            warn!(status = %s, body = %body, "unexpected response status");
            format!("unexpected status {}: {}", s, body)
        }
    };

    ProviderError::new(code, detail)
}

/// Extracts the `ETag` response header, with surrounding quotes stripped.
fn etag_header(response: &Response) -> Option<String> {
    response
        .headers()
        .get("etag")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim_matches('"').to_string())
}

/// Wraps a bare etag value in the quotes the header syntax requires.
fn quote_etag(etag: &str) -> String {
    if etag.starts_with('"') {
        etag.to_string()
    } else {
        format!("\"{}\"", etag)
    }
}
