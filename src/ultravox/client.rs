//! HTTP client for the voice-AI backend.

use tracing::debug;

use crate::error::RemoteSessionError;

use super::{CorpusStatus, SessionHandle, SessionRequest};

/// Client for the backend's session and corpus endpoints.
///
/// One request per operation, no retries. The caller decides whether to
/// surface or retry a failure.
#[derive(Clone)]
pub struct UltravoxClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for UltravoxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UltravoxClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl UltravoxClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    /// Create a real-time session and return its join handle.
    ///
    /// An HTML-shaped body is reported as [`RemoteSessionError::HtmlBody`]
    /// (the backend served an error page), distinct from a JSON body that
    /// fails to parse. A parsed body without a join URL is also an error.
    pub async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<SessionHandle, RemoteSessionError> {
        let response = self
            .http
            .post(self.url("/api/calls"))
            .header("X-API-Key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RemoteSessionError::ErrorPage {
                status: status.as_u16(),
                detail: snippet(&body),
            });
        }

        if looks_like_html(&body) {
            return Err(RemoteSessionError::HtmlBody);
        }

        let parsed: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| RemoteSessionError::Unparsable(e.to_string()))?;

        debug!(call_id = ?parsed.get("callId"), "session created");

        match parsed.get("joinUrl").and_then(|u| u.as_str()) {
            Some(join_url) if !join_url.is_empty() => Ok(SessionHandle {
                join_url: join_url.to_string(),
            }),
            _ => Err(RemoteSessionError::MissingJoinUrl),
        }
    }

    /// Fetch a corpus's indexing status.
    pub async fn corpus_status(
        &self,
        corpus_id: &str,
    ) -> Result<CorpusStatus, RemoteSessionError> {
        let response = self
            .http
            .get(self.url(&format!("/api/corpora/{corpus_id}")))
            .header("X-API-Key", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RemoteSessionError::ErrorPage {
                status: status.as_u16(),
                detail: snippet(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| RemoteSessionError::Unparsable(e.to_string()))
    }
}

/// True when a body looks like an HTML document rather than JSON.
fn looks_like_html(body: &str) -> bool {
    let trimmed = body.trim_start();
    trimmed.starts_with("<!DOCTYPE") || trimmed.starts_with("<!doctype") || trimmed.starts_with("<html")
}

/// First line of a body, bounded, for error detail.
fn snippet(body: &str) -> String {
    let line = body.lines().next().unwrap_or_default();
    line.chars().take(200).collect()
}
