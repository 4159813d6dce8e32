//! Error types for call negotiation and provider control.

use thiserror::Error;

/// Top-level error for a single call's handling.
///
/// Corpus readiness checks are deliberately absent here: a failed status
/// query degrades to "not ready" inside [`crate::ultravox::CorpusGate`] and
/// never crosses a component boundary.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// A required credential or setting is missing. Reported at startup as a
    /// warning; the process keeps serving the endpoints that don't need it.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The voice-AI backend could not produce a usable session.
    #[error("remote session error: {0}")]
    RemoteSession(#[from] RemoteSessionError),

    /// A telephony provider rejected a control command.
    #[error("provider API error: {0}")]
    ProviderApi(#[from] ProviderApiError),

    /// Deferred-connect lookup missed. Terminal for that call attempt; the
    /// prompt cannot be reconstructed.
    #[error("no pending context for call key {0}")]
    PendingContextNotFound(String),
}

/// Failures from the voice-AI backend's session-creation endpoint.
///
/// An HTML-shaped body (the backend's error page) is distinct from a body
/// that fails JSON parsing, so operators can tell a gateway failure from a
/// contract drift.
#[derive(Error, Debug)]
pub enum RemoteSessionError {
    #[error("backend returned error status {status}: {detail}")]
    ErrorPage { status: u16, detail: String },

    #[error("backend returned an HTML body instead of JSON")]
    HtmlBody,

    #[error("backend response was not parsable: {0}")]
    Unparsable(String),

    #[error("backend response contained no join URL")]
    MissingJoinUrl,

    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Failures from a telephony provider's control API.
#[derive(Error, Debug)]
pub enum ProviderApiError {
    #[error("provider rejected the command with status {status}: {detail}")]
    Rejected { status: u16, detail: String },

    /// A 422-class rejection of a streaming command. The call was usually
    /// not yet in an answerable state when the command arrived.
    #[error("call is not in an active state (timing error): {0}")]
    CallNotActive(String),

    #[error("operation not supported by this provider: {0}")]
    Unsupported(&'static str),

    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider response was not parsable: {0}")]
    Unparsable(String),
}
