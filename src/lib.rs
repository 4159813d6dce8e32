//! Voicebridge
//!
//! A telephony-to-voice-AI bridge: receives and originates phone calls
//! through a telephony provider, negotiates a real-time media session with a
//! conversational-voice backend, and relays call-control events between the
//! two.
//!
//! # Architecture
//!
//! - **Server**: Axum-based HTTP server exposing the outbound-call API and
//!   the provider webhooks
//! - **Session Negotiator**: composes tools, prompt, and corpus gating into
//!   one backend session request and returns the join handle
//! - **Provider Adapters**: Twilio (synchronous TwiML) and Telnyx
//!   (asynchronous webhook events + control commands) behind one trait
//! - **Call-Session State**: take-once store for deferred-connect context
//!
//! # Modules
//!
//! - [`negotiator`]: session orchestration
//! - [`telephony`]: provider adapters
//! - [`tools`]: tool definitions and registry
//! - [`ultravox`]: voice-AI backend client and types

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::default_trait_access)]
#![allow(clippy::unused_async)]

pub mod config;
pub mod error;
pub mod media;
pub mod negotiator;
pub mod prompt;
pub mod server;
pub mod state;
pub mod telephony;
pub mod tools;
pub mod ultravox;

use std::sync::Arc;

use url::Url;

use config::AppConfig;
use negotiator::SessionNegotiator;
use state::PendingCallStore;
use telephony::TelephonyAdapter;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session negotiator for the voice-AI backend.
    pub negotiator: Arc<SessionNegotiator>,
    /// Active telephony adapter, selected once at startup.
    pub adapter: Arc<dyn TelephonyAdapter>,
    /// Deferred-connect context store.
    pub pending: PendingCallStore,
    /// Global configuration.
    pub config: Arc<AppConfig>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("adapter", &self.adapter.name())
            .finish()
    }
}

impl AppState {
    /// Externally reachable URL for a callback path.
    ///
    /// The external base URL is validated at startup, so joining a fixed
    /// path cannot fail afterwards.
    pub fn callback_url(&self, path: &str) -> Url {
        let base = self.config.server.external_url.trim_end_matches('/');
        Url::parse(&format!("{base}{path}"))
            .unwrap_or_else(|_| panic!("invalid external URL in config: {base}"))
    }
}
