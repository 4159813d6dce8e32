//! Telephony provider adapters.
//!
//! Each adapter translates the bridge's direction-agnostic call model into
//! one provider's wire protocol. Both expose the same two capabilities
//! (originate an outbound call that streams to a join handle, and accept an
//! inbound call and attach it to one) behind [`TelephonyAdapter`]. The
//! active adapter is selected once at startup and injected into the route
//! layer; the session negotiator never learns which one is running.

pub mod telnyx;
pub mod twilio;

pub use telnyx::TelnyxAdapter;
pub use twilio::TwilioAdapter;

use async_trait::async_trait;
use url::Url;

use crate::error::{BridgeError, ProviderApiError};
use crate::ultravox::{SessionHandle, StreamMedium};

/// Direction of a call relative to the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDirection {
    Inbound,
    Outbound,
}

/// Provider-assigned identifier for a call leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCallId(pub String);

impl std::fmt::Display for ProviderCallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of handling an inbound trigger.
#[derive(Debug)]
pub enum InboundAcceptance {
    /// Synchronous model: the webhook response body itself carries the
    /// provider's call instructions (an XML markup document).
    Document {
        call_id: Option<ProviderCallId>,
        body: String,
    },
    /// Asynchronous model: any control commands were already issued
    /// out-of-band; the webhook only needs a 2xx acknowledgment.
    /// `handled` is false for events the adapter ignored.
    Acknowledged {
        call_id: Option<ProviderCallId>,
        handled: bool,
    },
}

/// Capability interface over one telephony provider.
#[async_trait]
pub trait TelephonyAdapter: Send + Sync {
    /// Provider tag for logging.
    fn name(&self) -> &'static str;

    /// Medium tag forwarded to the voice-AI backend.
    fn stream_medium(&self) -> StreamMedium;

    /// Originate an outbound call that streams media to `handle`.
    /// Delivery-state notifications are posted to `status_callback`.
    async fn originate_outbound(
        &self,
        destination: &str,
        handle: &SessionHandle,
        status_callback: &Url,
    ) -> Result<ProviderCallId, ProviderApiError>;

    /// Originate an outbound call whose instructions are fetched later from
    /// `connect_url` (the deferred-connect path). Providers without an
    /// instruction-fetch call flow reject this.
    async fn originate_deferred(
        &self,
        _destination: &str,
        _connect_url: &Url,
        _status_callback: &Url,
    ) -> Result<ProviderCallId, ProviderApiError> {
        Err(ProviderApiError::Unsupported(
            "deferred connect requires an instruction-fetch call flow",
        ))
    }

    /// Handle one inbound trigger payload (webhook body).
    async fn accept_inbound(&self, payload: &str) -> Result<InboundAcceptance, BridgeError>;

    /// Markup instructing the provider to stream media to `handle`, for
    /// providers whose call flow fetches instructions over HTTP.
    fn stream_document(&self, _handle: &SessionHandle) -> Option<String> {
        None
    }

    /// Apologetic, non-streaming markup used when a session could not be
    /// negotiated. The HTTP cycle must still be answered with a valid
    /// protocol response.
    fn failure_document(&self) -> Option<String> {
        None
    }
}
