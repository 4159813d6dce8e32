//! Asynchronous telephony adapter (event/webhook model).
//!
//! Inbound handling is split across two webhook events: `call.initiated`
//! (answer the call) and `call.answered` (negotiate a session and start
//! media streaming toward the join URL). The provider does not guarantee
//! ordered or exactly-once delivery, so the adapter keeps a small per-call
//! phase map and tolerates duplicates, reordering, and a missing initiated
//! event.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{BridgeError, ProviderApiError};
use crate::negotiator::{NegotiationOptions, SessionNegotiator};
use crate::telephony::{CallDirection, InboundAcceptance, ProviderCallId, TelephonyAdapter};
use crate::ultravox::{SessionHandle, StreamMedium};

/// Lifecycle of one inbound call as the adapter observes it. Absence from
/// the phase map means uninitiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallPhase {
    /// Answer command sent, waiting for `call.answered`.
    Initiated,
    /// Streaming started toward the backend session.
    Streaming,
    /// Setup failed; later events for this call are ignored.
    Failed,
}

/// Webhook envelope: `{"data": {"event_type": ..., "payload": {...}}}`.
#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    event_type: String,
    #[serde(default)]
    payload: EventPayload,
}

#[derive(Debug, Default, Deserialize)]
struct EventPayload {
    #[serde(default)]
    call_control_id: Option<String>,
    #[serde(default)]
    from: Option<String>,
}

#[derive(Clone)]
pub struct TelnyxAdapter {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    connection_id: String,
    from_number: String,
    negotiator: Arc<SessionNegotiator>,
    phases: Arc<RwLock<HashMap<String, CallPhase>>>,
}

impl std::fmt::Debug for TelnyxAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelnyxAdapter")
            .field("connection_id", &self.connection_id)
            .field("from_number", &self.from_number)
            .finish()
    }
}

impl TelnyxAdapter {
    pub fn new(
        api_key: impl Into<String>,
        connection_id: impl Into<String>,
        from_number: impl Into<String>,
        negotiator: Arc<SessionNegotiator>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: "https://api.telnyx.com".to_string(),
            api_key: api_key.into(),
            connection_id: connection_id.into(),
            from_number: from_number.into(),
            negotiator,
            phases: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Point the adapter at a different API host (tests).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn phase(&self, call_id: &str) -> Option<CallPhase> {
        self.phases.read().unwrap().get(call_id).copied()
    }

    fn set_phase(&self, call_id: &str, phase: CallPhase) {
        self.phases
            .write()
            .unwrap()
            .insert(call_id.to_string(), phase);
    }

    fn clear_phase(&self, call_id: &str) {
        self.phases.write().unwrap().remove(call_id);
    }

    async fn command(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderApiError> {
        let url = format!("{}{path}", self.api_base.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let detail: String = text.chars().take(200).collect();
            // 422 on a streaming command means the call left (or never
            // reached) an answerable state; report it as a timing error.
            if status.as_u16() == 422 {
                return Err(ProviderApiError::CallNotActive(detail));
            }
            return Err(ProviderApiError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ProviderApiError::Unparsable(e.to_string()))
    }

    async fn answer_call(&self, call_id: &str) -> Result<(), ProviderApiError> {
        self.command(
            &format!("/v2/calls/{call_id}/actions/answer"),
            serde_json::json!({}),
        )
        .await?;
        Ok(())
    }

    async fn start_streaming(
        &self,
        call_id: &str,
        handle: &SessionHandle,
    ) -> Result<(), ProviderApiError> {
        self.command(
            &format!("/v2/calls/{call_id}/actions/streaming_start"),
            serde_json::json!({
                "stream_url": handle.join_url,
                "stream_track": "both_tracks",
            }),
        )
        .await?;
        Ok(())
    }

    async fn on_initiated(&self, call_id: &str) -> Result<InboundAcceptance, BridgeError> {
        match self.phase(call_id) {
            // Out-of-order delivery: the call was already answered (or has
            // already failed). Answering again would be rejected.
            Some(phase) => {
                warn!(call_id, ?phase, "call.initiated after later phase, ignoring");
                Ok(InboundAcceptance::Acknowledged {
                    call_id: Some(ProviderCallId(call_id.to_string())),
                    handled: false,
                })
            }
            None => {
                self.answer_call(call_id).await?;
                self.set_phase(call_id, CallPhase::Initiated);
                info!(call_id, "inbound call answered");
                Ok(InboundAcceptance::Acknowledged {
                    call_id: Some(ProviderCallId(call_id.to_string())),
                    handled: true,
                })
            }
        }
    }

    async fn on_answered(&self, call_id: &str) -> Result<InboundAcceptance, BridgeError> {
        match self.phase(call_id) {
            Some(CallPhase::Streaming | CallPhase::Failed) => {
                warn!(call_id, "duplicate call.answered, ignoring");
                return Ok(InboundAcceptance::Acknowledged {
                    call_id: Some(ProviderCallId(call_id.to_string())),
                    handled: false,
                });
            }
            // Initiated is the expected predecessor; None is also valid:
            // the provider may answer on our behalf and skip the initiated
            // event entirely.
            Some(CallPhase::Initiated) | None => {}
        }

        let options = NegotiationOptions::new(CallDirection::Inbound, self.stream_medium());
        let handle = match self.negotiator.negotiate(options).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(call_id, error = %e, "session negotiation failed");
                self.set_phase(call_id, CallPhase::Failed);
                return Err(e);
            }
        };

        if let Err(e) = self.start_streaming(call_id, &handle).await {
            error!(call_id, error = %e, "streaming start failed");
            self.set_phase(call_id, CallPhase::Failed);
            return Err(e.into());
        }

        self.set_phase(call_id, CallPhase::Streaming);
        info!(call_id, "media streaming started");
        Ok(InboundAcceptance::Acknowledged {
            call_id: Some(ProviderCallId(call_id.to_string())),
            handled: true,
        })
    }
}

#[async_trait]
impl TelephonyAdapter for TelnyxAdapter {
    fn name(&self) -> &'static str {
        "telnyx"
    }

    fn stream_medium(&self) -> StreamMedium {
        StreamMedium::Telnyx
    }

    async fn originate_outbound(
        &self,
        destination: &str,
        handle: &SessionHandle,
        status_callback: &Url,
    ) -> Result<ProviderCallId, ProviderApiError> {
        let body = serde_json::json!({
            "connection_id": self.connection_id,
            "to": destination,
            "from": self.from_number,
            "stream_url": handle.join_url,
            "stream_track": "both_tracks",
            "webhook_url": status_callback.as_str(),
        });

        let response = self.command("/v2/calls", body).await?;
        let call_id = response
            .get("data")
            .and_then(|d| d.get("call_control_id"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                ProviderApiError::Unparsable("call response carried no call_control_id".to_string())
            })?;

        info!(call_id, to = %destination, "outbound call originated");
        Ok(ProviderCallId(call_id.to_string()))
    }

    async fn accept_inbound(&self, payload: &str) -> Result<InboundAcceptance, BridgeError> {
        let envelope: WebhookEnvelope = serde_json::from_str(payload).map_err(|e| {
            BridgeError::ProviderApi(ProviderApiError::Unparsable(format!(
                "webhook body: {e}"
            )))
        })?;

        let event_type = envelope.data.event_type.as_str();
        let Some(call_id) = envelope.data.payload.call_control_id else {
            debug!(event_type, "event without call_control_id, ignoring");
            return Ok(InboundAcceptance::Acknowledged {
                call_id: None,
                handled: false,
            });
        };

        debug!(
            event_type,
            call_id = %call_id,
            from = envelope.data.payload.from.as_deref().unwrap_or("unknown"),
            "webhook event"
        );

        match event_type {
            "call.initiated" => self.on_initiated(&call_id).await,
            "call.answered" => self.on_answered(&call_id).await,
            "call.hangup" => {
                self.clear_phase(&call_id);
                Ok(InboundAcceptance::Acknowledged {
                    call_id: Some(ProviderCallId(call_id)),
                    handled: true,
                })
            }
            _ => Ok(InboundAcceptance::Acknowledged {
                call_id: Some(ProviderCallId(call_id)),
                handled: false,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptComposer;
    use crate::tools::ToolRegistry;
    use crate::ultravox::{FirstSpeaker, UltravoxClient};

    fn adapter() -> TelnyxAdapter {
        let negotiator = Arc::new(SessionNegotiator::new(
            UltravoxClient::new("http://127.0.0.1:1", "test-key"),
            ToolRegistry::new_empty(),
            PromptComposer::new("Inbound.", "Outbound."),
            crate::negotiator::NegotiatorSettings {
                model: "fixie-ai/ultravox".to_string(),
                default_voice: "Mark".to_string(),
                temperature: 0.3,
                inbound_first_speaker: FirstSpeaker::Agent,
                outbound_first_speaker: FirstSpeaker::User,
                recording_enabled: false,
                tools_enabled: false,
                default_tools: None,
                tool_guidelines: String::new(),
                default_corpus: None,
                default_persona: None,
            },
        ));
        TelnyxAdapter::new("key", "conn", "+15550001111", negotiator)
    }

    fn event(event_type: &str, call_id: &str) -> String {
        serde_json::json!({
            "data": {
                "event_type": event_type,
                "payload": { "call_control_id": call_id, "from": "+15557654321" }
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn unknown_event_acks_without_handling() {
        let a = adapter();
        let acceptance = a.accept_inbound(&event("call.bridged", "cc1")).await.unwrap();
        assert!(matches!(
            acceptance,
            InboundAcceptance::Acknowledged { handled: false, .. }
        ));
    }

    #[tokio::test]
    async fn event_without_call_id_is_ignored() {
        let a = adapter();
        let body = r#"{"data":{"event_type":"call.initiated","payload":{}}}"#;
        let acceptance = a.accept_inbound(body).await.unwrap();
        assert!(matches!(
            acceptance,
            InboundAcceptance::Acknowledged { call_id: None, handled: false }
        ));
    }

    #[tokio::test]
    async fn malformed_body_is_a_provider_error() {
        let a = adapter();
        let err = a.accept_inbound("not json").await.unwrap_err();
        assert!(matches!(
            err,
            BridgeError::ProviderApi(ProviderApiError::Unparsable(_))
        ));
    }

    #[tokio::test]
    async fn initiated_after_streaming_is_a_no_op() {
        let a = adapter();
        a.set_phase("cc1", CallPhase::Streaming);

        let acceptance = a.accept_inbound(&event("call.initiated", "cc1")).await.unwrap();
        assert!(matches!(
            acceptance,
            InboundAcceptance::Acknowledged { handled: false, .. }
        ));
        assert_eq!(a.phase("cc1"), Some(CallPhase::Streaming));
    }

    #[tokio::test]
    async fn duplicate_answered_is_a_no_op() {
        let a = adapter();
        a.set_phase("cc1", CallPhase::Streaming);

        let acceptance = a.accept_inbound(&event("call.answered", "cc1")).await.unwrap();
        assert!(matches!(
            acceptance,
            InboundAcceptance::Acknowledged { handled: false, .. }
        ));
    }

    #[tokio::test]
    async fn hangup_clears_call_state() {
        let a = adapter();
        a.set_phase("cc1", CallPhase::Streaming);

        a.accept_inbound(&event("call.hangup", "cc1")).await.unwrap();
        assert_eq!(a.phase("cc1"), None);
    }

    #[tokio::test]
    async fn answered_with_unreachable_backend_marks_failed() {
        // Negotiator points at an unreachable host: the answered event must
        // surface the failure and park the call in Failed.
        let a = adapter();
        let err = a.accept_inbound(&event("call.answered", "cc1")).await;
        assert!(err.is_err());
        assert_eq!(a.phase("cc1"), Some(CallPhase::Failed));
    }
}
