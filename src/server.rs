//! HTTP surface: outbound-call API, telephony webhooks, media stub.
//!
//! The route layer is provider-agnostic: every telephony route dispatches to
//! the adapter injected at startup. Webhook handlers always answer with a
//! valid protocol response (markup or a 2xx acknowledgment), even when the
//! work behind them failed, because a dropped webhook dead-airs a live call.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Query, Request, State, WebSocketUpgrade},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::AppState;
use crate::error::{BridgeError, ProviderApiError};
use crate::media;
use crate::negotiator::NegotiationOptions;
use crate::state::PendingCallContext;
use crate::telephony::{CallDirection, InboundAcceptance};

/// Build the application router.
pub fn build_router(state: AppState, timeout_disabled: bool) -> Router {
    // Router layers change the router's type, so a conditional timeout is
    // expressed as an effectively-infinite duration instead.
    let timeout_duration = if timeout_disabled {
        Duration::from_secs(365 * 24 * 60 * 60)
    } else {
        Duration::from_secs(30)
    };

    Router::new()
        .route("/api/calls", post(api_originate_call))
        .route("/telephony/inbound", post(telephony_inbound))
        .route("/telephony/connect", post(telephony_connect))
        .route("/telephony/status", post(telephony_status))
        .route("/telephony/media", get(telephony_media))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024)) // webhook payloads are small
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| {
                let duration = timeout_duration;
                async move {
                    match tokio::time::timeout(duration, next.run(req)).await {
                        Ok(res) => res,
                        Err(_) => {
                            (StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response()
                        }
                    }
                }
            },
        ))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound origination
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for the outbound-call API.
#[derive(Debug, Deserialize)]
struct OriginateRequest {
    /// Destination number in E.164 form.
    to: String,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    persona: Option<String>,
    #[serde(default)]
    voice: Option<String>,
    #[serde(default)]
    corpus_id: Option<String>,
    /// `null`: global tool configuration. `[]`: tools disabled for this call.
    #[serde(default)]
    tools: Option<Vec<String>>,
    /// When true, park the prompt and let the provider fetch call
    /// instructions later (deferred connect).
    #[serde(default)]
    deferred: bool,
}

#[derive(Debug, Serialize)]
struct OriginateResponse {
    call_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    call_key: Option<String>,
}

/// POST /api/calls - originate an outbound call.
async fn api_originate_call(
    State(state): State<AppState>,
    Json(req): Json<OriginateRequest>,
) -> Result<Json<OriginateResponse>, (StatusCode, String)> {
    let status_callback = state.callback_url("/telephony/status");

    if req.deferred {
        return originate_deferred(&state, &req, &status_callback).await;
    }

    let mut options =
        NegotiationOptions::new(CallDirection::Outbound, state.adapter.stream_medium());
    options.prompt_override = req.prompt.clone();
    options.persona = req.persona.clone();
    options.voice_override = req.voice.clone();
    options.corpus_override = req.corpus_id.clone();
    options.tool_filter = req.tools.clone();

    let handle = state
        .negotiator
        .negotiate(options)
        .await
        .map_err(|e| bridge_error_response(&e))?;

    let call_id = state
        .adapter
        .originate_outbound(&req.to, &handle, &status_callback)
        .await
        .map_err(|e| provider_error_response(&e))?;

    Ok(Json(OriginateResponse {
        call_id: call_id.to_string(),
        call_key: None,
    }))
}

async fn originate_deferred(
    state: &AppState,
    req: &OriginateRequest,
    status_callback: &Url,
) -> Result<Json<OriginateResponse>, (StatusCode, String)> {
    let call_key = Uuid::new_v4().to_string();

    state.pending.put(
        call_key.as_str(),
        PendingCallContext::new(
            req.prompt.clone().unwrap_or_default(),
            req.persona.clone(),
        ),
    );

    let mut connect_url = state.callback_url("/telephony/connect");
    connect_url
        .query_pairs_mut()
        .append_pair("call_key", &call_key);

    match state
        .adapter
        .originate_deferred(&req.to, &connect_url, status_callback)
        .await
    {
        Ok(call_id) => Ok(Json(OriginateResponse {
            call_id: call_id.to_string(),
            call_key: Some(call_key),
        })),
        Err(e) => {
            // The provider never saw the call; don't leave the context to
            // rot until the sweep.
            let _ = state.pending.take_once(&call_key);
            Err(provider_error_response(&e))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Telephony webhooks
// ─────────────────────────────────────────────────────────────────────────────

/// POST /telephony/inbound - inbound trigger for the active provider.
async fn telephony_inbound(State(state): State<AppState>, body: String) -> Response {
    match state.adapter.accept_inbound(&body).await {
        Ok(InboundAcceptance::Document { call_id, body }) => {
            info!(call_id = ?call_id, "answering inbound webhook with call document");
            xml_response(body)
        }
        Ok(InboundAcceptance::Acknowledged { call_id, handled }) => {
            Json(serde_json::json!({ "received": true, "handled": handled, "call_id": call_id.map(|c| c.to_string()) }))
                .into_response()
        }
        // The webhook cycle is still acknowledged: the failure is logged
        // against the call, not returned to the network.
        Err(e) => {
            error!(error = %e, "inbound handling failed");
            match state.adapter.failure_document() {
                Some(doc) => xml_response(doc),
                None => {
                    Json(serde_json::json!({ "received": true, "handled": false })).into_response()
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConnectParams {
    call_key: String,
}

/// POST /telephony/connect - deferred-connect instruction fetch.
///
/// The provider is asking how to proceed with a call we originated earlier.
/// The parked context is consumed exactly once; a miss is terminal for the
/// attempt and the caller hears an apology instead of silence.
async fn telephony_connect(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
) -> Response {
    let document = match connect_document(&state, &params.call_key).await {
        Ok(doc) => doc,
        Err(e) => {
            error!(call_key = %params.call_key, error = %e, "deferred connect failed");
            state.adapter.failure_document().unwrap_or_default()
        }
    };
    xml_response(document)
}

async fn connect_document(state: &AppState, call_key: &str) -> Result<String, BridgeError> {
    let context = state.pending.take_once(call_key)?;

    let mut options =
        NegotiationOptions::new(CallDirection::Outbound, state.adapter.stream_medium());
    options.prompt_override = Some(context.system_prompt).filter(|p| !p.trim().is_empty());
    options.persona = context.persona;

    let handle = state.negotiator.negotiate(options).await?;
    state
        .adapter
        .stream_document(&handle)
        .ok_or(BridgeError::ProviderApi(ProviderApiError::Unsupported(
            "provider has no instruction-fetch call flow",
        )))
}

/// POST /telephony/status - delivery-state notifications.
///
/// Fire-and-forget from the provider's side; only a 2xx matters.
async fn telephony_status(body: String) -> StatusCode {
    info!(body = %body.chars().take(500).collect::<String>(), "call status update");
    StatusCode::OK
}

/// GET /telephony/media - media channel stub.
async fn telephony_media(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(media::run_media_session)
}

// ─────────────────────────────────────────────────────────────────────────────
// Response helpers
// ─────────────────────────────────────────────────────────────────────────────

fn xml_response(body: String) -> Response {
    ([(header::CONTENT_TYPE, "text/xml")], body).into_response()
}

fn bridge_error_response(error: &BridgeError) -> (StatusCode, String) {
    let status = match error {
        BridgeError::RemoteSession(_) => StatusCode::BAD_GATEWAY,
        BridgeError::ProviderApi(_) => StatusCode::BAD_GATEWAY,
        BridgeError::PendingContextNotFound(_) => StatusCode::NOT_FOUND,
        BridgeError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, error.to_string())
}

fn provider_error_response(error: &ProviderApiError) -> (StatusCode, String) {
    let status = match error {
        ProviderApiError::Unsupported(_) => StatusCode::BAD_REQUEST,
        ProviderApiError::CallNotActive(_) => StatusCode::CONFLICT,
        _ => StatusCode::BAD_GATEWAY,
    };
    if matches!(error, ProviderApiError::CallNotActive(_)) {
        warn!(error = %error, "provider command hit a timing/state error");
    }
    (status, error.to_string())
}
