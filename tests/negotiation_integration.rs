//! End-to-end negotiation against a stub voice-AI backend.
//!
//! The stub is a real axum server on an ephemeral port; it captures every
//! session-creation request so assertions can inspect exactly what the
//! negotiator submitted.

use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};

use voicebridge::error::{BridgeError, RemoteSessionError};
use voicebridge::negotiator::{NegotiationOptions, NegotiatorSettings, SessionNegotiator};
use voicebridge::prompt::PromptComposer;
use voicebridge::telephony::CallDirection;
use voicebridge::tools::{HttpMethod, ToolDefinition, ToolRegistry};
use voicebridge::ultravox::{FirstSpeaker, StreamMedium, UltravoxClient};

const JOIN_URL: &str = "wss://voice.example/join/abc";

#[derive(Clone)]
struct StubState {
    captured: Arc<Mutex<Vec<serde_json::Value>>>,
    corpus_status: &'static str,
}

async fn stub_create_session(
    State(state): State<StubState>,
    Json(body): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    state.captured.lock().unwrap().push(body);
    Json(serde_json::json!({ "callId": "call-1", "joinUrl": JOIN_URL }))
}

async fn stub_corpus_status(State(state): State<StubState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": state.corpus_status }))
}

/// Spawn a stub backend; returns its base URL and the captured requests.
async fn spawn_backend(corpus_status: &'static str) -> (String, Arc<Mutex<Vec<serde_json::Value>>>) {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let state = StubState {
        captured: Arc::clone(&captured),
        corpus_status,
    };
    let router = Router::new()
        .route("/api/calls", post(stub_create_session))
        .route("/api/corpora/{id}", get(stub_corpus_status))
        .with_state(state);

    (spawn(router).await, captured)
}

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn settings() -> NegotiatorSettings {
    NegotiatorSettings {
        model: "fixie-ai/ultravox".to_string(),
        default_voice: "Mark".to_string(),
        temperature: 0.3,
        inbound_first_speaker: FirstSpeaker::Agent,
        outbound_first_speaker: FirstSpeaker::User,
        recording_enabled: false,
        tools_enabled: true,
        default_tools: None,
        tool_guidelines: "Confirm the caller's intent before using a tool.".to_string(),
        default_corpus: None,
        default_persona: None,
    }
}

fn weather_tool() -> ToolDefinition {
    ToolDefinition {
        name: "weather".to_string(),
        description: "Look up the weather".to_string(),
        endpoint_template: "https://api.example.com/weather".to_string(),
        http_method: HttpMethod::Get,
        parameters: vec![],
        response_schema: None,
        examples: vec![],
    }
}

fn negotiator(base_url: &str, settings: NegotiatorSettings) -> SessionNegotiator {
    SessionNegotiator::new(
        UltravoxClient::new(base_url, "test-key"),
        ToolRegistry::from_definitions(vec![weather_tool()]),
        PromptComposer::new("Inbound default prompt.", "Outbound default prompt."),
        settings,
    )
}

fn tool_names(request: &serde_json::Value) -> Vec<String> {
    request["selectedTools"]
        .as_array()
        .map(|tools| {
            tools
                .iter()
                .map(|t| {
                    t.get("toolName")
                        .and_then(|n| n.as_str())
                        .or_else(|| {
                            t.get("temporaryTool")
                                .and_then(|tt| tt.get("modelToolName"))
                                .and_then(|n| n.as_str())
                        })
                        .unwrap_or("?")
                        .to_string()
                })
                .collect()
        })
        .unwrap_or_default()
}

// Scenario: outbound with no overrides, defaults all the way down.
#[tokio::test]
async fn outbound_defaults_produce_expected_request() {
    let (base_url, captured) = spawn_backend("CORPUS_STATUS_READY").await;
    let n = negotiator(&base_url, settings());

    let handle = n
        .negotiate(NegotiationOptions::new(
            CallDirection::Outbound,
            StreamMedium::Twilio,
        ))
        .await
        .unwrap();
    assert_eq!(handle.join_url, JOIN_URL);

    let requests = captured.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    assert!(
        request["systemPrompt"]
            .as_str()
            .unwrap()
            .starts_with("Outbound default prompt.")
    );
    assert_eq!(request["voice"], "Mark");
    assert_eq!(request["firstSpeaker"], "FIRST_SPEAKER_USER");
    assert!((request["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-9);
    assert_eq!(tool_names(request), vec!["weather", "hangUp"]);
}

// Scenario: a configured corpus that is still indexing must be omitted
// silently, not turned into an error.
#[tokio::test]
async fn pending_corpus_is_omitted() {
    let (base_url, captured) = spawn_backend("CORPUS_STATUS_PENDING").await;
    let mut s = settings();
    s.default_corpus = Some("corpus-1".to_string());
    let n = negotiator(&base_url, s);

    n.negotiate(NegotiationOptions::new(
        CallDirection::Inbound,
        StreamMedium::Twilio,
    ))
    .await
    .unwrap();

    let requests = captured.lock().unwrap();
    assert!(!tool_names(&requests[0]).contains(&"queryCorpus".to_string()));
}

#[tokio::test]
async fn ready_corpus_is_attached_with_fixed_result_count() {
    let (base_url, captured) = spawn_backend("CORPUS_STATUS_READY").await;
    let mut s = settings();
    s.default_corpus = Some("corpus-1".to_string());
    let n = negotiator(&base_url, s);

    n.negotiate(NegotiationOptions::new(
        CallDirection::Inbound,
        StreamMedium::Twilio,
    ))
    .await
    .unwrap();

    let requests = captured.lock().unwrap();
    let request = &requests[0];
    let corpus_tool = request["selectedTools"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["toolName"] == "queryCorpus")
        .expect("corpus tool attached");
    assert_eq!(corpus_tool["parameterOverrides"]["corpusId"], "corpus-1");
    assert_eq!(corpus_tool["parameterOverrides"]["maxResults"], 5);
}

// A corpus endpoint that returns garbage must read as "not ready", never as
// a failed negotiation.
#[tokio::test]
async fn corpus_garbage_response_reads_as_not_ready() {
    let captured: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new()
        .route("/api/calls", post(stub_create_session))
        .route(
            "/api/corpora/{id}",
            get(|| async { (StatusCode::OK, "definitely not json") }),
        )
        .with_state(StubState {
            captured: Arc::clone(&captured),
            corpus_status: "",
        });
    let base_url = spawn(router).await;

    let mut s = settings();
    s.default_corpus = Some("corpus-1".to_string());
    let n = negotiator(&base_url, s);

    let handle = n
        .negotiate(NegotiationOptions::new(
            CallDirection::Inbound,
            StreamMedium::Twilio,
        ))
        .await
        .unwrap();
    assert!(!handle.join_url.is_empty());

    let requests = captured.lock().unwrap();
    assert!(!tool_names(&requests[0]).contains(&"queryCorpus".to_string()));
}

// Tools-off and corpus attachment are independent axes: disabling tools for
// a call must not suppress a ready corpus.
#[tokio::test]
async fn tools_disabled_still_attaches_ready_corpus() {
    let (base_url, captured) = spawn_backend("CORPUS_STATUS_READY").await;
    let mut s = settings();
    s.default_corpus = Some("corpus-1".to_string());
    let n = negotiator(&base_url, s);

    let mut options = NegotiationOptions::new(CallDirection::Inbound, StreamMedium::Twilio);
    options.tool_filter = Some(vec![]);
    n.negotiate(options).await.unwrap();

    let requests = captured.lock().unwrap();
    let names = tool_names(&requests[0]);
    assert_eq!(names, vec!["queryCorpus"]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend failure shapes
// ─────────────────────────────────────────────────────────────────────────────

async fn failing_backend(response: Response) -> String {
    let response = Arc::new(Mutex::new(Some(response)));
    let router = Router::new().route(
        "/api/calls",
        post(move || {
            let response = Arc::clone(&response);
            async move { response.lock().unwrap().take().unwrap() }
        }),
    );
    spawn(router).await
}

#[tokio::test]
async fn html_body_is_a_distinct_failure() {
    let base_url =
        failing_backend(Html("<!DOCTYPE html><html><body>oops</body></html>").into_response())
            .await;
    let n = negotiator(&base_url, settings());

    let err = n
        .negotiate(NegotiationOptions::new(
            CallDirection::Inbound,
            StreamMedium::Twilio,
        ))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::RemoteSession(RemoteSessionError::HtmlBody)
    ));
}

#[tokio::test]
async fn error_status_is_an_error_page() {
    let base_url =
        failing_backend((StatusCode::INTERNAL_SERVER_ERROR, "backend down").into_response()).await;
    let n = negotiator(&base_url, settings());

    let err = n
        .negotiate(NegotiationOptions::new(
            CallDirection::Inbound,
            StreamMedium::Twilio,
        ))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::RemoteSession(RemoteSessionError::ErrorPage { status: 500, .. })
    ));
}

#[tokio::test]
async fn missing_join_url_is_rejected() {
    let base_url =
        failing_backend(Json(serde_json::json!({ "callId": "call-1" })).into_response()).await;
    let n = negotiator(&base_url, settings());

    let err = n
        .negotiate(NegotiationOptions::new(
            CallDirection::Inbound,
            StreamMedium::Twilio,
        ))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::RemoteSession(RemoteSessionError::MissingJoinUrl)
    ));
}
