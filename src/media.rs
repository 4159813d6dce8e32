//! Media WebSocket stub.
//!
//! The telephony leg opens a bidirectional media channel carrying a small
//! event vocabulary (media frame, mark, clear, DTMF). This handler only
//! acknowledges: it counts media frames, echoes `mark` events back as
//! acknowledgments, and logs lifecycle events. No audio is decoded or
//! relayed; session media normally flows directly between the provider and
//! the voice-AI backend.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// One frame on the media channel, discriminated by `event`.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum MediaEvent {
    Connected,
    Start {
        #[serde(default)]
        start: serde_json::Value,
    },
    Media,
    Mark {
        #[serde(default)]
        mark: serde_json::Value,
    },
    Clear,
    Dtmf {
        #[serde(default)]
        dtmf: serde_json::Value,
    },
    Stop,
}

/// Drive one media channel to completion.
pub async fn run_media_session(socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let mut media_frames: u64 = 0;

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(m) => m,
            Err(e) => {
                debug!(error = %e, "media channel closed with error");
                break;
            }
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            // Binary frames and pings are not part of the vocabulary.
            _ => continue,
        };

        let event: MediaEvent = match serde_json::from_str(&text) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "unrecognized media event, ignoring");
                continue;
            }
        };

        match event {
            MediaEvent::Connected => debug!("media channel connected"),
            MediaEvent::Start { start } => {
                info!(
                    stream_sid = start.get("streamSid").and_then(|s| s.as_str()).unwrap_or("unknown"),
                    "media stream started"
                );
            }
            MediaEvent::Media => {
                media_frames += 1;
            }
            MediaEvent::Mark { mark } => {
                // Echo the mark back so the far end knows its checkpoint
                // was reached.
                let ack = serde_json::json!({ "event": "mark", "mark": mark });
                if sink.send(Message::Text(ack.to_string().into())).await.is_err() {
                    break;
                }
            }
            MediaEvent::Clear => debug!("clear received"),
            MediaEvent::Dtmf { dtmf } => {
                info!(
                    digit = dtmf.get("digit").and_then(|d| d.as_str()).unwrap_or("?"),
                    "DTMF received"
                );
            }
            MediaEvent::Stop => {
                info!(media_frames, "media stream stopped");
                break;
            }
        }
    }

    debug!(media_frames, "media session finished");
}
