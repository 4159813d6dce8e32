//! Voice-AI backend types and client.
//!
//! The backend exposes two operations the bridge consumes: create a
//! real-time voice session (returning a join URL the telephony leg streams
//! to) and report the indexing status of a knowledge corpus.

pub mod client;
pub mod corpus;

pub use client::UltravoxClient;
pub use corpus::CorpusGate;

use serde::{Deserialize, Serialize, Serializer};

use crate::tools::ToolSelection;

/// Who speaks first once the media session is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstSpeaker {
    Agent,
    User,
}

impl Serialize for FirstSpeaker {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let tag = match self {
            Self::Agent => "FIRST_SPEAKER_AGENT",
            Self::User => "FIRST_SPEAKER_USER",
        };
        serializer.serialize_str(tag)
    }
}

impl FirstSpeaker {
    /// Parse a configuration value (`agent` / `user`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "agent" => Some(Self::Agent),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

/// Telephony medium tag forwarded to the backend so it selects the right
/// media framing. Supplied by the active adapter; the negotiator only
/// forwards it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMedium {
    Twilio,
    Telnyx,
}

impl Serialize for StreamMedium {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let body = match self {
            Self::Twilio => serde_json::json!({ "twilio": {} }),
            Self::Telnyx => serde_json::json!({ "telnyx": {} }),
        };
        body.serialize(serializer)
    }
}

impl Serialize for ToolSelection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

/// One session-creation request. Constructed fresh per call, submitted once,
/// never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub system_prompt: String,
    pub model: String,
    pub voice: String,
    /// Sampling temperature in `[0, 1]`.
    pub temperature: f64,
    pub first_speaker: FirstSpeaker,
    pub medium: StreamMedium,
    pub recording_enabled: bool,
    pub selected_tools: Vec<ToolSelection>,
}

/// Opaque join handle returned by the backend. Single-use; expires if the
/// telephony leg never connects.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionHandle {
    #[serde(rename = "joinUrl")]
    pub join_url: String,
}

/// Status payload from the corpus endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CorpusStatus {
    #[serde(default)]
    pub status: String,
}

/// Wire value of a fully indexed, queryable corpus.
pub const CORPUS_STATUS_READY: &str = "CORPUS_STATUS_READY";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_request_wire_shape() {
        let request = SessionRequest {
            system_prompt: "Hello".to_string(),
            model: "fixie-ai/ultravox".to_string(),
            voice: "Mark".to_string(),
            temperature: 0.3,
            first_speaker: FirstSpeaker::Agent,
            medium: StreamMedium::Twilio,
            recording_enabled: false,
            selected_tools: vec![ToolSelection::reference("hangUp")],
        };

        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["systemPrompt"], "Hello");
        assert_eq!(wire["firstSpeaker"], "FIRST_SPEAKER_AGENT");
        assert!(wire["medium"]["twilio"].is_object());
        assert_eq!(wire["selectedTools"][0]["toolName"], "hangUp");
    }

    #[test]
    fn first_speaker_parses_config_values() {
        assert_eq!(FirstSpeaker::parse("Agent"), Some(FirstSpeaker::Agent));
        assert_eq!(FirstSpeaker::parse(" user "), Some(FirstSpeaker::User));
        assert_eq!(FirstSpeaker::parse("both"), None);
    }

    #[test]
    fn handle_deserializes_join_url() {
        let handle: SessionHandle =
            serde_json::from_str(r#"{"joinUrl":"wss://example.com/join/abc"}"#).unwrap();
        assert_eq!(handle.join_url, "wss://example.com/join/abc");
    }
}
