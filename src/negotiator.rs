//! Session negotiation: one request to the voice-AI backend per call.
//!
//! Given a call direction and per-call overrides, the negotiator composes
//! the tool registry, prompt composer, and corpus gate into a single
//! session-creation request, submits it, and returns the join handle the
//! telephony leg must stream to. No retries; the caller decides whether to
//! surface or retry a failure.

use tracing::{debug, info};

use crate::error::BridgeError;
use crate::prompt::PromptComposer;
use crate::telephony::CallDirection;
use crate::tools::{
    CORPUS_QUERY_MAX_RESULTS, CORPUS_QUERY_TOOL, HANG_UP_TOOL, ToolRegistry, ToolSelection,
};
use crate::ultravox::{
    CorpusGate, FirstSpeaker, SessionHandle, SessionRequest, StreamMedium, UltravoxClient,
};

/// Fixed operational-guidance block appended when any tools are active.
const TOOL_OPERATIONAL_GUIDANCE: &str = "\n\nWhen using tools:\n\
    - Use them proactively whenever they can answer the caller's question.\n\
    - Phrase results naturally; never read URLs, JSON, or parameter names aloud.\n\
    - If a tool fails, apologize briefly and offer to continue without it.\n\
    - When the caller is done, say goodbye and end the call politely.";

/// Static negotiation defaults, resolved once from configuration.
#[derive(Debug, Clone)]
pub struct NegotiatorSettings {
    pub model: String,
    pub default_voice: String,
    /// Clamped to `[0, 1]` at load time.
    pub temperature: f64,
    pub inbound_first_speaker: FirstSpeaker,
    pub outbound_first_speaker: FirstSpeaker,
    pub recording_enabled: bool,
    /// Global tool-enablement flag, consulted when a call carries no
    /// explicit tool filter.
    pub tools_enabled: bool,
    /// Global default tool list; `None` means "all registered tools".
    pub default_tools: Option<Vec<String>>,
    /// Operator-supplied guideline text injected next to tool guidance.
    pub tool_guidelines: String,
    pub default_corpus: Option<String>,
    pub default_persona: Option<String>,
}

/// Per-call inputs to [`SessionNegotiator::negotiate`].
#[derive(Debug, Clone)]
pub struct NegotiationOptions {
    pub direction: CallDirection,
    pub medium: StreamMedium,
    pub prompt_override: Option<String>,
    pub persona: Option<String>,
    pub voice_override: Option<String>,
    pub corpus_override: Option<String>,
    /// `None`: global flag + default list. `Some([])`: tools disabled for
    /// this call. `Some(names)`: exactly those names.
    pub tool_filter: Option<Vec<String>>,
}

impl NegotiationOptions {
    pub fn new(direction: CallDirection, medium: StreamMedium) -> Self {
        Self {
            direction,
            medium,
            prompt_override: None,
            persona: None,
            voice_override: None,
            corpus_override: None,
            tool_filter: None,
        }
    }
}

/// The central orchestration unit: builds and submits session requests.
#[derive(Debug, Clone)]
pub struct SessionNegotiator {
    client: UltravoxClient,
    corpus_gate: CorpusGate,
    registry: ToolRegistry,
    composer: PromptComposer,
    settings: NegotiatorSettings,
}

impl SessionNegotiator {
    pub fn new(
        client: UltravoxClient,
        registry: ToolRegistry,
        composer: PromptComposer,
        settings: NegotiatorSettings,
    ) -> Self {
        let corpus_gate = CorpusGate::new(client.clone());
        Self {
            client,
            corpus_gate,
            registry,
            composer,
            settings,
        }
    }

    /// Negotiate a session and return its join handle.
    pub async fn negotiate(
        &self,
        options: NegotiationOptions,
    ) -> Result<SessionHandle, BridgeError> {
        let request = self.build_session_request(&options).await;

        info!(
            direction = ?options.direction,
            voice = %request.voice,
            tools = request.selected_tools.len(),
            "negotiating session"
        );

        let handle = self.client.create_session(&request).await?;
        debug!(join_url = %handle.join_url, "session handle acquired");
        Ok(handle)
    }

    /// Assemble the session request without submitting it.
    ///
    /// The returned request is complete: the prompt carries tool guidance,
    /// operator guidelines, persona preamble, and, when any tool survived
    /// selection, the fixed operational-guidance block.
    pub async fn build_session_request(&self, options: &NegotiationOptions) -> SessionRequest {
        // 1. Active tool set. An explicit empty filter disables tools for
        // this call; no filter falls back to the global flag and list.
        let active_tools = match &options.tool_filter {
            Some(filter) if filter.is_empty() => Vec::new(),
            Some(filter) => self.registry.get_by_names(Some(filter)),
            None if self.settings.tools_enabled => self
                .registry
                .get_by_names(self.settings.default_tools.as_deref()),
            None => Vec::new(),
        };

        // 2. Compose the prompt; persona wrapping happens last inside
        // compose so the preamble leads the prompt.
        let persona = options
            .persona
            .as_deref()
            .or(self.settings.default_persona.as_deref());
        let mut system_prompt = self.composer.compose(
            options.prompt_override.as_deref(),
            options.direction,
            persona,
            &active_tools,
            &self.settings.tool_guidelines,
        );

        // 3. Selections: configured tools travel inline; the built-in
        // hang-up capability rides along whenever tools are active.
        let mut selected_tools: Vec<ToolSelection> = Vec::new();
        for tool in &active_tools {
            push_unique(&mut selected_tools, tool.to_inline_selection());
        }
        if !active_tools.is_empty() {
            push_unique(&mut selected_tools, ToolSelection::reference(HANG_UP_TOOL));
        }

        // 4. Corpus attachment is gated independently of the tool axis:
        // tools-off does not imply corpus-off.
        let corpus_id = options
            .corpus_override
            .as_deref()
            .or(self.settings.default_corpus.as_deref())
            .filter(|id| !id.trim().is_empty());
        if let Some(id) = corpus_id {
            if self.corpus_gate.is_ready(id).await {
                push_unique(
                    &mut selected_tools,
                    ToolSelection::Reference {
                        name: CORPUS_QUERY_TOOL.to_string(),
                        parameter_overrides: Some(serde_json::json!({
                            "corpusId": id,
                            "maxResults": CORPUS_QUERY_MAX_RESULTS,
                        })),
                    },
                );
            } else {
                debug!(corpus_id = %id, "corpus not ready, proceeding without it");
            }
        }

        // 5. Final prompt enrichment, after the tool set is settled.
        if !selected_tools.is_empty() {
            system_prompt.push_str(TOOL_OPERATIONAL_GUIDANCE);
        }

        let first_speaker = match options.direction {
            CallDirection::Inbound => self.settings.inbound_first_speaker,
            CallDirection::Outbound => self.settings.outbound_first_speaker,
        };

        SessionRequest {
            system_prompt,
            model: self.settings.model.clone(),
            voice: options
                .voice_override
                .clone()
                .unwrap_or_else(|| self.settings.default_voice.clone()),
            temperature: self.settings.temperature,
            first_speaker,
            medium: options.medium,
            recording_enabled: self.settings.recording_enabled,
            selected_tools,
        }
    }
}

/// Append a selection unless one with the same name is already present.
fn push_unique(selections: &mut Vec<ToolSelection>, candidate: ToolSelection) {
    let duplicate = candidate
        .name()
        .is_some_and(|name| selections.iter().any(|s| s.name() == Some(name)));
    if !duplicate {
        selections.push(candidate);
    }
}
