//! System-prompt composition.
//!
//! Builds the final instruction text handed to the voice-AI backend from a
//! call direction, an optional caller-supplied override, a persona name, and
//! the tools active for the call. Pure transforms over the composer's static
//! configuration: no I/O, no ambient state.

use crate::telephony::CallDirection;
use crate::tools::ToolDefinition;

/// Placeholder token replaced by the persona name inside prompt bodies.
pub const PERSONA_PLACEHOLDER: &str = "{AGENT_NAME}";

/// Prompt composer, constructed once from configuration.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    inbound_default: String,
    outbound_default: String,
}

impl PromptComposer {
    pub fn new(inbound_default: impl Into<String>, outbound_default: impl Into<String>) -> Self {
        Self {
            inbound_default: inbound_default.into(),
            outbound_default: outbound_default.into(),
        }
    }

    /// Tool usage guidance: each tool's description plus its example
    /// query/response pairs. Empty input yields an empty string.
    pub fn build_tool_guidance(&self, tools: &[ToolDefinition]) -> String {
        if tools.is_empty() {
            return String::new();
        }

        let mut out = String::from("You have access to the following tools:\n");
        for tool in tools {
            out.push_str(&format!("\n- {}: {}\n", tool.name, tool.description));
            for example in &tool.examples {
                out.push_str(&format!(
                    "  Example: caller \"{}\" -> you \"{}\"\n",
                    example.query, example.response
                ));
            }
        }
        out
    }

    /// Prepend the persona preamble and substitute any remaining persona
    /// placeholders in the body.
    ///
    /// Deliberately not idempotent: applying twice stacks two preambles.
    /// Callers apply it exactly once, as the final compose step.
    pub fn apply_persona(&self, prompt: &str, persona_name: &str) -> String {
        let preamble = format!(
            "You are {persona_name}. Stay in character as {persona_name} for the entire call.\n\n"
        );
        let body = prompt.replace(PERSONA_PLACEHOLDER, persona_name);
        format!("{preamble}{body}")
    }

    /// Assemble the full system prompt.
    ///
    /// An explicit override wins over the direction default. Tool guidance
    /// and operator guidelines are appended only when tools are active. The
    /// persona transform runs last so its preamble is the first thing the
    /// backend sees.
    pub fn compose(
        &self,
        base_override: Option<&str>,
        direction: CallDirection,
        persona_name: Option<&str>,
        active_tools: &[ToolDefinition],
        tool_guidelines: &str,
    ) -> String {
        let base = match base_override.filter(|p| !p.trim().is_empty()) {
            Some(p) => p,
            None => match direction {
                CallDirection::Inbound => self.inbound_default.as_str(),
                CallDirection::Outbound => self.outbound_default.as_str(),
            },
        };

        let mut prompt = base.to_string();

        if !active_tools.is_empty() {
            let guidance = self.build_tool_guidance(active_tools);
            prompt.push_str("\n\n");
            prompt.push_str(&guidance);
            if !tool_guidelines.trim().is_empty() {
                prompt.push('\n');
                prompt.push_str(tool_guidelines);
            }
        }

        match persona_name.filter(|n| !n.trim().is_empty()) {
            Some(name) => self.apply_persona(&prompt, name),
            None => prompt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{HttpMethod, ToolExample};

    fn composer() -> PromptComposer {
        PromptComposer::new("Inbound default prompt.", "Outbound default prompt.")
    }

    fn tool_with_example() -> ToolDefinition {
        ToolDefinition {
            name: "order_status".to_string(),
            description: "Check an order's status".to_string(),
            endpoint_template: "https://api.example.com/orders".to_string(),
            http_method: HttpMethod::Get,
            parameters: vec![],
            response_schema: None,
            examples: vec![ToolExample {
                query: "where is my order".to_string(),
                response: "It ships tomorrow.".to_string(),
            }],
        }
    }

    #[test]
    fn guidance_is_empty_without_tools() {
        assert_eq!(composer().build_tool_guidance(&[]), "");
    }

    #[test]
    fn guidance_includes_description_and_examples() {
        let guidance = composer().build_tool_guidance(&[tool_with_example()]);
        assert!(guidance.contains("order_status"));
        assert!(guidance.contains("Check an order's status"));
        assert!(guidance.contains("where is my order"));
    }

    #[test]
    fn override_beats_direction_default() {
        let prompt = composer().compose(
            Some("Custom prompt."),
            CallDirection::Inbound,
            None,
            &[],
            "",
        );
        assert_eq!(prompt, "Custom prompt.");
    }

    #[test]
    fn direction_default_used_when_no_override() {
        let c = composer();
        let inbound = c.compose(None, CallDirection::Inbound, None, &[], "");
        let outbound = c.compose(None, CallDirection::Outbound, None, &[], "");
        assert_eq!(inbound, "Inbound default prompt.");
        assert_eq!(outbound, "Outbound default prompt.");
    }

    #[test]
    fn no_tools_means_no_guidance_blocks() {
        let prompt = composer().compose(
            None,
            CallDirection::Inbound,
            None,
            &[],
            "Always confirm before using a tool.",
        );
        assert!(!prompt.contains("tools"));
        assert!(!prompt.contains("Always confirm"));
    }

    #[test]
    fn persona_preamble_comes_first() {
        let prompt = composer().compose(
            None,
            CallDirection::Inbound,
            Some("Riley"),
            &[tool_with_example()],
            "Use tools proactively.",
        );
        assert!(prompt.starts_with("You are Riley."));
        assert!(prompt.contains("order_status"));
        assert!(prompt.contains("Use tools proactively."));
    }

    #[test]
    fn persona_substitutes_body_placeholders() {
        let c = composer();
        let out = c.apply_persona("Introduce yourself as {AGENT_NAME}.", "Riley");
        assert!(out.contains("Introduce yourself as Riley."));
        assert!(!out.contains(PERSONA_PLACEHOLDER));
    }

    #[test]
    fn apply_persona_twice_stacks_preambles() {
        let c = composer();
        let once = c.apply_persona("Base.", "Riley");
        let twice = c.apply_persona(&once, "Riley");
        assert_eq!(twice.matches("You are Riley.").count(), 2);
    }
}
