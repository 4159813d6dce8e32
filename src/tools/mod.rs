//! External-capability (tool) definitions and call-time selections.
//!
//! A [`ToolDefinition`] is the canonical, load-time shape of a tool: name,
//! description, HTTP endpoint, parameters, and example dialogues. At call
//! time it is reshaped into a [`ToolSelection`] for transmission: either a
//! bare reference (the backend already knows the tool) or an inline
//! definition carried inside the session request. The reshaping lives here,
//! on the definition itself, rather than at each call site.

pub mod registry;

pub use registry::ToolRegistry;

use serde::{Deserialize, Serialize};

/// Fixed result count attached to the corpus-query tool reference.
pub const CORPUS_QUERY_MAX_RESULTS: u32 = 5;

/// Name of the backend's built-in corpus-query tool.
pub const CORPUS_QUERY_TOOL: &str = "queryCorpus";

/// Name of the backend's built-in hang-up tool, appended whenever any tools
/// are active so the model can end the call.
pub const HANG_UP_TOOL: &str = "hangUp";

/// A tool definition as loaded from configuration. Immutable after load;
/// identity is `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// Endpoint URL template. Path parameters appear as `{name}` segments.
    pub endpoint_template: String,
    #[serde(default)]
    pub http_method: HttpMethod,
    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
    #[serde(default)]
    pub response_schema: Option<serde_json::Value>,
    #[serde(default)]
    pub examples: Vec<ToolExample>,
}

/// HTTP method for a tool endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// A single parameter of a tool endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(default)]
    pub location: ParameterLocation,
    /// JSON Schema fragment describing the parameter value.
    pub schema: serde_json::Value,
    #[serde(default)]
    pub required: bool,
}

/// Where a parameter is carried on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    #[default]
    Query,
    Path,
    Body,
    Header,
}

impl ParameterLocation {
    /// Wire tag used by the backend's dynamic-parameter schema.
    fn wire_tag(self) -> &'static str {
        match self {
            Self::Query => "PARAMETER_LOCATION_QUERY",
            Self::Path => "PARAMETER_LOCATION_PATH",
            Self::Body => "PARAMETER_LOCATION_BODY",
            Self::Header => "PARAMETER_LOCATION_HEADER",
        }
    }
}

/// An example query/response pair included in prompt guidance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExample {
    pub query: String,
    pub response: String,
}

/// A tool as selected for one call: either a reference the backend resolves
/// by name, or a full inline (temporary) definition.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolSelection {
    Reference {
        name: String,
        parameter_overrides: Option<serde_json::Value>,
    },
    Inline(serde_json::Value),
}

impl ToolSelection {
    /// A bare reference with no parameter overrides.
    pub fn reference(name: impl Into<String>) -> Self {
        Self::Reference {
            name: name.into(),
            parameter_overrides: None,
        }
    }

    /// The name this selection is keyed by, for duplicate checks.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Reference { name, .. } => Some(name),
            Self::Inline(value) => value
                .get("temporaryTool")
                .and_then(|t| t.get("modelToolName"))
                .and_then(|n| n.as_str()),
        }
    }

    /// Wire shape submitted inside the session request's `selectedTools`.
    pub fn to_wire(&self) -> serde_json::Value {
        match self {
            Self::Reference {
                name,
                parameter_overrides,
            } => {
                let mut obj = serde_json::json!({ "toolName": name });
                if let Some(overrides) = parameter_overrides {
                    obj["parameterOverrides"] = overrides.clone();
                }
                obj
            }
            Self::Inline(value) => value.clone(),
        }
    }
}

impl ToolDefinition {
    /// Reference selection: the backend resolves the tool by name.
    pub fn to_reference(&self) -> ToolSelection {
        ToolSelection::reference(&self.name)
    }

    /// Inline (temporary-tool) selection carrying the full definition.
    pub fn to_inline_selection(&self) -> ToolSelection {
        let dynamic_parameters: Vec<serde_json::Value> = self
            .parameters
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "location": p.location.wire_tag(),
                    "schema": p.schema,
                    "required": p.required,
                })
            })
            .collect();

        ToolSelection::Inline(serde_json::json!({
            "temporaryTool": {
                "modelToolName": self.name,
                "description": self.description,
                "dynamicParameters": dynamic_parameters,
                "http": {
                    "baseUrlPattern": self.endpoint_template,
                    "httpMethod": self.http_method.as_str(),
                },
            }
        }))
    }
}
