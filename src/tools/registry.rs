//! Tool registry loaded from positional environment slots.
//!
//! Tools are configured as numbered slots (`TOOL_1_NAME`, `TOOL_1_URL`, ...)
//! up to [`MAX_TOOL_SLOTS`]. A slot with no name is skipped; a slot whose
//! JSON-valued fields fail to parse is dropped with a load-time warning so a
//! single bad entry never takes the process down.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use super::{HttpMethod, ToolDefinition, ToolExample, ToolParameter};

/// Fixed maximum number of configurable tool slots.
pub const MAX_TOOL_SLOTS: usize = 10;

/// Registry of tool definitions, in slot order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    /// Definitions in registration order.
    tools: Arc<Vec<ToolDefinition>>,
    /// name -> index into `tools`.
    index: Arc<HashMap<String, usize>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tool_count", &self.tools.len())
            .finish()
    }
}

impl ToolRegistry {
    /// Load tool slots from the process environment.
    pub fn load_from_env() -> Self {
        let lookup = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self::load_with(lookup)
    }

    /// Load tool slots through an arbitrary key lookup. Separated from
    /// [`Self::load_from_env`] so tests don't have to mutate the process
    /// environment.
    pub fn load_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut tools = Vec::new();
        let mut index = HashMap::new();

        for slot in 1..=MAX_TOOL_SLOTS {
            let Some(name) = lookup(&format!("TOOL_{slot}_NAME")) else {
                continue;
            };

            match Self::parse_slot(slot, &name, &lookup) {
                Ok(def) => {
                    if index.contains_key(&def.name) {
                        warn!(slot, tool = %def.name, "duplicate tool name, slot skipped");
                        continue;
                    }
                    index.insert(def.name.clone(), tools.len());
                    tools.push(def);
                }
                Err(e) => {
                    warn!(slot, tool = %name, error = %e, "tool slot failed to load, skipped");
                }
            }
        }

        Self {
            tools: Arc::new(tools),
            index: Arc::new(index),
        }
    }

    fn parse_slot<F>(slot: usize, name: &str, lookup: &F) -> Result<ToolDefinition, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let field = |suffix: &str| lookup(&format!("TOOL_{slot}_{suffix}"));

        let endpoint_template = field("URL").ok_or("missing URL")?;

        let http_method = match field("METHOD").as_deref() {
            None => HttpMethod::Get,
            Some(m) => serde_json::from_value(serde_json::Value::String(m.to_uppercase()))
                .map_err(|_| format!("unknown HTTP method '{m}'"))?,
        };

        let parameters: Vec<ToolParameter> = match field("PARAMETERS") {
            None => Vec::new(),
            Some(raw) => {
                serde_json::from_str(&raw).map_err(|e| format!("bad PARAMETERS JSON: {e}"))?
            }
        };

        let response_schema = match field("RESPONSE_SCHEMA") {
            None => None,
            Some(raw) => Some(
                serde_json::from_str(&raw)
                    .map_err(|e| format!("bad RESPONSE_SCHEMA JSON: {e}"))?,
            ),
        };

        let examples: Vec<ToolExample> = match field("EXAMPLES") {
            None => Vec::new(),
            Some(raw) => {
                serde_json::from_str(&raw).map_err(|e| format!("bad EXAMPLES JSON: {e}"))?
            }
        };

        Ok(ToolDefinition {
            name: name.to_string(),
            description: field("DESCRIPTION").unwrap_or_default(),
            endpoint_template,
            http_method,
            parameters,
            response_schema,
            examples,
        })
    }

    /// Creates an empty registry for testing.
    pub fn new_empty() -> Self {
        Self::default()
    }

    /// Builds a registry directly from definitions, preserving order.
    /// Duplicate names keep the first occurrence.
    pub fn from_definitions(defs: Vec<ToolDefinition>) -> Self {
        let mut tools = Vec::new();
        let mut index = HashMap::new();
        for def in defs {
            if index.contains_key(&def.name) {
                continue;
            }
            index.insert(def.name.clone(), tools.len());
            tools.push(def);
        }
        Self {
            tools: Arc::new(tools),
            index: Arc::new(index),
        }
    }

    /// All registered tools in registry order.
    pub fn all(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Select tools by name. `None` returns everything in registry order;
    /// `Some(names)` returns matches in the caller's requested order,
    /// silently dropping unknown names.
    pub fn get_by_names(&self, names: Option<&[String]>) -> Vec<ToolDefinition> {
        match names {
            None => self.tools.to_vec(),
            Some(names) => names
                .iter()
                .filter_map(|n| self.index.get(n).map(|&i| self.tools[i].clone()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
