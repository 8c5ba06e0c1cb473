// Tool definitions, calls, and results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool definition exposed to the LLM. `input_schema` is a JSON Schema
/// object in the Anthropic shape; adapters convert as needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A tool invocation requested by the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Outcome of one governed tool invocation, fed back to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    pub tool_name: String,
    /// Parsed result payload on success.
    pub payload: Option<Value>,
    /// Error text on failure; shown to the LLM so it can reason over it.
    pub error: Option<String>,
}

impl ToolResultBlock {
    pub fn ok(tool_use_id: impl Into<String>, tool_name: impl Into<String>, payload: Value) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            tool_name: tool_name.into(),
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(
        tool_use_id: impl Into<String>,
        tool_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            tool_name: tool_name.into(),
            payload: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Render the result as text for a tool_result content block.
    pub fn content_text(&self) -> String {
        if let Some(err) = &self.error {
            return format!("Error: {}", err);
        }
        match &self.payload {
            Some(value) => serde_json::to_string(value).unwrap_or_default(),
            None => String::new(),
        }
    }
}

/// Entry in the persisted tool-call log on a chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub params: Value,
    pub status: String,
    pub duration_ms: u64,
}

/// Citation attached to an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub source_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}
