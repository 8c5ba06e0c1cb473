// Result envelope returned by a specialist agent.

use serde::{Deserialize, Serialize};

use crate::tools::{Citation, ToolCallRecord};

/// What a specialist agent produced for one task.
///
/// `success = false` is a degraded result, not a crash: the coordinator
/// may still pass `data` (or `error`) through synthesis so the user gets
/// a coherent reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent: String,
    pub success: bool,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub tokens_used: u32,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

impl AgentResult {
    pub fn success(agent: impl Into<String>, data: impl Into<String>, tokens_used: u32) -> Self {
        Self {
            agent: agent.into(),
            success: true,
            data: data.into(),
            error: None,
            tokens_used,
            tool_calls: Vec::new(),
            citations: Vec::new(),
        }
    }

    pub fn failure(agent: impl Into<String>, error: impl Into<String>, tokens_used: u32) -> Self {
        let error = error.into();
        Self {
            agent: agent.into(),
            success: false,
            data: String::new(),
            error: Some(error),
            tokens_used,
            tool_calls: Vec::new(),
            citations: Vec::new(),
        }
    }

    /// Whether this result carries anything worth showing.
    pub fn is_non_trivial(&self) -> bool {
        !self.data.trim().is_empty()
    }
}
