// Error kinds for governed tool dispatch.

use thiserror::Error;

/// Errors from the governance pipeline and executors. These map onto the
/// audit statuses the dispatcher records and the error taxonomy the turn
/// runner surfaces.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool name is not in the caller's allow-list
    #[error("tool not allowed: {0}")]
    NotAllowed(String),

    /// No executor registered under this name
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Sliding-window rate limit rejected the call
    #[error("rate limit exceeded for tool {tool} ({limit}/min)")]
    RateLimited { tool: String, limit: u32 },

    /// Tenant policy denied the call
    #[error("policy denied: {reason}")]
    PolicyDenied { reason: String },

    /// Executor exceeded its configured timeout
    #[error("tool {tool} timed out after {timeout_secs}s")]
    Timeout { tool: String, timeout_secs: u64 },

    /// Tool-level failure, safe to reflect back to the LLM
    #[error("{0}")]
    Failed(String),

    /// Remote server / external system failure
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Internal error; details are logged, not shown to the LLM
    #[error("internal tool error")]
    Internal(#[from] anyhow::Error),
}

impl ToolError {
    /// The audit status recorded for this error.
    pub fn audit_status(&self) -> &'static str {
        match self {
            ToolError::PolicyDenied { .. } => "denied",
            ToolError::Timeout { .. } => "timeout",
            ToolError::RateLimited { .. } => "rate_limited",
            _ => "error",
        }
    }

    /// Message safe to reflect back to the LLM as a tool result.
    pub fn llm_message(&self) -> String {
        match self {
            ToolError::Internal(_) => {
                "An internal error occurred while executing the tool".to_string()
            }
            other => other.to_string(),
        }
    }
}
