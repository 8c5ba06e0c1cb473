// Error taxonomy for the orchestration core.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors the turn runner and coordinator distinguish. The kind decides
/// what the user sees, what the audit records, and whether billing runs
/// (it only runs for turns that flushed an assistant message normally).
#[derive(Debug, Error)]
pub enum CoreError {
    /// Caller is not authenticated. Never billed.
    #[error("unauthenticated")]
    Unauthenticated,

    /// Caller lacks permission. Never billed.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Rate or entitlement quota hit. Not billed.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Tenant policy denied the operation. Audited with status=denied.
    #[error("policy denied: {reason}")]
    PolicyDenied { reason: String },

    /// A tool exceeded its timeout. The agent may retry within its steps.
    #[error("tool timed out: {0}")]
    ToolTimeout(String),

    /// LLM / remote RPC / embedding failure.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// A core invariant was violated. Fatal for the turn.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// The request was cancelled. Best-effort audit, no billing.
    #[error("cancelled")]
    Cancelled,

    /// The outer turn budget was exceeded. Not billed.
    #[error("turn timed out")]
    TurnTimeout,

    /// Storage-layer failure.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl CoreError {
    pub fn upstream(msg: impl Into<String>) -> Self {
        CoreError::Upstream(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        CoreError::Invariant(msg.into())
    }

    pub fn quota(msg: impl Into<String>) -> Self {
        CoreError::QuotaExceeded(msg.into())
    }

    /// Audit status recorded for a failed turn.
    pub fn audit_status(&self) -> &'static str {
        match self {
            CoreError::PolicyDenied { .. } => "denied",
            CoreError::Cancelled => "cancelled",
            CoreError::ToolTimeout(_) | CoreError::TurnTimeout => "timeout",
            CoreError::Invariant(_) => "fatal",
            _ => "error",
        }
    }
}

impl From<suitechat_llm::LlmError> for CoreError {
    fn from(err: suitechat_llm::LlmError) -> Self {
        CoreError::Upstream(err.to_string())
    }
}
