// Local tool abstraction and registry.
//
// Tools are defined via the LocalTool trait and registered with a
// ToolRegistry. The execution result contract distinguishes tool-level
// errors (safe to show the LLM) from internal errors, whose details are
// logged but replaced with a generic message.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::error;

use suitechat_contracts::ToolDefinition;

use crate::context::ToolContext;

/// Result of a local tool execution.
#[derive(Debug)]
pub enum ToolExecution {
    /// Successful execution with a JSON result
    Success(Value),
    /// Tool-level error that is safe to show to the LLM
    /// (e.g. "No active connection found")
    ToolError(String),
    /// System-level error; details are logged, not exposed to the LLM
    InternalError(String),
}

impl ToolExecution {
    pub fn success(value: impl Into<Value>) -> Self {
        ToolExecution::Success(value.into())
    }

    pub fn tool_error(message: impl Into<String>) -> Self {
        ToolExecution::ToolError(message.into())
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        ToolExecution::InternalError(message.into())
    }

    /// Fold into (payload, error) for a tool result block, hiding internal
    /// detail from the LLM.
    pub fn into_parts(self, tool_name: &str) -> (Option<Value>, Option<String>) {
        match self {
            ToolExecution::Success(value) => (Some(value), None),
            ToolExecution::ToolError(message) => (None, Some(message)),
            ToolExecution::InternalError(detail) => {
                error!(
                    tool_name = %tool_name,
                    error = %detail,
                    "tool internal error (details hidden from LLM)"
                );
                (
                    None,
                    Some("An internal error occurred while executing the tool".to_string()),
                )
            }
        }
    }
}

/// A tool executable in-process over the shared DB/credential context.
#[async_trait]
pub trait LocalTool: Send + Sync {
    /// Unique name used by the LLM to invoke the tool.
    fn name(&self) -> &str;

    /// Description provided to the LLM.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's parameters.
    fn input_schema(&self) -> Value;

    /// Per-tool timeout enforced by the dispatcher.
    fn timeout_secs(&self) -> u64 {
        30
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolExecution;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.input_schema())
    }
}

/// Process-global registry mapping tool name -> executor.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn LocalTool>>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn LocalTool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Definitions for every registered tool.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|tool| tool.definition()).collect()
    }

    /// Definitions restricted to an agent's allow-list.
    pub fn definitions_for(&self, allowlist: &[String]) -> Vec<ToolDefinition> {
        allowlist
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition())
            .collect()
    }
}

#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: HashMap<String, Arc<dyn LocalTool>>,
}

impl ToolRegistryBuilder {
    pub fn register(mut self, tool: impl LocalTool + 'static) -> Self {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
        self
    }

    pub fn register_arc(mut self, tool: Arc<dyn LocalTool>) -> Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry { tools: self.tools }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl LocalTool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the input back"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn execute(&self, params: Value, _ctx: &ToolContext) -> ToolExecution {
            ToolExecution::success(params)
        }
    }

    #[test]
    fn registry_filters_definitions_by_allowlist() {
        let registry = ToolRegistry::builder().register(EchoTool).build();
        assert!(registry.contains("echo"));

        let defs = registry.definitions_for(&["echo".into(), "missing".into()]);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
    }

    #[test]
    fn internal_errors_are_hidden_from_the_llm() {
        let (payload, error) =
            ToolExecution::internal_error("pool exhausted: connection refused").into_parts("echo");
        assert!(payload.is_none());
        let error = error.unwrap();
        assert!(!error.contains("pool exhausted"));
    }

    #[test]
    fn tool_errors_pass_through_verbatim() {
        let (_, error) = ToolExecution::tool_error("City not found").into_parts("echo");
        assert_eq!(error.unwrap(), "City not found");
    }
}
