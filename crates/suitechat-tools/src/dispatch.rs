// The governed dispatcher: the single gate every tool call passes.
//
// Pipeline, in order:
//   1. allow-list check (agents carry per-role allow-lists)
//   2. rate limiter (rejections increment the per-tool counter)
//   3. policy evaluation (denials audit with status=denied)
//   4. executor raced against the tool's timeout
//   5. output redaction
//   6. exactly one audit event per invocation
//   7. duration metric + (tool, status) counter

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::warn;

use suitechat_contracts::{ToolDefinition, ToolResultBlock, ToolUseBlock};
use suitechat_storage::{AuditLog, NewAuditEvent};

use crate::context::ToolContext;
use crate::error::ToolError;
use crate::mcp::{is_remote_tool, parse_synthetic_name, McpClient};
use crate::metrics::Metrics;
use crate::policy::{evaluate_tool_call, redact_output};
use crate::rate_limit::RateLimiter;
use crate::registry::ToolRegistry;

const REMOTE_TOOL_TIMEOUT_SECS: u64 = 30;
const PARAM_PREVIEW_LIMIT: usize = 500;

/// Surface the agent loop uses to invoke tools. Errors are folded into
/// the returned tool-result block so the LLM can reason over them.
#[async_trait]
pub trait ToolDispatch: Send + Sync {
    async fn dispatch(
        &self,
        call: &ToolUseBlock,
        allowlist: &[String],
        ctx: &ToolContext,
    ) -> ToolResultBlock;

    /// Tool definitions for an agent's allow-list, as handed to the LLM.
    fn definitions_for(&self, allowlist: &[String]) -> Vec<ToolDefinition>;

    /// Minimum configured timeout across an allow-list, used to derive the
    /// overall step budget for concurrent fan-out.
    fn min_timeout_secs(&self, allowlist: &[String]) -> u64;
}

/// Production dispatcher over the registry and the remote MCP transport.
pub struct Dispatcher {
    registry: ToolRegistry,
    rate_limiter: Arc<RateLimiter>,
    metrics: Arc<Metrics>,
    mcp: McpClient,
}

impl Dispatcher {
    pub fn new(registry: ToolRegistry, rate_limiter: Arc<RateLimiter>, metrics: Arc<Metrics>) -> Self {
        Self {
            registry,
            rate_limiter,
            metrics,
            mcp: McpClient::new(),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    async fn execute_governed(
        &self,
        call: &ToolUseBlock,
        allowlist: &[String],
        ctx: &ToolContext,
    ) -> Result<Value, ToolError> {
        let name = call.name.as_str();

        if !allowlist.iter().any(|allowed| allowed == name) {
            return Err(ToolError::NotAllowed(name.to_string()));
        }

        if !self.rate_limiter.check(ctx.tenant_id, name) {
            self.metrics.record_rate_limit_rejection(name);
            return Err(ToolError::RateLimited {
                tool: name.to_string(),
                limit: self.rate_limiter.limit_for(name),
            });
        }

        let policy = ctx.policy.as_ref();
        let decision = evaluate_tool_call(policy, name, &call.input);
        if !decision.allowed {
            return Err(ToolError::PolicyDenied {
                reason: decision.reason.unwrap_or_else(|| "policy denied".into()),
            });
        }

        let result = if is_remote_tool(name) {
            self.execute_remote(call, ctx).await?
        } else {
            self.execute_local(call, ctx).await?
        };

        Ok(redact_output(policy, result))
    }

    async fn execute_local(&self, call: &ToolUseBlock, ctx: &ToolContext) -> Result<Value, ToolError> {
        let tool = self
            .registry
            .get(&call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;

        let budget = Duration::from_secs(tool.timeout_secs());
        let execution = timeout(budget, tool.execute(call.input.clone(), ctx))
            .await
            .map_err(|_| ToolError::Timeout {
                tool: call.name.clone(),
                timeout_secs: tool.timeout_secs(),
            })?;

        match execution.into_parts(&call.name) {
            (Some(payload), None) => Ok(payload),
            (_, Some(error)) => Err(ToolError::Failed(error)),
            (None, None) => Ok(Value::Null),
        }
    }

    async fn execute_remote(&self, call: &ToolUseBlock, ctx: &ToolContext) -> Result<Value, ToolError> {
        let (connector_id, remote_name) = parse_synthetic_name(&call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;

        let connector = ctx
            .db
            .get_connector(ctx.tenant_id, connector_id)
            .await
            .map_err(ToolError::Internal)?
            .ok_or_else(|| {
                ToolError::Failed(format!("connector {connector_id} not found or revoked"))
            })?;

        let budget = Duration::from_secs(REMOTE_TOOL_TIMEOUT_SECS);
        timeout(
            budget,
            self.mcp
                .call_tool(&connector, &remote_name, call.input.clone(), &ctx.vault, &ctx.db),
        )
        .await
        .map_err(|_| ToolError::Timeout {
            tool: call.name.clone(),
            timeout_secs: REMOTE_TOOL_TIMEOUT_SECS,
        })?
    }

    /// Exactly one audit event per invocation, carrying status, duration,
    /// caller, correlation id and (for local tools) the sanitised params.
    async fn audit_invocation(
        &self,
        call: &ToolUseBlock,
        ctx: &ToolContext,
        outcome: &Result<Value, ToolError>,
        duration: Duration,
    ) {
        let (category, action, status, error_message) = match outcome {
            Ok(_) => ("tool", "tool.call", "success".to_string(), None),
            Err(err @ ToolError::PolicyDenied { .. }) => {
                ("policy", "tool.denied", "denied".to_string(), Some(err.to_string()))
            }
            Err(err) => ("tool", "tool.call", err.audit_status().to_string(), Some(err.to_string())),
        };

        let mut payload = json!({
            "tool": call.name,
            "duration_ms": duration.as_millis() as u64,
        });
        if !is_remote_tool(&call.name) {
            payload["params"] = sanitize_params(&call.input);
        }

        let mut event = NewAuditEvent::new(ctx.tenant_id, category, action)
            .correlation(ctx.correlation_id.clone())
            .resource("tool", call.name.clone())
            .payload(payload)
            .status(status);
        if let Some(actor_id) = ctx.actor_id {
            event = event.actor(actor_id);
        }
        if let Some(message) = error_message {
            event.error_message = Some(message);
        }

        let audit_result = async {
            let mut tx = ctx.db.tenant_tx(ctx.tenant_id).await?;
            AuditLog::append(tx.conn(), event).await?;
            tx.commit().await
        }
        .await;

        if let Err(e) = audit_result {
            warn!(tool = %call.name, error = %e, "failed to write tool audit event");
        }
    }
}

#[async_trait]
impl ToolDispatch for Dispatcher {
    async fn dispatch(
        &self,
        call: &ToolUseBlock,
        allowlist: &[String],
        ctx: &ToolContext,
    ) -> ToolResultBlock {
        let started = Instant::now();
        let outcome = self.execute_governed(call, allowlist, ctx).await;
        let duration = started.elapsed();

        let status = match &outcome {
            Ok(_) => "success".to_string(),
            Err(err) => err.audit_status().to_string(),
        };
        self.metrics.record_duration(&call.name, duration.as_secs_f64());
        self.metrics.record_call(&call.name, &status);

        self.audit_invocation(call, ctx, &outcome, duration).await;

        match outcome {
            Ok(payload) => ToolResultBlock::ok(call.id.as_str(), call.name.as_str(), payload),
            Err(err) => {
                ToolResultBlock::err(call.id.as_str(), call.name.as_str(), err.llm_message())
            }
        }
    }

    fn definitions_for(&self, allowlist: &[String]) -> Vec<ToolDefinition> {
        self.registry.definitions_for(allowlist)
    }

    fn min_timeout_secs(&self, allowlist: &[String]) -> u64 {
        allowlist
            .iter()
            .filter_map(|name| self.registry.get(name).map(|tool| tool.timeout_secs()))
            .chain(
                allowlist
                    .iter()
                    .filter(|name| is_remote_tool(name))
                    .map(|_| REMOTE_TOOL_TIMEOUT_SECS),
            )
            .min()
            .unwrap_or(REMOTE_TOOL_TIMEOUT_SECS)
    }
}

/// Truncate long string parameters before they land in the audit payload.
fn sanitize_params(params: &Value) -> Value {
    match params {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, val)| (key.clone(), sanitize_params(val)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_params).collect()),
        Value::String(s) if s.chars().count() > PARAM_PREVIEW_LIMIT => {
            Value::String(s.chars().take(PARAM_PREVIEW_LIMIT).collect::<String>() + "…")
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{LocalTool, ToolExecution, ToolRegistry};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use suitechat_storage::{encryption::generate_key, CredentialVault, Database};
    use uuid::Uuid;

    struct CountingTool {
        executions: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LocalTool for CountingTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the input back"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, params: Value, _ctx: &ToolContext) -> ToolExecution {
            self.executions.fetch_add(1, Ordering::SeqCst);
            ToolExecution::success(params)
        }
    }

    fn test_context() -> ToolContext {
        let db = Database::from_url_lazy("postgres://localhost:1/suitechat_test").unwrap();
        let vault = CredentialVault::new(&generate_key(), 1).unwrap();
        ToolContext::new(db, vault, Uuid::now_v7(), "corr-test")
    }

    #[tokio::test]
    async fn rate_limited_call_skips_the_executor_and_counts_the_rejection() {
        let executions = Arc::new(AtomicUsize::new(0));
        let registry = ToolRegistry::builder()
            .register(CountingTool {
                executions: Arc::clone(&executions),
            })
            .build();
        let metrics = Arc::new(Metrics::new());
        let dispatcher = Dispatcher::new(
            registry,
            Arc::new(RateLimiter::new(10)),
            Arc::clone(&metrics),
        );

        let ctx = test_context();
        let allowlist = vec!["echo".to_string()];
        let call = ToolUseBlock {
            id: "tu_1".into(),
            name: "echo".into(),
            input: json!({"n": 1}),
        };

        for i in 0..10 {
            let result = dispatcher.dispatch(&call, &allowlist, &ctx).await;
            assert!(!result.is_error(), "call {i} should pass");
        }
        assert_eq!(executions.load(Ordering::SeqCst), 10);

        let denied = dispatcher.dispatch(&call, &allowlist, &ctx).await;
        assert!(denied.is_error());
        assert!(denied.error.as_deref().unwrap().contains("rate limit"));
        // Executor never ran for the rejected call
        assert_eq!(executions.load(Ordering::SeqCst), 10);
        assert_eq!(metrics.rejection_count("echo"), 1);
        assert_eq!(metrics.call_count("echo", "rate_limited"), 1);
    }

    #[tokio::test]
    async fn disallowed_tool_is_rejected_before_execution() {
        let executions = Arc::new(AtomicUsize::new(0));
        let registry = ToolRegistry::builder()
            .register(CountingTool {
                executions: Arc::clone(&executions),
            })
            .build();
        let dispatcher = Dispatcher::new(
            registry,
            Arc::new(RateLimiter::default()),
            Arc::new(Metrics::new()),
        );

        let ctx = test_context();
        let call = ToolUseBlock {
            id: "tu_1".into(),
            name: "echo".into(),
            input: json!({}),
        };
        let result = dispatcher.dispatch(&call, &["rag_search".to_string()], &ctx).await;
        assert!(result.is_error());
        assert!(result.error.as_deref().unwrap().contains("not allowed"));
        assert_eq!(executions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn policy_denial_reaches_the_llm_with_the_reason() {
        use chrono::Utc;
        use suitechat_storage::PolicyProfileRow;

        let executions = Arc::new(AtomicUsize::new(0));
        let registry = ToolRegistry::builder()
            .register(CountingTool {
                executions: Arc::clone(&executions),
            })
            .build();
        let dispatcher = Dispatcher::new(
            registry,
            Arc::new(RateLimiter::default()),
            Arc::new(Metrics::new()),
        );

        let policy = PolicyProfileRow {
            id: Uuid::now_v7(),
            tenant_id: Uuid::now_v7(),
            name: "default".into(),
            version: 1,
            is_active: true,
            is_locked: false,
            read_only_mode: true,
            allowed_record_types: None,
            blocked_fields: Some(json!(["ssn"])),
            tool_allowlist: None,
            max_rows_per_query: 1000,
            require_row_limit: false,
            custom_rules: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let ctx = test_context().with_policy(Some(policy));

        let call = ToolUseBlock {
            id: "tu_1".into(),
            name: "echo".into(),
            input: json!({"query": "SELECT ssn FROM employee"}),
        };
        let result = dispatcher.dispatch(&call, &["echo".to_string()], &ctx).await;
        assert!(result.is_error());
        assert!(result.error.as_deref().unwrap().contains("ssn"));
        assert_eq!(executions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn sanitize_truncates_long_strings_only() {
        let long = "x".repeat(600);
        let params = json!({"query": long, "limit": 10, "tags": ["short"]});
        let sanitized = sanitize_params(&params);
        assert_eq!(sanitized["limit"], 10);
        assert_eq!(sanitized["tags"][0], "short");
        assert!(sanitized["query"].as_str().unwrap().chars().count() <= PARAM_PREVIEW_LIMIT + 1);
    }
}
