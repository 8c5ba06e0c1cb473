// Turn runner: one user message in, one assistant message out.
//
// The whole turn runs on a single tenant-bound transaction so the user
// message, assistant message, billing, and audit commit together. The
// coordinator runs under the outer turn budget; a timed-out or failed
// turn still persists an assistant message for conversational continuity
// but is never billed.

use std::collections::BTreeSet;
use std::sync::Arc;

use regex::Regex;
use serde_json::json;
use std::sync::OnceLock;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};
use uuid::Uuid;

use suitechat_contracts::{Message, ToolCallRecord};
use suitechat_llm::LlmAdapter;
use suitechat_storage::{
    deduct_credits, AuditLog, ChatMessageRow, CredentialVault, Database, DeductionReceipt,
    Embedder, NewAuditEvent, NewChatMessage,
};
use suitechat_tools::{ToolContext, ToolDispatch};

use crate::billing::calculate_cost;
use crate::compactor::compact_history;
use crate::config::ChatConfig;
use crate::coordinator::Coordinator;
use crate::error::{CoreError, Result};
use crate::memory::maybe_extract_correction;
use crate::sanitize::sanitize_user_input;
use crate::vernacular::resolve_vernacular;

const FALLBACK_RESPONSE: &str = "I'm sorry, I couldn't generate a response.";
const FAILURE_RESPONSE: &str =
    "I'm sorry, your request could not be completed. Please try again.";
const TIMEOUT_RESPONSE: &str =
    "I'm sorry, this request timed out before it could be completed. Please try again.";
const TITLE_LIMIT: usize = 100;

/// What one turn produced.
#[derive(Debug)]
pub struct TurnOutcome {
    pub assistant_message: ChatMessageRow,
    pub route: String,
    pub receipt: Option<DeductionReceipt>,
    pub tokens_used: u32,
}

/// Runs chat turns end to end.
pub struct TurnRunner {
    db: Database,
    vault: CredentialVault,
    adapter: Arc<dyn LlmAdapter>,
    dispatch: Arc<dyn ToolDispatch>,
    embedder: Option<Arc<dyn Embedder>>,
    config: ChatConfig,
}

impl TurnRunner {
    pub fn new(
        db: Database,
        vault: CredentialVault,
        adapter: Arc<dyn LlmAdapter>,
        dispatch: Arc<dyn ToolDispatch>,
        config: ChatConfig,
    ) -> Self {
        Self {
            db,
            vault,
            adapter,
            dispatch,
            embedder: None,
            config,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Execute a full chat turn. A supplied correlation id (propagated
    /// from the front end) is respected; otherwise one is generated.
    pub async fn run_turn(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        session_id: Uuid,
        user_message: &str,
        correlation_id: Option<String>,
    ) -> Result<TurnOutcome> {
        let correlation_id = correlation_id.unwrap_or_else(|| Uuid::now_v7().to_string());
        let mut tx = self.db.tenant_tx(tenant_id).await?;

        let session = self
            .db
            .get_session(tx.conn(), tenant_id, session_id)
            .await?
            .ok_or_else(|| CoreError::invariant(format!("session {session_id} not found")))?;

        // Conversation history, oldest first
        let history_rows = self
            .db
            .recent_messages(
                tx.conn(),
                tenant_id,
                session_id,
                self.config.history_message_limit(),
            )
            .await?;
        let history: Vec<Message> = history_rows
            .iter()
            .filter_map(|row| match row.role.as_str() {
                "user" => Some(Message::user(row.content.as_str())),
                "assistant" => Some(Message::assistant(row.content.as_str())),
                _ => None,
            })
            .collect();

        let sanitized = sanitize_user_input(user_message);

        // User message flush happens-before coordinator start
        self.db
            .insert_chat_message(
                tx.conn(),
                tenant_id,
                NewChatMessage::text(session_id, "user", user_message),
            )
            .await?;

        let vernacular = resolve_vernacular(
            &self.db,
            tx.conn(),
            tenant_id,
            &sanitized,
            self.adapter.as_ref(),
            &self.config.fast_model,
        )
        .await;

        let history =
            compact_history(history, self.adapter.as_ref(), &self.config.fast_model).await;

        let policy = self.db.active_policy(tenant_id).await?;
        let tool_ctx = {
            let mut ctx = ToolContext::new(
                self.db.clone(),
                self.vault.clone(),
                tenant_id,
                correlation_id.clone(),
            )
            .with_actor(user_id)
            .with_policy(policy);
            if let Some(workspace_id) = session.workspace_id {
                ctx = ctx.with_workspace(workspace_id);
            }
            if let Some(embedder) = &self.embedder {
                ctx = ctx.with_embedder(embedder.clone());
            }
            ctx
        };

        let coordinator =
            Coordinator::new(self.adapter.as_ref(), self.dispatch.as_ref(), &self.config);
        let budget = Duration::from_secs(self.config.turn_budget_secs);
        let coordinated = timeout(
            budget,
            coordinator.run(&sanitized, &history, &vernacular, &tool_ctx),
        )
        .await;

        let output = match coordinated {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                warn!(error = %err, "coordinator failed; persisting degraded reply");
                return self
                    .finish_failed_turn(
                        tx,
                        tenant_id,
                        user_id,
                        session_id,
                        &correlation_id,
                        FAILURE_RESPONSE,
                        err.audit_status(),
                        &err.to_string(),
                    )
                    .await;
            }
            Err(_) => {
                warn!(budget_secs = self.config.turn_budget_secs, "turn budget exceeded");
                return self
                    .finish_failed_turn(
                        tx,
                        tenant_id,
                        user_id,
                        session_id,
                        &correlation_id,
                        TIMEOUT_RESPONSE,
                        "timeout",
                        "turn budget exceeded",
                    )
                    .await;
            }
        };

        let response_text = if output.response.trim().is_empty() {
            FALLBACK_RESPONSE.to_string()
        } else {
            output.response.clone()
        };

        let tool_call_log: Vec<&ToolCallRecord> =
            output.results.iter().flat_map(|r| &r.tool_calls).collect();
        let citations: Vec<_> = output.results.iter().flat_map(|r| &r.citations).collect();

        // Assistant message flush happens-before billing
        let assistant_message = self
            .db
            .insert_chat_message(
                tx.conn(),
                tenant_id,
                NewChatMessage {
                    session_id,
                    role: "assistant".into(),
                    content: response_text.clone(),
                    tool_calls: Some(json!(&tool_call_log)),
                    citations: Some(json!(&citations)),
                    input_tokens: None,
                    output_tokens: Some(output.tokens_used as i32),
                    provider: Some(self.config.provider.clone()),
                    model: Some(self.config.model.clone()),
                    is_byok: false,
                },
            )
            .await?;

        // Auto-title from the raw first user message, matching what was
        // persisted above
        if session.title.as_deref().unwrap_or("").is_empty() {
            let title: String = user_message.chars().take(TITLE_LIMIT).collect();
            self.db
                .set_session_title_if_unset(tx.conn(), session_id, title.trim())
                .await?;
        }

        // Memory update (regex-gated; zero cost on most turns)
        maybe_extract_correction(
            &self.db,
            tx.conn(),
            tenant_id,
            user_id,
            &sanitized,
            &response_text,
            self.adapter.as_ref(),
            &self.config.fast_model,
        )
        .await;

        // Billing happens-before audit
        let cost = calculate_cost(&self.config.model);
        let receipt = deduct_credits(tx.conn(), tenant_id, cost).await?;

        let tools_called: Vec<&str> = tool_call_log.iter().map(|t| t.tool.as_str()).collect();
        let db_tables = tables_touched(&tool_call_log);
        AuditLog::append(
            tx.conn(),
            NewAuditEvent::new(tenant_id, "chat", "chat.turn")
                .actor(user_id)
                .resource("chat_session", session_id.to_string())
                .correlation(correlation_id.clone())
                .payload(json!({
                    "route": output.route,
                    "doc_chunks_count": citations.len(),
                    "db_tables": db_tables,
                    "tools_called": tools_called,
                })),
        )
        .await?;

        tx.commit().await?;

        info!(
            tenant_id = %tenant_id,
            session_id = %session_id,
            route = %output.route,
            tokens = output.tokens_used,
            "chat turn completed"
        );

        Ok(TurnOutcome {
            assistant_message,
            route: output.route,
            receipt,
            tokens_used: output.tokens_used,
        })
    }

    /// Persist the degraded assistant reply and the failure audit record.
    /// No billing on this path.
    #[allow(clippy::too_many_arguments)]
    async fn finish_failed_turn(
        &self,
        mut tx: suitechat_storage::TenantTx,
        tenant_id: Uuid,
        user_id: Uuid,
        session_id: Uuid,
        correlation_id: &str,
        response: &str,
        status: &str,
        error_message: &str,
    ) -> Result<TurnOutcome> {
        let assistant_message = self
            .db
            .insert_chat_message(
                tx.conn(),
                tenant_id,
                NewChatMessage::text(session_id, "assistant", response),
            )
            .await?;

        let mut event = NewAuditEvent::new(tenant_id, "chat", "chat.turn")
            .actor(user_id)
            .resource("chat_session", session_id.to_string())
            .correlation(correlation_id.to_string())
            .status(status);
        event.error_message = Some(error_message.to_string());
        AuditLog::append(tx.conn(), event).await?;

        tx.commit().await?;

        Ok(TurnOutcome {
            assistant_message,
            route: String::new(),
            receipt: None,
            tokens_used: 0,
        })
    }
}

fn from_clause_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bfrom\s+([a-z_][a-z0-9_.]*)").expect("from regex"))
}

/// Tables referenced by the turn's SuiteQL calls, for the audit payload.
fn tables_touched(tool_calls: &[&ToolCallRecord]) -> Vec<String> {
    let mut tables = BTreeSet::new();
    for record in tool_calls {
        if record.tool != "netsuite.suiteql" {
            continue;
        }
        if let Some(query) = record.params.get("query").and_then(|v| v.as_str()) {
            for caps in from_clause_regex().captures_iter(query) {
                if let Some(table) = caps.get(1) {
                    tables.insert(table.as_str().to_lowercase());
                }
            }
        }
    }
    tables.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_extracted_from_suiteql_calls_only() {
        let suiteql = ToolCallRecord {
            tool: "netsuite.suiteql".into(),
            params: json!({"query": "SELECT id FROM transaction t JOIN customer ON ... FROM transactionline"}),
            status: "success".into(),
            duration_ms: 10,
        };
        let rag = ToolCallRecord {
            tool: "rag_search".into(),
            params: json!({"query": "from the docs"}),
            status: "success".into(),
            duration_ms: 5,
        };
        let calls = vec![&suiteql, &rag];
        assert_eq!(tables_touched(&calls), vec!["transaction", "transactionline"]);
    }
}
