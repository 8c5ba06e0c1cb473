// Specialist agents: a bounded agentic loop with a scoped tool set.
//
// Each step is one LLM call. A response without tool-use terminates the
// loop; otherwise every tool-use block is dispatched concurrently through
// the governed dispatcher, the results are appended, and the loop
// continues until the step budget runs out.

use std::time::Instant;

use futures::future::join_all;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};

use suitechat_contracts::{AgentResult, Citation, Message, ToolCallRecord};
use suitechat_llm::{LlmAdapter, LlmRequest};
use suitechat_tools::{ToolContext, ToolDispatch};

use crate::prompts::{
    suiteql_agent_prompt, ANALYSIS_AGENT_PROMPT, RAG_AGENT_PROMPT, WORKSPACE_AGENT_PROMPT,
};

/// Margin added to the derived step timeout so a single slow tool still
/// surfaces its own timeout error instead of killing the step.
const STEP_TIMEOUT_MARGIN_SECS: u64 = 10;

/// The specialist agent catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    SuiteQl,
    Rag,
    Workspace,
    Analysis,
}

/// Static description of one agent: its prompt, step budget, and the
/// subset of the registry it may call.
pub struct AgentSpec {
    pub name: &'static str,
    pub max_steps: usize,
    pub system_prompt: String,
    pub allowlist: Vec<String>,
}

impl AgentSpec {
    pub fn for_kind(kind: AgentKind, metadata_reference: Option<&str>) -> Self {
        match kind {
            AgentKind::SuiteQl => AgentSpec {
                name: "suiteql",
                max_steps: 4,
                system_prompt: suiteql_agent_prompt(metadata_reference),
                allowlist: vec![
                    "netsuite.suiteql".into(),
                    "netsuite.connectivity".into(),
                    "netsuite.refresh_metadata".into(),
                ],
            },
            AgentKind::Rag => AgentSpec {
                name: "rag",
                max_steps: 2,
                system_prompt: RAG_AGENT_PROMPT.into(),
                allowlist: vec!["rag_search".into()],
            },
            AgentKind::Workspace => AgentSpec {
                name: "workspace",
                max_steps: 5,
                system_prompt: WORKSPACE_AGENT_PROMPT.into(),
                allowlist: vec![
                    "workspace.list_files".into(),
                    "workspace.read_file".into(),
                    "workspace.search".into(),
                    "workspace.propose_patch".into(),
                    "rag_search".into(),
                ],
            },
            AgentKind::Analysis => AgentSpec {
                name: "analysis",
                max_steps: 1,
                system_prompt: ANALYSIS_AGENT_PROMPT.into(),
                allowlist: Vec::new(),
            },
        }
    }
}

/// Run one agent to completion on a task.
///
/// `vernacular` is the tenant-vernacular block (possibly empty) folded
/// into the system prompt. `conversation` is the (already compacted)
/// history; the task lands as the final user message.
#[allow(clippy::too_many_arguments)]
pub async fn run_agent(
    spec: &AgentSpec,
    task: &str,
    vernacular: &str,
    conversation: &[Message],
    adapter: &dyn LlmAdapter,
    dispatch: &dyn ToolDispatch,
    tool_ctx: &ToolContext,
    model: &str,
    max_tokens: u32,
) -> AgentResult {
    let system = if vernacular.is_empty() {
        spec.system_prompt.clone()
    } else {
        format!("{}\n\n{}", spec.system_prompt, vernacular)
    };

    let tools = dispatch.definitions_for(&spec.allowlist);
    let mut messages: Vec<Message> = conversation.to_vec();
    messages.push(Message::user(task));

    let mut tokens_used: u32 = 0;
    let mut tool_calls: Vec<ToolCallRecord> = Vec::new();
    let mut citations: Vec<Citation> = Vec::new();
    let mut last_text = String::new();

    for step in 1..=spec.max_steps {
        let mut request = LlmRequest::new(model, max_tokens, system.clone())
            .with_messages(messages.clone());
        if !tools.is_empty() {
            request = request.with_tools(tools.clone());
        }

        let response = match adapter.create_message(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(agent = spec.name, step = step, error = %err, "agent LLM call failed");
                return AgentResult {
                    agent: spec.name.into(),
                    success: false,
                    data: last_text,
                    error: Some(format!("LLM call failed: {err}")),
                    tokens_used,
                    tool_calls,
                    citations,
                };
            }
        };
        tokens_used += response.usage.total();

        if !response.has_tool_use() {
            let data = response.text();
            info!(agent = spec.name, steps = step, "agent completed");
            return AgentResult {
                agent: spec.name.into(),
                success: true,
                data,
                error: None,
                tokens_used,
                tool_calls,
                citations,
            };
        }

        last_text = response.text();
        let tool_uses = response.tool_use_blocks.clone();
        messages.push(adapter.build_assistant_message(&response));

        // All tool calls from one step run concurrently, raced against a
        // step budget derived from the minimum per-tool timeout.
        let step_budget = Duration::from_secs(
            dispatch.min_timeout_secs(&spec.allowlist) + STEP_TIMEOUT_MARGIN_SECS,
        );
        let dispatches = tool_uses.iter().map(|tool_use| {
            let started = Instant::now();
            async move {
                let result = dispatch.dispatch(tool_use, &spec.allowlist, tool_ctx).await;
                (tool_use, result, started.elapsed())
            }
        });

        let outcomes = match timeout(step_budget, join_all(dispatches)).await {
            Ok(outcomes) => outcomes,
            Err(_) => {
                warn!(agent = spec.name, step = step, "tool step exceeded its budget");
                return AgentResult {
                    agent: spec.name.into(),
                    success: false,
                    data: last_text,
                    error: Some("tool execution exceeded the step budget".into()),
                    tokens_used,
                    tool_calls,
                    citations,
                };
            }
        };

        let mut results = Vec::with_capacity(outcomes.len());
        for (tool_use, result, elapsed) in outcomes {
            tool_calls.push(ToolCallRecord {
                tool: tool_use.name.clone(),
                params: tool_use.input.clone(),
                status: (if result.is_error() { "error" } else { "success" }).into(),
                duration_ms: elapsed.as_millis() as u64,
            });
            collect_citations(&result, &mut citations);
            results.push(result);
        }
        messages.push(adapter.build_tool_result_message(&results));
    }

    info!(agent = spec.name, max_steps = spec.max_steps, "agent hit its step budget");
    AgentResult {
        agent: spec.name.into(),
        success: false,
        data: last_text,
        error: Some(format!("max steps ({}) reached", spec.max_steps)),
        tokens_used,
        tool_calls,
        citations,
    }
}

/// Pull citations out of rag_search payloads.
fn collect_citations(result: &suitechat_contracts::ToolResultBlock, citations: &mut Vec<Citation>) {
    if result.tool_name != "rag_search" {
        return;
    }
    let Some(payload) = &result.payload else {
        return;
    };
    let Some(results) = payload.get("results").and_then(|v| v.as_array()) else {
        return;
    };
    for item in results {
        let Some(source_path) = item.get("source_path").and_then(|v| v.as_str()) else {
            continue;
        };
        citations.push(Citation {
            source_path: source_path.to_string(),
            title: item
                .get("title")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            similarity: item.get("similarity_score").and_then(|v| v.as_f64()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_budgets_and_allowlists() {
        let suiteql = AgentSpec::for_kind(AgentKind::SuiteQl, None);
        assert_eq!(suiteql.max_steps, 4);
        assert!(suiteql.allowlist.contains(&"netsuite.suiteql".to_string()));

        let rag = AgentSpec::for_kind(AgentKind::Rag, None);
        assert_eq!(rag.max_steps, 2);
        assert_eq!(rag.allowlist, vec!["rag_search".to_string()]);

        let workspace = AgentSpec::for_kind(AgentKind::Workspace, None);
        assert_eq!(workspace.max_steps, 5);
        // No write-through tool: changes go through propose_patch only
        assert!(!workspace.allowlist.iter().any(|t| t.contains("apply")));
        assert!(workspace
            .allowlist
            .contains(&"workspace.propose_patch".to_string()));

        let analysis = AgentSpec::for_kind(AgentKind::Analysis, None);
        assert_eq!(analysis.max_steps, 1);
        assert!(analysis.allowlist.is_empty());
    }

    #[test]
    fn suiteql_prompt_carries_the_metadata_reference() {
        let spec = AgentSpec::for_kind(AgentKind::SuiteQl, Some("customlist_stage: 1=Open, 2=Closed"));
        assert!(spec.system_prompt.contains("customlist_stage"));
    }
}
