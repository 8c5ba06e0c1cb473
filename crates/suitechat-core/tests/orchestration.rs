// End-to-end coordinator scenarios with scripted LLM responses and a
// recording dispatcher. No network, no database: the adapter plays back
// canned responses and the dispatcher serves canned tool payloads.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use suitechat_contracts::{ToolDefinition, ToolResultBlock, ToolUseBlock};
use suitechat_core::agents::{run_agent, AgentKind, AgentSpec};
use suitechat_core::{ChatConfig, Coordinator};
use suitechat_llm::{LlmAdapter, LlmError, LlmRequest, LlmResponse, TokenUsage};
use suitechat_storage::{encryption::generate_key, CredentialVault, Database};
use suitechat_tools::{ToolContext, ToolDispatch};

// ============================================================================
// Scripted doubles
// ============================================================================

struct ScriptedAdapter {
    responses: Mutex<VecDeque<LlmResponse>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedAdapter {
    fn new(responses: Vec<LlmResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request_texts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|req| {
                req.messages
                    .iter()
                    .map(|m| m.text())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect()
    }
}

#[async_trait]
impl LlmAdapter for ScriptedAdapter {
    async fn create_message(&self, request: LlmRequest) -> suitechat_llm::Result<LlmResponse> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::config("scripted adapter ran out of responses"))
    }
}

fn text_response(text: &str) -> LlmResponse {
    LlmResponse {
        text_blocks: vec![text.to_string()],
        tool_use_blocks: vec![],
        usage: TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
        },
    }
}

fn tool_use_response(id: &str, name: &str, input: Value) -> LlmResponse {
    LlmResponse {
        text_blocks: vec![],
        tool_use_blocks: vec![ToolUseBlock {
            id: id.into(),
            name: name.into(),
            input,
        }],
        usage: TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
        },
    }
}

struct RecordingDispatch {
    payloads: HashMap<String, Value>,
    calls: Mutex<Vec<ToolUseBlock>>,
}

impl RecordingDispatch {
    fn new(payloads: HashMap<String, Value>) -> Self {
        Self {
            payloads,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn called_tools(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }
}

#[async_trait]
impl ToolDispatch for RecordingDispatch {
    async fn dispatch(
        &self,
        call: &ToolUseBlock,
        _allowlist: &[String],
        _ctx: &ToolContext,
    ) -> ToolResultBlock {
        self.calls.lock().unwrap().push(call.clone());
        match self.payloads.get(&call.name) {
            Some(payload) => {
                ToolResultBlock::ok(call.id.as_str(), call.name.as_str(), payload.clone())
            }
            None => ToolResultBlock::err(call.id.as_str(), call.name.as_str(), "tool not scripted"),
        }
    }

    fn definitions_for(&self, allowlist: &[String]) -> Vec<ToolDefinition> {
        allowlist
            .iter()
            .map(|name| ToolDefinition::new(name.as_str(), "scripted", json!({"type": "object"})))
            .collect()
    }

    fn min_timeout_secs(&self, _allowlist: &[String]) -> u64 {
        30
    }
}

fn test_ctx() -> ToolContext {
    let db = Database::from_url_lazy("postgres://localhost:1/suitechat_test").unwrap();
    let vault = CredentialVault::new(&generate_key(), 1).unwrap();
    ToolContext::new(db, vault, Uuid::now_v7(), "corr-test")
}

const MARKDOWN_TABLE: &str = "\
| Document Number | Date | Amount |
|-----------------|------|--------|
| SO-1001 | 2026-07-01 | 150.00 |
| SO-1002 | 2026-07-02 | 220.00 |";

// ============================================================================
// Scenarios
// ============================================================================

/// A data query routes to the suiteql agent, runs one tool call, and the
/// resulting markdown table reaches the user verbatim; the synthesis LLM
/// call is never made.
#[tokio::test]
async fn single_agent_data_query_passes_table_through_without_synthesis() {
    let adapter = ScriptedAdapter::new(vec![
        tool_use_response(
            "tu_1",
            "netsuite.suiteql",
            json!({"query": "SELECT tranid, trandate, total FROM transaction WHERE type = 'SalesOrd' ORDER BY trandate DESC FETCH FIRST 10 ROWS ONLY"}),
        ),
        text_response(MARKDOWN_TABLE),
    ]);
    let dispatch = RecordingDispatch::new(HashMap::from([(
        "netsuite.suiteql".to_string(),
        json!({"rows": [{"tranid": "SO-1001"}], "row_count": 10}),
    )]));
    let config = ChatConfig::default();
    let ctx = test_ctx();

    let coordinator = Coordinator::new(&adapter, &dispatch, &config);
    let output = coordinator
        .run("show me the last 10 sales orders", &[], "", &ctx)
        .await
        .unwrap();

    assert_eq!(output.route, "suiteql");
    assert_eq!(output.response, MARKDOWN_TABLE);
    assert!(!output.synthesis_used, "synthesis should be bypassed");
    // Two LLM calls: tool step + final table. No classifier fallback, no
    // synthesis call.
    assert_eq!(adapter.request_count(), 2);
    assert_eq!(dispatch.called_tools(), vec!["netsuite.suiteql"]);
    assert!(output.results[0].success);
}

/// A short "no results" reply from a single agent also bypasses synthesis.
#[tokio::test]
async fn no_results_reply_passes_through() {
    let adapter = ScriptedAdapter::new(vec![
        tool_use_response("tu_1", "netsuite.suiteql", json!({"query": "SELECT id FROM transaction FETCH FIRST 5 ROWS ONLY"})),
        text_response("No matching records were found for that date range."),
    ]);
    let dispatch = RecordingDispatch::new(HashMap::from([(
        "netsuite.suiteql".to_string(),
        json!({"rows": [], "row_count": 0}),
    )]));
    let config = ChatConfig::default();
    let ctx = test_ctx();

    let output = Coordinator::new(&adapter, &dispatch, &config)
        .run("list orders from 2019", &[], "", &ctx)
        .await
        .unwrap();

    assert!(!output.synthesis_used);
    assert!(output.response.contains("No matching records"));
}

/// "hello" is lexically ambiguous: the LLM fallback classifier picks
/// ANALYSIS and the route runs suiteql then analysis sequentially, with
/// the analysis agent receiving the suiteql agent's data.
#[tokio::test]
async fn ambiguous_message_falls_back_to_llm_router_and_chains_agents() {
    let adapter = ScriptedAdapter::new(vec![
        // 1: fallback classifier
        text_response("ANALYSIS"),
        // 2: suiteql agent answers directly
        text_response("Revenue by month: Jan 100, Feb 120, Mar 95"),
        // 3: analysis agent narrative
        text_response("Revenue grew 20% from Jan to Feb, then dipped 21% in Mar."),
        // 4: synthesis over both outputs
        text_response("Here is the trend: growth in Feb, dip in Mar."),
    ]);
    let dispatch = RecordingDispatch::new(HashMap::new());
    let config = ChatConfig::default();
    let ctx = test_ctx();

    let output = Coordinator::new(&adapter, &dispatch, &config)
        .run("hello", &[], "", &ctx)
        .await
        .unwrap();

    assert_eq!(output.route, "suiteql+analysis");
    assert!(output.synthesis_used);
    assert_eq!(output.response, "Here is the trend: growth in Feb, dip in Mar.");
    assert_eq!(adapter.request_count(), 4);
    assert_eq!(dispatch.call_count(), 0);

    // The analysis agent's task carried the suiteql agent's output
    let texts = adapter.request_texts();
    assert!(texts[2].contains("Data from the previous step"));
    assert!(texts[2].contains("Revenue by month"));
}

/// Two non-trivial outputs force the synthesis call even when one of them
/// contains a table.
#[tokio::test]
async fn multiple_results_always_synthesise() {
    let adapter = ScriptedAdapter::new(vec![
        text_response("ANALYSIS"),
        text_response(MARKDOWN_TABLE),
        text_response("Totals are trending upward."),
        text_response("Synthesised answer."),
    ]);
    let dispatch = RecordingDispatch::new(HashMap::new());
    let config = ChatConfig::default();
    let ctx = test_ctx();

    let output = Coordinator::new(&adapter, &dispatch, &config)
        .run("hmm", &[], "", &ctx)
        .await
        .unwrap();

    assert!(output.synthesis_used);
    assert_eq!(output.response, "Synthesised answer.");
}

/// The agent loop terminates with success=false once its step budget is
/// exhausted by tool-calling responses.
#[tokio::test]
async fn agent_stops_at_max_steps_with_a_note() {
    let spec = AgentSpec::for_kind(AgentKind::SuiteQl, None);
    let responses: Vec<LlmResponse> = (0..spec.max_steps)
        .map(|i| {
            tool_use_response(
                &format!("tu_{i}"),
                "netsuite.suiteql",
                json!({"query": format!("SELECT {i} FROM dual FETCH FIRST 1 ROWS ONLY")}),
            )
        })
        .collect();
    let adapter = ScriptedAdapter::new(responses);
    let dispatch = RecordingDispatch::new(HashMap::from([(
        "netsuite.suiteql".to_string(),
        json!({"rows": [], "row_count": 0}),
    )]));
    let ctx = test_ctx();

    let result = run_agent(
        &spec,
        "loop forever",
        "",
        &[],
        &adapter,
        &dispatch,
        &ctx,
        "claude-sonnet-4-5-20250929",
        1024,
    )
    .await;

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("max steps"));
    assert_eq!(result.tool_calls.len(), spec.max_steps);
    assert_eq!(dispatch.call_count(), spec.max_steps);
}

/// Tool errors are reflected back to the LLM as tool results, and the
/// agent can still conclude.
#[tokio::test]
async fn agent_recovers_from_a_tool_error() {
    let spec = AgentSpec::for_kind(AgentKind::Rag, None);
    let adapter = ScriptedAdapter::new(vec![
        tool_use_response("tu_1", "rag_search", json!({"query": "vat rules"})),
        text_response("I could not find documentation on VAT rules."),
    ]);
    // rag_search is not scripted, so the dispatcher returns an error block
    let dispatch = RecordingDispatch::new(HashMap::new());
    let ctx = test_ctx();

    let result = run_agent(
        &spec,
        "find vat docs",
        "",
        &[],
        &adapter,
        &dispatch,
        &ctx,
        "claude-sonnet-4-5-20250929",
        1024,
    )
    .await;

    assert!(result.success);
    assert_eq!(result.tool_calls.len(), 1);
    assert_eq!(result.tool_calls[0].status, "error");

    // The second request carried the error back as a tool_result block
    let requests = adapter.requests.lock().unwrap();
    let carried_error = requests[1].messages.iter().any(|msg| {
        msg.content.iter().any(|block| {
            matches!(
                block,
                suitechat_contracts::ContentBlock::ToolResult { is_error: true, .. }
            )
        })
    });
    assert!(carried_error);
}

/// The vernacular block lands in the agent's system prompt.
#[tokio::test]
async fn vernacular_block_is_folded_into_the_system_prompt() {
    let spec = AgentSpec::for_kind(AgentKind::SuiteQl, None);
    let adapter = ScriptedAdapter::new(vec![text_response("done")]);
    let dispatch = RecordingDispatch::new(HashMap::new());
    let ctx = test_ctx();

    let vernacular = "<tenant_vernacular>\n  <resolved_entities/>\n</tenant_vernacular>";
    run_agent(
        &spec,
        "task",
        vernacular,
        &[],
        &adapter,
        &dispatch,
        &ctx,
        "claude-sonnet-4-5-20250929",
        1024,
    )
    .await;

    let requests = adapter.requests.lock().unwrap();
    assert!(requests[0].system.contains("<tenant_vernacular>"));
}
