// Coordinator: intent classification, agent fan-out, synthesis.
//
// A lexical classifier routes the turn (priority order: DATA_QUERY,
// WORKSPACE_DEV, DOCUMENTATION, ANALYSIS); only AMBIGUOUS falls back to
// an LLM classifier. Routes run their agents in parallel or sequentially
// (sequential chains each agent's data into the next). When a single
// agent already produced a markdown table or a short no-results reply,
// synthesis is bypassed and its output reaches the user verbatim.

use futures::future::join_all;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{info, warn};

use suitechat_contracts::{AgentResult, Intent, Message};
use suitechat_llm::{LlmAdapter, LlmRequest};
use suitechat_tools::{ToolContext, ToolDispatch};

use crate::agents::{run_agent, AgentKind, AgentSpec};
use crate::config::ChatConfig;
use crate::error::Result;
use crate::prompts::{INPUT_SANITIZATION_PREFIX, INTENT_CLASSIFIER_PROMPT, SYNTHESIS_PROMPT};

const NO_RESULTS_MAX_LEN: usize = 200;

// ============================================================================
// Intent classification
// ============================================================================

fn bare_record_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*#?\d{3,}\s*$|^\s*(?:SO|PO|INV)[-_]?\d+\s*$").expect("id regex"))
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Lexical intent classifier. Pure function of the input string;
/// categories are evaluated in priority order.
pub fn classify_intent(message: &str) -> Intent {
    let text = message.trim();
    let lower = text.to_lowercase();

    // Bare numeric / record id
    if bare_record_id_regex().is_match(text) {
        return Intent::DataQuery;
    }

    let analysis_signal = contains_any(
        &lower,
        &[
            "compare",
            "month-over-month",
            "month over month",
            "year-over-year",
            "year over year",
            "trend",
            "top ",
            " by ",
        ],
    ) && contains_any(&lower, &["compare", "month", "year", "trend", "top "]);

    // Data retrieval vocabulary, unless the message reads as analysis
    let record_noun = contains_any(
        &lower,
        &[
            "sales order",
            "purchase order",
            "invoice",
            "transaction",
            "customer",
            "payment",
            "payout",
            "refund",
            "item",
            "order",
            "record",
            "rows",
        ],
    );
    let retrieval_verb = contains_any(
        &lower,
        &[
            "show me",
            "show ",
            "list ",
            "get ",
            "find ",
            "how many",
            "count ",
            "pull ",
            "last ",
            "latest",
            "suiteql",
        ],
    );
    if record_noun && retrieval_verb && !analysis_signal {
        return Intent::DataQuery;
    }

    if contains_any(
        &lower,
        &[
            "file",
            "patch",
            "script",
            "deploy",
            "suitescript",
            "test",
            "workspace",
            "refactor",
            "function",
            "code",
        ],
    ) {
        return Intent::WorkspaceDev;
    }

    if contains_any(
        &lower,
        &[
            "how do i",
            "how does",
            "what is",
            "what are",
            "explain",
            "documentation",
            "docs",
            "guide",
        ],
    ) {
        return Intent::Documentation;
    }

    if analysis_signal {
        return Intent::Analysis;
    }

    Intent::Ambiguous
}

/// LLM fallback classifier for ambiguous messages. Returns `Ambiguous`
/// when the model's reply cannot be parsed.
pub async fn classify_with_llm(adapter: &dyn LlmAdapter, model: &str, message: &str) -> Intent {
    let request = LlmRequest::new(model, 16, INTENT_CLASSIFIER_PROMPT)
        .with_messages(vec![Message::user(message)]);
    match adapter.create_message(request).await {
        Ok(response) => response
            .text()
            .trim()
            .parse::<Intent>()
            .unwrap_or(Intent::Ambiguous),
        Err(err) => {
            warn!(error = %err, "LLM intent fallback failed");
            Intent::Ambiguous
        }
    }
}

// ============================================================================
// Route registry
// ============================================================================

/// Agents to run for an intent, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePlan {
    pub agents: Vec<AgentKind>,
    pub parallel: bool,
}

/// Intent -> agents. An empty plan means "answer directly via synthesis".
pub fn route_for(intent: Intent) -> RoutePlan {
    match intent {
        Intent::DataQuery => RoutePlan {
            agents: vec![AgentKind::SuiteQl],
            parallel: false,
        },
        Intent::Documentation => RoutePlan {
            agents: vec![AgentKind::Rag],
            parallel: false,
        },
        Intent::WorkspaceDev => RoutePlan {
            agents: vec![AgentKind::Workspace],
            parallel: false,
        },
        // Analysis consumes the suiteql agent's output, so it chains
        Intent::Analysis => RoutePlan {
            agents: vec![AgentKind::SuiteQl, AgentKind::Analysis],
            parallel: false,
        },
        Intent::Ambiguous => RoutePlan {
            agents: Vec::new(),
            parallel: false,
        },
    }
}

// ============================================================================
// Synthesis pass-through helpers
// ============================================================================

fn scaffold_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<reasoning>.*?</reasoning>|<function_calls>.*?</function_calls>")
            .expect("scaffold regex")
    })
}

/// Strip `<reasoning>` / `<function_calls>` scaffolding from agent output.
pub fn strip_scaffolding(text: &str) -> String {
    scaffold_regex().replace_all(text, "").trim().to_string()
}

/// A markdown table needs a header row and a separator row.
pub fn has_markdown_table(text: &str) -> bool {
    let mut saw_pipe_row = false;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('|') && trimmed.ends_with('|') {
            if saw_pipe_row
                && trimmed
                    .trim_matches('|')
                    .chars()
                    .all(|c| matches!(c, '-' | ':' | '|' | ' '))
                && trimmed.contains('-')
            {
                return true;
            }
            saw_pipe_row = true;
        } else {
            saw_pipe_row = false;
        }
    }
    false
}

/// Short "no results" style statement.
pub fn is_no_results_statement(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.len() > NO_RESULTS_MAX_LEN {
        return false;
    }
    let lower = trimmed.to_lowercase();
    contains_any(
        &lower,
        &[
            "no results",
            "no result",
            "no records",
            "no matching",
            "no rows",
            "0 rows",
            "nothing found",
            "no data",
            "not find any",
            "found no",
        ],
    )
}

// ============================================================================
// Coordinator
// ============================================================================

/// What a coordinator run produced.
#[derive(Debug)]
pub struct CoordinatorOutput {
    pub response: String,
    pub route: String,
    pub intent: Intent,
    pub results: Vec<AgentResult>,
    /// False when the pass-through bypassed the synthesis LLM call
    pub synthesis_used: bool,
    pub tokens_used: u32,
}

/// Per-turn director: classifies, fans out, synthesises.
pub struct Coordinator<'a> {
    pub adapter: &'a dyn LlmAdapter,
    pub dispatch: &'a dyn ToolDispatch,
    pub config: &'a ChatConfig,
    /// Metadata reference injected into the SuiteQL agent's prompt
    pub metadata_reference: Option<String>,
}

impl<'a> Coordinator<'a> {
    pub fn new(
        adapter: &'a dyn LlmAdapter,
        dispatch: &'a dyn ToolDispatch,
        config: &'a ChatConfig,
    ) -> Self {
        Self {
            adapter,
            dispatch,
            config,
            metadata_reference: None,
        }
    }

    pub fn with_metadata_reference(mut self, reference: Option<String>) -> Self {
        self.metadata_reference = reference;
        self
    }

    /// Run one turn's worth of agents and produce the final text.
    pub async fn run(
        &self,
        user_message: &str,
        history: &[Message],
        vernacular: &str,
        tool_ctx: &ToolContext,
    ) -> Result<CoordinatorOutput> {
        let mut intent = classify_intent(user_message);
        if intent == Intent::Ambiguous {
            intent = classify_with_llm(self.adapter, &self.config.fast_model, user_message).await;
        }
        let plan = route_for(intent);
        let route = plan
            .agents
            .iter()
            .map(|kind| AgentSpec::for_kind(*kind, None).name)
            .collect::<Vec<_>>()
            .join("+");

        info!(intent = %intent, route = %route, "coordinator routing");

        let task = format!("{INPUT_SANITIZATION_PREFIX}\n\nUser request: {user_message}");

        let mut results: Vec<AgentResult> = Vec::new();
        let mut tokens_used: u32 = 0;

        if plan.parallel {
            let runs = plan.agents.iter().map(|kind| {
                let spec = AgentSpec::for_kind(*kind, self.metadata_reference.as_deref());
                let task = task.clone();
                async move {
                    run_agent(
                        &spec,
                        &task,
                        vernacular,
                        history,
                        self.adapter,
                        self.dispatch,
                        tool_ctx,
                        &self.config.model,
                        self.config.max_tokens,
                    )
                    .await
                }
            });
            results = join_all(runs).await;
        } else {
            let mut context_data: Option<String> = None;
            for kind in &plan.agents {
                let spec = AgentSpec::for_kind(*kind, self.metadata_reference.as_deref());
                let agent_task = match &context_data {
                    Some(data) => format!("{task}\n\nData from the previous step:\n{data}"),
                    None => task.clone(),
                };
                let result = run_agent(
                    &spec,
                    &agent_task,
                    vernacular,
                    history,
                    self.adapter,
                    self.dispatch,
                    tool_ctx,
                    &self.config.model,
                    self.config.max_tokens,
                )
                .await;
                if result.is_non_trivial() {
                    context_data = Some(result.data.clone());
                }
                results.push(result);
            }
        }

        tokens_used += results.iter().map(|r| r.tokens_used).sum::<u32>();

        // Pass-through: one non-trivial result that is already a table or
        // a short no-results statement goes out verbatim.
        let non_trivial: Vec<&AgentResult> =
            results.iter().filter(|r| r.is_non_trivial()).collect();
        if non_trivial.len() == 1 {
            let candidate = strip_scaffolding(&non_trivial[0].data);
            if has_markdown_table(&candidate) || is_no_results_statement(&candidate) {
                info!(agent = %non_trivial[0].agent, "synthesis pass-through");
                return Ok(CoordinatorOutput {
                    response: candidate,
                    route,
                    intent,
                    results,
                    synthesis_used: false,
                    tokens_used,
                });
            }
        }

        let (response, synthesis_tokens) = self
            .synthesise(user_message, history, &results)
            .await?;
        tokens_used += synthesis_tokens;

        Ok(CoordinatorOutput {
            response,
            route,
            intent,
            results,
            synthesis_used: true,
            tokens_used,
        })
    }

    async fn synthesise(
        &self,
        user_message: &str,
        history: &[Message],
        results: &[AgentResult],
    ) -> Result<(String, u32)> {
        let mut sections = Vec::new();
        for result in results {
            if result.is_non_trivial() {
                sections.push(format!(
                    "[{} agent]\n{}",
                    result.agent,
                    strip_scaffolding(&result.data)
                ));
            } else if let Some(error) = &result.error {
                sections.push(format!("[{} agent] failed: {}", result.agent, error));
            }
        }
        let agent_block = if sections.is_empty() {
            "No specialist agents were run for this request.".to_string()
        } else {
            sections.join("\n\n")
        };

        let mut messages: Vec<Message> = history.to_vec();
        messages.push(Message::user(format!(
            "User question: {user_message}\n\nSpecialist agent outputs:\n{agent_block}"
        )));

        let request = LlmRequest::new(
            self.config.model.as_str(),
            self.config.max_tokens,
            SYNTHESIS_PROMPT,
        )
        .with_messages(messages);
        let response = self.adapter.create_message(request).await?;
        let text = response.text();
        let text = if text.trim().is_empty() {
            "I'm sorry, I couldn't generate a response.".to_string()
        } else {
            text
        };
        Ok((text, response.usage.total()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifier_priority_and_signals() {
        assert_eq!(classify_intent("show me the last 10 sales orders"), Intent::DataQuery);
        assert_eq!(classify_intent("4512"), Intent::DataQuery);
        assert_eq!(classify_intent("SO-10023"), Intent::DataQuery);
        assert_eq!(
            classify_intent("patch the restlet script to add logging"),
            Intent::WorkspaceDev
        );
        assert_eq!(
            classify_intent("how do I set up a saved search?"),
            Intent::Documentation
        );
        assert_eq!(
            classify_intent("compare revenue month-over-month"),
            Intent::Analysis
        );
        assert_eq!(classify_intent("hello"), Intent::Ambiguous);
    }

    #[test]
    fn classifier_is_pure() {
        for message in ["show me invoices", "hello", "compare trends", "fix the script"] {
            assert_eq!(classify_intent(message), classify_intent(message));
        }
    }

    #[test]
    fn routes_match_the_registry() {
        assert_eq!(
            route_for(Intent::DataQuery).agents,
            vec![AgentKind::SuiteQl]
        );
        assert_eq!(route_for(Intent::Documentation).agents, vec![AgentKind::Rag]);
        assert_eq!(
            route_for(Intent::WorkspaceDev).agents,
            vec![AgentKind::Workspace]
        );
        let analysis = route_for(Intent::Analysis);
        assert_eq!(analysis.agents, vec![AgentKind::SuiteQl, AgentKind::Analysis]);
        assert!(!analysis.parallel);
    }

    #[test]
    fn markdown_table_detection() {
        let table = "Here are the orders:\n\n| id | amount |\n|----|--------|\n| 1 | 20 |";
        assert!(has_markdown_table(table));
        assert!(!has_markdown_table("just | some | pipes"));
        assert!(!has_markdown_table("| lonely header |"));
    }

    #[test]
    fn no_results_detection_requires_short_text() {
        assert!(is_no_results_statement("No matching records were found."));
        let long = format!("{} no results", "x".repeat(300));
        assert!(!is_no_results_statement(&long));
        assert!(!is_no_results_statement("Here are 10 rows of data"));
    }

    #[test]
    fn scaffolding_is_stripped() {
        let text = "<reasoning>think think</reasoning>\n| a |\n|---|\n| 1 |\n<function_calls>x</function_calls>";
        let cleaned = strip_scaffolding(text);
        assert!(!cleaned.contains("reasoning"));
        assert!(!cleaned.contains("function_calls"));
        assert!(has_markdown_table(&cleaned));
    }
}
