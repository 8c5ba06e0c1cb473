// History compaction: summarise old turns to cut token usage.
//
// Once a conversation exceeds the threshold, everything but the most
// recent exchanges is replaced by one dense LLM-written summary wrapped in
// <compacted_history> plus a one-line acknowledgment. Fails open: any
// error or empty summary returns the history unchanged.

use tracing::{info, warn};

use suitechat_contracts::Message;
use suitechat_llm::{LlmAdapter, LlmRequest};

use crate::prompts::COMPACTION_PROMPT;

/// Minimum number of messages before compaction triggers.
/// Each user-assistant exchange is 2 messages, so 12 messages = 6 turns.
pub const COMPACTION_THRESHOLD: usize = 12;

/// Recent messages preserved verbatim (last 2 exchanges).
pub const KEEP_RECENT: usize = 4;

const SUMMARY_MAX_TOKENS: u32 = 512;

/// Compact old history into a summary envelope plus the recent turns.
/// A history at or under the threshold is returned unchanged.
pub async fn compact_history(
    history: Vec<Message>,
    adapter: &dyn LlmAdapter,
    model: &str,
) -> Vec<Message> {
    if history.len() <= COMPACTION_THRESHOLD {
        return history;
    }

    let split = history.len() - KEEP_RECENT;
    let old_turns = &history[..split];
    let recent_turns = &history[split..];

    let mut summary_messages: Vec<Message> = old_turns.to_vec();
    summary_messages.push(Message::user(COMPACTION_PROMPT));

    let request = LlmRequest::new(model, SUMMARY_MAX_TOKENS, "You are a conversation summariser. Output only the summary.")
        .with_messages(summary_messages);

    let summary = match adapter.create_message(request).await {
        Ok(response) => response.text(),
        Err(err) => {
            warn!(error = %err, "history compaction failed; keeping full history");
            return history;
        }
    };
    if summary.trim().is_empty() {
        warn!("history compaction returned an empty summary; keeping full history");
        return history;
    }

    info!(
        old_turns = old_turns.len(),
        summary_len = summary.len(),
        kept_recent = recent_turns.len(),
        "history compacted"
    );

    let mut compacted = vec![
        Message::user(format!("<compacted_history>\n{summary}\n</compacted_history>")),
        Message::assistant("Understood. I have the conversation context."),
    ];
    compacted.extend_from_slice(recent_turns);
    compacted
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use suitechat_llm::{LlmResponse, Result as LlmResult};

    struct SummariserStub {
        summary: &'static str,
        calls: AtomicUsize,
    }

    impl SummariserStub {
        fn new(summary: &'static str) -> Self {
            Self {
                summary,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmAdapter for SummariserStub {
        async fn create_message(&self, _request: LlmRequest) -> LlmResult<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(LlmResponse {
                text_blocks: if self.summary.is_empty() {
                    vec![]
                } else {
                    vec![self.summary.to_string()]
                },
                tool_use_blocks: vec![],
                usage: Default::default(),
            })
        }
    }

    fn history_of(len: usize) -> Vec<Message> {
        (0..len)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("question {i}"))
                } else {
                    Message::assistant(format!("answer {i}"))
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn no_op_at_exactly_the_threshold() {
        let adapter = SummariserStub::new("summary");
        let history = history_of(COMPACTION_THRESHOLD);
        let result = compact_history(history.clone(), &adapter, "fast-model").await;
        assert_eq!(result, history);
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn triggers_at_threshold_plus_one() {
        let adapter = SummariserStub::new("the user is reconciling payouts");
        let history = history_of(COMPACTION_THRESHOLD + 1);
        let result = compact_history(history.clone(), &adapter, "fast-model").await;

        // summary + ack + last KEEP_RECENT verbatim
        assert_eq!(result.len(), 2 + KEEP_RECENT);
        assert!(result[0].text().starts_with("<compacted_history>"));
        assert!(result[0].text().contains("reconciling payouts"));
        assert_eq!(result[2..], history[history.len() - KEEP_RECENT..]);
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_summary_keeps_history_unchanged() {
        let adapter = SummariserStub::new("");
        let history = history_of(COMPACTION_THRESHOLD + 4);
        let result = compact_history(history.clone(), &adapter, "fast-model").await;
        assert_eq!(result, history);
    }
}
