// LlmAdapter trait and shared request/response types.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

use suitechat_contracts::{ContentBlock, Message, Role, ToolDefinition, ToolResultBlock, ToolUseBlock};

/// Result type alias for adapter operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors from the LLM transport layer.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Provider returned a non-success status
    #[error("LLM API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Network / transport failure
    #[error("LLM transport error: {0}")]
    Transport(String),

    /// Response could not be parsed into the canonical form
    #[error("LLM response parse error: {0}")]
    Parse(String),

    /// Adapter misconfiguration
    #[error("LLM configuration error: {0}")]
    Config(String),
}

impl LlmError {
    pub fn transport(msg: impl Into<String>) -> Self {
        LlmError::Transport(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        LlmError::Parse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        LlmError::Config(msg.into())
    }
}

/// One request against a model.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Option<Vec<ToolDefinition>>,
}

impl LlmRequest {
    pub fn new(model: impl Into<String>, max_tokens: u32, system: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens,
            system: system.into(),
            messages: Vec::new(),
            tools: None,
        }
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = Some(tools);
        self
    }
}

/// Token accounting for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Normalized response: ordered text blocks, tool-use blocks, usage.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub text_blocks: Vec<String>,
    pub tool_use_blocks: Vec<ToolUseBlock>,
    pub usage: TokenUsage,
}

impl LlmResponse {
    /// Concatenated text content.
    pub fn text(&self) -> String {
        self.text_blocks.join("\n")
    }

    pub fn has_tool_use(&self) -> bool {
        !self.tool_use_blocks.is_empty()
    }
}

/// Events yielded by `stream_message`. Consumers must tolerate a single
/// terminal `Response` with no prior `Text` chunks (non-streaming adapters).
#[derive(Debug, Clone)]
pub enum LlmStreamEvent {
    /// Incremental text
    Text(String),
    /// Terminal event carrying the full normalized response
    Response(LlmResponse),
}

/// Type alias for the streaming response.
pub type LlmStream = Pin<Box<dyn Stream<Item = Result<LlmStreamEvent>> + Send>>;

/// Provider-agnostic LLM surface.
///
/// Concrete adapters translate the canonical content-block form into
/// provider-native shapes and back. The message-building helpers have one
/// correct canonical shape, so they are provided here; conversion happens
/// at request time inside each adapter.
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    /// Send a message and return the normalized response.
    async fn create_message(&self, request: LlmRequest) -> Result<LlmResponse>;

    /// Send a message and stream the response. The default implementation
    /// falls back to `create_message`, emitting the full text as a single
    /// chunk before the terminal response.
    async fn stream_message(&self, request: LlmRequest) -> Result<LlmStream> {
        let response = self.create_message(request).await?;
        let mut events: Vec<Result<LlmStreamEvent>> = response
            .text_blocks
            .iter()
            .cloned()
            .map(|text| Ok(LlmStreamEvent::Text(text)))
            .collect();
        events.push(Ok(LlmStreamEvent::Response(response)));
        Ok(Box::pin(futures::stream::iter(events)))
    }

    /// Build the user message carrying tool results back to the model.
    fn build_tool_result_message(&self, results: &[ToolResultBlock]) -> Message {
        Message {
            role: Role::User,
            content: results
                .iter()
                .map(|result| ContentBlock::ToolResult {
                    tool_use_id: result.tool_use_id.clone(),
                    content: result.content_text(),
                    is_error: result.is_error(),
                    tool_name: Some(result.tool_name.clone()),
                })
                .collect(),
        }
    }

    /// Build the assistant message recording a model response.
    fn build_assistant_message(&self, response: &LlmResponse) -> Message {
        let mut content: Vec<ContentBlock> = response
            .text_blocks
            .iter()
            .map(|text| ContentBlock::Text { text: text.clone() })
            .collect();
        for block in &response.tool_use_blocks {
            content.push(ContentBlock::ToolUse {
                id: block.id.clone(),
                name: block.name.clone(),
                input: block.input.clone(),
            });
        }
        Message {
            role: Role::Assistant,
            content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    struct CannedAdapter;

    #[async_trait]
    impl LlmAdapter for CannedAdapter {
        async fn create_message(&self, _request: LlmRequest) -> Result<LlmResponse> {
            Ok(LlmResponse {
                text_blocks: vec!["hello".into(), "world".into()],
                tool_use_blocks: vec![],
                usage: TokenUsage {
                    input_tokens: 3,
                    output_tokens: 2,
                },
            })
        }
    }

    #[tokio::test]
    async fn default_stream_emits_text_then_terminal_response() {
        let adapter = CannedAdapter;
        let mut stream = adapter
            .stream_message(LlmRequest::new("m", 64, "sys"))
            .await
            .unwrap();

        let mut texts = Vec::new();
        let mut terminal = None;
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                LlmStreamEvent::Text(chunk) => texts.push(chunk),
                LlmStreamEvent::Response(resp) => terminal = Some(resp),
            }
        }
        assert_eq!(texts, vec!["hello".to_string(), "world".to_string()]);
        let terminal = terminal.expect("terminal response");
        assert_eq!(terminal.usage.total(), 5);
    }

    #[test]
    fn tool_result_message_is_user_role_with_result_blocks() {
        let adapter = CannedAdapter;
        let results = vec![
            ToolResultBlock::ok("tu_1", "rag_search", json!({"count": 2})),
            ToolResultBlock::err("tu_2", "netsuite.suiteql", "timed out"),
        ];
        let msg = adapter.build_tool_result_message(&results);
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content.len(), 2);
        match &msg.content[1] {
            ContentBlock::ToolResult {
                is_error, content, ..
            } => {
                assert!(is_error);
                assert!(content.contains("timed out"));
            }
            other => panic!("unexpected block: {other:?}"),
        }
    }
}
