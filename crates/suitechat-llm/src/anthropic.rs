// Anthropic Messages API adapter.
//
// The canonical content-block form is the Anthropic form, so conversion is
// close to an identity mapping; the extra `tool_name` carried on tool
// results for Gemini's benefit is dropped at the wire boundary.
// Implements true incremental streaming over SSE.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use suitechat_contracts::{ContentBlock, Message, Role, ToolDefinition, ToolUseBlock};

use crate::adapter::{
    LlmAdapter, LlmError, LlmRequest, LlmResponse, LlmStream, LlmStreamEvent, Result, TokenUsage,
};

const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Adapter for Anthropic's Messages API.
#[derive(Clone)]
pub struct AnthropicAdapter {
    client: Client,
    api_key: String,
    api_url: String,
}

impl AnthropicAdapter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }

    /// Override the endpoint (gateways, test servers).
    pub fn with_base_url(api_key: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_url: api_url.into(),
        }
    }

    fn convert_message(msg: &Message) -> WireMessage {
        let content = msg
            .content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => WireBlock::Text { text: text.clone() },
                ContentBlock::ToolUse { id, name, input } => WireBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                },
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                    ..
                } => WireBlock::ToolResult {
                    tool_use_id: tool_use_id.clone(),
                    content: content.clone(),
                    is_error: *is_error,
                },
            })
            .collect();

        WireMessage {
            role: match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content,
        }
    }

    fn build_request(&self, request: &LlmRequest, stream: bool) -> WireRequest {
        WireRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            system: request.system.clone(),
            messages: request.messages.iter().map(Self::convert_message).collect(),
            tools: request.tools.as_ref().map(|tools| {
                tools
                    .iter()
                    .map(|t| WireTool {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        input_schema: t.input_schema.clone(),
                    })
                    .collect()
            }),
            stream,
        }
    }

    async fn send(&self, body: &WireRequest) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::transport(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, message });
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmAdapter for AnthropicAdapter {
    async fn create_message(&self, request: LlmRequest) -> Result<LlmResponse> {
        let body = self.build_request(&request, false);
        let response = self.send(&body).await?;

        let api: ApiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::parse(format!("invalid response body: {e}")))?;

        let mut text_blocks = Vec::new();
        let mut tool_use_blocks = Vec::new();
        for block in api.content {
            match block {
                ApiBlock::Text { text } => text_blocks.push(text),
                ApiBlock::ToolUse { id, name, input } => {
                    tool_use_blocks.push(ToolUseBlock { id, name, input })
                }
                ApiBlock::Unknown => {}
            }
        }

        Ok(LlmResponse {
            text_blocks,
            tool_use_blocks,
            usage: TokenUsage {
                input_tokens: api.usage.input_tokens,
                output_tokens: api.usage.output_tokens,
            },
        })
    }

    async fn stream_message(&self, request: LlmRequest) -> Result<LlmStream> {
        let body = self.build_request(&request, true);
        let response = self.send(&body).await?;

        let state = Arc::new(Mutex::new(StreamState::default()));
        let events = response.bytes_stream().eventsource();

        let stream = events.filter_map(move |result| {
            let state = Arc::clone(&state);
            async move {
                match result {
                    Ok(event) => {
                        let mut st = state.lock().unwrap();
                        st.handle(&event.data)
                    }
                    Err(e) => Some(Err(LlmError::transport(format!("stream error: {e}")))),
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

/// Accumulates SSE events into the normalized response.
#[derive(Default)]
struct StreamState {
    text_blocks: BTreeMap<usize, String>,
    tool_blocks: BTreeMap<usize, PendingToolUse>,
    usage: TokenUsage,
}

struct PendingToolUse {
    id: String,
    name: String,
    json_buf: String,
}

impl StreamState {
    fn handle(&mut self, data: &str) -> Option<Result<LlmStreamEvent>> {
        let value: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => return Some(Err(LlmError::parse(format!("bad stream event: {e}")))),
        };

        match value.get("type").and_then(Value::as_str) {
            Some("message_start") => {
                if let Some(input) = value
                    .pointer("/message/usage/input_tokens")
                    .and_then(Value::as_u64)
                {
                    self.usage.input_tokens = input as u32;
                }
                None
            }
            Some("content_block_start") => {
                let index = value.get("index").and_then(Value::as_u64)? as usize;
                let block = value.get("content_block")?;
                match block.get("type").and_then(Value::as_str) {
                    Some("text") => {
                        self.text_blocks.insert(index, String::new());
                    }
                    Some("tool_use") => {
                        self.tool_blocks.insert(
                            index,
                            PendingToolUse {
                                id: block.get("id")?.as_str()?.to_string(),
                                name: block.get("name")?.as_str()?.to_string(),
                                json_buf: String::new(),
                            },
                        );
                    }
                    _ => {}
                }
                None
            }
            Some("content_block_delta") => {
                let index = value.get("index").and_then(Value::as_u64)? as usize;
                let delta = value.get("delta")?;
                match delta.get("type").and_then(Value::as_str) {
                    Some("text_delta") => {
                        let text = delta.get("text")?.as_str()?.to_string();
                        self.text_blocks.entry(index).or_default().push_str(&text);
                        Some(Ok(LlmStreamEvent::Text(text)))
                    }
                    Some("input_json_delta") => {
                        if let Some(partial) = delta.get("partial_json").and_then(Value::as_str) {
                            if let Some(pending) = self.tool_blocks.get_mut(&index) {
                                pending.json_buf.push_str(partial);
                            }
                        }
                        None
                    }
                    _ => None,
                }
            }
            Some("message_delta") => {
                if let Some(output) = value
                    .pointer("/usage/output_tokens")
                    .and_then(Value::as_u64)
                {
                    self.usage.output_tokens = output as u32;
                }
                None
            }
            Some("message_stop") => Some(Ok(LlmStreamEvent::Response(self.finish()))),
            Some("error") => {
                let message = value
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown stream error");
                Some(Err(LlmError::transport(message.to_string())))
            }
            _ => None,
        }
    }

    fn finish(&mut self) -> LlmResponse {
        let text_blocks = std::mem::take(&mut self.text_blocks)
            .into_values()
            .filter(|text| !text.is_empty())
            .collect();
        let tool_use_blocks = std::mem::take(&mut self.tool_blocks)
            .into_values()
            .map(|pending| ToolUseBlock {
                id: pending.id,
                name: pending.name,
                input: serde_json::from_str(&pending.json_buf)
                    .unwrap_or_else(|_| Value::Object(Default::default())),
            })
            .collect();
        LlmResponse {
            text_blocks,
            tool_use_blocks,
            usage: self.usage,
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct WireRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<WireBlock>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

#[derive(Serialize)]
struct WireTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ApiBlock>,
    usage: ApiUsage,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_state_accumulates_text_and_tool_use() {
        let mut state = StreamState::default();

        state.handle(r#"{"type":"message_start","message":{"usage":{"input_tokens":12}}}"#);
        state.handle(r#"{"type":"content_block_start","index":0,"content_block":{"type":"text"}}"#);

        let event = state
            .handle(r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#)
            .unwrap()
            .unwrap();
        assert!(matches!(event, LlmStreamEvent::Text(ref t) if t == "Hi"));

        state.handle(
            r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"tu_1","name":"rag_search"}}"#,
        );
        state.handle(
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"query\":"}}"#,
        );
        state.handle(
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"\"vat\"}"}}"#,
        );
        state.handle(r#"{"type":"message_delta","usage":{"output_tokens":7}}"#);

        let terminal = state.handle(r#"{"type":"message_stop"}"#).unwrap().unwrap();
        match terminal {
            LlmStreamEvent::Response(resp) => {
                assert_eq!(resp.text_blocks, vec!["Hi".to_string()]);
                assert_eq!(resp.tool_use_blocks.len(), 1);
                assert_eq!(resp.tool_use_blocks[0].name, "rag_search");
                assert_eq!(resp.tool_use_blocks[0].input["query"], "vat");
                assert_eq!(resp.usage.input_tokens, 12);
                assert_eq!(resp.usage.output_tokens, 7);
            }
            other => panic!("expected terminal response, got {other:?}"),
        }
    }

    #[test]
    fn malformed_tool_json_degrades_to_empty_object() {
        let mut state = StreamState::default();
        state.handle(
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"tu_1","name":"x"}}"#,
        );
        state.handle(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{broken"}}"#,
        );
        let response = state.finish();
        assert_eq!(response.tool_use_blocks[0].input, serde_json::json!({}));
    }
}
