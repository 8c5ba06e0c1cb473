// OpenAI Chat Completions adapter.
//
// Converts the canonical content-block form into OpenAI function calling:
// tool_use blocks become `tool_calls` on assistant messages, tool_result
// blocks become `role:"tool"` messages keyed by tool_call_id.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use suitechat_contracts::{ContentBlock, Message, Role, ToolDefinition, ToolUseBlock};

use crate::adapter::{LlmAdapter, LlmError, LlmRequest, LlmResponse, Result, TokenUsage};

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Adapter for OpenAI-compatible chat completion APIs.
#[derive(Clone)]
pub struct OpenAiAdapter {
    client: Client,
    api_key: String,
    api_url: String,
}

impl OpenAiAdapter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }

    /// Override the endpoint (Azure, gateways, test servers).
    pub fn with_base_url(api_key: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_url: api_url.into(),
        }
    }

    fn convert_tools(tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.input_schema,
                    },
                })
            })
            .collect()
    }

    fn convert_messages(messages: &[Message], system: &str) -> Vec<Value> {
        let mut converted = vec![json!({"role": "system", "content": system})];

        for msg in messages {
            let tool_results: Vec<&ContentBlock> = msg
                .content
                .iter()
                .filter(|b| matches!(b, ContentBlock::ToolResult { .. }))
                .collect();

            // Tool results become individual role:"tool" messages
            if msg.role == Role::User && !tool_results.is_empty() {
                for block in tool_results {
                    if let ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } = block
                    {
                        converted.push(json!({
                            "role": "tool",
                            "tool_call_id": tool_use_id,
                            "content": content,
                        }));
                    }
                }
                continue;
            }

            if msg.role == Role::Assistant && msg.has_tool_use() {
                let mut text_parts = Vec::new();
                let mut tool_calls = Vec::new();
                for block in &msg.content {
                    match block {
                        ContentBlock::Text { text } => text_parts.push(text.clone()),
                        ContentBlock::ToolUse { id, name, input } => {
                            tool_calls.push(json!({
                                "id": id,
                                "type": "function",
                                "function": {
                                    "name": name,
                                    "arguments": serde_json::to_string(input)
                                        .unwrap_or_default(),
                                },
                            }));
                        }
                        ContentBlock::ToolResult { .. } => {}
                    }
                }
                converted.push(json!({
                    "role": "assistant",
                    "content": if text_parts.is_empty() {
                        Value::Null
                    } else {
                        Value::String(text_parts.join("\n"))
                    },
                    "tool_calls": tool_calls,
                }));
                continue;
            }

            converted.push(json!({"role": msg.role.as_str(), "content": msg.text()}));
        }

        converted
    }
}

#[async_trait]
impl LlmAdapter for OpenAiAdapter {
    async fn create_message(&self, request: LlmRequest) -> Result<LlmResponse> {
        let body = WireRequest {
            model: request.model.clone(),
            max_completion_tokens: request.max_tokens,
            messages: Self::convert_messages(&request.messages, &request.system),
            tools: request.tools.as_deref().map(Self::convert_tools),
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::transport(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, message });
        }

        let api: ApiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::parse(format!("invalid response body: {e}")))?;

        let choice = api
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::parse("response contained no choices"))?;

        let mut text_blocks = Vec::new();
        if let Some(content) = choice.message.content {
            if !content.is_empty() {
                text_blocks.push(content);
            }
        }

        let mut tool_use_blocks = Vec::new();
        for call in choice.message.tool_calls.unwrap_or_default() {
            let input: Value = serde_json::from_str(&call.function.arguments)
                .map_err(|e| LlmError::parse(format!("bad tool arguments: {e}")))?;
            tool_use_blocks.push(ToolUseBlock {
                id: call.id,
                name: call.function.name,
                input,
            });
        }

        let usage = api
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            text_blocks,
            tool_use_blocks,
            usage,
        })
    }
}

#[derive(Serialize)]
struct WireRequest {
    model: String,
    max_completion_tokens: u32,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunction,
}

#[derive(Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_results_become_tool_role_messages() {
        let messages = vec![Message {
            role: Role::User,
            content: vec![ContentBlock::ToolResult {
                tool_use_id: "tu_9".into(),
                content: r#"{"rows": []}"#.into(),
                is_error: false,
                tool_name: Some("netsuite.suiteql".into()),
            }],
        }];
        let converted = OpenAiAdapter::convert_messages(&messages, "sys");
        assert_eq!(converted.len(), 2);
        assert_eq!(converted[1]["role"], "tool");
        assert_eq!(converted[1]["tool_call_id"], "tu_9");
    }

    #[test]
    fn assistant_tool_use_becomes_tool_calls_with_string_arguments() {
        let messages = vec![Message {
            role: Role::Assistant,
            content: vec![ContentBlock::ToolUse {
                id: "tu_1".into(),
                name: "rag_search".into(),
                input: json!({"query": "fees"}),
            }],
        }];
        let converted = OpenAiAdapter::convert_messages(&messages, "sys");
        let call = &converted[1]["tool_calls"][0];
        assert_eq!(call["function"]["name"], "rag_search");
        assert!(call["function"]["arguments"].as_str().unwrap().contains("fees"));
        assert_eq!(converted[1]["content"], Value::Null);
    }
}
