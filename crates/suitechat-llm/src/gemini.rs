// Google Gemini adapter.
//
// Converts the canonical content-block form into Gemini's parts /
// function-call shape. Gemini does not return tool-call ids, so ids are
// synthesised; function responses are keyed by tool name, which is why
// tool_result blocks carry `tool_name`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use suitechat_contracts::{ContentBlock, Message, Role, ToolDefinition, ToolUseBlock};

use crate::adapter::{LlmAdapter, LlmError, LlmRequest, LlmResponse, Result, TokenUsage};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Adapter for Google's Generative Language API.
#[derive(Clone)]
pub struct GeminiAdapter {
    client: Client,
    api_key: String,
    api_base: String,
}

impl GeminiAdapter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_base: api_base.into(),
        }
    }

    /// Gemini rejects `additionalProperties` inside property schemas.
    fn clean_properties(schema: &Value) -> Map<String, Value> {
        let mut cleaned = Map::new();
        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (key, prop) in properties {
                let filtered: Map<String, Value> = prop
                    .as_object()
                    .map(|obj| {
                        obj.iter()
                            .filter(|(k, _)| k.as_str() != "additionalProperties")
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                cleaned.insert(key.clone(), Value::Object(filtered));
            }
        }
        cleaned
    }

    fn convert_tools(tools: &[ToolDefinition]) -> Value {
        let declarations: Vec<Value> = tools
            .iter()
            .map(|tool| {
                let properties = Self::clean_properties(&tool.input_schema);
                let mut declaration = json!({
                    "name": tool.name,
                    "description": tool.description,
                });
                if !properties.is_empty() {
                    declaration["parameters"] = json!({
                        "type": "OBJECT",
                        "properties": properties,
                        "required": tool.input_schema.get("required").cloned()
                            .unwrap_or_else(|| json!([])),
                    });
                }
                declaration
            })
            .collect();
        json!([{"functionDeclarations": declarations}])
    }

    fn convert_messages(messages: &[Message]) -> Vec<Value> {
        let mut contents = Vec::new();
        for msg in messages {
            let role = match msg.role {
                Role::Assistant => "model",
                Role::User => "user",
            };
            let mut parts = Vec::new();
            for block in &msg.content {
                match block {
                    ContentBlock::Text { text } => parts.push(json!({"text": text})),
                    ContentBlock::ToolUse { name, input, .. } => {
                        parts.push(json!({"functionCall": {"name": name, "args": input}}));
                    }
                    ContentBlock::ToolResult {
                        content, tool_name, ..
                    } => {
                        parts.push(json!({
                            "functionResponse": {
                                "name": tool_name.as_deref().unwrap_or("tool"),
                                "response": {"result": content},
                            },
                        }));
                    }
                }
            }
            if !parts.is_empty() {
                contents.push(json!({"role": role, "parts": parts}));
            }
        }
        contents
    }
}

#[async_trait]
impl LlmAdapter for GeminiAdapter {
    async fn create_message(&self, request: LlmRequest) -> Result<LlmResponse> {
        let mut body = json!({
            "systemInstruction": {"parts": [{"text": request.system}]},
            "contents": Self::convert_messages(&request.messages),
            "generationConfig": {"maxOutputTokens": request.max_tokens},
        });
        if let Some(tools) = &request.tools {
            body["tools"] = Self::convert_tools(tools);
        }

        let url = format!("{}/models/{}:generateContent", self.api_base, request.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
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

        let mut text_blocks = Vec::new();
        let mut tool_use_blocks = Vec::new();

        if let Some(candidate) = api.candidates.into_iter().next() {
            for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
                if let Some(text) = part.text {
                    text_blocks.push(text);
                } else if let Some(call) = part.function_call {
                    tool_use_blocks.push(ToolUseBlock {
                        // Gemini does not provide tool_call ids
                        id: Uuid::now_v7().to_string(),
                        name: call.name,
                        input: call.args.unwrap_or_else(|| json!({})),
                    });
                }
            }
        }

        let usage = api
            .usage_metadata
            .map(|u| TokenUsage {
                input_tokens: u.prompt_token_count.unwrap_or(0),
                output_tokens: u.candidates_token_count.unwrap_or(0),
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            text_blocks,
            tool_use_blocks,
            usage,
        })
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<ApiUsageMetadata>,
}

#[derive(Deserialize)]
struct ApiCandidate {
    content: Option<ApiContent>,
}

#[derive(Deserialize)]
struct ApiContent {
    #[serde(default)]
    parts: Vec<ApiPart>,
}

#[derive(Deserialize)]
struct ApiPart {
    text: Option<String>,
    #[serde(rename = "functionCall")]
    function_call: Option<ApiFunctionCall>,
}

#[derive(Deserialize)]
struct ApiFunctionCall {
    name: String,
    args: Option<Value>,
}

#[derive(Deserialize)]
struct ApiUsageMetadata {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<u32>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_role_maps_to_model() {
        let messages = vec![Message::assistant("done"), Message::user("next")];
        let contents = GeminiAdapter::convert_messages(&messages);
        assert_eq!(contents[0]["role"], "model");
        assert_eq!(contents[1]["role"], "user");
    }

    #[test]
    fn tool_results_are_keyed_by_tool_name() {
        let messages = vec![Message {
            role: Role::User,
            content: vec![ContentBlock::ToolResult {
                tool_use_id: "tu_1".into(),
                content: "42".into(),
                is_error: false,
                tool_name: Some("netsuite.suiteql".into()),
            }],
        }];
        let contents = GeminiAdapter::convert_messages(&messages);
        assert_eq!(
            contents[0]["parts"][0]["functionResponse"]["name"],
            "netsuite.suiteql"
        );
    }

    #[test]
    fn additional_properties_are_stripped_from_tool_schemas() {
        let tool = ToolDefinition::new(
            "rag_search",
            "Search docs",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "additionalProperties": false},
                },
                "required": ["query"],
            }),
        );
        let tools = GeminiAdapter::convert_tools(&[tool]);
        let params = &tools[0]["functionDeclarations"][0]["parameters"];
        assert!(params["properties"]["query"].get("additionalProperties").is_none());
        assert_eq!(params["required"][0], "query");
    }
}
