// Canonical conversation message form.
//
// Messages are ordered lists of content blocks in the Anthropic shape
// (text / tool_use / tool_result). Provider adapters convert to and from
// their native shapes; everything inside the core speaks this form.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Conversation role. Tool results travel inside user messages,
/// matching the canonical content-block form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single content block within a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
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
        #[serde(default)]
        is_error: bool,
        /// Carried alongside the result because one provider (Gemini)
        /// keys function responses by name rather than call id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
    },
}

/// A conversation message: a role plus ordered content blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    /// Create a user message with plain text content.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Create an assistant message with plain text content.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Concatenate the text blocks, ignoring tool blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Whether any block is a tool_use.
    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolUse { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_block_round_trips_through_json() {
        let block = ContentBlock::ToolUse {
            id: "tu_1".into(),
            name: "netsuite.suiteql".into(),
            input: json!({"query": "SELECT 1"}),
        };
        let encoded = serde_json::to_string(&block).unwrap();
        assert!(encoded.contains(r#""type":"tool_use""#));
        let decoded: ContentBlock = serde_json::from_str(&encoded).unwrap();
        assert_eq!(block, decoded);
    }

    #[test]
    fn message_text_joins_only_text_blocks() {
        let msg = Message {
            role: Role::Assistant,
            content: vec![
                ContentBlock::Text {
                    text: "first".into(),
                },
                ContentBlock::ToolUse {
                    id: "tu_2".into(),
                    name: "rag_search".into(),
                    input: json!({}),
                },
                ContentBlock::Text {
                    text: "second".into(),
                },
            ],
        };
        assert_eq!(msg.text(), "first\nsecond");
        assert!(msg.has_tool_use());
    }
}
