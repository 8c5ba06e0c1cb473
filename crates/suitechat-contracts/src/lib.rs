// Shared contract types for suitechat
//
// Everything that crosses a crate boundary lives here: the canonical
// content-block message form, tool definitions and results, intents,
// agent results, and policy decisions. No I/O, no provider specifics.

pub mod agent;
pub mod intent;
pub mod message;
pub mod policy;
pub mod tools;

pub use agent::AgentResult;
pub use intent::Intent;
pub use message::{ContentBlock, Message, Role};
pub use policy::PolicyDecision;
pub use tools::{Citation, ToolCallRecord, ToolDefinition, ToolResultBlock, ToolUseBlock};
