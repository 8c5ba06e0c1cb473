// Governed tool substrate
//
// A single dispatcher is the only way agents reach a tool, local or
// remote. Every invocation passes the same governance pipeline:
// allow-list -> rate limit -> policy -> timeout -> redaction -> audit ->
// metrics. Remote tools are exposed under synthetic
// `ext__{connector_id}__{name}` names and reached over the MCP transport.

pub mod builtin;
pub mod context;
pub mod dispatch;
pub mod embeddings;
pub mod error;
pub mod mcp;
pub mod metrics;
pub mod policy;
pub mod rate_limit;
pub mod registry;

pub use context::ToolContext;
pub use dispatch::{Dispatcher, ToolDispatch};
pub use embeddings::OpenAiEmbedder;
pub use error::ToolError;
pub use mcp::{
    discover_and_cache, parse_synthetic_name, remote_tool_definitions, synthetic_name, McpClient,
};
pub use metrics::Metrics;
pub use policy::{evaluate_tool_call, redact_output};
pub use rate_limit::RateLimiter;
pub use registry::{LocalTool, ToolExecution, ToolRegistry, ToolRegistryBuilder};
