// RAG vector search exposed as a tool, so specialist agents can search
// on demand instead of relying on upfront retrieval only.

use async_trait::async_trait;
use serde_json::{json, Value};

use suitechat_storage::rag_search;

use crate::context::ToolContext;
use crate::registry::{LocalTool, ToolExecution};

const DEFAULT_TOP_K: usize = 10;

pub struct RagSearchTool;

#[async_trait]
impl LocalTool for RagSearchTool {
    fn name(&self) -> &str {
        "rag_search"
    }

    fn description(&self) -> &str {
        "Search the document knowledge base via vector similarity. Returns the most \
         relevant chunks with their source paths."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Natural language search query",
                },
                "top_k": {
                    "type": "integer",
                    "description": "Maximum number of results (default 10, capped at 30)",
                },
                "source_filter": {
                    "type": "string",
                    "description": "Prefix filter on source_path (e.g. 'netsuite_metadata/')",
                },
            },
            "required": ["query"],
        })
    }

    fn timeout_secs(&self) -> u64 {
        20
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolExecution {
        let Some(query) = params.get("query").and_then(Value::as_str) else {
            return ToolExecution::tool_error("query parameter is required");
        };
        let top_k = params
            .get("top_k")
            .and_then(Value::as_u64)
            .map(|k| k as usize)
            .unwrap_or(DEFAULT_TOP_K);
        let source_filter = params.get("source_filter").and_then(Value::as_str);

        let embedder = ctx.embedder.as_deref();
        match rag_search(ctx.db.pool(), embedder, ctx.tenant_id, query, top_k, source_filter).await
        {
            Ok(chunks) => {
                let results: Vec<Value> = chunks
                    .iter()
                    .map(|chunk| {
                        json!({
                            "title": chunk.title,
                            "content": chunk.content,
                            "source_path": chunk.source_path,
                            "similarity_score": chunk.similarity,
                        })
                    })
                    .collect();
                ToolExecution::success(json!({
                    "results": results,
                    "count": results.len(),
                    "query": query,
                }))
            }
            Err(e) => ToolExecution::internal_error(format!("rag search failed: {e}")),
        }
    }
}
