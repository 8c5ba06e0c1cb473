// Dev workspace tools: read-only browsing plus patch proposal.
//
// There is deliberately no write-through tool here. Changes are proposed
// as draft changesets; a human approves them through a path outside this
// core.

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::context::ToolContext;
use crate::registry::{LocalTool, ToolExecution};

fn workspace_id(params: &Value, ctx: &ToolContext) -> Result<Uuid, ToolExecution> {
    if let Some(id) = params.get("workspace_id").and_then(Value::as_str) {
        return Uuid::parse_str(id)
            .map_err(|_| ToolExecution::tool_error(format!("invalid workspace_id: {id}")));
    }
    ctx.workspace_id
        .ok_or_else(|| ToolExecution::tool_error("No workspace is attached to this session."))
}

pub struct WorkspaceListFilesTool;

#[async_trait]
impl LocalTool for WorkspaceListFilesTool {
    fn name(&self) -> &str {
        "workspace.list_files"
    }

    fn description(&self) -> &str {
        "List files in the session's workspace, optionally under a directory."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "directory": {"type": "string", "description": "Directory prefix to list"},
            },
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolExecution {
        let workspace = match workspace_id(&params, ctx) {
            Ok(id) => id,
            Err(execution) => return execution,
        };
        let directory = params.get("directory").and_then(Value::as_str);

        match ctx
            .db
            .list_workspace_files(ctx.tenant_id, workspace, directory)
            .await
        {
            Ok(files) => {
                let listing: Vec<Value> = files
                    .iter()
                    .map(|f| json!({"path": f.path, "size_bytes": f.size_bytes}))
                    .collect();
                ToolExecution::success(json!({"files": listing, "row_count": listing.len()}))
            }
            Err(e) => ToolExecution::internal_error(format!("list_files failed: {e}")),
        }
    }
}

pub struct WorkspaceReadFileTool;

#[async_trait]
impl LocalTool for WorkspaceReadFileTool {
    fn name(&self) -> &str {
        "workspace.read_file"
    }

    fn description(&self) -> &str {
        "Read a single file from the workspace, optionally a line range."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File path within the workspace"},
                "line_start": {"type": "integer", "description": "First line to return (1-based)"},
                "line_end": {"type": "integer", "description": "Last line to return (inclusive)"},
            },
            "required": ["path"],
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolExecution {
        let workspace = match workspace_id(&params, ctx) {
            Ok(id) => id,
            Err(execution) => return execution,
        };
        let Some(path) = params.get("path").and_then(Value::as_str) else {
            return ToolExecution::tool_error("path parameter is required");
        };

        let file = match ctx
            .db
            .read_workspace_file(ctx.tenant_id, workspace, path)
            .await
        {
            Ok(Some(file)) => file,
            Ok(None) => return ToolExecution::tool_error(format!("File not found: {path}")),
            Err(e) => return ToolExecution::internal_error(format!("read_file failed: {e}")),
        };

        let line_start = params
            .get("line_start")
            .and_then(Value::as_u64)
            .map(|n| n.max(1) as usize)
            .unwrap_or(1);
        let line_end = params.get("line_end").and_then(Value::as_u64).map(|n| n as usize);

        let lines: Vec<&str> = file.content.lines().collect();
        let end = line_end.unwrap_or(lines.len()).min(lines.len());
        let start = line_start.min(end.max(1)) - 1;
        let slice = lines[start..end].join("\n");

        ToolExecution::success(json!({
            "path": file.path,
            "content": slice,
            "line_start": start + 1,
            "line_end": end,
            "total_lines": lines.len(),
        }))
    }
}

pub struct WorkspaceSearchTool;

#[async_trait]
impl LocalTool for WorkspaceSearchTool {
    fn name(&self) -> &str {
        "workspace.search"
    }

    fn description(&self) -> &str {
        "Search workspace files by filename or content."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search text"},
                "search_type": {
                    "type": "string",
                    "description": "'filename' (default) or 'content'",
                },
                "limit": {"type": "integer", "description": "Max results (default 20)"},
            },
            "required": ["query"],
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolExecution {
        let workspace = match workspace_id(&params, ctx) {
            Ok(id) => id,
            Err(execution) => return execution,
        };
        let Some(query) = params.get("query").and_then(Value::as_str) else {
            return ToolExecution::tool_error("query parameter is required");
        };
        let by_content = params.get("search_type").and_then(Value::as_str) == Some("content");
        let limit = params.get("limit").and_then(Value::as_i64).unwrap_or(20).clamp(1, 100);

        match ctx
            .db
            .search_workspace_files(ctx.tenant_id, workspace, query, by_content, limit)
            .await
        {
            Ok(files) => {
                let results: Vec<Value> = files
                    .iter()
                    .map(|f| json!({"path": f.path, "size_bytes": f.size_bytes}))
                    .collect();
                ToolExecution::success(json!({"results": results, "row_count": results.len()}))
            }
            Err(e) => ToolExecution::internal_error(format!("search failed: {e}")),
        }
    }
}

pub struct WorkspaceProposePatchTool;

#[async_trait]
impl LocalTool for WorkspaceProposePatchTool {
    fn name(&self) -> &str {
        "workspace.propose_patch"
    }

    fn description(&self) -> &str {
        "Propose a code change as a unified diff. Creates a draft changeset for human review; \
         nothing is applied automatically."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string", "description": "Path of the file to change"},
                "unified_diff": {"type": "string", "description": "The change as a unified diff"},
                "title": {"type": "string", "description": "Short changeset title"},
                "rationale": {"type": "string", "description": "Why this change is needed"},
            },
            "required": ["file_path", "unified_diff", "title"],
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolExecution {
        let workspace = match workspace_id(&params, ctx) {
            Ok(id) => id,
            Err(execution) => return execution,
        };
        let (Some(file_path), Some(unified_diff), Some(title)) = (
            params.get("file_path").and_then(Value::as_str),
            params.get("unified_diff").and_then(Value::as_str),
            params.get("title").and_then(Value::as_str),
        ) else {
            return ToolExecution::tool_error("file_path, unified_diff and title are required");
        };
        let rationale = params.get("rationale").and_then(Value::as_str);
        let proposed_by = ctx.actor_id.unwrap_or(Uuid::nil());

        match ctx
            .db
            .insert_changeset(
                ctx.tenant_id,
                workspace,
                file_path,
                unified_diff,
                title,
                rationale,
                proposed_by,
            )
            .await
        {
            Ok(changeset) => ToolExecution::success(json!({
                "changeset_id": changeset.id,
                "status": changeset.status,
                "message": "Draft changeset created. A human reviewer must approve it before \
                            anything is applied.",
            })),
            Err(e) => ToolExecution::internal_error(format!("propose_patch failed: {e}")),
        }
    }
}
