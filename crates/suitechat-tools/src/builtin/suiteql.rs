// Local SuiteQL execution against the tenant's ERP connection.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::registry::{LocalTool, ToolExecution};

const DEFAULT_ROW_LIMIT: i64 = 100;
const MAX_ROW_LIMIT: i64 = 1000;

pub struct SuiteQlTool {
    client: Client,
}

impl SuiteQlTool {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for SuiteQlTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a SuiteQL query over the tenant's active NetSuite connection.
/// Shared with the connectivity check and the metadata discovery worker.
pub async fn run_suiteql(
    client: &Client,
    ctx: &ToolContext,
    query: &str,
    limit: i64,
) -> Result<Value, ToolExecution> {
    let connection = ctx
        .db
        .active_connection(ctx.tenant_id, "netsuite")
        .await
        .map_err(|e| ToolExecution::internal_error(format!("connection lookup failed: {e}")))?
        .ok_or_else(|| {
            ToolExecution::tool_error("No active NetSuite connection found for this tenant.")
        })?;

    let credentials = ctx
        .vault
        .decrypt_credentials(&connection.encrypted_credentials)
        .map_err(|e| ToolExecution::internal_error(format!("credential decrypt failed: {e}")))?;

    let account_id = credentials
        .get("account_id")
        .and_then(Value::as_str)
        .ok_or_else(|| ToolExecution::tool_error("Connection is missing an account id."))?;
    let access_token = credentials
        .get("access_token")
        .and_then(Value::as_str)
        .ok_or_else(|| ToolExecution::tool_error("Connection is missing an access token."))?;

    let url = format!(
        "https://{}.suitetalk.api.netsuite.com/services/rest/query/v1/suiteql?limit={}",
        account_id.to_lowercase().replace('_', "-"),
        limit
    );

    let response = client
        .post(&url)
        .header("Authorization", format!("Bearer {access_token}"))
        .header("Prefer", "transient")
        .json(&json!({"q": query}))
        .send()
        .await
        .map_err(|e| ToolExecution::tool_error(format!("SuiteQL request failed: {e}")))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(ToolExecution::tool_error(format!(
            "SuiteQL returned {status}: {body}"
        )));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| ToolExecution::tool_error(format!("SuiteQL response parse failed: {e}")))?;

    let rows = body
        .get("items")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let row_count = rows.len();

    Ok(json!({
        "rows": rows,
        "row_count": row_count,
        "account_id": account_id,
    }))
}

#[async_trait]
impl LocalTool for SuiteQlTool {
    fn name(&self) -> &str {
        "netsuite.suiteql"
    }

    fn description(&self) -> &str {
        "Execute a read-only SuiteQL query against NetSuite. \
         Always include a row limit (FETCH FIRST n ROWS ONLY)."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "SuiteQL query to execute",
                },
                "limit": {
                    "type": "integer",
                    "description": "Max rows to return (default 100)",
                },
            },
            "required": ["query"],
        })
    }

    fn timeout_secs(&self) -> u64 {
        45
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolExecution {
        let Some(query) = params.get("query").and_then(Value::as_str) else {
            return ToolExecution::tool_error("query parameter is required");
        };
        let limit = params
            .get("limit")
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_ROW_LIMIT)
            .clamp(1, MAX_ROW_LIMIT);

        match run_suiteql(&self.client, ctx, query, limit).await {
            Ok(result) => ToolExecution::Success(result),
            Err(execution) => execution,
        }
    }
}
