// NetSuite connectivity check: a lightweight health query.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::builtin::suiteql::run_suiteql;
use crate::context::ToolContext;
use crate::registry::{LocalTool, ToolExecution};

pub struct ConnectivityTool {
    client: Client,
}

impl ConnectivityTool {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for ConnectivityTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalTool for ConnectivityTool {
    fn name(&self) -> &str {
        "netsuite.connectivity"
    }

    fn description(&self) -> &str {
        "Test NetSuite connectivity by running a lightweight health query."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    fn timeout_secs(&self) -> u64 {
        20
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> ToolExecution {
        match run_suiteql(&self.client, ctx, "SELECT 1 AS health", 1).await {
            Ok(result) => {
                let account_id = result
                    .get("account_id")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                ToolExecution::success(json!({
                    "status": "ok",
                    "account_id": account_id,
                    "message": format!("Successfully connected to NetSuite account {account_id}."),
                }))
            }
            Err(execution) => execution,
        }
    }
}
