// Persist a tenant-wide learned rule (admin-only).
//
// Non-admin callers get a session-only acknowledgment; only holders of
// tenant.manage can write rules that apply to all future sessions.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::context::ToolContext;
use crate::registry::{LocalTool, ToolExecution};

pub struct SaveLearnedRuleTool;

#[async_trait]
impl LocalTool for SaveLearnedRuleTool {
    fn name(&self) -> &str {
        "save_learned_rule"
    }

    fn description(&self) -> &str {
        "Save a business rule or preference for this organisation. It will be applied \
         to all future chat sessions. Requires tenant admin rights."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "rule_description": {
                    "type": "string",
                    "description": "The business rule or preference to remember",
                },
                "rule_category": {
                    "type": "string",
                    "description": "Category tag (e.g. output_preference, status_mapping, query_logic)",
                },
            },
            "required": ["rule_description"],
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolExecution {
        let description = params
            .get("rule_description")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or("");
        if description.is_empty() {
            return ToolExecution::tool_error("rule_description is required");
        }
        let category = params
            .get("rule_category")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or("general");

        let Some(actor_id) = ctx.actor_id else {
            return ToolExecution::tool_error("Missing actor for rule persistence");
        };

        let is_admin = match ctx.db.has_permission(actor_id, "tenant.manage").await {
            Ok(admin) => admin,
            Err(e) => return ToolExecution::internal_error(format!("permission check failed: {e}")),
        };
        if !is_admin {
            return ToolExecution::success(json!({
                "status": "session_only",
                "message": "This preference has been noted for the current session. \
                            Only tenant administrators can save persistent rules that \
                            apply across all future sessions.",
            }));
        }

        let saved = async {
            let mut tx = ctx.db.tenant_tx(ctx.tenant_id).await?;
            let rule = ctx
                .db
                .insert_learned_rule(tx.conn(), ctx.tenant_id, description, category, Some(actor_id))
                .await?;
            tx.commit().await?;
            anyhow::Ok(rule)
        }
        .await;

        match saved {
            Ok(rule) => {
                info!(
                    tenant_id = %ctx.tenant_id,
                    rule_id = %rule.id,
                    category = %category,
                    "learned rule saved"
                );
                ToolExecution::success(json!({
                    "status": "saved",
                    "rule_id": rule.id,
                    "message": "Rule saved successfully. This will be applied to all future \
                                chat sessions for your organization.",
                }))
            }
            Err(e) => ToolExecution::internal_error(format!("rule persistence failed: {e}")),
        }
    }
}
