// Trigger ERP metadata re-discovery from the chat interface.
//
// Queues a background discovery job; custom field definitions and record
// types are refreshed by the worker and folded into the tenant's entity
// mappings.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::registry::{LocalTool, ToolExecution};

pub struct RefreshMetadataTool;

#[async_trait]
impl LocalTool for RefreshMetadataTool {
    fn name(&self) -> &str {
        "netsuite.refresh_metadata"
    }

    fn description(&self) -> &str {
        "Queue a NetSuite metadata re-discovery run for this tenant. Custom field \
         definitions, record types, and organisational hierarchies will be refreshed."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> ToolExecution {
        let parameters = ctx.actor_id.map(|actor| json!({"requested_by": actor}));

        let queued = async {
            let mut tx = ctx.db.tenant_tx(ctx.tenant_id).await?;
            let job = ctx
                .db
                .enqueue_job(
                    tx.conn(),
                    ctx.tenant_id,
                    "metadata_discovery",
                    &ctx.correlation_id,
                    parameters,
                )
                .await?;
            tx.commit().await?;
            anyhow::Ok(job)
        }
        .await;

        match queued {
            Ok(job) => ToolExecution::success(json!({
                "status": "discovery_queued",
                "job_id": job.id,
                "message": "Metadata discovery has been queued. Custom field definitions, \
                            record types, subsidiaries, departments, classes, and locations \
                            will be refreshed shortly.",
            })),
            Err(e) => ToolExecution::internal_error(format!("failed to queue discovery: {e}")),
        }
    }
}
