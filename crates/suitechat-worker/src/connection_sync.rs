// Connection health sweep.
//
// For every tenant with an active ERP connection, run the lightweight
// health query under full job instrumentation. Tenants whose connection
// has gone bad show up as failed jobs with the error text preserved.

use anyhow::Result;
use reqwest::Client;
use serde_json::json;
use tracing::warn;

use suitechat_storage::{CredentialVault, Database};
use suitechat_tools::builtin::suiteql::run_suiteql;
use suitechat_tools::ToolContext;

use crate::jobs::JobRunner;

/// Sweep every connected tenant. Returns (checked, failed).
pub async fn run_connection_health_sweep(
    db: &Database,
    vault: &CredentialVault,
) -> Result<(usize, usize)> {
    let tenants = db.tenants_with_active_connections("netsuite").await?;
    let runner = JobRunner::new(db.clone());
    let client = Client::new();

    let mut checked = 0usize;
    let mut failed = 0usize;

    for tenant_id in tenants {
        checked += 1;
        let outcome = runner
            .run(tenant_id, "connection_health", None, |correlation_id| {
                let db = db.clone();
                let vault = vault.clone();
                let client = client.clone();
                async move {
                    let ctx = ToolContext::new(db, vault, tenant_id, correlation_id);
                    match run_suiteql(&client, &ctx, "SELECT 1 AS health", 1).await {
                        Ok(result) => Ok(json!({
                            "status": "ok",
                            "account_id": result.get("account_id"),
                        })),
                        Err(execution) => {
                            anyhow::bail!("health query failed: {execution:?}")
                        }
                    }
                }
            })
            .await;

        if let Err(err) = outcome {
            failed += 1;
            warn!(tenant_id = %tenant_id, error = %err, "connection health check failed");
        }
    }

    Ok((checked, failed))
}
