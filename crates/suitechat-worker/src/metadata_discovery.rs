// ERP metadata discovery.
//
// Claims queued discovery jobs, runs the discovery queries against the
// tenant's NetSuite connection, and refreshes the tenant's entity
// mappings from what it finds. Tenant-scoped: every write runs on a
// tenant-bound transaction.

use anyhow::Result;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use suitechat_storage::{AuditLog, CredentialVault, Database, JobRow, NewAuditEvent};
use suitechat_tools::builtin::suiteql::run_suiteql;
use suitechat_tools::ToolContext;

/// Discovery queries: (entity_type, SuiteQL) pairs. Each row found
/// becomes (or refreshes) an entity mapping.
const DISCOVERY_QUERIES: [(&str, &str); 4] = [
    (
        "customrecord",
        "SELECT scriptid, name FROM customrecordtype FETCH FIRST 500 ROWS ONLY",
    ),
    (
        "customlist",
        "SELECT scriptid, name FROM customlist FETCH FIRST 500 ROWS ONLY",
    ),
    (
        "transaction_body_field",
        "SELECT scriptid, name FROM transactionbodycustomfield FETCH FIRST 500 ROWS ONLY",
    ),
    (
        "item_field",
        "SELECT scriptid, name FROM itemcustomfield FETCH FIRST 500 ROWS ONLY",
    ),
];

/// Claim and process queued discovery jobs. Returns how many jobs ran.
pub async fn run_metadata_discovery(db: &Database, vault: &CredentialVault) -> Result<usize> {
    let jobs = db.claim_pending_jobs("metadata_discovery", 5).await?;
    let count = jobs.len();
    for job in jobs {
        if let Err(err) = discover_for_job(db, vault, &job).await {
            warn!(job_id = %job.id, tenant_id = %job.tenant_id, error = %err, "discovery failed");
            let mut tx = db.tenant_tx(job.tenant_id).await?;
            db.fail_job(tx.conn(), job.id, &err.to_string()).await?;
            AuditLog::append(
                tx.conn(),
                NewAuditEvent::new(job.tenant_id, "job", "job.failed")
                    .system_actor()
                    .resource("job", job.id.to_string())
                    .job(job.id)
                    .error(err.to_string()),
            )
            .await?;
            tx.commit().await?;
        }
    }
    Ok(count)
}

async fn discover_for_job(db: &Database, vault: &CredentialVault, job: &JobRow) -> Result<()> {
    let correlation_id = job
        .correlation_id
        .clone()
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    {
        let mut tx = db.tenant_tx(job.tenant_id).await?;
        AuditLog::append(
            tx.conn(),
            NewAuditEvent::new(job.tenant_id, "job", "job.start")
                .system_actor()
                .resource("job", job.id.to_string())
                .correlation(correlation_id.clone())
                .job(job.id)
                .payload(json!({"job_type": "metadata_discovery"})),
        )
        .await?;
        tx.commit().await?;
    }

    let client = Client::new();
    let ctx = ToolContext::new(db.clone(), vault.clone(), job.tenant_id, correlation_id.clone());

    let mut queries_succeeded = 0usize;
    let mut total_discovered = 0usize;
    let mut errors: Vec<String> = Vec::new();

    for (entity_type, query) in DISCOVERY_QUERIES {
        let result = match run_suiteql(&client, &ctx, query, 500).await {
            Ok(result) => result,
            Err(execution) => {
                errors.push(format!("{entity_type}: {execution:?}"));
                continue;
            }
        };
        queries_succeeded += 1;

        let rows = result
            .get("rows")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut tx = db.tenant_tx(job.tenant_id).await?;
        for row in &rows {
            let (Some(script_id), Some(name)) = (
                row.get("scriptid").and_then(Value::as_str),
                row.get("name").and_then(Value::as_str),
            ) else {
                continue;
            };
            db.upsert_entity_mapping(tx.conn(), job.tenant_id, entity_type, name, script_id)
                .await?;
            total_discovered += 1;
        }
        tx.commit().await?;
    }

    if queries_succeeded == 0 {
        anyhow::bail!(
            "all discovery queries failed: {}",
            errors.join("; ")
        );
    }

    let summary = json!({
        "queries_succeeded": queries_succeeded,
        "total_fields_discovered": total_discovered,
        "errors": errors,
    });

    let mut tx = db.tenant_tx(job.tenant_id).await?;
    db.complete_job(tx.conn(), job.id, summary).await?;
    AuditLog::append(
        tx.conn(),
        NewAuditEvent::new(job.tenant_id, "job", "job.complete")
            .system_actor()
            .resource("job", job.id.to_string())
            .correlation(correlation_id)
            .job(job.id),
    )
    .await?;
    tx.commit().await?;

    info!(
        tenant_id = %job.tenant_id,
        job_id = %job.id,
        discovered = total_discovered,
        "metadata discovery completed"
    );
    Ok(())
}
