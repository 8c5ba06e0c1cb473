// Instrumented job runner.
//
// Wraps a tenant-scoped task with the full lifecycle: bind tenant, insert
// the Job row, audit job.start, run, then audit job.complete or
// job.failed with the error text mirrored into the Job row.

use std::future::Future;

use anyhow::Result;
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use suitechat_storage::{AuditLog, Database, NewAuditEvent};

pub struct JobRunner {
    db: Database,
}

impl JobRunner {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Run a tenant-scoped task under job instrumentation. The task runs
    /// outside the bookkeeping transactions so a long task never holds a
    /// lock on the jobs table.
    pub async fn run<F, Fut>(
        &self,
        tenant_id: Uuid,
        job_type: &str,
        parameters: Option<Value>,
        task: F,
    ) -> Result<Value>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let correlation_id = Uuid::now_v7().to_string();

        // Open the job: Job row + job.start, committed before the task runs
        let mut tx = self.db.tenant_tx(tenant_id).await?;
        let job = self
            .db
            .insert_job(tx.conn(), tenant_id, job_type, &correlation_id, parameters)
            .await?;
        AuditLog::append(
            tx.conn(),
            NewAuditEvent::new(tenant_id, "job", "job.start")
                .system_actor()
                .resource("job", job.id.to_string())
                .correlation(correlation_id.clone())
                .job(job.id)
                .payload(json!({"job_type": job_type})),
        )
        .await?;
        tx.commit().await?;

        info!(tenant_id = %tenant_id, job_id = %job.id, job_type = %job_type, "job started");

        match task(correlation_id.clone()).await {
            Ok(summary) => {
                let mut tx = self.db.tenant_tx(tenant_id).await?;
                self.db.complete_job(tx.conn(), job.id, summary.clone()).await?;
                AuditLog::append(
                    tx.conn(),
                    NewAuditEvent::new(tenant_id, "job", "job.complete")
                        .system_actor()
                        .resource("job", job.id.to_string())
                        .correlation(correlation_id)
                        .job(job.id),
                )
                .await?;
                tx.commit().await?;
                info!(tenant_id = %tenant_id, job_id = %job.id, "job completed");
                Ok(summary)
            }
            Err(err) => {
                let message = err.to_string();
                let mut tx = self.db.tenant_tx(tenant_id).await?;
                self.db.fail_job(tx.conn(), job.id, &message).await?;
                AuditLog::append(
                    tx.conn(),
                    NewAuditEvent::new(tenant_id, "job", "job.failed")
                        .system_actor()
                        .resource("job", job.id.to_string())
                        .correlation(correlation_id)
                        .job(job.id)
                        .error(message.clone()),
                )
                .await?;
                tx.commit().await?;
                error!(tenant_id = %tenant_id, job_id = %job.id, error = %message, "job failed");
                Err(err)
            }
        }
    }
}
