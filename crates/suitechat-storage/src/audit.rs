// Append-only audit log.
//
// Events insert on the caller's connection so the audit record and the
// business state commit (or roll back) together. Event ids are uuidv7:
// a client-generated, time-sortable token. Retention runs in small
// delete batches so the sweeper never blocks writers.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::models::AuditEventRow;

/// Input for one audit event. Missing correlation ids are generated.
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub tenant_id: Uuid,
    pub category: String,
    pub action: String,
    pub actor_id: Option<Uuid>,
    pub actor_type: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub correlation_id: Option<String>,
    pub job_id: Option<Uuid>,
    pub payload: Option<Value>,
    pub status: String,
    pub error_message: Option<String>,
}

impl NewAuditEvent {
    pub fn new(tenant_id: Uuid, category: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            tenant_id,
            category: category.into(),
            action: action.into(),
            actor_id: None,
            actor_type: "user".into(),
            resource_type: None,
            resource_id: None,
            correlation_id: None,
            job_id: None,
            payload: None,
            status: "success".into(),
            error_message: None,
        }
    }

    pub fn actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn system_actor(mut self) -> Self {
        self.actor_type = "system".into();
        self
    }

    pub fn resource(mut self, resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn job(mut self, job_id: Uuid) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.status = "error".into();
        self.error_message = Some(message.into());
        self
    }
}

/// Audit log operations.
pub struct AuditLog;

impl AuditLog {
    /// Append an event on the caller's connection. Insert-only.
    pub async fn append(conn: &mut PgConnection, event: NewAuditEvent) -> Result<AuditEventRow> {
        let id = Uuid::now_v7();
        let correlation_id = event
            .correlation_id
            .unwrap_or_else(|| Uuid::now_v7().to_string());

        let row = sqlx::query_as::<_, AuditEventRow>(
            r#"
            INSERT INTO audit_events (
                id, tenant_id, timestamp, actor_id, actor_type, category, action,
                resource_type, resource_id, correlation_id, job_id, payload, status, error_message
            )
            VALUES ($1, $2, NOW(), $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id, tenant_id, timestamp, actor_id, actor_type, category, action,
                      resource_type, resource_id, correlation_id, job_id, payload, status, error_message
            "#,
        )
        .bind(id)
        .bind(event.tenant_id)
        .bind(event.actor_id)
        .bind(&event.actor_type)
        .bind(&event.category)
        .bind(&event.action)
        .bind(&event.resource_type)
        .bind(&event.resource_id)
        .bind(&correlation_id)
        .bind(event.job_id)
        .bind(&event.payload)
        .bind(&event.status)
        .bind(&event.error_message)
        .fetch_one(conn)
        .await?;

        Ok(row)
    }

    /// Tenant-scoped page of events, newest first.
    pub async fn list(
        conn: &mut PgConnection,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditEventRow>> {
        let rows = sqlx::query_as::<_, AuditEventRow>(
            r#"
            SELECT id, tenant_id, timestamp, actor_id, actor_type, category, action,
                   resource_type, resource_id, correlation_id, job_id, payload, status, error_message
            FROM audit_events
            WHERE tenant_id = $1
            ORDER BY timestamp DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(tenant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(conn)
        .await?;

        Ok(rows)
    }

    /// Delete events older than `cutoff` in batches, committing between
    /// batches. Returns the total deleted.
    pub async fn purge_older_than(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
        batch_size: i64,
    ) -> Result<u64> {
        let mut total_deleted: u64 = 0;
        loop {
            let result = sqlx::query(
                r#"
                DELETE FROM audit_events
                WHERE id IN (
                    SELECT id FROM audit_events
                    WHERE timestamp < $1
                    ORDER BY id
                    LIMIT $2
                )
                "#,
            )
            .bind(cutoff)
            .bind(batch_size)
            .execute(pool)
            .await?;

            let deleted = result.rows_affected();
            total_deleted += deleted;
            if (deleted as i64) < batch_size {
                break;
            }
        }

        info!(
            total_deleted = total_deleted,
            cutoff = %cutoff,
            "audit retention purge complete"
        );
        Ok(total_deleted)
    }
}
