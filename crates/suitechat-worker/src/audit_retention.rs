// Audit retention sweeper.
//
// Deletes audit events older than the configured age in small batches
// with intervening commits, so the sweeper never blocks writers. The
// retention window is site-configurable (AUDIT_RETENTION_DAYS); code
// takes it as a parameter.

use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::info;

use suitechat_storage::{AuditLog, Database};

const DEFAULT_BATCH_SIZE: i64 = 5000;

/// Purge audit events older than `retention_days`. Returns the number of
/// rows deleted.
pub async fn run_audit_retention(db: &Database, retention_days: i64) -> Result<u64> {
    let cutoff = Utc::now() - Duration::days(retention_days);
    let deleted = AuditLog::purge_older_than(db.pool(), cutoff, DEFAULT_BATCH_SIZE).await?;
    info!(
        deleted = deleted,
        retention_days = retention_days,
        cutoff = %cutoff,
        "audit retention sweep finished"
    );
    Ok(deleted)
}
