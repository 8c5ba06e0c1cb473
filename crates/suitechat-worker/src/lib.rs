// Background workers
//
// Workers run outside any HTTP request. Tenant-scoped work binds the RLS
// tenant context before any read, records its own Job row, and emits
// job.start / job.complete / job.failed audit events with the error text
// mirrored into the Job row.

pub mod audit_retention;
pub mod billing_sync;
pub mod connection_sync;
pub mod jobs;
pub mod metadata_discovery;

pub use audit_retention::run_audit_retention;
pub use billing_sync::{pending_delta, sync_metered_billing, StripeMeter, SyncReport, UsageMeter};
pub use connection_sync::run_connection_health_sweep;
pub use jobs::JobRunner;
pub use metadata_discovery::run_metadata_discovery;
