use std::time::Duration;

use anyhow::{Context, Result};
use suitechat_storage::{CredentialVault, Database};
use suitechat_worker::{
    run_audit_retention, run_connection_health_sweep, run_metadata_discovery,
    sync_metered_billing, StripeMeter,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const BILLING_SYNC_INTERVAL: Duration = Duration::from_secs(60 * 60);
const AUDIT_RETENTION_INTERVAL: Duration = Duration::from_secs(60 * 60 * 24);
const DISCOVERY_POLL_INTERVAL: Duration = Duration::from_secs(30);
const CONNECTION_HEALTH_INTERVAL: Duration = Duration::from_secs(60 * 60 * 6);

const DEFAULT_AUDIT_RETENTION_DAYS: i64 = 180;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "suitechat_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("suitechat-worker starting...");

    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL environment variable required")?;
    let db = Database::from_url(&database_url).await?;
    tracing::info!("database connection established");

    let vault = CredentialVault::from_env()?;
    let retention_days: i64 = std::env::var("AUDIT_RETENTION_DAYS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_AUDIT_RETENTION_DAYS);

    // Billing reconciliation: hourly
    if let Ok(stripe_key) = std::env::var("STRIPE_API_KEY") {
        let db = db.clone();
        tokio::spawn(async move {
            let meter = StripeMeter::new(stripe_key);
            let mut ticker = tokio::time::interval(BILLING_SYNC_INTERVAL);
            loop {
                ticker.tick().await;
                match sync_metered_billing(&db, &meter).await {
                    Ok(report) => tracing::info!(
                        synced = report.synced,
                        errors = report.errors,
                        "billing sync run finished"
                    ),
                    Err(err) => tracing::error!(error = %err, "billing sync run failed"),
                }
            }
        });
    } else {
        tracing::warn!("STRIPE_API_KEY not set; billing reconciliation disabled");
    }

    // Audit retention: daily
    {
        let db = db.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(AUDIT_RETENTION_INTERVAL);
            loop {
                ticker.tick().await;
                if let Err(err) = run_audit_retention(&db, retention_days).await {
                    tracing::error!(error = %err, "audit retention run failed");
                }
            }
        });
    }

    // Metadata discovery: poll the job queue
    {
        let db = db.clone();
        let vault = vault.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(DISCOVERY_POLL_INTERVAL);
            loop {
                ticker.tick().await;
                match run_metadata_discovery(&db, &vault).await {
                    Ok(0) => {}
                    Ok(count) => tracing::info!(jobs = count, "discovery jobs processed"),
                    Err(err) => tracing::error!(error = %err, "discovery poll failed"),
                }
            }
        });
    }

    // Connection health sweep: every 6 hours
    {
        let db = db.clone();
        let vault = vault.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CONNECTION_HEALTH_INTERVAL);
            loop {
                ticker.tick().await;
                match run_connection_health_sweep(&db, &vault).await {
                    Ok((checked, failed)) => tracing::info!(
                        checked = checked,
                        failed = failed,
                        "connection health sweep finished"
                    ),
                    Err(err) => tracing::error!(error = %err, "connection health sweep failed"),
                }
            }
        });
    }

    tracing::info!("workers scheduled; waiting for shutdown signal");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    Ok(())
}
