// Metered billing reconciliation: push unsynced credit overage to the
// external meter.
//
// For each wallet where metered usage has moved past the sync watermark,
// the delta is reported as a usage-record increment and the watermark
// advances to the new total inside the same transaction as the report
// acknowledgment. A failed report leaves the watermark untouched so the
// next run retries.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use suitechat_storage::{wallet, Database, TenantWalletRow};

/// External meter: report a positive usage increment against a
/// subscription item.
#[async_trait]
pub trait UsageMeter: Send + Sync {
    async fn report_usage(&self, subscription_item_id: &str, quantity: i64) -> Result<()>;
}

/// Stripe usage-record meter.
pub struct StripeMeter {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl StripeMeter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            api_base: "https://api.stripe.com".into(),
        }
    }

    pub fn with_base_url(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[async_trait]
impl UsageMeter for StripeMeter {
    async fn report_usage(&self, subscription_item_id: &str, quantity: i64) -> Result<()> {
        let url = format!(
            "{}/v1/subscription_items/{}/usage_records",
            self.api_base, subscription_item_id
        );
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.api_key, None::<&str>)
            .form(&[("quantity", quantity.to_string()), ("action", "increment".into())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("usage record rejected ({status}): {body}");
        }
        Ok(())
    }
}

/// Unreported overage for a wallet, if any.
pub fn pending_delta(wallet: &TenantWalletRow) -> Option<i64> {
    let delta = wallet.metered_credits_used - wallet.last_synced_metered_credits;
    (delta > 0 && wallet.stripe_subscription_item_id.is_some()).then_some(delta)
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: u32,
    pub errors: u32,
}

/// Reconcile every wallet with unreported overage. Platform-level: reads
/// across tenants, no tenant binding.
pub async fn sync_metered_billing(db: &Database, meter: &dyn UsageMeter) -> Result<SyncReport> {
    let wallets = wallet::wallets_pending_sync(db.pool()).await?;
    if wallets.is_empty() {
        info!("billing sync: no wallets need syncing");
        return Ok(SyncReport::default());
    }

    let mut report = SyncReport::default();
    for row in wallets {
        let Some(delta) = pending_delta(&row) else {
            continue;
        };
        let Some(item_id) = row.stripe_subscription_item_id.as_deref() else {
            continue;
        };

        // Report, then advance the watermark in the same transaction as
        // the acknowledgment. Failure leaves the watermark for a retry.
        let mut tx = db.pool().begin().await?;
        match meter.report_usage(item_id, delta).await {
            Ok(()) => {
                wallet::mark_synced(&mut *tx, row.id, row.metered_credits_used).await?;
                tx.commit().await?;
                report.synced += 1;
                info!(
                    tenant_id = %row.tenant_id,
                    delta = delta,
                    total_metered = row.metered_credits_used,
                    "billing sync reported"
                );
            }
            Err(err) => {
                tx.rollback().await?;
                report.errors += 1;
                warn!(tenant_id = %row.tenant_id, error = %err, "billing sync failed for wallet");
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn wallet_row(metered: i64, synced: i64, item: Option<&str>) -> TenantWalletRow {
        TenantWalletRow {
            id: Uuid::now_v7(),
            tenant_id: Uuid::now_v7(),
            stripe_customer_id: None,
            stripe_subscription_item_id: item.map(str::to_string),
            billing_period_start: Utc::now(),
            billing_period_end: Utc::now(),
            base_credits_remaining: 0,
            metered_credits_used: metered,
            last_synced_metered_credits: synced,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn delta_requires_movement_and_a_meter_id() {
        assert_eq!(pending_delta(&wallet_row(10, 4, Some("si_1"))), Some(6));
        assert_eq!(pending_delta(&wallet_row(4, 4, Some("si_1"))), None);
        assert_eq!(pending_delta(&wallet_row(10, 4, None)), None);
        // Watermark never exceeds usage, but a corrupt row must not
        // produce a negative report
        assert_eq!(pending_delta(&wallet_row(3, 4, Some("si_1"))), None);
    }
}
