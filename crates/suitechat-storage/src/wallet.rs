// Wallet ledger: the credit tollbooth.
//
// Deduction takes a row lock (SELECT ... FOR UPDATE) so concurrent turns
// for the same tenant serialise. Base credits drain first; the remainder
// spills into the metered overage counter that the reconciliation job
// reports to the external meter.

use anyhow::Result;
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::models::TenantWalletRow;

/// Balance snapshot returned after a deduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeductionReceipt {
    pub base_remaining: i64,
    pub metered_used: i64,
    pub cost: i64,
}

/// Pure spillover arithmetic: drain base first, overflow into metered.
/// Neither counter goes negative, and
/// (base_before + metered_before) - (base_after + metered_after) == -cost
/// measured on total consumption.
pub fn apply_deduction(base_remaining: i64, metered_used: i64, cost: i64) -> (i64, i64) {
    if base_remaining >= cost {
        (base_remaining - cost, metered_used)
    } else {
        let remainder = cost - base_remaining;
        (0, metered_used + remainder)
    }
}

/// Atomically deduct `cost` credits from the tenant wallet.
///
/// Must be called inside an open transaction so the row lock holds until
/// the caller commits. Returns None when the tenant has no wallet row
/// (no wallet = no charging).
pub async fn deduct_credits(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    cost: i64,
) -> Result<Option<DeductionReceipt>> {
    if cost == 0 {
        return Ok(None);
    }

    let wallet = sqlx::query_as::<_, TenantWalletRow>(
        r#"
        SELECT id, tenant_id, stripe_customer_id, stripe_subscription_item_id,
               billing_period_start, billing_period_end, base_credits_remaining,
               metered_credits_used, last_synced_metered_credits, created_at, updated_at
        FROM tenant_wallets
        WHERE tenant_id = $1
        FOR UPDATE
        "#,
    )
    .bind(tenant_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(wallet) = wallet else {
        return Ok(None);
    };

    let (base_remaining, metered_used) = apply_deduction(
        wallet.base_credits_remaining,
        wallet.metered_credits_used,
        cost,
    );

    sqlx::query(
        r#"
        UPDATE tenant_wallets
        SET base_credits_remaining = $2, metered_credits_used = $3, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(wallet.id)
    .bind(base_remaining)
    .bind(metered_used)
    .execute(&mut *conn)
    .await?;

    info!(
        tenant_id = %tenant_id,
        cost = cost,
        base_remaining = base_remaining,
        metered_used = metered_used,
        "credits deducted"
    );

    Ok(Some(DeductionReceipt {
        base_remaining,
        metered_used,
        cost,
    }))
}

/// Wallets with unreported overage and an external meter configured.
pub async fn wallets_pending_sync(pool: &PgPool) -> Result<Vec<TenantWalletRow>> {
    let rows = sqlx::query_as::<_, TenantWalletRow>(
        r#"
        SELECT id, tenant_id, stripe_customer_id, stripe_subscription_item_id,
               billing_period_start, billing_period_end, base_credits_remaining,
               metered_credits_used, last_synced_metered_credits, created_at, updated_at
        FROM tenant_wallets
        WHERE metered_credits_used > last_synced_metered_credits
          AND stripe_subscription_item_id IS NOT NULL
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Advance the sync watermark after the external meter acknowledged the
/// delta. Runs on the caller's transaction so the report and the watermark
/// commit together.
pub async fn mark_synced(conn: &mut PgConnection, wallet_id: Uuid, new_total: i64) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE tenant_wallets
        SET last_synced_metered_credits = $2, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(wallet_id)
    .bind(new_total)
    .execute(conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deduction_from_sufficient_base_leaves_metered_untouched() {
        assert_eq!(apply_deduction(10, 0, 3), (7, 0));
    }

    #[test]
    fn deduction_spills_remainder_into_metered() {
        // Wallet has 1 base credit, a sonnet-tier call costs 2
        assert_eq!(apply_deduction(1, 0, 2), (0, 1));
    }

    #[test]
    fn deduction_from_empty_base_is_fully_metered() {
        assert_eq!(apply_deduction(0, 5, 3), (0, 8));
    }

    #[test]
    fn total_consumed_always_equals_cost() {
        for (base, metered, cost) in [(10, 0, 3), (1, 0, 2), (0, 5, 3), (2, 2, 2)] {
            let (base_after, metered_after) = apply_deduction(base, metered, cost);
            let consumed = (base - base_after) + (metered_after - metered);
            assert_eq!(consumed, cost);
            assert!(base_after >= 0);
            assert!(metered_after >= 0);
        }
    }
}
