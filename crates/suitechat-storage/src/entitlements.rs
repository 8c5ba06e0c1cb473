// Entitlement evaluation: (plan, feature) -> allow/deny.

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::TenantRow;

/// Concrete limits per plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    pub max_connections: i64,
    pub mcp_tools: bool,
    /// -1 means unlimited
    pub max_exports_per_day: i64,
}

/// Limits for a plan tier; unknown plans get the trial limits.
pub fn plan_limits(plan: &str) -> PlanLimits {
    match plan {
        "pro" => PlanLimits {
            max_connections: 50,
            mcp_tools: true,
            max_exports_per_day: 1000,
        },
        "enterprise" => PlanLimits {
            max_connections: 500,
            mcp_tools: true,
            max_exports_per_day: -1,
        },
        _ => PlanLimits {
            max_connections: 2,
            mcp_tools: false,
            max_exports_per_day: 10,
        },
    }
}

/// Check whether a tenant may use a feature. Inactive tenants always deny.
pub async fn check_entitlement(pool: &PgPool, tenant_id: Uuid, feature: &str) -> Result<bool> {
    let tenant = sqlx::query_as::<_, TenantRow>(
        r#"
        SELECT id, slug, name, plan, is_active, plan_expires_at, created_at, updated_at
        FROM tenants
        WHERE id = $1
        "#,
    )
    .bind(tenant_id)
    .fetch_optional(pool)
    .await?;

    let Some(tenant) = tenant else {
        return Ok(false);
    };
    if !tenant.is_active {
        return Ok(false);
    }

    let limits = plan_limits(&tenant.plan);

    match feature {
        "connections" => {
            // The ERP connection is the core product; it never counts
            // against the quota.
            let current: i64 = sqlx::query_scalar(
                r#"
                SELECT COUNT(*) FROM connections
                WHERE tenant_id = $1 AND provider <> 'netsuite' AND status = 'active'
                "#,
            )
            .bind(tenant_id)
            .fetch_one(pool)
            .await?;
            Ok(current < limits.max_connections)
        }
        "connections:netsuite" => Ok(true),
        "mcp_tools" => Ok(limits.mcp_tools),
        _ => Ok(true),
    }
}

/// Limits for a tenant's current plan; trial limits when the tenant is missing.
pub async fn tenant_plan_limits(pool: &PgPool, tenant_id: Uuid) -> Result<PlanLimits> {
    let plan: Option<String> = sqlx::query_scalar("SELECT plan FROM tenants WHERE id = $1")
        .bind(tenant_id)
        .fetch_optional(pool)
        .await?;
    Ok(plan_limits(plan.as_deref().unwrap_or("trial")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_plans_fall_back_to_trial_limits() {
        assert_eq!(plan_limits("mystery"), plan_limits("trial"));
        assert!(!plan_limits("trial").mcp_tools);
    }

    #[test]
    fn enterprise_exports_are_unlimited() {
        assert_eq!(plan_limits("enterprise").max_exports_per_day, -1);
        assert!(plan_limits("pro").mcp_tools);
    }
}
