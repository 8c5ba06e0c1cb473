// Tenant context binder.
//
// A TenantTx is a Postgres transaction with the RLS GUC
// `app.current_tenant_id` bound via set_config(..., true), so the storage
// engine filters every row the transaction touches. All tenant-scoped
// mutations must run on a TenantTx; rebinding to a different tenant inside
// an open scope is an error.

use anyhow::Result;
use sqlx::{PgConnection, Postgres, Transaction};
use uuid::Uuid;

/// A tenant-bound unit of work.
pub struct TenantTx {
    tx: Transaction<'static, Postgres>,
    tenant_id: Uuid,
}

impl TenantTx {
    pub(crate) async fn begin(pool: &sqlx::PgPool, tenant_id: Uuid) -> Result<Self> {
        let mut tx = pool.begin().await?;
        bind_tenant(&mut tx, tenant_id).await?;
        Ok(Self { tx, tenant_id })
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    /// The underlying connection, for repository calls that take an executor.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    /// Re-assert the bound tenant. Binding a different tenant inside an
    /// open scope is forbidden.
    pub async fn rebind(&mut self, tenant_id: Uuid) -> Result<()> {
        if tenant_id != self.tenant_id {
            anyhow::bail!(
                "tenant context already bound to {}; refusing nested bind to {}",
                self.tenant_id,
                tenant_id
            );
        }
        bind_tenant(&mut self.tx, tenant_id).await
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// Bind the RLS tenant GUC for the current transaction. `set_config` with
/// is_local=true scopes the setting to the transaction, and keeps the
/// tenant id a bind parameter.
async fn bind_tenant(conn: &mut PgConnection, tenant_id: Uuid) -> Result<()> {
    sqlx::query("SELECT set_config('app.current_tenant_id', $1, true)")
        .bind(tenant_id.to_string())
        .execute(conn)
        .await?;
    Ok(())
}
