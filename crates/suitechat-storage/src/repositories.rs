// Repository layer for database operations.
//
// The `Database` facade owns the pool; tenant-scoped units of work begin
// with `tenant_tx`, which binds the RLS GUC before any query runs.
// Operations that must share the caller's transaction take a
// `&mut PgConnection` executor.

use anyhow::Result;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::*;
use crate::tenant_context::TenantTx;

/// Heuristic for managed/remote Postgres targets that need smaller pools.
fn is_remote_target(url: &str) -> bool {
    url.contains("supabase.com") || url.contains("supabase.co")
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with pool sizing per target: remote targets get a small
    /// pool, local ones a larger one. Connections are pre-pinged so broken
    /// ones are detected before use.
    pub async fn from_url(database_url: &str) -> Result<Self> {
        let max_connections = if is_remote_target(database_url) { 10 } else { 30 };
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Create a pool without connecting eagerly. Connections are opened on
    /// first use; handy for wiring and tests.
    pub fn from_url_lazy(database_url: &str) -> Result<Self> {
        let max_connections = if is_remote_target(database_url) { 10 } else { 30 };
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .test_before_acquire(true)
            .connect_lazy(database_url)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Begin a tenant-bound transaction.
    pub async fn tenant_tx(&self, tenant_id: Uuid) -> Result<TenantTx> {
        TenantTx::begin(&self.pool, tenant_id).await
    }

    // ============================================
    // Tenants and users
    // ============================================

    pub async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<TenantRow>> {
        let row = sqlx::query_as::<_, TenantRow>(
            r#"
            SELECT id, slug, name, plan, is_active, plan_expires_at, created_at, updated_at
            FROM tenants
            WHERE id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Tenants holding at least one active connection for a provider.
    /// Platform-level read used by the sync workers to fan out.
    pub async fn tenants_with_active_connections(&self, provider: &str) -> Result<Vec<Uuid>> {
        let rows: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT tenant_id FROM connections
            WHERE provider = $1 AND status = 'active'
            "#,
        )
        .bind(provider)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_user(&self, tenant_id: Uuid, user_id: Uuid) -> Result<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, tenant_id, email, full_name, is_active, created_at
            FROM users
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(user_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Whether the user holds a permission codename through any role.
    pub async fn has_permission(&self, user_id: Uuid, codename: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM user_roles ur
            JOIN role_permissions rp ON rp.role_id = ur.role_id
            JOIN permissions p ON p.id = rp.permission_id
            WHERE ur.user_id = $1 AND p.codename = $2
            "#,
        )
        .bind(user_id)
        .bind(codename)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    // ============================================
    // Chat sessions and messages
    // ============================================

    pub async fn get_session(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<ChatSessionRow>> {
        let row = sqlx::query_as::<_, ChatSessionRow>(
            r#"
            SELECT id, tenant_id, user_id, workspace_id, session_type, title, is_archived,
                   created_at, updated_at
            FROM chat_sessions
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(session_id)
        .bind(tenant_id)
        .fetch_optional(conn)
        .await?;
        Ok(row)
    }

    /// Last `limit` messages of a session, oldest first.
    pub async fn recent_messages(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        session_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ChatMessageRow>> {
        let mut rows = sqlx::query_as::<_, ChatMessageRow>(
            r#"
            SELECT id, tenant_id, session_id, role, content, tool_calls, citations,
                   input_tokens, output_tokens, provider, model, is_byok, created_at
            FROM chat_messages
            WHERE session_id = $1 AND tenant_id = $2
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(session_id)
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(conn)
        .await?;
        rows.reverse();
        Ok(rows)
    }

    pub async fn insert_chat_message(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        input: NewChatMessage,
    ) -> Result<ChatMessageRow> {
        let row = sqlx::query_as::<_, ChatMessageRow>(
            r#"
            INSERT INTO chat_messages (
                id, tenant_id, session_id, role, content, tool_calls, citations,
                input_tokens, output_tokens, provider, model, is_byok, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW())
            RETURNING id, tenant_id, session_id, role, content, tool_calls, citations,
                      input_tokens, output_tokens, provider, model, is_byok, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(tenant_id)
        .bind(input.session_id)
        .bind(&input.role)
        .bind(&input.content)
        .bind(&input.tool_calls)
        .bind(&input.citations)
        .bind(input.input_tokens)
        .bind(input.output_tokens)
        .bind(&input.provider)
        .bind(&input.model)
        .bind(input.is_byok)
        .fetch_one(conn)
        .await?;
        Ok(row)
    }

    /// Set the session title when none is set yet.
    pub async fn set_session_title_if_unset(
        &self,
        conn: &mut PgConnection,
        session_id: Uuid,
        title: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE chat_sessions
            SET title = $2, updated_at = NOW()
            WHERE id = $1 AND (title IS NULL OR title = '')
            "#,
        )
        .bind(session_id)
        .bind(title)
        .execute(conn)
        .await?;
        Ok(())
    }

    // ============================================
    // Connections
    // ============================================

    pub async fn active_connection(
        &self,
        tenant_id: Uuid,
        provider: &str,
    ) -> Result<Option<ConnectionRow>> {
        let row = sqlx::query_as::<_, ConnectionRow>(
            r#"
            SELECT id, tenant_id, provider, label, status, encrypted_credentials, key_version,
                   oauth_refresh_token, metadata, created_at, updated_at
            FROM connections
            WHERE tenant_id = $1 AND provider = $2 AND status = 'active'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    // ============================================
    // MCP connectors
    // ============================================

    pub async fn get_connector(
        &self,
        tenant_id: Uuid,
        connector_id: Uuid,
    ) -> Result<Option<McpConnectorRow>> {
        let row = sqlx::query_as::<_, McpConnectorRow>(
            r#"
            SELECT id, tenant_id, provider, label, server_url, auth_type, encrypted_credentials,
                   cached_tools, status, created_at, updated_at
            FROM mcp_connectors
            WHERE id = $1 AND tenant_id = $2 AND status = 'active'
            "#,
        )
        .bind(connector_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_active_connectors(&self, tenant_id: Uuid) -> Result<Vec<McpConnectorRow>> {
        let rows = sqlx::query_as::<_, McpConnectorRow>(
            r#"
            SELECT id, tenant_id, provider, label, server_url, auth_type, encrypted_credentials,
                   cached_tools, status, created_at, updated_at
            FROM mcp_connectors
            WHERE tenant_id = $1 AND status = 'active'
            ORDER BY created_at
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Persist refreshed credentials (OAuth token rotation).
    pub async fn update_connector_credentials(
        &self,
        connector_id: Uuid,
        encrypted_credentials: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE mcp_connectors
            SET encrypted_credentials = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(connector_id)
        .bind(encrypted_credentials)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn cache_connector_tools(&self, connector_id: Uuid, tools: &Value) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE mcp_connectors
            SET cached_tools = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(connector_id)
        .bind(tools)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ============================================
    // Entity mappings (tenant vernacular)
    // ============================================

    /// Trigram top-1 lookup: best fuzzy match above the `%` operator
    /// threshold, scoped to the tenant.
    pub async fn resolve_entity_fuzzy(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        natural_name: &str,
    ) -> Result<Option<(TenantEntityMappingRow, f32)>> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, entity_type, natural_name, script_id, description,
                   created_at, updated_at, similarity(natural_name, $2) AS sim
            FROM tenant_entity_mappings
            WHERE tenant_id = $1 AND natural_name % $2
            ORDER BY similarity(natural_name, $2) DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(natural_name)
        .fetch_optional(conn)
        .await?;

        use sqlx::Row;
        match row {
            Some(row) => {
                let sim: f32 = row.try_get("sim")?;
                let mapping = TenantEntityMappingRow {
                    id: row.try_get("id")?,
                    tenant_id: row.try_get("tenant_id")?,
                    entity_type: row.try_get("entity_type")?,
                    natural_name: row.try_get("natural_name")?,
                    script_id: row.try_get("script_id")?,
                    description: row.try_get("description")?,
                    created_at: row.try_get("created_at")?,
                    updated_at: row.try_get("updated_at")?,
                };
                Ok(Some((mapping, sim)))
            }
            None => Ok(None),
        }
    }

    /// Upsert on the (tenant, entity_type, script_id) uniqueness; a repeat
    /// correction refreshes the natural name.
    pub async fn upsert_entity_mapping(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        entity_type: &str,
        natural_name: &str,
        script_id: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tenant_entity_mappings (
                id, tenant_id, entity_type, natural_name, script_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            ON CONFLICT (tenant_id, entity_type, script_id)
            DO UPDATE SET natural_name = EXCLUDED.natural_name, updated_at = NOW()
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(tenant_id)
        .bind(entity_type)
        .bind(natural_name)
        .bind(script_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    // ============================================
    // Learned rules
    // ============================================

    pub async fn active_learned_rules(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
    ) -> Result<Vec<TenantLearnedRuleRow>> {
        let rows = sqlx::query_as::<_, TenantLearnedRuleRow>(
            r#"
            SELECT id, tenant_id, rule_category, rule_description, is_active, created_by, created_at
            FROM tenant_learned_rules
            WHERE tenant_id = $1 AND is_active = TRUE
            ORDER BY created_at
            "#,
        )
        .bind(tenant_id)
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }

    pub async fn insert_learned_rule(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        description: &str,
        category: &str,
        created_by: Option<Uuid>,
    ) -> Result<TenantLearnedRuleRow> {
        let row = sqlx::query_as::<_, TenantLearnedRuleRow>(
            r#"
            INSERT INTO tenant_learned_rules (
                id, tenant_id, rule_category, rule_description, is_active, created_by, created_at
            )
            VALUES ($1, $2, $3, $4, TRUE, $5, NOW())
            RETURNING id, tenant_id, rule_category, rule_description, is_active, created_by, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(tenant_id)
        .bind(category)
        .bind(description)
        .bind(created_by)
        .fetch_one(conn)
        .await?;
        Ok(row)
    }

    // ============================================
    // Policy profiles
    // ============================================

    pub async fn active_policy(&self, tenant_id: Uuid) -> Result<Option<PolicyProfileRow>> {
        let row = sqlx::query_as::<_, PolicyProfileRow>(
            r#"
            SELECT id, tenant_id, name, version, is_active, is_locked, read_only_mode,
                   allowed_record_types, blocked_fields, tool_allowlist, max_rows_per_query,
                   require_row_limit, custom_rules, created_by, created_at, updated_at
            FROM policy_profiles
            WHERE tenant_id = $1 AND is_active = TRUE
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    // ============================================
    // Jobs
    // ============================================

    pub async fn insert_job(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        job_type: &str,
        correlation_id: &str,
        parameters: Option<Value>,
    ) -> Result<JobRow> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO jobs (
                id, tenant_id, job_type, status, correlation_id, started_at, parameters, created_at
            )
            VALUES ($1, $2, $3, 'running', $4, NOW(), $5, NOW())
            RETURNING id, tenant_id, job_type, status, correlation_id, started_at, completed_at,
                      parameters, result_summary, error_message, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(tenant_id)
        .bind(job_type)
        .bind(correlation_id)
        .bind(parameters)
        .fetch_one(conn)
        .await?;
        Ok(row)
    }

    /// Queue a job for a background worker to pick up.
    pub async fn enqueue_job(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        job_type: &str,
        correlation_id: &str,
        parameters: Option<Value>,
    ) -> Result<JobRow> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO jobs (id, tenant_id, job_type, status, correlation_id, parameters, created_at)
            VALUES ($1, $2, $3, 'pending', $4, $5, NOW())
            RETURNING id, tenant_id, job_type, status, correlation_id, started_at, completed_at,
                      parameters, result_summary, error_message, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(tenant_id)
        .bind(job_type)
        .bind(correlation_id)
        .bind(parameters)
        .fetch_one(conn)
        .await?;
        Ok(row)
    }

    /// Claim pending jobs of a type, marking them running. Row locks with
    /// SKIP LOCKED so concurrent workers never double-claim.
    pub async fn claim_pending_jobs(&self, job_type: &str, batch: i64) -> Result<Vec<JobRow>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = 'running', started_at = NOW()
            WHERE id IN (
                SELECT id FROM jobs
                WHERE job_type = $1 AND status = 'pending'
                ORDER BY created_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, tenant_id, job_type, status, correlation_id, started_at, completed_at,
                      parameters, result_summary, error_message, created_at
            "#,
        )
        .bind(job_type)
        .bind(batch)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn complete_job(
        &self,
        conn: &mut PgConnection,
        job_id: Uuid,
        result_summary: Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed', completed_at = NOW(), result_summary = $2
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(result_summary)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn fail_job(
        &self,
        conn: &mut PgConnection,
        job_id: Uuid,
        error_message: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', completed_at = NOW(), error_message = $2
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(error_message)
        .execute(conn)
        .await?;
        Ok(())
    }

    // ============================================
    // Dev workspace
    // ============================================

    pub async fn list_workspace_files(
        &self,
        tenant_id: Uuid,
        workspace_id: Uuid,
        directory: Option<&str>,
    ) -> Result<Vec<WorkspaceFileRow>> {
        let prefix = directory.map(|d| format!("{}%", d.trim_end_matches('/')));
        let rows = sqlx::query_as::<_, WorkspaceFileRow>(
            r#"
            SELECT id, tenant_id, workspace_id, path, content, size_bytes, updated_at
            FROM workspace_files
            WHERE tenant_id = $1 AND workspace_id = $2
              AND ($3::text IS NULL OR path LIKE $3)
            ORDER BY path
            "#,
        )
        .bind(tenant_id)
        .bind(workspace_id)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn read_workspace_file(
        &self,
        tenant_id: Uuid,
        workspace_id: Uuid,
        path: &str,
    ) -> Result<Option<WorkspaceFileRow>> {
        let row = sqlx::query_as::<_, WorkspaceFileRow>(
            r#"
            SELECT id, tenant_id, workspace_id, path, content, size_bytes, updated_at
            FROM workspace_files
            WHERE tenant_id = $1 AND workspace_id = $2 AND path = $3
            "#,
        )
        .bind(tenant_id)
        .bind(workspace_id)
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Search files by name or content, capped.
    pub async fn search_workspace_files(
        &self,
        tenant_id: Uuid,
        workspace_id: Uuid,
        query: &str,
        by_content: bool,
        limit: i64,
    ) -> Result<Vec<WorkspaceFileRow>> {
        let pattern = format!("%{}%", query);
        let sql = if by_content {
            r#"
            SELECT id, tenant_id, workspace_id, path, content, size_bytes, updated_at
            FROM workspace_files
            WHERE tenant_id = $1 AND workspace_id = $2 AND content ILIKE $3
            ORDER BY path LIMIT $4
            "#
        } else {
            r#"
            SELECT id, tenant_id, workspace_id, path, content, size_bytes, updated_at
            FROM workspace_files
            WHERE tenant_id = $1 AND workspace_id = $2 AND path ILIKE $3
            ORDER BY path LIMIT $4
            "#
        };
        let rows = sqlx::query_as::<_, WorkspaceFileRow>(sql)
            .bind(tenant_id)
            .bind(workspace_id)
            .bind(pattern)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Create a draft changeset. Agents never apply changes; a human
    /// approves drafts through a path outside this core.
    pub async fn insert_changeset(
        &self,
        tenant_id: Uuid,
        workspace_id: Uuid,
        file_path: &str,
        unified_diff: &str,
        title: &str,
        rationale: Option<&str>,
        proposed_by: Uuid,
    ) -> Result<ChangesetRow> {
        let row = sqlx::query_as::<_, ChangesetRow>(
            r#"
            INSERT INTO workspace_changesets (
                id, tenant_id, workspace_id, file_path, unified_diff, title, rationale,
                status, proposed_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'draft', $8, NOW())
            RETURNING id, tenant_id, workspace_id, file_path, unified_diff, title, rationale,
                      status, proposed_by, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(tenant_id)
        .bind(workspace_id)
        .bind(file_path)
        .bind(unified_diff)
        .bind(title)
        .bind(rationale)
        .bind(proposed_by)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}
