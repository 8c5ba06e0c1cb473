// Database row models (internal; may differ from public DTOs)

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================
// Tenancy
// ============================================

/// Tenant row. Deletion is soft: `is_active` flips, the row stays.
#[derive(Debug, Clone, FromRow)]
pub struct TenantRow {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub plan: String,
    pub is_active: bool,
    pub plan_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User row, unique by (tenant_id, email).
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

// ============================================
// Connections and connectors
// ============================================

/// Credential handle to an external system. The blob is opaque vault
/// output; `key_version` records which key sealed it so re-key campaigns
/// can run concurrently with reads.
#[derive(Debug, Clone, FromRow)]
pub struct ConnectionRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub provider: String,
    pub label: String,
    pub status: String,
    pub encrypted_credentials: String,
    pub key_version: i32,
    pub oauth_refresh_token: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tenant-registered remote tool server descriptor.
#[derive(Debug, Clone, FromRow)]
pub struct McpConnectorRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub provider: String,
    pub label: String,
    pub server_url: String,
    /// none | bearer | api_key | oauth2
    pub auth_type: String,
    pub encrypted_credentials: Option<String>,
    /// Cached tool descriptors from the last discovery pass
    pub cached_tools: Option<serde_json::Value>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================
// Chat
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct ChatSessionRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub workspace_id: Option<Uuid>,
    pub session_type: String,
    pub title: Option<String>,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Chat message. Immutable once flushed.
#[derive(Debug, Clone, FromRow)]
pub struct ChatMessageRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub session_id: Uuid,
    pub role: String,
    pub content: String,
    pub tool_calls: Option<serde_json::Value>,
    pub citations: Option<serde_json::Value>,
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub is_byok: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for persisting a chat message.
#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub session_id: Uuid,
    pub role: String,
    pub content: String,
    pub tool_calls: Option<serde_json::Value>,
    pub citations: Option<serde_json::Value>,
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub is_byok: bool,
}

impl NewChatMessage {
    pub fn text(session_id: Uuid, role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            session_id,
            role: role.into(),
            content: content.into(),
            tool_calls: None,
            citations: None,
            input_tokens: None,
            output_tokens: None,
            provider: None,
            model: None,
            is_byok: false,
        }
    }
}

// ============================================
// Retrieval corpus
// ============================================

/// Embedded document chunk. Tenant-scoped; the zero-uuid system tenant
/// holds shared platform material.
#[derive(Debug, Clone, FromRow)]
pub struct DocChunkRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub title: String,
    pub content: String,
    pub source_path: String,
    pub embedding: Option<Vec<f32>>,
    pub tags: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Curated domain knowledge, shared system-wide.
#[derive(Debug, Clone, FromRow)]
pub struct DomainKnowledgeChunkRow {
    pub id: Uuid,
    pub raw_text: String,
    pub source_uri: Option<String>,
    pub topic_tags: Option<serde_json::Value>,
    pub embedding: Option<Vec<f32>>,
    pub is_deprecated: bool,
    pub created_at: DateTime<Utc>,
}

// ============================================
// Tenant vernacular
// ============================================

/// Fuzzy dictionary entry, trigram-indexed on natural_name.
/// Unique on (tenant_id, entity_type, script_id).
#[derive(Debug, Clone, FromRow)]
pub struct TenantEntityMappingRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub entity_type: String,
    pub natural_name: String,
    pub script_id: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Learned rule. Appended, never mutated.
#[derive(Debug, Clone, FromRow)]
pub struct TenantLearnedRuleRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub rule_category: Option<String>,
    pub rule_description: String,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

// ============================================
// Billing
// ============================================

/// Credit ledger, one row per tenant.
/// Invariant: metered_credits_used >= last_synced_metered_credits >= 0.
#[derive(Debug, Clone, FromRow)]
pub struct TenantWalletRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_item_id: Option<String>,
    pub billing_period_start: DateTime<Utc>,
    pub billing_period_end: DateTime<Utc>,
    pub base_credits_remaining: i64,
    pub metered_credits_used: i64,
    pub last_synced_metered_credits: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================
// Audit and jobs
// ============================================

/// Append-only audit event. The id is a uuidv7 so events sort by time.
#[derive(Debug, Clone, FromRow)]
pub struct AuditEventRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub actor_type: String,
    pub category: String,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub correlation_id: Option<String>,
    pub job_id: Option<Uuid>,
    pub payload: Option<serde_json::Value>,
    pub status: String,
    pub error_message: Option<String>,
}

/// Background task lifecycle record.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub job_type: String,
    pub status: String,
    pub correlation_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub parameters: Option<serde_json::Value>,
    pub result_summary: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================
// Policy
// ============================================

/// Declarative tool policy. Versioned; unique on (tenant_id, version).
#[derive(Debug, Clone, FromRow)]
pub struct PolicyProfileRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub version: i32,
    pub is_active: bool,
    pub is_locked: bool,
    pub read_only_mode: bool,
    pub allowed_record_types: Option<serde_json::Value>,
    pub blocked_fields: Option<serde_json::Value>,
    pub tool_allowlist: Option<serde_json::Value>,
    pub max_rows_per_query: i32,
    pub require_row_limit: bool,
    pub custom_rules: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PolicyProfileRow {
    /// Blocked field names as lowercase strings.
    pub fn blocked_field_names(&self) -> Vec<String> {
        json_string_array(&self.blocked_fields)
    }

    /// Tool allow-list entries, if configured.
    pub fn tool_allowlist_names(&self) -> Vec<String> {
        json_string_array(&self.tool_allowlist)
    }
}

fn json_string_array(value: &Option<serde_json::Value>) -> Vec<String> {
    value
        .as_ref()
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

// ============================================
// Dev workspace
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct WorkspaceFileRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub workspace_id: Uuid,
    pub path: String,
    pub content: String,
    pub size_bytes: i64,
    pub updated_at: DateTime<Utc>,
}

/// Proposed change awaiting human approval. The apply path lives outside
/// the core; agents can only create drafts.
#[derive(Debug, Clone, FromRow)]
pub struct ChangesetRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub workspace_id: Uuid,
    pub file_path: String,
    pub unified_diff: String,
    pub title: String,
    pub rationale: Option<String>,
    pub status: String,
    pub proposed_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn policy_with(blocked: serde_json::Value) -> PolicyProfileRow {
        PolicyProfileRow {
            id: Uuid::now_v7(),
            tenant_id: Uuid::now_v7(),
            name: "default".into(),
            version: 1,
            is_active: true,
            is_locked: false,
            read_only_mode: true,
            allowed_record_types: None,
            blocked_fields: Some(blocked),
            tool_allowlist: None,
            max_rows_per_query: 1000,
            require_row_limit: true,
            custom_rules: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn blocked_fields_parse_string_arrays_only() {
        let policy = policy_with(json!(["ssn", "salary", 42]));
        assert_eq!(policy.blocked_field_names(), vec!["ssn", "salary"]);

        let policy = policy_with(json!({"not": "an array"}));
        assert!(policy.blocked_field_names().is_empty());
    }
}
