// Integration API keys.
//
// Keys are stored as SHA-256 hashes with a short displayable prefix.
// Resolving a key binds a (tenant, scopes) context that flows into the
// same tenant-context binder as interactive sessions.

use anyhow::Result;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

const KEY_BYTES: usize = 32;
const KEY_PREFIX: &str = "sck_";
const DISPLAY_PREFIX_LEN: usize = 12;

#[derive(Debug, Clone, FromRow)]
pub struct ChatApiKeyRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub key_hash: String,
    pub key_prefix: String,
    pub scopes: serde_json::Value,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// The (tenant, scopes) context an API key binds.
#[derive(Debug, Clone)]
pub struct ApiKeyContext {
    pub tenant_id: Uuid,
    pub scopes: Vec<String>,
}

/// Generate a new key. Returns (plaintext, display_prefix, hash); only
/// the prefix and hash are persisted.
pub fn generate_api_key() -> (String, String, String) {
    let mut bytes = [0u8; KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let plaintext = format!("{KEY_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes));
    let prefix: String = plaintext.chars().take(DISPLAY_PREFIX_LEN).collect();
    let hash = hash_api_key(&plaintext);
    (plaintext, prefix, hash)
}

pub fn hash_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Resolve a presented key to its tenant context; touches last_used_at.
pub async fn resolve_api_key(pool: &PgPool, key: &str) -> Result<Option<ApiKeyContext>> {
    let hash = hash_api_key(key);
    let row = sqlx::query_as::<_, ChatApiKeyRow>(
        r#"
        UPDATE chat_api_keys
        SET last_used_at = NOW()
        WHERE key_hash = $1 AND is_active = TRUE
        RETURNING id, tenant_id, name, key_hash, key_prefix, scopes, is_active,
                  last_used_at, created_at
        "#,
    )
    .bind(&hash)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| ApiKeyContext {
        tenant_id: row.tenant_id,
        scopes: row
            .scopes
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|s| s.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_carry_prefix_and_stable_hash() {
        let (plaintext, prefix, hash) = generate_api_key();
        assert!(plaintext.starts_with(KEY_PREFIX));
        assert!(plaintext.starts_with(&prefix));
        assert_eq!(prefix.len(), DISPLAY_PREFIX_LEN);
        assert_eq!(hash, hash_api_key(&plaintext));
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn distinct_keys_hash_differently() {
        let (a, _, hash_a) = generate_api_key();
        let (b, _, hash_b) = generate_api_key();
        assert_ne!(a, b);
        assert_ne!(hash_a, hash_b);
    }
}
