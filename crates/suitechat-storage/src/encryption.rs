// Credential vault: authenticated encryption for third-party credentials.
//
// AES-256-GCM with a process-wide primary key and a recorded key version,
// so re-key campaigns can run while readers still hold older versions.
// Fails closed: a missing or placeholder key errors on every operation.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use serde_json::Value;

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;
const PLACEHOLDER_KEY: &str = "change-me-generate-a-real-key";

/// Encrypts and decrypts credential maps. Thread-safe; clone freely.
#[derive(Clone)]
pub struct CredentialVault {
    cipher: Option<Aes256Gcm>,
    key_version: i32,
}

impl CredentialVault {
    /// Create from a base64-encoded 32-byte key. A placeholder or empty key
    /// yields a vault that errors on every encrypt/decrypt.
    pub fn new(key_b64: &str, key_version: i32) -> Result<Self> {
        if key_b64.is_empty() || key_b64 == PLACEHOLDER_KEY {
            return Ok(Self {
                cipher: None,
                key_version,
            });
        }

        let key_bytes = BASE64
            .decode(key_b64)
            .context("encryption key is not valid base64")?;
        if key_bytes.len() != KEY_SIZE {
            anyhow::bail!(
                "encryption key must be {} bytes, got {}",
                KEY_SIZE,
                key_bytes.len()
            );
        }
        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| anyhow::anyhow!("failed to create cipher: {e}"))?;

        Ok(Self {
            cipher: Some(cipher),
            key_version,
        })
    }

    /// Create from SUITECHAT_ENCRYPTION_KEY / SUITECHAT_ENCRYPTION_KEY_VERSION.
    pub fn from_env() -> Result<Self> {
        let key = std::env::var("SUITECHAT_ENCRYPTION_KEY").unwrap_or_default();
        let version = std::env::var("SUITECHAT_ENCRYPTION_KEY_VERSION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        Self::new(&key, version)
    }

    fn cipher(&self) -> Result<&Aes256Gcm> {
        self.cipher
            .as_ref()
            .context("encryption key must be set to a real key (placeholder detected)")
    }

    /// Version recorded on rows sealed by this vault.
    pub fn key_version(&self) -> i32 {
        self.key_version
    }

    /// Encrypt a credentials map to an opaque string: `v{n}:{base64(nonce || ct)}`.
    pub fn encrypt_credentials(&self, credentials: &Value) -> Result<String> {
        let cipher = self.cipher()?;
        let plaintext = serde_json::to_vec(credentials).context("failed to serialize credentials")?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_ref())
            .map_err(|e| anyhow::anyhow!("encryption failed: {e}"))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        Ok(format!("v{}:{}", self.key_version, BASE64.encode(sealed)))
    }

    /// Decrypt an opaque string back to the credentials map.
    pub fn decrypt_credentials(&self, encrypted: &str) -> Result<Value> {
        let cipher = self.cipher()?;

        let payload = encrypted
            .split_once(':')
            .map(|(_, rest)| rest)
            .unwrap_or(encrypted);
        let sealed = BASE64
            .decode(payload)
            .context("encrypted payload is not valid base64")?;
        if sealed.len() < NONCE_SIZE {
            anyhow::bail!("encrypted payload too short");
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| anyhow::anyhow!("decryption failed (data may be corrupted): {e}"))?;

        serde_json::from_slice(&plaintext).context("decrypted payload is not valid JSON")
    }

    /// Key version parsed from a sealed payload, without decrypting.
    pub fn payload_key_version(encrypted: &str) -> Option<i32> {
        let (version, _) = encrypted.split_once(':')?;
        version.strip_prefix('v')?.parse().ok()
    }
}

/// Generate a new random key in base64, for operational tooling.
pub fn generate_key() -> String {
    let mut key = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut key);
    BASE64.encode(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vault() -> CredentialVault {
        CredentialVault::new(&generate_key(), 2).unwrap()
    }

    #[test]
    fn encrypt_decrypt_round_trips_any_map() {
        let vault = vault();
        let credentials = json!({
            "account_id": "123456",
            "access_token": "tok-abc",
            "expires_at": 1_700_000_000,
            "nested": {"client_id": "cid"},
        });
        let sealed = vault.encrypt_credentials(&credentials).unwrap();
        assert!(sealed.starts_with("v2:"));
        assert_eq!(vault.decrypt_credentials(&sealed).unwrap(), credentials);
    }

    #[test]
    fn same_plaintext_produces_different_ciphertext() {
        let vault = vault();
        let credentials = json!({"token": "same"});
        let a = vault.encrypt_credentials(&credentials).unwrap();
        let b = vault.encrypt_credentials(&credentials).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn placeholder_key_fails_closed() {
        let vault = CredentialVault::new(PLACEHOLDER_KEY, 1).unwrap();
        assert!(vault.encrypt_credentials(&json!({})).is_err());
        assert!(vault.decrypt_credentials("v1:AAAA").is_err());
    }

    #[test]
    fn invalid_key_material_is_rejected() {
        assert!(CredentialVault::new("not-base64!!!", 1).is_err());
        let short = BASE64.encode([0u8; 16]);
        assert!(CredentialVault::new(&short, 1).is_err());
    }

    #[test]
    fn payload_version_is_readable_without_decrypting() {
        let vault = vault();
        let sealed = vault.encrypt_credentials(&json!({"k": "v"})).unwrap();
        assert_eq!(CredentialVault::payload_key_version(&sealed), Some(2));
    }

    #[test]
    fn tampered_payload_fails_authentication() {
        let vault = vault();
        let sealed = vault.encrypt_credentials(&json!({"k": "v"})).unwrap();
        let mut bytes = BASE64.decode(sealed.split_once(':').unwrap().1).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let tampered = format!("v2:{}", BASE64.encode(bytes));
        assert!(vault.decrypt_credentials(&tampered).is_err());
    }
}
