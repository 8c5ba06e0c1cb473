// Postgres storage layer with sqlx
//
// Every tenant-owned read or write goes through a transaction that has the
// RLS tenant GUC bound (see tenant_context). The repository facade exposes
// typed operations over raw SQL; open-ended payloads stay serde_json::Value.

pub mod api_keys;
pub mod audit;
pub mod encryption;
pub mod entitlements;
pub mod models;
pub mod repositories;
pub mod retriever;
pub mod tenant_context;
pub mod wallet;

pub use api_keys::{generate_api_key, resolve_api_key, ApiKeyContext, ChatApiKeyRow};
pub use audit::{AuditLog, NewAuditEvent};
pub use encryption::CredentialVault;
pub use entitlements::{check_entitlement, plan_limits, PlanLimits};
pub use models::*;
pub use repositories::Database;
pub use retriever::{
    cosine_similarity, import_doc_file, precheck_import, rag_search, retrieve_domain_knowledge,
    Embedder, ImportOutcome, RetrievedChunk, SYSTEM_TENANT_ID,
};
pub use tenant_context::TenantTx;
pub use wallet::{apply_deduction, deduct_credits, DeductionReceipt};
