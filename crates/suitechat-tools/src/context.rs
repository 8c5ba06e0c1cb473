// Execution context handed to every local tool.

use std::sync::Arc;

use uuid::Uuid;

use suitechat_storage::{CredentialVault, Database, Embedder, PolicyProfileRow};

/// What a local tool may touch: the database (tenant-scoped access only),
/// the credential vault, and the identifiers of the calling turn. Remote
/// calls never receive this. The active policy is loaded once per turn
/// and carried here so the dispatcher evaluates it without a per-call
/// round-trip.
#[derive(Clone)]
pub struct ToolContext {
    pub db: Database,
    pub vault: CredentialVault,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub policy: Option<PolicyProfileRow>,
    pub tenant_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub workspace_id: Option<Uuid>,
    pub correlation_id: String,
}

impl ToolContext {
    pub fn new(
        db: Database,
        vault: CredentialVault,
        tenant_id: Uuid,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            db,
            vault,
            embedder: None,
            policy: None,
            tenant_id,
            actor_id: None,
            workspace_id: None,
            correlation_id: correlation_id.into(),
        }
    }

    pub fn with_policy(mut self, policy: Option<PolicyProfileRow>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn with_workspace(mut self, workspace_id: Uuid) -> Self {
        self.workspace_id = Some(workspace_id);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }
}
