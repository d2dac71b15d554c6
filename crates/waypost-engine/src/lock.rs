use std::sync::Arc;

use uuid::Uuid;

use crate::backend::{LockGrant, LockHolder, LockStatus, WorkspaceBackend};
use crate::error::EngineError;

/// Acquires, checks and releases the per-workspace exclusive edit lease.
///
/// Expiry is enforced by the backend; this coordinator never renews a
/// lease and keeps no client-side lock state beyond its holder identity.
pub struct LockCoordinator {
    backend: Arc<dyn WorkspaceBackend>,
    holder: LockHolder,
}

impl LockCoordinator {
    pub fn new(backend: Arc<dyn WorkspaceBackend>, holder: LockHolder) -> Self {
        Self { backend, holder }
    }

    pub fn holder(&self) -> &LockHolder {
        &self.holder
    }

    /// Attempt to acquire the lease.
    ///
    /// Granted when the workspace is free or the caller already holds it
    /// (the lease timestamps are rewritten). Denied with the current
    /// holder's label otherwise, unless `force` is set, which evicts the
    /// holder unconditionally. Network failures surface: the edit session
    /// must not proceed without a confirmed lease.
    pub async fn acquire(
        &self,
        workspace_id: Uuid,
        force: bool,
    ) -> Result<LockGrant, EngineError> {
        let grant = self
            .backend
            .lock_workspace(workspace_id, &self.holder, force)
            .await?;

        if grant.granted {
            tracing::debug!(%workspace_id, holder = %self.holder.label, force, "edit lease acquired");
        } else {
            tracing::debug!(
                %workspace_id,
                held_by = grant.holder_label.as_deref().unwrap_or("unknown"),
                "edit lease denied"
            );
        }

        Ok(grant)
    }

    /// Side-effect-free read of the lease, used before navigation to decide
    /// whether to show a takeover prompt
    pub async fn check(&self, workspace_id: Uuid) -> Result<LockStatus, EngineError> {
        Ok(self.backend.check_workspace_lock(workspace_id).await?)
    }

    /// Best-effort release. Idempotent: releasing an absent or stolen lease
    /// is a no-op, and network failures are swallowed since the lease will
    /// expire server-side anyway.
    pub async fn release(&self, workspace_id: Uuid) {
        if let Err(err) = self
            .backend
            .unlock_workspace(workspace_id, &self.holder)
            .await
        {
            tracing::warn!(%workspace_id, error = %err, "lease release failed; waiting for server-side expiry");
        }
    }
}
