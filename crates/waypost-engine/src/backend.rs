use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use waypost_core::{Document, Step, VersionSnapshot};

/// Errors surfaced by the backend collaborator
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("network error: {0}")]
    Network(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    /// The server rejected a write from a holder that lost the lease
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Identity presented when acquiring a workspace lease
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockHolder {
    pub id: Uuid,
    pub label: String,
}

impl LockHolder {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
        }
    }
}

/// Result of a lock acquisition attempt. When denied, `holder_label` names
/// the current holder so the caller can offer a takeover.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockGrant {
    pub granted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder_label: Option<String>,
}

/// Side-effect-free view of a workspace's lease
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockStatus {
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder_label: Option<String>,
}

/// Result of a server-side block recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveredBlocks {
    pub recovered_count: usize,
}

/// The backend collaborator the engine talks to.
///
/// Lease expiry and acquire/evict atomicity are the backend's job; the
/// engine never renews a lease and never holds a client-side mutex around
/// it. All document writes assume the caller holds the workspace lease.
#[async_trait]
pub trait WorkspaceBackend: Send + Sync {
    async fn lock_workspace(
        &self,
        workspace_id: Uuid,
        holder: &LockHolder,
        force: bool,
    ) -> Result<LockGrant, BackendError>;

    async fn check_workspace_lock(&self, workspace_id: Uuid) -> Result<LockStatus, BackendError>;

    /// Idempotent; releasing an absent or stolen lease is a no-op success
    async fn unlock_workspace(
        &self,
        workspace_id: Uuid,
        holder: &LockHolder,
    ) -> Result<(), BackendError>;

    async fn get_document(
        &self,
        workspace_id: Uuid,
        doc_id: Uuid,
    ) -> Result<Document, BackendError>;

    /// First durable persistence of a locally-authored document. Assigns
    /// the document id; steps are committed individually afterwards.
    async fn create_document(
        &self,
        workspace_id: Uuid,
        document: &Document,
    ) -> Result<Document, BackendError>;

    /// Title/status/password update for an already-persisted document
    async fn update_document(
        &self,
        workspace_id: Uuid,
        document: &Document,
    ) -> Result<Document, BackendError>;

    /// Flip to published, bump the version and append a snapshot
    async fn publish_document(
        &self,
        workspace_id: Uuid,
        doc_id: Uuid,
    ) -> Result<Document, BackendError>;

    /// Create a step, returning the server-assigned durable id
    async fn create_step(
        &self,
        workspace_id: Uuid,
        doc_id: Uuid,
        step: &Step,
    ) -> Result<String, BackendError>;

    async fn update_step(
        &self,
        workspace_id: Uuid,
        doc_id: Uuid,
        step: &Step,
    ) -> Result<(), BackendError>;

    async fn delete_step(
        &self,
        workspace_id: Uuid,
        doc_id: Uuid,
        step_id: &str,
    ) -> Result<(), BackendError>;

    /// Order-sensitive; must only ever be called with durable ids
    async fn reorder_steps(
        &self,
        workspace_id: Uuid,
        doc_id: Uuid,
        ordered_ids: &[String],
    ) -> Result<(), BackendError>;

    /// Historical snapshots, newest first
    async fn get_versions(
        &self,
        workspace_id: Uuid,
        doc_id: Uuid,
    ) -> Result<Vec<VersionSnapshot>, BackendError>;

    async fn rollback(
        &self,
        workspace_id: Uuid,
        doc_id: Uuid,
        version: i64,
    ) -> Result<Document, BackendError>;

    /// Merge URL-bearing image blocks from a snapshot back into the
    /// document. With no version, the newest recoverable snapshot is used.
    async fn recover_blocks(
        &self,
        workspace_id: Uuid,
        doc_id: Uuid,
        version: Option<i64>,
    ) -> Result<RecoveredBlocks, BackendError>;
}
