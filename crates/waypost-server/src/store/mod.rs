pub mod lease;

pub use lease::WorkspaceLock;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use waypost_core::{Document, DocumentStatus, Step, VersionSnapshot};
use waypost_engine::{
    BackendError, LockGrant, LockHolder, LockStatus, RecoveredBlocks, WorkspaceBackend,
};
use waypost_history::{RecoveryError, RecoveryReport};

#[derive(Default)]
struct WorkspaceState {
    lock: Option<WorkspaceLock>,
    document: Option<Document>,
    /// Newest first
    versions: Vec<VersionSnapshot>,
}

impl WorkspaceState {
    /// The current non-expired lease, if any
    fn live_lock(&self) -> Option<&WorkspaceLock> {
        self.lock.as_ref().filter(|l| !l.is_expired(Utc::now()))
    }

    fn document_mut(&mut self, doc_id: Uuid) -> Result<&mut Document, BackendError> {
        self.document
            .as_mut()
            .filter(|d| d.id == Some(doc_id))
            .ok_or_else(|| BackendError::NotFound(format!("document {doc_id}")))
    }
}

/// In-memory store of workspaces: edit leases, documents and their version
/// history. Acquire/evict run under one write lock, so lease handover is
/// atomic.
pub struct WorkspaceStore {
    workspaces: RwLock<HashMap<Uuid, WorkspaceState>>,
    lock_ttl: Duration,
}

impl WorkspaceStore {
    pub fn new(lock_ttl: Duration) -> Self {
        Self {
            workspaces: RwLock::new(HashMap::new()),
            lock_ttl,
        }
    }

    /// Run the image-block diagnosis over a document and its history
    pub async fn diagnose(
        &self,
        workspace_id: Uuid,
        doc_id: Uuid,
    ) -> Result<RecoveryReport, BackendError> {
        let workspaces = self.workspaces.read().await;
        let state = workspaces
            .get(&workspace_id)
            .ok_or_else(|| BackendError::NotFound(format!("workspace {workspace_id}")))?;
        let document = state
            .document
            .as_ref()
            .filter(|d| d.id == Some(doc_id))
            .ok_or_else(|| BackendError::NotFound(format!("document {doc_id}")))?;

        Ok(waypost_history::diagnose(document, &state.versions))
    }
}

#[async_trait]
impl WorkspaceBackend for WorkspaceStore {
    async fn lock_workspace(
        &self,
        workspace_id: Uuid,
        holder: &LockHolder,
        force: bool,
    ) -> Result<LockGrant, BackendError> {
        let mut workspaces = self.workspaces.write().await;
        let state = workspaces.entry(workspace_id).or_default();

        if let Some(current) = state.live_lock() {
            if !current.held_by(holder.id) && !force {
                return Ok(LockGrant {
                    granted: false,
                    holder_label: Some(current.holder_label.clone()),
                });
            }
            if !current.held_by(holder.id) {
                tracing::info!(
                    %workspace_id,
                    evicted = %current.holder_label,
                    new_holder = %holder.label,
                    "forced lease takeover"
                );
            }
        }

        state.lock = Some(WorkspaceLock::grant(workspace_id, holder, self.lock_ttl));
        Ok(LockGrant {
            granted: true,
            holder_label: Some(holder.label.clone()),
        })
    }

    async fn check_workspace_lock(&self, workspace_id: Uuid) -> Result<LockStatus, BackendError> {
        let workspaces = self.workspaces.read().await;
        let live = workspaces
            .get(&workspace_id)
            .and_then(WorkspaceState::live_lock);

        Ok(match live {
            Some(lock) => LockStatus {
                locked: true,
                holder_label: Some(lock.holder_label.clone()),
            },
            None => LockStatus {
                locked: false,
                holder_label: None,
            },
        })
    }

    async fn unlock_workspace(
        &self,
        workspace_id: Uuid,
        holder: &LockHolder,
    ) -> Result<(), BackendError> {
        let mut workspaces = self.workspaces.write().await;
        if let Some(state) = workspaces.get_mut(&workspace_id) {
            // Releasing an absent, expired or stolen lease is a no-op
            if state
                .lock
                .as_ref()
                .is_some_and(|l| l.held_by(holder.id))
            {
                state.lock = None;
            }
        }
        Ok(())
    }

    async fn get_document(
        &self,
        workspace_id: Uuid,
        doc_id: Uuid,
    ) -> Result<Document, BackendError> {
        let workspaces = self.workspaces.read().await;
        workspaces
            .get(&workspace_id)
            .and_then(|s| s.document.clone())
            .filter(|d| d.id == Some(doc_id))
            .ok_or_else(|| BackendError::NotFound(format!("document {doc_id}")))
    }

    async fn create_document(
        &self,
        workspace_id: Uuid,
        document: &Document,
    ) -> Result<Document, BackendError> {
        let mut workspaces = self.workspaces.write().await;
        let state = workspaces.entry(workspace_id).or_default();

        // Steps arrive through createStep; only the shell is stored here
        let mut stored = document.clone();
        stored.id = Some(Uuid::new_v4());
        stored.steps.clear();
        stored.version = 0;

        state.document = Some(stored.clone());
        tracing::debug!(%workspace_id, doc_id = ?stored.id, "document created");
        Ok(stored)
    }

    async fn update_document(
        &self,
        workspace_id: Uuid,
        document: &Document,
    ) -> Result<Document, BackendError> {
        let doc_id = document
            .id
            .ok_or_else(|| BackendError::Validation("document has no id".into()))?;

        let mut workspaces = self.workspaces.write().await;
        let state = workspaces
            .get_mut(&workspace_id)
            .ok_or_else(|| BackendError::NotFound(format!("workspace {workspace_id}")))?;
        let stored = state.document_mut(doc_id)?;

        stored.title = document.title.clone();
        stored.status = document.status;
        stored.access_password = document.access_password.clone();
        Ok(stored.clone())
    }

    async fn publish_document(
        &self,
        workspace_id: Uuid,
        doc_id: Uuid,
    ) -> Result<Document, BackendError> {
        let mut workspaces = self.workspaces.write().await;
        let state = workspaces
            .get_mut(&workspace_id)
            .ok_or_else(|| BackendError::NotFound(format!("workspace {workspace_id}")))?;
        let stored = state.document_mut(doc_id)?;

        stored.status = DocumentStatus::Published;
        stored.version += 1;
        let published = stored.clone();

        state
            .versions
            .insert(0, VersionSnapshot::new(published.version, published.clone()));
        tracing::debug!(%workspace_id, %doc_id, version = published.version, "document published");
        Ok(published)
    }

    async fn create_step(
        &self,
        workspace_id: Uuid,
        doc_id: Uuid,
        step: &Step,
    ) -> Result<String, BackendError> {
        let mut workspaces = self.workspaces.write().await;
        let state = workspaces
            .get_mut(&workspace_id)
            .ok_or_else(|| BackendError::NotFound(format!("workspace {workspace_id}")))?;
        let stored = state.document_mut(doc_id)?;

        let durable_id = Uuid::new_v4().to_string();
        let mut server_step = step.clone();
        server_step.mark_persisted(durable_id.clone());
        stored.steps.push(server_step);
        stored.renumber_steps();

        Ok(durable_id)
    }

    async fn update_step(
        &self,
        workspace_id: Uuid,
        doc_id: Uuid,
        step: &Step,
    ) -> Result<(), BackendError> {
        let mut workspaces = self.workspaces.write().await;
        let state = workspaces
            .get_mut(&workspace_id)
            .ok_or_else(|| BackendError::NotFound(format!("workspace {workspace_id}")))?;
        let stored = state.document_mut(doc_id)?;

        let server_step = stored
            .step_mut(&step.id)
            .ok_or_else(|| BackendError::NotFound(format!("step {}", step.id)))?;
        *server_step = step.clone();
        Ok(())
    }

    async fn delete_step(
        &self,
        workspace_id: Uuid,
        doc_id: Uuid,
        step_id: &str,
    ) -> Result<(), BackendError> {
        let mut workspaces = self.workspaces.write().await;
        let state = workspaces
            .get_mut(&workspace_id)
            .ok_or_else(|| BackendError::NotFound(format!("workspace {workspace_id}")))?;
        let stored = state.document_mut(doc_id)?;

        stored
            .remove_step(step_id)
            .map_err(|e| BackendError::NotFound(e.to_string()))?;
        Ok(())
    }

    async fn reorder_steps(
        &self,
        workspace_id: Uuid,
        doc_id: Uuid,
        ordered_ids: &[String],
    ) -> Result<(), BackendError> {
        let mut workspaces = self.workspaces.write().await;
        let state = workspaces
            .get_mut(&workspace_id)
            .ok_or_else(|| BackendError::NotFound(format!("workspace {workspace_id}")))?;
        let stored = state.document_mut(doc_id)?;

        // Ids not present in the document sink to the end without an error;
        // the endpoint trusts the caller to submit the full durable set.
        stored.steps.sort_by_key(|s| {
            ordered_ids
                .iter()
                .position(|id| *id == s.id)
                .unwrap_or(usize::MAX)
        });
        stored.renumber_steps();
        tracing::debug!(%workspace_id, %doc_id, count = ordered_ids.len(), "steps reordered");
        Ok(())
    }

    async fn get_versions(
        &self,
        workspace_id: Uuid,
        _doc_id: Uuid,
    ) -> Result<Vec<VersionSnapshot>, BackendError> {
        let workspaces = self.workspaces.read().await;
        Ok(workspaces
            .get(&workspace_id)
            .map(|s| s.versions.clone())
            .unwrap_or_default())
    }

    async fn rollback(
        &self,
        workspace_id: Uuid,
        doc_id: Uuid,
        version: i64,
    ) -> Result<Document, BackendError> {
        let mut workspaces = self.workspaces.write().await;
        let state = workspaces
            .get_mut(&workspace_id)
            .ok_or_else(|| BackendError::NotFound(format!("workspace {workspace_id}")))?;

        let snapshot = state
            .versions
            .iter()
            .find(|s| s.version == version)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("version {version}")))?;

        let stored = state.document_mut(doc_id)?;
        let next_version = stored.version + 1;
        *stored = snapshot.document;
        stored.id = Some(doc_id);
        stored.version = next_version;

        tracing::info!(%workspace_id, %doc_id, from = version, to = next_version, "document rolled back");
        Ok(stored.clone())
    }

    async fn recover_blocks(
        &self,
        workspace_id: Uuid,
        doc_id: Uuid,
        version: Option<i64>,
    ) -> Result<RecoveredBlocks, BackendError> {
        let mut workspaces = self.workspaces.write().await;
        let state = workspaces
            .get_mut(&workspace_id)
            .ok_or_else(|| BackendError::NotFound(format!("workspace {workspace_id}")))?;

        let document = state
            .document
            .as_ref()
            .filter(|d| d.id == Some(doc_id))
            .ok_or_else(|| BackendError::NotFound(format!("document {doc_id}")))?;

        let recovery = waypost_history::recover(document, &state.versions, version)
            .map_err(|e| match e {
                RecoveryError::VersionNotFound(_) => BackendError::NotFound(e.to_string()),
                RecoveryError::NothingToRecover => BackendError::Validation(e.to_string()),
            })?;

        tracing::info!(
            %workspace_id,
            %doc_id,
            recovered = recovery.recovered_count,
            from_version = recovery.source_version,
            "image blocks recovered from history"
        );

        state.document = Some(recovery.document);
        Ok(RecoveredBlocks {
            recovered_count: recovery.recovered_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypost_core::Block;

    fn store() -> WorkspaceStore {
        WorkspaceStore::new(Duration::seconds(300))
    }

    async fn seed_document(store: &WorkspaceStore, workspace: Uuid) -> Uuid {
        let created = store
            .create_document(workspace, &Document::new("Guide"))
            .await
            .unwrap();
        created.id.unwrap()
    }

    #[tokio::test]
    async fn test_lease_is_exclusive_until_forced() {
        let store = store();
        let workspace = Uuid::new_v4();
        let first = LockHolder::new("first");
        let second = LockHolder::new("second");

        assert!(store
            .lock_workspace(workspace, &first, false)
            .await
            .unwrap()
            .granted);

        let denied = store.lock_workspace(workspace, &second, false).await.unwrap();
        assert!(!denied.granted);
        assert_eq!(denied.holder_label.as_deref(), Some("first"));

        // force always wins and atomically replaces the holder
        let taken = store.lock_workspace(workspace, &second, true).await.unwrap();
        assert!(taken.granted);

        let status = store.check_workspace_lock(workspace).await.unwrap();
        assert_eq!(status.holder_label.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_expired_lease_is_treated_as_absent() {
        let store = WorkspaceStore::new(Duration::zero());
        let workspace = Uuid::new_v4();

        store
            .lock_workspace(workspace, &LockHolder::new("first"), false)
            .await
            .unwrap();

        // TTL zero: the lease is already past expires_at
        let status = store.check_workspace_lock(workspace).await.unwrap();
        assert!(!status.locked);

        let grant = store
            .lock_workspace(workspace, &LockHolder::new("second"), false)
            .await
            .unwrap();
        assert!(grant.granted);
    }

    #[tokio::test]
    async fn test_unlock_ignores_stale_and_stolen_leases() {
        let store = store();
        let workspace = Uuid::new_v4();
        let first = LockHolder::new("first");
        let second = LockHolder::new("second");

        // Unlocking a workspace with no lease is a no-op success
        store.unlock_workspace(workspace, &first).await.unwrap();

        store.lock_workspace(workspace, &first, false).await.unwrap();
        store.lock_workspace(workspace, &second, true).await.unwrap();

        // The evicted holder's release must not clear the new lease
        store.unlock_workspace(workspace, &first).await.unwrap();
        let status = store.check_workspace_lock(workspace).await.unwrap();
        assert_eq!(status.holder_label.as_deref(), Some("second"));

        store.unlock_workspace(workspace, &second).await.unwrap();
        assert!(!store.check_workspace_lock(workspace).await.unwrap().locked);
    }

    #[tokio::test]
    async fn test_create_step_assigns_durable_id() {
        let store = store();
        let workspace = Uuid::new_v4();
        let doc_id = seed_document(&store, workspace).await;

        let step = Step::new("Install");
        let durable = store.create_step(workspace, doc_id, &step).await.unwrap();
        assert_ne!(durable, step.id);

        let doc = store.get_document(workspace, doc_id).await.unwrap();
        assert_eq!(doc.steps.len(), 1);
        assert!(doc.steps[0].has_durable_id());
        assert_eq!(doc.steps[0].order, 0);
    }

    #[tokio::test]
    async fn test_reorder_applies_requested_order() {
        let store = store();
        let workspace = Uuid::new_v4();
        let doc_id = seed_document(&store, workspace).await;

        let a = store.create_step(workspace, doc_id, &Step::new("A")).await.unwrap();
        let b = store.create_step(workspace, doc_id, &Step::new("B")).await.unwrap();
        let c = store.create_step(workspace, doc_id, &Step::new("C")).await.unwrap();

        store
            .reorder_steps(workspace, doc_id, &[c.clone(), a.clone(), b.clone()])
            .await
            .unwrap();

        let doc = store.get_document(workspace, doc_id).await.unwrap();
        let titles: Vec<&str> = doc.steps.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["C", "A", "B"]);
        assert_eq!(
            doc.steps.iter().map(|s| s.order).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[tokio::test]
    async fn test_reorder_sinks_unknown_ids_silently() {
        let store = store();
        let workspace = Uuid::new_v4();
        let doc_id = seed_document(&store, workspace).await;

        let a = store.create_step(workspace, doc_id, &Step::new("A")).await.unwrap();
        let b = store.create_step(workspace, doc_id, &Step::new("B")).await.unwrap();

        // A temp id in the list is not an error; the unmatched step just
        // sinks to the end. This is exactly why the client gates reorders.
        store
            .reorder_steps(workspace, doc_id, &["temp-bogus".into(), b.clone(), a.clone()])
            .await
            .unwrap();

        let doc = store.get_document(workspace, doc_id).await.unwrap();
        let titles: Vec<&str> = doc.steps.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["B", "A"]);
    }

    #[tokio::test]
    async fn test_publish_appends_snapshots_newest_first() {
        let store = store();
        let workspace = Uuid::new_v4();
        let doc_id = seed_document(&store, workspace).await;

        store.publish_document(workspace, doc_id).await.unwrap();
        store.publish_document(workspace, doc_id).await.unwrap();

        let versions = store.get_versions(workspace, doc_id).await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version, 2);
        assert_eq!(versions[1].version, 1);
    }

    #[tokio::test]
    async fn test_rollback_restores_snapshot_content() {
        let store = store();
        let workspace = Uuid::new_v4();
        let doc_id = seed_document(&store, workspace).await;

        store.create_step(workspace, doc_id, &Step::new("Keep")).await.unwrap();
        store.publish_document(workspace, doc_id).await.unwrap();

        let mut renamed = store.get_document(workspace, doc_id).await.unwrap();
        renamed.title = "Renamed".into();
        store.update_document(workspace, &renamed).await.unwrap();
        store.publish_document(workspace, doc_id).await.unwrap();

        let restored = store.rollback(workspace, doc_id, 1).await.unwrap();
        assert_eq!(restored.title, "Guide");
        assert_eq!(restored.version, 3);
        assert_eq!(restored.steps.len(), 1);
    }

    #[tokio::test]
    async fn test_diagnose_and_recover_blocks() {
        let store = store();
        let workspace = Uuid::new_v4();
        let doc_id = seed_document(&store, workspace).await;

        let mut step = Step::new("Media");
        step.blocks.push(Block::image("https://x/a.png"));
        step.blocks.push(Block::image("https://x/b.png"));
        let durable = store.create_step(workspace, doc_id, &step).await.unwrap();
        store.publish_document(workspace, doc_id).await.unwrap();

        // A lossy save drops the images
        let mut bare = store.get_document(workspace, doc_id).await.unwrap();
        bare.step_mut(&durable).unwrap().blocks.clear();
        store
            .update_step(workspace, doc_id, bare.step(&durable).unwrap())
            .await
            .unwrap();

        let report = store.diagnose(workspace, doc_id).await.unwrap();
        assert!(report.can_recover);
        assert_eq!(report.total_image_blocks, 0);

        let recovered = store.recover_blocks(workspace, doc_id, None).await.unwrap();
        assert_eq!(recovered.recovered_count, 2);

        let doc = store.get_document(workspace, doc_id).await.unwrap();
        assert_eq!(doc.image_urls().len(), 2);

        // A second pass has nothing left to restore
        assert!(store.recover_blocks(workspace, doc_id, None).await.is_err());
    }
}
