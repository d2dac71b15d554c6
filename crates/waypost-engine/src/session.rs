use std::sync::Arc;

use uuid::Uuid;

use waypost_core::{Document, VersionSnapshot};
use waypost_history::{adjacent_diffs, RecoveryReport, VersionDelta};

use crate::backend::{BackendError, LockHolder, LockStatus, WorkspaceBackend};
use crate::draft::{DraftCache, DraftSnapshot};
use crate::error::EngineError;
use crate::lock::LockCoordinator;
use crate::sync::{SyncEngine, SyncReport};

/// A scoped editing session over one workspace.
///
/// Opening the session acquires the workspace's exclusive edit lease;
/// closing it releases the lease. Creation and disposal are under the
/// caller's control rather than tied to any UI lifecycle. Mutating
/// operations fail with [`EngineError::LockNotHeld`] after close; reads
/// (history, diagnosis, lock checks) stay available.
pub struct EditSession {
    backend: Arc<dyn WorkspaceBackend>,
    lock: LockCoordinator,
    sync: SyncEngine,
    drafts: Arc<DraftCache>,
    workspace_id: Uuid,
    closed: bool,
}

impl std::fmt::Debug for EditSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditSession")
            .field("workspace_id", &self.workspace_id)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl EditSession {
    /// Acquire the lease and open a session.
    ///
    /// When another holder is present and `force` is false, fails with
    /// [`EngineError::LockConflict`] carrying their label so the caller can
    /// offer an "enter anyway" takeover; retrying with `force` evicts them.
    pub async fn open(
        backend: Arc<dyn WorkspaceBackend>,
        drafts: Arc<DraftCache>,
        workspace_id: Uuid,
        holder: LockHolder,
        force: bool,
    ) -> Result<Self, EngineError> {
        let lock = LockCoordinator::new(backend.clone(), holder);
        let grant = lock.acquire(workspace_id, force).await?;
        if !grant.granted {
            return Err(EngineError::LockConflict {
                holder_label: grant
                    .holder_label
                    .unwrap_or_else(|| "another user".to_string()),
            });
        }

        Ok(Self {
            sync: SyncEngine::new(backend.clone(), workspace_id),
            backend,
            lock,
            drafts,
            workspace_id,
            closed: false,
        })
    }

    /// Peek at a workspace's lease without touching it, to decide whether
    /// to show a takeover prompt before navigating into the editor
    pub async fn check_lock(
        backend: &Arc<dyn WorkspaceBackend>,
        workspace_id: Uuid,
    ) -> Result<LockStatus, EngineError> {
        Ok(backend.check_workspace_lock(workspace_id).await?)
    }

    pub fn workspace_id(&self) -> Uuid {
        self.workspace_id
    }

    pub fn holder(&self) -> &LockHolder {
        self.lock.holder()
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.closed {
            return Err(EngineError::LockNotHeld);
        }
        Ok(())
    }

    /// Mirror a local edit into the draft cache so it survives a reload
    pub fn checkpoint(&self, document: &Document) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.drafts.save(self.workspace_id, document)?;
        Ok(())
    }

    /// The last locally cached draft, if any
    pub fn restore_draft(&self) -> Result<Option<DraftSnapshot>, EngineError> {
        Ok(self.drafts.load(self.workspace_id)?)
    }

    /// Run the full sync pipeline. Once a brand-new document is durably
    /// created, the workspace's draft entry is cleared so a stale draft
    /// cannot resurrect on the next visit.
    pub async fn save(&self, document: &mut Document) -> Result<SyncReport, EngineError> {
        self.ensure_open()?;
        let was_new = !document.is_persisted();
        let report = self.sync.sync(document).await?;
        if was_new && document.is_persisted() {
            self.drafts.clear(self.workspace_id)?;
        }
        Ok(report)
    }

    /// Save, then ask the backend to publish (status flip, version bump,
    /// snapshot append). Publish failures surface as
    /// [`EngineError::Publish`]; the in-memory document is untouched by a
    /// failure and the draft cache still holds the attempted state.
    pub async fn publish(&self, document: &mut Document) -> Result<SyncReport, EngineError> {
        self.ensure_open()?;
        let was_new = !document.is_persisted();
        let report = self.sync.sync(document).await?;

        let doc_id = require_id(document)?;
        let mut published = self
            .backend
            .publish_document(self.workspace_id, doc_id)
            .await
            .map_err(EngineError::Publish)?;
        published.normalize();
        *document = published;

        if was_new {
            self.drafts.clear(self.workspace_id)?;
        }
        Ok(report)
    }

    /// Historical snapshots, newest first
    pub async fn versions(&self, doc_id: Uuid) -> Result<Vec<VersionSnapshot>, EngineError> {
        Ok(self.backend.get_versions(self.workspace_id, doc_id).await?)
    }

    /// Change summaries between adjacent snapshots, newest first
    pub async fn history(&self, doc_id: Uuid) -> Result<Vec<VersionDelta>, EngineError> {
        let versions = self.backend.get_versions(self.workspace_id, doc_id).await?;
        Ok(adjacent_diffs(&versions))
    }

    /// Restore the document to a historical version
    pub async fn rollback(&self, doc_id: Uuid, version: i64) -> Result<Document, EngineError> {
        self.ensure_open()?;
        let mut document = self
            .backend
            .rollback(self.workspace_id, doc_id, version)
            .await?;
        document.normalize();
        Ok(document)
    }

    /// Scan current state and history for silently-dropped image blocks.
    /// Always returns a report, even when nothing is recoverable.
    pub async fn diagnose(&self, doc_id: Uuid) -> Result<RecoveryReport, EngineError> {
        let document = self.backend.get_document(self.workspace_id, doc_id).await?;
        let history = self.backend.get_versions(self.workspace_id, doc_id).await?;
        Ok(waypost_history::diagnose(&document, &history))
    }

    /// Restore dropped image blocks from history, then re-fetch the
    /// canonical document
    pub async fn recover(
        &self,
        doc_id: Uuid,
        version: Option<i64>,
    ) -> Result<(Document, usize), EngineError> {
        self.ensure_open()?;
        let recovered = self
            .backend
            .recover_blocks(self.workspace_id, doc_id, version)
            .await?;

        let mut document = self.backend.get_document(self.workspace_id, doc_id).await?;
        document.normalize();
        Ok((document, recovered.recovered_count))
    }

    /// Release the lease and end the session. Idempotent; release failures
    /// are swallowed and the backend's TTL reclaims the lease eventually.
    /// Mutating calls on the handle fail with
    /// [`EngineError::LockNotHeld`] afterwards.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.lock.release(self.workspace_id).await;
    }
}

impl Drop for EditSession {
    fn drop(&mut self) {
        if !self.closed {
            // No async release possible here; the server-side TTL reclaims
            // the lease.
            tracing::warn!(
                workspace_id = %self.workspace_id,
                "edit session dropped without close(); lease left to expire"
            );
        }
    }
}

fn require_id(document: &Document) -> Result<Uuid, EngineError> {
    document.id.ok_or_else(|| {
        EngineError::Backend(BackendError::Validation(
            "document has no server-assigned id".into(),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBackend;
    use tempfile::TempDir;
    use waypost_core::{Block, DocumentStatus, Step};

    struct Fixture {
        backend: Arc<MockBackend>,
        drafts: Arc<DraftCache>,
        workspace: Uuid,
        _tmp: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            Self {
                backend: Arc::new(MockBackend::new()),
                drafts: Arc::new(DraftCache::open(tmp.path().join("drafts.redb")).unwrap()),
                workspace: Uuid::new_v4(),
                _tmp: tmp,
            }
        }

        async fn open(&self, label: &str, force: bool) -> Result<EditSession, EngineError> {
            let backend: Arc<dyn WorkspaceBackend> = self.backend.clone();
            EditSession::open(
                backend,
                self.drafts.clone(),
                self.workspace,
                LockHolder::new(label),
                force,
            )
            .await
        }
    }

    fn guide_with_steps(titles: &[&str]) -> Document {
        let mut doc = Document::new("Guide");
        for title in titles {
            doc.push_step(Step::new(*title));
        }
        doc
    }

    #[tokio::test]
    async fn test_open_conflict_surfaces_holder_label() {
        let fx = Fixture::new();
        let _first = fx.open("first", false).await.unwrap();

        let err = fx.open("second", false).await.unwrap_err();
        match err {
            EngineError::LockConflict { holder_label } => assert_eq!(holder_label, "first"),
            other => panic!("expected LockConflict, got {other:?}"),
        }

        // Forced takeover models "enter anyway" after the warning
        let second = fx.open("second", true).await.unwrap();
        let status = second.lock.check(fx.workspace).await.unwrap();
        assert_eq!(status.holder_label.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_save_clears_draft_once_document_created() {
        let fx = Fixture::new();
        let session = fx.open("author", false).await.unwrap();

        let mut doc = guide_with_steps(&["One"]);
        session.checkpoint(&doc).unwrap();
        assert!(session.restore_draft().unwrap().is_some());

        session.save(&mut doc).await.unwrap();
        assert!(doc.is_persisted());
        // The draft entry is gone so a stale draft cannot resurrect
        assert!(session.restore_draft().unwrap().is_none());

        // Subsequent saves of the persisted document leave later drafts alone
        doc.push_step(Step::new("Two"));
        session.checkpoint(&doc).unwrap();
        session.save(&mut doc).await.unwrap();
        assert!(session.restore_draft().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_save_keeps_draft() {
        let fx = Fixture::new();
        let session = fx.open("author", false).await.unwrap();

        let mut doc = guide_with_steps(&["One"]);
        let temp_id = doc.steps[0].id.clone();
        session.checkpoint(&doc).unwrap();
        fx.backend.fail_create_for(&temp_id);

        assert!(session.save(&mut doc).await.is_err());
        // The attempted state is still recoverable locally
        let draft = session.restore_draft().unwrap().unwrap();
        assert_eq!(draft.data.steps.len(), 1);
    }

    #[tokio::test]
    async fn test_closed_session_rejects_mutations() {
        let fx = Fixture::new();
        let mut session = fx.open("author", false).await.unwrap();

        let mut doc = guide_with_steps(&["One"]);
        session.save(&mut doc).await.unwrap();

        let backend: Arc<dyn WorkspaceBackend> = fx.backend.clone();
        session.close().await;
        // close is idempotent
        session.close().await;

        let status = EditSession::check_lock(&backend, fx.workspace).await.unwrap();
        assert!(!status.locked);

        // A stale handle must not write without a lease
        assert!(matches!(
            session.save(&mut doc).await,
            Err(EngineError::LockNotHeld)
        ));
        assert!(matches!(
            session.checkpoint(&doc),
            Err(EngineError::LockNotHeld)
        ));
        // Reads stay available
        assert!(session.restore_draft().is_ok());
    }

    #[tokio::test]
    async fn test_publish_bumps_version_and_snapshots() {
        let fx = Fixture::new();
        let session = fx.open("author", false).await.unwrap();

        let mut doc = guide_with_steps(&["One"]);
        session.publish(&mut doc).await.unwrap();

        assert_eq!(doc.status, DocumentStatus::Published);
        assert_eq!(doc.version, 1);

        let doc_id = doc.id.unwrap();
        let versions = session.versions(doc_id).await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, 1);
    }

    #[tokio::test]
    async fn test_history_summarizes_adjacent_versions() {
        let fx = Fixture::new();
        let session = fx.open("author", false).await.unwrap();

        let mut doc = guide_with_steps(&["One"]);
        session.publish(&mut doc).await.unwrap();

        doc.push_step(Step::new("Two"));
        session.publish(&mut doc).await.unwrap();
        let doc_id = doc.id.unwrap();

        let deltas = session.history(doc_id).await.unwrap();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].version, 2);
        // one size delta + one new id
        assert_eq!(deltas[0].summary.steps_changed, 2);
    }

    #[tokio::test]
    async fn test_diagnose_and_recover_dropped_images() {
        let fx = Fixture::new();
        let session = fx.open("author", false).await.unwrap();

        // Publish a version with two image blocks
        let mut doc = guide_with_steps(&["Media"]);
        doc.steps[0].blocks.push(Block::image("https://x/a.png"));
        doc.steps[0].blocks.push(Block::image("https://x/b.png"));
        session.publish(&mut doc).await.unwrap();
        let doc_id = doc.id.unwrap();

        // A lossy save drops both image blocks
        doc.steps[0].blocks.clear();
        session.save(&mut doc).await.unwrap();

        let report = session.diagnose(doc_id).await.unwrap();
        assert!(!report.has_image_blocks);
        assert!(report.can_recover);
        assert_eq!(report.version_details.len(), 1);

        let (recovered_doc, count) = session.recover(doc_id, None).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(recovered_doc.image_urls().len(), 2);
    }

    #[tokio::test]
    async fn test_recover_with_nothing_to_restore_is_an_error_not_a_crash() {
        let fx = Fixture::new();
        let session = fx.open("author", false).await.unwrap();

        let mut doc = guide_with_steps(&["One"]);
        session.publish(&mut doc).await.unwrap();
        let doc_id = doc.id.unwrap();

        let report = session.diagnose(doc_id).await.unwrap();
        assert!(!report.can_recover);
        assert!(session.recover(doc_id, None).await.is_err());
    }

    #[tokio::test]
    async fn test_rollback_restores_previous_content() {
        let fx = Fixture::new();
        let session = fx.open("author", false).await.unwrap();

        let mut doc = guide_with_steps(&["One"]);
        session.publish(&mut doc).await.unwrap();
        let doc_id = doc.id.unwrap();

        doc.title = "Renamed".into();
        session.publish(&mut doc).await.unwrap();

        let restored = session.rollback(doc_id, 1).await.unwrap();
        assert_eq!(restored.title, "Guide");
    }
}
