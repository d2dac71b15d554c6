use std::sync::Arc;

use uuid::Uuid;

use waypost_core::Document;

use crate::backend::{BackendError, WorkspaceBackend};
use crate::error::EngineError;

/// Whether the reorder call was issued at the end of a sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReorderOutcome {
    Applied,
    /// Not an error: some steps still lack durable ids, so the reorder was
    /// skipped. Steps stay in server-assigned order until a later sync
    /// completes cleanly.
    Skipped { pending_steps: usize },
}

/// What one sync pass did
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub reorder: ReorderOutcome,
}

/// Reconciles the in-memory document against the authoritative store.
///
/// Guarantees: step commits are sequential and in document order; the
/// first failure aborts the remainder (already-committed steps and id
/// reconciliations stand, the next sync retries the rest); the reorder
/// endpoint never sees a temporary id.
pub struct SyncEngine {
    backend: Arc<dyn WorkspaceBackend>,
    workspace_id: Uuid,
}

impl SyncEngine {
    pub fn new(backend: Arc<dyn WorkspaceBackend>, workspace_id: Uuid) -> Self {
        Self {
            backend,
            workspace_id,
        }
    }

    /// Run one full sync pass, mutating `document` toward canonical state.
    ///
    /// 1. Normalize blocks and renumber step order before transmission.
    /// 2. Persist the document shell (create on first save, update after).
    /// 3. Delete server steps the local document no longer contains.
    /// 4. Commit steps sequentially: update persisted ones, create local
    ///    ones and swap in the server-assigned id on success.
    /// 5. Reorder only once every step has a durable id.
    /// 6. Re-fetch the canonical document and re-normalize, so optimistic
    ///    local state is never trusted as final truth.
    pub async fn sync(&self, document: &mut Document) -> Result<SyncReport, EngineError> {
        document.normalize();
        document.renumber_steps();

        let doc_id = self.commit_document(document).await?;
        let deleted = self.delete_removed_steps(document, doc_id).await?;
        let (created, updated) = self.commit_steps(document, doc_id).await?;
        let reorder = self.reorder_if_durable(document, doc_id).await?;

        let mut canonical = self.backend.get_document(self.workspace_id, doc_id).await?;
        canonical.normalize();
        *document = canonical;

        Ok(SyncReport {
            created,
            updated,
            deleted,
            reorder,
        })
    }

    async fn commit_document(&self, document: &mut Document) -> Result<Uuid, EngineError> {
        if document.id.is_none() {
            let created = self
                .backend
                .create_document(self.workspace_id, document)
                .await?;
            document.id = created.id;
            document.version = created.version;
        } else {
            let updated = self
                .backend
                .update_document(self.workspace_id, document)
                .await?;
            document.version = updated.version;
        }

        document.id.ok_or_else(|| {
            EngineError::Backend(BackendError::Validation(
                "backend did not assign a document id".into(),
            ))
        })
    }

    /// Delete durable steps that exist server-side but were removed locally,
    /// so the later reorder list matches the surviving set
    async fn delete_removed_steps(
        &self,
        document: &Document,
        doc_id: Uuid,
    ) -> Result<usize, EngineError> {
        let server_doc = self.backend.get_document(self.workspace_id, doc_id).await?;

        let mut deleted = 0;
        for server_step in &server_doc.steps {
            if document.step(&server_step.id).is_some() {
                continue;
            }
            self.backend
                .delete_step(self.workspace_id, doc_id, &server_step.id)
                .await
                .map_err(|source| EngineError::StepCommit {
                    step_id: server_step.id.clone(),
                    source,
                })?;
            deleted += 1;
        }
        Ok(deleted)
    }

    async fn commit_steps(
        &self,
        document: &mut Document,
        doc_id: Uuid,
    ) -> Result<(usize, usize), EngineError> {
        let mut created = 0;
        let mut updated = 0;

        // Sequential on purpose: the reorder endpoint is order-sensitive and
        // two in-flight creates for one logical step must not race into two
        // server records.
        for step in &mut document.steps {
            if step.is_persisted {
                self.backend
                    .update_step(self.workspace_id, doc_id, step)
                    .await
                    .map_err(|source| EngineError::StepCommit {
                        step_id: step.id.clone(),
                        source,
                    })?;
                updated += 1;
            } else {
                let durable_id = self
                    .backend
                    .create_step(self.workspace_id, doc_id, step)
                    .await
                    .map_err(|source| EngineError::StepCommit {
                        step_id: step.id.clone(),
                        source,
                    })?;
                step.mark_persisted(durable_id);
                created += 1;
            }
        }

        Ok((created, updated))
    }

    async fn reorder_if_durable(
        &self,
        document: &Document,
        doc_id: Uuid,
    ) -> Result<ReorderOutcome, EngineError> {
        let ordered_ids: Vec<String> = document
            .steps
            .iter()
            .filter(|s| s.has_durable_id())
            .map(|s| s.id.clone())
            .collect();

        // Submitting a temporary id would silently corrupt ordering, so the
        // reorder only goes out when every step has a durable id.
        let pending = document.steps.len() - ordered_ids.len();
        if pending > 0 {
            tracing::warn!(
                workspace_id = %self.workspace_id,
                %doc_id,
                pending,
                "skipping step reorder until every step has a durable id"
            );
            return Ok(ReorderOutcome::Skipped {
                pending_steps: pending,
            });
        }

        if !ordered_ids.is_empty() {
            self.backend
                .reorder_steps(self.workspace_id, doc_id, &ordered_ids)
                .await?;
        }
        Ok(ReorderOutcome::Applied)
    }
}
