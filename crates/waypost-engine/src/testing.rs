//! Scripted in-memory backend for engine tests: records calls and can
//! inject per-step create failures.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use waypost_core::{Document, DocumentStatus, Step, VersionSnapshot};

use crate::backend::{
    BackendError, LockGrant, LockHolder, LockStatus, RecoveredBlocks, WorkspaceBackend,
};

#[derive(Default)]
struct State {
    locks: HashMap<Uuid, (Uuid, String)>,
    documents: HashMap<Uuid, Document>,
    versions: HashMap<Uuid, Vec<VersionSnapshot>>,
    next_step_id: u64,
    fail_create: HashSet<String>,
    create_step_calls: usize,
    update_step_calls: usize,
    delete_step_calls: usize,
    reorder_log: Vec<Vec<String>>,
}

pub(crate) struct MockBackend {
    state: Mutex<State>,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    pub(crate) fn fail_create_for(&self, step_id: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_create
            .insert(step_id.to_string());
    }

    pub(crate) fn clear_failures(&self) {
        self.state.lock().unwrap().fail_create.clear();
    }

    pub(crate) fn create_step_calls(&self) -> usize {
        self.state.lock().unwrap().create_step_calls
    }

    pub(crate) fn update_step_calls(&self) -> usize {
        self.state.lock().unwrap().update_step_calls
    }

    pub(crate) fn delete_step_calls(&self) -> usize {
        self.state.lock().unwrap().delete_step_calls
    }

    pub(crate) fn reorder_calls(&self) -> usize {
        self.state.lock().unwrap().reorder_log.len()
    }

    pub(crate) fn server_document(&self, workspace_id: Uuid) -> Option<Document> {
        self.state.lock().unwrap().documents.get(&workspace_id).cloned()
    }
}

#[async_trait]
impl WorkspaceBackend for MockBackend {
    async fn lock_workspace(
        &self,
        workspace_id: Uuid,
        holder: &LockHolder,
        force: bool,
    ) -> Result<LockGrant, BackendError> {
        let mut state = self.state.lock().unwrap();
        match state.locks.get(&workspace_id) {
            Some((holder_id, label)) if *holder_id != holder.id && !force => Ok(LockGrant {
                granted: false,
                holder_label: Some(label.clone()),
            }),
            _ => {
                state
                    .locks
                    .insert(workspace_id, (holder.id, holder.label.clone()));
                Ok(LockGrant {
                    granted: true,
                    holder_label: Some(holder.label.clone()),
                })
            }
        }
    }

    async fn check_workspace_lock(&self, workspace_id: Uuid) -> Result<LockStatus, BackendError> {
        let state = self.state.lock().unwrap();
        Ok(match state.locks.get(&workspace_id) {
            Some((_, label)) => LockStatus {
                locked: true,
                holder_label: Some(label.clone()),
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
        let mut state = self.state.lock().unwrap();
        if let Some((holder_id, _)) = state.locks.get(&workspace_id) {
            if *holder_id == holder.id {
                state.locks.remove(&workspace_id);
            }
        }
        Ok(())
    }

    async fn get_document(
        &self,
        workspace_id: Uuid,
        doc_id: Uuid,
    ) -> Result<Document, BackendError> {
        let state = self.state.lock().unwrap();
        state
            .documents
            .get(&workspace_id)
            .filter(|d| d.id == Some(doc_id))
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("document {doc_id}")))
    }

    async fn create_document(
        &self,
        workspace_id: Uuid,
        document: &Document,
    ) -> Result<Document, BackendError> {
        let mut state = self.state.lock().unwrap();
        let mut stored = document.clone();
        stored.id = Some(Uuid::new_v4());
        stored.steps.clear();
        stored.version = 0;
        state.documents.insert(workspace_id, stored.clone());
        Ok(stored)
    }

    async fn update_document(
        &self,
        workspace_id: Uuid,
        document: &Document,
    ) -> Result<Document, BackendError> {
        let mut state = self.state.lock().unwrap();
        let stored = state
            .documents
            .get_mut(&workspace_id)
            .filter(|d| d.id == document.id)
            .ok_or_else(|| BackendError::NotFound("document".into()))?;
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
        let mut state = self.state.lock().unwrap();
        let stored = state
            .documents
            .get_mut(&workspace_id)
            .filter(|d| d.id == Some(doc_id))
            .ok_or_else(|| BackendError::NotFound("document".into()))?;
        stored.status = DocumentStatus::Published;
        stored.version += 1;
        let snapshot = VersionSnapshot::new(stored.version, stored.clone());
        let published = stored.clone();
        state
            .versions
            .entry(workspace_id)
            .or_default()
            .insert(0, snapshot);
        Ok(published)
    }

    async fn create_step(
        &self,
        workspace_id: Uuid,
        doc_id: Uuid,
        step: &Step,
    ) -> Result<String, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.create_step_calls += 1;
        if state.fail_create.contains(&step.id) {
            return Err(BackendError::Network("injected create failure".into()));
        }
        state.next_step_id += 1;
        let durable_id = format!("step-{}", state.next_step_id);

        let stored = state
            .documents
            .get_mut(&workspace_id)
            .filter(|d| d.id == Some(doc_id))
            .ok_or_else(|| BackendError::NotFound("document".into()))?;
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
        let mut state = self.state.lock().unwrap();
        state.update_step_calls += 1;
        let stored = state
            .documents
            .get_mut(&workspace_id)
            .filter(|d| d.id == Some(doc_id))
            .ok_or_else(|| BackendError::NotFound("document".into()))?;
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
        let mut state = self.state.lock().unwrap();
        state.delete_step_calls += 1;
        let stored = state
            .documents
            .get_mut(&workspace_id)
            .filter(|d| d.id == Some(doc_id))
            .ok_or_else(|| BackendError::NotFound("document".into()))?;
        stored
            .remove_step(step_id)
            .map_err(|e| BackendError::NotFound(e.to_string()))?;
        Ok(())
    }

    async fn reorder_steps(
        &self,
        workspace_id: Uuid,
        _doc_id: Uuid,
        ordered_ids: &[String],
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        state.reorder_log.push(ordered_ids.to_vec());

        if let Some(stored) = state.documents.get_mut(&workspace_id) {
            stored.steps.sort_by_key(|s| {
                ordered_ids
                    .iter()
                    .position(|id| *id == s.id)
                    .unwrap_or(usize::MAX)
            });
            stored.renumber_steps();
        }
        Ok(())
    }

    async fn get_versions(
        &self,
        workspace_id: Uuid,
        _doc_id: Uuid,
    ) -> Result<Vec<VersionSnapshot>, BackendError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .versions
            .get(&workspace_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn rollback(
        &self,
        workspace_id: Uuid,
        doc_id: Uuid,
        version: i64,
    ) -> Result<Document, BackendError> {
        let mut state = self.state.lock().unwrap();
        let snapshot = state
            .versions
            .get(&workspace_id)
            .and_then(|v| v.iter().find(|s| s.version == version))
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("version {version}")))?;

        let stored = state
            .documents
            .get_mut(&workspace_id)
            .filter(|d| d.id == Some(doc_id))
            .ok_or_else(|| BackendError::NotFound("document".into()))?;
        let next_version = stored.version + 1;
        *stored = snapshot.document;
        stored.id = Some(doc_id);
        stored.version = next_version;
        Ok(stored.clone())
    }

    async fn recover_blocks(
        &self,
        workspace_id: Uuid,
        doc_id: Uuid,
        version: Option<i64>,
    ) -> Result<RecoveredBlocks, BackendError> {
        let mut state = self.state.lock().unwrap();
        let document = state
            .documents
            .get(&workspace_id)
            .filter(|d| d.id == Some(doc_id))
            .cloned()
            .ok_or_else(|| BackendError::NotFound("document".into()))?;
        let history = state
            .versions
            .get(&workspace_id)
            .cloned()
            .unwrap_or_default();

        let recovery = waypost_history::recover(&document, &history, version)
            .map_err(|e| BackendError::Validation(e.to_string()))?;

        state.documents.insert(workspace_id, recovery.document);
        Ok(RecoveredBlocks {
            recovered_count: recovery.recovered_count,
        })
    }
}
