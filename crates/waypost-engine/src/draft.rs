use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, TableDefinition};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use waypost_core::Document;

use crate::error::DraftError;

// Key: workspace id string, Value: JSON DraftSnapshot
const DRAFTS: TableDefinition<&str, &[u8]> = TableDefinition::new("drafts");

/// The most recent local mirror of an in-progress document.
///
/// This is the only local-storage contract the engine depends on: one entry
/// per workspace whose steps always carry a `blocks` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftSnapshot {
    pub workspace_id: Uuid,
    pub updated_at: DateTime<Utc>,
    pub data: Document,
}

/// Ephemeral per-workspace draft store backed by an embedded key-value
/// database, so an in-progress document survives reloads.
///
/// Never a source of truth once the document is durably persisted: the
/// entry is cleared when a brand-new document is confirmed created.
pub struct DraftCache {
    db: Database,
}

impl DraftCache {
    /// Open or create the draft store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DraftError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DraftError::Store(e.to_string()))?;
        }

        let db = Database::create(path).map_err(|e| DraftError::Store(e.to_string()))?;

        // Create the table up front so first load() does not fail
        let write_txn = db
            .begin_write()
            .map_err(|e| DraftError::Store(e.to_string()))?;
        write_txn
            .open_table(DRAFTS)
            .map_err(|e| DraftError::Store(e.to_string()))?;
        write_txn
            .commit()
            .map_err(|e| DraftError::Store(e.to_string()))?;

        Ok(Self { db })
    }

    /// Overwrite the workspace's draft entry with the current document.
    ///
    /// The stored copy is normalized (every step carries a `blocks` array,
    /// every block is structurally complete) and stripped of secrets.
    pub fn save(&self, workspace_id: Uuid, document: &Document) -> Result<(), DraftError> {
        let mut data = document.clone();
        data.access_password = None;
        data.normalize();

        let entry = DraftSnapshot {
            workspace_id,
            updated_at: Utc::now(),
            data,
        };
        let bytes = serde_json::to_vec(&entry)?;

        self.put(&workspace_id.to_string(), &bytes)
    }

    /// Load the last cached draft, normalizing defensively on the way out
    /// (partially-written or legacy entries may carry nulls).
    pub fn load(&self, workspace_id: Uuid) -> Result<Option<DraftSnapshot>, DraftError> {
        let Some(bytes) = self.get(&workspace_id.to_string())? else {
            return Ok(None);
        };

        let mut entry: DraftSnapshot = serde_json::from_slice(&bytes)?;
        entry.data.normalize();
        Ok(Some(entry))
    }

    /// Remove the workspace's draft entry. Called once a brand-new document
    /// is durably created so a stale draft cannot resurrect on next visit.
    pub fn clear(&self, workspace_id: Uuid) -> Result<(), DraftError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| DraftError::Store(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(DRAFTS)
                .map_err(|e| DraftError::Store(e.to_string()))?;
            table
                .remove(workspace_id.to_string().as_str())
                .map_err(|e| DraftError::Store(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| DraftError::Store(e.to_string()))?;
        Ok(())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), DraftError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| DraftError::Store(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(DRAFTS)
                .map_err(|e| DraftError::Store(e.to_string()))?;
            table
                .insert(key, value)
                .map_err(|e| DraftError::Store(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| DraftError::Store(e.to_string()))?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DraftError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| DraftError::Store(e.to_string()))?;
        let table = read_txn
            .open_table(DRAFTS)
            .map_err(|e| DraftError::Store(e.to_string()))?;
        let value = table
            .get(key)
            .map_err(|e| DraftError::Store(e.to_string()))?
            .map(|v| v.value().to_vec());
        Ok(value)
    }

    #[cfg(test)]
    pub(crate) fn put_raw(&self, workspace_id: Uuid, value: &[u8]) -> Result<(), DraftError> {
        self.put(&workspace_id.to_string(), value)
    }
}
