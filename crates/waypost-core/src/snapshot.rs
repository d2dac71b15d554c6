use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::Document;

/// An immutable historical copy of a document, appended by the backend on
/// every publish. Never mutated by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSnapshot {
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub document: Document,
}

impl VersionSnapshot {
    pub fn new(version: i64, document: Document) -> Self {
        Self {
            version,
            created_at: Utc::now(),
            document,
        }
    }
}
