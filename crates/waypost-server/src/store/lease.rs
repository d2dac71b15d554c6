use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use waypost_engine::LockHolder;

/// A time-bounded exclusivity grant over a workspace's edit session.
///
/// At most one non-expired lease exists per workspace. A lease past
/// `expires_at` is treated as absent everywhere; no client renews it.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceLock {
    pub workspace_id: Uuid,
    pub holder_id: Uuid,
    pub holder_label: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl WorkspaceLock {
    /// Grant (or re-grant) a lease to the holder, stamping fresh timestamps
    pub fn grant(workspace_id: Uuid, holder: &LockHolder, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            workspace_id,
            holder_id: holder.id,
            holder_label: holder.label.clone(),
            acquired_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn held_by(&self, holder_id: Uuid) -> bool {
        self.holder_id == holder_id
    }
}
