use thiserror::Error;

use crate::backend::BackendError;

/// Errors raised by the draft cache
#[derive(Debug, Error)]
pub enum DraftError {
    #[error("draft store error: {0}")]
    Store(String),

    #[error("draft serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Engine error taxonomy.
///
/// Lock and step-commit failures propagate to the caller for user
/// notification. A skipped reorder is not an error (it is logged and
/// reported in the [`crate::SyncReport`]); lease-release failures are
/// swallowed by [`crate::LockCoordinator::release`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// Another holder owns the workspace lease; recoverable via forced
    /// takeover
    #[error("workspace is being edited by {holder_label}")]
    LockConflict { holder_label: String },

    /// A mutating call was attempted without an active lease
    #[error("no edit lease held for this workspace")]
    LockNotHeld,

    /// A step create/update/delete failed; the remaining commits of this
    /// sync were aborted. Prior commits and id reconciliations stand.
    #[error("step commit failed for step {step_id}")]
    StepCommit {
        step_id: String,
        #[source]
        source: BackendError,
    },

    #[error("publish failed")]
    Publish(#[source] BackendError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Draft(#[from] DraftError),

    #[error(transparent)]
    Recovery(#[from] waypost_history::RecoveryError),
}
