pub mod diff;
pub mod recovery;

pub use diff::{adjacent_diffs, diff, diff_documents, DiffSummary, VersionDelta};
pub use recovery::{diagnose, recover, Recovery, RecoveryError, RecoveryReport, VersionDetail};
