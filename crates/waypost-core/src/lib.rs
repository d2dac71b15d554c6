pub mod block;
pub mod document;
pub mod error;
pub mod snapshot;

pub use block::{Block, BlockKind};
pub use document::{temp_step_id, Document, DocumentStatus, Step, TEMP_STEP_PREFIX};
pub use error::DocumentError;
pub use snapshot::VersionSnapshot;
