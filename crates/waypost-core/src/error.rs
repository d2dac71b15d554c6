use thiserror::Error;

/// Errors raised by local document mutations
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("step {0} not found")]
    StepNotFound(String),

    #[error("step index {0} out of bounds")]
    StepIndexOutOfBounds(usize),

    #[error("document title cannot be empty")]
    EmptyTitle,
}
