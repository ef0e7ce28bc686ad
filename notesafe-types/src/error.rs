use thiserror::Error;

/// Result type for collaborator repository calls.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Errors surfaced by note, file, and preference backends.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
