use thiserror::Error;

pub type SecretStoreResult<T> = Result<T, SecretStoreError>;

#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error("keystore error: {0}")]
    Keystore(String),

    #[error("keystore task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
