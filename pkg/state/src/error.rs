/// Errors from the quota object store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Optimistic concurrency precondition failed.
    #[error("conflict writing {key}: expected resource version {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("storage backend error: {0}")]
    Backend(#[from] anyhow::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}
