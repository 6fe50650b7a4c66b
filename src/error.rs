//! Error type for the progression engine

/// Result type for progression operations
pub type Result<T> = std::result::Result<T, ProgressError>;

/// Errors surfaced by the progression engine and its store
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    /// Rejected before any write (bad amount, bad date, unknown enum label)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Another writer committed the user's progress first; retry the whole event
    #[error("Concurrent update of progress for user {user_id} (expected version {expected}, found {found})")]
    ConcurrencyConflict {
        user_id: String,
        expected: u64,
        found: u64,
    },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl ProgressError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether the caller should rerun the event from the top
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

impl From<rusqlite::Error> for ProgressError {
    fn from(err: rusqlite::Error) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}
