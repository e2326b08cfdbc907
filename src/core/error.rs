use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Cannot {operation}: local transaction is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("Transactional resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Failed to begin transaction: {0}")]
    BeginFailed(String),

    #[error("Commit failed: {reason} (rolled back: {rolled_back})")]
    CommitFailed { reason: String, rolled_back: bool },

    #[error("Rollback failed: {0}")]
    RollbackFailed(String),

    #[error("Flush failed: {0}")]
    FlushFailed(String),

    #[error("Synchronization failed: {0}")]
    SynchronizationFailed(String),

    #[error("Session '{session}' already has an active transaction")]
    ConcurrentTransaction { session: String },

    #[error("Transaction timed out after {seconds}s")]
    Timeout { seconds: u32 },

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TransactionError {
    pub(crate) fn invalid_state(operation: &'static str, state: impl std::fmt::Display) -> Self {
        Self::InvalidState {
            operation,
            state: state.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransactionError>;

impl<T> From<std::sync::PoisonError<T>> for TransactionError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}
