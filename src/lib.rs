// ============================================================================
// localtx Library
// ============================================================================
//
// Local transaction facade: begin/commit/rollback for a session's unit of
// work, independent of whether a coordinator or a single connection runs
// the underlying transaction.
//
// ============================================================================

pub mod connection;
pub mod core;
pub mod facade;
pub mod resource;
pub mod session;
pub mod transaction;

// Re-export main types for convenience
pub use connection::Connection;
pub use self::core::{
    CompletionStatus, FacadeId, FlushMode, LocalState, Ownership, ResourceKind, ResourceStatus,
    Result, TransactionError,
};
pub use facade::LocalTransaction;
pub use resource::{ConnectionResource, CoordinatedResource, SharedResource, TransactionalResource};
pub use session::{
    Flusher, PendingChange, RecordingFlusher, Session, SessionBuilder, SessionConfig,
    SessionContext,
};
pub use transaction::{
    Synchronization, SynchronizationRegistry, TransactionCoordinator, TransactionId,
    TransactionInfo,
};
