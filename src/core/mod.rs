pub mod error;
pub mod types;

pub use error::{Result, TransactionError};
pub use types::{
    CompletionStatus, FacadeId, FlushMode, LocalState, Ownership, ResourceKind, ResourceStatus,
};
