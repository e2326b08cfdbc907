// ============================================================================
// Transaction Coordination Module
// ============================================================================
//
// The coordinator side of the facade: global transactions with deadlines
// and rollback-only marking, and the synchronization callbacks that the
// completing resource fires.
//
// ============================================================================

pub mod coordinator;
pub mod state;
pub mod synchronization;

pub use coordinator::{TransactionCoordinator, TransactionInfo};
pub use state::{GlobalTransaction, TransactionId};
pub use synchronization::{Synchronization, SynchronizationRegistry};
