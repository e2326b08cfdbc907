// ============================================================================
// Transactional Resources
// ============================================================================
//
// The single capability interface a facade delegates to. A session picks one
// implementation when it is configured:
//
// - CoordinatedResource: transactions owned by an external coordinator
// - ConnectionResource: transactions local to one connection
//
// ============================================================================

pub mod connection;
pub mod coordinated;

pub use connection::ConnectionResource;
pub use coordinated::CoordinatedResource;

use crate::core::{ResourceKind, ResourceStatus, Result};
use crate::transaction::Synchronization;
use std::sync::Arc;

/// Something that can run a transaction on a facade's behalf
///
/// Implementations are shared between every facade that joins the same
/// transaction, so all operations take `&self`.
pub trait TransactionalResource: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Status of the resource's current transaction
    ///
    /// # Errors
    /// Returns `ResourceUnavailable` when the resource can no longer be reached
    fn status(&self) -> Result<ResourceStatus>;

    /// Whether a transaction is already running, i.e. a `begin` would join
    fn is_active(&self) -> Result<bool> {
        Ok(self.status()?.is_in_flight())
    }

    fn begin(&self) -> Result<()>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;

    /// Doom the current transaction without ending it
    fn set_rollback_only(&self) -> Result<()>;

    fn register_synchronization(&self, synchronization: Arc<dyn Synchronization>) -> Result<()>;

    /// Timeout for the next transaction this resource begins
    fn set_timeout(&self, seconds: u32) -> Result<()>;
}

pub type SharedResource = Arc<dyn TransactionalResource>;
