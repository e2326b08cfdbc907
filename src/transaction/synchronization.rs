// ============================================================================
// Transaction Synchronizations
// ============================================================================
//
// Callbacks registered against a transaction and fired by whichever resource
// completes it. A facade only relays registrations; it never fires them.
//
// ============================================================================

use crate::core::{CompletionStatus, Result};
use std::fmt;
use std::sync::Arc;

/// Completion callback attached to a transaction
///
/// `before_completion` runs before a commit is attempted and may veto it by
/// returning an error. `after_completion` runs once the transaction has
/// ended, for commits and rollbacks alike.
pub trait Synchronization: Send + Sync {
    fn before_completion(&self) -> Result<()> {
        Ok(())
    }

    fn after_completion(&self, status: CompletionStatus);
}

/// Ordered list of synchronizations for one transaction
#[derive(Clone, Default)]
pub struct SynchronizationRegistry {
    callbacks: Vec<Arc<dyn Synchronization>>,
}

impl SynchronizationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, synchronization: Arc<dyn Synchronization>) {
        self.callbacks.push(synchronization);
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Run every `before_completion` in registration order, stopping at the
    /// first veto.
    pub fn before_completion(&self) -> Result<()> {
        for callback in &self.callbacks {
            callback.before_completion()?;
        }
        Ok(())
    }

    /// Run every `after_completion` in registration order.
    pub fn after_completion(&self, status: CompletionStatus) {
        for callback in &self.callbacks {
            callback.after_completion(status);
        }
    }

    /// Detach the registered callbacks, leaving the registry empty.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

impl fmt::Debug for SynchronizationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynchronizationRegistry")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}
