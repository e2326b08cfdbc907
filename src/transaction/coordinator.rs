// ============================================================================
// Transaction Coordinator
// ============================================================================
//
// In-memory stand-in for a distributed-transaction coordinator. It owns at
// most one current transaction, which is the "ambient" transaction that
// facades either start or join. The coordinator itself is passed around
// explicitly; there is no thread-local or process-wide association.
//
// ============================================================================

use super::{GlobalTransaction, Synchronization, SynchronizationRegistry, TransactionId};
use crate::core::{CompletionStatus, ResourceStatus, Result, TransactionError};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{Level, event};

#[derive(Debug, Default)]
struct CoordinatorState {
    next_id: u64,
    current: Option<GlobalTransaction>,
    // Consumed by the next begin()
    pending_timeout: Option<u32>,
    shut_down: bool,
    completed: u64,
}

#[derive(Debug)]
pub struct TransactionCoordinator {
    name: String,
    state: Mutex<CoordinatorState>,
}

impl TransactionCoordinator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(CoordinatorState {
                next_id: 1,
                ..CoordinatorState::default()
            }),
        }
    }

    pub fn shared(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(name))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> Result<MutexGuard<'_, CoordinatorState>> {
        Ok(self.state.lock()?)
    }

    fn lock_available(&self) -> Result<MutexGuard<'_, CoordinatorState>> {
        let state = self.lock()?;
        if state.shut_down {
            return Err(TransactionError::ResourceUnavailable(format!(
                "coordinator '{}' is shut down",
                self.name
            )));
        }
        Ok(state)
    }

    /// Status of the current transaction. An expired transaction can only
    /// roll back and reports `MarkedRollback`.
    pub fn status(&self) -> Result<ResourceStatus> {
        let state = self.lock_available()?;
        Ok(match &state.current {
            None => ResourceStatus::NoTransaction,
            Some(txn) if txn.is_expired() => ResourceStatus::MarkedRollback,
            Some(txn) => txn.status(),
        })
    }

    /// Timeout applied to the next transaction this coordinator begins.
    /// Zero restores the default of no timeout.
    pub fn set_transaction_timeout(&self, seconds: u32) -> Result<()> {
        let mut state = self.lock_available()?;
        state.pending_timeout = (seconds > 0).then_some(seconds);
        Ok(())
    }

    pub fn begin(&self) -> Result<TransactionId> {
        let mut state = self.lock_available()?;
        if let Some(current) = &state.current {
            return Err(TransactionError::BeginFailed(format!(
                "coordinator '{}' already has transaction {}",
                self.name,
                current.id()
            )));
        }

        let id = TransactionId(state.next_id);
        state.next_id += 1;
        let timeout = state.pending_timeout.take();
        state.current = Some(GlobalTransaction::new(id, timeout));

        event!(Level::DEBUG, coordinator = %self.name, transaction = %id, timeout = ?timeout, "global transaction started");
        Ok(id)
    }

    pub fn commit(&self) -> Result<()> {
        let (id, callbacks) = {
            let mut state = self.lock_available()?;
            let current = state.current.as_mut().ok_or_else(|| self.no_transaction())?;
            let id = current.id();

            if current.is_expired() {
                let seconds = current.timeout_seconds().unwrap_or_default();
                let callbacks = current.complete_rollback()?;
                state.current = None;
                state.completed += 1;
                drop(state);

                event!(Level::WARN, coordinator = %self.name, transaction = %id, seconds, "transaction expired before commit");
                callbacks.after_completion(CompletionStatus::RolledBack);
                return Err(TransactionError::Timeout { seconds });
            }

            if current.status() == ResourceStatus::MarkedRollback {
                return Err(TransactionError::CommitFailed {
                    reason: format!("transaction {id} is marked rollback-only"),
                    rolled_back: false,
                });
            }

            (id, current.synchronizations().clone())
        };

        // Callbacks run without the lock held so they may query the coordinator.
        if let Err(err) = callbacks.before_completion() {
            let mut state = self.lock()?;
            if let Some(current) = state.current.as_mut().filter(|txn| txn.id() == id) {
                current.mark_rollback_only()?;
            }
            event!(Level::WARN, coordinator = %self.name, transaction = %id, error = %err, "before-completion veto");
            return Err(TransactionError::CommitFailed {
                reason: err.to_string(),
                rolled_back: false,
            });
        }

        let callbacks = {
            let mut state = self.lock()?;
            let mut current = state
                .current
                .take_if(|txn| txn.id() == id)
                .ok_or_else(|| self.no_transaction())?;
            let callbacks = current.complete_commit()?;
            state.completed += 1;
            callbacks
        };

        event!(Level::DEBUG, coordinator = %self.name, transaction = %id, "global transaction committed");
        callbacks.after_completion(CompletionStatus::Committed);
        Ok(())
    }

    pub fn rollback(&self) -> Result<()> {
        self.end_with_rollback("rollback requested")
    }

    /// Abort the current transaction on behalf of an outside party, such as
    /// an administrator or a timeout reaper.
    pub fn force_rollback(&self, reason: &str) -> Result<()> {
        event!(Level::WARN, coordinator = %self.name, reason, "forcing rollback");
        self.end_with_rollback(reason)
    }

    fn end_with_rollback(&self, reason: &str) -> Result<()> {
        let (id, callbacks) = {
            let mut state = self.lock_available()?;
            let mut current = state.current.take().ok_or_else(|| {
                TransactionError::RollbackFailed(format!(
                    "no transaction is associated with coordinator '{}'",
                    self.name
                ))
            })?;
            let id = current.id();
            let callbacks: SynchronizationRegistry = current.complete_rollback()?;
            state.completed += 1;
            (id, callbacks)
        };

        event!(Level::DEBUG, coordinator = %self.name, transaction = %id, reason, "global transaction rolled back");
        callbacks.after_completion(CompletionStatus::RolledBack);
        Ok(())
    }

    pub fn set_rollback_only(&self) -> Result<()> {
        let mut state = self.lock_available()?;
        let current = state.current.as_mut().ok_or_else(|| {
            TransactionError::RollbackFailed(format!(
                "no transaction is associated with coordinator '{}'",
                self.name
            ))
        })?;
        current.mark_rollback_only()
    }

    pub fn register_synchronization(&self, synchronization: Arc<dyn Synchronization>) -> Result<()> {
        let mut state = self.lock_available()?;
        let current = state.current.as_mut().ok_or_else(|| {
            TransactionError::SynchronizationFailed(format!(
                "no transaction is associated with coordinator '{}'",
                self.name
            ))
        })?;
        current.register_synchronization(synchronization)
    }

    /// Refuse all work until `restart` is called.
    pub fn shutdown(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.shut_down = true;
        Ok(())
    }

    pub fn restart(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.shut_down = false;
        Ok(())
    }

    pub fn transaction_info(&self) -> Result<Option<TransactionInfo>> {
        let state = self.lock()?;
        Ok(state.current.as_ref().map(|txn| TransactionInfo {
            id: txn.id(),
            status: txn.status(),
            timeout_seconds: txn.timeout_seconds(),
            started_at: txn.started_at(),
            synchronization_count: txn.synchronizations().len(),
        }))
    }

    /// Number of transactions that reached commit or rollback.
    pub fn completed_count(&self) -> Result<u64> {
        Ok(self.lock()?.completed)
    }

    fn no_transaction(&self) -> TransactionError {
        TransactionError::ResourceUnavailable(format!(
            "no transaction is associated with coordinator '{}'",
            self.name
        ))
    }
}

/// Snapshot of the coordinator's current transaction
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionInfo {
    pub id: TransactionId,
    pub status: ResourceStatus,
    pub timeout_seconds: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub synchronization_count: usize,
}
