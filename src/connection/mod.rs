use crate::core::{CompletionStatus, ResourceStatus, Result, TransactionError};
use crate::transaction::{Synchronization, SynchronizationRegistry};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{Level, event};

/// Connection handle with connection-level transactions
///
/// Clones share one underlying connection, so an outer unit of work and a
/// facade can both see the same open transaction.
/// Similar to a JDBC connection with auto-commit toggling.
#[derive(Debug, Clone)]
pub struct Connection {
    inner: Arc<Mutex<ConnectionInner>>,
}

#[derive(Debug)]
struct ConnectionInner {
    id: u64,
    state: ConnectionState,
    auto_commit: bool,
    /// Auto-commit was switched off by `begin` and comes back on completion
    restore_auto_commit: bool,
    rollback_only: bool,
    pending_timeout: Option<u32>,
    transaction_timeout: Option<u32>,
    synchronizations: SynchronizationRegistry,
    commits: u64,
    rollbacks: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Idle,
    InTransaction,
    Closed,
}

impl ConnectionInner {
    fn ensure_open(&self) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Err(TransactionError::ResourceUnavailable(format!(
                "connection {} is closed",
                self.id
            )));
        }
        Ok(())
    }

    fn finish(&mut self) -> SynchronizationRegistry {
        self.state = ConnectionState::Idle;
        self.rollback_only = false;
        self.transaction_timeout = None;
        if self.restore_auto_commit {
            self.auto_commit = true;
            self.restore_auto_commit = false;
        }
        self.synchronizations.take()
    }
}

impl Connection {
    pub fn new(id: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ConnectionInner {
                id,
                state: ConnectionState::Idle,
                auto_commit: true,
                restore_auto_commit: false,
                rollback_only: false,
                pending_timeout: None,
                transaction_timeout: None,
                synchronizations: SynchronizationRegistry::new(),
                commits: 0,
                rollbacks: 0,
            })),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ConnectionInner>> {
        Ok(self.inner.lock()?)
    }

    pub fn id(&self) -> Result<u64> {
        Ok(self.lock()?.id)
    }

    pub fn auto_commit(&self) -> Result<bool> {
        Ok(self.lock()?.auto_commit)
    }

    /// Check if connection has an open transaction
    pub fn in_transaction(&self) -> Result<bool> {
        Ok(self.lock()?.state == ConnectionState::InTransaction)
    }

    pub fn is_closed(&self) -> Result<bool> {
        Ok(self.lock()?.state == ConnectionState::Closed)
    }

    pub fn status(&self) -> Result<ResourceStatus> {
        let inner = self.lock()?;
        inner.ensure_open()?;
        Ok(match (inner.state, inner.rollback_only) {
            (ConnectionState::InTransaction, true) => ResourceStatus::MarkedRollback,
            (ConnectionState::InTransaction, false) => ResourceStatus::Active,
            _ => ResourceStatus::NoTransaction,
        })
    }

    /// Timeout for the next transaction opened on this connection
    pub fn set_transaction_timeout(&self, seconds: u32) -> Result<()> {
        let mut inner = self.lock()?;
        inner.ensure_open()?;
        inner.pending_timeout = (seconds > 0).then_some(seconds);
        Ok(())
    }

    /// Timeout of the open transaction, if it was given one
    pub fn transaction_timeout(&self) -> Result<Option<u32>> {
        Ok(self.lock()?.transaction_timeout)
    }

    /// Open a transaction by switching auto-commit off
    ///
    /// # Examples
    ///
    /// ```
    /// # use localtx::Connection;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let conn = Connection::new(1);
    /// conn.begin()?;
    /// assert!(!conn.auto_commit()?);
    /// conn.commit()?;
    /// assert!(conn.auto_commit()?);
    /// # Ok(())
    /// # }
    /// ```
    pub fn begin(&self) -> Result<()> {
        let mut inner = self.lock()?;
        inner.ensure_open()?;

        if inner.state == ConnectionState::InTransaction {
            return Err(TransactionError::BeginFailed(format!(
                "connection {} already has an open transaction",
                inner.id
            )));
        }

        if inner.auto_commit {
            inner.auto_commit = false;
            inner.restore_auto_commit = true;
        }
        inner.state = ConnectionState::InTransaction;
        inner.transaction_timeout = inner.pending_timeout.take();

        event!(Level::DEBUG, connection = inner.id, timeout = ?inner.transaction_timeout, "connection transaction opened");
        Ok(())
    }

    /// Commit the open transaction
    ///
    /// A rollback-only transaction, or one vetoed by a synchronization, is
    /// left open and marked rollback-only so it can still be rolled back.
    pub fn commit(&self) -> Result<()> {
        let callbacks = {
            let inner = self.lock()?;
            inner.ensure_open()?;
            if inner.state != ConnectionState::InTransaction {
                return Err(TransactionError::CommitFailed {
                    reason: format!("connection {} has no open transaction", inner.id),
                    rolled_back: false,
                });
            }
            if inner.rollback_only {
                return Err(TransactionError::CommitFailed {
                    reason: format!("connection {} transaction is marked rollback-only", inner.id),
                    rolled_back: false,
                });
            }
            inner.synchronizations.clone()
        };

        if let Err(err) = callbacks.before_completion() {
            let mut inner = self.lock()?;
            inner.rollback_only = true;
            return Err(TransactionError::CommitFailed {
                reason: err.to_string(),
                rolled_back: false,
            });
        }

        let (id, callbacks) = {
            let mut inner = self.lock()?;
            inner.commits += 1;
            (inner.id, inner.finish())
        };

        event!(Level::DEBUG, connection = id, "connection transaction committed");
        callbacks.after_completion(CompletionStatus::Committed);
        Ok(())
    }

    /// Roll back the open transaction
    pub fn rollback(&self) -> Result<()> {
        let (id, callbacks) = {
            let mut inner = self.lock()?;
            inner.ensure_open()?;
            if inner.state != ConnectionState::InTransaction {
                return Err(TransactionError::RollbackFailed(format!(
                    "connection {} has no open transaction",
                    inner.id
                )));
            }
            inner.rollbacks += 1;
            (inner.id, inner.finish())
        };

        event!(Level::DEBUG, connection = id, "connection transaction rolled back");
        callbacks.after_completion(CompletionStatus::RolledBack);
        Ok(())
    }

    pub fn set_rollback_only(&self) -> Result<()> {
        let mut inner = self.lock()?;
        inner.ensure_open()?;
        if inner.state != ConnectionState::InTransaction {
            return Err(TransactionError::RollbackFailed(format!(
                "connection {} has no open transaction",
                inner.id
            )));
        }
        inner.rollback_only = true;
        Ok(())
    }

    /// Attach a callback to the open transaction, or to the next one if
    /// none is open yet
    pub fn register_synchronization(&self, synchronization: Arc<dyn Synchronization>) -> Result<()> {
        let mut inner = self.lock()?;
        inner.ensure_open()?;
        inner.synchronizations.register(synchronization);
        Ok(())
    }

    /// Close the connection, rolling back any open transaction
    pub fn close(&self) -> Result<()> {
        if self.in_transaction()? {
            self.rollback()?;
        }
        let mut inner = self.lock()?;
        inner.state = ConnectionState::Closed;
        Ok(())
    }

    pub fn commit_count(&self) -> Result<u64> {
        Ok(self.lock()?.commits)
    }

    pub fn rollback_count(&self) -> Result<u64> {
        Ok(self.lock()?.rollbacks)
    }
}
