// ============================================================================
// Local Transaction Facade
// ============================================================================
//
// Demarcates a unit of work for one session without knowing which resource
// runs it. The facade either starts the resource's transaction (initiator)
// or attaches to one that is already running (joiner):
//
//                 begin          commit          rollback
//   initiator     starts it      commits it      rolls it back
//   joiner        attaches       flush only      marks rollback-only
//
// was_committed / was_rolled_back describe only what this facade did.
//
// ============================================================================

use crate::core::{FacadeId, LocalState, Ownership, Result, TransactionError};
use crate::resource::SharedResource;
use crate::session::SessionContext;
use crate::transaction::Synchronization;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{Level, event, info_span};

/// Handle for one unit of work within a session
///
/// Obtained from the owning session and discarded once it reaches a
/// terminal state; a facade is never reused for a second unit of work.
///
/// # Thread Safety
/// Every state change takes `&mut self`, so a facade is driven by one
/// caller at a time. It holds only a weak reference to its session.
///
/// # Examples
///
/// ```
/// use localtx::{Connection, Session, SessionConfig};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let session = Session::with_connection(Connection::new(1), SessionConfig::default())?;
///
/// let mut tx = session.transaction();
/// tx.begin()?;
/// tx.commit()?;
/// assert!(tx.was_committed());
/// # Ok(())
/// # }
/// ```
pub struct LocalTransaction {
    id: FacadeId,
    session: Weak<dyn SessionContext>,
    state: LocalState,
    ownership: Ownership,
    /// Applied to the resource by the next `begin`, if this facade starts it
    timeout: Option<u32>,
    synchronizations: Vec<Arc<dyn Synchronization>>,
    resource: Option<SharedResource>,
    /// The rollback that ended this unit of work was performed by this facade
    rolled_back_here: bool,
}

impl LocalTransaction {
    pub fn new(id: FacadeId, session: &Arc<dyn SessionContext>) -> Self {
        Self {
            id,
            session: Arc::downgrade(session),
            state: LocalState::NotStarted,
            ownership: Ownership::Unresolved,
            timeout: None,
            synchronizations: Vec::new(),
            resource: None,
            rolled_back_here: false,
        }
    }

    pub fn id(&self) -> FacadeId {
        self.id
    }

    pub fn state(&self) -> LocalState {
        self.state
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn timeout(&self) -> Option<u32> {
        self.timeout
    }

    pub fn synchronization_count(&self) -> usize {
        self.synchronizations.len()
    }

    fn session(&self) -> Result<Arc<dyn SessionContext>> {
        self.session.upgrade().ok_or_else(|| {
            TransactionError::ResourceUnavailable(format!(
                "owning session of {} has been closed",
                self.id
            ))
        })
    }

    fn resolve_resource(&self) -> Result<SharedResource> {
        if let Some(resource) = &self.resource {
            return Ok(resource.clone());
        }
        self.session()?.transactional_resource().ok_or_else(|| {
            TransactionError::ResourceUnavailable(format!(
                "session has no transactional resource for {}",
                self.id
            ))
        })
    }

    fn active_resource(&self, operation: &'static str) -> Result<SharedResource> {
        self.resource
            .clone()
            .ok_or_else(|| TransactionError::invalid_state(operation, self.state))
    }

    /// Move to a terminal state and give the session's active slot back.
    fn finish(&mut self, state: LocalState) {
        self.state = state;
        if let Some(session) = self.session.upgrade() {
            session.release_active(self.id);
        }
    }

    /// Start a new unit of work
    ///
    /// Starts the resource's transaction when none is running, otherwise
    /// joins the running one. The timeout set with `set_timeout` is only
    /// handed to the resource when this facade starts it.
    ///
    /// # Errors
    /// - `InvalidState` if this facade was already begun
    /// - `ConcurrentTransaction` if another facade of the session is active
    /// - `ResourceUnavailable` / `BeginFailed` if the resource cannot be
    ///   started or joined; the facade stays `NotStarted`
    pub fn begin(&mut self) -> Result<()> {
        if self.state != LocalState::NotStarted {
            return Err(TransactionError::invalid_state("begin", self.state));
        }

        let session = self.session()?;
        let span = info_span!("local_tx.begin", facade = %self.id, session = %session.session_id());
        let _guard = span.enter();

        let resource = self.resolve_resource()?;
        session.claim_active(self.id)?;

        let ownership = match self.start_or_join(&resource) {
            Ok(ownership) => ownership,
            Err(err) => {
                session.release_active(self.id);
                event!(Level::DEBUG, error = %err, "begin failed");
                return Err(err);
            }
        };

        self.ownership = ownership;
        self.resource = Some(resource);
        self.state = LocalState::Active;
        event!(Level::DEBUG, ownership = %ownership, "local transaction active");
        Ok(())
    }

    fn start_or_join(&self, resource: &SharedResource) -> Result<Ownership> {
        if resource.is_active()? {
            return Ok(Ownership::Joiner);
        }
        if let Some(seconds) = self.timeout {
            resource.set_timeout(seconds)?;
        }
        resource.begin()?;
        Ok(Ownership::Initiator)
    }

    /// Flush the session and end the unit of work
    ///
    /// The session is flushed unless its flush mode is `Never`. The
    /// resource is committed only if this facade started it; a joiner
    /// leaves the commit to whoever started the transaction and reports
    /// `was_committed() == false`.
    ///
    /// # Errors
    /// - `InvalidState` unless the facade is active
    /// - `FlushFailed` if the flush fails; the facade stays active
    /// - `CommitFailed` if the resource refuses to commit. The facade then
    ///   rolls back the resource it started and reports whether that
    ///   worked through `rolled_back` and `was_rolled_back()`
    /// - `ResourceUnavailable` if a joiner can no longer reach the resource,
    ///   or the transaction it joined has already ended
    pub fn commit(&mut self) -> Result<()> {
        if !self.state.is_active() {
            return Err(TransactionError::invalid_state("commit", self.state));
        }

        let session = self.session()?;
        let span = info_span!(
            "local_tx.commit",
            facade = %self.id,
            session = %session.session_id(),
            ownership = %self.ownership
        );
        let _guard = span.enter();

        if session.flush_mode().flushes_on_commit() {
            session.flush()?;
        }

        let resource = self.active_resource("commit")?;
        match self.ownership {
            Ownership::Initiator => {
                if let Err(err) = resource.commit() {
                    let rolled_back = match resource.rollback() {
                        Ok(()) => true,
                        Err(rollback_err) => {
                            event!(Level::WARN, error = %rollback_err, "rollback after failed commit did not take effect");
                            false
                        }
                    };
                    self.rolled_back_here = rolled_back;
                    self.finish(LocalState::RolledBack);
                    event!(Level::ERROR, error = %err, rolled_back, "commit failed");
                    let reason = match err {
                        TransactionError::CommitFailed { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    return Err(TransactionError::CommitFailed { reason, rolled_back });
                }
            }
            Ownership::Joiner => {
                // The joined transaction must still be in flight
                let err = match resource.status() {
                    Ok(status) if status.is_in_flight() => None,
                    Ok(status) => Some(TransactionError::ResourceUnavailable(format!(
                        "joined transaction of {} already ended ({})",
                        self.id, status
                    ))),
                    Err(err) => Some(err),
                };
                if let Some(err) = err {
                    self.finish(LocalState::RolledBack);
                    event!(Level::ERROR, error = %err, "joined resource is gone");
                    return Err(err);
                }
            }
            Ownership::Unresolved => {
                return Err(TransactionError::invalid_state("commit", self.state));
            }
        }

        self.finish(LocalState::Committed);
        event!(Level::DEBUG, committed = self.was_committed(), "local transaction committed");
        Ok(())
    }

    /// Force the unit of work to roll back
    ///
    /// A facade that started the resource rolls it back; a joiner marks the
    /// shared transaction rollback-only. Rolling back a facade that was
    /// never begun does nothing.
    ///
    /// # Errors
    /// - `InvalidState` if the facade already completed
    /// - `RollbackFailed` if the resource refuses
    pub fn rollback(&mut self) -> Result<()> {
        match self.state {
            LocalState::NotStarted => {
                event!(Level::DEBUG, facade = %self.id, "rollback before begin ignored");
                return Ok(());
            }
            LocalState::Active => {}
            state => return Err(TransactionError::invalid_state("rollback", state)),
        }

        let span = info_span!("local_tx.rollback", facade = %self.id, ownership = %self.ownership);
        let _guard = span.enter();

        let resource = self.active_resource("rollback")?;
        let result = match self.ownership {
            Ownership::Initiator => resource.rollback(),
            Ownership::Joiner => resource.set_rollback_only(),
            Ownership::Unresolved => {
                return Err(TransactionError::invalid_state("rollback", self.state));
            }
        };

        match result {
            Ok(()) => {
                self.rolled_back_here = true;
                self.finish(LocalState::RolledBack);
                event!(Level::DEBUG, "local transaction rolled back");
                Ok(())
            }
            Err(err) => {
                self.finish(LocalState::RolledBack);
                event!(Level::ERROR, error = %err, "rollback failed");
                Err(match err {
                    err @ TransactionError::RollbackFailed(_) => err,
                    other => TransactionError::RollbackFailed(other.to_string()),
                })
            }
        }
    }

    /// Rolled back, or marked rollback-only, through this facade.
    ///
    /// Stays false when something else ended the transaction, for example
    /// a coordinator timing it out.
    pub fn was_rolled_back(&self) -> bool {
        self.state == LocalState::RolledBack && self.rolled_back_here
    }

    /// Unequivocally committed through this facade. A joiner never reports
    /// true, even after a successful `commit`.
    pub fn was_committed(&self) -> bool {
        self.state == LocalState::Committed && self.ownership.is_initiator()
    }

    /// The local unit of work is in progress; says nothing about the
    /// underlying transaction.
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Register a completion callback with the underlying resource
    ///
    /// The callback is forwarded immediately, keeping registration order.
    /// The resource fires it; this facade never does.
    ///
    /// # Errors
    /// - `InvalidState` if the facade already completed
    /// - `ResourceUnavailable` if there is no resource to register with
    /// - whatever the resource reports when it refuses the registration
    pub fn register_synchronization(&mut self, synchronization: Arc<dyn Synchronization>) -> Result<()> {
        if self.state.is_terminal() {
            return Err(TransactionError::invalid_state(
                "register synchronization",
                self.state,
            ));
        }

        let resource = self.resolve_resource()?;
        resource.register_synchronization(synchronization.clone())?;
        self.synchronizations.push(synchronization);
        self.resource = Some(resource);
        Ok(())
    }

    /// Timeout for a transaction started by the next `begin`. Has no effect
    /// on a transaction that is already running.
    pub fn set_timeout(&mut self, seconds: u32) {
        self.timeout = Some(seconds);
    }
}

impl fmt::Debug for LocalTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTransaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("ownership", &self.ownership)
            .field("timeout", &self.timeout)
            .field("synchronizations", &self.synchronizations.len())
            .field("rolled_back_here", &self.rolled_back_here)
            .finish()
    }
}

impl Drop for LocalTransaction {
    fn drop(&mut self) {
        // An abandoned unit of work must not stay open on the resource
        if self.state.is_active() {
            event!(Level::WARN, facade = %self.id, ownership = %self.ownership, "active local transaction dropped, rolling back");
            if let Err(err) = self.rollback() {
                event!(Level::ERROR, facade = %self.id, error = %err, "rollback on drop failed");
            }
        }
    }
}
