// ============================================================================
// Session
// ============================================================================
//
// The conversational context a facade belongs to. A session owns the queue
// of pending changes, knows how to flush them, and hands out the
// transactional resource its facades delegate to. At most one of its
// facades may be active at a time.
//
// ============================================================================

pub mod change;
pub mod config;
pub mod flusher;

pub use change::PendingChange;
pub use config::SessionConfig;
pub use flusher::{Flusher, RecordingFlusher};

use crate::connection::Connection;
use crate::core::{FacadeId, FlushMode, ResourceKind, Result, TransactionError};
use crate::facade::LocalTransaction;
use crate::resource::{ConnectionResource, CoordinatedResource, SharedResource};
use crate::transaction::TransactionCoordinator;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{Level, event};
use uuid::Uuid;

/// What a facade needs from the session that created it
///
/// Implemented by `Session`; hosts with their own session type can
/// implement it and construct facades with `LocalTransaction::new`.
pub trait SessionContext: Send + Sync {
    fn session_id(&self) -> Uuid;

    fn flush_mode(&self) -> FlushMode;

    /// Write pending state to the data store
    fn flush(&self) -> Result<()>;

    /// The resource facades delegate to, if one is configured
    fn transactional_resource(&self) -> Option<SharedResource>;

    /// Reserve the session's single active slot for `facade`
    ///
    /// # Errors
    /// Returns `ConcurrentTransaction` if another facade holds it
    fn claim_active(&self, facade: FacadeId) -> Result<()>;

    /// Give the slot back if `facade` holds it
    fn release_active(&self, facade: FacadeId);

    fn active_transaction(&self) -> Option<FacadeId>;
}

struct SessionInner {
    id: Uuid,
    config: SessionConfig,
    resource: Option<SharedResource>,
    flush_mode: Mutex<FlushMode>,
    pending: Mutex<Vec<PendingChange>>,
    flusher: Mutex<Box<dyn Flusher>>,
    active: Mutex<Option<FacadeId>>,
    next_facade: AtomicU64,
    flush_count: AtomicU64,
}

impl SessionContext for SessionInner {
    fn session_id(&self) -> Uuid {
        self.id
    }

    fn flush_mode(&self) -> FlushMode {
        *self.flush_mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self) -> Result<()> {
        let changes = self.pending.lock()?.clone();

        self.flusher.lock()?.flush(&changes).map_err(|err| match err {
            err @ TransactionError::FlushFailed(_) => err,
            other => TransactionError::FlushFailed(other.to_string()),
        })?;

        self.pending.lock()?.drain(..changes.len());
        self.flush_count.fetch_add(1, Ordering::SeqCst);
        event!(Level::DEBUG, session = %self.id, flushed = changes.len(), "session flushed");
        Ok(())
    }

    fn transactional_resource(&self) -> Option<SharedResource> {
        self.resource.clone()
    }

    fn claim_active(&self, facade: FacadeId) -> Result<()> {
        let mut active = self.active.lock()?;
        match *active {
            Some(current) if current != facade => Err(TransactionError::ConcurrentTransaction {
                session: self.config.name.clone(),
            }),
            _ => {
                *active = Some(facade);
                Ok(())
            }
        }
    }

    fn release_active(&self, facade: FacadeId) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if *active == Some(facade) {
            *active = None;
        }
    }

    fn active_transaction(&self) -> Option<FacadeId> {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A unit-of-work session
///
/// Cheap to clone; clones share the same session.
///
/// # Examples
///
/// ```
/// use localtx::{PendingChange, Session, SessionConfig, TransactionCoordinator};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let coordinator = TransactionCoordinator::shared("orders");
/// let session = Session::coordinated(coordinator, SessionConfig::default())?;
///
/// session.with_transaction(|session| {
///     session.record(PendingChange::insert("orders", "1"))
/// })?;
/// assert_eq!(session.flush_count(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn builder(config: SessionConfig) -> SessionBuilder {
        SessionBuilder {
            config,
            resource: None,
            flusher: None,
        }
    }

    /// Session whose facades delegate to a coordinator
    pub fn coordinated(coordinator: Arc<TransactionCoordinator>, config: SessionConfig) -> Result<Self> {
        Self::builder(config.resource_kind(ResourceKind::Coordinated))
            .resource(Arc::new(CoordinatedResource::new(coordinator)))
            .build()
    }

    /// Session whose facades delegate to a connection-level transaction
    pub fn with_connection(connection: Connection, config: SessionConfig) -> Result<Self> {
        Self::builder(config.resource_kind(ResourceKind::Connection))
            .resource(Arc::new(ConnectionResource::new(connection)))
            .build()
    }

    /// Session without any transactional resource; its facades cannot begin
    pub fn detached(config: SessionConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn resource(&self) -> Option<SharedResource> {
        self.inner.transactional_resource()
    }

    pub fn flush_mode(&self) -> FlushMode {
        self.inner.flush_mode()
    }

    pub fn set_flush_mode(&self, mode: FlushMode) -> Result<()> {
        *self.inner.flush_mode.lock()? = mode;
        Ok(())
    }

    /// Queue a change for the next flush
    ///
    /// Under `FlushMode::Always` the change is flushed right away.
    pub fn record(&self, change: PendingChange) -> Result<()> {
        self.inner.pending.lock()?.push(change);
        if self.flush_mode() == FlushMode::Always {
            self.inner.flush()?;
        }
        Ok(())
    }

    pub fn pending_changes(&self) -> Result<Vec<PendingChange>> {
        Ok(self.inner.pending.lock()?.clone())
    }

    pub fn flush(&self) -> Result<()> {
        self.inner.flush()
    }

    pub fn flush_count(&self) -> u64 {
        self.inner.flush_count.load(Ordering::SeqCst)
    }

    /// Facade currently holding the session's active slot
    pub fn active_transaction(&self) -> Option<FacadeId> {
        self.inner.active_transaction()
    }

    /// Create a fresh, not yet begun facade
    pub fn transaction(&self) -> LocalTransaction {
        let id = FacadeId(self.inner.next_facade.fetch_add(1, Ordering::SeqCst));
        let context: Arc<dyn SessionContext> = self.inner.clone();
        let mut transaction = LocalTransaction::new(id, &context);
        if let Some(seconds) = self.inner.config.default_timeout_seconds {
            transaction.set_timeout(seconds);
        }
        transaction
    }

    /// Create a facade and begin it
    pub fn begin_transaction(&self) -> Result<LocalTransaction> {
        let mut transaction = self.transaction();
        transaction.begin()?;
        Ok(transaction)
    }

    /// Executes a closure within a transaction scope.
    ///
    /// If the closure returns `Ok`, the transaction is committed.
    /// If it returns `Err`, the transaction is rolled back.
    pub fn with_transaction<F, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Session) -> Result<T>,
    {
        let mut transaction = self.begin_transaction()?;

        match op(self) {
            Ok(value) => {
                if let Err(err) = transaction.commit() {
                    if transaction.is_active() {
                        if let Err(rollback_err) = transaction.rollback() {
                            event!(Level::WARN, session = %self.id(), error = %rollback_err, "rollback after failed commit");
                        }
                    }
                    return Err(err);
                }
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = transaction.rollback() {
                    event!(Level::WARN, session = %self.id(), error = %rollback_err, "rollback after failed unit of work");
                }
                Err(err)
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("name", &self.inner.config.name)
            .field("resource_kind", &self.inner.config.resource_kind)
            .field("active", &self.active_transaction())
            .finish()
    }
}

/// Builds a `Session` from its configuration and collaborators
pub struct SessionBuilder {
    config: SessionConfig,
    resource: Option<SharedResource>,
    flusher: Option<Box<dyn Flusher>>,
}

impl SessionBuilder {
    pub fn resource(mut self, resource: SharedResource) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn flusher(mut self, flusher: impl Flusher + 'static) -> Self {
        self.flusher = Some(Box::new(flusher));
        self
    }

    pub fn build(self) -> Result<Session> {
        self.config.validate()?;

        if let Some(resource) = &self.resource {
            if resource.kind() != self.config.resource_kind {
                return Err(TransactionError::Config(format!(
                    "session '{}' is configured for {} but was given a {} resource",
                    self.config.name,
                    self.config.resource_kind,
                    resource.kind()
                )));
            }
        }

        let flusher: Box<dyn Flusher> = match self.flusher {
            Some(flusher) => flusher,
            None => Box::new(RecordingFlusher::new()),
        };

        let id = Uuid::new_v4();
        event!(
            Level::DEBUG,
            session = %id,
            name = %self.config.name,
            resource_kind = %self.config.resource_kind,
            "session opened"
        );

        Ok(Session {
            inner: Arc::new(SessionInner {
                id,
                flush_mode: Mutex::new(self.config.flush_mode),
                resource: self.resource,
                pending: Mutex::new(Vec::new()),
                flusher: Mutex::new(flusher),
                active: Mutex::new(None),
                next_facade: AtomicU64::new(1),
                flush_count: AtomicU64::new(0),
                config: self.config,
            }),
        })
    }
}
