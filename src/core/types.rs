use serde::{Deserialize, Serialize};
use std::fmt;

/// Local view of a facade's lifecycle
///
/// State transitions:
/// ```text
/// NotStarted ──begin──> Active ──commit──> Committed
///                         │
///                         └──rollback──> RolledBack
/// ```
///
/// The state only moves forward. A terminal facade is discarded and the
/// session mints a new one for the next unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalState {
    #[default]
    NotStarted,
    Active,
    Committed,
    RolledBack,
}

impl LocalState {
    pub fn is_active(&self) -> bool {
        matches!(self, LocalState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LocalState::Committed | LocalState::RolledBack)
    }
}

impl fmt::Display for LocalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalState::NotStarted => write!(f, "NOT_STARTED"),
            LocalState::Active => write!(f, "ACTIVE"),
            LocalState::Committed => write!(f, "COMMITTED"),
            LocalState::RolledBack => write!(f, "ROLLED_BACK"),
        }
    }
}

/// Whether a facade started the underlying resource or joined one that was
/// already running. Resolved once by `begin` and never re-derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ownership {
    #[default]
    Unresolved,
    Initiator,
    Joiner,
}

impl Ownership {
    pub fn is_initiator(&self) -> bool {
        matches!(self, Ownership::Initiator)
    }
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ownership::Unresolved => write!(f, "unresolved"),
            Ownership::Initiator => write!(f, "initiator"),
            Ownership::Joiner => write!(f, "joiner"),
        }
    }
}

/// Session flush policy consulted at commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushMode {
    /// Never flush automatically, not even on commit.
    Never,
    /// Flush only when the transaction commits.
    Commit,
    /// Flush on commit and whenever the session sees fit.
    #[default]
    Auto,
    /// Flush before every operation and on commit.
    Always,
}

impl FlushMode {
    pub fn flushes_on_commit(&self) -> bool {
        !matches!(self, FlushMode::Never)
    }
}

/// Outcome handed to `Synchronization::after_completion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Committed,
    RolledBack,
    Unknown,
}

/// What the underlying resource reports about its own transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStatus {
    NoTransaction,
    Active,
    MarkedRollback,
    Committed,
    RolledBack,
}

impl ResourceStatus {
    /// A transaction is in flight, even if it can only roll back.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, ResourceStatus::Active | ResourceStatus::MarkedRollback)
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceStatus::NoTransaction => write!(f, "NO_TRANSACTION"),
            ResourceStatus::Active => write!(f, "ACTIVE"),
            ResourceStatus::MarkedRollback => write!(f, "MARKED_ROLLBACK"),
            ResourceStatus::Committed => write!(f, "COMMITTED"),
            ResourceStatus::RolledBack => write!(f, "ROLLED_BACK"),
        }
    }
}

/// Which transaction strategy a session delegates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Distributed transaction driven by an external coordinator.
    Coordinated,
    /// Transaction local to a single connection.
    #[default]
    Connection,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Coordinated => write!(f, "coordinated"),
            ResourceKind::Connection => write!(f, "connection"),
        }
    }
}

/// Identifies a facade within its owning session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FacadeId(pub u64);

impl FacadeId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FacadeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx_{}", self.0)
    }
}
