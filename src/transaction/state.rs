// ============================================================================
// Global Transaction State
// ============================================================================
//
// A transaction as the coordinator sees it. Each one moves through
// Active -> (MarkedRollback) -> Committed/RolledBack and carries its own
// synchronizations and optional deadline.
//
// ============================================================================

use super::{Synchronization, SynchronizationRegistry};
use crate::core::{ResourceStatus, Result, TransactionError};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Identifier assigned by a coordinator, unique within that coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gtx_{}", self.0)
    }
}

/// A coordinator-managed transaction
///
/// # Thread Safety
/// Always accessed under the owning coordinator's lock.
#[derive(Debug)]
pub struct GlobalTransaction {
    id: TransactionId,
    status: ResourceStatus,
    timeout_seconds: Option<u32>,
    started_at: DateTime<Utc>,
    deadline: Option<DateTime<Utc>>,
    synchronizations: SynchronizationRegistry,
}

impl GlobalTransaction {
    /// Start a transaction, optionally bounded by a timeout
    pub fn new(id: TransactionId, timeout_seconds: Option<u32>) -> Self {
        let started_at = Utc::now();
        let deadline = timeout_seconds.map(|secs| started_at + Duration::seconds(i64::from(secs)));
        Self {
            id,
            status: ResourceStatus::Active,
            timeout_seconds,
            started_at,
            deadline,
            synchronizations: SynchronizationRegistry::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn status(&self) -> ResourceStatus {
        self.status
    }

    pub fn timeout_seconds(&self) -> Option<u32> {
        self.timeout_seconds
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn synchronizations(&self) -> &SynchronizationRegistry {
        &self.synchronizations
    }

    /// Whether the deadline passed as of `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|deadline| now > deadline)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn register_synchronization(&mut self, synchronization: Arc<dyn Synchronization>) -> Result<()> {
        if !self.status.is_in_flight() {
            return Err(TransactionError::SynchronizationFailed(format!(
                "cannot register with transaction {} in state {}",
                self.id, self.status
            )));
        }
        self.synchronizations.register(synchronization);
        Ok(())
    }

    /// Restrict the transaction so its only possible outcome is rollback
    ///
    /// # Errors
    /// Returns error if the transaction already completed
    pub fn mark_rollback_only(&mut self) -> Result<()> {
        if !self.status.is_in_flight() {
            return Err(TransactionError::RollbackFailed(format!(
                "transaction {} is already {}",
                self.id, self.status
            )));
        }
        self.status = ResourceStatus::MarkedRollback;
        Ok(())
    }

    /// Mark committed and hand back the callbacks to notify
    pub fn complete_commit(&mut self) -> Result<SynchronizationRegistry> {
        if self.status != ResourceStatus::Active {
            return Err(TransactionError::CommitFailed {
                reason: format!("transaction {} is {}", self.id, self.status),
                rolled_back: false,
            });
        }
        self.status = ResourceStatus::Committed;
        Ok(self.synchronizations.take())
    }

    /// Mark rolled back and hand back the callbacks to notify
    pub fn complete_rollback(&mut self) -> Result<SynchronizationRegistry> {
        if !self.status.is_in_flight() {
            return Err(TransactionError::RollbackFailed(format!(
                "transaction {} is already {}",
                self.id, self.status
            )));
        }
        self.status = ResourceStatus::RolledBack;
        Ok(self.synchronizations.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_lifecycle() {
        let mut txn = GlobalTransaction::new(TransactionId(1), None);

        assert_eq!(txn.status(), ResourceStatus::Active);
        txn.complete_commit().unwrap();
        assert_eq!(txn.status(), ResourceStatus::Committed);
    }

    #[test]
    fn test_cannot_commit_twice() {
        let mut txn = GlobalTransaction::new(TransactionId(1), None);

        txn.complete_commit().unwrap();
        assert!(txn.complete_commit().is_err());
        assert!(txn.complete_rollback().is_err());
    }

    #[test]
    fn test_rollback_only_blocks_commit() {
        let mut txn = GlobalTransaction::new(TransactionId(7), None);

        txn.mark_rollback_only().unwrap();
        assert_eq!(txn.status(), ResourceStatus::MarkedRollback);
        assert!(txn.complete_commit().is_err());
        txn.complete_rollback().unwrap();
        assert_eq!(txn.status(), ResourceStatus::RolledBack);
    }

    #[test]
    fn test_deadline_from_timeout() {
        let txn = GlobalTransaction::new(TransactionId(2), Some(30));

        assert_eq!(txn.timeout_seconds(), Some(30));
        assert!(!txn.is_expired());
        assert!(txn.is_expired_at(txn.started_at() + Duration::seconds(31)));
    }

    #[test]
    fn test_no_timeout_never_expires() {
        let txn = GlobalTransaction::new(TransactionId(3), None);
        assert!(!txn.is_expired_at(txn.started_at() + Duration::days(365)));
    }

    #[test]
    fn test_display_id() {
        assert_eq!(TransactionId(42).to_string(), "gtx_42");
    }
}
