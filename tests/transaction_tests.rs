/// Local transaction tests
///
/// Lifecycle, ownership and query semantics of the facade over a
/// coordinator-managed transaction
/// Run with: cargo test --test transaction_tests

use localtx::{
    CompletionStatus, LocalState, Ownership, ResourceStatus, Result, Session, SessionConfig,
    Synchronization, TransactionCoordinator, TransactionError,
};
use std::sync::{Arc, Mutex};

struct Recorder {
    name: &'static str,
    veto: bool,
    log: Arc<Mutex<Vec<String>>>,
}

impl Synchronization for Recorder {
    fn before_completion(&self) -> Result<()> {
        self.log.lock().unwrap().push(format!("before:{}", self.name));
        if self.veto {
            return Err(TransactionError::SynchronizationFailed(format!(
                "{} vetoed",
                self.name
            )));
        }
        Ok(())
    }

    fn after_completion(&self, status: CompletionStatus) {
        self.log
            .lock()
            .unwrap()
            .push(format!("after:{}:{:?}", self.name, status));
    }
}

fn recorder(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Recorder> {
    Arc::new(Recorder {
        name,
        veto: false,
        log: log.clone(),
    })
}

fn setup() -> (Arc<TransactionCoordinator>, Session) {
    let coordinator = TransactionCoordinator::shared("test");
    let session = Session::coordinated(coordinator.clone(), SessionConfig::default()).unwrap();
    (coordinator, session)
}

#[test]
fn test_begin_commit_as_initiator() {
    let (coordinator, session) = setup();

    let mut tx = session.transaction();
    assert_eq!(tx.state(), LocalState::NotStarted);

    tx.begin().unwrap();
    assert!(tx.is_active());
    assert_eq!(tx.ownership(), Ownership::Initiator);
    assert_eq!(coordinator.status().unwrap(), ResourceStatus::Active);

    tx.commit().unwrap();
    assert!(tx.was_committed());
    assert!(!tx.was_rolled_back());
    assert!(!tx.is_active());
    assert_eq!(coordinator.status().unwrap(), ResourceStatus::NoTransaction);
    assert_eq!(coordinator.completed_count().unwrap(), 1);
}

#[test]
fn test_joined_commit_is_not_reported_as_committed() {
    let (coordinator, session) = setup();
    coordinator.begin().unwrap();

    let mut tx = session.transaction();
    tx.begin().unwrap();
    assert_eq!(tx.ownership(), Ownership::Joiner);

    assert!(tx.commit().is_ok());
    assert_eq!(tx.state(), LocalState::Committed);
    assert!(!tx.was_committed(), "joiner must not claim the commit");
    assert!(!tx.is_active());

    // The outer transaction is untouched and still owned by its starter
    assert_eq!(coordinator.status().unwrap(), ResourceStatus::Active);
    coordinator.commit().unwrap();
    assert_eq!(coordinator.completed_count().unwrap(), 1);
}

#[test]
fn test_begin_rollback() {
    let (coordinator, session) = setup();

    let mut tx = session.transaction();
    tx.begin().unwrap();
    tx.rollback().unwrap();

    assert!(tx.was_rolled_back());
    assert!(!tx.was_committed());
    assert_eq!(tx.state(), LocalState::RolledBack);
    assert_eq!(coordinator.status().unwrap(), ResourceStatus::NoTransaction);
}

#[test]
fn test_joined_rollback_marks_outer_transaction() {
    let (coordinator, session) = setup();
    coordinator.begin().unwrap();

    let mut tx = session.transaction();
    tx.begin().unwrap();
    tx.rollback().unwrap();

    assert!(tx.was_rolled_back());
    assert_eq!(coordinator.status().unwrap(), ResourceStatus::MarkedRollback);
    assert!(coordinator.commit().is_err(), "outer commit must fail once doomed");
    coordinator.rollback().unwrap();
}

#[test]
fn test_commit_twice_fails() {
    let (_coordinator, session) = setup();

    let mut tx = session.begin_transaction().unwrap();
    tx.commit().unwrap();

    let err = tx.commit().unwrap_err();
    assert!(matches!(err, TransactionError::InvalidState { .. }));
    assert!(tx.was_committed(), "failed second commit must not disturb state");
}

#[test]
fn test_commit_before_begin_fails() {
    let (_coordinator, session) = setup();

    let mut tx = session.transaction();
    assert!(matches!(
        tx.commit(),
        Err(TransactionError::InvalidState { .. })
    ));
    assert_eq!(tx.state(), LocalState::NotStarted);
}

#[test]
fn test_facade_cannot_be_reused() {
    let (_coordinator, session) = setup();

    let mut tx = session.begin_transaction().unwrap();
    tx.commit().unwrap();
    assert!(matches!(
        tx.begin(),
        Err(TransactionError::InvalidState { .. })
    ));

    let mut rolled_back = session.begin_transaction().unwrap();
    rolled_back.rollback().unwrap();
    assert!(rolled_back.begin().is_err());
    assert!(rolled_back.rollback().is_err());
}

#[test]
fn test_rollback_before_begin_is_noop() {
    let (coordinator, session) = setup();

    let mut tx = session.transaction();
    assert!(tx.rollback().is_ok());
    assert_eq!(tx.state(), LocalState::NotStarted);
    assert!(!tx.was_rolled_back());
    assert_eq!(coordinator.completed_count().unwrap(), 0);

    // Still usable
    tx.begin().unwrap();
    tx.commit().unwrap();
    assert!(tx.was_committed());
}

#[test]
fn test_timeout_applies_only_when_initiating() {
    let (coordinator, session) = setup();

    let mut tx = session.transaction();
    tx.set_timeout(30);
    tx.begin().unwrap();
    let info = coordinator.transaction_info().unwrap().unwrap();
    assert_eq!(info.timeout_seconds, Some(30));
    tx.commit().unwrap();

    coordinator.begin().unwrap();
    let mut joiner = session.transaction();
    joiner.set_timeout(30);
    joiner.begin().unwrap();
    let info = coordinator.transaction_info().unwrap().unwrap();
    assert_eq!(info.timeout_seconds, None);
    joiner.commit().unwrap();
    coordinator.commit().unwrap();

    // Nothing left pending for the next transaction either
    coordinator.begin().unwrap();
    let info = coordinator.transaction_info().unwrap().unwrap();
    assert_eq!(info.timeout_seconds, None);
}

#[test]
fn test_timeout_after_begin_has_no_effect() {
    let (coordinator, session) = setup();

    let mut tx = session.begin_transaction().unwrap();
    tx.set_timeout(30);

    assert_eq!(tx.timeout(), Some(30));
    let info = coordinator.transaction_info().unwrap().unwrap();
    assert_eq!(info.timeout_seconds, None);
    tx.commit().unwrap();
}

#[test]
fn test_synchronizations_fire_in_registration_order() {
    let (coordinator, session) = setup();
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut tx = session.begin_transaction().unwrap();
    tx.register_synchronization(recorder("first", &log)).unwrap();
    tx.register_synchronization(recorder("second", &log)).unwrap();
    assert_eq!(tx.synchronization_count(), 2);
    assert_eq!(
        coordinator
            .transaction_info()
            .unwrap()
            .unwrap()
            .synchronization_count,
        2
    );

    tx.commit().unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "before:first",
            "before:second",
            "after:first:Committed",
            "after:second:Committed",
        ]
    );
}

#[test]
fn test_joiner_synchronizations_fire_on_outer_commit() {
    let (coordinator, session) = setup();
    let log = Arc::new(Mutex::new(Vec::new()));
    coordinator.begin().unwrap();

    let mut tx = session.begin_transaction().unwrap();
    tx.register_synchronization(recorder("joined", &log)).unwrap();
    tx.commit().unwrap();
    assert!(log.lock().unwrap().is_empty(), "facade never fires callbacks");

    coordinator.commit().unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["before:joined", "after:joined:Committed"]
    );
}

#[test]
fn test_register_without_transaction_fails() {
    let (_coordinator, session) = setup();
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut tx = session.transaction();
    let err = tx.register_synchronization(recorder("early", &log)).unwrap_err();
    assert!(matches!(err, TransactionError::SynchronizationFailed(_)));
    assert_eq!(tx.synchronization_count(), 0);
}

#[test]
fn test_register_after_completion_fails() {
    let (_coordinator, session) = setup();
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut tx = session.begin_transaction().unwrap();
    tx.commit().unwrap();
    assert!(matches!(
        tx.register_synchronization(recorder("late", &log)),
        Err(TransactionError::InvalidState { .. })
    ));
}

#[test]
fn test_failed_commit_rolls_back_initiated_transaction() {
    let (coordinator, session) = setup();
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut tx = session.begin_transaction().unwrap();
    tx.register_synchronization(Arc::new(Recorder {
        name: "guard",
        veto: true,
        log: log.clone(),
    }))
    .unwrap();

    let err = tx.commit().unwrap_err();
    assert!(matches!(
        err,
        TransactionError::CommitFailed {
            rolled_back: true,
            ..
        }
    ));
    assert!(tx.was_rolled_back());
    assert!(!tx.was_committed());
    assert!(!tx.is_active());
    assert_eq!(coordinator.status().unwrap(), ResourceStatus::NoTransaction);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["before:guard", "after:guard:RolledBack"]
    );
}

#[test]
fn test_external_rollback_is_not_reported_as_local() {
    let (coordinator, session) = setup();

    let mut tx = session.begin_transaction().unwrap();
    coordinator.force_rollback("reaper").unwrap();

    let err = tx.commit().unwrap_err();
    assert!(matches!(
        err,
        TransactionError::CommitFailed {
            rolled_back: false,
            ..
        }
    ));
    assert!(!tx.was_rolled_back(), "rollback was caused elsewhere");
    assert!(!tx.was_committed());
    assert!(!tx.is_active());
    assert_eq!(session.active_transaction(), None);
}

#[test]
fn test_begin_fails_when_coordinator_unavailable() {
    let (coordinator, session) = setup();
    coordinator.shutdown().unwrap();

    let mut tx = session.transaction();
    assert!(matches!(
        tx.begin(),
        Err(TransactionError::ResourceUnavailable(_))
    ));
    assert_eq!(tx.state(), LocalState::NotStarted);
    assert_eq!(session.active_transaction(), None);

    coordinator.restart().unwrap();
    tx.begin().unwrap();
    assert!(tx.is_active());
}

#[test]
fn test_joined_commit_raises_when_resource_is_gone() {
    let (coordinator, session) = setup();
    coordinator.begin().unwrap();

    let mut tx = session.begin_transaction().unwrap();
    coordinator.shutdown().unwrap();

    assert!(matches!(
        tx.commit(),
        Err(TransactionError::ResourceUnavailable(_))
    ));
    assert!(!tx.was_committed());
    assert!(!tx.is_active());
}

#[test]
fn test_joined_commit_raises_when_outer_transaction_ended() {
    let (coordinator, session) = setup();
    coordinator.begin().unwrap();

    let mut tx = session.begin_transaction().unwrap();
    assert_eq!(tx.ownership(), Ownership::Joiner);
    coordinator.force_rollback("reaper").unwrap();

    assert!(matches!(
        tx.commit(),
        Err(TransactionError::ResourceUnavailable(_))
    ));
    assert_eq!(tx.state(), LocalState::RolledBack);
    assert!(!tx.was_committed());
    assert!(!tx.was_rolled_back());
    assert_eq!(session.active_transaction(), None);
}

#[test]
fn test_coordinator_timeout_is_not_reported_as_local() {
    let (coordinator, session) = setup();
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut tx = session.transaction();
    tx.set_timeout(1);
    tx.begin().unwrap();
    tx.register_synchronization(recorder("watch", &log)).unwrap();

    std::thread::sleep(std::time::Duration::from_millis(1200));
    assert_eq!(coordinator.status().unwrap(), ResourceStatus::MarkedRollback);

    let err = tx.commit().unwrap_err();
    assert!(matches!(
        err,
        TransactionError::CommitFailed {
            rolled_back: false,
            ..
        }
    ));
    assert!(!tx.was_rolled_back(), "the coordinator rolled it back");
    assert!(!tx.was_committed());
    assert!(!tx.is_active());
    assert_eq!(coordinator.status().unwrap(), ResourceStatus::NoTransaction);
    assert_eq!(*log.lock().unwrap(), vec!["after:watch:RolledBack"]);
}

#[test]
fn test_dropping_active_facade_rolls_back() {
    let (coordinator, session) = setup();

    {
        let _tx = session.begin_transaction().unwrap();
        assert_eq!(coordinator.status().unwrap(), ResourceStatus::Active);
    }

    assert_eq!(coordinator.status().unwrap(), ResourceStatus::NoTransaction);
    assert_eq!(session.active_transaction(), None);
}

#[test]
fn test_commit_after_session_closed_fails() {
    let (coordinator, session) = setup();

    let mut tx = session.begin_transaction().unwrap();
    drop(session);

    assert!(matches!(
        tx.commit(),
        Err(TransactionError::ResourceUnavailable(_))
    ));
    assert!(tx.is_active());

    // Rollback does not need the session
    tx.rollback().unwrap();
    assert!(tx.was_rolled_back());
    assert_eq!(coordinator.status().unwrap(), ResourceStatus::NoTransaction);
}
