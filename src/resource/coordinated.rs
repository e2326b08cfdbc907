use super::TransactionalResource;
use crate::core::{ResourceKind, ResourceStatus, Result};
use crate::transaction::{Synchronization, TransactionCoordinator};
use std::sync::Arc;

/// Delegates to a shared `TransactionCoordinator`
#[derive(Debug, Clone)]
pub struct CoordinatedResource {
    coordinator: Arc<TransactionCoordinator>,
}

impl CoordinatedResource {
    pub fn new(coordinator: Arc<TransactionCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<TransactionCoordinator> {
        &self.coordinator
    }
}

impl TransactionalResource for CoordinatedResource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Coordinated
    }

    fn status(&self) -> Result<ResourceStatus> {
        self.coordinator.status()
    }

    fn begin(&self) -> Result<()> {
        self.coordinator.begin().map(|_| ())
    }

    fn commit(&self) -> Result<()> {
        self.coordinator.commit()
    }

    fn rollback(&self) -> Result<()> {
        self.coordinator.rollback()
    }

    fn set_rollback_only(&self) -> Result<()> {
        self.coordinator.set_rollback_only()
    }

    fn register_synchronization(&self, synchronization: Arc<dyn Synchronization>) -> Result<()> {
        self.coordinator.register_synchronization(synchronization)
    }

    fn set_timeout(&self, seconds: u32) -> Result<()> {
        self.coordinator.set_transaction_timeout(seconds)
    }
}
