use super::TransactionalResource;
use crate::connection::Connection;
use crate::core::{ResourceKind, ResourceStatus, Result};
use crate::transaction::Synchronization;
use std::sync::Arc;

/// Delegates to a connection-level transaction
#[derive(Debug, Clone)]
pub struct ConnectionResource {
    connection: Connection,
}

impl ConnectionResource {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

impl TransactionalResource for ConnectionResource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Connection
    }

    fn status(&self) -> Result<ResourceStatus> {
        self.connection.status()
    }

    fn begin(&self) -> Result<()> {
        self.connection.begin()
    }

    fn commit(&self) -> Result<()> {
        self.connection.commit()
    }

    fn rollback(&self) -> Result<()> {
        self.connection.rollback()
    }

    fn set_rollback_only(&self) -> Result<()> {
        self.connection.set_rollback_only()
    }

    fn register_synchronization(&self, synchronization: Arc<dyn Synchronization>) -> Result<()> {
        self.connection.register_synchronization(synchronization)
    }

    fn set_timeout(&self, seconds: u32) -> Result<()> {
        self.connection.set_transaction_timeout(seconds)
    }
}
