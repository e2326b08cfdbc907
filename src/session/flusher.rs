use super::PendingChange;
use crate::core::Result;
use std::sync::{Arc, Mutex};

/// Writes a session's pending changes to the data store
pub trait Flusher: Send {
    fn flush(&mut self, changes: &[PendingChange]) -> Result<()>;
}

/// Keeps every flushed change in memory
///
/// Clones share the same log, so a caller can keep one clone and hand
/// another to the session.
#[derive(Debug, Clone, Default)]
pub struct RecordingFlusher {
    flushed: Arc<Mutex<Vec<PendingChange>>>,
}

impl RecordingFlusher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flushed(&self) -> Result<Vec<PendingChange>> {
        Ok(self.flushed.lock()?.clone())
    }
}

impl Flusher for RecordingFlusher {
    fn flush(&mut self, changes: &[PendingChange]) -> Result<()> {
        self.flushed.lock()?.extend_from_slice(changes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_log() {
        let flusher = RecordingFlusher::new();
        let mut handle = flusher.clone();

        handle.flush(&[PendingChange::insert("users", "1")]).unwrap();
        assert_eq!(flusher.flushed().unwrap().len(), 1);
    }
}
