// ============================================================================
// Pending Changes
// ============================================================================
//
// Work a session has queued but not yet flushed. The session hands these to
// its Flusher when a facade commits.
//
// ============================================================================

use serde::{Deserialize, Serialize};

/// A single queued change to one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingChange {
    Insert { entity: String, key: String },
    Update { entity: String, key: String },
    Delete { entity: String, key: String },
}

impl PendingChange {
    pub fn insert(entity: &str, key: &str) -> Self {
        Self::Insert {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }

    pub fn update(entity: &str, key: &str) -> Self {
        Self::Update {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }

    pub fn delete(entity: &str, key: &str) -> Self {
        Self::Delete {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }

    /// Get the entity name affected by this change
    pub fn entity(&self) -> &str {
        match self {
            PendingChange::Insert { entity, .. } => entity,
            PendingChange::Update { entity, .. } => entity,
            PendingChange::Delete { entity, .. } => entity,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            PendingChange::Insert { key, .. } => key,
            PendingChange::Update { key, .. } => key,
            PendingChange::Delete { key, .. } => key,
        }
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, PendingChange::Delete { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_accessors() {
        let change = PendingChange::update("users", "42");
        assert_eq!(change.entity(), "users");
        assert_eq!(change.key(), "42");
        assert!(!change.is_removal());
        assert!(PendingChange::delete("users", "42").is_removal());
    }
}
