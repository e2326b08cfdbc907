use crate::core::{FlushMode, ResourceKind, Result, TransactionError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Session configuration
///
/// Picks the transaction strategy once, when the session is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Label used in logs
    pub name: String,

    /// Which resource the session's facades delegate to
    pub resource_kind: ResourceKind,

    /// Flush policy consulted on commit
    pub flush_mode: FlushMode,

    /// Timeout given to every new facade, in seconds
    pub default_timeout_seconds: Option<u32>,
}

impl SessionConfig {
    pub fn new(resource_kind: ResourceKind) -> Self {
        Self {
            resource_kind,
            ..Self::default()
        }
    }

    /// Set the session name
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Set the resource kind
    pub fn resource_kind(mut self, kind: ResourceKind) -> Self {
        self.resource_kind = kind;
        self
    }

    /// Set the flush mode
    pub fn flush_mode(mut self, mode: FlushMode) -> Self {
        self.flush_mode = mode;
        self
    }

    /// Set the default transaction timeout
    pub fn default_timeout(mut self, seconds: u32) -> Self {
        self.default_timeout_seconds = Some(seconds);
        self
    }

    /// Parse from a JSON document
    ///
    /// # Examples
    ///
    /// ```
    /// # use localtx::{SessionConfig, ResourceKind, FlushMode};
    /// let config = SessionConfig::from_json(
    ///     r#"{ "resource_kind": "coordinated", "flush_mode": "commit" }"#
    /// ).unwrap();
    /// assert_eq!(config.resource_kind, ResourceKind::Coordinated);
    /// assert_eq!(config.flush_mode, FlushMode::Commit);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| TransactionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| TransactionError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| TransactionError::Config(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(TransactionError::Config("name cannot be empty".into()));
        }

        if self.default_timeout_seconds == Some(0) {
            return Err(TransactionError::Config(
                "default_timeout_seconds must be > 0".into(),
            ));
        }

        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "session".to_string(),
            resource_kind: ResourceKind::default(),
            flush_mode: FlushMode::default(),
            default_timeout_seconds: None,
        }
    }
}
