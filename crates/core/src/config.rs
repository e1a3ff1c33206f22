//! Configuration for opening a store
//!
//! Settings are explicit and passed in at initialization; nothing here is
//! global. The path, encryption key and durability level are handed to the
//! storage engine unchanged.
//!
//! # Example Configuration
//!
//! ```toml
//! path = "app.baton"
//! durability = "mem_only"
//! trace_level = "detail"
//! history_retention = 32
//! write_timeout_ms = 500
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Required length of an encryption key
pub const ENCRYPTION_KEY_LEN: usize = 64;

/// Default number of recent versions kept by compaction
pub const DEFAULT_HISTORY_RETENTION: usize = 16;

/// Durability level passed through to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    /// Every commit is made durable before it returns
    #[default]
    Full,
    /// Nothing is persisted
    MemOnly,
    /// Commits are persisted in the background
    Async,
}

/// Verbosity of boundary tracing
///
/// Levels are ordered: each one includes everything below it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TraceLevel {
    /// Failures only
    #[default]
    Errors,
    /// Entry into every boundary operation
    Enter,
    /// Per-step detail inside multi-step protocols
    Detail,
    /// Exit from every boundary operation
    Leave,
}

/// Settings for one store and the sessions that use it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// Store location; opaque to the boundary
    pub path: Option<PathBuf>,
    /// Encryption key; opaque to the boundary
    pub encryption_key: Option<Vec<u8>>,
    /// Durability level
    pub durability: Durability,
    /// Trace verbosity
    pub trace_level: TraceLevel,
    /// Number of most recent versions compaction always keeps
    pub history_retention: usize,
    /// How long `begin_write` waits for the writer lock; `None` waits forever
    pub write_timeout_ms: Option<u64>,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            path: None,
            encryption_key: None,
            durability: Durability::Full,
            trace_level: TraceLevel::Errors,
            history_retention: DEFAULT_HISTORY_RETENTION,
            write_timeout_ms: None,
        }
    }
}

impl BoundaryConfig {
    /// In-memory configuration with default settings
    pub fn in_memory() -> Self {
        Self {
            durability: Durability::MemOnly,
            ..Self::default()
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: BoundaryConfig =
            toml::from_str(content).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::File {
            kind: crate::error::FileErrorKind::from_io(e.kind()),
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Check the settings are consistent
    pub fn validate(&self) -> Result<()> {
        if let Some(key) = &self.encryption_key {
            if key.len() != ENCRYPTION_KEY_LEN {
                return Err(Error::illegal_argument(format!(
                    "Encryption key must be {} bytes, got {}",
                    ENCRYPTION_KEY_LEN,
                    key.len()
                )));
            }
        }
        if self.history_retention == 0 {
            return Err(Error::InvalidConfig(
                "history_retention must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Writer lock timeout as a duration
    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }

    /// Set the store path
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the encryption key
    pub fn with_encryption_key(mut self, key: Vec<u8>) -> Self {
        self.encryption_key = Some(key);
        self
    }

    /// Set the durability level
    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    /// Set the trace level
    pub fn with_trace_level(mut self, level: TraceLevel) -> Self {
        self.trace_level = level;
        self
    }

    /// Set the history retention
    pub fn with_history_retention(mut self, versions: usize) -> Self {
        self.history_retention = versions;
        self
    }

    /// Set the writer lock timeout
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }
}
