//! Main entry point for baton.
//!
//! This module provides the `Baton` struct, which opens a database and hands
//! out per-thread sessions.

use crate::error::Result;
use baton_core::{BoundaryConfig, Durability, StoreId, TraceLevel, VersionId};
use baton_engine::{Database, Session};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// An open baton database.
///
/// Cheap to clone; every clone refers to the same store. Each thread that
/// works with the database opens its own [`Session`].
///
/// # Example
///
/// ```ignore
/// use baton::prelude::*;
///
/// let db = Baton::in_memory()?;
/// let mut session = db.session();
/// session.begin_write()?;
/// let people = session.add_table("people")?;
/// session.commit()?;
/// ```
#[derive(Debug, Clone)]
pub struct Baton {
    inner: Arc<Database>,
}

impl Baton {
    /// Open a database at `path` with default settings
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::builder().path(path).open()
    }

    /// Open a database that keeps nothing on disk
    pub fn in_memory() -> Result<Self> {
        Self::from_config(BoundaryConfig::in_memory())
    }

    /// Open a database from an explicit configuration
    pub fn from_config(config: BoundaryConfig) -> Result<Self> {
        Ok(Self {
            inner: Database::open(config)?,
        })
    }

    /// Open a database from a TOML configuration file
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration");
        Self::from_config(BoundaryConfig::from_file(path)?)
    }

    /// Create a builder for database configuration
    pub fn builder() -> BatonBuilder {
        BatonBuilder::new()
    }

    /// Open a session for the calling thread
    pub fn session(&self) -> Session {
        self.inner.session()
    }

    /// Store identity
    pub fn id(&self) -> StoreId {
        self.inner.id()
    }

    /// Configuration the database was opened with
    pub fn config(&self) -> &BoundaryConfig {
        self.inner.config()
    }

    /// The engine database
    pub fn database(&self) -> &Arc<Database> {
        &self.inner
    }

    /// Get database metrics
    pub fn metrics(&self) -> BatonMetrics {
        let store = self.inner.store();
        let stats = self.inner.stats();
        BatonMetrics {
            engine_calls: stats.engine_calls(),
            commits: stats.commits(),
            versions_dropped: stats.versions_dropped(),
            pending_handovers: self.inner.pending_envelopes(),
            latest_version: store.latest_version(),
            oldest_version: store.oldest_version(),
        }
    }
}

/// Database metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatonMetrics {
    /// Primitives forwarded to the engine
    pub engine_calls: u64,
    /// Committed write transactions
    pub commits: u64,
    /// Versions removed by compaction
    pub versions_dropped: u64,
    /// Envelopes exported but not yet imported or closed
    pub pending_handovers: usize,
    /// Newest committed version
    pub latest_version: VersionId,
    /// Oldest retained version
    pub oldest_version: VersionId,
}

/// Builder for database configuration.
///
/// # Example
///
/// ```ignore
/// let db = Baton::builder()
///     .mem_only()
///     .trace_level(TraceLevel::Detail)
///     .history_retention(4)
///     .open()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct BatonBuilder {
    config: BoundaryConfig,
}

impl BatonBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: BoundaryConfig) -> Self {
        Self { config }
    }

    /// Set the store location
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.config = self.config.with_path(PathBuf::from(path.as_ref()));
        self
    }

    /// Set the 64-byte encryption key
    pub fn encryption_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.config = self.config.with_encryption_key(key.into());
        self
    }

    /// Set the durability level
    pub fn durability(mut self, durability: Durability) -> Self {
        self.config = self.config.with_durability(durability);
        self
    }

    /// Keep nothing on disk
    pub fn mem_only(self) -> Self {
        self.durability(Durability::MemOnly)
    }

    /// Set trace verbosity
    pub fn trace_level(mut self, level: TraceLevel) -> Self {
        self.config = self.config.with_trace_level(level);
        self
    }

    /// Number of recent versions compaction always keeps
    pub fn history_retention(mut self, versions: usize) -> Self {
        self.config = self.config.with_history_retention(versions);
        self
    }

    /// How long `begin_write` waits for the writer lock
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_write_timeout(timeout);
        self
    }

    /// The configuration built so far
    pub fn config(&self) -> &BoundaryConfig {
        &self.config
    }

    /// Open the database
    pub fn open(self) -> Result<Baton> {
        Baton::from_config(self.config)
    }
}
