//! Versioned shared store
//!
//! [`SharedStore`] is the engine every transaction context talks to. It keeps
//! a bounded history of immutable snapshots, one per committed version,
//! together with the change log that produced them.
//!
//! # Concurrency
//!
//! - History: `RwLock`; pins, commits and compaction take it exclusively
//! - Writer: a single-holder slot guarded by a `Mutex` + `Condvar`
//! - Counters: atomics, readable without locking
//!
//! # Compaction
//!
//! After every commit and every unpin, versions that are not the latest,
//! not pinned by any read transaction and not among the `history_retention`
//! most recent versions are dropped. Change log entries are kept while any
//! retained version may still need to replay them.

use crate::changeset::Changeset;
use crate::group::Group;
use baton_core::{BoundaryConfig, ContextId, Error, Result, StoreId, VersionId};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Counters describing how the store has been used
#[derive(Debug, Default)]
pub struct EngineStats {
    engine_calls: AtomicU64,
    commits: AtomicU64,
    versions_dropped: AtomicU64,
}

impl EngineStats {
    /// Record one forwarded engine primitive
    #[inline]
    pub fn record_call(&self) {
        self.engine_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of engine primitives forwarded so far
    pub fn engine_calls(&self) -> u64 {
        self.engine_calls.load(Ordering::Relaxed)
    }

    /// Number of commits
    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    /// Number of versions removed by compaction
    pub fn versions_dropped(&self) -> u64 {
        self.versions_dropped.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct History {
    snapshots: BTreeMap<VersionId, Arc<Group>>,
    changes: BTreeMap<VersionId, Arc<Changeset>>,
    pins: BTreeMap<VersionId, usize>,
    latest: VersionId,
}

/// Store shared by every context of one database
#[derive(Debug)]
pub struct SharedStore {
    id: StoreId,
    config: BoundaryConfig,
    history: RwLock<History>,
    writer: Mutex<Option<ContextId>>,
    writer_released: Condvar,
    next_context: AtomicU64,
    stats: EngineStats,
}

impl SharedStore {
    /// Open an empty store
    ///
    /// The path, encryption key and durability level are kept as given.
    pub fn open(config: BoundaryConfig) -> Result<Self> {
        config.validate()?;
        let mut snapshots = BTreeMap::new();
        snapshots.insert(VersionId::INITIAL, Arc::new(Group::new()));
        let id = StoreId::new();
        debug!(
            store = %id,
            path = ?config.path,
            durability = ?config.durability,
            "Opened store"
        );
        Ok(Self {
            id,
            config,
            history: RwLock::new(History {
                snapshots,
                changes: BTreeMap::new(),
                pins: BTreeMap::new(),
                latest: VersionId::INITIAL,
            }),
            writer: Mutex::new(None),
            writer_released: Condvar::new(),
            next_context: AtomicU64::new(1),
            stats: EngineStats::default(),
        })
    }

    /// Identity of this store
    pub fn id(&self) -> StoreId {
        self.id
    }

    /// Configuration the store was opened with
    pub fn config(&self) -> &BoundaryConfig {
        &self.config
    }

    /// Usage counters
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Allocate an identity for a new transaction context
    pub fn next_context_id(&self) -> ContextId {
        ContextId(self.next_context.fetch_add(1, Ordering::Relaxed))
    }

    /// Most recent committed version
    pub fn latest_version(&self) -> VersionId {
        self.history.read().latest
    }

    /// Oldest version still retained
    pub fn oldest_version(&self) -> VersionId {
        let history = self.history.read();
        history
            .snapshots
            .keys()
            .next()
            .copied()
            .unwrap_or(history.latest)
    }

    /// Every retained version, oldest first
    pub fn retained_versions(&self) -> Vec<VersionId> {
        self.history.read().snapshots.keys().copied().collect()
    }

    /// Number of live pins on `version`
    pub fn pin_count(&self, version: VersionId) -> usize {
        self.history.read().pins.get(&version).copied().unwrap_or(0)
    }

    /// Whether `version` can still be read
    pub fn is_retained(&self, version: VersionId) -> bool {
        self.history.read().snapshots.contains_key(&version)
    }

    fn unavailable(history: &History, version: VersionId) -> Error {
        let reason = if version > history.latest {
            format!("latest version is {}", history.latest)
        } else {
            let oldest = history.snapshots.keys().next().copied().unwrap_or(history.latest);
            format!("it has been compacted (oldest retained is {})", oldest)
        };
        Error::BadVersion {
            requested: version,
            reason,
        }
    }

    /// Pin a version for reading; `None` pins the latest
    pub fn pin(&self, at: Option<VersionId>) -> Result<(VersionId, Arc<Group>)> {
        let mut history = self.history.write();
        let version = at.unwrap_or(history.latest);
        let group = history
            .snapshots
            .get(&version)
            .cloned()
            .ok_or_else(|| Self::unavailable(&history, version))?;
        *history.pins.entry(version).or_insert(0) += 1;
        trace!(store = %self.id, version = %version, "Pinned version");
        Ok((version, group))
    }

    /// Release one pin taken by [`SharedStore::pin`]
    pub fn unpin(&self, version: VersionId) {
        let mut history = self.history.write();
        let remaining = match history.pins.get_mut(&version) {
            Some(count) => {
                *count -= 1;
                *count
            }
            None => {
                debug!(store = %self.id, version = %version, "Unpin of a version that was not pinned");
                return;
            }
        };
        if remaining == 0 {
            history.pins.remove(&version);
        }
        trace!(store = %self.id, version = %version, "Unpinned version");
        self.compact_locked(&mut history);
    }

    /// Snapshot of a retained version without pinning it
    pub fn snapshot(&self, version: VersionId) -> Result<Arc<Group>> {
        let history = self.history.read();
        history
            .snapshots
            .get(&version)
            .cloned()
            .ok_or_else(|| Self::unavailable(&history, version))
    }

    /// Take the single-writer slot, waiting up to `timeout`
    ///
    /// `None` waits until the slot is free.
    pub fn acquire_writer(&self, context: ContextId, timeout: Option<Duration>) -> Result<()> {
        let started = Instant::now();
        let mut holder = self.writer.lock();
        if *holder == Some(context) {
            return Err(Error::invalid_state(format!(
                "{} already holds the write lock",
                context
            )));
        }
        while holder.is_some() {
            match timeout {
                None => self.writer_released.wait(&mut holder),
                Some(timeout) => {
                    let deadline = started + timeout;
                    if self
                        .writer_released
                        .wait_until(&mut holder, deadline)
                        .timed_out()
                        && holder.is_some()
                    {
                        return Err(Error::WriterBusy {
                            waited_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                }
            }
        }
        *holder = Some(context);
        debug!(store = %self.id, context = %context, "Acquired write lock");
        Ok(())
    }

    /// Give the single-writer slot back
    pub fn release_writer(&self, context: ContextId) {
        let mut holder = self.writer.lock();
        if *holder == Some(context) {
            *holder = None;
            self.writer_released.notify_one();
            debug!(store = %self.id, context = %context, "Released write lock");
        }
    }

    /// Context currently holding the write lock
    pub fn writer(&self) -> Option<ContextId> {
        *self.writer.lock()
    }

    /// Publish `group` as the next version
    ///
    /// The caller must hold the write lock and must have started from the
    /// latest version. With `keep_pinned` the new version is pinned before the
    /// history lock is released.
    pub fn commit(
        &self,
        context: ContextId,
        base: VersionId,
        group: Group,
        keep_pinned: bool,
    ) -> Result<VersionId> {
        if self.writer() != Some(context) {
            return Err(Error::invalid_state(format!(
                "{} does not hold the write lock",
                context
            )));
        }
        let mut history = self.history.write();
        if base != history.latest {
            return Err(Error::internal(format!(
                "write transaction based on {} but latest is {}",
                base, history.latest
            )));
        }
        let previous = history
            .snapshots
            .get(&base)
            .cloned()
            .ok_or_else(|| Error::internal(format!("latest version {} missing", base)))?;
        let version = base.next();
        let changes = Changeset::between(version, &previous, &group);
        history.snapshots.insert(version, Arc::new(group));
        history.changes.insert(version, Arc::new(changes));
        history.latest = version;
        if keep_pinned {
            *history.pins.entry(version).or_insert(0) += 1;
        }
        self.stats.commits.fetch_add(1, Ordering::Relaxed);
        debug!(
            store = %self.id,
            context = %context,
            version = %version,
            durability = ?self.config.durability,
            "Committed"
        );
        self.compact_locked(&mut history);
        Ok(version)
    }

    /// Change log entries for every version in `(from, to]`, oldest first
    pub fn changes_between(&self, from: VersionId, to: VersionId) -> Result<Vec<Arc<Changeset>>> {
        if to < from {
            return Err(Error::BadVersion {
                requested: to,
                reason: format!("cannot move back from {}", from),
            });
        }
        if to == from {
            return Ok(Vec::new());
        }
        let history = self.history.read();
        let changes: Vec<Arc<Changeset>> = history
            .changes
            .range(from.next()..=to)
            .map(|(_, c)| Arc::clone(c))
            .collect();
        if changes.len() as u64 != to.as_u64() - from.as_u64() {
            return Err(Error::BadVersion {
                requested: from,
                reason: "its change log has been compacted".to_string(),
            });
        }
        Ok(changes)
    }

    /// Drop every version compaction may drop; returns how many were dropped
    pub fn compact(&self) -> usize {
        let mut history = self.history.write();
        self.compact_locked(&mut history)
    }

    fn compact_locked(&self, history: &mut History) -> usize {
        let keep = self.config.history_retention.max(1) as u64;
        let floor = history.latest.as_u64().saturating_sub(keep - 1);
        let doomed: Vec<VersionId> = history
            .snapshots
            .keys()
            .copied()
            .filter(|v| {
                v.as_u64() < floor && *v != history.latest && !history.pins.contains_key(v)
            })
            .collect();
        for version in &doomed {
            history.snapshots.remove(version);
        }
        if let Some(&oldest) = history.snapshots.keys().next() {
            history.changes.retain(|v, _| *v > oldest);
        }
        if !doomed.is_empty() {
            self.stats
                .versions_dropped
                .fetch_add(doomed.len() as u64, Ordering::Relaxed);
            trace!(store = %self.id, dropped = doomed.len(), "Compacted history");
        }
        doomed.len()
    }
}
