//! Thread-confined transaction context
//!
//! A [`TransactionContext`] owns one read/write snapshot lifecycle over a
//! [`SharedStore`]:
//!
//! ```text
//! Idle --begin_read[@v]--> ReadPinned(v) --end_read--> Idle
//! Idle --begin_write--> WritePending(base) --commit | rollback--> Idle
//! ReadPinned(v) --promote_to_write--> WritePending(latest)
//! WritePending --commit_and_continue_as_read--> ReadPinned(new)
//! WritePending --rollback_and_continue_as_read--> ReadPinned(base)
//! ReadPinned(v) --advance_read(to v' >= v)--> ReadPinned(v')
//! ```
//!
//! Every other transition fails with `InvalidTransition`. The context's
//! `epoch` changes whenever a transaction starts or ends; advancing,
//! promoting and continuing keep it, so accessors bound to the context stay
//! attached across those.
//!
//! A context is `Send` but not `Sync`: it may move between threads but is
//! never shared.

use baton_core::{ContextId, Error, Result, TableKey, VersionId};
use baton_storage::{ChangeSummary, Group, SharedStore};
use std::cell::Cell;
use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Lifecycle state of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// No transaction open
    Idle,
    /// Read transaction pinned to a version
    ReadPinned(VersionId),
    /// Write transaction started from a base version
    WritePending(VersionId),
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Idle => write!(f, "idle"),
            TransactionState::ReadPinned(v) => write!(f, "reading at {}", v),
            TransactionState::WritePending(v) => write!(f, "writing on {}", v),
        }
    }
}

/// What changed while a read transaction moved forward
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvanceReport {
    /// Version before the advance
    pub from: VersionId,
    /// Version after the advance
    pub to: VersionId,
    /// Tables removed in `(from, to]`
    pub removed_tables: BTreeSet<TableKey>,
    /// Tables whose schema changed in `(from, to]`
    pub schema_changed: BTreeSet<TableKey>,
}

impl AdvanceReport {
    fn unchanged(version: VersionId) -> Self {
        Self {
            from: version,
            to: version,
            removed_tables: BTreeSet::new(),
            schema_changed: BTreeSet::new(),
        }
    }

    fn from_summary(from: VersionId, to: VersionId, summary: ChangeSummary) -> Self {
        Self {
            from,
            to,
            removed_tables: summary.removed_tables,
            schema_changed: summary.schema_changed,
        }
    }

    /// Whether the version moved
    pub fn moved(&self) -> bool {
        self.from != self.to
    }

    /// Whether objects bound to `table` are invalid after the advance
    pub fn invalidates(&self, table: TableKey) -> bool {
        self.removed_tables.contains(&table) || self.schema_changed.contains(&table)
    }
}

/// One thread's transaction lifecycle over a shared store
pub struct TransactionContext {
    id: ContextId,
    store: Arc<SharedStore>,
    state: TransactionState,
    snapshot: Option<Arc<Group>>,
    working: Option<Group>,
    epoch: u64,
    last_version: Option<VersionId>,
    write_timeout: Option<Duration>,
    _not_sync: PhantomData<Cell<()>>,
}

impl TransactionContext {
    /// Create an idle context over `store`
    pub fn new(store: Arc<SharedStore>) -> Self {
        let id = store.next_context_id();
        let write_timeout = store.config().write_timeout();
        trace!(context = %id, store = %store.id(), "Created context");
        Self {
            id,
            store,
            state: TransactionState::Idle,
            snapshot: None,
            working: None,
            epoch: 0,
            last_version: None,
            write_timeout,
            _not_sync: PhantomData,
        }
    }

    /// Identity of this context
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Store this context reads from
    pub fn store(&self) -> &Arc<SharedStore> {
        &self.store
    }

    /// Current state
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Counter that changes whenever a transaction starts or ends
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Version of the current transaction, or of the last one
    pub fn version(&self) -> Option<VersionId> {
        match self.state {
            TransactionState::ReadPinned(v) | TransactionState::WritePending(v) => Some(v),
            TransactionState::Idle => self.last_version,
        }
    }

    /// Whether a read or write transaction is open
    pub fn is_in_transaction(&self) -> bool {
        self.state != TransactionState::Idle
    }

    /// Whether a write transaction is open
    pub fn is_writing(&self) -> bool {
        matches!(self.state, TransactionState::WritePending(_))
    }

    /// Whether the store has a newer version than this context has seen
    pub fn has_changed(&self) -> bool {
        match self.version() {
            Some(version) => self.store.latest_version() > version,
            None => true,
        }
    }

    fn transition_error(&self, operation: &'static str) -> Error {
        Error::InvalidTransition {
            operation,
            state: self.state.to_string(),
        }
    }

    /// Snapshot visible to the open transaction
    pub fn group(&self) -> Result<&Group> {
        match (&self.state, &self.snapshot, &self.working) {
            (TransactionState::ReadPinned(_), Some(snapshot), _) => Ok(snapshot.as_ref()),
            (TransactionState::WritePending(_), _, Some(working)) => Ok(working),
            _ => Err(Error::invalid_state("No transaction is open")),
        }
    }

    /// Mutable snapshot of the open write transaction
    pub fn group_mut(&mut self) -> Result<&mut Group> {
        match (&self.state, self.working.as_mut()) {
            (TransactionState::WritePending(_), Some(working)) => Ok(working),
            _ => Err(Error::invalid_state(
                "Cannot modify managed objects outside of a write transaction.",
            )),
        }
    }

    /// Fail unless a write transaction is open
    pub fn require_writable(&self) -> Result<()> {
        if self.is_writing() {
            Ok(())
        } else {
            Err(Error::invalid_state(
                "Cannot modify managed objects outside of a write transaction.",
            ))
        }
    }

    fn enter_read(&mut self, version: VersionId, snapshot: Arc<Group>) {
        self.state = TransactionState::ReadPinned(version);
        self.snapshot = Some(snapshot);
        self.working = None;
        self.last_version = Some(version);
    }

    fn enter_idle(&mut self) {
        self.state = TransactionState::Idle;
        self.snapshot = None;
        self.working = None;
        self.epoch += 1;
    }

    /// Start a read transaction at `at`, or at the latest version
    pub fn begin_read(&mut self, at: Option<VersionId>) -> Result<VersionId> {
        if self.state != TransactionState::Idle {
            return Err(self.transition_error("begin_read"));
        }
        let (version, snapshot) = self.store.pin(at)?;
        self.enter_read(version, snapshot);
        self.epoch += 1;
        debug!(context = %self.id, version = %version, "Began read");
        Ok(version)
    }

    /// End the open read transaction
    pub fn end_read(&mut self) -> Result<()> {
        let TransactionState::ReadPinned(version) = self.state else {
            return Err(self.transition_error("end_read"));
        };
        self.store.unpin(version);
        self.enter_idle();
        debug!(context = %self.id, version = %version, "Ended read");
        Ok(())
    }

    /// Move the open read transaction forward to `to`, or to the latest version
    ///
    /// Moving backwards or to a version that is no longer retained fails with
    /// `BadVersion` and leaves the transaction where it was.
    pub fn advance_read(&mut self, to: Option<VersionId>) -> Result<AdvanceReport> {
        let TransactionState::ReadPinned(current) = self.state else {
            return Err(self.transition_error("advance_read"));
        };
        let target = to.unwrap_or_else(|| self.store.latest_version());
        if target < current {
            return Err(Error::BadVersion {
                requested: target,
                reason: format!("{} is already reading at {}", self.id, current),
            });
        }
        if target == current {
            return Ok(AdvanceReport::unchanged(current));
        }
        let changes = self.store.changes_between(current, target)?;
        let (version, snapshot) = self.store.pin(Some(target))?;
        self.store.unpin(current);
        self.enter_read(version, snapshot);
        let report = AdvanceReport::from_summary(
            current,
            version,
            ChangeSummary::collect(changes.iter().map(|c| c.as_ref())),
        );
        debug!(
            context = %self.id,
            from = %current,
            to = %version,
            removed = report.removed_tables.len(),
            reshaped = report.schema_changed.len(),
            "Advanced read"
        );
        Ok(report)
    }

    /// Start a write transaction on the latest version
    ///
    /// Waits for the single-writer lock up to the configured timeout.
    pub fn begin_write(&mut self) -> Result<VersionId> {
        if self.state != TransactionState::Idle {
            return Err(self.transition_error("begin_write"));
        }
        let lock = WriterLock::acquire(&self.store, self.id, self.write_timeout)?;
        let base = self.store.latest_version();
        let snapshot = self.store.snapshot(base)?;
        lock.keep();
        self.state = TransactionState::WritePending(base);
        self.working = Some(snapshot.as_ref().clone());
        self.snapshot = None;
        self.last_version = Some(base);
        self.epoch += 1;
        debug!(context = %self.id, version = %base, "Began write");
        Ok(base)
    }

    /// Turn the open read transaction into a write transaction
    ///
    /// Advances to the latest version first; accessors stay attached. On
    /// failure the read stays open where it was.
    pub fn promote_to_write(&mut self) -> Result<AdvanceReport> {
        let TransactionState::ReadPinned(current) = self.state else {
            return Err(self.transition_error("promote_to_write"));
        };
        let lock = WriterLock::acquire(&self.store, self.id, self.write_timeout)?;
        let latest = self.store.latest_version();
        let changes = self.store.changes_between(current, latest)?;
        let snapshot = self.store.snapshot(latest)?;
        lock.keep();
        self.store.unpin(current);
        self.state = TransactionState::WritePending(latest);
        self.working = Some(snapshot.as_ref().clone());
        self.snapshot = None;
        self.last_version = Some(latest);
        debug!(context = %self.id, from = %current, to = %latest, "Promoted to write");
        Ok(AdvanceReport::from_summary(
            current,
            latest,
            ChangeSummary::collect(changes.iter().map(|c| c.as_ref())),
        ))
    }

    fn finish_write(&mut self, operation: &'static str, keep_pinned: bool) -> Result<VersionId> {
        let TransactionState::WritePending(base) = self.state else {
            return Err(self.transition_error(operation));
        };
        let working = self.working.take().unwrap_or_default();
        let committed = self.store.commit(self.id, base, working, keep_pinned);
        self.store.release_writer(self.id);
        match committed {
            Ok(version) => {
                self.last_version = Some(version);
                Ok(version)
            }
            Err(e) => {
                self.enter_idle();
                Err(e)
            }
        }
    }

    /// Publish the write transaction and return to idle
    pub fn commit(&mut self) -> Result<VersionId> {
        let version = self.finish_write("commit", false)?;
        self.enter_idle();
        debug!(context = %self.id, version = %version, "Committed write");
        Ok(version)
    }

    /// Publish the write transaction and keep reading at the new version
    pub fn commit_and_continue_as_read(&mut self) -> Result<VersionId> {
        let version = self.finish_write("commit_and_continue_as_read", true)?;
        match self.store.snapshot(version) {
            Ok(snapshot) => {
                self.enter_read(version, snapshot);
                debug!(context = %self.id, version = %version, "Committed, continuing as read");
                Ok(version)
            }
            Err(e) => {
                self.store.unpin(version);
                self.enter_idle();
                Err(e)
            }
        }
    }

    /// Discard the write transaction and return to idle
    pub fn rollback(&mut self) -> Result<()> {
        let TransactionState::WritePending(base) = self.state else {
            return Err(self.transition_error("rollback"));
        };
        self.store.release_writer(self.id);
        self.enter_idle();
        debug!(context = %self.id, version = %base, "Rolled back write");
        Ok(())
    }

    /// Discard the write transaction and keep reading at its base version
    pub fn rollback_and_continue_as_read(&mut self) -> Result<VersionId> {
        let TransactionState::WritePending(base) = self.state else {
            return Err(self.transition_error("rollback_and_continue_as_read"));
        };
        // Pin before releasing the writer so no commit can slip in between.
        let pinned = self.store.pin(Some(base));
        self.store.release_writer(self.id);
        match pinned {
            Ok((version, snapshot)) => {
                self.enter_read(version, snapshot);
                debug!(context = %self.id, version = %version, "Rolled back, continuing as read");
                Ok(version)
            }
            Err(e) => {
                self.enter_idle();
                Err(e)
            }
        }
    }
}

/// Writer lock held while a write transaction is being set up
///
/// Released on drop, including on early return or unwind, unless
/// [`WriterLock::keep`] hands it over to the context.
struct WriterLock<'s> {
    store: &'s SharedStore,
    owner: ContextId,
    held: bool,
}

impl<'s> WriterLock<'s> {
    fn acquire(store: &'s SharedStore, owner: ContextId, timeout: Option<Duration>) -> Result<Self> {
        store.acquire_writer(owner, timeout)?;
        Ok(Self {
            store,
            owner,
            held: true,
        })
    }

    fn keep(mut self) {
        self.held = false;
    }
}

impl Drop for WriterLock<'_> {
    fn drop(&mut self) {
        if self.held {
            self.store.release_writer(self.owner);
        }
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("id", &self.id)
            .field("store", &self.store.id())
            .field("state", &self.state)
            .field("epoch", &self.epoch)
            .finish()
    }
}

impl Drop for TransactionContext {
    fn drop(&mut self) {
        match self.state {
            TransactionState::ReadPinned(version) => self.store.unpin(version),
            TransactionState::WritePending(_) => self.store.release_writer(self.id),
            TransactionState::Idle => {}
        }
    }
}
