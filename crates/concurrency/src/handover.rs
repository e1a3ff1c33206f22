//! Cross-thread handover of snapshot-bound objects
//!
//! Queries, rows and result views are bound to the snapshot of the context
//! that created them. To use one on another thread it is exported into a
//! [`HandoverEnvelope`], which records the payload, the version it was
//! exported at and the store it came from. Importing the envelope into a
//! second context first brings that context to the envelope's version and
//! then rebinds the payload to the context's snapshot.
//!
//! Envelopes are move-only and do not pin their version: if the version is
//! compacted before the import, the import fails with `BadVersion`.
//!
//! ```text
//! export(ctx@V, Borrowed(&query))  -> envelope{Query, V, Copy}
//! import(worker, envelope)         -> worker at V, query rebound
//! ```

use crate::context::{TransactionContext, TransactionState};
use baton_core::{Error, HandoverPolicy, Result, StoreId, TableKey, VersionId};
use baton_storage::{Group, Query, Table, TableView};
use tracing::trace;

/// Location of one row, bound to a table schema
///
/// The locator follows its row by id, so it stays on the same row when
/// earlier rows are inserted or removed, and detaches once the row itself
/// is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowLocator {
    /// Table the row lives in
    pub table: TableKey,
    /// Schema epoch of the table when the locator was made
    pub schema_epoch: u64,
    /// Id of the row within its table
    pub row_id: u64,
    /// Row index when the locator was made
    pub row: usize,
}

impl RowLocator {
    /// Locate `row` in `table`
    ///
    /// `row` must be a valid index of `table`.
    pub fn new(table: &Table, row: usize) -> Self {
        Self {
            table: table.key(),
            schema_epoch: table.schema_epoch(),
            row_id: table.row_id(row).unwrap_or(u64::MAX),
            row,
        }
    }

    /// Current index of the row in `table`, if it is still there
    pub fn index_in(&self, table: &Table) -> Option<usize> {
        if table.key() != self.table || table.schema_epoch() != self.schema_epoch {
            return None;
        }
        table.find_row(self.row_id, self.row)
    }

    /// Whether the row still exists with the same schema
    pub fn is_attached(&self, group: &Group) -> bool {
        group
            .table(self.table)
            .and_then(|t| self.index_in(t))
            .is_some()
    }
}

/// Frozen, snapshot-independent form of a handed-over object
#[derive(Debug, Clone, PartialEq)]
pub enum HandoverPayload {
    /// A query
    Query(Query),
    /// A row
    Row(RowLocator),
    /// A result view
    View(TableView),
}

impl HandoverPayload {
    /// Name of the payload kind
    pub fn kind_name(&self) -> &'static str {
        match self {
            HandoverPayload::Query(_) => "Query",
            HandoverPayload::Row(_) => "Row",
            HandoverPayload::View(_) => "TableView",
        }
    }

    /// Table the payload is bound to
    pub fn table(&self) -> TableKey {
        match self {
            HandoverPayload::Query(q) => q.table(),
            HandoverPayload::Row(r) => r.table,
            HandoverPayload::View(v) => v.table(),
        }
    }

    fn schema_epoch(&self) -> u64 {
        match self {
            HandoverPayload::Query(q) => q.schema_epoch(),
            HandoverPayload::Row(r) => r.schema_epoch,
            HandoverPayload::View(v) => v.schema_epoch(),
        }
    }

    /// Check the payload against a snapshot
    ///
    /// Fails with `Detached` when the table is gone, its schema changed, or
    /// (for rows) the row no longer exists.
    pub fn check(&self, group: &Group) -> Result<()> {
        let subject = self.kind_name();
        let table = group.table(self.table()).ok_or(Error::detached(subject))?;
        if table.schema_epoch() != self.schema_epoch() {
            return Err(Error::detached(subject));
        }
        if let HandoverPayload::Row(locator) = self {
            if locator.index_in(table).is_none() {
                return Err(Error::detached(subject));
            }
        }
        Ok(())
    }
}

/// Object that can be moved between contexts
pub trait Handover: Sized {
    /// Payload kind name
    const KIND: &'static str;

    /// Freeze a borrowed object, leaving it usable
    fn freeze(&self) -> HandoverPayload;

    /// Freeze an owned object, consuming it
    fn into_payload(self) -> HandoverPayload {
        self.freeze()
    }

    /// Take the object back out of a payload of the right kind
    fn thaw(payload: HandoverPayload) -> std::result::Result<Self, HandoverPayload>;
}

impl Handover for Query {
    const KIND: &'static str = "Query";

    fn freeze(&self) -> HandoverPayload {
        HandoverPayload::Query(self.clone())
    }

    fn into_payload(self) -> HandoverPayload {
        HandoverPayload::Query(self)
    }

    fn thaw(payload: HandoverPayload) -> std::result::Result<Self, HandoverPayload> {
        match payload {
            HandoverPayload::Query(q) => Ok(q),
            other => Err(other),
        }
    }
}

impl Handover for RowLocator {
    const KIND: &'static str = "Row";

    fn freeze(&self) -> HandoverPayload {
        HandoverPayload::Row(*self)
    }

    fn thaw(payload: HandoverPayload) -> std::result::Result<Self, HandoverPayload> {
        match payload {
            HandoverPayload::Row(r) => Ok(r),
            other => Err(other),
        }
    }
}

impl Handover for TableView {
    const KIND: &'static str = "TableView";

    fn freeze(&self) -> HandoverPayload {
        HandoverPayload::View(self.clone())
    }

    fn into_payload(self) -> HandoverPayload {
        HandoverPayload::View(self)
    }

    fn thaw(payload: HandoverPayload) -> std::result::Result<Self, HandoverPayload> {
        match payload {
            HandoverPayload::View(v) => Ok(v),
            other => Err(other),
        }
    }
}

/// Source of an export
///
/// `Borrowed` exports with Copy semantics and leaves the source usable;
/// `Owned` exports with Move semantics and consumes it.
#[derive(Debug)]
pub enum Source<'a, T> {
    /// Copy out of a borrowed object
    Borrowed(&'a T),
    /// Move an owned object
    Owned(T),
}

impl<T: Handover> Source<'_, T> {
    /// Policy this source exports with
    pub fn policy(&self) -> HandoverPolicy {
        match self {
            Source::Borrowed(_) => HandoverPolicy::Copy,
            Source::Owned(_) => HandoverPolicy::Move,
        }
    }

    fn into_payload(self) -> HandoverPayload {
        match self {
            Source::Borrowed(object) => object.freeze(),
            Source::Owned(object) => object.into_payload(),
        }
    }
}

/// Single-use transport of one object between contexts
///
/// Not `Clone`: importing consumes the envelope.
#[derive(Debug)]
pub struct HandoverEnvelope {
    payload: HandoverPayload,
    version: VersionId,
    store: StoreId,
    policy: HandoverPolicy,
}

impl HandoverEnvelope {
    /// Version the payload was exported at
    pub fn version(&self) -> VersionId {
        self.version
    }

    /// Store the payload was exported from
    pub fn store(&self) -> StoreId {
        self.store
    }

    /// Policy the payload was exported with
    pub fn policy(&self) -> HandoverPolicy {
        self.policy
    }

    /// Frozen payload
    pub fn payload(&self) -> &HandoverPayload {
        &self.payload
    }

    /// Payload kind name
    pub fn kind_name(&self) -> &'static str {
        self.payload.kind_name()
    }

    /// Whether the payload is a query
    pub fn is_query(&self) -> bool {
        matches!(self.payload, HandoverPayload::Query(_))
    }

    /// Take the payload out, discarding the envelope metadata
    pub fn into_payload(self) -> HandoverPayload {
        self.payload
    }
}

/// Export an object bound to `context`'s read snapshot
///
/// The context must be reading; uncommitted write state cannot be handed
/// over.
pub fn export<T: Handover>(context: &TransactionContext, source: Source<'_, T>) -> Result<HandoverEnvelope> {
    let TransactionState::ReadPinned(version) = context.state() else {
        return Err(Error::invalid_state(format!(
            "Can only export {} from a read transaction (context is {})",
            T::KIND,
            context.state()
        )));
    };
    let policy = source.policy();
    let payload = source.into_payload();
    payload.check(context.group()?)?;
    trace!(
        context = %context.id(),
        version = %version,
        kind = payload.kind_name(),
        policy = ?policy,
        "Exported handover"
    );
    Ok(HandoverEnvelope {
        payload,
        version,
        store: context.store().id(),
        policy,
    })
}

/// Bring `context` to the envelope's version
///
/// Idle contexts begin a read there, contexts behind it advance to it.
/// A context already past it fails with `BadVersion`; a writing context
/// fails with `InvalidState`.
pub fn sync_to_version(context: &mut TransactionContext, version: VersionId) -> Result<()> {
    match context.state() {
        TransactionState::Idle => {
            context.begin_read(Some(version))?;
        }
        TransactionState::ReadPinned(current) if current < version => {
            context.advance_read(Some(version))?;
        }
        TransactionState::ReadPinned(current) if current == version => {}
        TransactionState::ReadPinned(current) => {
            return Err(Error::BadVersion {
                requested: version,
                reason: format!("{} is already reading at {}", context.id(), current),
            });
        }
        TransactionState::WritePending(_) => {
            return Err(Error::invalid_state(
                "Cannot import a handover into a write transaction",
            ));
        }
    }
    Ok(())
}

/// Check an envelope can be imported into `context`'s store as a `T`
pub fn check_envelope<T: Handover>(context: &TransactionContext, envelope: &HandoverEnvelope) -> Result<()> {
    if envelope.store != context.store().id() {
        return Err(Error::illegal_argument(format!(
            "Handover from store {} cannot be imported into store {}",
            envelope.store,
            context.store().id()
        )));
    }
    if envelope.kind_name() != T::KIND {
        return Err(Error::illegal_argument(format!(
            "Handover holds a {}, not a {}",
            envelope.kind_name(),
            T::KIND
        )));
    }
    Ok(())
}

/// Import an envelope into `context`
///
/// Brings the context to the envelope's version, then rebinds the payload
/// to the context's snapshot.
pub fn import<T: Handover>(context: &mut TransactionContext, envelope: HandoverEnvelope) -> Result<T> {
    check_envelope::<T>(context, &envelope)?;
    sync_to_version(context, envelope.version)?;
    envelope.payload.check(context.group()?)?;
    trace!(
        context = %context.id(),
        version = %envelope.version,
        kind = envelope.kind_name(),
        "Imported handover"
    );
    T::thaw(envelope.payload).map_err(|other| {
        Error::internal(format!("{} payload passed the kind check", other.kind_name()))
    })
}
