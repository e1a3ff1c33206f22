//! Per-thread boundary entry points
//!
//! A [`Session`] is what the managed runtime talks to. It owns one
//! [`TransactionContext`] and the handle arenas for every object kind the
//! runtime can hold. Each public method:
//!
//! 1. traces entry at the configured [`TraceLevel`](baton_core::TraceLevel)
//! 2. resolves handles and validates arguments (attached, column, row, type)
//! 3. forwards to the engine, counting the call in [`EngineStats`]
//! 4. translates any failure, or any panic, into one [`ApiError`]
//!
//! Nothing reaches the engine when step 2 fails.
//!
//! [`EngineStats`]: baton_storage::EngineStats

use crate::accessor::{
    Attached, LinkListAccessor, QueryAccessor, RowAccessor, TableAccessor, ViewAccessor,
};
use crate::batch::{run_batch, BatchItem};
use crate::coordinator::{run_query, QueryRequest, QueryResult};
use crate::database::Database;
use crate::handles::Arena;
use crate::trace::Tracer;
use crate::validation::{
    validate_attached, validate_column, validate_link_target, validate_nullable, validate_range,
    validate_row, validate_value, validate_writable, Access,
};
use baton_concurrency::{
    check_envelope, export, import, Handover, HandoverEnvelope, RowLocator, Source,
    TransactionContext, TransactionState,
};
use baton_core::{
    AggregateKind, ApiError, ColumnDescriptor, ColumnType, ContextId, Error, HandleKind,
    HandoverPolicy, Result, SortOrder, TableKey, Value, VersionId,
};
use baton_storage::{
    check_distinct, EngineStats, Predicate, Query, RowRange, SortDescriptor, Table, TableView,
};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Result type of every session entry point
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// A handed-back result, with envelopes registered as handles
#[derive(Debug, Clone, PartialEq)]
pub enum HandedResult {
    /// Envelope handle of the matching row, if any
    Row(Option<u64>),
    /// Envelope handle of the result view
    View(u64),
    /// Number of matches
    Count(usize),
    /// Aggregate value
    Value(Value),
}

/// Results of [`Session::batch_update_queries`]
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    /// Version every result reflects
    pub version: VersionId,
    /// One result per request, in order
    pub results: Vec<HandedResult>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn attached_or_false<A: Attached>(arena: &Arena<A>, raw: u64, context: &TransactionContext) -> Result<bool> {
    match arena.get(raw) {
        Ok(accessor) => Ok(accessor.is_attached(context)),
        Err(e) if e.is_detached() => Ok(false),
        Err(e) => Err(e),
    }
}

fn export_accessor<A: Attached, T: Handover + Clone>(
    arena: &mut Arena<A>,
    context: &TransactionContext,
    stats: &EngineStats,
    raw: u64,
    policy: HandoverPolicy,
    object: impl Fn(&A) -> &T,
) -> Result<HandoverEnvelope> {
    let accessor = arena.get(raw)?;
    validate_attached(accessor, context)?;
    stats.record_call();
    let envelope = match policy {
        HandoverPolicy::Copy => export(context, Source::Borrowed(object(accessor)))?,
        HandoverPolicy::Move => export(context, Source::Owned(object(accessor).clone()))?,
    };
    if policy == HandoverPolicy::Move {
        arena.remove(raw)?;
    }
    Ok(envelope)
}

fn non_negative(index: i64, size: usize) -> Result<usize> {
    if index < 0 || index as u64 >= size as u64 {
        return Err(Error::RowOutOfRange {
            index,
            size,
            allow_end: false,
        });
    }
    Ok(index as usize)
}

/// One thread's view of a [`Database`]
#[derive(Debug)]
pub struct Session {
    db: Arc<Database>,
    context: TransactionContext,
    tables: Arena<TableAccessor>,
    rows: Arena<RowAccessor>,
    queries: Arena<QueryAccessor>,
    views: Arena<ViewAccessor>,
    link_lists: Arena<LinkListAccessor>,
    tracer: Tracer,
}

impl Session {
    /// Open a session on `db`
    pub fn new(db: Arc<Database>) -> Self {
        let context = TransactionContext::new(Arc::clone(db.store()));
        let tracer = Tracer::new(db.config().trace_level);
        Self {
            db,
            context,
            tables: Arena::new(HandleKind::Table),
            rows: Arena::new(HandleKind::Row),
            queries: Arena::new(HandleKind::Query),
            views: Arena::new(HandleKind::View),
            link_lists: Arena::new(HandleKind::LinkList),
            tracer,
        }
    }

    /// Database this session belongs to
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Identity of the session's context
    pub fn context_id(&self) -> ContextId {
        self.context.id()
    }

    /// Transaction state of the session's context
    pub fn state(&self) -> TransactionState {
        self.context.state()
    }

    // ========================================================================
    // Guard
    // ========================================================================

    fn finish<T>(&self, operation: &'static str, outcome: std::thread::Result<Result<T>>) -> ApiResult<T> {
        let result = match outcome {
            Ok(result) => result.map_err(ApiError::from),
            Err(payload) => Err(ApiError::fatal(operation, &panic_message(payload.as_ref()))),
        };
        match &result {
            Ok(_) => self.tracer.leave(operation),
            Err(e) => self.tracer.failed(operation, e),
        }
        result
    }

    fn read<T>(&self, operation: &'static str, body: impl FnOnce(&Self) -> Result<T>) -> ApiResult<T> {
        self.tracer.enter(operation);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(self)));
        self.finish(operation, outcome)
    }

    fn write<T>(&mut self, operation: &'static str, body: impl FnOnce(&mut Self) -> Result<T>) -> ApiResult<T> {
        self.tracer.enter(operation);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&mut *self)));
        self.finish(operation, outcome)
    }

    fn forward(&self) {
        self.db.stats().record_call();
    }

    fn table(&self, handle: u64) -> Result<&Table> {
        validate_attached(self.tables.get(handle)?, &self.context)
    }

    fn table_accessor(&mut self, key: TableKey) -> u64 {
        let context_epoch = self.context.epoch();
        self.tables.insert(TableAccessor { key, context_epoch })
    }

    fn cell(&self, handle: u64, column: i64, row: i64, expected: ColumnType) -> Result<&Value> {
        let table = self.table(handle)?;
        let checked = Access::new(table)
            .column(column)
            .row(row)
            .expect_resolving_mixed(expected)
            .check()?;
        self.forward();
        table.get(checked.column()?, checked.row()?)
    }

    fn set_cell(&mut self, handle: u64, column: i64, row: i64, expected: ColumnType, value: Value) -> Result<()> {
        let (key, column, row) = {
            let table = self.table(handle)?;
            let checked = Access::new(table)
                .column(column)
                .row(row)
                .expect(expected)
                .check()?;
            (table.key(), checked.column()?, checked.row()?)
        };
        validate_writable(&self.context)?;
        self.forward();
        self.context.group_mut()?.table_mut(key)?.set(column, row, value)
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begin a read transaction at the latest version
    pub fn begin_read(&mut self) -> ApiResult<VersionId> {
        self.write("begin_read", |s| {
            s.forward();
            s.context.begin_read(None)
        })
    }

    /// Begin a read transaction at a specific retained version
    pub fn begin_read_at(&mut self, version: VersionId) -> ApiResult<VersionId> {
        self.write("begin_read_at", |s| {
            s.forward();
            s.context.begin_read(Some(version))
        })
    }

    /// End the read transaction
    pub fn end_read(&mut self) -> ApiResult<()> {
        self.write("end_read", |s| {
            s.forward();
            s.context.end_read()
        })
    }

    /// Begin a write transaction, waiting for the writer lock
    pub fn begin_write(&mut self) -> ApiResult<VersionId> {
        self.write("begin_write", |s| {
            s.forward();
            s.context.begin_write()
        })
    }

    /// Turn the read transaction into a write transaction at the latest version
    pub fn promote_to_write(&mut self) -> ApiResult<VersionId> {
        self.write("promote_to_write", |s| {
            s.forward();
            let report = s.context.promote_to_write()?;
            s.tracer
                .detail("promote_to_write", &format!("{} -> {}", report.from, report.to));
            Ok(report.to)
        })
    }

    /// Commit and return to idle
    pub fn commit(&mut self) -> ApiResult<VersionId> {
        self.write("commit", |s| {
            s.forward();
            s.context.commit()
        })
    }

    /// Commit and keep reading at the new version
    pub fn commit_and_continue_as_read(&mut self) -> ApiResult<VersionId> {
        self.write("commit_and_continue_as_read", |s| {
            s.forward();
            s.context.commit_and_continue_as_read()
        })
    }

    /// Discard the write transaction
    pub fn rollback(&mut self) -> ApiResult<()> {
        self.write("rollback", |s| {
            s.forward();
            s.context.rollback()
        })
    }

    /// Discard the write transaction and keep reading at its base version
    pub fn rollback_and_continue_as_read(&mut self) -> ApiResult<VersionId> {
        self.write("rollback_and_continue_as_read", |s| {
            s.forward();
            s.context.rollback_and_continue_as_read()
        })
    }

    /// Move the read transaction to the latest version
    pub fn advance_read(&mut self) -> ApiResult<VersionId> {
        self.write("advance_read", |s| s.advance(None))
    }

    /// Move the read transaction forward to `version`
    pub fn advance_read_to(&mut self, version: VersionId) -> ApiResult<VersionId> {
        self.write("advance_read_to", |s| s.advance(Some(version)))
    }

    fn advance(&mut self, to: Option<VersionId>) -> Result<VersionId> {
        self.forward();
        let report = self.context.advance_read(to)?;
        self.tracer.detail(
            "advance_read",
            &format!(
                "{} -> {} ({} removed, {} reshaped)",
                report.from,
                report.to,
                report.removed_tables.len(),
                report.schema_changed.len()
            ),
        );
        Ok(report.to)
    }

    /// Version of the open transaction, or of the last one
    pub fn version(&self) -> Option<VersionId> {
        self.context.version()
    }

    /// Whether a newer version than the one being read exists
    pub fn has_changed(&self) -> bool {
        self.context.has_changed()
    }

    /// Whether a transaction is open
    pub fn is_in_transaction(&self) -> bool {
        self.context.is_in_transaction()
    }

    // ========================================================================
    // Tables
    // ========================================================================

    /// Create a table
    pub fn add_table(&mut self, name: &str) -> ApiResult<u64> {
        self.write("add_table", |s| {
            validate_writable(&s.context)?;
            s.forward();
            let key = s.context.group_mut()?.add_table(name)?;
            Ok(s.table_accessor(key))
        })
    }

    /// Handle to an existing table
    pub fn get_table(&mut self, name: &str) -> ApiResult<u64> {
        self.write("get_table", |s| {
            let group = s.context.group()?;
            s.forward();
            let key = group
                .table_key(name)
                .ok_or_else(|| Error::illegal_argument(format!("Table '{}' does not exist.", name)))?;
            Ok(s.table_accessor(key))
        })
    }

    /// Whether a table with this name exists
    pub fn has_table(&self, name: &str) -> ApiResult<bool> {
        self.read("has_table", |s| {
            let group = s.context.group()?;
            s.forward();
            Ok(group.has_table(name))
        })
    }

    /// Remove a table; handles to it detach
    pub fn remove_table(&mut self, table: u64) -> ApiResult<()> {
        self.write("remove_table", |s| {
            let key = s.table(table)?.key();
            validate_writable(&s.context)?;
            s.forward();
            s.context.group_mut()?.remove_table(key)
        })
    }

    /// Table name
    pub fn table_name(&self, table: u64) -> ApiResult<String> {
        self.read("table_name", |s| {
            let table = s.table(table)?;
            s.forward();
            Ok(table.name().to_string())
        })
    }

    /// Add a non-link column
    pub fn add_column(&mut self, table: u64, column_type: ColumnType, name: &str, nullable: bool) -> ApiResult<usize> {
        self.write("add_column", |s| {
            let key = s.table(table)?.key();
            validate_writable(&s.context)?;
            if column_type.is_link_like() {
                return Err(Error::illegal_argument(format!(
                    "{} columns need a target table; use add_link_column",
                    column_type
                )));
            }
            s.forward();
            s.context
                .group_mut()?
                .table_mut(key)?
                .add_column(ColumnDescriptor::new(name, column_type, nullable))
        })
    }

    /// Add a Link or LinkList column pointing at `target`
    pub fn add_link_column(&mut self, table: u64, column_type: ColumnType, name: &str, target: u64) -> ApiResult<usize> {
        self.write("add_link_column", |s| {
            let key = s.table(table)?.key();
            let target = s.table(target)?.key();
            validate_writable(&s.context)?;
            if !column_type.is_link_like() {
                return Err(Error::illegal_argument(format!(
                    "{} is not a link column type",
                    column_type
                )));
            }
            s.forward();
            s.context
                .group_mut()?
                .table_mut(key)?
                .add_column(ColumnDescriptor::link(name, column_type, target))
        })
    }

    /// Remove a column
    pub fn remove_column(&mut self, table: u64, column: i64) -> ApiResult<()> {
        self.write("remove_column", |s| {
            let table = s.table(table)?;
            let key = table.key();
            let column = validate_column(table, column)?;
            validate_writable(&s.context)?;
            s.forward();
            s.context.group_mut()?.table_mut(key)?.remove_column(column)
        })
    }

    /// Number of columns
    pub fn column_count(&self, table: u64) -> ApiResult<usize> {
        self.read("column_count", |s| {
            let table = s.table(table)?;
            s.forward();
            Ok(table.column_count())
        })
    }

    /// Column name
    pub fn column_name(&self, table: u64, column: i64) -> ApiResult<String> {
        self.read("column_name", |s| {
            let table = s.table(table)?;
            let column = validate_column(table, column)?;
            s.forward();
            Ok(table.column(column)?.name.clone())
        })
    }

    /// Declared column type
    pub fn column_type(&self, table: u64, column: i64) -> ApiResult<ColumnType> {
        self.read("column_type", |s| {
            let table = s.table(table)?;
            let column = validate_column(table, column)?;
            s.forward();
            table.column_type(column)
        })
    }

    /// Index of the column with this name
    pub fn column_index(&self, table: u64, name: &str) -> ApiResult<Option<usize>> {
        self.read("column_index", |s| {
            let table = s.table(table)?;
            s.forward();
            Ok(table.column_index(name))
        })
    }

    /// Number of rows
    pub fn size(&self, table: u64) -> ApiResult<usize> {
        self.read("size", |s| {
            let table = s.table(table)?;
            s.forward();
            Ok(table.size())
        })
    }

    /// Append a row of default values; returns its index
    pub fn add_empty_row(&mut self, table: u64) -> ApiResult<usize> {
        self.write("add_empty_row", |s| {
            let key = s.table(table)?.key();
            validate_writable(&s.context)?;
            s.forward();
            Ok(s.context.group_mut()?.table_mut(key)?.add_empty_row())
        })
    }

    /// Insert a row of default values at `row` (`0..=size`)
    pub fn insert_empty_row(&mut self, table: u64, row: i64) -> ApiResult<()> {
        self.write("insert_empty_row", |s| {
            let table = s.table(table)?;
            let key = table.key();
            let row = Access::new(table).insert_at(row).check()?.row()?;
            validate_writable(&s.context)?;
            s.forward();
            s.context.group_mut()?.table_mut(key)?.insert_empty_row(row)
        })
    }

    /// Remove a row; links to it are nullified
    pub fn remove_row(&mut self, table: u64, row: i64) -> ApiResult<()> {
        self.write("remove_row", |s| {
            let table = s.table(table)?;
            let key = table.key();
            let row = validate_row(table, row, false)?;
            validate_writable(&s.context)?;
            s.forward();
            s.context.group_mut()?.remove_row(key, row)
        })
    }

    /// Remove every row
    pub fn clear(&mut self, table: u64) -> ApiResult<()> {
        self.write("clear", |s| {
            let key = s.table(table)?.key();
            validate_writable(&s.context)?;
            s.forward();
            s.context.group_mut()?.clear_table(key)
        })
    }

    /// Int cell; `None` when null
    pub fn get_int(&self, table: u64, column: i64, row: i64) -> ApiResult<Option<i64>> {
        self.read("get_int", |s| Ok(s.cell(table, column, row, ColumnType::Int)?.as_int()))
    }

    /// Set an Int cell
    pub fn set_int(&mut self, table: u64, column: i64, row: i64, value: i64) -> ApiResult<()> {
        self.write("set_int", |s| s.set_cell(table, column, row, ColumnType::Int, Value::Int(value)))
    }

    /// Bool cell; `None` when null
    pub fn get_bool(&self, table: u64, column: i64, row: i64) -> ApiResult<Option<bool>> {
        self.read("get_bool", |s| Ok(s.cell(table, column, row, ColumnType::Bool)?.as_bool()))
    }

    /// Set a Bool cell
    pub fn set_bool(&mut self, table: u64, column: i64, row: i64, value: bool) -> ApiResult<()> {
        self.write("set_bool", |s| s.set_cell(table, column, row, ColumnType::Bool, Value::Bool(value)))
    }

    /// Float cell; `None` when null
    pub fn get_float(&self, table: u64, column: i64, row: i64) -> ApiResult<Option<f32>> {
        self.read("get_float", |s| Ok(s.cell(table, column, row, ColumnType::Float)?.as_float()))
    }

    /// Set a Float cell
    pub fn set_float(&mut self, table: u64, column: i64, row: i64, value: f32) -> ApiResult<()> {
        self.write("set_float", |s| s.set_cell(table, column, row, ColumnType::Float, Value::Float(value)))
    }

    /// Double cell; `None` when null
    pub fn get_double(&self, table: u64, column: i64, row: i64) -> ApiResult<Option<f64>> {
        self.read("get_double", |s| Ok(s.cell(table, column, row, ColumnType::Double)?.as_double()))
    }

    /// Set a Double cell
    pub fn set_double(&mut self, table: u64, column: i64, row: i64, value: f64) -> ApiResult<()> {
        self.write("set_double", |s| {
            s.set_cell(table, column, row, ColumnType::Double, Value::Double(value))
        })
    }

    /// String cell; `None` when null
    pub fn get_string(&self, table: u64, column: i64, row: i64) -> ApiResult<Option<String>> {
        self.read("get_string", |s| {
            Ok(s.cell(table, column, row, ColumnType::String)?
                .as_str()
                .map(str::to_string))
        })
    }

    /// Set a String cell
    pub fn set_string(&mut self, table: u64, column: i64, row: i64, value: &str) -> ApiResult<()> {
        self.write("set_string", |s| {
            s.set_cell(table, column, row, ColumnType::String, Value::from(value))
        })
    }

    /// Binary cell; `None` when null
    pub fn get_binary(&self, table: u64, column: i64, row: i64) -> ApiResult<Option<Vec<u8>>> {
        self.read("get_binary", |s| {
            Ok(s.cell(table, column, row, ColumnType::Binary)?
                .as_binary()
                .map(<[u8]>::to_vec))
        })
    }

    /// Set a Binary cell
    pub fn set_binary(&mut self, table: u64, column: i64, row: i64, value: &[u8]) -> ApiResult<()> {
        self.write("set_binary", |s| {
            s.set_cell(table, column, row, ColumnType::Binary, Value::Binary(value.to_vec()))
        })
    }

    /// Date cell in milliseconds since the epoch; `None` when null
    pub fn get_date(&self, table: u64, column: i64, row: i64) -> ApiResult<Option<i64>> {
        self.read("get_date", |s| Ok(s.cell(table, column, row, ColumnType::Date)?.as_date()))
    }

    /// Set a Date cell
    pub fn set_date(&mut self, table: u64, column: i64, row: i64, millis: i64) -> ApiResult<()> {
        self.write("set_date", |s| s.set_cell(table, column, row, ColumnType::Date, Value::Date(millis)))
    }

    /// Value of a Mixed cell
    pub fn get_mixed(&self, table: u64, column: i64, row: i64) -> ApiResult<Value> {
        self.read("get_mixed", |s| Ok(s.cell(table, column, row, ColumnType::Mixed)?.clone()))
    }

    /// Store any scalar value in a Mixed cell
    pub fn set_mixed(&mut self, table: u64, column: i64, row: i64, value: Value) -> ApiResult<()> {
        self.write("set_mixed", |s| s.set_cell(table, column, row, ColumnType::Mixed, value))
    }

    /// Runtime type of a Mixed cell; `None` when null
    pub fn get_mixed_type(&self, table: u64, column: i64, row: i64) -> ApiResult<Option<ColumnType>> {
        self.read("get_mixed_type", |s| {
            Ok(s.cell(table, column, row, ColumnType::Mixed)?.runtime_type())
        })
    }

    /// Whether a cell holds null
    pub fn is_null(&self, table: u64, column: i64, row: i64) -> ApiResult<bool> {
        self.read("is_null", |s| {
            let table = s.table(table)?;
            let checked = Access::new(table).column(column).row(row).check()?;
            s.forward();
            Ok(table.get(checked.column()?, checked.row()?)?.is_null())
        })
    }

    /// Set a nullable cell to null
    pub fn set_null(&mut self, table: u64, column: i64, row: i64) -> ApiResult<()> {
        self.write("set_null", |s| {
            let table = s.table(table)?;
            let key = table.key();
            let checked = Access::new(table).column(column).row(row).check()?;
            let (column, row) = (checked.column()?, checked.row()?);
            validate_nullable(table, column)?;
            validate_writable(&s.context)?;
            s.forward();
            s.context.group_mut()?.table_mut(key)?.set(column, row, Value::Null)
        })
    }

    /// Target row of a Link cell; `None` when unset
    pub fn get_link(&self, table: u64, column: i64, row: i64) -> ApiResult<Option<usize>> {
        self.read("get_link", |s| Ok(s.cell(table, column, row, ColumnType::Link)?.as_link()))
    }

    /// Point a Link cell at `target_row` of the link target table
    pub fn set_link(&mut self, table: u64, column: i64, row: i64, target_row: i64) -> ApiResult<()> {
        self.write("set_link", |s| {
            let table = s.table(table)?;
            let key = table.key();
            let checked = Access::new(table)
                .column(column)
                .row(row)
                .expect(ColumnType::Link)
                .check()?;
            let (column, row) = (checked.column()?, checked.row()?);
            let target_row = validate_link_target(s.context.group()?, table, column, target_row)?;
            validate_writable(&s.context)?;
            s.forward();
            s.context.group_mut()?.set_link(key, column, row, target_row)
        })
    }

    /// Clear a Link cell
    pub fn nullify_link(&mut self, table: u64, column: i64, row: i64) -> ApiResult<()> {
        self.write("nullify_link", |s| s.set_cell(table, column, row, ColumnType::Link, Value::Null))
    }

    /// Whether a table handle is still attached
    pub fn is_table_attached(&self, table: u64) -> ApiResult<bool> {
        self.read("is_table_attached", |s| attached_or_false(&s.tables, table, &s.context))
    }

    /// Release a table handle
    pub fn close_table(&mut self, table: u64) -> ApiResult<()> {
        self.write("close_table", |s| s.tables.remove(table).map(drop))
    }

    // ========================================================================
    // Rows
    // ========================================================================

    /// Row accessor, its table and the row's current index
    fn row(&self, handle: u64) -> Result<(&RowAccessor, &Table, usize)> {
        let accessor = self.rows.get(handle)?;
        let table = validate_attached(accessor, &self.context)?;
        let index = accessor
            .locator
            .index_in(table)
            .ok_or(Error::detached(RowAccessor::SUBJECT))?;
        Ok((accessor, table, index))
    }

    /// Handle to one row of a table
    ///
    /// The handle follows its row when earlier rows are inserted or removed
    /// and detaches when the row itself is removed.
    pub fn get_row(&mut self, table: u64, row: i64) -> ApiResult<u64> {
        self.write("get_row", |s| {
            let table = s.table(table)?;
            let row = validate_row(table, row, false)?;
            s.forward();
            let locator = RowLocator::new(table, row);
            let context_epoch = s.context.epoch();
            Ok(s.rows.insert(RowAccessor {
                locator,
                context_epoch,
            }))
        })
    }

    /// Row index of a row handle
    pub fn row_index(&self, row: u64) -> ApiResult<usize> {
        self.read("row_index", |s| {
            let (_, _, index) = s.row(row)?;
            s.forward();
            Ok(index)
        })
    }

    /// Any cell of the row
    pub fn row_get(&self, row: u64, column: i64) -> ApiResult<Value> {
        self.read("row_get", |s| {
            let (_, table, index) = s.row(row)?;
            let column = validate_column(table, column)?;
            s.forward();
            Ok(table.get(column, index)?.clone())
        })
    }

    /// Set any non-LinkList cell of the row
    pub fn row_set(&mut self, row: u64, column: i64, value: Value) -> ApiResult<()> {
        self.write("row_set", |s| {
            let (_, table, row) = s.row(row)?;
            let key = table.key();
            let column = validate_column(table, column)?;
            let column_type = table.column_type(column)?;
            if column_type == ColumnType::LinkList {
                return Err(Error::illegal_argument(
                    "LinkList cells are modified through a link list handle",
                ));
            }
            validate_value(table, column, &value)?;
            if let Value::Link(target) = &value {
                validate_link_target(s.context.group()?, table, column, *target as i64)?;
            }
            validate_writable(&s.context)?;
            s.forward();
            match value {
                Value::Link(target) => s.context.group_mut()?.set_link(key, column, row, target),
                value => s.context.group_mut()?.table_mut(key)?.set(column, row, value),
            }
        })
    }

    /// Whether a row handle is still attached
    pub fn is_row_attached(&self, row: u64) -> ApiResult<bool> {
        self.read("is_row_attached", |s| attached_or_false(&s.rows, row, &s.context))
    }

    /// Release a row handle
    pub fn close_row(&mut self, row: u64) -> ApiResult<()> {
        self.write("close_row", |s| s.rows.remove(row).map(drop))
    }

    // ========================================================================
    // Link lists
    // ========================================================================

    /// Link list accessor, its table and the owning row's current index
    fn link_list(&self, handle: u64) -> Result<(&LinkListAccessor, &Table, usize)> {
        let accessor = self.link_lists.get(handle)?;
        let table = validate_attached(accessor, &self.context)?;
        let index = accessor
            .locator
            .index_in(table)
            .ok_or(Error::detached(LinkListAccessor::SUBJECT))?;
        Ok((accessor, table, index))
    }

    /// Handle to the LinkList cell at (column, row)
    pub fn get_link_list(&mut self, table: u64, column: i64, row: i64) -> ApiResult<u64> {
        self.write("get_link_list", |s| {
            let table = s.table(table)?;
            let checked = Access::new(table)
                .column(column)
                .row(row)
                .expect(ColumnType::LinkList)
                .check()?;
            let locator = RowLocator::new(table, checked.row()?);
            let column = checked.column()?;
            s.forward();
            let context_epoch = s.context.epoch();
            Ok(s.link_lists.insert(LinkListAccessor {
                locator,
                column,
                context_epoch,
            }))
        })
    }

    /// Number of links
    pub fn link_list_size(&self, list: u64) -> ApiResult<usize> {
        self.read("link_list_size", |s| {
            let (accessor, table, row) = s.link_list(list)?;
            s.forward();
            Ok(table.link_list(accessor.column, row)?.len())
        })
    }

    /// Target row at `position`
    pub fn link_list_target(&self, list: u64, position: i64) -> ApiResult<usize> {
        self.read("link_list_target", |s| {
            let (accessor, table, row) = s.link_list(list)?;
            let targets = table.link_list(accessor.column, row)?;
            let position = non_negative(position, targets.len())?;
            s.forward();
            Ok(targets[position])
        })
    }

    /// Append a link to `target_row`
    pub fn link_list_add(&mut self, list: u64, target_row: i64) -> ApiResult<()> {
        self.write("link_list_add", |s| {
            let (accessor, table, row) = s.link_list(list)?;
            let (key, column) = (table.key(), accessor.column);
            let target_row = validate_link_target(s.context.group()?, table, column, target_row)?;
            validate_writable(&s.context)?;
            s.forward();
            s.context
                .group_mut()?
                .link_list_add(key, column, row, target_row)
        })
    }

    /// Remove the link at `position`
    pub fn link_list_remove(&mut self, list: u64, position: i64) -> ApiResult<()> {
        self.write("link_list_remove", |s| {
            let (accessor, table, row) = s.link_list(list)?;
            let (key, column) = (table.key(), accessor.column);
            let size = table.link_list(column, row)?.len();
            let position = non_negative(position, size)?;
            validate_writable(&s.context)?;
            s.forward();
            s.context.group_mut()?.link_list_remove(key, column, row, position)
        })
    }

    /// Remove every link
    pub fn link_list_clear(&mut self, list: u64) -> ApiResult<()> {
        self.write("link_list_clear", |s| {
            let (accessor, table, row) = s.link_list(list)?;
            let (key, column) = (table.key(), accessor.column);
            validate_writable(&s.context)?;
            s.forward();
            s.context.group_mut()?.link_list_clear(key, column, row)
        })
    }

    /// Release a link list handle
    pub fn close_link_list(&mut self, list: u64) -> ApiResult<()> {
        self.write("close_link_list", |s| s.link_lists.remove(list).map(drop))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    fn query(&self, handle: u64) -> Result<(&Query, &Table)> {
        let accessor = self.queries.get(handle)?;
        Ok((&accessor.query, validate_attached(accessor, &self.context)?))
    }

    fn view_accessor(&mut self, view: TableView) -> u64 {
        let context_epoch = self.context.epoch();
        self.views.insert(ViewAccessor {
            view,
            context_epoch,
        })
    }

    /// Start a query matching every row of a table
    pub fn where_table(&mut self, table: u64) -> ApiResult<u64> {
        self.write("where_table", |s| {
            let query = Query::new(s.table(table)?);
            s.forward();
            let context_epoch = s.context.epoch();
            Ok(s.queries.insert(QueryAccessor {
                query,
                context_epoch,
            }))
        })
    }

    /// Narrow a query with another predicate (AND)
    ///
    /// The combined query is checked against the table before it replaces
    /// the old one.
    pub fn query_filter(&mut self, query: u64, predicate: Predicate) -> ApiResult<()> {
        self.write("query_filter", |s| {
            let (current, table) = s.query(query)?;
            let mut narrowed = current.clone();
            narrowed.filter(predicate);
            narrowed.validate(table)?;
            s.forward();
            s.queries.get_mut(query)?.query = narrowed;
            Ok(())
        })
    }

    /// Describe why a query cannot run, or `None` if it can
    pub fn query_validate(&self, query: u64) -> ApiResult<Option<String>> {
        self.read("query_validate", |s| {
            let (query, table) = s.query(query)?;
            s.forward();
            Ok(query.validate(table).err().map(|e| e.to_string()))
        })
    }

    /// First matching row at or after `from_row`
    pub fn query_find(&self, query: u64, from_row: i64) -> ApiResult<Option<usize>> {
        self.read("query_find", |s| {
            let (query, table) = s.query(query)?;
            let from = validate_row(table, from_row, true)?;
            s.forward();
            query.find(table, from)
        })
    }

    /// All matches in `[start, end)`, at most `limit`, as a view handle
    pub fn query_find_all(&mut self, query: u64, start: i64, end: i64, limit: i64) -> ApiResult<u64> {
        self.write("query_find_all", |s| {
            let (query, table) = s.query(query)?;
            let range = validate_range(table.size(), start, end, limit)?;
            s.forward();
            let view = TableView::from_query(table, query.clone(), range)?;
            Ok(s.view_accessor(view))
        })
    }

    /// Number of matches in `[start, end)`, at most `limit`
    pub fn query_count(&self, query: u64, start: i64, end: i64, limit: i64) -> ApiResult<usize> {
        self.read("query_count", |s| {
            let (query, table) = s.query(query)?;
            let range = validate_range(table.size(), start, end, limit)?;
            s.forward();
            query.count(table, range)
        })
    }

    /// Aggregate a column over all matches
    pub fn query_aggregate(&self, query: u64, kind: AggregateKind, column: i64) -> ApiResult<Value> {
        self.read("query_aggregate", |s| {
            let (query, table) = s.query(query)?;
            let column = validate_column(table, column)?;
            s.forward();
            query.aggregate(table, kind, column, RowRange::all())
        })
    }

    /// Release a query handle
    pub fn close_query(&mut self, query: u64) -> ApiResult<()> {
        self.write("close_query", |s| s.queries.remove(query).map(drop))
    }

    // ========================================================================
    // Views
    // ========================================================================

    fn view(&self, handle: u64) -> Result<(&TableView, &Table)> {
        let accessor = self.views.get(handle)?;
        Ok((&accessor.view, validate_attached(accessor, &self.context)?))
    }

    /// Number of rows in the view
    pub fn view_size(&self, view: u64) -> ApiResult<usize> {
        self.read("view_size", |s| {
            let (view, _) = s.view(view)?;
            s.forward();
            Ok(view.size())
        })
    }

    /// Table row at view position `index`
    pub fn view_row_index(&self, view: u64, index: i64) -> ApiResult<usize> {
        self.read("view_row_index", |s| {
            let (view, _) = s.view(view)?;
            let index = non_negative(index, view.size())?;
            s.forward();
            view.row_index(index)
        })
    }

    /// Cell at (column, view position)
    pub fn view_get(&self, view: u64, column: i64, index: i64) -> ApiResult<Value> {
        self.read("view_get", |s| {
            let (view, table) = s.view(view)?;
            let column = validate_column(table, column)?;
            let index = non_negative(index, view.size())?;
            s.forward();
            Ok(view.get(table, column, index)?.clone())
        })
    }

    /// Sort the view by one or more columns
    pub fn view_sort(&mut self, view: u64, keys: &[(i64, SortOrder)]) -> ApiResult<()> {
        self.write("view_sort", |s| {
            let table = validate_attached(s.views.get(view)?, &s.context)?;
            let keys = keys
                .iter()
                .map(|&(column, order)| Ok((validate_column(table, column)?, order)))
                .collect::<Result<Vec<_>>>()?;
            let descriptor = SortDescriptor::new(table, keys)?;
            s.forward();
            s.views.get_mut(view)?.view.sort(table, descriptor)
        })
    }

    /// Keep the first row per distinct value of `column`
    pub fn view_distinct(&mut self, view: u64, column: i64) -> ApiResult<()> {
        self.write("view_distinct", |s| {
            let table = validate_attached(s.views.get(view)?, &s.context)?;
            let column = validate_column(table, column)?;
            check_distinct(table, column)?;
            s.forward();
            s.views.get_mut(view)?.view.distinct(table, column)
        })
    }

    /// Re-run the view's query against the current snapshot
    pub fn view_sync(&mut self, view: u64) -> ApiResult<()> {
        self.write("view_sync", |s| {
            let table = validate_attached(s.views.get(view)?, &s.context)?;
            s.forward();
            s.views.get_mut(view)?.view.sync(table)
        })
    }

    /// Aggregate a column over the view's rows
    pub fn view_aggregate(&self, view: u64, kind: AggregateKind, column: i64) -> ApiResult<Value> {
        self.read("view_aggregate", |s| {
            let (view, table) = s.view(view)?;
            let column = validate_column(table, column)?;
            s.forward();
            view.aggregate(table, kind, column)
        })
    }

    /// Whether a view handle is still attached
    pub fn is_view_attached(&self, view: u64) -> ApiResult<bool> {
        self.read("is_view_attached", |s| attached_or_false(&s.views, view, &s.context))
    }

    /// Release a view handle
    pub fn close_view(&mut self, view: u64) -> ApiResult<()> {
        self.write("close_view", |s| s.views.remove(view).map(drop))
    }

    // ========================================================================
    // Handover
    // ========================================================================

    /// Export a query; `Move` releases the query handle
    pub fn export_query(&mut self, query: u64, policy: HandoverPolicy) -> ApiResult<u64> {
        self.write("export_query", |s| {
            let envelope = export_accessor(&mut s.queries, &s.context, s.db.stats(), query, policy, |a| &a.query)?;
            Ok(s.db.register_envelope(envelope))
        })
    }

    /// Export a row; `Move` releases the row handle
    pub fn export_row(&mut self, row: u64, policy: HandoverPolicy) -> ApiResult<u64> {
        self.write("export_row", |s| {
            let envelope = export_accessor(&mut s.rows, &s.context, s.db.stats(), row, policy, |a| &a.locator)?;
            Ok(s.db.register_envelope(envelope))
        })
    }

    /// Export a view; `Move` releases the view handle
    pub fn export_view(&mut self, view: u64, policy: HandoverPolicy) -> ApiResult<u64> {
        self.write("export_view", |s| {
            let envelope = export_accessor(&mut s.views, &s.context, s.db.stats(), view, policy, |a| &a.view)?;
            Ok(s.db.register_envelope(envelope))
        })
    }

    fn hand_back(&self, result: QueryResult) -> HandedResult {
        match result {
            QueryResult::Row(row) => HandedResult::Row(row.map(|e| self.db.register_envelope(e))),
            QueryResult::View(view) => HandedResult::View(self.db.register_envelope(view)),
            QueryResult::Count(count) => HandedResult::Count(count),
            QueryResult::Value(value) => HandedResult::Value(value),
        }
    }

    fn run_handover(&mut self, operation: &'static str, envelope: u64, request: QueryRequest) -> ApiResult<HandedResult> {
        self.write(operation, |s| {
            let envelope = {
                let context = &s.context;
                s.db.take_envelope_checked(envelope, |e| check_envelope::<Query>(context, e))?
            };
            s.forward();
            let outcome = run_query(&mut s.context, envelope, &request)?;
            s.tracer
                .detail(operation, &format!("evaluated at {}", outcome.version));
            Ok(s.hand_back(outcome.result))
        })
    }

    fn unexpected(operation: &'static str, result: HandedResult) -> ApiError {
        ApiError::from(Error::internal(format!(
            "{} produced {:?}",
            operation, result
        )))
    }

    /// Run a handed-over query's `find` on this session's context
    ///
    /// Returns the envelope handle of the matching row.
    pub fn find_with_handover(&mut self, query: u64, from_row: i64) -> ApiResult<Option<u64>> {
        match self.run_handover("find_with_handover", query, QueryRequest::Find { from_row })? {
            HandedResult::Row(row) => Ok(row),
            other => Err(Self::unexpected("find_with_handover", other)),
        }
    }

    /// Run a handed-over query's `find_all`; returns a view envelope handle
    pub fn find_all_with_handover(&mut self, query: u64, start: i64, end: i64, limit: i64) -> ApiResult<u64> {
        let request = QueryRequest::FindAll { start, end, limit };
        match self.run_handover("find_all_with_handover", query, request)? {
            HandedResult::View(view) => Ok(view),
            other => Err(Self::unexpected("find_all_with_handover", other)),
        }
    }

    /// Run a handed-over query's sorted `find_all`; returns a view envelope handle
    pub fn find_all_sorted_with_handover(
        &mut self,
        query: u64,
        start: i64,
        end: i64,
        limit: i64,
        keys: Vec<(i64, SortOrder)>,
    ) -> ApiResult<u64> {
        let request = QueryRequest::FindAllSorted {
            start,
            end,
            limit,
            keys,
        };
        match self.run_handover("find_all_sorted_with_handover", query, request)? {
            HandedResult::View(view) => Ok(view),
            other => Err(Self::unexpected("find_all_sorted_with_handover", other)),
        }
    }

    /// Run a handed-over query and keep the first row per value of `column`
    pub fn distinct_with_handover(&mut self, query: u64, column: i64) -> ApiResult<u64> {
        match self.run_handover("distinct_with_handover", query, QueryRequest::Distinct { column })? {
            HandedResult::View(view) => Ok(view),
            other => Err(Self::unexpected("distinct_with_handover", other)),
        }
    }

    /// Count a handed-over query's matches at the latest version
    pub fn count_with_handover(&mut self, query: u64, start: i64, end: i64, limit: i64) -> ApiResult<usize> {
        let request = QueryRequest::Count { start, end, limit };
        match self.run_handover("count_with_handover", query, request)? {
            HandedResult::Count(count) => Ok(count),
            other => Err(Self::unexpected("count_with_handover", other)),
        }
    }

    /// Aggregate over a handed-over query's matches at the latest version
    pub fn aggregate_with_handover(&mut self, query: u64, kind: AggregateKind, column: i64) -> ApiResult<Value> {
        let request = QueryRequest::Aggregate { kind, column };
        match self.run_handover("aggregate_with_handover", query, request)? {
            HandedResult::Value(value) => Ok(value),
            other => Err(Self::unexpected("aggregate_with_handover", other)),
        }
    }

    /// Re-run several handed-over queries against one common version
    pub fn batch_update_queries(&mut self, requests: Vec<(u64, QueryRequest)>) -> ApiResult<BatchResult> {
        self.write("batch_update_queries", |s| {
            let handles: Vec<u64> = requests.iter().map(|(handle, _)| *handle).collect();
            let envelopes = s.db.take_envelopes(&handles)?;
            let items = envelopes
                .into_iter()
                .zip(requests)
                .map(|(envelope, (_, request))| BatchItem { envelope, request })
                .collect();
            s.forward();
            let outcome = run_batch(&mut s.context, items)?;
            s.tracer.detail(
                "batch_update_queries",
                &format!("{} results at {}", outcome.results.len(), outcome.version),
            );
            let results = outcome
                .results
                .into_iter()
                .map(|result| s.hand_back(result))
                .collect();
            Ok(BatchResult {
                version: outcome.version,
                results,
            })
        })
    }

    fn import_payload<T: Handover>(&mut self, envelope: u64) -> Result<T> {
        let envelope = {
            let context = &self.context;
            self.db
                .take_envelope_checked(envelope, |e| check_envelope::<T>(context, e))?
        };
        self.forward();
        import(&mut self.context, envelope)
    }

    /// Import a query envelope; returns a query handle
    pub fn import_query(&mut self, envelope: u64) -> ApiResult<u64> {
        self.write("import_query", |s| {
            let query: Query = s.import_payload(envelope)?;
            let context_epoch = s.context.epoch();
            Ok(s.queries.insert(QueryAccessor {
                query,
                context_epoch,
            }))
        })
    }

    /// Import a row envelope; returns a row handle
    pub fn import_row(&mut self, envelope: u64) -> ApiResult<u64> {
        self.write("import_row", |s| {
            let locator: RowLocator = s.import_payload(envelope)?;
            let context_epoch = s.context.epoch();
            Ok(s.rows.insert(RowAccessor {
                locator,
                context_epoch,
            }))
        })
    }

    /// Import a view envelope; returns a view handle
    pub fn import_view(&mut self, envelope: u64) -> ApiResult<u64> {
        self.write("import_view", |s| {
            let view: TableView = s.import_payload(envelope)?;
            Ok(s.view_accessor(view))
        })
    }

    /// Discard an envelope without importing it
    pub fn close_handover(&mut self, envelope: u64) -> ApiResult<()> {
        self.write("close_handover", |s| s.db.take_envelope(envelope).map(drop))
    }
}
