//! Background query coordinator
//!
//! Runs one handed-over query on a worker context and hands the result back:
//!
//! ```text
//! caller@V: export(query) ───────────────► envelope{Query, V}
//! worker:   end_read (if reading)
//!           begin_read(latest) == V ?  yes: reuse
//!                                      no:  end_read, begin_read(@V)
//!           import(envelope)
//!           historical pin: advance_read(latest), reject if table reshaped
//!           evaluate (find / find_all / sort / distinct / count / aggregate)
//!           export(result, Move) ───────► envelope{Row|TableView, V'}
//! ```
//!
//! Any failure after the worker pinned a version ends its read transaction
//! before the error is returned. The input envelope is consumed either way.

use crate::validation::{validate_column, validate_range, validate_row};
use baton_concurrency::{
    check_envelope, export, import, AdvanceReport, HandoverEnvelope, RowLocator, Source,
    TransactionContext, TransactionState,
};
use baton_core::{AggregateKind, Error, Result, SortOrder, Value, VersionId};
use baton_storage::{check_distinct, Query, RowRange, SortDescriptor, TableView};
use tracing::debug;

/// What to compute with a handed-over query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryRequest {
    /// First match at or after `from_row`
    Find {
        /// Row to start searching at
        from_row: i64,
    },
    /// All matches in a window
    FindAll {
        /// First row, `0..=size`
        start: i64,
        /// One past the last row, or -1 for the table size
        end: i64,
        /// Maximum number of matches, or -1
        limit: i64,
    },
    /// All matches in a window, sorted
    FindAllSorted {
        /// First row
        start: i64,
        /// One past the last row, or -1
        end: i64,
        /// Maximum number of matches, or -1
        limit: i64,
        /// Sort keys as (column, order)
        keys: Vec<(i64, SortOrder)>,
    },
    /// First match per distinct value of a column
    Distinct {
        /// Column to deduplicate on
        column: i64,
    },
    /// Number of matches in a window
    Count {
        /// First row
        start: i64,
        /// One past the last row, or -1
        end: i64,
        /// Maximum number of matches, or -1
        limit: i64,
    },
    /// Aggregate over all matches
    Aggregate {
        /// Aggregate function
        kind: AggregateKind,
        /// Column to aggregate
        column: i64,
    },
}

impl QueryRequest {
    /// All matches in the whole table
    pub fn find_all() -> Self {
        QueryRequest::FindAll {
            start: 0,
            end: -1,
            limit: -1,
        }
    }

    /// Operation name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            QueryRequest::Find { .. } => "find",
            QueryRequest::FindAll { .. } => "find_all",
            QueryRequest::FindAllSorted { .. } => "find_all_sorted",
            QueryRequest::Distinct { .. } => "distinct",
            QueryRequest::Count { .. } => "count",
            QueryRequest::Aggregate { .. } => "aggregate",
        }
    }
}

/// Result of one evaluated request
#[derive(Debug)]
pub enum QueryResult {
    /// Matching row, exported for the caller
    Row(Option<HandoverEnvelope>),
    /// Result view, exported for the caller
    View(HandoverEnvelope),
    /// Number of matches
    Count(usize),
    /// Aggregate value
    Value(Value),
}

/// Result plus the version it was computed at
#[derive(Debug)]
pub struct QueryOutcome {
    /// Version the worker evaluated at
    pub version: VersionId,
    /// The result
    pub result: QueryResult,
}

/// Leave any read transaction so the worker can pin afresh
pub(crate) fn release_read(worker: &mut TransactionContext, operation: &'static str) -> Result<()> {
    match worker.state() {
        TransactionState::Idle => Ok(()),
        TransactionState::ReadPinned(_) => worker.end_read(),
        TransactionState::WritePending(_) => Err(Error::invalid_state(format!(
            "Cannot run {} on a context with an open write transaction",
            operation
        ))),
    }
}

/// Pin `target` on an idle worker; returns true when the pin is historical
///
/// A fresh read is reused when it lands exactly on `target`. Otherwise the
/// worker reads at `target` itself and must advance before evaluating.
pub(crate) fn pin_exported_version(worker: &mut TransactionContext, target: VersionId) -> Result<bool> {
    let fresh = worker.begin_read(None)?;
    if fresh == target {
        return Ok(false);
    }
    worker.end_read()?;
    worker.begin_read(Some(target))?;
    Ok(true)
}

/// Evaluate `request` against the worker's current snapshot
pub(crate) fn evaluate(
    worker: &TransactionContext,
    query: &Query,
    request: &QueryRequest,
) -> Result<QueryResult> {
    let table = worker.group()?.require_table(query.table())?;
    query.validate(table)?;
    Ok(match request {
        QueryRequest::Find { from_row } => {
            let from = validate_row(table, *from_row, true)?;
            match query.find(table, from)? {
                Some(row) => QueryResult::Row(Some(export(
                    worker,
                    Source::Owned(RowLocator::new(table, row)),
                )?)),
                None => QueryResult::Row(None),
            }
        }
        QueryRequest::FindAll { start, end, limit } => {
            let range = validate_range(table.size(), *start, *end, *limit)?;
            let view = TableView::from_query(table, query.clone(), range)?;
            QueryResult::View(export(worker, Source::Owned(view))?)
        }
        QueryRequest::FindAllSorted {
            start,
            end,
            limit,
            keys,
        } => {
            let range = validate_range(table.size(), *start, *end, *limit)?;
            let keys = keys
                .iter()
                .map(|&(column, order)| Ok((validate_column(table, column)?, order)))
                .collect::<Result<Vec<_>>>()?;
            let descriptor = SortDescriptor::new(table, keys)?;
            let mut view = TableView::from_query(table, query.clone(), range)?;
            view.sort(table, descriptor)?;
            QueryResult::View(export(worker, Source::Owned(view))?)
        }
        QueryRequest::Distinct { column } => {
            let column = validate_column(table, *column)?;
            check_distinct(table, column)?;
            let mut view = TableView::from_query(table, query.clone(), RowRange::all())?;
            view.distinct(table, column)?;
            QueryResult::View(export(worker, Source::Owned(view))?)
        }
        QueryRequest::Count { start, end, limit } => {
            let range = validate_range(table.size(), *start, *end, *limit)?;
            QueryResult::Count(query.count(table, range)?)
        }
        QueryRequest::Aggregate { kind, column } => {
            let column = validate_column(table, *column)?;
            QueryResult::Value(query.aggregate(table, *kind, column, RowRange::all())?)
        }
    })
}

/// Fail if advancing past the export version removed or reshaped `query`'s table
pub(crate) fn check_still_valid(
    query: &Query,
    report: &AdvanceReport,
    worker: &TransactionContext,
) -> Result<()> {
    if !report.invalidates(query.table()) {
        return Ok(());
    }
    let table = worker
        .group()?
        .table(query.table())
        .map(|t| t.name().to_string())
        .unwrap_or_else(|| query.table().to_string());
    Err(Error::SchemaChanged {
        subject: "Query",
        table,
    })
}

fn run_pinned(
    worker: &mut TransactionContext,
    envelope: HandoverEnvelope,
    request: &QueryRequest,
    historical: bool,
) -> Result<QueryOutcome> {
    let query: Query = import(worker, envelope)?;
    if historical {
        let report = worker.advance_read(None)?;
        check_still_valid(&query, &report, worker)?;
    }
    let result = evaluate(worker, &query, request)?;
    let version = worker
        .version()
        .ok_or_else(|| Error::internal("worker lost its read transaction"))?;
    Ok(QueryOutcome { version, result })
}

/// Run one handed-over query on `worker`
pub fn run_query(
    worker: &mut TransactionContext,
    envelope: HandoverEnvelope,
    request: &QueryRequest,
) -> Result<QueryOutcome> {
    check_envelope::<Query>(worker, &envelope)?;
    release_read(worker, request.name())?;
    let exported_at = envelope.version();
    let historical = pin_exported_version(worker, exported_at)?;
    debug!(
        context = %worker.id(),
        operation = request.name(),
        exported_at = %exported_at,
        historical,
        "Running handed-over query"
    );
    match run_pinned(worker, envelope, request, historical) {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            if worker.is_in_transaction() {
                let _ = worker.end_read();
            }
            Err(e)
        }
    }
}
