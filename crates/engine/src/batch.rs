//! Batch query coordinator
//!
//! Re-runs several handed-over queries at once. All envelopes must have been
//! exported at the same version; the worker pins that version, imports every
//! query, advances once to the latest version and evaluates them in order,
//! so every result reflects the same snapshot.
//!
//! The batch is checked as a whole before anything is imported: an empty
//! batch, a non-query envelope or mismatched export versions reject it.

use crate::coordinator::{check_still_valid, evaluate, release_read, QueryRequest, QueryResult};
use baton_concurrency::{check_envelope, import, HandoverEnvelope, TransactionContext};
use baton_core::{Error, Result, VersionId};
use baton_storage::Query;
use tracing::debug;

/// One query of a batch
#[derive(Debug)]
pub struct BatchItem {
    /// Exported query
    pub envelope: HandoverEnvelope,
    /// What to compute with it
    pub request: QueryRequest,
}

/// Results of a batch, in input order
#[derive(Debug)]
pub struct BatchOutcome {
    /// Version every result was computed at
    pub version: VersionId,
    /// One result per item
    pub results: Vec<QueryResult>,
}

fn check_batch(worker: &TransactionContext, items: &[BatchItem]) -> Result<VersionId> {
    let first = items
        .first()
        .ok_or_else(|| Error::illegal_argument("Batch must contain at least one query"))?;
    let version = first.envelope.version();
    for (position, item) in items.iter().enumerate() {
        if !item.envelope.is_query() {
            return Err(Error::illegal_argument(format!(
                "Batch entry {} holds a {}, not a Query",
                position,
                item.envelope.kind_name()
            )));
        }
        check_envelope::<Query>(worker, &item.envelope)?;
        if item.envelope.version() != version {
            return Err(Error::BadVersion {
                requested: item.envelope.version(),
                reason: format!(
                    "batch entry {} was exported at a different version than entry 0 ({})",
                    position, version
                ),
            });
        }
    }
    Ok(version)
}

fn run_pinned(worker: &mut TransactionContext, items: Vec<BatchItem>) -> Result<BatchOutcome> {
    let mut results = Vec::new();
    results
        .try_reserve_exact(items.len())
        .map_err(|_| Error::OutOfMemory("Could not allocate memory to return updated queries.".into()))?;

    let mut queries = Vec::with_capacity(items.len());
    for item in items {
        let query: Query = import(worker, item.envelope)?;
        queries.push((query, item.request));
    }

    let report = worker.advance_read(None)?;
    for (query, _) in &queries {
        check_still_valid(query, &report, worker)?;
    }

    for (query, request) in &queries {
        results.push(evaluate(worker, query, request)?);
    }
    let version = worker
        .version()
        .ok_or_else(|| Error::internal("worker lost its read transaction"))?;
    Ok(BatchOutcome { version, results })
}

/// Run a batch of handed-over queries on `worker`
pub fn run_batch(worker: &mut TransactionContext, items: Vec<BatchItem>) -> Result<BatchOutcome> {
    let exported_at = check_batch(worker, &items)?;
    release_read(worker, "batch")?;
    worker.begin_read(Some(exported_at))?;
    debug!(
        context = %worker.id(),
        queries = items.len(),
        exported_at = %exported_at,
        "Running query batch"
    );
    match run_pinned(worker, items) {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            if worker.is_in_transaction() {
                let _ = worker.end_read();
            }
            Err(e)
        }
    }
}
