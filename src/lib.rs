//! # Baton
//!
//! Thread-confined access to a versioned table store, with explicit handover
//! of query results between threads.
//!
//! Every object a caller holds is an opaque `u64` handle owned by one
//! [`Session`]. Objects never cross threads directly: a session exports them
//! into an envelope, and another session imports the envelope or runs the
//! exported query against its own snapshot.
//!
//! ## Quick Start
//!
//! ```ignore
//! use baton::prelude::*;
//!
//! let db = Baton::in_memory()?;
//! let mut ui = db.session();
//!
//! ui.begin_write()?;
//! let people = ui.add_table("people")?;
//! ui.add_column(people, ColumnType::String, "name", false)?;
//! ui.add_column(people, ColumnType::Int, "age", false)?;
//! let row = ui.add_empty_row(people)? as i64;
//! ui.set_string(people, 0, row, "Ann")?;
//! ui.set_int(people, 1, row, 30)?;
//! ui.commit_and_continue_as_read()?;
//!
//! // Hand an "age > 26" query to a worker
//! let query = ui.where_table(people)?;
//! ui.query_filter(query, Predicate::compare(1, Condition::Greater, 26i64))?;
//! let envelope = ui.export_query(query, HandoverPolicy::Copy)?;
//!
//! let worker_db = db.clone();
//! let view = std::thread::spawn(move || {
//!     let mut worker = worker_db.session();
//!     worker.find_all_with_handover(envelope, 0, -1, -1)
//! })
//! .join()
//! .unwrap()?;
//!
//! // Back on the first thread
//! ui.advance_read()?;
//! let matches = ui.import_view(view)?;
//! assert_eq!(ui.view_size(matches)?, 1);
//! ```
//!
//! ## Layers
//!
//! - [`baton_core`] - values, identities, config, error taxonomy
//! - [`baton_storage`] - the versioned in-memory store
//! - [`baton_concurrency`] - transaction contexts and handover envelopes
//! - [`baton_engine`] - sessions, validation, handover coordinator

#![warn(missing_docs)]

mod database;
mod error;

pub mod prelude;

// Re-export main entry points
pub use database::{Baton, BatonBuilder, BatonMetrics};
pub use error::{Error, Result};

// Re-export the boundary surface
pub use baton_engine::{ApiResult, BatchResult, HandedResult, QueryRequest, Session};

// Re-export types
pub use baton_concurrency::TransactionState;
pub use baton_core::{
    AggregateKind, ApiError, BoundaryConfig, ColumnType, Durability, ErrorKind, FileErrorKind,
    HandoverPolicy, SortOrder, StoreId, TraceLevel, Value, VersionId, WireError,
};
pub use baton_storage::{Condition, Predicate};

pub use baton_concurrency;
pub use baton_core;
pub use baton_engine;
pub use baton_storage;
