//! Boundary engine for baton
//!
//! This crate ties the store, contexts and handover together behind opaque
//! integer handles:
//! - Database: shared store plus the cross-thread envelope registry
//! - Session: per-thread entry points, each guarded and translated
//! - Arena: generation-checked handle slots
//! - Validation: attached / column / row / type / range checks
//! - Coordinator: run one handed-over query on a worker context
//! - Batch: run several handed-over queries at one common version

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accessor;
pub mod batch;
pub mod coordinator;
pub mod database;
pub mod handles;
pub mod session;
pub mod trace;
pub mod validation;

pub use accessor::Attached;
pub use batch::{run_batch, BatchItem, BatchOutcome};
pub use coordinator::{run_query, QueryOutcome, QueryRequest, QueryResult};
pub use database::Database;
pub use handles::Arena;
pub use session::{ApiResult, BatchResult, HandedResult, Session};
pub use trace::Tracer;
pub use validation::{
    validate_attached, validate_column, validate_link_like, validate_link_target, validate_nullable,
    validate_range, validate_row, validate_type, validate_value, validate_writable, Access,
    Checked,
};
