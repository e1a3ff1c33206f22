//! In-memory reference engine for baton
//!
//! This crate implements the engine the boundary layer drives:
//! - SharedStore: versioned snapshots, single-writer lock, bounded history
//! - Group / Table: copy-on-write snapshot of typed tables
//! - Query / TableView: predicate evaluation, sorting, distinct, aggregates
//! - Changeset: per-commit change log replayed when a reader advances

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod changeset;
pub mod group;
pub mod query;
pub mod store;
pub mod table;
pub mod view;

pub use changeset::{ChangeSummary, Changeset};
pub use group::Group;
pub use query::{aggregate, Condition, Predicate, Query, RowRange};
pub use store::{EngineStats, SharedStore};
pub use table::Table;
pub use view::{check_distinct, SortDescriptor, TableView};
