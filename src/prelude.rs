//! Convenient imports for Baton.
//!
//! ```ignore
//! use baton::prelude::*;
//!
//! let db = Baton::in_memory()?;
//! let mut session = db.session();
//! session.begin_read()?;
//! ```

// Main entry point
pub use crate::database::{Baton, BatonBuilder};

// Error handling
pub use crate::error::{Error, Result};
pub use baton_core::{ApiError, ErrorKind};
pub use baton_engine::ApiResult;

// Sessions and handover
pub use baton_engine::{BatchResult, HandedResult, QueryRequest, Session};

// Core types
pub use baton_core::{AggregateKind, ColumnType, HandoverPolicy, SortOrder, Value, VersionId};

// Queries
pub use baton_storage::{Condition, Predicate};

// Configuration
pub use baton_core::{BoundaryConfig, Durability, TraceLevel};
