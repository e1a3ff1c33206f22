//! Core types for baton
//!
//! This crate defines the vocabulary shared by every layer:
//! - Value: cell values stored in tables
//! - Types: versions, store and table identities, column schema, handles
//! - Error: internal errors and the caller-visible `ApiError` taxonomy
//! - Config: settings a store is opened with

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api_error;
pub mod config;
pub mod error;
pub mod types;
pub mod value;

pub use api_error::{ApiError, ErrorKind, WireError};
pub use config::{BoundaryConfig, Durability, TraceLevel};
pub use error::{Error, FileErrorKind, Result};
pub use types::{
    AggregateKind, ColumnDescriptor, ColumnType, ContextId, Handle, HandleKind, HandoverPolicy,
    SortOrder, StoreId, TableKey, VersionId,
};
pub use value::Value;
