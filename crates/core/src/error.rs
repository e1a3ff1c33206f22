//! Internal error type
//!
//! [`Error`] is what every layer below the boundary returns. It is never
//! handed to a caller directly: the session translates it into an
//! [`ApiError`](crate::ApiError) at the entry point.

use crate::types::{ColumnType, HandleKind, VersionId};
use std::fmt;
use thiserror::Error;

/// Result type used below the boundary
pub type Result<T> = std::result::Result<T, Error>;

/// Cause of a file-level failure reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileErrorKind {
    /// Generic access failure
    AccessError,
    /// Permission denied by the file system
    PermissionDenied,
    /// File exists but exclusive creation was requested
    Exists,
    /// File does not exist
    NotFound,
    /// Lock file was produced by an incompatible version
    IncompatibleLockFile,
    /// File format needs an upgrade that was not allowed
    FormatUpgradeRequired,
}

impl FileErrorKind {
    /// Stable name of this kind
    pub fn name(&self) -> &'static str {
        match self {
            FileErrorKind::AccessError => "AccessError",
            FileErrorKind::PermissionDenied => "PermissionDenied",
            FileErrorKind::Exists => "Exists",
            FileErrorKind::NotFound => "NotFound",
            FileErrorKind::IncompatibleLockFile => "IncompatibleLockFile",
            FileErrorKind::FormatUpgradeRequired => "FormatUpgradeRequired",
        }
    }

    /// Classify an I/O error
    pub fn from_io(kind: std::io::ErrorKind) -> Self {
        match kind {
            std::io::ErrorKind::NotFound => FileErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => FileErrorKind::PermissionDenied,
            std::io::ErrorKind::AlreadyExists => FileErrorKind::Exists,
            _ => FileErrorKind::AccessError,
        }
    }
}

impl fmt::Display for FileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every failure that can occur below the boundary
#[derive(Debug, Error)]
pub enum Error {
    /// The object is no longer part of a live transaction or schema
    #[error("{subject} is no longer valid to operate on")]
    Detached {
        /// Kind of object, e.g. "Table" or "Row"
        subject: &'static str,
    },

    /// The operation is not allowed in the current state
    #[error("{0}")]
    InvalidState(String),

    /// Transaction state machine violation
    #[error("cannot {operation} while {state}")]
    InvalidTransition {
        /// Operation that was attempted
        operation: &'static str,
        /// State the context was in
        state: String,
    },

    /// A table an in-flight object depends on was removed or reshaped
    #[error("{subject} depends on {table}, which was removed or changed its schema")]
    SchemaChanged {
        /// Kind of object
        subject: &'static str,
        /// Table that changed
        table: String,
    },

    /// A handover envelope was imported or closed before
    #[error("handover {handle} has already been consumed")]
    AlreadyConsumed {
        /// Printable handle
        handle: String,
    },

    /// Another context holds the single-writer lock
    #[error("write lock is held by another context (waited {waited_ms}ms)")]
    WriterBusy {
        /// How long the caller waited
        waited_ms: u64,
    },

    /// Column index outside `[0, count)`
    #[error("{}", column_bound(*.index))]
    ColumnOutOfRange {
        /// Requested index
        index: i64,
        /// Number of columns
        count: usize,
    },

    /// Row index outside the table
    #[error("{}", row_bound(*.index, *.size, *.allow_end))]
    RowOutOfRange {
        /// Requested index
        index: i64,
        /// Table size
        size: usize,
        /// Whether one-past-the-end was allowed
        allow_end: bool,
    },

    /// Invalid start/end/limit combination
    #[error("{0}")]
    InvalidRange(String),

    /// Column type differs from the expected one
    #[error("column {column} has type {actual}, expected {expected}")]
    TypeMismatch {
        /// Column index
        column: usize,
        /// Expected type
        expected: ColumnType,
        /// Declared (or runtime, for Mixed) type
        actual: String,
    },

    /// Requested version cannot be read
    #[error("version {requested} is not available: {reason}")]
    BadVersion {
        /// Version that was asked for
        requested: VersionId,
        /// Why it is unavailable
        reason: String,
    },

    /// Handle decoded to a different kind of object
    #[error("handle {raw:#x} does not refer to a {expected}")]
    WrongHandleKind {
        /// Raw handle value
        raw: u64,
        /// Kind the operation needs
        expected: HandleKind,
    },

    /// Invalid input
    #[error("{0}")]
    IllegalArgument(String),

    /// Operation not supported for this object or type
    #[error("{0}")]
    Unsupported(String),

    /// Allocation failed
    #[error("{0}")]
    OutOfMemory(String),

    /// I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File-level failure with a classified cause
    #[error("{kind} on '{path}': {message}")]
    File {
        /// Classified cause
        kind: FileErrorKind,
        /// File involved
        path: String,
        /// Engine message
        message: String,
    },

    /// Configuration could not be parsed or is inconsistent
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Bug or broken invariant
    #[error("internal error: {0}")]
    Internal(String),
}

fn column_bound(index: i64) -> &'static str {
    if index < 0 {
        "columnIndex is less than 0."
    } else {
        "columnIndex > available columns."
    }
}

fn row_bound(index: i64, size: usize, allow_end: bool) -> String {
    if index < 0 {
        "rowIndex is less than 0.".to_string()
    } else if allow_end {
        format!("rowIndex {} > available rows ({}).", index, size)
    } else {
        format!("rowIndex {} >= available rows ({}).", index, size)
    }
}

impl Error {
    /// Object is no longer attached
    pub fn detached(subject: &'static str) -> Self {
        Error::Detached { subject }
    }

    /// Invalid input
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Error::IllegalArgument(message.into())
    }

    /// Invalid state
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState(message.into())
    }

    /// Bug or broken invariant
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }

    /// Unsupported operation
    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::Unsupported(message.into())
    }

    /// Check if this is a detachment error
    pub fn is_detached(&self) -> bool {
        matches!(self, Error::Detached { .. })
    }

    /// Check if this is a version error
    pub fn is_bad_version(&self) -> bool {
        matches!(self, Error::BadVersion { .. })
    }

    /// Check if this is a bounds error
    pub fn is_out_of_range(&self) -> bool {
        matches!(
            self,
            Error::ColumnOutOfRange { .. } | Error::RowOutOfRange { .. } | Error::InvalidRange(_)
        )
    }
}
