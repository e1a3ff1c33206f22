//! Caller-visible error taxonomy and wire encoding
//!
//! Every failure that crosses the boundary is an [`ApiError`]. Its
//! [`ErrorKind`] belongs to a closed set; its `code` names the precise cause
//! inside that kind so callers can tell, for example, a detached handle
//! (`Detached`) from a consumed envelope (`AlreadyConsumed`), both of which are
//! `IllegalState`.
//!
//! ## Wire Format
//!
//! ```json
//! {
//!   "kind": "IllegalState",
//!   "code": "Detached",
//!   "message": "Table is no longer valid to operate on.",
//!   "details": {"subject": "Table"}
//! }
//! ```
//!
//! ## Codes
//!
//! | Kind | Codes |
//! |------|-------|
//! | IllegalState | Detached, StateInvalid, SchemaChanged, AlreadyConsumed |
//! | IndexOutOfBounds | ColumnOutOfRange, RowOutOfRange, InvalidRange |
//! | TypeMismatch | TypeMismatch |
//! | BadVersion | BadVersion |
//! | IllegalArgument | IllegalArgument, WrongHandleKind, InvalidConfig |
//! | UnsupportedOperation | Unsupported |
//! | OutOfMemory | OutOfMemory |
//! | FileError | one code per [`FileErrorKind`], plus Io |
//! | RuntimeError | WriterBusy, RuntimeError |
//! | FatalError | Internal, Panic |

use crate::error::{Error, FileErrorKind};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Closed set of caller-visible error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Operation on a detached object or in the wrong transaction state
    IllegalState,
    /// Index or range outside the valid bounds
    IndexOutOfBounds,
    /// Column type differs from the one the operation needs
    TypeMismatch,
    /// Version is unavailable or moves backwards
    BadVersion,
    /// Invalid argument
    IllegalArgument,
    /// Operation not supported on this object or type
    UnsupportedOperation,
    /// Allocation failure
    OutOfMemory,
    /// File-level failure
    FileError(FileErrorKind),
    /// Recoverable engine failure
    RuntimeError,
    /// Unrecoverable failure, including panics caught at the boundary
    FatalError,
}

impl ErrorKind {
    /// Stable name of this kind
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::IllegalState => "IllegalState",
            ErrorKind::IndexOutOfBounds => "IndexOutOfBounds",
            ErrorKind::TypeMismatch => "TypeMismatch",
            ErrorKind::BadVersion => "BadVersion",
            ErrorKind::IllegalArgument => "IllegalArgument",
            ErrorKind::UnsupportedOperation => "UnsupportedOperation",
            ErrorKind::OutOfMemory => "OutOfMemory",
            ErrorKind::FileError(_) => "FileError",
            ErrorKind::RuntimeError => "RuntimeError",
            ErrorKind::FatalError => "FatalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::FileError(kind) => write!(f, "FileError({})", kind),
            other => f.write_str(other.name()),
        }
    }
}

/// Wire error representation for JSON encoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireError {
    /// Error kind name
    pub kind: String,
    /// Precise cause
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Structured details, omitted when empty
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

/// Error returned by every boundary entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    kind: ErrorKind,
    code: &'static str,
    subject: String,
    message: String,
    details: BTreeMap<String, String>,
}

impl ApiError {
    /// Build an error of the given kind
    ///
    /// The code defaults to the kind's name; use [`ApiError::with_code`] to be
    /// more precise.
    pub fn translate(kind: ErrorKind, subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.name(),
            subject: subject.into(),
            message: detail.into(),
            details: BTreeMap::new(),
        }
    }

    /// Error for a panic caught at an entry point
    pub fn fatal(operation: &str, panic_message: &str) -> Self {
        Self::translate(
            ErrorKind::FatalError,
            operation,
            format!("Unrecoverable error: {}", panic_message),
        )
        .with_code("Panic")
    }

    /// Replace the code
    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = code;
        self
    }

    /// Attach a structured detail
    pub fn with_detail(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.details.insert(key.into(), value.to_string());
        self
    }

    /// The error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the precise error code
    pub fn error_code(&self) -> &'static str {
        self.code
    }

    /// Object or operation the error is about
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Structured details
    pub fn details(&self) -> &BTreeMap<String, String> {
        &self.details
    }

    /// Check if this error reports a detached object
    pub fn is_detached(&self) -> bool {
        self.code == "Detached"
    }

    /// Convert to wire error format
    pub fn to_wire_error(&self) -> WireError {
        let mut details = self.details.clone();
        if !self.subject.is_empty() {
            details.insert("subject".to_string(), self.subject.clone());
        }
        if let ErrorKind::FileError(kind) = self.kind {
            details.insert("file_error".to_string(), kind.name().to_string());
        }
        WireError {
            kind: self.kind.name().to_string(),
            code: self.code.to_string(),
            message: self.message.clone(),
            details,
        }
    }

    /// Render the wire error as JSON
    pub fn to_json(&self) -> String {
        match serde_json::to_string(&self.to_wire_error()) {
            Ok(json) => json,
            // WireError holds only strings; serialization cannot fail.
            Err(_) => format!("{{\"kind\":\"{}\",\"code\":\"{}\"}}", self.kind.name(), self.code),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.kind, self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

fn detached_message(subject: &str) -> String {
    match subject {
        "Row" => "Object is no longer valid to operate on. Was it deleted by another thread?"
            .to_string(),
        other => format!("{} is no longer valid to operate on.", other),
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        match err {
            Error::Detached { subject } => {
                ApiError::translate(ErrorKind::IllegalState, subject, detached_message(subject))
                    .with_code("Detached")
            }
            Error::InvalidState(_) => {
                ApiError::translate(ErrorKind::IllegalState, "transaction", message)
                    .with_code("StateInvalid")
            }
            Error::InvalidTransition { operation, state } => {
                ApiError::translate(ErrorKind::IllegalState, "transaction", message)
                    .with_code("StateInvalid")
                    .with_detail("operation", operation)
                    .with_detail("state", state)
            }
            Error::SchemaChanged { subject, table } => {
                ApiError::translate(ErrorKind::IllegalState, subject, message)
                    .with_code("SchemaChanged")
                    .with_detail("table", table)
            }
            Error::AlreadyConsumed { handle } => {
                ApiError::translate(ErrorKind::IllegalState, "Handover", message)
                    .with_code("AlreadyConsumed")
                    .with_detail("handle", handle)
            }
            Error::WriterBusy { waited_ms } => {
                ApiError::translate(ErrorKind::RuntimeError, "transaction", message)
                    .with_code("WriterBusy")
                    .with_detail("waited_ms", waited_ms)
            }
            Error::ColumnOutOfRange { index, count } => {
                ApiError::translate(ErrorKind::IndexOutOfBounds, "column", message)
                    .with_code("ColumnOutOfRange")
                    .with_detail("index", index)
                    .with_detail("count", count)
            }
            Error::RowOutOfRange { index, size, .. } => {
                ApiError::translate(ErrorKind::IndexOutOfBounds, "row", message)
                    .with_code("RowOutOfRange")
                    .with_detail("index", index)
                    .with_detail("size", size)
            }
            Error::InvalidRange(_) => {
                ApiError::translate(ErrorKind::IndexOutOfBounds, "range", message)
                    .with_code("InvalidRange")
            }
            Error::TypeMismatch {
                column,
                expected,
                actual,
            } => ApiError::translate(ErrorKind::TypeMismatch, "column", message)
                .with_detail("column", column)
                .with_detail("expected", expected)
                .with_detail("actual", actual),
            Error::BadVersion { requested, .. } => {
                ApiError::translate(ErrorKind::BadVersion, "version", message)
                    .with_detail("requested", requested)
            }
            Error::WrongHandleKind { raw, expected } => {
                ApiError::translate(ErrorKind::IllegalArgument, expected.name(), message)
                    .with_code("WrongHandleKind")
                    .with_detail("handle", format!("{:#x}", raw))
            }
            Error::IllegalArgument(_) => {
                ApiError::translate(ErrorKind::IllegalArgument, "argument", message)
            }
            Error::Unsupported(_) => {
                ApiError::translate(ErrorKind::UnsupportedOperation, "operation", message)
                    .with_code("Unsupported")
            }
            Error::OutOfMemory(_) => ApiError::translate(ErrorKind::OutOfMemory, "memory", message),
            Error::Io(io) => {
                let kind = FileErrorKind::from_io(io.kind());
                ApiError::translate(ErrorKind::FileError(kind), "file", message).with_code("Io")
            }
            Error::File { kind, path, .. } => {
                ApiError::translate(ErrorKind::FileError(kind), "file", message)
                    .with_code(kind.name())
                    .with_detail("path", path)
            }
            Error::InvalidConfig(_) => {
                ApiError::translate(ErrorKind::IllegalArgument, "configuration", message)
                    .with_code("InvalidConfig")
            }
            Error::Internal(_) => ApiError::translate(ErrorKind::FatalError, "engine", message)
                .with_code("Internal"),
        }
    }
}
