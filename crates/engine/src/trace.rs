//! Entry-point tracing gated by [`TraceLevel`]
//!
//! Errors are always logged. `Enter`, `Detail` and `Leave` add entry,
//! detail and exit events respectively; each level includes the ones
//! below it.

use baton_core::{ApiError, ErrorKind, TraceLevel};
use tracing::{debug, trace, warn};

/// Level-gated event emitter for one session
#[derive(Debug, Clone, Copy)]
pub struct Tracer {
    level: TraceLevel,
}

impl Tracer {
    /// Create a tracer at `level`
    pub fn new(level: TraceLevel) -> Self {
        Self { level }
    }

    /// Configured level
    pub fn level(&self) -> TraceLevel {
        self.level
    }

    /// Entry into a boundary operation
    pub fn enter(&self, operation: &'static str) {
        if self.level >= TraceLevel::Enter {
            trace!(operation, "enter");
        }
    }

    /// Intermediate detail inside an operation
    pub fn detail(&self, operation: &'static str, message: &str) {
        if self.level >= TraceLevel::Detail {
            trace!(operation, detail = message, "detail");
        }
    }

    /// Successful exit from an operation
    pub fn leave(&self, operation: &'static str) {
        if self.level >= TraceLevel::Leave {
            trace!(operation, "leave");
        }
    }

    /// Failed exit from an operation
    pub fn failed(&self, operation: &'static str, error: &ApiError) {
        match error.kind() {
            ErrorKind::FatalError | ErrorKind::OutOfMemory => warn!(
                operation,
                kind = %error.kind(),
                code = error.error_code(),
                error = %error.message(),
                "Boundary operation failed"
            ),
            _ => debug!(
                operation,
                kind = %error.kind(),
                code = error.error_code(),
                error = %error.message(),
                "Boundary operation failed"
            ),
        }
    }
}
