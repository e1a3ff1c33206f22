//! Error type of the facade
//!
//! Boundary calls already return [`ApiError`]; this type adds the failures
//! that happen before a database exists (reading and parsing configuration).

use baton_core::{ApiError, ErrorKind};
use thiserror::Error;

/// All facade errors
#[derive(Debug, Error)]
pub enum Error {
    /// A boundary call failed
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for facade operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Caller-visible kind, when the error came from a boundary call
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Api(e) => Some(e.kind()),
            Error::Config(_) => None,
        }
    }

    /// Check if a handle was used after its object stopped being live
    pub fn is_detached(&self) -> bool {
        matches!(self, Error::Api(e) if e.is_detached())
    }

    /// Check if a requested version is unavailable
    pub fn is_bad_version(&self) -> bool {
        self.kind() == Some(ErrorKind::BadVersion)
    }

    /// Check if the error is unrecoverable
    pub fn is_serious(&self) -> bool {
        self.kind() == Some(ErrorKind::FatalError)
    }
}

impl From<baton_core::Error> for Error {
    fn from(e: baton_core::Error) -> Self {
        match e {
            baton_core::Error::InvalidConfig(message) => Error::Config(message),
            other => Error::Api(ApiError::from(other)),
        }
    }
}
