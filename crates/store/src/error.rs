//! Store Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Callers mostly care about one distinction: a record
//! that is simply absent ([`ErrorKind::NotFound`]) versus a store that is not
//! working.

use derive_more::{Display, Error};
use std::io;
use std::path::PathBuf;

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No record under this key.
    #[display("no record at {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    #[display("access to {} was denied", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    #[display("filesystem error: {_0}")]
    Io(io::Error),
    /// The key is absolute, escapes the root, or uses a reserved name.
    #[display("{} is not a valid record key", _0.display())]
    InvalidKey(#[error(not(source))] PathBuf),
    /// Failure specific to one store implementation.
    #[display("{_0}")]
    Backend(#[error(not(source))] String),
}
impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Backend(_))
    }
}
