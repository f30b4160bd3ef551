//! Gateway Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Only failures that make *every* invocation impossible are errors here. A
//! process that runs but exits badly, or runs for too long, is a normal
//! [`Outcome`](crate::Outcome) for the caller to interpret.

use crate::Tool;
use derive_more::{Display, Error};

/// A gateway error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The executable is missing from the system, or could not be started.
    #[display("{_0} CLI could not be launched; install it from {}", _0.install_hint())]
    Launch(#[error(not(source))] Tool),
    /// The process started but its output could not be collected.
    #[display("I/O error while running the {_0} CLI")]
    Io(#[error(not(source))] Tool),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
