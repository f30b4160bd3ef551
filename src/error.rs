//! Application Error Types
//!
//! Every library crate has its own error tree; these kinds only say which
//! phase of a command gave up, and the tree underneath says why.

use derive_more::{Display, Error};

/// An application error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for command execution.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("invalid configuration")]
    Config,
    #[display("required command-line client is not available")]
    Toolchain,
    #[display("batch run aborted")]
    Batch,
    #[display("could not write the run summary")]
    Report,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Batch | Self::Report)
    }
}
