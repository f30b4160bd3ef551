//! Batch Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.
//!
//! Only run-level failures live here. Anything that goes wrong with a single
//! item (a non-zero exit, a timeout, output that cannot be parsed) is recorded
//! as a failed [`ItemResult`](crate::ItemResult) and never aborts the batch.

use crate::models::{Amount, Token};
use derive_more::{Display, Error};
use std::path::PathBuf;

/// A batch error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for batch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a whole run stops early.
///
/// ### Setup Errors
/// - [`ErrorKind::Discovery`]
/// - [`ErrorKind::Store`]
///
/// ### Run Errors
/// - [`ErrorKind::Launch`] - no item can proceed without the client.
/// - [`ErrorKind::Persistence`] - a result was produced but could not be kept.
///
/// ### Funding Errors
/// - [`ErrorKind::Balance`]
/// - [`ErrorKind::InsufficientFunds`]
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The image directory does not exist, is not a directory, or could not
    /// be walked.
    #[display("could not discover images in {}", _0.display())]
    Discovery(#[error(not(source))] PathBuf),
    /// The result store for a namespace could not be opened.
    #[display("could not open the {_0} result store")]
    Store(#[error(not(source))] &'static str),
    /// An external client could not be started.
    #[display("external client could not be launched")]
    Launch,
    /// Reading or writing the stored result for an item failed.
    #[display("could not persist the result for `{_0}`")]
    Persistence(#[error(not(source))] String),
    /// The wallet balance could not be determined, so funding cannot be
    /// verified.
    #[display("wallet balance could not be determined: {_0}")]
    Balance(#[error(not(source))] String),
    /// The wallet cannot cover the projected cost of the run.
    #[display("insufficient {token} balance: {} needed, {} available", token.format(*needed), token.format(*available))]
    InsufficientFunds { token: Token, needed: Amount, available: Amount },
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Balance(_) | Self::Persistence(_))
    }
}
