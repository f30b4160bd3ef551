//! Invocation of the external command-line clients.
//!
//! Everything the batch engine learns from the storage network or the wallet
//! comes through the [`Gateway`] trait: run one allow-listed [`Tool`] with a
//! discrete argument vector (never through a shell), wait at most `timeout`,
//! and hand back a tagged [`Outcome`]. Interpreting exit codes and output is
//! the caller's business.

pub mod error;
#[cfg(feature = "mock")]
mod mock;
mod process;
mod tool;

#[cfg(feature = "mock")]
pub use crate::mock::{Invocation, MockGateway};
pub use crate::process::ProcessGateway;
pub use crate::tool::{Tool, Toolchain};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub type GatewayHandle = Arc<dyn Gateway + Send + Sync>;

/// How a single external invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The process exited with status zero.
    Completed { stdout: String, stderr: String },
    /// The process exited with a non-zero status, or was killed by a signal
    /// (in which case there is no `code`).
    NonZeroExit { code: Option<i32>, stdout: String, stderr: String },
    /// The process ran past its deadline and was killed.
    TimedOut { after: Duration },
}
impl Outcome {
    pub fn completed(stdout: impl Into<String>) -> Self {
        Self::Completed { stdout: stdout.into(), stderr: String::new() }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self::NonZeroExit { code: Some(code), stdout: String::new(), stderr: stderr.into() }
    }
}

/// Runs external tools on behalf of the batch engine.
///
/// Implementations share no state between invocations; each call gets its
/// own process, so the trait is safe to drive from many workers at once.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Run `tool` with `args`, capturing its output in full.
    ///
    /// # Errors
    /// [`Launch`](crate::error::ErrorKind::Launch) when the executable is
    /// missing or cannot be started; [`Io`](crate::error::ErrorKind::Io)
    /// when its output could not be collected. A non-zero exit or a timeout
    /// is **not** an error.
    async fn invoke(&self, tool: Tool, args: &[String], timeout: Duration) -> Result<Outcome>;
}
