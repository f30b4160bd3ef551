use crate::error::{ErrorKind, Result};
use crate::{Gateway, Outcome, Tool, Toolchain};
use async_trait::async_trait;
use exn::ResultExt;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::instrument;

/// Runs tools as real operating system processes.
#[derive(Clone, Debug)]
pub struct ProcessGateway {
    toolchain: Toolchain,
}
impl ProcessGateway {
    pub fn new(toolchain: Toolchain) -> Self {
        Self { toolchain }
    }

    /// Fail early with [`ErrorKind::Launch`] if `tool` is not installed.
    pub fn check(&self, tool: Tool) -> Result<&Path> {
        self.toolchain.locate(tool)
    }
}

#[async_trait]
impl Gateway for ProcessGateway {
    #[instrument(level = "debug", skip_all, fields(%tool))]
    async fn invoke(&self, tool: Tool, args: &[String], timeout: Duration) -> Result<Outcome> {
        let program = self.toolchain.locate(tool)?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Covers the future being dropped mid-flight (Ctrl-C, aborted batch).
            .kill_on_drop(true)
            .spawn()
            .or_raise(|| ErrorKind::Launch(tool))?;

        // Both pipes must be drained while waiting, otherwise a chatty process
        // fills the pipe buffer and never exits.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let finished = tokio::time::timeout(timeout, futures::future::try_join3(child.wait(), stdout, stderr)).await;

        match finished {
            Ok(Ok((status, stdout, stderr))) => {
                let stdout = String::from_utf8_lossy(&stdout).into_owned();
                let stderr = String::from_utf8_lossy(&stderr).into_owned();
                tracing::debug!(code = ?status.code(), stdout = stdout.len(), stderr = stderr.len(), "External tool exited");
                Ok(match status.success() {
                    true => Outcome::Completed { stdout, stderr },
                    false => Outcome::NonZeroExit { code: status.code(), stdout, stderr },
                })
            },
            Ok(Err(e)) => Err(e).or_raise(|| ErrorKind::Io(tool)),
            Err(_) => {
                // `kill()` also waits, so nothing is left running (or unreaped) after this.
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "Could not kill timed-out process; it may have exited on its own");
                }
                tracing::debug!(timeout = ?timeout, "External tool timed out");
                Ok(Outcome::TimedOut { after: timeout })
            },
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}
