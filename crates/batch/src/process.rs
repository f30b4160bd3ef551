use crate::error::{ErrorKind, Result};
use crate::models::{ItemResult, Mode, WorkItem};
use crate::parse::{self, Request};
use exn::ResultExt;
use std::time::Duration;
use tracing::instrument;
use walsim_config::{Epochs, Network};
use walsim_gateway::error::ErrorKind as GatewayErrorKind;
use walsim_gateway::{GatewayHandle, Outcome, Tool};

/// Longest piece of client output quoted in a failure message.
const EXCERPT_LIMIT: usize = 512;

/// Parameters shared by every `walrus store` invocation of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreOptions {
    pub context: Network,
    pub epochs: Epochs,
    pub share: bool,
    pub timeout: Duration,
}

/// Turns one [`WorkItem`] into one [`ItemResult`] with a single invocation
/// of the storage client.
#[derive(Clone)]
pub struct Processor {
    gateway: GatewayHandle,
    options: StoreOptions,
}

impl Processor {
    pub fn new(gateway: GatewayHandle, options: StoreOptions) -> Self {
        Self { gateway, options }
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// The exact argument vector handed to the storage client.
    pub fn arguments(&self, item: &WorkItem, mode: Mode) -> Vec<String> {
        let mut args = vec![
            "store".to_string(),
            item.path.to_string_lossy().into_owned(),
            "--context".to_string(),
            self.options.context.to_string(),
            "--epochs".to_string(),
            self.options.epochs.to_string(),
            "--json".to_string(),
        ];
        if mode.is_dry_run() {
            args.push("--dry-run".to_string());
        }
        if self.options.share {
            args.push("--share".to_string());
        }
        args
    }

    /// Process `item`, producing a success or failure result.
    ///
    /// Whatever happens to the item itself (a non-zero exit, a timeout,
    /// unusable output) ends up in the returned [`ItemResult`].
    ///
    /// # Errors
    /// [`ErrorKind::Launch`] when the storage client cannot be started at all;
    /// the rest of the batch would fail the same way.
    #[instrument(level = "debug", skip_all, fields(key = %item.key, %mode))]
    pub async fn process(&self, item: &WorkItem, mode: Mode) -> Result<ItemResult> {
        let args = self.arguments(item, mode);
        let outcome = match self.gateway.invoke(Tool::Walrus, &args, self.options.timeout).await {
            Ok(outcome) => outcome,
            Err(e) if matches!(&*e, GatewayErrorKind::Launch(_)) => return Err(e).or_raise(|| ErrorKind::Launch),
            Err(e) => {
                let reason = (*e).to_string();
                tracing::warn!(key = %item.key, error = %reason, "Could not collect storage client output");
                return Ok(ItemResult::failure(item, reason));
            },
        };

        let result = match outcome {
            Outcome::Completed { stdout, .. } => {
                let request = Request { epochs: self.options.epochs, share: self.options.share };
                let parsed = match mode {
                    Mode::Simulate => parse::dry_run(&stdout, item.size, request),
                    Mode::Upload => parse::upload(&stdout, item.size, request),
                };
                match parsed {
                    Ok(stored) => ItemResult::success(&item.key, stored),
                    Err(e) => ItemResult::failure(item, format!("unusable output: {e}; output: {}", excerpt(&stdout))),
                }
            },
            Outcome::NonZeroExit { code, stdout, stderr } => {
                let output = if stderr.trim().is_empty() { &stdout } else { &stderr };
                let status = code.map_or_else(|| "was terminated by a signal".to_string(), |code| format!("exited with code {code}"));
                ItemResult::failure(item, format!("storage client {status}: {}", excerpt(output)))
            },
            Outcome::TimedOut { after } => ItemResult::failure(item, format!("timed out after {}s", after.as_secs())),
        };
        match &result.error {
            Some(error) => tracing::warn!(key = %item.key, %error, "Item failed"),
            None => tracing::debug!(key = %item.key, cost = %result.cost, "Item processed"),
        }
        Ok(result)
    }
}

/// Trimmed output, cut to [`EXCERPT_LIMIT`] bytes on a character boundary.
fn excerpt(output: &str) -> &str {
    let output = output.trim();
    if output.len() <= EXCERPT_LIMIT {
        return output;
    }
    let mut end = EXCERPT_LIMIT;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    &output[..end]
}
