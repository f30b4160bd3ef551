use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::OffsetDateTime;
use walsim_batch::{RunSummary, Token};
use walsim_config::{Epochs, Network, RunMode, Settings};
use walsim_store::RecordStore;
use walsim_store::backend::LocalStore;

pub const SUMMARY_FILE: &str = "summary.json";

/// How and when a run was made, embedded in the summary with `--log`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunLog {
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub started: OffsetDateTime,
    pub duration_secs: f64,
    pub path: PathBuf,
    pub context: Network,
    pub epochs: Epochs,
    pub share: bool,
    pub run_mode: RunMode,
    pub workers: usize,
    pub verify: bool,
    pub clean: bool,
    pub timeout_secs: u64,
    pub interrupted: bool,
}
impl RunLog {
    pub fn new(settings: &Settings, started: OffsetDateTime, elapsed: Duration, interrupted: bool) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            started,
            duration_secs: elapsed.as_secs_f64(),
            path: settings.path.clone(),
            context: settings.context,
            epochs: settings.epochs,
            share: settings.share,
            run_mode: settings.mode,
            workers: settings.workers.get(),
            verify: settings.verify,
            clean: settings.clean,
            timeout_secs: settings.timeout.as_secs(),
            interrupted,
        }
    }
}

#[derive(Serialize)]
struct Report<'a> {
    #[serde(flatten)]
    summary: &'a RunSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    run: Option<&'a RunLog>,
}

/// Atomically (re)write `summary.json` in `state_dir`, returning its path.
pub async fn write(state_dir: &Path, summary: &RunSummary, run: Option<&RunLog>) -> Result<PathBuf> {
    let store = LocalStore::new("state", state_dir).or_raise(|| ErrorKind::Report)?;
    let bytes = serde_json::to_vec_pretty(&Report { summary, run }).or_raise(|| ErrorKind::Report)?;
    store.write(Path::new(SUMMARY_FILE), &bytes).await.or_raise(|| ErrorKind::Report)?;
    Ok(state_dir.join(SUMMARY_FILE))
}

/// Log the outcome of a run for whoever is watching the console.
pub fn print(summary: &RunSummary) {
    tracing::info!(
        mode = %summary.mode,
        attempted = summary.attempted,
        dispatched = summary.dispatched,
        skipped = summary.skipped,
        succeeded = summary.succeeded,
        failed = summary.failed,
        pending = summary.pending,
        "Run finished"
    );
    tracing::info!(
        total_cost = %Token::Wal.format(summary.total_cost),
        total_size = summary.total_size,
        total_encoded_size = summary.total_encoded_size,
        unique_blob_ids = summary.unique_blob_ids,
        "Totals"
    );
    if let Some(projected) = summary.projected_cost {
        tracing::info!(projected = %Token::Wal.format(projected), "Projected before upload");
    }
    for failure in summary.failures() {
        tracing::warn!(key = %failure.key, error = failure.error.as_deref().unwrap_or_default(), "Failed");
    }
    if !summary.duplicates.is_empty() {
        tracing::warn!(
            count = summary.duplicates.len(),
            blob_ids = summary.duplicate_blob_ids.len(),
            keys = ?summary.duplicates,
            "Images with identical content"
        );
    }
    if summary.interrupted {
        tracing::warn!(pending = summary.pending, "Run was interrupted; resume to finish the remaining images");
    }
}
