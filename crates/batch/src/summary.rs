use crate::gatekeeper::BalanceSnapshot;
use crate::models::{Amount, ItemResult, Mode, Status, WorkItem};
use crate::reconcile::Duplicates;
use crate::records::Records;
use crate::schedule::Schedule;
use serde::Serialize;
use std::collections::BTreeSet;

/// Totals and per-item results of one run.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub mode: Mode,
    /// Every item the run was asked to handle.
    pub attempted: usize,
    pub dispatched: usize,
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub pending: usize,
    /// Sum of successful costs, in FROST.
    pub total_cost: Amount,
    /// Sum of successful unencoded sizes, in bytes.
    pub total_size: u64,
    pub total_encoded_size: u64,
    pub unique_blob_ids: usize,
    pub duplicates: BTreeSet<String>,
    pub duplicate_blob_ids: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projected_cost: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet: Option<BalanceSnapshot>,
    pub interrupted: bool,
    /// In discovery order.
    pub results: Vec<ItemResult>,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn is_duplicate(&self, key: &str) -> bool {
        self.duplicates.contains(key)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemResult> {
        self.results.iter().filter(|result| result.status == Status::Failed)
    }
}

/// Aggregate a finished (or interrupted) schedule.
///
/// Only successful results contribute to cost, size and blob counts.
pub fn summarize(schedule: Schedule, duplicates: Duplicates) -> RunSummary {
    let count = |status: Status| schedule.results.iter().filter(|result| result.status == status).count();
    let successes = || schedule.results.iter().filter(|result| result.is_success());

    RunSummary {
        mode: schedule.mode,
        attempted: schedule.results.len(),
        dispatched: schedule.dispatched,
        skipped: schedule.skipped,
        succeeded: count(Status::Success),
        failed: count(Status::Failed),
        pending: count(Status::Pending),
        total_cost: successes().map(|result| result.cost).sum(),
        total_size: successes().map(|result| result.size).sum(),
        total_encoded_size: successes().filter_map(|result| result.encoded_size).sum(),
        unique_blob_ids: successes().filter_map(|result| result.blob_id.as_deref()).collect::<BTreeSet<_>>().len(),
        duplicates: duplicates.keys,
        duplicate_blob_ids: duplicates.blob_ids,
        projected_cost: None,
        wallet: None,
        interrupted: schedule.interrupted,
        results: schedule.results,
    }
}

/// What [`cleanup`] managed to remove.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    pub failed: usize,
}

/// Delete the per-item records of `items`.
///
/// Best effort: a record that cannot be removed is logged and skipped, and
/// never changes the outcome of the run.
pub async fn cleanup(records: &Records, items: &[WorkItem]) -> CleanupReport {
    let mut report = CleanupReport::default();
    for item in items {
        match records.discard(&item.key).await {
            Ok(true) => report.removed += 1,
            Ok(false) => {},
            Err(e) => {
                tracing::warn!(key = %item.key, store = %records.name(), error = ?e, "Could not remove record");
                report.failed += 1;
            },
        }
    }
    tracing::debug!(store = %records.name(), removed = report.removed, failed = report.failed, "Records cleaned up");
    report
}
