//! Batch cost simulation and upload of image directories to Walrus.
//!
//! A run discovers every image below a directory, hands each one to the
//! `walrus` client (with `--dry-run` when simulating), persists one result
//! record per image as soon as it is known, and aggregates the records into
//! a [`RunSummary`]. Uploads are gated on the wallet being able to pay for
//! the simulated cost of everything about to be stored.

mod discover;
pub mod error;
mod gatekeeper;
mod models;
mod parse;
mod process;
mod reconcile;
mod records;
mod schedule;
mod summary;

pub use crate::discover::{IMAGE_EXTENSIONS, discover};
pub use crate::gatekeeper::{Authorization, BalanceSnapshot, Gatekeeper};
pub use crate::models::{Amount, Expiration, ItemResult, Mode, Status, Stored, Token, WorkItem};
pub use crate::parse::ParseError;
pub use crate::process::{Processor, StoreOptions};
pub use crate::reconcile::{Duplicates, find_duplicates};
pub use crate::records::Records;
pub use crate::schedule::{Plan, Schedule, ScheduleEvent, Scheduler};
pub use crate::summary::{CleanupReport, RunSummary, cleanup, summarize};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::sync::Arc;
use walsim_config::{RunMode, Settings};
use walsim_gateway::GatewayHandle;
use walsim_store::StoreHandle;
use walsim_store::backend::LocalStore;

/// Everything a run needs, wired together from validated [`Settings`].
#[derive(Clone)]
pub struct Batch {
    settings: Settings,
    gateway: GatewayHandle,
    simulations: Records,
    uploads: Records,
}

impl Batch {
    pub fn new(settings: Settings, gateway: GatewayHandle, simulations: StoreHandle, uploads: StoreHandle) -> Self {
        Self {
            settings,
            gateway,
            simulations: Records::new(simulations),
            uploads: Records::new(uploads),
        }
    }

    /// Keep records as files under the state directory, one sub-directory
    /// per [`Mode`].
    pub fn open(settings: Settings, gateway: GatewayHandle) -> Result<Self> {
        let store = |mode: Mode| -> Result<StoreHandle> {
            let root = settings.state_dir.join(mode.namespace());
            let store = LocalStore::new(mode.namespace(), root).or_raise(|| ErrorKind::Store(mode.namespace()))?;
            Ok(Arc::new(store))
        };
        let simulations = store(Mode::Simulate)?;
        let uploads = store(Mode::Upload)?;
        Ok(Self::new(settings, gateway, simulations, uploads))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn records(&self, mode: Mode) -> &Records {
        match mode {
            Mode::Simulate => &self.simulations,
            Mode::Upload => &self.uploads,
        }
    }

    pub async fn discover(&self) -> Result<Vec<WorkItem>> {
        discover(&self.settings.path).await
    }

    pub fn processor(&self) -> Processor {
        Processor::new(
            self.gateway.clone(),
            StoreOptions {
                context: self.settings.context,
                epochs: self.settings.epochs,
                share: self.settings.share,
                timeout: self.settings.timeout,
            },
        )
    }

    pub fn scheduler(&self, mode: Mode, run_mode: RunMode) -> Scheduler {
        Scheduler::new(mode, run_mode, self.settings.workers, self.processor(), self.records(mode).clone())
    }

    pub fn gatekeeper(&self) -> Gatekeeper {
        Gatekeeper::new(
            self.gateway.clone(),
            self.settings.wallet_timeout,
            Amount::new(self.settings.min_native_balance.into()),
        )
    }

    /// Estimate the cost of storing `items` without storing anything.
    pub async fn simulate(&self, items: &[WorkItem]) -> Result<RunSummary> {
        let schedule = self.scheduler(Mode::Simulate, self.settings.mode).run(items).await?;
        Ok(self.finish(schedule, items).await)
    }

    /// Store `items`, after checking the wallet can pay for them.
    ///
    /// The items that will actually be dispatched are simulated first; the
    /// sum of their estimates must be covered by the wallet, or nothing is
    /// uploaded. An item that could not be estimated is never uploaded: it is
    /// recorded as failed instead.
    pub async fn upload(&self, items: &[WorkItem]) -> Result<RunSummary> {
        let scheduler = self.scheduler(Mode::Upload, self.settings.mode);
        let mut plan = scheduler.plan(items).await?;

        let mut projected = None;
        let mut wallet = None;
        let mut estimated = Vec::new();
        let mut unestimated = Vec::new();
        if !plan.dispatch.is_empty() {
            let (indices, pending): (Vec<usize>, Vec<WorkItem>) =
                plan.dispatch.iter().filter_map(|&index| items.get(index).map(|item| (index, item.clone()))).unzip();
            // Estimates are always refreshed: stored ones may have been made
            // with different epochs or sharing.
            let estimate = self.scheduler(Mode::Simulate, RunMode::Fresh).run(&pending).await?;

            let mut cost = Amount::ZERO;
            let mut dispatch = Vec::with_capacity(indices.len());
            for ((index, item), result) in indices.into_iter().zip(pending).zip(estimate.results) {
                if result.is_success() {
                    cost = cost + result.cost;
                    dispatch.push(index);
                } else {
                    let reason = result.error.as_deref().unwrap_or("no estimate");
                    unestimated.push((index, ItemResult::failure(&item, format!("cost estimate failed: {reason}"))));
                }
                estimated.push(item);
            }
            if !unestimated.is_empty() {
                tracing::warn!(unestimated = unestimated.len(), "Some items could not be estimated; they will not be uploaded");
            }
            plan.dispatch = dispatch;
            projected = Some(cost);

            if plan.dispatch.is_empty() {
                tracing::warn!("No item could be estimated; nothing to pay for");
            } else {
                match self.gatekeeper().authorize(cost).await? {
                    Authorization::Authorized(snapshot) => wallet = Some(snapshot),
                    Authorization::InsufficientFunds { token, needed, available } => {
                        exn::bail!(ErrorKind::InsufficientFunds { token, needed, available })
                    },
                }
            }
        } else {
            tracing::info!("Every item already has a stored upload; nothing to pay for");
        }

        for (_, result) in &unestimated {
            self.uploads.save(result).await?;
        }
        let mut schedule = scheduler.run_plan(items, plan).await?;
        for (index, result) in unestimated {
            if let Some(slot) = schedule.results.get_mut(index) {
                *slot = result;
            }
        }
        let mut summary = self.finish(schedule, items).await;
        if self.settings.clean {
            cleanup(&self.simulations, &estimated).await;
        }
        summary.projected_cost = projected;
        summary.wallet = wallet;
        Ok(summary)
    }

    /// Summary of whatever is stored for `items`, after a run was cut short.
    /// Records are kept regardless of the `clean` setting.
    pub async fn recover(&self, mode: Mode, items: &[WorkItem]) -> Result<RunSummary> {
        let schedule = self.scheduler(mode, self.settings.mode).recover(items).await?;
        let duplicates = self.duplicates(&schedule);
        Ok(summarize(schedule, duplicates))
    }

    fn duplicates(&self, schedule: &Schedule) -> Duplicates {
        match self.settings.verify {
            true => find_duplicates(&schedule.results),
            false => Duplicates::default(),
        }
    }

    async fn finish(&self, schedule: Schedule, items: &[WorkItem]) -> RunSummary {
        let mode = schedule.mode;
        let duplicates = self.duplicates(&schedule);
        let summary = summarize(schedule, duplicates);
        if self.settings.clean {
            cleanup(self.records(mode), items).await;
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::time::Duration;
    use walsim_config::{Epochs, Network, Options};
    use walsim_gateway::error::Result as GatewayResult;
    use walsim_gateway::{MockGateway, Outcome, Tool};
    use walsim_store::backend::MockStore;

    fn items(keys: &[&str]) -> Vec<WorkItem> {
        keys.iter()
            .map(|key| WorkItem { key: key.to_string(), path: format!("/images/{key}").into(), size: 10 })
            .collect()
    }

    fn settings() -> Settings {
        let mut settings = Settings::try_from(Options::default()).unwrap();
        settings.context = Network::Testnet;
        settings.epochs = Epochs::count(2).unwrap();
        settings.workers = std::num::NonZeroUsize::new(2).unwrap();
        settings.timeout = Duration::from_secs(5);
        settings
    }

    struct Harness {
        gateway: Arc<MockGateway>,
        simulations: Arc<MockStore>,
        uploads: Arc<MockStore>,
        batch: Batch,
    }

    fn harness(settings: Settings, responder: impl Fn(Tool, &[String]) -> GatewayResult<Outcome> + Send + Sync + 'static) -> Harness {
        let gateway = Arc::new(MockGateway::new(responder));
        let simulations = Arc::new(MockStore::default().with_name("simulate"));
        let uploads = Arc::new(MockStore::default().with_name("upload"));
        let batch = Batch::new(settings, gateway.clone(), simulations.clone(), uploads.clone());
        Harness { gateway, simulations, uploads, batch }
    }

    fn name(args: &[String]) -> &str {
        args[1].rsplit('/').next().unwrap_or_default()
    }

    /// a.png and b.png have the same content, c.png makes the client fail.
    fn walrus(tool: Tool, args: &[String]) -> GatewayResult<Outcome> {
        if tool == Tool::Sui {
            return Ok(Outcome::completed(r#"[[[{"symbol":"SUI"},[{"balance":"1000"}]],[{"symbol":"WAL"},[{"balance":"25"}]]],false]"#));
        }
        let blob_id = match name(args) {
            "a.png" | "b.png" => "same",
            "c.png" => return Ok(Outcome::failed(1, "Error: unsupported image")),
            other => other,
        };
        let dry_run = args.iter().any(|arg| arg == "--dry-run");
        Ok(Outcome::completed(match dry_run {
            true => format!(r#"[{{"blobId":"{blob_id}","unencodedSize":10,"storageCost":10}}]"#),
            false => format!(
                r#"[{{"blobStoreResult":{{"newlyCreated":{{"blobObject":{{"blobId":"{blob_id}","size":10,"storage":{{"endEpoch":9}}}},"cost":10}}}}}}]"#
            ),
        }))
    }

    #[tokio::test]
    async fn test_simulate_scenario() {
        let harness = harness(settings(), walrus);
        let summary = harness.batch.simulate(&items(&["a.png", "b.png", "c.png"])).await.unwrap();

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total_cost, Amount::new(20));
        assert_eq!(summary.duplicates, BTreeSet::from(["a.png".to_string(), "b.png".to_string()]));
        assert_eq!(summary.unique_blob_ids, 1);
        assert_eq!(harness.simulations.len().await, 3);
        assert!(harness.uploads.is_empty().await);
        assert_eq!(harness.gateway.count(Tool::Sui), 0);
    }

    #[tokio::test]
    async fn test_timed_out_item_fails_without_stopping_the_batch() {
        let harness = harness(settings(), |tool, args| match name(args) {
            "c.png" => Ok(Outcome::TimedOut { after: Duration::from_secs(5) }),
            _ => walrus(tool, args),
        });
        let summary = harness.batch.simulate(&items(&["a.png", "b.png", "c.png", "d.png"])).await.unwrap();

        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 1);
        assert!(!summary.interrupted);
        assert_eq!(summary.results[2].status, Status::Failed);
        assert_eq!(summary.results[2].error.as_deref(), Some("timed out after 5s"));
        assert_eq!(summary.total_cost, Amount::new(30));
    }

    #[tokio::test]
    async fn test_long_file_name_does_not_abort_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let long = format!("{}.png", "a".repeat(251));
        std::fs::write(dir.path().join(&long), b"image").unwrap();
        std::fs::write(dir.path().join("short.png"), b"image").unwrap();
        let mut settings = settings();
        settings.path = dir.path().to_path_buf();
        settings.state_dir = dir.path().join(".walsim");
        let gateway = Arc::new(MockGateway::new(walrus));

        let batch = Batch::open(settings, gateway.clone()).unwrap();
        let items = batch.discover().await.unwrap();
        let summary = batch.simulate(&items).await.unwrap();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(gateway.count(Tool::Walrus), 2);

        let again = batch.simulate(&items).await.unwrap();
        assert_eq!(again.skipped, 2);
    }

    #[tokio::test]
    async fn test_simulate_without_verify_reports_no_duplicates() {
        let mut settings = settings();
        settings.verify = false;
        let harness = harness(settings, walrus);
        let summary = harness.batch.simulate(&items(&["a.png", "b.png"])).await.unwrap();
        assert!(summary.duplicates.is_empty());
    }

    #[tokio::test]
    async fn test_clean_removes_records_after_summary() {
        let mut settings = settings();
        settings.clean = true;
        let harness = harness(settings, walrus);
        let summary = harness.batch.simulate(&items(&["a.png", "c.png"])).await.unwrap();
        assert_eq!(summary.results.len(), 2);
        assert!(harness.simulations.is_empty().await);
    }

    #[tokio::test]
    async fn test_upload_checks_funds_then_uploads() {
        let harness = harness(settings(), walrus);
        let summary = harness.batch.upload(&items(&["a.png", "d.png"])).await.unwrap();

        assert_eq!(summary.mode, Mode::Upload);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.projected_cost, Some(Amount::new(20)));
        assert_eq!(summary.wallet.map(|wallet| wallet.storage), Some(Amount::new(25)));
        assert_eq!(summary.results[1].expires, Some(Expiration::Epoch(9)));
        assert_eq!(harness.gateway.count(Tool::Sui), 1);
        assert_eq!(harness.uploads.len().await, 2);
    }

    #[tokio::test]
    async fn test_unestimated_items_are_never_uploaded() {
        let harness = harness(settings(), |tool, args| {
            let dry_run = args.iter().any(|arg| arg == "--dry-run");
            match (name(args), dry_run) {
                ("x.png", true) => Ok(Outcome::failed(1, "Error: estimate unavailable")),
                _ => walrus(tool, args),
            }
        });
        let summary = harness.batch.upload(&items(&["a.png", "d.png", "x.png"])).await.unwrap();

        let uploaded: Vec<_> = harness
            .gateway
            .calls()
            .into_iter()
            .filter(|call| call.tool == Tool::Walrus && !call.args.contains(&"--dry-run".to_string()))
            .map(|call| name(&call.args).to_string())
            .collect();
        assert_eq!(uploaded.len(), 2);
        assert!(!uploaded.contains(&"x.png".to_string()));
        assert_eq!(summary.projected_cost, Some(Amount::new(20)));
        assert_eq!(summary.total_cost, Amount::new(20));
        assert_eq!((summary.succeeded, summary.failed, summary.dispatched), (2, 1, 2));
        let refused = &summary.results[2];
        assert_eq!(refused.status, Status::Failed);
        assert!(refused.error.as_deref().unwrap().starts_with("cost estimate failed: "));
        assert_eq!(harness.batch.records(Mode::Upload).load("x.png").await.unwrap().as_ref(), Some(refused));
    }

    #[tokio::test]
    async fn test_nothing_estimated_skips_the_wallet() {
        let harness = harness(settings(), walrus);
        let summary = harness.batch.upload(&items(&["c.png"])).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.projected_cost, Some(Amount::ZERO));
        assert_eq!(harness.gateway.count(Tool::Sui), 0);
        assert_eq!(harness.gateway.count(Tool::Walrus), 1);
    }

    #[tokio::test]
    async fn test_clean_upload_removes_estimates_too() {
        let mut settings = settings();
        settings.clean = true;
        let harness = harness(settings, walrus);
        let summary = harness.batch.upload(&items(&["a.png", "d.png"])).await.unwrap();
        assert_eq!(summary.succeeded, 2);
        assert!(harness.uploads.is_empty().await);
        assert!(harness.simulations.is_empty().await);
    }

    #[tokio::test]
    async fn test_insufficient_funds_uploads_nothing() {
        let harness = harness(settings(), walrus);
        let err = harness.batch.upload(&items(&["a.png", "d.png", "e.png"])).await.unwrap_err();

        assert_eq!(
            *err,
            ErrorKind::InsufficientFunds { token: Token::Wal, needed: Amount::new(30), available: Amount::new(25) }
        );
        let uploads = harness.gateway.calls().into_iter().filter(|call| call.tool == Tool::Walrus && !call.args.contains(&"--dry-run".to_string()));
        assert_eq!(uploads.count(), 0);
        assert!(harness.uploads.is_empty().await);
    }

    #[tokio::test]
    async fn test_unreadable_balance_uploads_nothing() {
        let harness = harness(settings(), |tool, args| match tool {
            Tool::Sui => Ok(Outcome::completed("not json")),
            Tool::Walrus => walrus(tool, args),
        });
        let err = harness.batch.upload(&items(&["a.png"])).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Balance(_)));
        assert!(harness.uploads.is_empty().await);
    }

    #[tokio::test]
    async fn test_upload_resume_skips_stored_uploads_and_their_cost() {
        let harness = harness(settings(), walrus);
        let first = harness.batch.upload(&items(&["a.png"])).await.unwrap();
        assert_eq!(first.succeeded, 1);

        let second = harness.batch.upload(&items(&["a.png", "d.png"])).await.unwrap();
        assert_eq!(second.skipped, 1);
        assert_eq!(second.dispatched, 1);
        assert_eq!(second.projected_cost, Some(Amount::new(10)));
        let stored_uploads = harness
            .gateway
            .calls()
            .into_iter()
            .filter(|call| call.tool == Tool::Walrus && !call.args.contains(&"--dry-run".to_string()))
            .count();
        assert_eq!(stored_uploads, 2);
    }

    #[tokio::test]
    async fn test_nothing_to_upload_skips_the_wallet() {
        let harness = harness(settings(), walrus);
        harness.batch.upload(&items(&["a.png"])).await.unwrap();
        let again = harness.batch.upload(&items(&["a.png"])).await.unwrap();
        assert_eq!(again.dispatched, 0);
        assert_eq!(again.projected_cost, None);
        assert_eq!(harness.gateway.count(Tool::Sui), 1);
    }

    #[tokio::test]
    async fn test_recover_after_interruption() {
        let harness = harness(settings(), walrus);
        harness.batch.simulate(&items(&["a.png"])).await.unwrap();
        let summary = harness.batch.recover(Mode::Simulate, &items(&["a.png", "b.png"])).await.unwrap();
        assert!(summary.interrupted);
        assert_eq!((summary.succeeded, summary.pending), (1, 1));
    }

    #[tokio::test]
    async fn test_open_creates_namespaced_directories() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings();
        settings.path = dir.path().to_path_buf();
        settings.state_dir = dir.path().join(".walsim");
        let gateway: GatewayHandle = Arc::new(MockGateway::new(walrus));

        let batch = Batch::open(settings, gateway).unwrap();
        assert_eq!(batch.records(Mode::Upload).name(), "upload");
        assert!(dir.path().join(".walsim/simulate").is_dir());
        assert!(dir.path().join(".walsim/upload").is_dir());
    }
}
