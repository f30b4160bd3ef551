use crate::error::Result;
use crate::models::{ItemResult, Mode, WorkItem};
use crate::process::Processor;
use crate::records::Records;
use async_stream::stream;
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use std::num::NonZeroUsize;
use walsim_config::RunMode;

/// Progress events emitted by [`Scheduler::execute`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started) exactly once.
/// 2. [`Planned`](Self::Planned) exactly once, with the dispatch and skip
///    counts.
/// 3. [`Skipped`](Self::Skipped) once per item with a reusable result.
/// 4. [`Completed`](Self::Completed) once per dispatched item, in completion
///    order.
/// 5. [`Finished`](Self::Finished) exactly once.
///
/// A run-level error terminates the stream early, in which case
/// [`Finished`](Self::Finished) is never emitted.
#[derive(Debug)]
pub enum ScheduleEvent {
    Started,
    Planned { dispatch: usize, skip: usize },
    /// An item was not dispatched because its stored result is reused.
    Skipped { index: usize, result: Box<ItemResult> },
    /// A dispatched item has been processed and its result persisted.
    Completed { index: usize, result: Box<ItemResult> },
    Finished,
}

/// Which items of a batch will be dispatched, and which reuse a stored
/// result. Indices refer to the batch the plan was made for.
#[derive(Debug, Default)]
pub struct Plan {
    pub dispatch: Vec<usize>,
    pub skip: Vec<(usize, ItemResult)>,
}

/// Results of a whole batch, in discovery order.
#[derive(Debug)]
pub struct Schedule {
    pub mode: Mode,
    pub results: Vec<ItemResult>,
    pub dispatched: usize,
    pub skipped: usize,
    /// The run stopped before every dispatched item completed; unfinished
    /// items are reported as pending.
    pub interrupted: bool,
}

/// Runs a batch of items through a [`Processor`] with bounded concurrency,
/// persisting each result before reporting it.
#[derive(Clone)]
pub struct Scheduler {
    mode: Mode,
    run_mode: RunMode,
    workers: NonZeroUsize,
    processor: Processor,
    records: Records,
}

impl Scheduler {
    pub fn new(mode: Mode, run_mode: RunMode, workers: NonZeroUsize, processor: Processor, records: Records) -> Self {
        Self { mode, run_mode, workers, processor, records }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn records(&self) -> &Records {
        &self.records
    }

    /// Decide which items need processing. Nothing is modified.
    ///
    /// In [`RunMode::Resume`] an item is skipped iff its stored result is a
    /// success; in [`RunMode::Fresh`] every item is dispatched.
    pub async fn plan(&self, items: &[WorkItem]) -> Result<Plan> {
        let mut plan = Plan::default();
        for (index, item) in items.iter().enumerate() {
            if self.run_mode == RunMode::Resume
                && let Some(result) = self.records.load(&item.key).await?
                && result.is_success()
            {
                plan.skip.push((index, result));
                continue;
            }
            plan.dispatch.push(index);
        }
        tracing::debug!(mode = %self.mode, dispatch = plan.dispatch.len(), skip = plan.skip.len(), "Batch planned");
        Ok(plan)
    }

    /// Stream [`ScheduleEvent`]s while `plan` is carried out over `items`.
    ///
    /// At most `workers` items are in flight at any time; further items are
    /// started in discovery order as in-flight ones complete. Failed items
    /// are ordinary [`Completed`](ScheduleEvent::Completed) events. Only a
    /// launch or persistence failure ends the stream with an error.
    pub fn execute<'a>(&'a self, items: &'a [WorkItem], plan: Plan) -> impl Stream<Item = Result<ScheduleEvent>> + 'a {
        // `rustfmt` does not format macros that use braces. Wrap in parentheses!
        stream!({
            yield Ok(ScheduleEvent::Started);
            yield Ok(ScheduleEvent::Planned { dispatch: plan.dispatch.len(), skip: plan.skip.len() });
            for (index, result) in plan.skip {
                yield Ok(ScheduleEvent::Skipped { index, result: Box::new(result) });
            }

            let mut queue = plan.dispatch.into_iter().filter_map(|index| items.get(index).map(|item| (index, item)));
            let mut processing = FuturesUnordered::new();
            processing.extend(queue.by_ref().take(self.workers.get()).map(|(index, item)| self.complete(index, item)));
            while let Some(completed) = processing.next().await {
                match completed {
                    Ok((index, result)) => {
                        yield Ok(ScheduleEvent::Completed { index, result: Box::new(result) });
                    },
                    Err(e) => {
                        yield Err(e);
                        return;
                    },
                }
                if let Some((index, item)) = queue.next() {
                    processing.push(self.complete(index, item));
                }
            }

            yield Ok(ScheduleEvent::Finished);
        })
    }

    async fn complete(&self, index: usize, item: &WorkItem) -> Result<(usize, ItemResult)> {
        if self.run_mode == RunMode::Fresh && self.records.discard(&item.key).await? {
            tracing::trace!(key = %item.key, "Discarded previous result");
        }
        let result = self.processor.process(item, self.mode).await?;
        self.records.save(&result).await?;
        Ok((index, result))
    }

    /// Plan and execute `items`, collecting every result.
    pub async fn run(&self, items: &[WorkItem]) -> Result<Schedule> {
        let plan = self.plan(items).await?;
        self.run_plan(items, plan).await
    }

    /// Execute an existing `plan`, collecting every result.
    pub async fn run_plan(&self, items: &[WorkItem], plan: Plan) -> Result<Schedule> {
        let mut collector = Collector::new(self.mode, items);
        let mut events = std::pin::pin!(self.execute(items, plan));
        while let Some(event) = events.next().await {
            collector.record(event?);
        }
        Ok(collector.finish())
    }

    /// What the store knows about `items` right now; used after a run was
    /// cut short.
    pub async fn recover(&self, items: &[WorkItem]) -> Result<Schedule> {
        let results = self.records.snapshot(items).await?;
        Ok(Schedule {
            mode: self.mode,
            dispatched: 0,
            skipped: 0,
            interrupted: true,
            results,
        })
    }
}

/// The single consumer of [`ScheduleEvent`]s: puts results back in discovery
/// order and reports progress.
struct Collector<'a> {
    mode: Mode,
    items: &'a [WorkItem],
    results: Vec<Option<ItemResult>>,
    dispatched: usize,
    skipped: usize,
    completed: usize,
    finished: bool,
}

impl<'a> Collector<'a> {
    fn new(mode: Mode, items: &'a [WorkItem]) -> Self {
        Self {
            mode,
            items,
            results: vec![None; items.len()],
            dispatched: 0,
            skipped: 0,
            completed: 0,
            finished: false,
        }
    }

    fn record(&mut self, event: ScheduleEvent) {
        match event {
            ScheduleEvent::Started => tracing::info!(mode = %self.mode, items = self.items.len(), "Batch started"),
            ScheduleEvent::Planned { dispatch, skip } => {
                self.dispatched = dispatch;
                self.skipped = skip;
                if skip > 0 {
                    tracing::info!(skip, "Reusing stored results");
                }
            },
            ScheduleEvent::Skipped { index, result } => self.place(index, *result),
            ScheduleEvent::Completed { index, result } => {
                self.completed += 1;
                tracing::info!(
                    key = %result.key,
                    status = %result.status,
                    completed = self.completed,
                    total = self.dispatched,
                    "Item completed"
                );
                self.place(index, *result);
            },
            ScheduleEvent::Finished => self.finished = true,
        }
    }

    fn place(&mut self, index: usize, result: ItemResult) {
        if let Some(slot) = self.results.get_mut(index) {
            *slot = Some(result);
        }
    }

    fn finish(self) -> Schedule {
        let results = self
            .results
            .into_iter()
            .zip(self.items)
            .map(|(result, item)| result.unwrap_or_else(|| ItemResult::pending(item)))
            .collect();
        Schedule {
            mode: self.mode,
            results,
            dispatched: self.dispatched,
            skipped: self.skipped,
            interrupted: !self.finished,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::{Amount, Status, Stored};
    use crate::process::StoreOptions;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;
    use walsim_config::{Epochs, Network};
    use walsim_gateway::error::ErrorKind as GatewayErrorKind;
    use walsim_gateway::{MockGateway, Outcome, Tool};
    use walsim_store::backend::MockStore;

    fn items(keys: &[&str]) -> Vec<WorkItem> {
        keys.iter()
            .map(|key| WorkItem { key: key.to_string(), path: PathBuf::from("/images").join(key), size: 10 })
            .collect()
    }

    /// Dry-run output with a blob ID derived from the file name.
    fn echo_blob(_tool: Tool, args: &[String]) -> walsim_gateway::error::Result<Outcome> {
        let name = args[1].rsplit('/').next().unwrap_or_default();
        Ok(Outcome::completed(format!(r#"[{{"blobId":"blob-{name}","unencodedSize":10,"storageCost":5}}]"#)))
    }

    fn scheduler(gateway: Arc<MockGateway>, store: Arc<MockStore>, run_mode: RunMode, workers: usize) -> Scheduler {
        let options = StoreOptions {
            context: Network::Testnet,
            epochs: Epochs::count(1).unwrap(),
            share: false,
            timeout: Duration::from_secs(5),
        };
        Scheduler::new(
            Mode::Simulate,
            run_mode,
            NonZeroUsize::new(workers).unwrap(),
            Processor::new(gateway, options),
            Records::new(store),
        )
    }

    fn success(key: &str) -> ItemResult {
        ItemResult::success(
            key,
            Stored {
                blob_id: format!("old-{key}"),
                size: 10,
                encoded_size: None,
                cost: Amount::new(1),
                shared: false,
                expires: None,
            },
        )
    }

    #[tokio::test]
    async fn test_results_follow_discovery_order() {
        let gateway = Arc::new(MockGateway::new(echo_blob).with_delay(Duration::from_millis(5)));
        let scheduler = scheduler(gateway.clone(), Arc::new(MockStore::default()), RunMode::Resume, 3);
        let items = items(&["a.png", "b.png", "c.png", "d.png", "e.png"]);

        let schedule = scheduler.run(&items).await.unwrap();
        let keys: Vec<_> = schedule.results.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, ["a.png", "b.png", "c.png", "d.png", "e.png"]);
        assert!(schedule.results.iter().all(ItemResult::is_success));
        assert_eq!(schedule.results[2].blob_id.as_deref(), Some("blob-c.png"));
        assert_eq!(schedule.dispatched, 5);
        assert!(!schedule.interrupted);
        assert_eq!(gateway.count(Tool::Walrus), 5);
    }

    #[tokio::test]
    async fn test_in_flight_items_never_exceed_workers() {
        let gateway = Arc::new(MockGateway::new(echo_blob).with_delay(Duration::from_millis(20)));
        let scheduler = scheduler(gateway.clone(), Arc::new(MockStore::default()), RunMode::Resume, 2);
        let items = items(&["a.png", "b.png", "c.png", "d.png", "e.png", "f.png", "g.png"]);

        scheduler.run(&items).await.unwrap();
        assert_eq!(gateway.count(Tool::Walrus), 7);
        assert_eq!(gateway.peak_concurrency(), 2);
    }

    #[tokio::test]
    async fn test_resume_skips_only_successes() {
        let mut failed = ItemResult::pending(&items(&["b.png"])[0]);
        failed.status = Status::Failed;
        failed.error = Some("timed out after 300s".into());
        let store = Arc::new(MockStore::with_records([
            ("a.png.json", serde_json::to_vec(&success("a.png")).unwrap()),
            ("b.png.json", serde_json::to_vec(&failed).unwrap()),
        ]));
        let gateway = Arc::new(MockGateway::new(echo_blob));
        let scheduler = scheduler(gateway.clone(), store, RunMode::Resume, 4);

        let schedule = scheduler.run(&items(&["a.png", "b.png", "c.png"])).await.unwrap();
        assert_eq!(schedule.skipped, 1);
        assert_eq!(schedule.dispatched, 2);
        assert_eq!(schedule.results[0].blob_id.as_deref(), Some("old-a.png"));
        assert!(schedule.results[1].is_success());
        let dispatched: Vec<_> = gateway.calls().into_iter().map(|call| call.args[1].clone()).collect();
        assert!(!dispatched.contains(&"/images/a.png".to_string()));
        assert_eq!(dispatched.len(), 2);
    }

    #[tokio::test]
    async fn test_second_resume_run_dispatches_nothing() {
        let store = Arc::new(MockStore::default());
        let gateway = Arc::new(MockGateway::new(echo_blob));
        let scheduler = scheduler(gateway.clone(), store, RunMode::Resume, 2);
        let items = items(&["a.png", "b.png"]);

        let first = scheduler.run(&items).await.unwrap();
        let second = scheduler.run(&items).await.unwrap();
        assert_eq!(gateway.count(Tool::Walrus), 2);
        assert_eq!(second.dispatched, 0);
        let blob_ids = |schedule: &Schedule| schedule.results.iter().map(|r| r.blob_id.clone()).collect::<Vec<_>>();
        assert_eq!(blob_ids(&second), blob_ids(&first));
        assert_eq!(second.skipped, 2);
    }

    #[tokio::test]
    async fn test_fresh_dispatches_everything_and_replaces_records() {
        let store = Arc::new(MockStore::with_records([("a.png.json", serde_json::to_vec(&success("a.png")).unwrap())]));
        let gateway = Arc::new(MockGateway::new(echo_blob));
        let scheduler = scheduler(gateway.clone(), store, RunMode::Fresh, 2);

        let schedule = scheduler.run(&items(&["a.png", "b.png"])).await.unwrap();
        assert_eq!(gateway.count(Tool::Walrus), 2);
        assert_eq!(schedule.skipped, 0);
        assert_eq!(schedule.results[0].blob_id.as_deref(), Some("blob-a.png"));
        let stored = scheduler.records().load("a.png").await.unwrap().unwrap();
        assert_eq!(stored.blob_id.as_deref(), Some("blob-a.png"));
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_batch() {
        let gateway = Arc::new(MockGateway::new(|tool, args| match args[1].ends_with("b.png") {
            true => Ok(Outcome::failed(1, "Error: quilt too large")),
            false => echo_blob(tool, args),
        }));
        let scheduler = scheduler(gateway, Arc::new(MockStore::default()), RunMode::Resume, 2);

        let schedule = scheduler.run(&items(&["a.png", "b.png", "c.png"])).await.unwrap();
        let statuses: Vec<_> = schedule.results.iter().map(|r| r.status).collect();
        assert_eq!(statuses, [Status::Success, Status::Failed, Status::Success]);
        let failed = scheduler.records().load("b.png").await.unwrap().unwrap();
        assert_eq!(failed.status, Status::Failed);
    }

    #[tokio::test]
    async fn test_persistence_failure_aborts() {
        let store = Arc::new(MockStore::default());
        store.reject_writes(true);
        let scheduler = scheduler(Arc::new(MockGateway::new(echo_blob)), store, RunMode::Resume, 2);

        let err = scheduler.run(&items(&["a.png", "b.png"])).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Persistence(_)));
    }

    #[tokio::test]
    async fn test_launch_failure_aborts() {
        let gateway = Arc::new(MockGateway::new(|tool, _| Err(exn::Exn::from(GatewayErrorKind::Launch(tool)))));
        let scheduler = scheduler(gateway.clone(), Arc::new(MockStore::default()), RunMode::Resume, 1);

        let err = scheduler.run(&items(&["a.png", "b.png", "c.png"])).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Launch);
        assert_eq!(gateway.count(Tool::Walrus), 1);
    }

    #[tokio::test]
    async fn test_event_order() {
        let store = Arc::new(MockStore::with_records([("a.png.json", serde_json::to_vec(&success("a.png")).unwrap())]));
        let scheduler = scheduler(Arc::new(MockGateway::new(echo_blob)), store, RunMode::Resume, 2);
        let items = items(&["a.png", "b.png"]);
        let plan = scheduler.plan(&items).await.unwrap();

        let events: Vec<_> = scheduler.execute(&items, plan).map(Result::unwrap).collect().await;
        assert!(matches!(events[0], ScheduleEvent::Started));
        assert!(matches!(events[1], ScheduleEvent::Planned { dispatch: 1, skip: 1 }));
        assert!(matches!(events[2], ScheduleEvent::Skipped { index: 0, .. }));
        assert!(matches!(events[3], ScheduleEvent::Completed { index: 1, .. }));
        assert!(matches!(events[4], ScheduleEvent::Finished));
        assert_eq!(events.len(), 5);
    }

    #[tokio::test]
    async fn test_recover_reports_unfinished_items_as_pending() {
        let store = Arc::new(MockStore::with_records([("a.png.json", serde_json::to_vec(&success("a.png")).unwrap())]));
        let scheduler = scheduler(Arc::new(MockGateway::new(echo_blob)), store, RunMode::Resume, 2);

        let schedule = scheduler.recover(&items(&["a.png", "b.png"])).await.unwrap();
        assert!(schedule.interrupted);
        assert_eq!(schedule.results[0].status, Status::Success);
        assert_eq!(schedule.results[1].status, Status::Pending);
    }
}
