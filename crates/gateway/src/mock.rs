//! Scripted gateway for testing.

use crate::error::Result;
use crate::{Gateway, Outcome, Tool};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type Responder = Box<dyn Fn(Tool, &[String]) -> Result<Outcome> + Send + Sync>;

/// A single recorded call to [`MockGateway::invoke`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub tool: Tool,
    pub args: Vec<String>,
}

/// Gateway that answers from a closure instead of running processes.
///
/// Every invocation is recorded so tests can assert exactly what would have
/// been executed, and how many invocations were in flight at once.
///
/// # Examples
///
/// ```
/// use walsim_gateway::{Gateway, MockGateway, Outcome, Tool};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let gateway = MockGateway::new(|_tool, args| Ok(Outcome::completed(args.join(" "))));
/// let outcome = gateway.invoke(Tool::Walrus, &["info".into()], Duration::from_secs(1)).await.unwrap();
/// assert_eq!(outcome, Outcome::completed("info"));
/// assert_eq!(gateway.count(Tool::Walrus), 1);
/// # }
/// ```
pub struct MockGateway {
    responder: Responder,
    delay: Option<Duration>,
    calls: Mutex<Vec<Invocation>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockGateway {
    pub fn new(responder: impl Fn(Tool, &[String]) -> Result<Outcome> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            delay: None,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Hold every invocation open for `delay` before answering, so that
    /// concurrent callers actually overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every invocation recorded so far, in call order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// Number of invocations of `tool` recorded so far.
    pub fn count(&self, tool: Tool) -> usize {
        self.calls().iter().filter(|call| call.tool == tool).count()
    }

    /// Highest number of invocations that were running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn invoke(&self, tool: Tool, args: &[String], _timeout: Duration) -> Result<Outcome> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(Invocation { tool, args: args.to_vec() });
        }
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        (self.responder)(tool, args)
    }
}
