//! Single-producer/single-consumer pump.
//!
//! A `Workflow` repeatedly produces one item and hands it to its consumer
//! on a dedicated task, in strict FIFO order, until a terminal condition is
//! reached or a cooperative stop is requested.
//!
//! States: `Idle -> Running -> {Suspended <-> Running} -> {Finished |
//! FatalError}`. Suspension parks the pump without terminating the task;
//! `stop()` cancels cooperatively and joins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pipeline_types::{FlowError, Locator, WorkflowMode};

use crate::io::{Consumer, IndexBuilder, Producer, SharedConsumer, SharedProducer};

/// Delay before retrying after the producer reports `Wait`.
const WAIT_INTERVAL: Duration = Duration::from_millis(10);
/// Idle delay after a tolerated `Eof` in streaming modes.
const EOF_IDLE_INTERVAL: Duration = Duration::from_millis(100);

struct PumpState {
    started: AtomicBool,
    finished: AtomicBool,
    fatal: AtomicBool,
    stop_locator: StdMutex<Option<Locator>>,
}

/// A produce/consume pump over one producer and one consumer.
pub struct Workflow<T> {
    producer: SharedProducer<T>,
    consumer: SharedConsumer<T>,
    state: Arc<PumpState>,
    cancel: CancellationToken,
    suspend_tx: watch::Sender<bool>,
    suspend_rx: watch::Receiver<bool>,
    handle: StdMutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Workflow<T> {
    /// Create an idle workflow over the given endpoints.
    pub fn new(producer: Box<dyn Producer<T>>, consumer: Box<dyn Consumer<T>>) -> Self {
        let (suspend_tx, suspend_rx) = watch::channel(false);
        Self {
            producer: Arc::new(tokio::sync::Mutex::new(producer)),
            consumer: Arc::new(tokio::sync::Mutex::new(consumer)),
            state: Arc::new(PumpState {
                started: AtomicBool::new(false),
                finished: AtomicBool::new(false),
                fatal: AtomicBool::new(false),
                stop_locator: StdMutex::new(None),
            }),
            cancel: CancellationToken::new(),
            suspend_tx,
            suspend_rx,
            handle: StdMutex::new(None),
        }
    }

    /// Start pumping on a dedicated task. Starting twice is a no-op.
    pub fn start(&self, mode: WorkflowMode) {
        if self.state.started.swap(true, Ordering::SeqCst) {
            warn!("Workflow already started");
            return;
        }
        let producer = self.producer.clone();
        let consumer = self.consumer.clone();
        let state = self.state.clone();
        let cancel = self.cancel.clone();
        let suspended = self.suspend_rx.clone();
        let handle = tokio::spawn(async move {
            pump(mode, producer, consumer, state, cancel, suspended).await;
        });
        *self.handle.lock().unwrap() = Some(handle);
        debug!(?mode, "Workflow started");
    }

    /// Park the pump. Effective even before `start`; no produced item is
    /// consumed while suspended.
    pub fn suspend(&self) {
        let _ = self.suspend_tx.send(true);
    }

    /// Unpark the pump.
    pub fn resume(&self) {
        let _ = self.suspend_tx.send(false);
    }

    /// Whether the pump is currently parked.
    pub fn is_suspended(&self) -> bool {
        *self.suspend_rx.borrow()
    }

    /// Request cooperative termination and wait for the pump task to exit.
    pub async fn stop(&self) {
        self.cancel.cancel();
        // Wake the pump if it is parked in suspension.
        let _ = self.suspend_tx.send(false);
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Workflow pump task panicked");
                self.state.fatal.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Whether the pump reached a clean terminal state.
    pub fn is_finished(&self) -> bool {
        self.state.finished.load(Ordering::SeqCst)
    }

    /// Whether the pump reached the fatal state. Callers must check this in
    /// addition to `is_finished`: a failed teardown ends the data loop
    /// without ever finishing.
    pub fn has_fatal_error(&self) -> bool {
        self.state.fatal.load(Ordering::SeqCst)
    }

    /// The consumer locator captured right before the first terminal
    /// teardown, for seeking sibling workflows to a consistent cut point.
    pub fn stop_locator(&self) -> Option<Locator> {
        *self.state.stop_locator.lock().unwrap()
    }

    /// Shared handle to the producer endpoint.
    pub fn producer(&self) -> SharedProducer<T> {
        self.producer.clone()
    }

    /// Shared handle to the consumer endpoint.
    pub fn consumer(&self) -> SharedConsumer<T> {
        self.consumer.clone()
    }

    /// The consumer's current durable locator.
    pub async fn consumer_locator(&self) -> Option<Locator> {
        self.consumer.lock().await.locator()
    }

    /// The index builder behind the consumer, if it builds.
    pub async fn builder(&self) -> Option<Arc<dyn IndexBuilder>> {
        self.consumer.lock().await.builder()
    }

    /// Seek the producer to the given locator.
    pub async fn seek_producer(&self, locator: Locator) -> Result<(), FlowError> {
        self.producer.lock().await.seek(locator).await
    }

    /// Forward a read stop-timestamp to the producer.
    pub async fn suspend_read_at(&self, timestamp_ms: i64) {
        self.producer.lock().await.suspend_read_at(timestamp_ms);
    }
}

impl<T> Drop for Workflow<T> {
    fn drop(&mut self) {
        // The pump task holds only Arcs; cancelling lets it exit on its own.
        self.cancel.cancel();
    }
}

/// Sleep that wakes early on cancellation. Returns `false` when cancelled.
async fn idle(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

async fn pump<T: Send + 'static>(
    mode: WorkflowMode,
    producer: SharedProducer<T>,
    consumer: SharedConsumer<T>,
    state: Arc<PumpState>,
    cancel: CancellationToken,
    mut suspended: watch::Receiver<bool>,
) {
    let mut terminal: Option<FlowError> = None;

    'pump: loop {
        while *suspended.borrow() {
            tokio::select! {
                _ = cancel.cancelled() => break 'pump,
                changed = suspended.changed() => {
                    if changed.is_err() {
                        break 'pump;
                    }
                }
            }
        }
        if cancel.is_cancelled() {
            break 'pump;
        }

        let produced = {
            let mut producer = producer.lock().await;
            producer.produce(&cancel).await
        };
        match produced {
            Ok(item) => {
                let consumed = {
                    let mut consumer = consumer.lock().await;
                    consumer.consume(item, &cancel).await
                };
                match consumed {
                    Ok(()) => {}
                    // The consumer declined the item; deliberate drop.
                    Err(FlowError::Wait) | Err(FlowError::Skip) => {}
                    Err(FlowError::Eof) | Err(FlowError::Exception) => {
                        terminal = Some(FlowError::Exception);
                        break 'pump;
                    }
                    Err(FlowError::Fatal) => {
                        warn!("Consumer raised fatal error");
                        state.fatal.store(true, Ordering::SeqCst);
                        return;
                    }
                }
            }
            Err(FlowError::Wait) => {
                if !idle(&cancel, WAIT_INTERVAL).await {
                    break 'pump;
                }
            }
            Err(FlowError::Skip) => {}
            Err(FlowError::Eof) => {
                if mode.stops_on_eof() {
                    terminal = Some(FlowError::Eof);
                    break 'pump;
                }
                // Streaming modes tolerate Eof; the source may produce more.
                if !idle(&cancel, EOF_IDLE_INTERVAL).await {
                    break 'pump;
                }
            }
            Err(FlowError::Exception) => {
                warn!("Producer raised exception");
                terminal = Some(FlowError::Exception);
                break 'pump;
            }
            Err(FlowError::Fatal) => {
                warn!("Producer raised fatal error");
                state.fatal.store(true, Ordering::SeqCst);
                return;
            }
        }
    }

    // A cooperative stop without a terminal produce outcome tears down with
    // Eof semantics but reaches neither Finished nor FatalError.
    let reason = terminal.unwrap_or(FlowError::Eof);
    let clean = teardown(&producer, &consumer, &state, reason).await;

    match terminal {
        Some(FlowError::Eof) if clean => {
            info!("Workflow finished");
            state.finished.store(true, Ordering::SeqCst);
        }
        Some(_) => {
            state.fatal.store(true, Ordering::SeqCst);
        }
        None if !clean => {
            state.fatal.store(true, Ordering::SeqCst);
        }
        None => {}
    }
}

/// Capture the stop locator once, then stop both endpoints.
///
/// Returns `false` if the locator could not be captured or either endpoint
/// failed to stop; the pipeline cannot safely stop without knowing where it
/// stopped.
async fn teardown<T: Send + 'static>(
    producer: &SharedProducer<T>,
    consumer: &SharedConsumer<T>,
    state: &PumpState,
    reason: FlowError,
) -> bool {
    let mut clean = true;

    {
        let consumer = consumer.lock().await;
        let reported = consumer.locator();
        let mut slot = state.stop_locator.lock().unwrap();
        if slot.is_none() {
            match reported {
                Some(locator) => {
                    debug!(%locator, "Captured stop locator");
                    *slot = Some(locator);
                }
                None => {
                    warn!("Consumer failed to report a stop locator");
                    clean = false;
                }
            }
        }
    }

    if producer.lock().await.stop().await.is_err() {
        warn!("Producer stop failed");
        clean = false;
    }
    if consumer.lock().await.stop(reason).await.is_err() {
        warn!(?reason, "Consumer stop failed");
        clean = false;
    }
    clean
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixtureConsumer, FixtureProducer};
    use pipeline_types::RawDocument;

    fn doc(offset: i64) -> RawDocument {
        RawDocument::new(Locator::new(1, offset), offset * 1000)
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        for _ in 0..500 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within timeout");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_job_mode_consumes_all_items_in_order() {
        let producer = FixtureProducer::with_items((1..=10).map(doc).collect());
        let consumer = FixtureConsumer::new();
        let probe = consumer.probe();
        probe.set_locator(Locator::new(1, 0));

        let workflow = Workflow::new(Box::new(producer), Box::new(consumer));
        workflow.start(WorkflowMode::Job);
        wait_until(|| workflow.is_finished()).await;

        assert!(!workflow.has_fatal_error());
        let items = probe.items();
        assert_eq!(items.len(), 10);
        for (i, item) in items.iter().enumerate() {
            assert_eq!(item.locator.offset, (i + 1) as i64);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_job_mode_stops_endpoints_exactly_once() {
        let producer = FixtureProducer::with_items(vec![doc(1)]);
        let producer_probe = producer.probe();
        let consumer = FixtureConsumer::new();
        let consumer_probe = consumer.probe();
        consumer_probe.set_locator(Locator::new(1, 1));

        let workflow = Workflow::new(Box::new(producer), Box::new(consumer));
        workflow.start(WorkflowMode::Job);
        wait_until(|| workflow.is_finished()).await;

        assert_eq!(producer_probe.stop_count(), 1);
        assert_eq!(consumer_probe.stop_reasons(), vec![FlowError::Eof]);
        assert_eq!(workflow.stop_locator(), Some(Locator::new(1, 1)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_exception_is_fatal_not_finished() {
        let producer =
            FixtureProducer::scripted(vec![Ok(doc(1)), Err(FlowError::Exception)]);
        let consumer = FixtureConsumer::new();
        let probe = consumer.probe();
        probe.set_locator(Locator::new(1, 1));

        let workflow = Workflow::new(Box::new(producer), Box::new(consumer));
        workflow.start(WorkflowMode::Job);
        wait_until(|| workflow.has_fatal_error()).await;

        assert!(!workflow.is_finished());
        assert_eq!(probe.stop_reasons(), vec![FlowError::Exception]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_producer_fatal_skips_teardown() {
        let producer: FixtureProducer<RawDocument> =
            FixtureProducer::scripted(vec![Err(FlowError::Fatal)]);
        let producer_probe = producer.probe();
        let consumer = FixtureConsumer::new();
        let consumer_probe = consumer.probe();

        let workflow = Workflow::new(Box::new(producer), Box::new(consumer));
        workflow.start(WorkflowMode::Job);
        wait_until(|| workflow.has_fatal_error()).await;

        assert!(!workflow.is_finished());
        assert_eq!(producer_probe.stop_count(), 0);
        assert!(consumer_probe.stop_reasons().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_consumer_fatal_enters_fatal_state() {
        let producer = FixtureProducer::with_items(vec![doc(1), doc(2)]);
        let consumer = FixtureConsumer::new();
        let probe = consumer.probe();
        probe.fail_consume_with(FlowError::Fatal);

        let workflow = Workflow::new(Box::new(producer), Box::new(consumer));
        workflow.start(WorkflowMode::Job);
        wait_until(|| workflow.has_fatal_error()).await;
        assert!(!workflow.is_finished());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_consumer_stop_failure_prevents_finished() {
        let producer = FixtureProducer::with_items(vec![doc(1)]);
        let consumer = FixtureConsumer::new();
        let probe = consumer.probe();
        probe.set_locator(Locator::new(1, 1));
        probe.fail_stop(true);

        let workflow = Workflow::new(Box::new(producer), Box::new(consumer));
        workflow.start(WorkflowMode::Job);
        wait_until(|| workflow.has_fatal_error()).await;

        // The data loop ended on Eof but the teardown failed.
        assert!(!workflow.is_finished());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_stop_locator_is_fatal() {
        let producer = FixtureProducer::with_items(vec![doc(1)]);
        let consumer = FixtureConsumer::new();
        // Consumer never reports a locator.

        let workflow = Workflow::new(Box::new(producer), Box::new(consumer));
        workflow.start(WorkflowMode::Job);
        wait_until(|| workflow.has_fatal_error()).await;

        assert!(!workflow.is_finished());
        assert_eq!(workflow.stop_locator(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_service_mode_tolerates_eof() {
        let producer = FixtureProducer::with_items(vec![doc(1)]);
        let consumer = FixtureConsumer::new();
        let probe = consumer.probe();
        probe.set_locator(Locator::new(1, 1));

        let workflow = Workflow::new(Box::new(producer), Box::new(consumer));
        workflow.start(WorkflowMode::Service);
        wait_until(|| probe.items().len() == 1).await;

        // Eof was reached but the pump keeps running.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!workflow.is_finished());
        assert!(!workflow.has_fatal_error());

        workflow.stop().await;
        assert!(!workflow.is_finished());
        assert!(!workflow.has_fatal_error());
        // Cooperative stop still captured the cut point.
        assert_eq!(workflow.stop_locator(), Some(Locator::new(1, 1)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_suspend_before_start_holds_pump() {
        let producer = FixtureProducer::with_items((1..=100).map(doc).collect());
        let consumer = FixtureConsumer::new();
        let probe = consumer.probe();
        probe.set_locator(Locator::new(1, 0));

        let workflow = Workflow::new(Box::new(producer), Box::new(consumer));
        workflow.suspend();
        workflow.start(WorkflowMode::Service);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(probe.items().len(), 0);
        assert!(workflow.is_suspended());

        workflow.resume();
        wait_until(|| probe.items().len() == 100).await;
        workflow.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_suspend_resume_while_running() {
        let producer = FixtureProducer::with_items((1..=1000).map(doc).collect());
        let consumer = FixtureConsumer::new();
        let probe = consumer.probe();
        probe.set_locator(Locator::new(1, 0));

        let workflow = Workflow::new(Box::new(producer), Box::new(consumer));
        workflow.start(WorkflowMode::Service);
        wait_until(|| !probe.items().is_empty()).await;

        workflow.suspend();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let frozen = probe.items().len();
        tokio::time::sleep(Duration::from_millis(200)).await;
        // At most one in-flight step completes after the suspend lands.
        assert!(probe.items().len() <= frozen + 1);

        workflow.resume();
        wait_until(|| probe.items().len() == 1000).await;
        workflow.stop().await;
    }
}
