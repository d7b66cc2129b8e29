//! In-memory fixtures implementing the capability traits.
//!
//! These back the in-memory source/sink variant and are used by tests in
//! this crate and downstream crates. Each fixture exposes a shared probe so
//! tests can script behavior and assert on interactions after the fixture
//! has been moved into a workflow.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use pipeline_types::{
    ErrorInfo, FlowError, Locator, ProcessedDocument, RawDocument, RoleInitParam,
};

use crate::broker::{BrokerError, BrokerFactory};
use crate::io::{Consumer, IndexBuilder, Producer};

/// Observable state of a [`FixtureProducer`].
#[derive(Default)]
pub struct ProducerProbe {
    seeks: StdMutex<Vec<Locator>>,
    stop_count: AtomicUsize,
    fail_seek: AtomicBool,
    fail_stop: AtomicBool,
    source: StdMutex<Option<u64>>,
    max_timestamp: StdMutex<Option<i64>>,
    last_read_timestamp: StdMutex<Option<i64>>,
    suspend_read_at: StdMutex<Option<i64>>,
}

impl ProducerProbe {
    pub fn seeks(&self) -> Vec<Locator> {
        self.seeks.lock().unwrap().clone()
    }

    pub fn stop_count(&self) -> usize {
        self.stop_count.load(Ordering::SeqCst)
    }

    pub fn fail_seek(&self, fail: bool) {
        self.fail_seek.store(fail, Ordering::SeqCst);
    }

    pub fn fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    pub fn set_source(&self, source: u64) {
        *self.source.lock().unwrap() = Some(source);
    }

    pub fn set_max_timestamp(&self, timestamp_ms: i64) {
        *self.max_timestamp.lock().unwrap() = Some(timestamp_ms);
    }

    pub fn set_last_read_timestamp(&self, timestamp_ms: i64) {
        *self.last_read_timestamp.lock().unwrap() = Some(timestamp_ms);
    }

    pub fn suspend_read_at(&self) -> Option<i64> {
        *self.suspend_read_at.lock().unwrap()
    }
}

/// Producer over a scripted sequence of step outcomes.
pub struct FixtureProducer<T> {
    steps: VecDeque<Result<T, FlowError>>,
    /// Outcome reported once the script is exhausted.
    exhausted: FlowError,
    probe: Arc<ProducerProbe>,
}

impl<T> FixtureProducer<T> {
    /// Produce the given items in order, then report `Eof`.
    pub fn with_items(items: Vec<T>) -> Self {
        Self::scripted(items.into_iter().map(Ok).collect())
    }

    /// Produce the scripted outcomes in order, then report `Eof`.
    pub fn scripted(steps: Vec<Result<T, FlowError>>) -> Self {
        Self {
            steps: steps.into(),
            exhausted: FlowError::Eof,
            probe: Arc::new(ProducerProbe::default()),
        }
    }

    /// A producer with nothing to produce that reports `Wait` forever,
    /// mimicking an idle realtime stream.
    pub fn idle() -> Self {
        Self::scripted(Vec::new()).exhaust_with(FlowError::Wait)
    }

    /// Change the outcome reported once the script is exhausted.
    pub fn exhaust_with(mut self, outcome: FlowError) -> Self {
        self.exhausted = outcome;
        self
    }

    /// Reuse an existing probe, e.g. one held by a broker factory.
    pub fn with_probe(mut self, probe: Arc<ProducerProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Shared handle for scripting and assertions.
    pub fn probe(&self) -> Arc<ProducerProbe> {
        self.probe.clone()
    }
}

#[async_trait]
impl<T: Send> Producer<T> for FixtureProducer<T> {
    async fn produce(&mut self, _cancel: &CancellationToken) -> Result<T, FlowError> {
        match self.steps.pop_front() {
            Some(step) => step,
            None => Err(self.exhausted),
        }
    }

    async fn seek(&mut self, locator: Locator) -> Result<(), FlowError> {
        self.probe.seeks.lock().unwrap().push(locator);
        if self.probe.fail_seek.load(Ordering::SeqCst) {
            return Err(FlowError::Exception);
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), FlowError> {
        self.probe.stop_count.fetch_add(1, Ordering::SeqCst);
        if self.probe.fail_stop.load(Ordering::SeqCst) {
            return Err(FlowError::Exception);
        }
        Ok(())
    }

    fn source_id(&self) -> Option<u64> {
        *self.probe.source.lock().unwrap()
    }

    fn max_timestamp(&self) -> Option<i64> {
        *self.probe.max_timestamp.lock().unwrap()
    }

    fn last_read_timestamp(&self) -> Option<i64> {
        *self.probe.last_read_timestamp.lock().unwrap()
    }

    fn suspend_read_at(&mut self, timestamp_ms: i64) {
        *self.probe.suspend_read_at.lock().unwrap() = Some(timestamp_ms);
    }
}

/// Observable state of a [`FixtureConsumer`].
pub struct ConsumerProbe<T> {
    items: StdMutex<Vec<T>>,
    locator: StdMutex<Option<Locator>>,
    stop_reasons: StdMutex<Vec<FlowError>>,
    fail_stop: AtomicBool,
    consume_error: StdMutex<Option<FlowError>>,
    builder: StdMutex<Option<Arc<dyn IndexBuilder>>>,
}

impl<T> Default for ConsumerProbe<T> {
    fn default() -> Self {
        Self {
            items: StdMutex::new(Vec::new()),
            locator: StdMutex::new(None),
            stop_reasons: StdMutex::new(Vec::new()),
            fail_stop: AtomicBool::new(false),
            consume_error: StdMutex::new(None),
            builder: StdMutex::new(None),
        }
    }
}

impl<T> ConsumerProbe<T> {
    pub fn set_locator(&self, locator: Locator) {
        *self.locator.lock().unwrap() = Some(locator);
    }

    pub fn stop_reasons(&self) -> Vec<FlowError> {
        self.stop_reasons.lock().unwrap().clone()
    }

    pub fn fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `consume` call fail with the given outcome.
    pub fn fail_consume_with(&self, error: FlowError) {
        *self.consume_error.lock().unwrap() = Some(error);
    }

    pub fn attach_builder(&self, builder: Arc<dyn IndexBuilder>) {
        *self.builder.lock().unwrap() = Some(builder);
    }
}

impl<T: Clone> ConsumerProbe<T> {
    pub fn items(&self) -> Vec<T> {
        self.items.lock().unwrap().clone()
    }
}

/// Consumer that records everything it receives.
pub struct FixtureConsumer<T> {
    probe: Arc<ConsumerProbe<T>>,
}

impl<T> FixtureConsumer<T> {
    pub fn new() -> Self {
        Self {
            probe: Arc::new(ConsumerProbe::default()),
        }
    }

    /// Reuse an existing probe, e.g. one held by a broker factory.
    pub fn with_probe(probe: Arc<ConsumerProbe<T>>) -> Self {
        Self { probe }
    }

    /// Shared handle for scripting and assertions.
    pub fn probe(&self) -> Arc<ConsumerProbe<T>> {
        self.probe.clone()
    }
}

impl<T> Default for FixtureConsumer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Send> Consumer<T> for FixtureConsumer<T> {
    async fn consume(&mut self, item: T, _cancel: &CancellationToken) -> Result<(), FlowError> {
        if let Some(error) = *self.probe.consume_error.lock().unwrap() {
            return Err(error);
        }
        self.probe.items.lock().unwrap().push(item);
        Ok(())
    }

    fn locator(&self) -> Option<Locator> {
        *self.probe.locator.lock().unwrap()
    }

    async fn stop(&mut self, reason: FlowError) -> Result<(), FlowError> {
        self.probe.stop_reasons.lock().unwrap().push(reason);
        if self.probe.fail_stop.load(Ordering::SeqCst) {
            return Err(FlowError::Exception);
        }
        Ok(())
    }

    fn builder(&self) -> Option<Arc<dyn IndexBuilder>> {
        self.probe.builder.lock().unwrap().clone()
    }
}

/// Scriptable index builder double.
#[derive(Default)]
pub struct FixtureBuilder {
    last: StdMutex<Option<Locator>>,
    inc_timestamp: StdMutex<Option<i64>>,
    memory_exceeded: AtomicBool,
    stopped: AtomicBool,
}

impl FixtureBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_last_locator(&self, locator: Locator) {
        *self.last.lock().unwrap() = Some(locator);
    }

    pub fn set_inc_version_timestamp(&self, timestamp_ms: i64) {
        *self.inc_timestamp.lock().unwrap() = Some(timestamp_ms);
    }

    pub fn set_memory_exceeded(&self, exceeded: bool) {
        self.memory_exceeded.store(exceeded, Ordering::SeqCst);
    }

    pub fn was_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl IndexBuilder for FixtureBuilder {
    fn last_locator(&self) -> Option<Locator> {
        *self.last.lock().unwrap()
    }

    fn inc_version_timestamp_nonblocking(&self) -> Option<i64> {
        *self.inc_timestamp.lock().unwrap()
    }

    fn is_memory_exceeded(&self) -> bool {
        self.memory_exceeded.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// In-memory broker factory wiring fixtures to every role.
///
/// Probes for each endpoint are shared with the factory so tests can
/// script and assert after the endpoints have been handed to workflows.
pub struct MemBrokerFactory {
    raw_items: StdMutex<Vec<RawDocument>>,
    processed_items: StdMutex<Vec<ProcessedDocument>>,
    /// When true, drained producers report `Wait` instead of `Eof`.
    streaming: AtomicBool,
    /// Number of upcoming create calls that fail, for retry-path tests.
    fail_creates_remaining: AtomicU32,
    pub raw_producer: Arc<ProducerProbe>,
    pub processed_producer: Arc<ProducerProbe>,
    pub raw_consumer: Arc<ConsumerProbe<RawDocument>>,
    pub processed_consumer: Arc<ConsumerProbe<ProcessedDocument>>,
    pub builder: Arc<FixtureBuilder>,
    counter_init_calls: AtomicUsize,
}

impl MemBrokerFactory {
    pub fn new() -> Self {
        let builder = Arc::new(FixtureBuilder::new());
        let raw_consumer: Arc<ConsumerProbe<RawDocument>> = Arc::new(ConsumerProbe::default());
        let processed_consumer: Arc<ConsumerProbe<ProcessedDocument>> =
            Arc::new(ConsumerProbe::default());
        // Builder-side consumers expose the builder handle.
        raw_consumer.attach_builder(builder.clone());
        processed_consumer.attach_builder(builder.clone());
        Self {
            raw_items: StdMutex::new(Vec::new()),
            processed_items: StdMutex::new(Vec::new()),
            streaming: AtomicBool::new(false),
            fail_creates_remaining: AtomicU32::new(0),
            raw_producer: Arc::new(ProducerProbe::default()),
            processed_producer: Arc::new(ProducerProbe::default()),
            raw_consumer,
            processed_consumer,
            builder,
            counter_init_calls: AtomicUsize::new(0),
        }
    }

    /// Seed the raw-document source.
    pub fn seed_raw(&self, items: Vec<RawDocument>) {
        *self.raw_items.lock().unwrap() = items;
    }

    /// Seed the processed-document source.
    pub fn seed_processed(&self, items: Vec<ProcessedDocument>) {
        *self.processed_items.lock().unwrap() = items;
    }

    /// Make drained producers report `Wait` instead of `Eof`.
    pub fn streaming(&self, streaming: bool) {
        self.streaming.store(streaming, Ordering::SeqCst);
    }

    /// Fail the next `count` endpoint create calls.
    pub fn fail_next_creates(&self, count: u32) {
        self.fail_creates_remaining.store(count, Ordering::SeqCst);
    }

    pub fn counter_init_calls(&self) -> usize {
        self.counter_init_calls.load(Ordering::SeqCst)
    }

    fn check_create(&self, kind: &str) -> Result<(), BrokerError> {
        let remaining = self.fail_creates_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_creates_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(BrokerError::Create(format!("{kind} unavailable")));
        }
        Ok(())
    }

    fn exhausted(&self) -> FlowError {
        if self.streaming.load(Ordering::SeqCst) {
            FlowError::Wait
        } else {
            FlowError::Eof
        }
    }
}

impl Default for MemBrokerFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerFactory for MemBrokerFactory {
    async fn create_raw_doc_producer(
        &self,
        _param: &RoleInitParam,
    ) -> Result<Box<dyn Producer<RawDocument>>, BrokerError> {
        self.check_create("raw doc producer")?;
        let items = std::mem::take(&mut *self.raw_items.lock().unwrap());
        Ok(Box::new(
            FixtureProducer::with_items(items)
                .exhaust_with(self.exhausted())
                .with_probe(self.raw_producer.clone()),
        ))
    }

    async fn create_raw_doc_consumer(
        &self,
        _param: &RoleInitParam,
    ) -> Result<Box<dyn Consumer<RawDocument>>, BrokerError> {
        self.check_create("raw doc consumer")?;
        Ok(Box::new(FixtureConsumer::with_probe(
            self.raw_consumer.clone(),
        )))
    }

    async fn create_processed_doc_producer(
        &self,
        _param: &RoleInitParam,
    ) -> Result<Box<dyn Producer<ProcessedDocument>>, BrokerError> {
        self.check_create("processed doc producer")?;
        let items = std::mem::take(&mut *self.processed_items.lock().unwrap());
        Ok(Box::new(
            FixtureProducer::with_items(items)
                .exhaust_with(self.exhausted())
                .with_probe(self.processed_producer.clone()),
        ))
    }

    async fn create_processed_doc_consumer(
        &self,
        _param: &RoleInitParam,
    ) -> Result<Box<dyn Consumer<ProcessedDocument>>, BrokerError> {
        self.check_create("processed doc consumer")?;
        Ok(Box::new(FixtureConsumer::with_probe(
            self.processed_consumer.clone(),
        )))
    }

    fn init_counter_map(&self, param: &mut RoleInitParam) -> Result<(), BrokerError> {
        self.counter_init_calls.fetch_add(1, Ordering::SeqCst);
        param.counters.set(&format!("{}.initialized", param.role), 1);
        Ok(())
    }

    fn fill_error_infos(&self, _out: &mut Vec<ErrorInfo>) {}
}
