//! Realtime build supervisor.
//!
//! `RealtimeBuilder` owns a continuously-running build flow and a periodic
//! control task. Each tick the task checks recovery progress against the
//! live stream head, calibrates the producer position against the
//! incremental build's durable cut point, and applies suspend/resume based
//! on memory pressure and administrative requests.
//!
//! The control task only ever uses `try_lock` on the shared producer so a
//! pump blocked inside `produce` can delay a tick's work to the next
//! invocation but never stall the timer loop itself.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pipeline_flow::{BrokerFactory, BuildFlow, BuildFlowParams, IndexBuilder, SharedProducer};
use pipeline_types::{
    BuildFlowMode, ErrorAdvice, ErrorCode, ErrorCollector, ErrorInfo, FlowError, Locator,
    ProcessedDocument, RawDocument,
};

use crate::config::RealtimeConfig;
use crate::error::RealtimeError;
use crate::tick::TickGuard;

/// Sentinel for "no skip floor configured".
const NO_SKIP_FLOOR: i64 = i64::MIN;

/// Supervisor state shared with the control task.
struct ControlState {
    recovered: AtomicBool,
    recover_started: StdMutex<Option<Instant>>,
    recover_failures: AtomicU32,
    last_skipped: StdMutex<Option<Locator>>,
    admin_suspend: AtomicBool,
    auto_suspend: AtomicBool,
    suspended: AtomicBool,
    timestamp_to_skip: AtomicI64,
    sticky_code: StdMutex<Option<ErrorCode>>,
    errors: ErrorCollector,
    last_forced_seek: StdMutex<Option<(i64, i64)>>,
}

impl ControlState {
    fn new() -> Self {
        Self {
            recovered: AtomicBool::new(false),
            recover_started: StdMutex::new(None),
            recover_failures: AtomicU32::new(0),
            last_skipped: StdMutex::new(None),
            admin_suspend: AtomicBool::new(false),
            auto_suspend: AtomicBool::new(false),
            suspended: AtomicBool::new(false),
            timestamp_to_skip: AtomicI64::new(NO_SKIP_FLOOR),
            sticky_code: StdMutex::new(None),
            errors: ErrorCollector::new(),
            last_forced_seek: StdMutex::new(None),
        }
    }
}

/// Supervisor over one realtime build flow.
pub struct RealtimeBuilder {
    flow: Arc<BuildFlow>,
    config: RealtimeConfig,
    state: Arc<ControlState>,
    cancel: CancellationToken,
    handle: StdMutex<Option<JoinHandle<()>>>,
}

impl RealtimeBuilder {
    /// Create a supervisor over a fresh build flow.
    pub fn new(config: RealtimeConfig) -> Self {
        Self::with_build_flow(config, Arc::new(BuildFlow::new()))
    }

    /// Create a supervisor over an existing build flow, e.g. one configured
    /// with custom startup retry timing.
    pub fn with_build_flow(config: RealtimeConfig, flow: Arc<BuildFlow>) -> Self {
        Self {
            flow,
            config,
            state: Arc::new(ControlState::new()),
            cancel: CancellationToken::new(),
            handle: StdMutex::new(None),
        }
    }

    /// The supervised build flow.
    pub fn build_flow(&self) -> &Arc<BuildFlow> {
        &self.flow
    }

    /// Start continuous ingestion and the periodic control task.
    pub async fn start(&self, factory: Arc<dyn BrokerFactory>, params: BuildFlowParams) {
        *self.state.recover_started.lock().unwrap() = Some(Instant::now());
        let mode = params.mode;
        let partition = params.partition.clone();
        self.flow.start_work_loop(factory, params).await;

        let flow = self.flow.clone();
        let state = self.state.clone();
        let config = self.config.clone();
        let cancel = self.cancel.clone();
        let guard = Arc::new(TickGuard::new());
        let interval = Duration::from_millis(config.control_interval_ms.max(1));

        info!(%partition, interval_ms = interval.as_millis() as u64, "Realtime control task started");
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }
                // Ticks run as their own tasks so a slow calibration delays
                // work, never the timer.
                match guard.try_acquire() {
                    Some(permit) => {
                        let flow = flow.clone();
                        let state = state.clone();
                        let config = config.clone();
                        tokio::spawn(async move {
                            let _permit = permit;
                            control_tick(&flow, &state, &config, mode).await;
                        });
                    }
                    None => debug!("Control tick skipped, previous tick still running"),
                }
            }
        });
        *self.handle.lock().unwrap() = Some(handle);
    }

    /// Cancel the control task, then stop the build flow.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Control task panicked");
            }
        }
        self.flow.stop().await;
    }

    /// Request an administrative suspension of ingestion.
    pub async fn suspend_build(&self) {
        self.state.admin_suspend.store(true, Ordering::SeqCst);
        apply_suspension(&self.flow, &self.state).await;
    }

    /// Clear the administrative suspension.
    ///
    /// Ingestion stays suspended while memory pressure keeps the automatic
    /// cause active; it resumes only once both causes are clear.
    pub async fn resume_build(&self) {
        self.state.admin_suspend.store(false, Ordering::SeqCst);
        apply_suspension(&self.flow, &self.state).await;
    }

    /// Whether ingestion is currently suspended for any cause.
    pub async fn is_suspended(&self) -> bool {
        self.flow.is_suspended().await
    }

    /// Whether the realtime build has caught up to the live stream head.
    pub fn is_recovered(&self) -> bool {
        self.state.recovered.load(Ordering::SeqCst)
    }

    /// Clear the recovery latch and restart the recovery window.
    pub fn force_recover(&self) {
        self.state.recovered.store(false, Ordering::SeqCst);
        self.state.recover_failures.store(0, Ordering::SeqCst);
        *self.state.recover_started.lock().unwrap() = Some(Instant::now());
        info!("Recovery restarted");
    }

    /// Set a floor timestamp; calibration never seeks below it.
    pub fn set_timestamp_to_skip(&self, timestamp_ms: i64) {
        self.state
            .timestamp_to_skip
            .store(timestamp_ms, Ordering::SeqCst);
    }

    /// The sticky error code from the most recent calibration failure.
    pub fn error_code(&self) -> Option<ErrorCode> {
        *self.state.sticky_code.lock().unwrap()
    }

    /// The `(from, to)` timestamps of the last forced seek, if any.
    pub fn last_forced_seek(&self) -> Option<(i64, i64)> {
        *self.state.last_forced_seek.lock().unwrap()
    }

    /// Append error reports from the supervisor and the build flow.
    pub async fn fill_error_infos(&self, out: &mut Vec<ErrorInfo>) {
        self.state.errors.fill_error_infos(out);
        self.flow.fill_error_infos(out).await;
    }
}

impl Drop for RealtimeBuilder {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// The producer feeding the build side of the flow.
///
/// The direct raw variant and the processed variant carry different item
/// types; the control task only needs seek and position access.
enum FeedProducer {
    Raw(SharedProducer<RawDocument>),
    Processed(SharedProducer<ProcessedDocument>),
}

/// Snapshot of the producer's stream position counters.
struct StreamPosition {
    source: Option<u64>,
    max_timestamp: Option<i64>,
    last_read_timestamp: Option<i64>,
}

impl FeedProducer {
    fn position(&self) -> Option<StreamPosition> {
        match self {
            FeedProducer::Raw(p) => p.try_lock().ok().map(|g| StreamPosition {
                source: g.source_id(),
                max_timestamp: g.max_timestamp(),
                last_read_timestamp: g.last_read_timestamp(),
            }),
            FeedProducer::Processed(p) => p.try_lock().ok().map(|g| StreamPosition {
                source: g.source_id(),
                max_timestamp: g.max_timestamp(),
                last_read_timestamp: g.last_read_timestamp(),
            }),
        }
    }

    /// `None` when the producer lock is contended; retried next tick.
    async fn seek(&self, locator: Locator) -> Option<Result<(), FlowError>> {
        match self {
            FeedProducer::Raw(p) => match p.try_lock() {
                Ok(mut g) => Some(g.seek(locator).await),
                Err(_) => None,
            },
            FeedProducer::Processed(p) => match p.try_lock() {
                Ok(mut g) => Some(g.seek(locator).await),
                Err(_) => None,
            },
        }
    }
}

async fn feed_producer(flow: &BuildFlow, mode: BuildFlowMode) -> Option<FeedProducer> {
    if mode.builds_read_to_build() {
        flow.raw_build_producer().await.map(FeedProducer::Raw)
    } else {
        flow.processed_producer().await.map(FeedProducer::Processed)
    }
}

async fn control_tick(
    flow: &Arc<BuildFlow>,
    state: &ControlState,
    config: &RealtimeConfig,
    mode: BuildFlowMode,
) {
    let feed = feed_producer(flow, mode).await;
    let builder = flow.builder().await;
    let (feed, builder) = match (feed, builder) {
        (Some(feed), Some(builder)) => (feed, builder),
        // Torn down or not yet constructed; nothing to calibrate.
        _ => {
            state.recovered.store(true, Ordering::SeqCst);
            return;
        }
    };

    let Some(position) = feed.position() else {
        // Producer busy inside produce; retry next tick.
        return;
    };

    if !state.recovered.load(Ordering::SeqCst) {
        check_recover(state, config, &position);
        if !state.recovered.load(Ordering::SeqCst) {
            maybe_force_seek(state, config, &feed, &position).await;
        }
    }

    if let Some(latest) = latest_locator(state, builder.as_ref()) {
        if latest.is_valid() {
            if let Err(e) = producer_seek(state, &feed, latest, position.source).await {
                warn!(error = %e, "Calibration seek failed");
            }
        }
    }

    state
        .auto_suspend
        .store(builder.is_memory_exceeded(), Ordering::SeqCst);
    apply_suspension(flow, state).await;
}

/// Recovery check: caught up, timed out, or empty-stream sentinel.
fn check_recover(state: &ControlState, config: &RealtimeConfig, position: &StreamPosition) {
    let caught_up = match position.max_timestamp {
        // No head reported or negative sentinel: the stream is empty.
        None => true,
        Some(max) if max < 0 => true,
        Some(max) => {
            let last_read = position.last_read_timestamp.unwrap_or(-1);
            max - last_read <= config.recover_lag_threshold_ms
        }
    };
    let timed_out = state
        .recover_started
        .lock()
        .unwrap()
        .map(|started| started.elapsed() >= Duration::from_secs(config.max_recover_time_secs))
        .unwrap_or(false);

    if caught_up || timed_out {
        state.recovered.store(true, Ordering::SeqCst);
        info!(timed_out, "Realtime build recovered");
    } else {
        state.recover_failures.fetch_add(1, Ordering::SeqCst);
    }
}

/// After repeated recovery failures, optionally jump to the stream head.
async fn maybe_force_seek(
    state: &ControlState,
    config: &RealtimeConfig,
    feed: &FeedProducer,
    position: &StreamPosition,
) {
    if !config.allow_forced_seek {
        return;
    }
    if state.recover_failures.load(Ordering::SeqCst) < config.forced_seek_after_failures {
        return;
    }
    let Some(max) = position.max_timestamp.filter(|max| *max >= 0) else {
        return;
    };

    let from = position.last_read_timestamp.unwrap_or(-1);
    let target = Locator::new(position.source.unwrap_or(0), max);
    info!(from, to = max, "Forcing seek to stream head after repeated recovery failures");
    if producer_seek(state, feed, target, position.source)
        .await
        .is_ok()
    {
        *state.last_forced_seek.lock().unwrap() = Some((from, max));
        state.recover_failures.store(0, Ordering::SeqCst);
    }
}

/// Resolve the authoritative resume locator from the index builder.
///
/// The incremental build wins when its durable cut point is at or past the
/// realtime builder's own position; re-indexing data the batch build
/// already covers would be wasted work. The configured skip floor is
/// applied last.
fn latest_locator(state: &ControlState, builder: &dyn IndexBuilder) -> Option<Locator> {
    let realtime = builder.last_locator_nonblocking();
    let inc_timestamp = builder.inc_version_timestamp_nonblocking();

    let mut latest = match (realtime, inc_timestamp) {
        (Some(rt), Some(inc)) if inc >= rt.offset => Locator::new(rt.source, inc),
        (Some(rt), _) => rt,
        // Source is normalized to the producer's own id during the seek.
        (None, Some(inc)) => Locator::new(0, inc),
        (None, None) => return None,
    };

    let floor = state.timestamp_to_skip.load(Ordering::SeqCst);
    if floor != NO_SKIP_FLOOR && floor > latest.offset {
        latest.offset = floor;
    }
    Some(latest)
}

/// Seek the producer, normalizing the locator source to the producer's own
/// stream-source id. Idempotent: repeating the last applied seek is a
/// no-op. A failure sets a sticky error code and is retried next tick.
async fn producer_seek(
    state: &ControlState,
    feed: &FeedProducer,
    locator: Locator,
    source: Option<u64>,
) -> Result<(), RealtimeError> {
    let target = match source {
        Some(source) => locator.with_source(source),
        None => locator,
    };
    if *state.last_skipped.lock().unwrap() == Some(target) {
        return Ok(());
    }

    match feed.seek(target).await {
        Some(Ok(())) => {
            debug!(locator = %target, "Producer seeked");
            *state.last_skipped.lock().unwrap() = Some(target);
            Ok(())
        }
        Some(Err(_)) => {
            *state.sticky_code.lock().unwrap() = Some(ErrorCode::StreamSeek);
            state.errors.push(ErrorInfo::new(
                ErrorCode::StreamSeek,
                ErrorAdvice::Retry,
                format!("calibration seek to {target} failed"),
            ));
            Err(RealtimeError::CalibrationSeek { locator: target })
        }
        // Lock contended; retried on the next tick.
        None => Ok(()),
    }
}

/// Suspend while either cause is active; resume only when both are clear.
async fn apply_suspension(flow: &BuildFlow, state: &ControlState) {
    let desired = state.admin_suspend.load(Ordering::SeqCst)
        || state.auto_suspend.load(Ordering::SeqCst);
    let was = state.suspended.swap(desired, Ordering::SeqCst);
    if desired && !was {
        info!("Suspending realtime ingestion");
        flow.suspend().await;
    } else if !desired && was {
        info!("Resuming realtime ingestion");
        flow.resume().await;
    }
}
