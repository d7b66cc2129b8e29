//! Composition of read/process/build workflows.
//!
//! A `BuildFlow` builds one to three workflows backed by endpoints from a
//! broker factory, seeks their producers to a mutually consistent resume
//! locator, and runs them until stopped or fatally failed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use pipeline_types::{
    BuildFlowMode, ErrorAdvice, ErrorCode, ErrorCollector, ErrorInfo, FlowRole, Locator,
    PartitionId, ProcessedDocument, RawDocument, RoleInitParam, SchemaRef, WorkflowMode,
};

use crate::broker::BrokerFactory;
use crate::error::BuildFlowError;
use crate::io::{IndexBuilder, SharedProducer};
use crate::starter::{AsyncStarter, StarterConfig};
use crate::workflow::Workflow;

/// Parameters for one build flow start.
#[derive(Debug, Clone)]
pub struct BuildFlowParams {
    /// Shard identity.
    pub partition: PartitionId,
    /// Which workflows to compose.
    pub mode: BuildFlowMode,
    /// How the composed pumps treat end-of-stream.
    pub workflow_mode: WorkflowMode,
    /// Free-form options forwarded to the broker factory.
    pub options: HashMap<String, String>,
    /// Optional schema reference forwarded to the broker factory.
    pub schema: Option<SchemaRef>,
}

impl BuildFlowParams {
    /// Create parameters for the given partition and modes.
    pub fn new(partition: PartitionId, mode: BuildFlowMode, workflow_mode: WorkflowMode) -> Self {
        Self {
            partition,
            mode,
            workflow_mode,
            options: HashMap::new(),
            schema: None,
        }
    }

    /// Add a broker option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Set the schema reference.
    pub fn with_schema(mut self, schema: SchemaRef) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// The live workflows of one flow generation.
///
/// At most the combination selected by the mode is non-empty; the whole set
/// is swapped atomically under the flow mutex when a retried start
/// succeeds.
#[derive(Default)]
struct FlowSet {
    factory: Option<Arc<dyn BrokerFactory>>,
    read_to_processor: Option<Workflow<RawDocument>>,
    processor_to_build: Option<Workflow<ProcessedDocument>>,
    read_to_build: Option<Workflow<RawDocument>>,
}

impl FlowSet {
    fn is_empty(&self) -> bool {
        self.read_to_processor.is_none()
            && self.processor_to_build.is_none()
            && self.read_to_build.is_none()
    }

    fn suspend_all(&self) {
        if let Some(flow) = &self.read_to_processor {
            flow.suspend();
        }
        if let Some(flow) = &self.processor_to_build {
            flow.suspend();
        }
        if let Some(flow) = &self.read_to_build {
            flow.suspend();
        }
    }

    fn resume_all(&self) {
        if let Some(flow) = &self.read_to_processor {
            flow.resume();
        }
        if let Some(flow) = &self.processor_to_build {
            flow.resume();
        }
        if let Some(flow) = &self.read_to_build {
            flow.resume();
        }
    }

    async fn stop_all(&self) {
        if let Some(flow) = &self.read_to_processor {
            flow.stop().await;
        }
        if let Some(flow) = &self.processor_to_build {
            flow.stop().await;
        }
        if let Some(flow) = &self.read_to_build {
            flow.stop().await;
        }
    }
}

/// Orchestrator over up to three produce/consume workflows.
pub struct BuildFlow {
    flows: Arc<Mutex<FlowSet>>,
    errors: Arc<ErrorCollector>,
    starter: StdMutex<Option<AsyncStarter>>,
    starter_config: StarterConfig,
    /// Latched suspension request, applied to every flow generation. A
    /// suspend issued while a retried start is still failing must hold the
    /// workflows that start succeeds with later.
    suspended: Arc<AtomicBool>,
}

impl BuildFlow {
    /// Create an empty build flow with default retry timing.
    pub fn new() -> Self {
        Self::with_starter_config(StarterConfig::default())
    }

    /// Create an empty build flow with the given retry timing for
    /// continuous startup.
    pub fn with_starter_config(starter_config: StarterConfig) -> Self {
        Self {
            flows: Arc::new(Mutex::new(FlowSet::default())),
            errors: Arc::new(ErrorCollector::new()),
            starter: StdMutex::new(None),
            starter_config,
            suspended: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bounded start: construct, seek and run the workflows, failing
    /// synchronously if any endpoint cannot be built or seeked.
    pub async fn start_build_flow(
        &self,
        factory: Arc<dyn BrokerFactory>,
        params: &BuildFlowParams,
    ) -> Result<(), BuildFlowError> {
        let set = init_workflows(&factory, params, &self.errors).await?;
        if self.suspended.load(Ordering::SeqCst) {
            set.suspend_all();
        }
        if let Err(e) = seek_and_start(&set, params.workflow_mode, &self.errors).await {
            set.stop_all().await;
            return Err(e);
        }
        info!(partition = %params.partition, mode = ?params.mode, "Build flow started");
        let mut flows = self.flows.lock().await;
        if self.suspended.load(Ordering::SeqCst) {
            set.suspend_all();
        }
        *flows = set;
        Ok(())
    }

    /// Continuous start: retry construction on a background task until it
    /// succeeds, tolerating transient broker failures.
    pub async fn start_work_loop(&self, factory: Arc<dyn BrokerFactory>, params: BuildFlowParams) {
        let flows = self.flows.clone();
        let errors = self.errors.clone();
        let suspended = self.suspended.clone();
        let starter = AsyncStarter::spawn(
            format!("build_flow/{}", params.partition),
            self.starter_config.clone(),
            move || {
                let factory = factory.clone();
                let params = params.clone();
                let flows = flows.clone();
                let errors = errors.clone();
                let suspended = suspended.clone();
                async move {
                    let set = match init_workflows(&factory, &params, &errors).await {
                        Ok(set) => set,
                        Err(e) => {
                            warn!(error = %e, "Work loop construction failed");
                            return false;
                        }
                    };
                    // A suspend requested during earlier failed attempts
                    // must hold this generation before its pumps run.
                    if suspended.load(Ordering::SeqCst) {
                        set.suspend_all();
                    }
                    if let Err(e) = seek_and_start(&set, params.workflow_mode, &errors).await {
                        warn!(error = %e, "Work loop startup failed");
                        set.stop_all().await;
                        return false;
                    }
                    info!(partition = %params.partition, "Work loop started");
                    let mut flows = flows.lock().await;
                    // Re-checked under the flow lock: a suspend racing the
                    // swap lands on either the old or the new set, never on
                    // neither.
                    if suspended.load(Ordering::SeqCst) {
                        set.suspend_all();
                    }
                    *flows = set;
                    true
                }
            },
        );
        *self.starter.lock().unwrap() = Some(starter);
    }

    /// Whether the flow's workflows are live.
    pub async fn is_started(&self) -> bool {
        if let Some(starter) = &*self.starter.lock().unwrap() {
            return starter.is_started();
        }
        !self.flows.lock().await.is_empty()
    }

    /// Suspend every live workflow. The request is latched and also applies
    /// to workflows a retried start installs later.
    pub async fn suspend(&self) {
        self.suspended.store(true, Ordering::SeqCst);
        self.flows.lock().await.suspend_all();
    }

    /// Resume every live workflow and clear the latched request.
    pub async fn resume(&self) {
        self.suspended.store(false, Ordering::SeqCst);
        self.flows.lock().await.resume_all();
    }

    /// Whether any live workflow is currently suspended.
    pub async fn is_suspended(&self) -> bool {
        let flows = self.flows.lock().await;
        flows
            .read_to_processor
            .as_ref()
            .map(Workflow::is_suspended)
            .unwrap_or(false)
            || flows
                .processor_to_build
                .as_ref()
                .map(Workflow::is_suspended)
                .unwrap_or(false)
            || flows
                .read_to_build
                .as_ref()
                .map(Workflow::is_suspended)
                .unwrap_or(false)
    }

    /// Stop the retry loop, if any, then every live workflow.
    pub async fn stop(&self) {
        let starter = self.starter.lock().unwrap().take();
        if let Some(starter) = starter {
            starter.stop().await;
        }
        let flows = self.flows.lock().await;
        flows.stop_all().await;
    }

    /// Whether every live workflow has finished cleanly.
    pub async fn is_finished(&self) -> bool {
        let flows = self.flows.lock().await;
        if flows.is_empty() {
            return false;
        }
        flows
            .read_to_processor
            .as_ref()
            .map(Workflow::is_finished)
            .unwrap_or(true)
            && flows
                .processor_to_build
                .as_ref()
                .map(Workflow::is_finished)
                .unwrap_or(true)
            && flows
                .read_to_build
                .as_ref()
                .map(Workflow::is_finished)
                .unwrap_or(true)
    }

    /// Whether any live workflow reached the fatal state.
    pub async fn has_fatal_error(&self) -> bool {
        let flows = self.flows.lock().await;
        flows
            .read_to_processor
            .as_ref()
            .map(Workflow::has_fatal_error)
            .unwrap_or(false)
            || flows
                .processor_to_build
                .as_ref()
                .map(Workflow::has_fatal_error)
                .unwrap_or(false)
            || flows
                .read_to_build
                .as_ref()
                .map(Workflow::has_fatal_error)
                .unwrap_or(false)
    }

    /// The index builder behind the build-side consumer, if any.
    pub async fn builder(&self) -> Option<Arc<dyn IndexBuilder>> {
        let flows = self.flows.lock().await;
        if let Some(flow) = &flows.read_to_build {
            if let Some(builder) = flow.builder().await {
                return Some(builder);
            }
        }
        if let Some(flow) = &flows.processor_to_build {
            if let Some(builder) = flow.builder().await {
                return Some(builder);
            }
        }
        None
    }

    /// The raw-document producer on the reading side, if any.
    pub async fn reader_producer(&self) -> Option<SharedProducer<RawDocument>> {
        let flows = self.flows.lock().await;
        if let Some(flow) = &flows.read_to_processor {
            return Some(flow.producer());
        }
        flows.read_to_build.as_ref().map(Workflow::producer)
    }

    /// The processed-document producer feeding the builder, if any.
    pub async fn processed_producer(&self) -> Option<SharedProducer<ProcessedDocument>> {
        let flows = self.flows.lock().await;
        flows.processor_to_build.as_ref().map(Workflow::producer)
    }

    /// The raw-document producer of the direct read-to-build flow, if any.
    pub async fn raw_build_producer(&self) -> Option<SharedProducer<RawDocument>> {
        let flows = self.flows.lock().await;
        flows.read_to_build.as_ref().map(Workflow::producer)
    }

    /// Forward a read stop-timestamp to the reading-side producer.
    pub async fn suspend_read_at_timestamp(&self, timestamp_ms: i64) {
        let flows = self.flows.lock().await;
        if let Some(flow) = &flows.read_to_processor {
            flow.suspend_read_at(timestamp_ms).await;
        }
        if let Some(flow) = &flows.read_to_build {
            flow.suspend_read_at(timestamp_ms).await;
        }
    }

    /// Append error reports from this flow, its workflows and its factory.
    pub async fn fill_error_infos(&self, out: &mut Vec<ErrorInfo>) {
        self.errors.fill_error_infos(out);
        let flows = self.flows.lock().await;
        push_fatal(out, "read_to_processor", flows.read_to_processor.as_ref());
        push_fatal(out, "processor_to_build", flows.processor_to_build.as_ref());
        push_fatal(out, "read_to_build", flows.read_to_build.as_ref());
        if let Some(factory) = &flows.factory {
            factory.fill_error_infos(out);
        }
    }
}

fn push_fatal<T: Send + 'static>(out: &mut Vec<ErrorInfo>, name: &str, flow: Option<&Workflow<T>>) {
    if flow.map(Workflow::has_fatal_error).unwrap_or(false) {
        out.push(ErrorInfo::new(
            ErrorCode::WorkflowFatal,
            ErrorAdvice::Stop,
            format!("{name} workflow entered the fatal state"),
        ));
    }
}

impl Default for BuildFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn init_role_param(
    factory: &Arc<dyn BrokerFactory>,
    params: &BuildFlowParams,
    role: FlowRole,
    errors: &ErrorCollector,
) -> Result<RoleInitParam, BuildFlowError> {
    let mut param = RoleInitParam::new(role, params.partition.clone()).with_realtime_feed(
        role == FlowRole::Builder && params.workflow_mode == WorkflowMode::Realtime,
    );
    param.options = params.options.clone();
    param.schema = params.schema.clone();
    if let Err(e) = factory.init_counter_map(&mut param) {
        errors.push(ErrorInfo::new(
            ErrorCode::CounterInit,
            ErrorAdvice::Retry,
            format!("{role}: {e}"),
        ));
        return Err(e.into());
    }
    Ok(param)
}

async fn init_workflows(
    factory: &Arc<dyn BrokerFactory>,
    params: &BuildFlowParams,
    errors: &ErrorCollector,
) -> Result<FlowSet, BuildFlowError> {
    let mode = params.mode;
    let mut set = FlowSet {
        factory: Some(factory.clone()),
        ..Default::default()
    };

    let create = |e: crate::broker::BrokerError| {
        errors.push(ErrorInfo::new(
            ErrorCode::BrokerCreate,
            ErrorAdvice::Retry,
            e.to_string(),
        ));
        BuildFlowError::from(e)
    };

    if mode.builds_read_to_build() {
        let reader_param = init_role_param(factory, params, FlowRole::Reader, errors)?;
        let builder_param = init_role_param(factory, params, FlowRole::Builder, errors)?;
        let producer = factory
            .create_raw_doc_producer(&reader_param)
            .await
            .map_err(create)?;
        let consumer = factory
            .create_raw_doc_consumer(&builder_param)
            .await
            .map_err(create)?;
        set.read_to_build = Some(Workflow::new(producer, consumer));
        debug!(partition = %params.partition, "Created read-to-build workflow");
        return Ok(set);
    }

    if mode.builds_read_to_processor() {
        let reader_param = init_role_param(factory, params, FlowRole::Reader, errors)?;
        let processor_param = init_role_param(factory, params, FlowRole::Processor, errors)?;
        let producer = factory
            .create_raw_doc_producer(&reader_param)
            .await
            .map_err(create)?;
        let consumer = factory
            .create_raw_doc_consumer(&processor_param)
            .await
            .map_err(create)?;
        set.read_to_processor = Some(Workflow::new(producer, consumer));
        debug!(partition = %params.partition, "Created read-to-processor workflow");
    }

    if mode.builds_processor_to_build() {
        let processor_param = init_role_param(factory, params, FlowRole::Processor, errors)?;
        let builder_param = init_role_param(factory, params, FlowRole::Builder, errors)?;
        let producer = factory
            .create_processed_doc_producer(&processor_param)
            .await
            .map_err(create)?;
        let consumer = factory
            .create_processed_doc_consumer(&builder_param)
            .await
            .map_err(create)?;
        set.processor_to_build = Some(Workflow::new(producer, consumer));
        debug!(partition = %params.partition, "Created processor-to-build workflow");
    }

    Ok(set)
}

/// Resolve the resume locator from the live consumers.
///
/// Priority, highest first: read-to-build, processor-to-build,
/// read-to-processor. The consumer deepest in the pipeline knows the last
/// durable cut point for everything upstream of it, so its locator is
/// authoritative for the whole composed flow.
async fn resolve_seek_locator(set: &FlowSet) -> Option<Locator> {
    if let Some(flow) = &set.read_to_build {
        if let Some(locator) = flow.consumer_locator().await {
            return Some(locator);
        }
    }
    if let Some(flow) = &set.processor_to_build {
        if let Some(locator) = flow.consumer_locator().await {
            return Some(locator);
        }
    }
    if let Some(flow) = &set.read_to_processor {
        if let Some(locator) = flow.consumer_locator().await {
            return Some(locator);
        }
    }
    None
}

/// Seek every live producer to the resolved locator, then start the pumps.
async fn seek_and_start(
    set: &FlowSet,
    mode: WorkflowMode,
    errors: &ErrorCollector,
) -> Result<(), BuildFlowError> {
    if let Some(locator) = resolve_seek_locator(set).await {
        if locator.is_valid() {
            info!(%locator, "Seeking producers to resume locator");
            seek_all(set, locator, errors).await?;
        }
    }

    if let Some(flow) = &set.read_to_processor {
        flow.start(mode);
    }
    if let Some(flow) = &set.processor_to_build {
        flow.start(mode);
    }
    if let Some(flow) = &set.read_to_build {
        flow.start(mode);
    }
    Ok(())
}

async fn seek_all(
    set: &FlowSet,
    locator: Locator,
    errors: &ErrorCollector,
) -> Result<(), BuildFlowError> {
    let report = || {
        errors.push(ErrorInfo::new(
            ErrorCode::StreamSeek,
            ErrorAdvice::Retry,
            format!("seek to {locator} failed during flow startup"),
        ));
        BuildFlowError::Seek { locator }
    };

    if let Some(flow) = &set.read_to_processor {
        flow.seek_producer(locator).await.map_err(|_| report())?;
    }
    if let Some(flow) = &set.processor_to_build {
        flow.seek_producer(locator).await.map_err(|_| report())?;
    }
    if let Some(flow) = &set.read_to_build {
        flow.seek_producer(locator).await.map_err(|_| report())?;
    }
    Ok(())
}
