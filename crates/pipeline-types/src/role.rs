//! Role initialization parameters passed to broker factories.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::partition::PartitionId;

/// The pipeline role a producer/consumer pair is created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowRole {
    Reader,
    Processor,
    Builder,
}

impl fmt::Display for FlowRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowRole::Reader => write!(f, "reader"),
            FlowRole::Processor => write!(f, "processor"),
            FlowRole::Builder => write!(f, "builder"),
        }
    }
}

/// Thread-safe named counters shared between a role's components.
///
/// Broker factories populate this during role initialization; producers and
/// consumers bump counters as they move documents.
#[derive(Debug, Default)]
pub struct CounterMap {
    counters: RwLock<HashMap<String, i64>>,
}

impl CounterMap {
    /// Create an empty counter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` to the named counter, creating it at zero if absent.
    pub fn bump(&self, name: &str, delta: i64) {
        let mut counters = self.counters.write().unwrap();
        *counters.entry(name.to_string()).or_insert(0) += delta;
    }

    /// Set the named counter to an absolute value.
    pub fn set(&self, name: &str, value: i64) {
        let mut counters = self.counters.write().unwrap();
        counters.insert(name.to_string(), value);
    }

    /// Current value of the named counter, if registered.
    pub fn get(&self, name: &str) -> Option<i64> {
        self.counters.read().unwrap().get(name).copied()
    }

    /// Snapshot of all counters.
    pub fn snapshot(&self) -> HashMap<String, i64> {
        self.counters.read().unwrap().clone()
    }
}

/// Sink for point-in-time metric observations.
///
/// The pipeline core only records through this handle; exporting is the
/// embedding process's concern.
pub trait MetricSink: Send + Sync {
    /// Record one observation of the named metric.
    fn record(&self, name: &str, value: f64);
}

/// Reference to the index schema a role builds against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRef {
    /// Logical table name.
    pub table: String,
    /// Schema version the build targets.
    pub version: u32,
}

/// Aggregate passed to a broker factory when initializing one role.
///
/// Built fresh per start call, owned by the caller, read-only to factories
/// except for counter-map population.
#[derive(Clone)]
pub struct RoleInitParam {
    /// Which role is being initialized.
    pub role: FlowRole,
    /// Shard identity, used for topic selection and log correlation.
    pub partition: PartitionId,
    /// Free-form key/value options for the concrete broker implementation.
    pub options: HashMap<String, String>,
    /// Shared counters for this role.
    pub counters: Arc<CounterMap>,
    /// Optional metric sink handle.
    pub metrics: Option<Arc<dyn MetricSink>>,
    /// Stream filter mask applied by the broker.
    pub filter_mask: u8,
    /// Expected filter result for documents this role should see.
    pub filter_result: u8,
    /// Optional schema reference.
    pub schema: Option<SchemaRef>,
    /// Whether the realtime stream feeds this build directly.
    pub realtime_feed: bool,
}

impl RoleInitParam {
    /// Create parameters for the given role and partition.
    pub fn new(role: FlowRole, partition: PartitionId) -> Self {
        Self {
            role,
            partition,
            options: HashMap::new(),
            counters: Arc::new(CounterMap::new()),
            metrics: None,
            filter_mask: 0,
            filter_result: 0,
            schema: None,
            realtime_feed: false,
        }
    }

    /// Add a key/value option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Set the schema reference.
    pub fn with_schema(mut self, schema: SchemaRef) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Set the stream filter mask and expected result.
    pub fn with_filter(mut self, mask: u8, result: u8) -> Self {
        self.filter_mask = mask;
        self.filter_result = result;
        self
    }

    /// Mark this role as fed directly by the realtime stream.
    pub fn with_realtime_feed(mut self, realtime_feed: bool) -> Self {
        self.realtime_feed = realtime_feed;
        self
    }

    /// Look up an option value.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

impl fmt::Debug for RoleInitParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleInitParam")
            .field("role", &self.role)
            .field("partition", &self.partition)
            .field("options", &self.options)
            .field("filter_mask", &self.filter_mask)
            .field("filter_result", &self.filter_result)
            .field("schema", &self.schema)
            .field("realtime_feed", &self.realtime_feed)
            .finish()
    }
}
