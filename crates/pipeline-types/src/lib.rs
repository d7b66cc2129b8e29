//! Shared value types for the index build pipeline.
//!
//! These are the leaf types used across the flow and realtime crates:
//!
//! - [`Locator`]: an opaque, comparable checkpoint into a document stream
//! - [`FlowError`]: outcome of a single produce/consume step
//! - [`WorkflowMode`] / [`BuildFlowMode`]: pump and orchestration modes
//! - [`PartitionId`]: identity of a build shard, used for log correlation
//! - [`RoleInitParam`]: aggregate handed to broker factories per role
//! - [`RawDocument`] / [`ProcessedDocument`]: typed pump payloads
//! - [`ErrorInfo`] / [`ErrorCollector`]: machine-readable error reporting
//!
//! Everything here is either `Copy` or cheaply cloneable; these types cross
//! task boundaries as plain values.

pub mod doc;
pub mod error_info;
pub mod flow;
pub mod locator;
pub mod mode;
pub mod partition;
pub mod role;

pub use doc::{ProcessedDocument, RawDocument};
pub use error_info::{ErrorAdvice, ErrorCode, ErrorCollector, ErrorInfo};
pub use flow::{FlowError, WorkflowMode};
pub use locator::{Locator, LocatorParseError};
pub use mode::BuildFlowMode;
pub use partition::{BuildStep, PartitionId, PartitionRange};
pub use role::{CounterMap, FlowRole, MetricSink, RoleInitParam, SchemaRef};
