//! Producer/consumer pumps and build orchestration.
//!
//! This crate is the control plane of the index build pipeline:
//!
//! - [`Producer`] / [`Consumer`]: capability traits for typed item sources
//!   and sinks; concrete implementations are plugged in through a
//!   [`BrokerFactory`]
//! - [`Workflow`]: a single-producer/single-consumer pump on a dedicated
//!   task with suspend/resume and cooperative stop
//! - [`BuildFlow`]: composes up to three workflows per
//!   [`pipeline_types::BuildFlowMode`] and seeks them to a mutually
//!   consistent resume locator
//! - [`AsyncStarter`]: retry-with-backoff driver used for continuous
//!   (realtime) startup where broker construction may fail transiently
//!
//! The `testing` module ships in-memory fixtures implementing the
//! capability traits, used by this crate's tests and by downstream crates.

pub mod broker;
pub mod build_flow;
pub mod error;
pub mod io;
pub mod starter;
pub mod testing;
pub mod workflow;

pub use broker::{BrokerError, BrokerFactory};
pub use build_flow::{BuildFlow, BuildFlowParams};
pub use error::BuildFlowError;
pub use io::{Consumer, IndexBuilder, Producer, SharedConsumer, SharedProducer};
pub use starter::{AsyncStarter, StarterConfig};
pub use workflow::Workflow;
