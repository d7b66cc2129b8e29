//! Broker factory interface.
//!
//! The factory is the only seam through which concrete producer/consumer
//! variants enter the pipeline: message-queue-backed, file-replay or
//! in-memory, the core only sees the capability traits.

use async_trait::async_trait;
use thiserror::Error;

use pipeline_types::{ErrorInfo, ProcessedDocument, RawDocument, RoleInitParam};

use crate::io::{Consumer, Producer};

/// Errors raised by broker factories.
///
/// Creation failures during continuous startup are recoverable: the work
/// loop retries them through the async starter.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Producer or consumer construction failed.
    #[error("Broker create error: {0}")]
    Create(String),

    /// Counter-map initialization failed.
    #[error("Counter init error: {0}")]
    CounterInit(String),
}

/// Manufactures producers and consumers for each pipeline role.
#[async_trait]
pub trait BrokerFactory: Send + Sync {
    /// Producer of raw documents for the reader role.
    async fn create_raw_doc_producer(
        &self,
        param: &RoleInitParam,
    ) -> Result<Box<dyn Producer<RawDocument>>, BrokerError>;

    /// Consumer of raw documents (the processing stage's input side).
    async fn create_raw_doc_consumer(
        &self,
        param: &RoleInitParam,
    ) -> Result<Box<dyn Consumer<RawDocument>>, BrokerError>;

    /// Producer of processed documents (the processing stage's output side).
    async fn create_processed_doc_producer(
        &self,
        param: &RoleInitParam,
    ) -> Result<Box<dyn Producer<ProcessedDocument>>, BrokerError>;

    /// Consumer of processed documents for the builder role.
    async fn create_processed_doc_consumer(
        &self,
        param: &RoleInitParam,
    ) -> Result<Box<dyn Consumer<ProcessedDocument>>, BrokerError>;

    /// Populate the role's counter map. Default is a no-op.
    fn init_counter_map(&self, param: &mut RoleInitParam) -> Result<(), BrokerError> {
        let _ = param;
        Ok(())
    }

    /// Append factory-side error reports for external observability.
    fn fill_error_infos(&self, out: &mut Vec<ErrorInfo>) {
        let _ = out;
    }
}
