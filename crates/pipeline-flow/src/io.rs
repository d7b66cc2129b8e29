//! Capability traits for item sources and sinks.
//!
//! The pipeline core never constructs producers or consumers itself; all
//! I/O-specific variants (message-queue-backed, file-replay, in-memory
//! fixture) implement these traits and are supplied by a broker factory.
//! Low-level I/O errors are translated to [`FlowError`] at this boundary;
//! the core never inspects transport-specific error types.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use pipeline_types::{FlowError, Locator};

/// A producer shared between its pump task and external callers (seek,
/// timestamp inspection).
pub type SharedProducer<T> = Arc<Mutex<Box<dyn Producer<T>>>>;

/// A consumer shared between its pump task and external callers.
pub type SharedConsumer<T> = Arc<Mutex<Box<dyn Consumer<T>>>>;

/// Typed source of pipeline items.
///
/// `produce` must not block indefinitely: implementations either honor the
/// cancellation token inside blocking waits or return [`FlowError::Wait`]
/// promptly when no item is available, so pumps and seeks stay responsive.
#[async_trait]
pub trait Producer<T>: Send {
    /// Produce the next item.
    ///
    /// Returns `Ok(item)` on success, or a [`FlowError`] describing why no
    /// item was produced (`Eof`, `Wait`, `Skip`) or what failed
    /// (`Exception`, `Fatal`).
    async fn produce(&mut self, cancel: &CancellationToken) -> Result<T, FlowError>;

    /// Seek to the given stream position before production begins.
    async fn seek(&mut self, locator: Locator) -> Result<(), FlowError>;

    /// Stop producing and release source resources.
    async fn stop(&mut self) -> Result<(), FlowError>;

    /// Stream source id this producer reads from, if it has one.
    fn source_id(&self) -> Option<u64> {
        None
    }

    /// Maximum timestamp currently available in the source, if known.
    ///
    /// A negative value is a sentinel meaning the stream is empty.
    fn max_timestamp(&self) -> Option<i64> {
        None
    }

    /// Timestamp of the last item actually read, if known.
    fn last_read_timestamp(&self) -> Option<i64> {
        None
    }

    /// Stop producing items newer than the given timestamp.
    ///
    /// Default is a no-op for sources without timestamped items.
    fn suspend_read_at(&mut self, timestamp_ms: i64) {
        let _ = timestamp_ms;
    }
}

/// Typed sink of pipeline items.
#[async_trait]
pub trait Consumer<T>: Send {
    /// Consume one item.
    async fn consume(&mut self, item: T, cancel: &CancellationToken) -> Result<(), FlowError>;

    /// Last durable position this consumer has committed, if any.
    fn locator(&self) -> Option<Locator>;

    /// Stop consuming; `reason` is the terminal condition that ended the
    /// pump (`Eof` for a clean stop, `Exception` otherwise).
    async fn stop(&mut self, reason: FlowError) -> Result<(), FlowError>;

    /// Handle to the index builder behind this consumer, if it builds.
    fn builder(&self) -> Option<Arc<dyn IndexBuilder>> {
        None
    }
}

/// Narrow view of an index builder, consumed by the realtime supervisor.
///
/// Segment and merge internals stay behind this seam.
pub trait IndexBuilder: Send + Sync {
    /// Last locator durably applied to the index. May block briefly.
    fn last_locator(&self) -> Option<Locator>;

    /// Non-blocking variant of [`IndexBuilder::last_locator`].
    fn last_locator_nonblocking(&self) -> Option<Locator> {
        self.last_locator()
    }

    /// Timestamp up to which the incremental build has durably indexed
    /// data, without blocking.
    fn inc_version_timestamp_nonblocking(&self) -> Option<i64>;

    /// Whether the index partition has hit its memory limit.
    fn is_memory_exceeded(&self) -> bool {
        false
    }

    /// Release builder resources.
    fn stop(&self) {}
}
