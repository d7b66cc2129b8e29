//! Realtime build supervision.
//!
//! A [`RealtimeBuilder`] owns one continuously-running
//! [`pipeline_flow::BuildFlow`] and runs a periodic control task that keeps
//! the live ingestion position consistent with a separately-running
//! incremental batch build. The control task implements three concerns:
//!
//! - **Recovery detection**: declaring the realtime stream "caught up" to
//!   the live head, with a wall-clock bound so an idle or slow stream does
//!   not stall recovery forever.
//! - **Locator calibration**: comparing the index builder's own position
//!   against the incremental build's durable cut point and seeking the
//!   producer forward so data the batch build already covers is never
//!   re-indexed.
//! - **Suspend control**: pausing ingestion under memory pressure or on
//!   administrative request, with the two causes tracked independently.

pub mod config;
pub mod error;
pub mod realtime;
pub mod tick;

pub use config::RealtimeConfig;
pub use error::RealtimeError;
pub use realtime::RealtimeBuilder;
pub use tick::{TickGuard, TickPermit};
