//! Pump step outcomes and workflow modes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Non-success outcome of one produce/consume step.
///
/// A successful step is the `Ok(..)` arm of `Result<T, FlowError>` at the
/// producer/consumer trait boundary; everything else is one of these.
/// `Eof`, `Wait` and `Skip` are expected flow-control signals, not
/// failures; only `Exception` and `Fatal` are errors.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowError {
    /// The source has no more items (may be transient in streaming modes).
    #[error("end of stream")]
    Eof,
    /// No item currently available; retry shortly.
    #[error("no item available")]
    Wait,
    /// Item deliberately skipped.
    #[error("item skipped")]
    Skip,
    /// Step failed; the pump tears down and reports a fatal error.
    #[error("step failed")]
    Exception,
    /// Unrecoverable failure; the pump stops immediately without teardown.
    #[error("fatal failure")]
    Fatal,
}

impl FlowError {
    /// Whether this outcome is expected flow control rather than a failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, FlowError::Eof | FlowError::Wait | FlowError::Skip)
    }
}

/// How a workflow pump treats end-of-stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowMode {
    /// Bounded run: `Eof` is a clean terminal condition.
    Job,
    /// Long-running: `Eof` is tolerated silently and stepping continues.
    Service,
    /// Continuous ingestion: `Eof` is transient, the source may produce more.
    Realtime,
}

impl WorkflowMode {
    /// Whether `Eof` terminates the pump in this mode.
    pub fn stops_on_eof(&self) -> bool {
        matches!(self, WorkflowMode::Job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FlowError::Eof.is_transient());
        assert!(FlowError::Wait.is_transient());
        assert!(FlowError::Skip.is_transient());
        assert!(!FlowError::Exception.is_transient());
        assert!(!FlowError::Fatal.is_transient());
    }

    #[test]
    fn test_mode_eof_behavior() {
        assert!(WorkflowMode::Job.stops_on_eof());
        assert!(!WorkflowMode::Service.stops_on_eof());
        assert!(!WorkflowMode::Realtime.stops_on_eof());
    }

    #[test]
    fn test_flow_error_serialization() {
        let json = serde_json::to_string(&FlowError::Exception).unwrap();
        assert_eq!(json, "\"exception\"");
        let back: FlowError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, FlowError::Exception);
    }
}
