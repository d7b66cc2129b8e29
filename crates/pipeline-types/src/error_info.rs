//! Machine-readable error reporting for external monitoring.
//!
//! Fatal and retryable conditions are recorded as `(code, advice)` pairs in
//! a bounded collector; embedding processes drain the collector through
//! `fill_error_infos` to decide whether to retry or restart.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Machine-readable condition code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Broker factory failed to create a producer or consumer.
    BrokerCreate,
    /// Counter-map initialization failed.
    CounterInit,
    /// A workflow reached the fatal state.
    WorkflowFatal,
    /// A consumer could not report its stop locator.
    LocatorMissing,
    /// Seeking a producer to a stream position failed.
    StreamSeek,
}

/// What the embedding process should do about a reported condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorAdvice {
    /// The condition may clear on its own; retry.
    Retry,
    /// The component must be restarted.
    Stop,
}

/// One reported condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub advice: ErrorAdvice,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl ErrorInfo {
    /// Create an error info stamped with the current time.
    pub fn new(code: ErrorCode, advice: ErrorAdvice, message: impl Into<String>) -> Self {
        Self {
            code,
            advice,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

const DEFAULT_CAPACITY: usize = 32;

/// Bounded, thread-safe collection of reported conditions.
///
/// Oldest entries are dropped once the capacity is reached so a wedged
/// component cannot grow the collection without bound.
#[derive(Debug)]
pub struct ErrorCollector {
    infos: Mutex<VecDeque<ErrorInfo>>,
    capacity: usize,
}

impl ErrorCollector {
    /// Create a collector with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a collector retaining at most `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            infos: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            capacity: capacity.max(1),
        }
    }

    /// Record a condition.
    pub fn push(&self, info: ErrorInfo) {
        let mut infos = self.infos.lock().unwrap();
        if infos.len() == self.capacity {
            infos.pop_front();
        }
        infos.push_back(info);
    }

    /// Append a snapshot of all retained conditions to `out`.
    pub fn fill_error_infos(&self, out: &mut Vec<ErrorInfo>) {
        let infos = self.infos.lock().unwrap();
        out.extend(infos.iter().cloned());
    }

    /// Code of the most recently recorded condition, if any.
    pub fn latest_code(&self) -> Option<ErrorCode> {
        self.infos.lock().unwrap().back().map(|info| info.code)
    }

    /// Number of retained conditions.
    pub fn len(&self) -> usize {
        self.infos.lock().unwrap().len()
    }

    /// Whether no conditions are retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ErrorCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_fill() {
        let collector = ErrorCollector::new();
        assert!(collector.is_empty());

        collector.push(ErrorInfo::new(
            ErrorCode::StreamSeek,
            ErrorAdvice::Retry,
            "seek to 1:100 failed",
        ));

        let mut out = Vec::new();
        collector.fill_error_infos(&mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].code, ErrorCode::StreamSeek);
        assert_eq!(out[0].advice, ErrorAdvice::Retry);

        // Filling drains a snapshot copy, not the collector itself.
        assert_eq!(collector.len(), 1);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let collector = ErrorCollector::with_capacity(2);
        collector.push(ErrorInfo::new(ErrorCode::BrokerCreate, ErrorAdvice::Retry, "a"));
        collector.push(ErrorInfo::new(ErrorCode::CounterInit, ErrorAdvice::Retry, "b"));
        collector.push(ErrorInfo::new(ErrorCode::WorkflowFatal, ErrorAdvice::Stop, "c"));

        let mut out = Vec::new();
        collector.fill_error_infos(&mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].code, ErrorCode::CounterInit);
        assert_eq!(out[1].code, ErrorCode::WorkflowFatal);
    }

    #[test]
    fn test_latest_code() {
        let collector = ErrorCollector::new();
        assert_eq!(collector.latest_code(), None);

        collector.push(ErrorInfo::new(ErrorCode::StreamSeek, ErrorAdvice::Retry, "x"));
        assert_eq!(collector.latest_code(), Some(ErrorCode::StreamSeek));
    }

    #[test]
    fn test_error_info_serialization() {
        let info = ErrorInfo::new(ErrorCode::LocatorMissing, ErrorAdvice::Stop, "no locator");
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"locator_missing\""));
        assert!(json.contains("\"stop\""));
    }
}
