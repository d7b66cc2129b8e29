//! Error types for realtime supervision.

use thiserror::Error;

use pipeline_flow::BuildFlowError;
use pipeline_types::Locator;

/// Errors raised while starting or driving a realtime build.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// The underlying build flow failed.
    #[error("Build flow error: {0}")]
    Flow(#[from] BuildFlowError),

    /// Seeking the producer during locator calibration failed.
    #[error("Calibration seek to {locator} failed")]
    CalibrationSeek { locator: Locator },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RealtimeError::CalibrationSeek {
            locator: Locator::new(2, 30),
        };
        assert_eq!(err.to_string(), "Calibration seek to 2:30 failed");
    }
}
