//! Error types for build flow orchestration.

use thiserror::Error;

use pipeline_types::Locator;

use crate::broker::BrokerError;

/// Errors raised while starting or driving a build flow.
#[derive(Debug, Error)]
pub enum BuildFlowError {
    /// Broker factory failure while constructing endpoints.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Seeking a producer to the resolved resume locator failed.
    #[error("Seek to {locator} failed")]
    Seek { locator: Locator },

    /// The flow has no workflows to operate on.
    #[error("Build flow is not started")]
    NotStarted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BuildFlowError::Seek {
            locator: Locator::new(3, 400),
        };
        assert_eq!(err.to_string(), "Seek to 3:400 failed");

        let err: BuildFlowError = BrokerError::Create("queue unreachable".to_string()).into();
        assert!(err.to_string().contains("queue unreachable"));
    }
}
