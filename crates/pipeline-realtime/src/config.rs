//! Realtime supervisor configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the realtime build supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Interval in milliseconds between control-task ticks.
    /// Defaults to 500.
    #[serde(default = "default_control_interval_ms")]
    pub control_interval_ms: u64,

    /// Wall-clock bound in seconds after which recovery is force-declared
    /// even if the stream lag is still above the threshold.
    /// Defaults to 600.
    #[serde(default = "default_max_recover_time_secs")]
    pub max_recover_time_secs: u64,

    /// Stream lag in milliseconds below which the realtime build counts as
    /// caught up. Defaults to 1000.
    #[serde(default = "default_recover_lag_threshold_ms")]
    pub recover_lag_threshold_ms: i64,

    /// Whether repeated recovery failures may be resolved by seeking the
    /// producer straight to its current maximum timestamp.
    /// Defaults to false.
    #[serde(default)]
    pub allow_forced_seek: bool,

    /// Number of consecutive recovery failures before a forced seek is
    /// attempted, when allowed. Defaults to 10.
    #[serde(default = "default_forced_seek_after_failures")]
    pub forced_seek_after_failures: u32,
}

fn default_control_interval_ms() -> u64 {
    500
}

fn default_max_recover_time_secs() -> u64 {
    600
}

fn default_recover_lag_threshold_ms() -> i64 {
    1000
}

fn default_forced_seek_after_failures() -> u32 {
    10
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            control_interval_ms: default_control_interval_ms(),
            max_recover_time_secs: default_max_recover_time_secs(),
            recover_lag_threshold_ms: default_recover_lag_threshold_ms(),
            allow_forced_seek: false,
            forced_seek_after_failures: default_forced_seek_after_failures(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RealtimeConfig::default();
        assert_eq!(config.control_interval_ms, 500);
        assert_eq!(config.max_recover_time_secs, 600);
        assert_eq!(config.recover_lag_threshold_ms, 1000);
        assert!(!config.allow_forced_seek);
        assert_eq!(config.forced_seek_after_failures, 10);
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: RealtimeConfig =
            serde_json::from_str(r#"{"control_interval_ms": 50}"#).unwrap();
        assert_eq!(config.control_interval_ms, 50);
        assert_eq!(config.recover_lag_threshold_ms, 1000);
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = RealtimeConfig {
            control_interval_ms: 100,
            max_recover_time_secs: 30,
            recover_lag_threshold_ms: 200,
            allow_forced_seek: true,
            forced_seek_after_failures: 3,
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: RealtimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.control_interval_ms, 100);
        assert!(parsed.allow_forced_seek);
        assert_eq!(parsed.forced_seek_after_failures, 3);
    }
}
