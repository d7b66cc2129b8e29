//! Build shard identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which build step a partition belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStep {
    /// Full (batch) rebuild of the index.
    Full,
    /// Incremental build on top of an existing full build.
    Incremental,
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStep::Full => write!(f, "full"),
            BuildStep::Incremental => write!(f, "inc"),
        }
    }
}

/// Inclusive hash range of documents this shard covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRange {
    pub from: u16,
    pub to: u16,
}

impl PartitionRange {
    /// The range covering the whole hash space.
    pub fn full() -> Self {
        Self {
            from: 0,
            to: u16::MAX,
        }
    }
}

/// Identity of one build shard.
///
/// Used as a correlation key in logs and error reports, and to select
/// topic/role-specific behavior in broker factories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionId {
    /// Cluster names this partition serves.
    pub clusters: Vec<String>,
    /// Document hash range.
    pub range: PartitionRange,
    /// Build step (full or incremental).
    pub step: BuildStep,
    /// Build generation id.
    pub generation: u64,
}

impl PartitionId {
    /// Create a partition id covering the full range.
    pub fn new(cluster: impl Into<String>, step: BuildStep, generation: u64) -> Self {
        Self {
            clusters: vec![cluster.into()],
            range: PartitionRange::full(),
            step,
            generation,
        }
    }

    /// Set the document hash range.
    pub fn with_range(mut self, from: u16, to: u16) -> Self {
        self.range = PartitionRange { from, to };
        self
    }

    /// Add a cluster name.
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.clusters.push(cluster.into());
        self
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/gen-{}[{}..{}]",
            self.clusters.join(","),
            self.step,
            self.generation,
            self.range.from,
            self.range.to
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_range() {
        let range = PartitionRange::full();
        assert_eq!(range.from, 0);
        assert_eq!(range.to, u16::MAX);
    }

    #[test]
    fn test_display_correlation_key() {
        let pid = PartitionId::new("orders", BuildStep::Incremental, 3).with_range(0, 32767);
        assert_eq!(pid.to_string(), "orders/inc/gen-3[0..32767]");
    }

    #[test]
    fn test_builder_methods() {
        let pid = PartitionId::new("a", BuildStep::Full, 1).with_cluster("b");
        assert_eq!(pid.clusters, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(pid.step, BuildStep::Full);
    }

    #[test]
    fn test_serde_roundtrip() {
        let pid = PartitionId::new("orders", BuildStep::Full, 7);
        let json = serde_json::to_string(&pid).unwrap();
        let decoded: PartitionId = serde_json::from_str(&json).unwrap();
        assert_eq!(pid, decoded);
    }
}
