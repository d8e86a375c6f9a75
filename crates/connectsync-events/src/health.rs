//! Broker health report.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of a broker metadata probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Whether the metadata request succeeded.
    pub connected: bool,
    /// Number of brokers in the cluster metadata.
    pub brokers: usize,
    /// Number of topics visible to this client.
    pub topics: usize,
}

impl HealthStatus {
    /// Status for a cluster that could not be reached.
    #[must_use]
    pub fn unreachable() -> Self {
        Self {
            connected: false,
            brokers: 0,
            topics: 0,
        }
    }

    /// Check if the connection is healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.connected && self.brokers > 0
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_healthy() {
            write!(f, "healthy ({} brokers, {} topics)", self.brokers, self.topics)
        } else if self.connected {
            write!(f, "degraded (no brokers in metadata)")
        } else {
            write!(f, "unreachable")
        }
    }
}
