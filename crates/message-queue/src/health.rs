use protocol::Priority;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthWarning {
    NearCapacity {
        priority: Priority,
        depth: usize,
        capacity: usize,
    },
    HighLatency {
        average_ms: f64,
        timeout_ms: i64,
    },
    HighFailureRate {
        rate: f64,
    },
}

/// Observability only; nothing in the queue reacts to these signals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueHealth {
    pub warnings: Vec<HealthWarning>,
}

impl QueueHealth {
    pub fn is_healthy(&self) -> bool {
        self.warnings.is_empty()
    }
}
