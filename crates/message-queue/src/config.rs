use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Pending plus in-flight messages allowed per priority class.
    pub capacity_per_priority: usize,
    pub max_retries: u32,
    pub processing_timeout_ms: i64,
    pub retention_ms: i64,
    pub batch_size: usize,
    pub latency_samples: usize,
    pub near_capacity_ratio: f64,
    pub high_latency_ratio: f64,
    pub failure_rate_threshold: f64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity_per_priority: 10_000,
            max_retries: 3,
            processing_timeout_ms: 30_000,
            retention_ms: 60 * 60 * 1_000,
            batch_size: 10,
            latency_samples: 1_000,
            near_capacity_ratio: 0.8,
            high_latency_ratio: 0.8,
            failure_rate_threshold: 0.1,
        }
    }
}
