use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Escalation thresholds and worker scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Detection score above which the analyzer runs.
    pub analysis_threshold: f64,
    /// Anomaly score above which the sequence transform runs.
    pub transform_threshold: f64,
    /// Anomaly score above which the verdict reports a threat.
    pub threat_threshold: f64,
    pub oracle_timeout_ms: u64,
    pub worker_count: usize,
    /// How long an idle worker waits on an empty queue before re-checking
    /// for shutdown.
    pub dequeue_wait_ms: u64,
    /// How long admission waits for room in a full priority class.
    pub enqueue_wait_ms: u64,
    pub sweep_interval_ms: u64,
    pub health_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            analysis_threshold: 0.75,
            transform_threshold: 0.85,
            threat_threshold: 0.8,
            oracle_timeout_ms: 2_000,
            worker_count: 4,
            dequeue_wait_ms: 250,
            enqueue_wait_ms: 0,
            sweep_interval_ms: 1_000,
            health_interval_ms: 30_000,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), PipelineConfigError> {
        for (name, value) in [
            ("analysis_threshold", self.analysis_threshold),
            ("transform_threshold", self.transform_threshold),
            ("threat_threshold", self.threat_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PipelineConfigError::ThresholdOutOfRange { name, value });
            }
        }
        if self.analysis_threshold > self.transform_threshold {
            return Err(PipelineConfigError::ThresholdOrder {
                analysis: self.analysis_threshold,
                transform: self.transform_threshold,
            });
        }
        for (name, value) in [
            ("worker_count", self.worker_count as u64),
            ("oracle_timeout_ms", self.oracle_timeout_ms),
            ("dequeue_wait_ms", self.dequeue_wait_ms),
            ("sweep_interval_ms", self.sweep_interval_ms),
            ("health_interval_ms", self.health_interval_ms),
        ] {
            if value == 0 {
                return Err(PipelineConfigError::Zero(name));
            }
        }
        Ok(())
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }

    pub fn dequeue_wait(&self) -> Duration {
        Duration::from_millis(self.dequeue_wait_ms)
    }

    pub fn enqueue_wait(&self) -> Duration {
        Duration::from_millis(self.enqueue_wait_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineConfigError {
    ThresholdOutOfRange { name: &'static str, value: f64 },
    ThresholdOrder { analysis: f64, transform: f64 },
    Zero(&'static str),
}

impl fmt::Display for PipelineConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThresholdOutOfRange { name, value } => {
                write!(f, "{name} {value} not in [0, 1]")
            }
            Self::ThresholdOrder {
                analysis,
                transform,
            } => write!(
                f,
                "analysis_threshold {analysis} must not exceed transform_threshold {transform}"
            ),
            Self::Zero(name) => write!(f, "{name} must be greater than zero"),
        }
    }
}

impl std::error::Error for PipelineConfigError {}
