use anyhow::{Context, Result};
use detection::{HistoryConfig, RecommendationTemplates};
use serde::Deserialize;

use super::paths::resolve_config_path;
use super::types::AgentConfig;
use super::util::non_empty;

impl AgentConfig {
    pub(super) fn apply_file_config(&mut self) -> Result<bool> {
        let path = resolve_config_path()?;
        let Some(path) = path else {
            return Ok(false);
        };

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed reading config file {}", path.display()))?;
        let file_cfg: FileConfig = toml::from_str(&raw)
            .with_context(|| format!("failed parsing TOML config {}", path.display()))?;

        self.apply_file_validator(file_cfg.validator);
        self.apply_file_security(file_cfg.security);
        self.apply_file_queue(file_cfg.queue);
        self.apply_file_pipeline(file_cfg.pipeline);
        if let Some(history) = file_cfg.history {
            self.history = history;
        }
        self.apply_file_ingest(file_cfg.ingest);
        if let Some(overrides) = file_cfg.recommendations {
            self.recommendations.merge(overrides);
        }

        Ok(true)
    }

    fn apply_file_validator(&mut self, validator: Option<FileValidatorConfig>) {
        let Some(validator) = validator else {
            return;
        };

        if let Some(v) = validator.max_message_age_ms {
            self.validator.max_message_age_ms = v;
        }
        if let Some(v) = validator.clock_skew_tolerance_ms {
            self.validator.clock_skew_tolerance_ms = v;
        }
        if let Some(v) = validator.duplicate_window_ms {
            self.validator.duplicate_window_ms = v;
        }
        if let Some(v) = validator.duplicate_retention_ms {
            self.validator.duplicate_retention_ms = v;
        }
        if let Some(v) = validator.max_tracked_ids {
            self.validator.max_tracked_ids = v;
        }
    }

    fn apply_file_security(&mut self, security: Option<FileSecurityConfig>) {
        let Some(security) = security else {
            return;
        };

        if let Some(v) = security.require_signature {
            self.security.require_signature = v;
        }
        if let Some(v) = security.require_trusted_sender {
            self.security.require_trusted_sender = v;
        }
        if let Some(rate_limit) = security.rate_limit {
            if let Some(v) = rate_limit.max_messages {
                self.security.rate_limit_messages = v;
            }
            if let Some(v) = rate_limit.window_ms {
                self.security.rate_limit_window_ms = v;
            }
        }
        if let Some(v) = non_empty(security.keyring_path) {
            self.keyring_path = Some(v);
        }
        if let Some(v) = non_empty(security.patterns_path) {
            self.patterns_path = Some(v);
        }
    }

    fn apply_file_queue(&mut self, queue: Option<FileQueueConfig>) {
        let Some(queue) = queue else {
            return;
        };

        if let Some(v) = queue.capacity_per_priority {
            self.queue.capacity_per_priority = v;
        }
        if let Some(v) = queue.max_retries {
            self.queue.max_retries = v;
        }
        if let Some(v) = queue.processing_timeout_ms {
            self.queue.processing_timeout_ms = v;
        }
        if let Some(v) = queue.retention_ms {
            self.queue.retention_ms = v;
        }
        if let Some(v) = queue.batch_size {
            self.queue.batch_size = v;
        }
        if let Some(v) = queue.latency_samples {
            self.queue.latency_samples = v;
        }
        if let Some(health) = queue.health {
            if let Some(v) = health.near_capacity_ratio {
                self.queue.near_capacity_ratio = v;
            }
            if let Some(v) = health.high_latency_ratio {
                self.queue.high_latency_ratio = v;
            }
            if let Some(v) = health.failure_rate_threshold {
                self.queue.failure_rate_threshold = v;
            }
        }
    }

    fn apply_file_pipeline(&mut self, pipeline: Option<FilePipelineConfig>) {
        let Some(pipeline) = pipeline else {
            return;
        };

        if let Some(v) = pipeline.analysis_threshold {
            self.pipeline.analysis_threshold = v;
        }
        if let Some(v) = pipeline.transform_threshold {
            self.pipeline.transform_threshold = v;
        }
        if let Some(v) = pipeline.threat_threshold {
            self.pipeline.threat_threshold = v;
        }
        if let Some(v) = pipeline.oracle_timeout_ms {
            self.pipeline.oracle_timeout_ms = v;
        }
        if let Some(v) = pipeline.worker_count {
            self.pipeline.worker_count = v;
        }
        if let Some(v) = pipeline.dequeue_wait_ms {
            self.pipeline.dequeue_wait_ms = v;
        }
        if let Some(v) = pipeline.enqueue_wait_ms {
            self.pipeline.enqueue_wait_ms = v;
        }
        if let Some(v) = pipeline.sweep_interval_ms {
            self.pipeline.sweep_interval_ms = v;
        }
        if let Some(v) = pipeline.health_interval_ms {
            self.pipeline.health_interval_ms = v;
        }
        if let Some(v) = non_empty(pipeline.model_path) {
            self.model_path = Some(v);
        }
    }

    fn apply_file_ingest(&mut self, ingest: Option<FileIngestConfig>) {
        let Some(ingest) = ingest else {
            return;
        };

        if let Some(v) = non_empty(ingest.path) {
            self.ingest.path = Some(v);
        }
        if let Some(v) = ingest.max_line_bytes {
            self.ingest.max_line_bytes = v;
        }
        if let Some(v) = ingest.drain_timeout_ms {
            self.ingest.drain_timeout_ms = v;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    validator: Option<FileValidatorConfig>,
    #[serde(default)]
    security: Option<FileSecurityConfig>,
    #[serde(default)]
    queue: Option<FileQueueConfig>,
    #[serde(default)]
    pipeline: Option<FilePipelineConfig>,
    #[serde(default)]
    history: Option<HistoryConfig>,
    #[serde(default)]
    ingest: Option<FileIngestConfig>,
    #[serde(default)]
    recommendations: Option<RecommendationTemplates>,
}

#[derive(Debug, Deserialize, Default)]
struct FileValidatorConfig {
    #[serde(default)]
    max_message_age_ms: Option<i64>,
    #[serde(default)]
    clock_skew_tolerance_ms: Option<i64>,
    #[serde(default)]
    duplicate_window_ms: Option<i64>,
    #[serde(default)]
    duplicate_retention_ms: Option<i64>,
    #[serde(default)]
    max_tracked_ids: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct FileSecurityConfig {
    #[serde(default)]
    require_signature: Option<bool>,
    #[serde(default)]
    require_trusted_sender: Option<bool>,
    #[serde(default)]
    rate_limit: Option<FileRateLimitConfig>,
    #[serde(default)]
    keyring_path: Option<String>,
    #[serde(default)]
    patterns_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct FileRateLimitConfig {
    #[serde(default)]
    max_messages: Option<usize>,
    #[serde(default)]
    window_ms: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
struct FileQueueConfig {
    #[serde(default)]
    capacity_per_priority: Option<usize>,
    #[serde(default)]
    max_retries: Option<u32>,
    #[serde(default)]
    processing_timeout_ms: Option<i64>,
    #[serde(default)]
    retention_ms: Option<i64>,
    #[serde(default)]
    batch_size: Option<usize>,
    #[serde(default)]
    latency_samples: Option<usize>,
    #[serde(default)]
    health: Option<FileQueueHealthConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct FileQueueHealthConfig {
    #[serde(default)]
    near_capacity_ratio: Option<f64>,
    #[serde(default)]
    high_latency_ratio: Option<f64>,
    #[serde(default)]
    failure_rate_threshold: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct FilePipelineConfig {
    #[serde(default)]
    analysis_threshold: Option<f64>,
    #[serde(default)]
    transform_threshold: Option<f64>,
    #[serde(default)]
    threat_threshold: Option<f64>,
    #[serde(default)]
    oracle_timeout_ms: Option<u64>,
    #[serde(default)]
    worker_count: Option<usize>,
    #[serde(default)]
    dequeue_wait_ms: Option<u64>,
    #[serde(default)]
    enqueue_wait_ms: Option<u64>,
    #[serde(default)]
    sweep_interval_ms: Option<u64>,
    #[serde(default)]
    health_interval_ms: Option<u64>,
    #[serde(default)]
    model_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct FileIngestConfig {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    max_line_bytes: Option<usize>,
    #[serde(default)]
    drain_timeout_ms: Option<u64>,
}
