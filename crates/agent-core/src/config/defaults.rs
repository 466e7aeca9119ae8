use admission::{SecurityConfig, ValidatorConfig};
use detection::{HistoryConfig, RecommendationTemplates};
use message_queue::QueueConfig;
use pipeline::PipelineConfig;

use super::constants::{DEFAULT_DRAIN_TIMEOUT_MS, DEFAULT_MAX_LINE_BYTES};
use super::types::{AgentConfig, IngestConfig};

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            validator: ValidatorConfig::default(),
            security: SecurityConfig::default(),
            queue: QueueConfig::default(),
            pipeline: PipelineConfig::default(),
            history: HistoryConfig::default(),
            ingest: IngestConfig::default(),
            recommendations: RecommendationTemplates::default(),
            keyring_path: None,
            patterns_path: None,
            model_path: None,
        }
    }
}
