use admission::{SecurityConfig, ValidatorConfig};
use detection::{HistoryConfig, RecommendationTemplates};
use message_queue::QueueConfig;
use pipeline::PipelineConfig;

/// Where newline-delimited messages are read from.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    /// `None` reads stdin.
    pub path: Option<String>,
    /// Longer lines are skipped as malformed.
    pub max_line_bytes: usize,
    /// How long to wait for outstanding verdicts once input ends.
    pub drain_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub validator: ValidatorConfig,
    pub security: SecurityConfig,
    pub queue: QueueConfig,
    pub pipeline: PipelineConfig,
    pub history: HistoryConfig,
    pub ingest: IngestConfig,
    pub recommendations: RecommendationTemplates,
    /// Sender keys and revocations, JSON.
    pub keyring_path: Option<String>,
    /// Known attack patterns, JSON.
    pub patterns_path: Option<String>,
    /// Detector weights, JSON. The built-in model is used when unset.
    pub model_path: Option<String>,
}
