use super::types::AgentConfig;
use super::util::{env_bool, env_non_empty, env_parse};

impl AgentConfig {
    pub(super) fn apply_env_overrides(&mut self) {
        self.apply_env_validator();
        self.apply_env_security();
        self.apply_env_queue();
        self.apply_env_pipeline();
        self.apply_env_ingest();
    }

    fn apply_env_validator(&mut self) {
        if let Some(v) = env_parse("ROADGUARD_MAX_MESSAGE_AGE_MS") {
            self.validator.max_message_age_ms = v;
        }
        if let Some(v) = env_parse("ROADGUARD_CLOCK_SKEW_TOLERANCE_MS") {
            self.validator.clock_skew_tolerance_ms = v;
        }
        if let Some(v) = env_parse("ROADGUARD_DUPLICATE_WINDOW_MS") {
            self.validator.duplicate_window_ms = v;
        }
    }

    fn apply_env_security(&mut self) {
        if let Some(v) = env_bool("ROADGUARD_REQUIRE_SIGNATURE") {
            self.security.require_signature = v;
        }
        if let Some(v) = env_bool("ROADGUARD_REQUIRE_TRUSTED_SENDER") {
            self.security.require_trusted_sender = v;
        }
        if let Some(v) = env_parse("ROADGUARD_RATE_LIMIT_MESSAGES") {
            self.security.rate_limit_messages = v;
        }
        if let Some(v) = env_parse("ROADGUARD_RATE_LIMIT_WINDOW_MS") {
            self.security.rate_limit_window_ms = v;
        }
        if let Some(v) = env_non_empty("ROADGUARD_KEYRING") {
            self.keyring_path = Some(v);
        }
        if let Some(v) = env_non_empty("ROADGUARD_PATTERNS") {
            self.patterns_path = Some(v);
        }
    }

    fn apply_env_queue(&mut self) {
        if let Some(v) = env_parse("ROADGUARD_QUEUE_CAPACITY") {
            self.queue.capacity_per_priority = v;
        }
        if let Some(v) = env_parse("ROADGUARD_MAX_RETRIES") {
            self.queue.max_retries = v;
        }
        if let Some(v) = env_parse("ROADGUARD_PROCESSING_TIMEOUT_MS") {
            self.queue.processing_timeout_ms = v;
        }
        if let Some(v) = env_parse("ROADGUARD_RETENTION_MS") {
            self.queue.retention_ms = v;
        }
    }

    fn apply_env_pipeline(&mut self) {
        if let Some(v) = env_parse("ROADGUARD_ANALYSIS_THRESHOLD") {
            self.pipeline.analysis_threshold = v;
        }
        if let Some(v) = env_parse("ROADGUARD_TRANSFORM_THRESHOLD") {
            self.pipeline.transform_threshold = v;
        }
        if let Some(v) = env_parse("ROADGUARD_THREAT_THRESHOLD") {
            self.pipeline.threat_threshold = v;
        }
        if let Some(v) = env_parse("ROADGUARD_ORACLE_TIMEOUT_MS") {
            self.pipeline.oracle_timeout_ms = v;
        }
        if let Some(v) = env_parse("ROADGUARD_WORKERS") {
            self.pipeline.worker_count = v;
        }
        if let Some(v) = env_parse("ROADGUARD_ENQUEUE_WAIT_MS") {
            self.pipeline.enqueue_wait_ms = v;
        }
        if let Some(v) = env_non_empty("ROADGUARD_MODEL") {
            self.model_path = Some(v);
        }
    }

    fn apply_env_ingest(&mut self) {
        if let Some(v) = env_non_empty("ROADGUARD_INGEST_PATH") {
            self.ingest.path = Some(v);
        }
        if let Some(v) = env_parse("ROADGUARD_INGEST_MAX_LINE_BYTES") {
            self.ingest.max_line_bytes = v;
        }
    }
}
