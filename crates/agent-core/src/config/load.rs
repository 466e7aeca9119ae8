use anyhow::{bail, Context, Result};

use super::types::AgentConfig;

impl AgentConfig {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_file_config()?;
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.pipeline
            .validate()
            .context("invalid [pipeline] configuration")?;

        if self.queue.capacity_per_priority == 0 {
            bail!("queue.capacity_per_priority must be positive");
        }
        if self.queue.processing_timeout_ms <= 0 {
            bail!("queue.processing_timeout_ms must be positive");
        }
        if self.validator.max_message_age_ms <= 0 {
            bail!("validator.max_message_age_ms must be positive");
        }
        if self.validator.clock_skew_tolerance_ms < 0 {
            bail!("validator.clock_skew_tolerance_ms must not be negative");
        }
        if self.security.rate_limit_messages == 0 || self.security.rate_limit_window_ms <= 0 {
            bail!("security.rate_limit needs a positive message count and window");
        }
        if self.history.history_window == 0 || self.history.max_sequence_length == 0 {
            bail!("history windows must be positive");
        }
        if self.ingest.max_line_bytes == 0 {
            bail!("ingest.max_line_bytes must be positive");
        }
        Ok(())
    }
}
