use std::sync::Arc;

use anyhow::{Context, Result};
use pipeline::{EscalationPipeline, WorkerPool};
use protocol::{Clock, SystemClock};
use tokio::io::BufReader;
use tracing::{info, warn};

use crate::config::AgentConfig;

use super::bootstrap::build_pipeline;
use super::ingest::{ingest_lines, IngestSummary};

/// The assembled pipeline plus its running workers.
pub struct AgentRuntime {
    pub(super) config: AgentConfig,
    pub(super) pipeline: Arc<EscalationPipeline>,
    pub(super) workers: WorkerPool,
}

impl AgentRuntime {
    /// Builds the pipeline and starts its workers. Must run inside a Tokio
    /// runtime.
    pub fn new(config: AgentConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: AgentConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let pipeline = Arc::new(build_pipeline(&config, clock)?);
        let workers = WorkerPool::spawn(Arc::clone(&pipeline));
        info!(
            workers = config.pipeline.worker_count,
            capacity_per_priority = config.queue.capacity_per_priority,
            max_retries = config.queue.max_retries,
            require_signature = config.security.require_signature,
            "escalation pipeline started"
        );
        Ok(Self {
            config,
            pipeline,
            workers,
        })
    }

    /// Reads the configured source to its end.
    pub async fn ingest(&self) -> Result<IngestSummary> {
        let limits = &self.config.ingest;
        match limits.path.as_deref() {
            Some(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("failed opening ingest file {path}"))?;
                info!(path, "ingesting messages from file");
                ingest_lines(&self.pipeline, BufReader::new(file), limits).await
            }
            None => {
                info!("ingesting messages from stdin");
                ingest_lines(&self.pipeline, BufReader::new(tokio::io::stdin()), limits).await
            }
        }
    }

    /// Stops the workers and logs the final counters.
    pub async fn shutdown(self) {
        self.workers.shutdown().await;
        match self.pipeline.status() {
            Ok(status) => info!(
                received = status.queue.received,
                processed = status.queue.processed,
                failed = status.queue.failed,
                retried = status.queue.retried,
                in_flight = status.queue.in_flight,
                pending = status.queue.total_pending(),
                senders = status.tracked_senders,
                "pipeline stopped"
            ),
            Err(err) => warn!(error = %err, "pipeline status unavailable at shutdown"),
        }
    }
}
