use std::sync::Arc;
use std::time::Duration;

use message_queue::HealthWarning;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::escalation::EscalationPipeline;

/// Pause after an infrastructure error before a worker tries again.
const WORKER_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Scoring workers plus the sweep and health tasks, stopped together.
pub struct WorkerPool {
    tasks: JoinSet<()>,
    shutdown: watch::Sender<bool>,
}

impl WorkerPool {
    /// Spawns `worker_count` workers, one sweep task and one health task on
    /// the current runtime.
    pub fn spawn(pipeline: Arc<EscalationPipeline>) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let mut tasks = JoinSet::new();

        for worker in 0..pipeline.config().worker_count {
            tasks.spawn(worker_loop(worker, Arc::clone(&pipeline), rx.clone()));
        }
        tasks.spawn(sweep_loop(Arc::clone(&pipeline), rx.clone()));
        tasks.spawn(health_loop(pipeline, rx));

        Self { tasks, shutdown }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Signals every task and waits for them to finish. Workers complete the
    /// message in hand before stopping.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "pipeline task join failed");
            }
        }
    }
}

async fn worker_loop(
    worker: usize,
    pipeline: Arc<EscalationPipeline>,
    shutdown: watch::Receiver<bool>,
) {
    let wait = pipeline.config().dequeue_wait();
    while !*shutdown.borrow() {
        if let Err(err) = pipeline.process_next(wait).await {
            warn!(worker, error = %err, "worker step failed");
            tokio::time::sleep(WORKER_ERROR_BACKOFF).await;
        }
    }
}

async fn sweep_loop(pipeline: Arc<EscalationPipeline>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(pipeline.config().sweep_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => match pipeline.sweep() {
                Ok(report) if !report.is_idle() => info!(
                    recovered = report.recovered,
                    failed = report.failed_permanently,
                    purged = report.purged,
                    sessions_closed = report.sessions_closed,
                    message_ids_evicted = report.message_ids_evicted,
                    rate_windows_evicted = report.rate_windows_evicted,
                    "maintenance sweep"
                ),
                Ok(_) => {}
                Err(err) => warn!(error = %err, "maintenance sweep failed"),
            },
        }
    }
}

async fn health_loop(pipeline: Arc<EscalationPipeline>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(pipeline.config().health_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => report_health(&pipeline),
        }
    }
}

fn report_health(pipeline: &EscalationPipeline) {
    let status = match pipeline.status() {
        Ok(status) => status,
        Err(err) => {
            warn!(error = %err, "pipeline status unavailable");
            return;
        }
    };
    let queue = &status.queue;
    info!(
        received = queue.received,
        processed = queue.processed,
        failed = queue.failed,
        retried = queue.retried,
        in_flight = queue.in_flight,
        pending = queue.total_pending(),
        average_latency_ms = queue.average_latency_ms.unwrap_or(0.0),
        senders = status.tracked_senders,
        open_sessions = status.open_sessions,
        "pipeline metrics"
    );
    for warning in &status.health.warnings {
        match warning {
            HealthWarning::NearCapacity {
                priority,
                depth,
                capacity,
            } => warn!(priority = %priority, depth, capacity, "priority class near capacity"),
            HealthWarning::HighLatency {
                average_ms,
                timeout_ms,
            } => warn!(average_ms, timeout_ms, "processing latency approaching timeout"),
            HealthWarning::HighFailureRate { rate } => {
                warn!(rate, "processing failure rate above threshold")
            }
        }
    }
}
