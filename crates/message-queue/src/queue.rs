use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use protocol::{Message, Priority, PRIORITIES};
use tracing::{debug, warn};

use crate::config::QueueConfig;
use crate::errors::{QueueError, QueueResult};
use crate::health::{HealthWarning, QueueHealth};
use crate::stats::{QueueSnapshot, QueueStats, StateCounts};
use crate::types::{
    CompletionOutcome, Delivery, FailureOutcome, Lease, MessageId, MessageState, QueueMessage,
    StuckRecovery,
};

pub const PROCESSING_TIMEOUT_REASON: &str = "processing timeout";

/// Four strict priority lanes with per-message lifecycle bookkeeping.
///
/// Single-threaded; callers serialize access (see `SharedQueue`).
#[derive(Debug)]
pub struct PriorityQueue {
    config: QueueConfig,
    lanes: [VecDeque<MessageId>; 4],
    live_by_priority: [usize; 4],
    entries: HashMap<MessageId, QueueMessage>,
    stats: QueueStats,
    next_id: u64,
}

impl PriorityQueue {
    pub fn new(config: QueueConfig) -> Self {
        let stats = QueueStats::new(config.latency_samples);
        Self {
            config,
            lanes: Default::default(),
            live_by_priority: [0; 4],
            entries: HashMap::new(),
            stats,
            next_id: 1,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn enqueue(
        &mut self,
        message: Arc<Message>,
        priority: Priority,
        now_ms: i64,
    ) -> QueueResult<MessageId> {
        let idx = priority.index();
        if self.live_by_priority[idx] >= self.config.capacity_per_priority {
            return Err(QueueError::Full {
                priority,
                capacity: self.config.capacity_per_priority,
            });
        }

        let id = MessageId(self.next_id);
        self.next_id += 1;
        self.entries
            .insert(id, QueueMessage::new(id, message, priority, now_ms));
        self.lanes[idx].push_back(id);
        self.live_by_priority[idx] += 1;
        self.stats.record_received(priority);
        Ok(id)
    }

    /// Head of the most urgent non-empty lane, moved to PROCESSING.
    pub fn dequeue(&mut self, now_ms: i64) -> Option<Delivery> {
        for lane in self.lanes.iter_mut() {
            while let Some(id) = lane.pop_front() {
                let Some(entry) = self.entries.get_mut(&id) else {
                    continue;
                };
                if entry.state != MessageState::Pending {
                    continue;
                }
                entry.state = MessageState::Processing;
                entry.attempt += 1;
                entry.processing_started_ms = Some(now_ms);
                return Some(Delivery {
                    lease: entry.lease(),
                    message: Arc::clone(&entry.message),
                    priority: entry.priority,
                    retries: entry.retries,
                    enqueued_at_ms: entry.enqueued_at_ms,
                    processing_started_ms: now_ms,
                });
            }
        }
        None
    }

    pub fn dequeue_batch(&mut self, max: usize, now_ms: i64) -> Vec<Delivery> {
        let mut out = Vec::with_capacity(max.min(self.pending_len()));
        while out.len() < max {
            match self.dequeue(now_ms) {
                Some(delivery) => out.push(delivery),
                None => break,
            }
        }
        out
    }

    pub fn mark_completed(&mut self, lease: Lease, now_ms: i64) -> QueueResult<CompletionOutcome> {
        let entry = self
            .entries
            .get_mut(&lease.id)
            .ok_or(QueueError::UnknownMessage(lease.id))?;
        if entry.state == MessageState::Completed && entry.attempt == lease.attempt {
            return Ok(CompletionOutcome::AlreadyCompleted);
        }
        check_lease(entry, lease, MessageState::Completed)?;

        let started = entry.processing_started_ms.unwrap_or(now_ms);
        let duration_ms = now_ms.saturating_sub(started).max(0);
        entry.state = MessageState::Completed;
        entry.processing_completed_ms = Some(now_ms);
        self.live_by_priority[entry.priority.index()] -= 1;
        self.stats.processed += 1;
        self.stats.record_latency(duration_ms);
        Ok(CompletionOutcome::Completed { duration_ms })
    }

    /// Requeues at the tail of the same lane while retries remain, otherwise
    /// the message becomes FAILED.
    pub fn mark_failed(
        &mut self,
        lease: Lease,
        error: &str,
        now_ms: i64,
    ) -> QueueResult<FailureOutcome> {
        let entry = self
            .entries
            .get_mut(&lease.id)
            .ok_or(QueueError::UnknownMessage(lease.id))?;
        check_lease(entry, lease, MessageState::Failed)?;
        entry.last_error = Some(error.to_string());

        if entry.retries < self.config.max_retries {
            // RETRYING only exists inside this call; the requeue below
            // returns the entry to PENDING before the lock is released.
            entry.state = MessageState::Retrying;
            entry.retries += 1;
            entry.processing_started_ms = None;
            entry.state = MessageState::Pending;
            self.lanes[entry.priority.index()].push_back(entry.id);
            self.stats.retried += 1;
            debug!(
                message_id = %entry.id,
                retries = entry.retries,
                error,
                "message requeued for retry"
            );
            return Ok(FailureOutcome::Requeued {
                retries: entry.retries,
            });
        }

        entry.state = MessageState::Failed;
        entry.processing_completed_ms = Some(now_ms);
        self.live_by_priority[entry.priority.index()] -= 1;
        self.stats.failed += 1;
        Ok(FailureOutcome::Failed {
            attempts: entry.attempt,
            error: error.to_string(),
        })
    }

    /// Force-fails PROCESSING messages whose attempt outlived the timeout.
    pub fn sweep_stuck(&mut self, now_ms: i64) -> Vec<StuckRecovery> {
        let timeout = self.config.processing_timeout_ms;
        let mut stuck: Vec<(Lease, Priority, String)> = self
            .entries
            .values()
            .filter(|entry| entry.state == MessageState::Processing)
            .filter(|entry| {
                entry
                    .processing_started_ms
                    .is_some_and(|started| now_ms.saturating_sub(started) > timeout)
            })
            .map(|entry| {
                (
                    entry.lease(),
                    entry.priority,
                    entry.message.sender().to_string(),
                )
            })
            .collect();
        stuck.sort_by_key(|(lease, _, _)| lease.id);

        let mut recovered = Vec::with_capacity(stuck.len());
        for (lease, priority, sender_id) in stuck {
            match self.mark_failed(lease, PROCESSING_TIMEOUT_REASON, now_ms) {
                Ok(outcome) => {
                    warn!(
                        message_id = %lease.id,
                        sender = %sender_id,
                        terminal = outcome.is_terminal(),
                        "stuck message force-failed"
                    );
                    recovered.push(StuckRecovery {
                        id: lease.id,
                        priority,
                        sender_id,
                        outcome,
                    });
                }
                Err(err) => warn!(message_id = %lease.id, error = %err, "stuck sweep skipped message"),
            }
        }
        recovered
    }

    /// Drops terminal entries older than the retention window.
    pub fn purge_expired(&mut self, now_ms: i64) -> usize {
        let cutoff = now_ms.saturating_sub(self.config.retention_ms);
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            !(entry.state.is_terminal()
                && entry
                    .processing_completed_ms
                    .is_some_and(|done| done < cutoff))
        });
        before - self.entries.len()
    }

    pub fn health(&self) -> QueueHealth {
        let mut warnings = Vec::new();
        let capacity = self.config.capacity_per_priority;
        for priority in PRIORITIES {
            let depth = self.live_by_priority[priority.index()];
            if capacity > 0 && depth as f64 > capacity as f64 * self.config.near_capacity_ratio {
                warnings.push(HealthWarning::NearCapacity {
                    priority,
                    depth,
                    capacity,
                });
            }
        }

        if let Some(average_ms) = self.stats.average_latency_ms() {
            let timeout_ms = self.config.processing_timeout_ms;
            if average_ms > timeout_ms as f64 * self.config.high_latency_ratio {
                warnings.push(HealthWarning::HighLatency {
                    average_ms,
                    timeout_ms,
                });
            }
        }

        if let Some(rate) = self.stats.failure_rate() {
            if rate > self.config.failure_rate_threshold {
                warnings.push(HealthWarning::HighFailureRate { rate });
            }
        }

        QueueHealth { warnings }
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let mut states = StateCounts::default();
        for entry in self.entries.values() {
            match entry.state {
                MessageState::Pending => states.pending += 1,
                MessageState::Processing => states.processing += 1,
                MessageState::Retrying => states.retrying += 1,
                MessageState::Completed => states.completed += 1,
                MessageState::Failed => states.failed += 1,
            }
        }
        let pending = [0, 1, 2, 3].map(|idx| self.lanes[idx].len());
        QueueSnapshot::build(&self.stats, states, pending, self.live_by_priority)
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    pub fn state(&self, id: MessageId) -> Option<MessageState> {
        self.entries.get(&id).map(|entry| entry.state)
    }

    pub fn get(&self, id: MessageId) -> Option<&QueueMessage> {
        self.entries.get(&id)
    }

    pub fn pending_len(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum()
    }

    pub fn live_len(&self, priority: Priority) -> usize {
        self.live_by_priority[priority.index()]
    }

    pub fn tracked_len(&self) -> usize {
        self.entries.len()
    }
}

fn check_lease(entry: &QueueMessage, lease: Lease, to: MessageState) -> QueueResult<()> {
    if entry.attempt != lease.attempt {
        return Err(QueueError::StaleLease {
            id: lease.id,
            held: lease.attempt,
            current: entry.attempt,
        });
    }
    if entry.state != MessageState::Processing {
        return Err(QueueError::InvalidTransition {
            id: lease.id,
            from: entry.state,
            to,
        });
    }
    Ok(())
}
