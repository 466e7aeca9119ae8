use std::collections::VecDeque;

use protocol::{Priority, PRIORITIES};
use serde::{Deserialize, Serialize};

/// Counters updated on every lifecycle transition.
#[derive(Debug, Clone)]
pub struct QueueStats {
    pub received: u64,
    pub processed: u64,
    pub failed: u64,
    pub retried: u64,
    pub received_by_priority: [u64; 4],
    latencies_ms: VecDeque<i64>,
    latency_cap: usize,
}

impl QueueStats {
    pub fn new(latency_cap: usize) -> Self {
        Self {
            received: 0,
            processed: 0,
            failed: 0,
            retried: 0,
            received_by_priority: [0; 4],
            latencies_ms: VecDeque::with_capacity(latency_cap.min(1_024)),
            latency_cap: latency_cap.max(1),
        }
    }

    pub(crate) fn record_received(&mut self, priority: Priority) {
        self.received += 1;
        self.received_by_priority[priority.index()] += 1;
    }

    pub(crate) fn record_latency(&mut self, duration_ms: i64) {
        while self.latencies_ms.len() >= self.latency_cap {
            let _ = self.latencies_ms.pop_front();
        }
        self.latencies_ms.push_back(duration_ms.max(0));
    }

    pub fn in_flight(&self) -> u64 {
        self.received - self.processed - self.failed
    }

    pub fn average_latency_ms(&self) -> Option<f64> {
        if self.latencies_ms.is_empty() {
            return None;
        }
        let total: i64 = self.latencies_ms.iter().sum();
        Some(total as f64 / self.latencies_ms.len() as f64)
    }

    pub fn latency_samples(&self) -> usize {
        self.latencies_ms.len()
    }

    /// Failed share of terminal outcomes, `None` before the first one.
    pub fn failure_rate(&self) -> Option<f64> {
        let terminal = self.processed + self.failed;
        if terminal == 0 {
            return None;
        }
        Some(self.failed as f64 / terminal as f64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub pending: usize,
    pub processing: usize,
    pub retrying: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityDepth {
    pub priority: Priority,
    pub pending: usize,
    pub in_flight: usize,
    pub received: u64,
}

/// Point-in-time view for status endpoints and periodic metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub received: u64,
    pub processed: u64,
    pub failed: u64,
    pub retried: u64,
    pub in_flight: u64,
    pub average_latency_ms: Option<f64>,
    pub latency_samples: usize,
    pub states: StateCounts,
    pub priorities: Vec<PriorityDepth>,
}

impl QueueSnapshot {
    pub fn depth(&self, priority: Priority) -> usize {
        self.priorities
            .iter()
            .find(|p| p.priority == priority)
            .map(|p| p.pending)
            .unwrap_or(0)
    }

    pub fn total_pending(&self) -> usize {
        self.priorities.iter().map(|p| p.pending).sum()
    }

    pub(crate) fn build(
        stats: &QueueStats,
        states: StateCounts,
        pending: [usize; 4],
        live: [usize; 4],
    ) -> Self {
        let priorities = PRIORITIES
            .iter()
            .map(|priority| {
                let idx = priority.index();
                PriorityDepth {
                    priority: *priority,
                    pending: pending[idx],
                    in_flight: live[idx].saturating_sub(pending[idx]),
                    received: stats.received_by_priority[idx],
                }
            })
            .collect();
        Self {
            received: stats.received,
            processed: stats.processed,
            failed: stats.failed,
            retried: stats.retried,
            in_flight: stats.in_flight(),
            average_latency_ms: stats.average_latency_ms(),
            latency_samples: stats.latency_samples(),
            states,
            priorities,
        }
    }
}
