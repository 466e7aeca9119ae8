use message_queue::{QueueHealth, QueueSnapshot};
use serde::Serialize;

/// Point-in-time view of the pipeline for health and metrics surfaces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub queue: QueueSnapshot,
    pub health: QueueHealth,
    pub tracked_senders: usize,
    pub open_sessions: usize,
    pub tracked_message_ids: usize,
    pub rate_tracked_senders: usize,
    pub pending_verdicts: usize,
}

/// Work done by one maintenance sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub recovered: usize,
    pub failed_permanently: usize,
    pub purged: usize,
    pub sessions_closed: usize,
    pub message_ids_evicted: usize,
    pub rate_windows_evicted: usize,
}

impl SweepReport {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}
