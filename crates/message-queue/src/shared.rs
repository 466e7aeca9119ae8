use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use protocol::{Clock, Message, Priority, PRIORITIES};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::errors::{QueueError, QueueResult};
use crate::health::QueueHealth;
use crate::queue::PriorityQueue;
use crate::stats::QueueSnapshot;
use crate::types::{
    CompletionOutcome, Delivery, FailureOutcome, Lease, MessageId, MessageState, StuckRecovery,
};

/// Thread-safe queue handle. The inner lock is never held across an await.
#[derive(Debug)]
pub struct SharedQueue {
    inner: Mutex<PriorityQueue>,
    clock: Arc<dyn Clock>,
    available: Notify,
    /// One per priority class, so a freed slot only wakes producers that
    /// can use it.
    space: [Notify; PRIORITIES.len()],
}

impl SharedQueue {
    pub fn new(queue: PriorityQueue, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(queue),
            clock,
            available: Notify::new(),
            space: std::array::from_fn(|_| Notify::new()),
        }
    }

    fn lock(&self) -> QueueResult<MutexGuard<'_, PriorityQueue>> {
        self.inner.lock().map_err(|_| QueueError::LockPoisoned)
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn enqueue(&self, message: Arc<Message>, priority: Priority) -> QueueResult<MessageId> {
        let now = self.now_ms();
        let id = self.lock()?.enqueue(message, priority, now)?;
        self.available.notify_one();
        Ok(id)
    }

    /// Waits for room in the class up to `timeout`, then gives up with `Full`.
    pub async fn enqueue_timeout(
        &self,
        message: Arc<Message>,
        priority: Priority,
        timeout: Duration,
    ) -> QueueResult<MessageId> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.enqueue(Arc::clone(&message), priority) {
                Err(QueueError::Full { .. }) => {
                    if !self.wait_for_space(priority, deadline).await {
                        return self.enqueue(message, priority);
                    }
                }
                other => return other,
            }
        }
    }

    /// Suspends until a slot in `priority` is freed or `deadline` passes.
    /// Returns `false` on timeout. A freed slot is not reserved; callers
    /// retry their enqueue.
    pub async fn wait_for_space(&self, priority: Priority, deadline: Instant) -> bool {
        tokio::time::timeout_at(deadline, self.space[priority.index()].notified())
            .await
            .is_ok()
    }

    pub fn dequeue(&self) -> QueueResult<Option<Delivery>> {
        let now = self.now_ms();
        Ok(self.lock()?.dequeue(now))
    }

    /// Suspends while every class is empty; `None` once `timeout` elapses.
    pub async fn dequeue_timeout(&self, timeout: Duration) -> QueueResult<Option<Delivery>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(delivery) = self.dequeue()? {
                return Ok(Some(delivery));
            }
            if tokio::time::timeout_at(deadline, self.available.notified())
                .await
                .is_err()
            {
                return self.dequeue();
            }
        }
    }

    pub fn dequeue_batch(&self, max: usize) -> QueueResult<Vec<Delivery>> {
        let now = self.now_ms();
        Ok(self.lock()?.dequeue_batch(max, now))
    }

    pub fn mark_completed(&self, lease: Lease) -> QueueResult<CompletionOutcome> {
        let now = self.now_ms();
        let (priority, outcome) = {
            let mut queue = self.lock()?;
            let priority = queue.get(lease.id).map(|entry| entry.priority);
            (priority, queue.mark_completed(lease, now)?)
        };
        if let (Some(priority), CompletionOutcome::Completed { .. }) = (priority, outcome) {
            self.space[priority.index()].notify_one();
        }
        Ok(outcome)
    }

    pub fn mark_failed(&self, lease: Lease, error: &str) -> QueueResult<FailureOutcome> {
        let now = self.now_ms();
        let (priority, outcome) = {
            let mut queue = self.lock()?;
            let priority = queue.get(lease.id).map(|entry| entry.priority);
            (priority, queue.mark_failed(lease, error, now)?)
        };
        if let Some(priority) = priority {
            self.wake_for(priority, &outcome);
        }
        Ok(outcome)
    }

    pub fn sweep_stuck(&self) -> QueueResult<Vec<StuckRecovery>> {
        let now = self.now_ms();
        let recovered = self.lock()?.sweep_stuck(now);
        for recovery in &recovered {
            self.wake_for(recovery.priority, &recovery.outcome);
        }
        Ok(recovered)
    }

    pub fn purge_expired(&self) -> QueueResult<usize> {
        let now = self.now_ms();
        Ok(self.lock()?.purge_expired(now))
    }

    pub fn health(&self) -> QueueResult<QueueHealth> {
        Ok(self.lock()?.health())
    }

    pub fn snapshot(&self) -> QueueResult<QueueSnapshot> {
        Ok(self.lock()?.snapshot())
    }

    pub fn state(&self, id: MessageId) -> QueueResult<Option<MessageState>> {
        Ok(self.lock()?.state(id))
    }

    fn wake_for(&self, priority: Priority, outcome: &FailureOutcome) {
        match outcome {
            FailureOutcome::Requeued { .. } => self.available.notify_one(),
            FailureOutcome::Failed { .. } => self.space[priority.index()].notify_one(),
        }
    }
}
