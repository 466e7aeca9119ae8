use std::fmt;
use std::sync::Arc;

use protocol::{Message, Priority};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q-{}", self.0)
    }
}

/// Proof that the holder owns the current processing attempt of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Lease {
    pub id: MessageId,
    pub attempt: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageState {
    Pending,
    Processing,
    Retrying,
    Completed,
    Failed,
}

impl MessageState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Retrying => "RETRYING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for MessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle record owned by the queue.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub id: MessageId,
    pub message: Arc<Message>,
    pub priority: Priority,
    pub enqueued_at_ms: i64,
    pub retries: u32,
    pub attempt: u32,
    pub processing_started_ms: Option<i64>,
    pub processing_completed_ms: Option<i64>,
    pub last_error: Option<String>,
    pub state: MessageState,
}

impl QueueMessage {
    pub(crate) fn new(id: MessageId, message: Arc<Message>, priority: Priority, now_ms: i64) -> Self {
        Self {
            id,
            message,
            priority,
            enqueued_at_ms: now_ms,
            retries: 0,
            attempt: 0,
            processing_started_ms: None,
            processing_completed_ms: None,
            last_error: None,
            state: MessageState::Pending,
        }
    }

    pub fn lease(&self) -> Lease {
        Lease {
            id: self.id,
            attempt: self.attempt,
        }
    }
}

/// A message handed to a worker by `dequeue`.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub lease: Lease,
    pub message: Arc<Message>,
    pub priority: Priority,
    pub retries: u32,
    pub enqueued_at_ms: i64,
    pub processing_started_ms: i64,
}

impl Delivery {
    pub fn id(&self) -> MessageId {
        self.lease.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    Completed { duration_ms: i64 },
    AlreadyCompleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back at the tail of its class; `retries` counts requeues so far.
    Requeued { retries: u32 },
    /// Terminal. `attempts` counts every delivery, including the last.
    Failed { attempts: u32, error: String },
}

impl FailureOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StuckRecovery {
    pub id: MessageId,
    pub priority: Priority,
    pub sender_id: String,
    pub outcome: FailureOutcome,
}
