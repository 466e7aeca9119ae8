use std::fmt;

use protocol::Priority;

use crate::types::{MessageId, MessageState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    Full { priority: Priority, capacity: usize },
    UnknownMessage(MessageId),
    StaleLease {
        id: MessageId,
        held: u32,
        current: u32,
    },
    InvalidTransition {
        id: MessageId,
        from: MessageState,
        to: MessageState,
    },
    LockPoisoned,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full { priority, capacity } => {
                write!(f, "{} queue is at capacity ({})", priority, capacity)
            }
            Self::UnknownMessage(id) => write!(f, "message {} is not tracked", id),
            Self::StaleLease { id, held, current } => write!(
                f,
                "lease on {} attempt {} superseded by attempt {}",
                id, held, current
            ),
            Self::InvalidTransition { id, from, to } => {
                write!(f, "message {} cannot move from {} to {}", id, from, to)
            }
            Self::LockPoisoned => write!(f, "queue lock poisoned"),
        }
    }
}

impl std::error::Error for QueueError {}

pub type QueueResult<T> = std::result::Result<T, QueueError>;
