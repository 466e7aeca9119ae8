mod config;
mod errors;
mod health;
mod queue;
mod shared;
mod stats;
mod types;

pub use config::QueueConfig;
pub use errors::{QueueError, QueueResult};
pub use health::{HealthWarning, QueueHealth};
pub use queue::{PriorityQueue, PROCESSING_TIMEOUT_REASON};
pub use shared::SharedQueue;
pub use stats::{PriorityDepth, QueueSnapshot, QueueStats, StateCounts};
pub use types::{
    CompletionOutcome, Delivery, FailureOutcome, Lease, MessageId, MessageState, QueueMessage,
    StuckRecovery,
};
