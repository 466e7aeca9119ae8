use std::collections::HashMap;

use detection::Verdict;
use message_queue::MessageId;
use protocol::Priority;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::errors::{ProcessingError, Rejection};

/// Final result of escalation for one accepted message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessingOutcome {
    Completed(Verdict),
    Failed { error: ProcessingError, attempts: u32 },
}

impl ProcessingOutcome {
    pub fn verdict(&self) -> Option<&Verdict> {
        match self {
            Self::Completed(verdict) => Some(verdict),
            Self::Failed { .. } => None,
        }
    }
}

/// Synchronous answer to a submission.
#[derive(Debug)]
pub enum Submission {
    Accepted {
        id: MessageId,
        priority: Priority,
        verdict: VerdictHandle,
    },
    Rejected(Rejection),
}

impl Submission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn id(&self) -> Option<MessageId> {
        match self {
            Self::Accepted { id, .. } => Some(*id),
            Self::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Accepted { .. } => None,
            Self::Rejected(rejection) => Some(rejection),
        }
    }
}

/// Resolves once the message reaches COMPLETED or FAILED.
#[derive(Debug)]
pub struct VerdictHandle {
    id: MessageId,
    rx: oneshot::Receiver<ProcessingOutcome>,
}

impl VerdictHandle {
    pub(crate) fn new(id: MessageId, rx: oneshot::Receiver<ProcessingOutcome>) -> Self {
        Self { id, rx }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    /// `None` when the pipeline went away before the message finished.
    pub async fn outcome(self) -> Option<ProcessingOutcome> {
        self.rx.await.ok()
    }

    pub fn try_outcome(&mut self) -> Option<ProcessingOutcome> {
        self.rx.try_recv().ok()
    }
}

/// Verdict channels by message id. An outcome that arrives before its
/// submitter registered is parked until registration.
#[derive(Debug, Default)]
pub(crate) struct Waiters {
    waiting: HashMap<MessageId, oneshot::Sender<ProcessingOutcome>>,
    early: HashMap<MessageId, ProcessingOutcome>,
}

impl Waiters {
    pub(crate) fn register(&mut self, id: MessageId) -> oneshot::Receiver<ProcessingOutcome> {
        let (tx, rx) = oneshot::channel();
        match self.early.remove(&id) {
            Some(outcome) => {
                let _ = tx.send(outcome);
            }
            None => {
                self.waiting.insert(id, tx);
            }
        }
        rx
    }

    pub(crate) fn resolve(&mut self, id: MessageId, outcome: ProcessingOutcome) {
        match self.waiting.remove(&id) {
            Some(tx) => {
                // The submitter may have dropped its handle.
                let _ = tx.send(outcome);
            }
            None => {
                self.early.insert(id, outcome);
            }
        }
    }

    /// Drops parked outcomes nobody will claim.
    pub(crate) fn retain_early(&mut self, mut keep: impl FnMut(MessageId) -> bool) -> usize {
        let before = self.early.len();
        self.early.retain(|id, _| keep(*id));
        before - self.early.len()
    }

    pub(crate) fn pending(&self) -> usize {
        self.waiting.len()
    }
}
