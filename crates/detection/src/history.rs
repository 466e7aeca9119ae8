use std::sync::Arc;

use protocol::Message;

use crate::features::{self, FeatureVector};
use crate::window::SlidingWindow;

/// One admitted message as seen by the sender's history.
#[derive(Debug, Clone)]
pub struct Observation {
    pub message: Arc<Message>,
    pub received_ms: i64,
    pub content_digest: [u8; 32],
    /// Detector score, filled in once the first stage has run.
    pub detection_score: Option<f64>,
}

impl Observation {
    pub fn new(message: Arc<Message>, received_ms: i64) -> Self {
        let content_digest = message.content_digest();
        Self {
            message,
            received_ms,
            content_digest,
            detection_score: None,
        }
    }
}

/// Bounded per-sender window of recent observations, in arrival order.
#[derive(Debug, Clone)]
pub struct NodeHistory {
    window: SlidingWindow<Observation>,
}

impl NodeHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: SlidingWindow::new(capacity),
        }
    }

    /// Appends `observation`. A redelivery of a message already in the window
    /// replaces that entry instead of counting it twice.
    pub fn record(&mut self, observation: Observation) {
        if let Some(existing) = self
            .window
            .iter_mut()
            .rev()
            .find(|obs| Arc::ptr_eq(&obs.message, &observation.message))
        {
            *existing = observation;
            return;
        }
        self.window.push(observation);
    }

    /// Stores the detector score against the entry for `message`.
    pub fn annotate(&mut self, message: &Arc<Message>, detection_score: f64) -> bool {
        match self
            .window
            .iter_mut()
            .rev()
            .find(|obs| Arc::ptr_eq(&obs.message, message))
        {
            Some(obs) => {
                obs.detection_score = Some(detection_score);
                true
            }
            None => false,
        }
    }

    pub fn features(&self) -> FeatureVector {
        let observations: Vec<&Observation> = self.window.iter().collect();
        features::extract(&observations, self.window.capacity())
    }

    pub fn observations(&self) -> impl DoubleEndedIterator<Item = &Observation> {
        self.window.iter()
    }

    pub fn messages(&self) -> Vec<Arc<Message>> {
        self.window.iter().map(|obs| Arc::clone(&obs.message)).collect()
    }

    pub fn latest(&self) -> Option<&Observation> {
        self.window.latest()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.window.capacity()
    }
}
