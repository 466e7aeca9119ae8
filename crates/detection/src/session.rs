use std::sync::Arc;

use protocol::Message;

use crate::window::SlidingWindow;

/// Message sequence fed to the deepest scoring stage for one sender.
#[derive(Debug, Clone)]
pub struct Session {
    messages: SlidingWindow<Arc<Message>>,
    started_ms: i64,
    last_update_ms: i64,
}

impl Session {
    /// Opens a session seeded with the sender's recent history.
    pub fn seeded<I>(max_sequence_length: usize, seed: I, now_ms: i64) -> Self
    where
        I: IntoIterator<Item = Arc<Message>>,
    {
        let mut messages = SlidingWindow::new(max_sequence_length);
        for message in seed {
            messages.push(message);
        }
        Self {
            messages,
            started_ms: now_ms,
            last_update_ms: now_ms,
        }
    }

    /// Appends `message` unless it is already the newest entry.
    pub fn append(&mut self, message: Arc<Message>, now_ms: i64) {
        let already_latest = self
            .messages
            .latest()
            .is_some_and(|latest| Arc::ptr_eq(latest, &message));
        if !already_latest {
            self.messages.push(message);
        }
        self.last_update_ms = self.last_update_ms.max(now_ms);
    }

    pub fn messages(&self) -> Vec<Arc<Message>> {
        self.messages.to_vec()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn started_ms(&self) -> i64 {
        self.started_ms
    }

    pub fn last_update_ms(&self) -> i64 {
        self.last_update_ms
    }

    pub fn is_idle(&self, now_ms: i64, ttl_ms: i64) -> bool {
        now_ms.saturating_sub(self.last_update_ms) >= ttl_ms
    }
}
