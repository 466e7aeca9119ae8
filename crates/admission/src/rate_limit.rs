use std::collections::{HashMap, VecDeque};

/// Sliding-window counter: at most `max_events` accepted per `window_ms`.
#[derive(Debug, Clone)]
pub struct RateWindow {
    max_events: usize,
    window_ms: i64,
    timestamps: VecDeque<i64>,
}

impl RateWindow {
    pub fn new(max_events: usize, window_ms: i64) -> Self {
        Self {
            max_events,
            window_ms,
            timestamps: VecDeque::new(),
        }
    }

    pub fn allow(&mut self, now_ms: i64) -> bool {
        self.expire(now_ms);
        if self.timestamps.len() >= self.max_events {
            return false;
        }

        self.timestamps.push_back(now_ms);
        true
    }

    fn expire(&mut self, now_ms: i64) {
        while let Some(ts) = self.timestamps.front() {
            if now_ms.saturating_sub(*ts) >= self.window_ms {
                let _ = self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Per-sender admission ceiling.
#[derive(Debug)]
pub struct SenderRateLimiter {
    max_messages: usize,
    window_ms: i64,
    senders: HashMap<String, RateWindow>,
}

impl SenderRateLimiter {
    pub fn new(max_messages: usize, window_ms: i64) -> Self {
        Self {
            max_messages,
            window_ms,
            senders: HashMap::new(),
        }
    }

    pub fn allow(&mut self, sender_id: &str, now_ms: i64) -> bool {
        if let Some(window) = self.senders.get_mut(sender_id) {
            return window.allow(now_ms);
        }
        let mut window = RateWindow::new(self.max_messages, self.window_ms);
        let allowed = window.allow(now_ms);
        self.senders.insert(sender_id.to_string(), window);
        allowed
    }

    /// Forgets senders with no admissions inside the current window.
    pub fn sweep(&mut self, now_ms: i64) -> usize {
        let before = self.senders.len();
        self.senders.retain(|_, window| {
            window.expire(now_ms);
            !window.is_empty()
        });
        before - self.senders.len()
    }

    pub fn tracked_senders(&self) -> usize {
        self.senders.len()
    }
}
