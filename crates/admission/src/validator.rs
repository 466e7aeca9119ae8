use std::collections::{HashMap, VecDeque};

use protocol::Message;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constraints;
use crate::errors::{ValidationCode, ValidationError, Violation};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    pub max_message_age_ms: i64,
    pub clock_skew_tolerance_ms: i64,
    pub duplicate_window_ms: i64,
    pub duplicate_retention_ms: i64,
    pub max_tracked_ids: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_message_age_ms: 5_000,
            clock_skew_tolerance_ms: 0,
            duplicate_window_ms: 1_000,
            duplicate_retention_ms: 10_000,
            max_tracked_ids: 100_000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SequenceMark {
    value: f64,
    accepted_at_ms: i64,
}

/// Stateless structural checks plus the bounded duplicate and sequence caches.
#[derive(Debug)]
pub struct MessageValidator {
    config: ValidatorConfig,
    seen_ids: HashMap<String, i64>,
    seen_order: VecDeque<(String, i64)>,
    last_sequence: HashMap<String, SequenceMark>,
}

impl MessageValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            seen_ids: HashMap::new(),
            seen_order: VecDeque::new(),
            last_sequence: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Runs every check without touching the caches.
    pub fn check(&self, message: &Message, now_ms: i64) -> Result<(), ValidationError> {
        let mut violations = Vec::new();
        self.check_timing(message, now_ms, &mut violations);
        check_structure(message, &mut violations);
        self.check_duplicate(message, now_ms, &mut violations);
        self.check_sequence(message, &mut violations);
        constraints::check(message, now_ms, &mut violations);

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { violations })
        }
    }

    /// Records the id and sequence number of a message that was admitted.
    /// Call only after [`check`](Self::check) passed and the message was
    /// accepted downstream.
    pub fn commit(&mut self, message: &Message, now_ms: i64) {
        self.remember_id(message.id(), now_ms);
        if let Some(value) = sequence_number(message) {
            self.last_sequence.insert(
                message.sender().to_string(),
                SequenceMark {
                    value,
                    accepted_at_ms: now_ms,
                },
            );
        }
    }

    /// `check` followed by `commit` when it passes.
    pub fn validate(&mut self, message: &Message, now_ms: i64) -> Result<(), ValidationError> {
        self.check(message, now_ms)?;
        self.commit(message, now_ms);
        Ok(())
    }

    fn check_timing(&self, message: &Message, now_ms: i64, out: &mut Vec<Violation>) {
        let timestamp = message.metadata.timestamp_ms;
        let age = now_ms.saturating_sub(timestamp);
        if age > self.config.max_message_age_ms {
            out.push(Violation::new(
                ValidationCode::Stale,
                format!(
                    "message age {age}ms exceeds {}ms",
                    self.config.max_message_age_ms
                ),
            ));
        }
        if timestamp > now_ms.saturating_add(self.config.clock_skew_tolerance_ms) {
            out.push(Violation::new(
                ValidationCode::FutureTimestamp,
                format!("timestamp {timestamp} is ahead of local clock {now_ms}"),
            ));
        }
    }

    fn check_duplicate(&self, message: &Message, now_ms: i64, out: &mut Vec<Violation>) {
        let Some(&seen_at) = self.seen_ids.get(message.id()) else {
            return;
        };
        if now_ms.saturating_sub(seen_at) < self.config.duplicate_window_ms {
            out.push(Violation::new(
                ValidationCode::Duplicate,
                format!("message {} already accepted at {seen_at}", message.id()),
            ));
        }
    }

    fn check_sequence(&self, message: &Message, out: &mut Vec<Violation>) {
        let Some(raw) = message.content.get("sequence_number") else {
            return;
        };
        let Some(value) = raw.as_f64() else {
            out.push(Violation::invalid(format!(
                "sequence_number {raw} must be a number"
            )));
            return;
        };
        if let Some(last) = self.last_sequence.get(message.sender()) {
            if value <= last.value {
                out.push(Violation::new(
                    ValidationCode::OutOfSequence,
                    format!(
                        "sequence_number {value} not after {} from {}",
                        last.value,
                        message.sender()
                    ),
                ));
            }
        }
    }

    fn remember_id(&mut self, id: &str, now_ms: i64) {
        self.seen_ids.insert(id.to_string(), now_ms);
        self.seen_order.push_back((id.to_string(), now_ms));
        while self.seen_ids.len() > self.config.max_tracked_ids {
            if !self.pop_oldest_id() {
                break;
            }
        }
    }

    fn pop_oldest_id(&mut self) -> bool {
        let Some((id, at)) = self.seen_order.pop_front() else {
            return false;
        };
        // A re-accepted id leaves an older order entry behind; only the
        // entry matching the live timestamp owns the map slot.
        if self.seen_ids.get(&id) == Some(&at) {
            self.seen_ids.remove(&id);
        }
        true
    }

    /// Drops duplicate and sequence entries older than the retention window.
    pub fn sweep(&mut self, now_ms: i64) -> usize {
        let cutoff = now_ms.saturating_sub(self.config.duplicate_retention_ms);
        let before = self.seen_ids.len() + self.last_sequence.len();
        while let Some((_, at)) = self.seen_order.front() {
            if *at >= cutoff {
                break;
            }
            self.pop_oldest_id();
        }
        self.last_sequence
            .retain(|_, mark| mark.accepted_at_ms >= cutoff);
        let removed = before - (self.seen_ids.len() + self.last_sequence.len());
        if removed > 0 {
            debug!(removed, tracked_ids = self.seen_ids.len(), "validator caches swept");
        }
        removed
    }

    pub fn tracked_ids(&self) -> usize {
        self.seen_ids.len()
    }

    pub fn tracked_senders(&self) -> usize {
        self.last_sequence.len()
    }
}

fn check_structure(message: &Message, out: &mut Vec<Violation>) {
    let missing: Vec<&str> = message
        .message_type()
        .required_fields()
        .iter()
        .copied()
        .filter(|field| !message.content.contains_key(*field))
        .collect();
    if !missing.is_empty() {
        out.push(Violation::new(
            ValidationCode::MissingFields,
            format!("missing required fields: {}", missing.join(", ")),
        ));
    }
}

fn sequence_number(message: &Message) -> Option<f64> {
    message.content.get("sequence_number")?.as_f64()
}
