use std::path::Path;

use protocol::{Message, MessageType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::errors::{read_material, LoadError, LoadResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum PatternMatcher {
    Equals(Value),
    Above(f64),
    Below(f64),
    Contains(String),
    Present,
}

impl PatternMatcher {
    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Equals(expected) => value == expected,
            Self::Above(limit) => value.as_f64().is_some_and(|v| v > *limit),
            Self::Below(limit) => value.as_f64().is_some_and(|v| v < *limit),
            Self::Contains(needle) => match value {
                Value::String(text) => text.contains(needle.as_str()),
                Value::Array(items) => items.iter().any(|item| item.as_str() == Some(needle)),
                _ => false,
            },
            Self::Present => true,
        }
    }
}

/// A known-bad message shape. Every populated selector must match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackPattern {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_prefix: Option<String>,
    /// Dotted content path.
    pub field: String,
    pub matcher: PatternMatcher,
}

impl AttackPattern {
    pub fn matches(&self, message: &Message) -> bool {
        if self
            .message_type
            .is_some_and(|ty| ty != message.message_type())
        {
            return false;
        }
        if let Some(prefix) = &self.sender_prefix {
            if !message.sender().starts_with(prefix.as_str()) {
                return false;
            }
        }
        message
            .field(&self.field)
            .is_some_and(|value| self.matcher.matches(value))
    }

    fn validate(&self) -> LoadResult<()> {
        if self.name.trim().is_empty() {
            return Err(LoadError::Invalid("attack pattern without a name".to_string()));
        }
        if self.field.trim().is_empty() || self.field.split('.').any(str::is_empty) {
            return Err(LoadError::Invalid(format!(
                "attack pattern {} has malformed field path '{}'",
                self.name, self.field
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<AttackPattern>,
}

impl PatternSet {
    pub fn new(patterns: Vec<AttackPattern>) -> LoadResult<Self> {
        for pattern in &patterns {
            pattern.validate()?;
        }
        Ok(Self { patterns })
    }

    /// Accepts a JSON array of patterns.
    pub fn from_json(raw: &str) -> LoadResult<Self> {
        let patterns: Vec<AttackPattern> = serde_json::from_str(raw)?;
        Self::new(patterns)
    }

    pub fn load(path: &Path) -> LoadResult<Self> {
        let set = Self::from_json(&read_material(path)?)?;
        info!(path = %path.display(), patterns = set.len(), "attack patterns loaded");
        Ok(set)
    }

    pub fn first_match(&self, message: &Message) -> Option<&AttackPattern> {
        self.patterns.iter().find(|pattern| pattern.matches(message))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
