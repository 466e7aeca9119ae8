use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::types::MessageType;

/// Message body as received from the sender.
pub type Content = Map<String, Value>;

fn default_priority_hint() -> u8 {
    3
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub message_id: String,
    pub sender_id: String,
    pub message_type: MessageType,
    /// Sender-side creation time, unix milliseconds.
    pub timestamp_ms: i64,
    /// 1 (most urgent) to 5 (least urgent), as claimed by the sender.
    #[serde(default = "default_priority_hint")]
    pub priority_hint: u8,
    #[serde(default)]
    pub hop_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_hop: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(flatten)]
    pub metadata: MessageMetadata,
    #[serde(default)]
    pub content: Content,
}

impl Message {
    pub fn new(metadata: MessageMetadata, content: Content) -> Self {
        Self { metadata, content }
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn id(&self) -> &str {
        &self.metadata.message_id
    }

    pub fn sender(&self) -> &str {
        &self.metadata.sender_id
    }

    pub fn message_type(&self) -> MessageType {
        self.metadata.message_type
    }

    pub fn field(&self, path: &str) -> Option<&Value> {
        content_path(&self.content, path)
    }

    pub fn number(&self, path: &str) -> Option<f64> {
        self.field(path).and_then(Value::as_f64)
    }

    pub fn text(&self, path: &str) -> Option<&str> {
        self.field(path).and_then(Value::as_str)
    }

    /// Deterministic encoding of the content: object keys sorted at every
    /// depth, no insignificant whitespace.
    pub fn canonical_content(&self) -> String {
        let mut out = String::new();
        write_canonical(&Value::Object(self.content.clone()), &mut out);
        out
    }

    pub fn content_digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_content().as_bytes());
        hasher.finalize().into()
    }

    pub fn content_digest_hex(&self) -> String {
        self.content_digest()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

/// Resolves a dotted path (`health.battery_level`) inside message content.
pub fn content_path<'a>(content: &'a Content, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = content.get(first)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(inner) = map.get(key) {
                    write_canonical(inner, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
