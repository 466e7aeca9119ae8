use std::sync::Arc;

use protocol::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::features::FeatureVector;
use crate::history::Observation;

/// Output of one scoring stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleScore {
    /// Confidence in [0, 1].
    pub score: f64,
    /// The oracle's own verdict at its decision threshold.
    pub positive: bool,
    /// Threat classification, when the oracle offers one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl OracleScore {
    pub fn new(score: f64, positive: bool) -> Self {
        Self {
            score,
            positive,
            label: None,
            metadata: Map::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleError {
    pub oracle: String,
    pub message: String,
}

impl OracleError {
    pub fn new(oracle: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            oracle: oracle.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for OracleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "oracle {} failed: {}", self.oracle, self.message)
    }
}

impl std::error::Error for OracleError {}

/// A swappable scoring stage. Implementations must be bounded in duration;
/// the pipeline runs them on the blocking pool under a timeout.
pub trait ScoringOracle<Input>: Send + Sync {
    fn name(&self) -> &str;
    fn score(&self, input: &Input) -> Result<OracleScore, OracleError>;
}

/// Input of the second stage: the sender's window plus the first stage result.
#[derive(Debug, Clone)]
pub struct AnalysisInput {
    pub message: Arc<Message>,
    pub features: FeatureVector,
    pub window: Vec<Observation>,
    pub detection: OracleScore,
}

/// Input of the deepest stage: the sender's session.
#[derive(Debug, Clone)]
pub struct SequenceInput {
    pub sender_id: String,
    pub messages: Vec<Arc<Message>>,
    pub session_started_ms: i64,
    pub detection_score: f64,
    pub anomaly_score: f64,
}
