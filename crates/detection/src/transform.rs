use protocol::{MESSAGE_TYPES, MESSAGE_TYPE_COUNT};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::features::{message_features, MESSAGE_FEATURES};
use crate::math::{clip01, mean, std_dev};
use crate::oracle::{OracleError, OracleScore, ScoringOracle, SequenceInput};

pub const TRANSFORM_NAME: &str = "sequence_transform";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            Self::High
        } else if score >= 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Deepest stage: summarises a sender's session into an embedding, a
/// message-type distribution and a risk assessment.
#[derive(Debug, Clone, Default)]
pub struct SequenceTransform;

impl SequenceTransform {
    pub fn new() -> Self {
        Self
    }
}

impl ScoringOracle<SequenceInput> for SequenceTransform {
    fn name(&self) -> &str {
        TRANSFORM_NAME
    }

    fn score(&self, input: &SequenceInput) -> Result<OracleScore, OracleError> {
        if input.messages.is_empty() {
            return Err(OracleError::new(TRANSFORM_NAME, "session holds no messages"));
        }
        let rows: Vec<[f64; MESSAGE_FEATURES]> = input
            .messages
            .iter()
            .map(|message| message_features(message))
            .collect();

        let columns: Vec<Vec<f64>> = (0..MESSAGE_FEATURES)
            .map(|dim| rows.iter().map(|row| row[dim]).collect())
            .collect();
        let embedding: Vec<f64> = columns
            .iter()
            .map(|column| mean(column))
            .chain(columns.iter().map(|column| std_dev(column)))
            .collect();

        // Value columns only; column 0 is the type code.
        let volatility = mean(
            &columns[1..]
                .iter()
                .map(|column| clip01(2.0 * std_dev(column)))
                .collect::<Vec<_>>(),
        );
        let drift = mean(
            &columns[1..]
                .iter()
                .map(|column| {
                    let (early, late) = column.split_at(column.len() / 2);
                    if early.is_empty() {
                        0.0
                    } else {
                        clip01(2.0 * (mean(late) - mean(early)).abs())
                    }
                })
                .collect::<Vec<_>>(),
        );
        let score = clip01(0.5 * volatility + 0.5 * drift);
        let risk = RiskLevel::from_score(score);

        let mut counts = [0usize; MESSAGE_TYPE_COUNT];
        for message in &input.messages {
            counts[message.message_type().index()] += 1;
        }
        let distribution: Map<String, Value> = MESSAGE_TYPES
            .iter()
            .zip(counts.iter())
            .map(|(kind, count)| {
                (
                    kind.as_str().to_string(),
                    Value::from(*count as f64 / input.messages.len() as f64),
                )
            })
            .collect();

        Ok(OracleScore::new(score, risk == RiskLevel::High)
            .with_metadata("embedding", embedding)
            .with_metadata("classification", distribution)
            .with_metadata(
                "risk_assessment",
                json!({
                    "level": risk.as_str(),
                    "volatility": volatility,
                    "drift": drift,
                }),
            )
            .with_metadata("sequence_length", input.messages.len())
            .with_metadata("session_started_ms", input.session_started_ms))
    }
}
