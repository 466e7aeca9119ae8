//! First-stage detector: an interpretable linear-logit model over the
//! sender's summary features.
//!
//! ```text
//! window ─→ summary features [x₁..x₈] ─→ σ(w·x + b) ─→ detection score ∈ [0,1]
//! ```
//!
//! Weights are plain JSON so an operator can audit or replace them without a
//! rebuild; the runtime performs inference only.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::features::{
    FeatureVector, ALERT_FREQUENCY, DUPLICATE_CONTENT, HOP_COUNT, MESSAGE_RATE, POSITION_JUMP,
    SPEED_EXCESS, SUMMARY_FEATURES, SUMMARY_FEATURE_NAMES, TIMESTAMP_REGRESSIONS, VALUE_EXTREMITY,
};
use crate::math::{dot, sigmoid};
use crate::oracle::{OracleError, OracleScore, ScoringOracle};

pub const DETECTOR_NAME: &str = "linear_detector";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorModel {
    pub model_id: String,
    pub model_version: String,
    /// One weight per summary feature, in `SUMMARY_FEATURE_NAMES` order.
    pub weights: Vec<f64>,
    pub bias: f64,
    /// Score at or above which the detector reports a threat.
    pub threshold: f64,
    #[serde(default)]
    pub feature_names: Vec<String>,
}

impl DetectorModel {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.weights.len() != SUMMARY_FEATURES {
            return Err(ModelError::DimensionMismatch {
                expected: SUMMARY_FEATURES,
                got: self.weights.len(),
            });
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ModelError::InvalidThreshold(self.threshold));
        }
        for (index, &value) in self.weights.iter().enumerate() {
            if !value.is_finite() {
                return Err(ModelError::NonFiniteWeight { index, value });
            }
        }
        if !self.bias.is_finite() {
            return Err(ModelError::NonFiniteBias(self.bias));
        }
        if !self.feature_names.is_empty()
            && self
                .feature_names
                .iter()
                .map(String::as_str)
                .ne(SUMMARY_FEATURE_NAMES.iter().copied())
        {
            return Err(ModelError::FeatureOrder);
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let model: Self = serde_json::from_str(json).map_err(ModelError::ParseJson)?;
        model.validate()?;
        Ok(model)
    }

    pub fn from_file(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path).map_err(ModelError::Io)?;
        Self::from_json(&content)
    }
}

impl Default for DetectorModel {
    fn default() -> Self {
        Self {
            model_id: "roadguard-default-v1".to_string(),
            model_version: "1.0.0".to_string(),
            weights: vec![
                2.5, // speed_excess
                4.5, // position_jump
                5.0, // message_rate
                2.0, // duplicate_content_ratio
                2.5, // timestamp_regressions
                0.8, // alert_frequency
                2.0, // value_extremity
                0.6, // hop_count
            ],
            bias: -3.0,
            threshold: 0.75,
            feature_names: SUMMARY_FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug)]
pub enum ModelError {
    DimensionMismatch { expected: usize, got: usize },
    InvalidThreshold(f64),
    NonFiniteWeight { index: usize, value: f64 },
    NonFiniteBias(f64),
    FeatureOrder,
    ParseJson(serde_json::Error),
    Io(std::io::Error),
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DimensionMismatch { expected, got } => write!(
                f,
                "detector model has {got} weights, summary vector has {expected}"
            ),
            Self::InvalidThreshold(t) => {
                write!(f, "detector threshold must lie in [0, 1], got {t}")
            }
            Self::NonFiniteWeight { index, value } => {
                write!(f, "detector weight {index} is {value}")
            }
            Self::NonFiniteBias(b) => write!(f, "detector bias is {b}"),
            Self::FeatureOrder => write!(
                f,
                "feature_names must match {:?}",
                SUMMARY_FEATURE_NAMES
            ),
            Self::ParseJson(e) => write!(f, "unreadable detector model JSON: {e}"),
            Self::Io(e) => write!(f, "cannot read detector model: {e}"),
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ParseJson(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Threat family suggested by each summary feature when it dominates.
fn characteristic(feature: usize) -> &'static str {
    match feature {
        SPEED_EXCESS | POSITION_JUMP => "position_spoofing",
        MESSAGE_RATE => "message_flooding",
        DUPLICATE_CONTENT | TIMESTAMP_REGRESSIONS => "replay_attack",
        ALERT_FREQUENCY | VALUE_EXTREMITY => "data_injection",
        HOP_COUNT => "impersonation",
        _ => "unknown",
    }
}

#[derive(Debug, Clone)]
pub struct LinearDetector {
    model: DetectorModel,
}

impl LinearDetector {
    pub fn new() -> Self {
        Self {
            model: DetectorModel::default(),
        }
    }

    pub fn with_model(model: DetectorModel) -> Result<Self, ModelError> {
        model.validate()?;
        Ok(Self { model })
    }

    pub fn model(&self) -> &DetectorModel {
        &self.model
    }

    /// Per-feature contributions `wᵢ·xᵢ`, largest first, near-zero dropped.
    fn contributions(&self, features: &FeatureVector) -> Vec<(usize, f64)> {
        let mut contributions: Vec<(usize, f64)> = self
            .model
            .weights
            .iter()
            .zip(features.summary.iter())
            .map(|(w, x)| w * x)
            .enumerate()
            .filter(|(_, c)| c.abs() > 0.01)
            .collect();
        contributions.sort_by(|a, b| b.1.total_cmp(&a.1));
        contributions
    }
}

impl Default for LinearDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoringOracle<FeatureVector> for LinearDetector {
    fn name(&self) -> &str {
        DETECTOR_NAME
    }

    fn score(&self, features: &FeatureVector) -> Result<OracleScore, OracleError> {
        let z = dot(&self.model.weights, &features.summary) + self.model.bias;
        let score = sigmoid(z);
        if !score.is_finite() {
            return Err(OracleError::new(DETECTOR_NAME, "non-finite score"));
        }
        let positive = score >= self.model.threshold;

        let contributions = self.contributions(features);
        let top: Vec<Value> = contributions
            .iter()
            .take(5)
            .map(|(idx, c)| serde_json::json!({ "feature": SUMMARY_FEATURE_NAMES[*idx], "contribution": c }))
            .collect();
        let features_json: serde_json::Map<String, Value> = features
            .summary_named()
            .map(|(name, value)| (name.to_string(), Value::from(value)))
            .collect();

        let mut result = OracleScore::new(score, positive)
            .with_metadata("model_id", self.model.model_id.clone())
            .with_metadata("model_version", self.model.model_version.clone())
            .with_metadata("top_features", top)
            .with_metadata("features", features_json);
        if positive {
            if let Some((idx, _)) = contributions.first() {
                result = result.with_label(characteristic(*idx));
            }
        }
        Ok(result)
    }
}
