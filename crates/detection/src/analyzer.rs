use protocol::MessageType;
use serde_json::json;

use crate::features::{ALERT_FREQUENCY, HOP_COUNT, MESSAGE_FEATURES, MESSAGE_RATE, POSITION_JUMP};
use crate::history::Observation;
use crate::math::{clip01, haversine_m, mean, robust_z, std_dev};
use crate::oracle::{AnalysisInput, OracleError, OracleScore, ScoringOracle};

pub const ANALYZER_NAME: &str = "window_analyzer";

const BASE_WEIGHT: f64 = 0.4;
const TEMPORAL_WEIGHT: f64 = 0.3;
const SPATIAL_WEIGHT: f64 = 0.2;
const CONTEXT_WEIGHT: f64 = 0.1;

/// Robust z-score mapped to a full base signal.
const BASE_Z_CAP: f64 = 3.0;

/// Second-stage analyzer over the sender's window.
#[derive(Debug, Clone)]
pub struct WindowAnalyzer {
    threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubScores {
    pub base: f64,
    pub temporal: f64,
    pub spatial: f64,
    pub context: f64,
}

impl SubScores {
    pub fn combined(&self) -> f64 {
        clip01(
            BASE_WEIGHT * self.base
                + TEMPORAL_WEIGHT * self.temporal
                + SPATIAL_WEIGHT * self.spatial
                + CONTEXT_WEIGHT * self.context,
        )
    }

    /// Threat family of the sub-score contributing most to the total.
    pub fn classification(&self) -> &'static str {
        let weighted = [
            (BASE_WEIGHT * self.base, "data_injection"),
            (TEMPORAL_WEIGHT * self.temporal, "message_flooding"),
            (SPATIAL_WEIGHT * self.spatial, "position_spoofing"),
            (CONTEXT_WEIGHT * self.context, "behavioral_anomaly"),
        ];
        weighted
            .iter()
            .fold((f64::MIN, "data_injection"), |best, &(value, label)| {
                if value > best.0 {
                    (value, label)
                } else {
                    best
                }
            })
            .1
    }
}

impl WindowAnalyzer {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn sub_scores(&self, input: &AnalysisInput) -> SubScores {
        SubScores {
            base: base_score(input),
            temporal: temporal_score(input),
            spatial: spatial_score(input),
            context: context_score(input),
        }
    }
}

impl Default for WindowAnalyzer {
    fn default() -> Self {
        Self::new(0.8)
    }
}

impl ScoringOracle<AnalysisInput> for WindowAnalyzer {
    fn name(&self) -> &str {
        ANALYZER_NAME
    }

    fn score(&self, input: &AnalysisInput) -> Result<OracleScore, OracleError> {
        let parts = self.sub_scores(input);
        let score = parts.combined();
        if !score.is_finite() {
            return Err(OracleError::new(ANALYZER_NAME, "non-finite anomaly score"));
        }
        Ok(OracleScore::new(score, score >= self.threshold)
            .with_label(parts.classification())
            .with_metadata(
                "components",
                json!({
                    "base": parts.base,
                    "temporal": parts.temporal,
                    "spatial": parts.spatial,
                    "context": parts.context,
                }),
            )
            .with_metadata("window_len", input.window.len()))
    }
}

/// Deviation of the newest message's values from earlier messages of the
/// same type.
fn base_score(input: &AnalysisInput) -> f64 {
    let features = &input.features;
    let Some(latest) = features.latest_row() else {
        return 0.0;
    };
    let earlier: Vec<&[f64]> = features
        .observed_rows()
        .take(features.observed.saturating_sub(1))
        .filter(|row| row[0] == latest[0])
        .collect();

    let deviations: Vec<f64> = (1..MESSAGE_FEATURES)
        .map(|dim| {
            let history: Vec<f64> = earlier.iter().map(|row| row[dim]).collect();
            clip01(robust_z(latest[dim], &history).abs() / BASE_Z_CAP)
        })
        .collect();
    mean(&deviations)
}

/// Irregular inter-arrival times combined with the detector's rate signal.
fn temporal_score(input: &AnalysisInput) -> f64 {
    let arrivals: Vec<f64> = input
        .window
        .windows(2)
        .map(|pair| (pair[1].received_ms - pair[0].received_ms) as f64)
        .collect();
    let irregularity = if arrivals.len() >= 2 {
        let avg = mean(&arrivals);
        if avg > 0.0 {
            clip01(std_dev(&arrivals) / avg / 2.0)
        } else {
            1.0
        }
    } else {
        0.0
    };
    mean(&[irregularity, input.features.summary[MESSAGE_RATE]])
}

/// Disagreement between reported speed and the speed implied by successive
/// position fixes.
fn spatial_score(input: &AnalysisInput) -> f64 {
    let fixes: Vec<&Observation> = input
        .window
        .iter()
        .filter(|obs| obs.message.message_type() == MessageType::PositionUpdate)
        .collect();

    let mismatches: Vec<f64> = fixes
        .windows(2)
        .filter_map(|pair| {
            let (a, b) = (&pair[0].message, &pair[1].message);
            let dt_s = (b.metadata.timestamp_ms - a.metadata.timestamp_ms) as f64 / 1_000.0;
            if dt_s <= 0.0 {
                return None;
            }
            let distance = haversine_m(
                a.number("position.latitude")?,
                a.number("position.longitude")?,
                b.number("position.latitude")?,
                b.number("position.longitude")?,
            );
            let implied = distance / dt_s;
            let reported = b.number("speed")? / 3.6;
            Some(clip01((implied - reported).abs() / implied.max(reported).max(1.0)))
        })
        .collect();

    mean(&mismatches).max(input.features.summary[POSITION_JUMP])
}

/// Operational stakes of the message and sender.
fn context_score(input: &AnalysisInput) -> f64 {
    let summary = &input.features.summary;
    clip01(
        0.3 * input.message.message_type().criticality()
            + 0.2 * summary[HOP_COUNT]
            + 0.3 * input.detection.score
            + 0.2 * summary[ALERT_FREQUENCY],
    )
}
