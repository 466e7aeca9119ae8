use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::oracle::OracleScore;

pub const URGENT_RECOMMENDATION: &str = "URGENT: Immediate action required";
pub const NO_ACTION_RECOMMENDATION: &str =
    "No immediate action required. Continue normal monitoring.";
pub const FALLBACK_RECOMMENDATION: &str = "Initiate general security measures";
const ISOLATION_RECOMMENDATION: &str = "URGENT: Consider immediate node isolation";
const MONITORING_RECOMMENDATION: &str = "Increase monitoring frequency";

/// Results of whichever stages ran for one message.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutputs {
    pub detection: OracleScore,
    pub analysis: Option<OracleScore>,
    pub transform: Option<OracleScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub threat_detected: bool,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threat_type: Option<String>,
    /// Raw output of each stage that actually ran, keyed by stage.
    pub evidence: Map<String, Value>,
    pub recommendations: Vec<String>,
}

impl Verdict {
    pub fn stages(&self) -> impl Iterator<Item = &str> {
        self.evidence.keys().map(String::as_str)
    }
}

/// Recommendation lists keyed by threat type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecommendationTemplates {
    templates: BTreeMap<String, Vec<String>>,
}

impl RecommendationTemplates {
    pub fn new(templates: BTreeMap<String, Vec<String>>) -> Self {
        Self { templates }
    }

    pub fn for_type(&self, threat_type: &str) -> Option<&[String]> {
        self.templates.get(threat_type).map(Vec::as_slice)
    }

    /// Adds or replaces the list for one threat type.
    pub fn set(&mut self, threat_type: impl Into<String>, recommendations: Vec<String>) {
        self.templates.insert(threat_type.into(), recommendations);
    }

    pub fn merge(&mut self, overrides: RecommendationTemplates) {
        self.templates.extend(overrides.templates);
    }
}

impl Default for RecommendationTemplates {
    fn default() -> Self {
        let entries: [(&str, [&str; 3]); 5] = [
            (
                "position_spoofing",
                [
                    "Initiate position verification protocol",
                    "Flag vehicle for enhanced monitoring",
                    "Request additional position confirmations",
                ],
            ),
            (
                "message_flooding",
                [
                    "Implement rate limiting for affected node",
                    "Temporarily increase message filtering threshold",
                    "Monitor network bandwidth consumption",
                ],
            ),
            (
                "data_injection",
                [
                    "Isolate affected message streams",
                    "Increase validation strictness",
                    "Deploy additional data sanity checks",
                ],
            ),
            (
                "replay_attack",
                [
                    "Refresh session keys",
                    "Enhance timestamp validation",
                    "Monitor message sequence numbers",
                ],
            ),
            (
                "impersonation",
                [
                    "Initiate node re-authentication",
                    "Revoke suspected compromised credentials",
                    "Deploy additional identity verification measures",
                ],
            ),
        ];
        let templates = entries
            .into_iter()
            .map(|(kind, recs)| (kind.to_string(), recs.map(str::to_string).to_vec()))
            .collect();
        Self { templates }
    }
}

/// Merges stage outputs into one verdict. Pure and deterministic.
pub fn combine(
    outputs: &StageOutputs,
    threat_threshold: f64,
    templates: &RecommendationTemplates,
) -> Verdict {
    let detection_score = outputs.detection.score;
    let anomaly_score = outputs.analysis.as_ref().map(|analysis| analysis.score);

    let threat_detected =
        outputs.detection.positive || anomaly_score.is_some_and(|score| score > threat_threshold);
    let confidence = anomaly_score.map_or(detection_score, |score| score.max(detection_score));
    let threat_type = if threat_detected {
        outputs
            .detection
            .label
            .clone()
            .or_else(|| outputs.analysis.as_ref().and_then(|a| a.label.clone()))
    } else {
        None
    };

    let mut evidence = Map::new();
    evidence.insert("detection".to_string(), stage_evidence(&outputs.detection));
    if let Some(analysis) = &outputs.analysis {
        evidence.insert("analysis".to_string(), stage_evidence(analysis));
    }
    if let Some(transform) = &outputs.transform {
        evidence.insert("transform".to_string(), stage_evidence(transform));
    }

    let recommendations =
        recommendations(threat_detected, threat_type.as_deref(), confidence, templates);

    Verdict {
        threat_detected,
        confidence,
        threat_type,
        evidence,
        recommendations,
    }
}

fn stage_evidence(score: &OracleScore) -> Value {
    serde_json::to_value(score).unwrap_or(Value::Null)
}

fn recommendations(
    threat_detected: bool,
    threat_type: Option<&str>,
    confidence: f64,
    templates: &RecommendationTemplates,
) -> Vec<String> {
    if !threat_detected {
        return vec![NO_ACTION_RECOMMENDATION.to_string()];
    }

    let mut out = Vec::new();
    if confidence > 0.9 {
        out.push(URGENT_RECOMMENDATION.to_string());
    }

    match threat_type.and_then(|kind| templates.for_type(kind)) {
        Some(list) if !list.is_empty() => out.extend(list.iter().cloned()),
        _ => out.push(FALLBACK_RECOMMENDATION.to_string()),
    }
    if confidence > 0.8 {
        out.push(ISOLATION_RECOMMENDATION.to_string());
    } else if confidence > 0.6 {
        out.push(MONITORING_RECOMMENDATION.to_string());
    }
    out
}
