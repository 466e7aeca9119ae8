//! Fixed-shape feature extraction over a sender's observation window.
//!
//! Every message contributes `MESSAGE_FEATURES` normalised values chosen by a
//! closed per-type table; the window as a whole contributes `SUMMARY_FEATURES`
//! behavioural signals. Both parts have a stable length regardless of how much
//! history exists, so scoring oracles never see variable shapes.

use protocol::{Message, MessageType, MESSAGE_TYPE_COUNT};
use serde::Serialize;

use crate::history::Observation;
use crate::math::{clip01, haversine_m, robust_z, scaled};

pub const MESSAGE_FEATURES: usize = 6;
pub const SUMMARY_FEATURES: usize = 8;

pub const SUMMARY_FEATURE_NAMES: [&str; SUMMARY_FEATURES] = [
    "speed_excess",
    "position_jump",
    "message_rate",
    "duplicate_content_ratio",
    "timestamp_regressions",
    "alert_frequency",
    "value_extremity",
    "hop_count",
];

pub(crate) const SPEED_EXCESS: usize = 0;
pub(crate) const POSITION_JUMP: usize = 1;
pub(crate) const MESSAGE_RATE: usize = 2;
pub(crate) const DUPLICATE_CONTENT: usize = 3;
pub(crate) const TIMESTAMP_REGRESSIONS: usize = 4;
pub(crate) const ALERT_FREQUENCY: usize = 5;
pub(crate) const VALUE_EXTREMITY: usize = 6;
pub(crate) const HOP_COUNT: usize = 7;

/// Plausible urban/highway ceiling in km/h before speed counts as excessive.
const SPEED_CEILING_KMH: f64 = 130.0;
/// Implied ground speed between consecutive fixes above which a jump is flagged.
const MAX_IMPLIED_SPEED_MS: f64 = 100.0;
const JUMP_LOOKBACK: usize = 10;
const EXTREMITY_LOOKBACK: usize = 20;
/// Robust z-score that maps to a full extremity signal.
const EXTREMITY_Z_CAP: f64 = 6.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    pub summary: [f64; SUMMARY_FEATURES],
    /// `capacity × MESSAGE_FEATURES` values, oldest message first, zero padded
    /// at the tail when the window is not yet full.
    pub sequence: Vec<f64>,
    /// Number of real observations behind `sequence`.
    pub observed: usize,
}

impl FeatureVector {
    pub fn empty(capacity: usize) -> Self {
        Self {
            summary: [0.0; SUMMARY_FEATURES],
            sequence: vec![0.0; capacity * MESSAGE_FEATURES],
            observed: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.sequence.len() / MESSAGE_FEATURES
    }

    pub fn row(&self, index: usize) -> Option<&[f64]> {
        let start = index.checked_mul(MESSAGE_FEATURES)?;
        self.sequence.get(start..start + MESSAGE_FEATURES)
    }

    /// Rows backed by real observations.
    pub fn observed_rows(&self) -> impl Iterator<Item = &[f64]> {
        self.sequence
            .chunks_exact(MESSAGE_FEATURES)
            .take(self.observed)
    }

    pub fn latest_row(&self) -> Option<&[f64]> {
        self.observed.checked_sub(1).and_then(|idx| self.row(idx))
    }

    pub fn summary_named(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        SUMMARY_FEATURE_NAMES
            .iter()
            .copied()
            .zip(self.summary.iter().copied())
    }
}

/// Builds the feature vector for a window holding `observations`, oldest first.
pub fn extract(observations: &[&Observation], capacity: usize) -> FeatureVector {
    let mut vector = FeatureVector::empty(capacity);
    let skip = observations.len().saturating_sub(capacity);
    let window = &observations[skip..];

    for (slot, observation) in window.iter().enumerate() {
        let row = message_features(&observation.message);
        let start = slot * MESSAGE_FEATURES;
        vector.sequence[start..start + MESSAGE_FEATURES].copy_from_slice(&row);
    }
    vector.observed = window.len();
    vector.summary = summary_features(window, &vector);
    vector
}

/// Per-message normalised values; slot 0 always carries the type code.
pub fn message_features(message: &Message) -> [f64; MESSAGE_FEATURES] {
    let mut row = [0.0; MESSAGE_FEATURES];
    let kind = message.message_type();
    row[0] = (kind.index() + 1) as f64 / MESSAGE_TYPE_COUNT as f64;

    let num = |path: &str| message.number(path).unwrap_or(0.0);
    let text = |path: &str| message.text(path).unwrap_or_default();

    let values: [f64; MESSAGE_FEATURES - 1] = match kind {
        MessageType::PositionUpdate => [
            scaled(num("speed"), 200.0),
            scaled(num("direction"), 360.0),
            clip01((num("position.latitude") + 90.0) / 180.0),
            clip01((num("position.longitude") + 180.0) / 360.0),
            scaled(num("acceleration").abs(), 10.0),
        ],
        MessageType::EmergencyAlert => [
            severity_code(text("severity")),
            alert_code(text("alert_type")),
            scaled(num("location.radius"), 10_000.0),
            clip01((num("location.latitude") + 90.0) / 180.0),
            clip01((num("location.longitude") + 180.0) / 360.0),
        ],
        MessageType::TrafficInfo => [
            scaled(num("congestion_level"), 100.0),
            scaled(num("average_speed"), 200.0),
            scaled(num("vehicle_density"), 100.0),
            scaled(num("segment_length"), 10_000.0),
            0.0,
        ],
        MessageType::InfrastructureStatus => [
            status_code(text("status")),
            scaled(num("health.battery_level"), 100.0),
            scaled(num("health.signal_strength"), 100.0),
            0.0,
            0.0,
        ],
        MessageType::SafetyWarning => [
            warning_code(text("warning_type")),
            scaled(num("duration"), 86_400.0),
            scaled(num("affected_area.width"), 50.0),
            0.0,
            0.0,
        ],
        MessageType::ControlCommand => [
            command_code(text("command_type")),
            scaled(num("parameters.speed"), 130.0),
            clip01((num("parameters.lane_offset") + 3.0) / 6.0),
            0.0,
            0.0,
        ],
    };
    row[1..].copy_from_slice(&values);
    row
}

fn severity_code(severity: &str) -> f64 {
    match severity {
        "CRITICAL" => 1.0,
        "HIGH" => 0.75,
        "MEDIUM" => 0.5,
        "LOW" => 0.25,
        _ => 0.0,
    }
}

fn alert_code(alert: &str) -> f64 {
    match alert {
        "COLLISION" => 1.0,
        "VEHICLE_MALFUNCTION" => 0.75,
        "ROAD_HAZARD" => 0.5,
        "WEATHER" => 0.25,
        _ => 0.0,
    }
}

fn status_code(status: &str) -> f64 {
    match status {
        "OFFLINE" => 1.0,
        "DEGRADED" => 0.66,
        "MAINTENANCE" => 0.33,
        _ => 0.0,
    }
}

fn warning_code(warning: &str) -> f64 {
    match warning {
        "ACCIDENT" => 1.0,
        "ROAD_WORK" => 0.66,
        "WEATHER_HAZARD" => 0.5,
        "SLIPPERY_ROAD" => 0.33,
        _ => 0.0,
    }
}

fn command_code(command: &str) -> f64 {
    match command {
        "STOP" => 1.0,
        "ROUTE_CHANGE" => 0.75,
        "LANE_CHANGE" => 0.5,
        "SPEED_LIMIT" => 0.25,
        _ => 0.0,
    }
}

fn summary_features(window: &[&Observation], vector: &FeatureVector) -> [f64; SUMMARY_FEATURES] {
    let mut summary = [0.0; SUMMARY_FEATURES];
    let Some(latest) = window.last() else {
        return summary;
    };

    summary[SPEED_EXCESS] = latest
        .message
        .number("speed")
        .map(|speed| clip01((speed - SPEED_CEILING_KMH) / 70.0))
        .unwrap_or(0.0);
    summary[POSITION_JUMP] = position_jump(window);
    summary[MESSAGE_RATE] = message_rate(window);
    summary[DUPLICATE_CONTENT] = duplicate_content_ratio(window);
    summary[TIMESTAMP_REGRESSIONS] = timestamp_regressions(window);
    summary[ALERT_FREQUENCY] = alert_frequency(window);
    summary[VALUE_EXTREMITY] = value_extremity(vector);
    summary[HOP_COUNT] = scaled(f64::from(latest.message.metadata.hop_count), 10.0);
    summary
}

fn fix(message: &Message) -> Option<(f64, f64)> {
    Some((
        message.number("position.latitude")?,
        message.number("position.longitude")?,
    ))
}

/// Consecutive position fixes whose implied ground speed is physically
/// implausible, 0.3 per offending pair.
fn position_jump(window: &[&Observation]) -> f64 {
    let fixes: Vec<(i64, (f64, f64))> = window
        .iter()
        .rev()
        .take(JUMP_LOOKBACK)
        .rev()
        .filter_map(|obs| Some((obs.message.metadata.timestamp_ms, fix(&obs.message)?)))
        .collect();

    let jumps = fixes
        .windows(2)
        .filter(|pair| {
            let (t0, (lat0, lon0)) = pair[0];
            let (t1, (lat1, lon1)) = pair[1];
            let dt_s = (t1 - t0) as f64 / 1_000.0;
            if dt_s <= 0.0 {
                return false;
            }
            haversine_m(lat0, lon0, lat1, lon1) / dt_s > MAX_IMPLIED_SPEED_MS
        })
        .count();
    clip01(0.3 * jumps as f64)
}

/// Step score over the arrival rate of the window.
fn message_rate(window: &[&Observation]) -> f64 {
    if window.len() < 10 {
        return 0.0;
    }
    let (Some(first), Some(last)) = (window.first(), window.last()) else {
        return 0.0;
    };
    let span_s = ((last.received_ms - first.received_ms) as f64 / 1_000.0).max(1e-3);
    let rate = window.len() as f64 / span_s;
    if rate > 100.0 {
        0.9
    } else if rate > 50.0 {
        0.6
    } else if rate > 20.0 {
        0.3
    } else {
        0.0
    }
}

fn duplicate_content_ratio(window: &[&Observation]) -> f64 {
    let Some(latest) = window.last() else {
        return 0.0;
    };
    if window.len() < 2 {
        return 0.0;
    }
    let repeats = window[..window.len() - 1]
        .iter()
        .filter(|obs| obs.content_digest == latest.content_digest)
        .count();
    repeats as f64 / (window.len() - 1) as f64
}

fn timestamp_regressions(window: &[&Observation]) -> f64 {
    if window.len() < 2 {
        return 0.0;
    }
    let regressions = window
        .windows(2)
        .filter(|pair| pair[1].message.metadata.timestamp_ms < pair[0].message.metadata.timestamp_ms)
        .count();
    regressions as f64 / (window.len() - 1) as f64
}

fn alert_frequency(window: &[&Observation]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let alerts = window
        .iter()
        .filter(|obs| obs.message.message_type() == MessageType::EmergencyAlert)
        .count();
    alerts as f64 / window.len() as f64
}

/// Largest robust z-score of the latest row against earlier rows of the same
/// message type.
fn value_extremity(vector: &FeatureVector) -> f64 {
    let Some(latest) = vector.latest_row() else {
        return 0.0;
    };
    let earlier: Vec<&[f64]> = vector
        .observed_rows()
        .take(vector.observed.saturating_sub(1))
        .filter(|row| row[0] == latest[0])
        .collect();
    let earlier = &earlier[earlier.len().saturating_sub(EXTREMITY_LOOKBACK)..];

    let mut worst: f64 = 0.0;
    for dim in 1..MESSAGE_FEATURES {
        let history: Vec<f64> = earlier.iter().map(|row| row[dim]).collect();
        worst = worst.max(robust_z(latest[dim], &history).abs());
    }
    clip01(worst / EXTREMITY_Z_CAP)
}
