use protocol::{content_path, Content, Message, MessageType};
use serde_json::Value;

use crate::errors::Violation;

const SEVERITIES: &[&str] = &["CRITICAL", "HIGH", "MEDIUM", "LOW"];
const ALERT_TYPES: &[&str] = &["COLLISION", "ROAD_HAZARD", "WEATHER", "VEHICLE_MALFUNCTION"];
const DEVICE_STATUSES: &[&str] = &["OPERATIONAL", "DEGRADED", "MAINTENANCE", "OFFLINE"];
const WARNING_TYPES: &[&str] = &["SLIPPERY_ROAD", "ROAD_WORK", "ACCIDENT", "WEATHER_HAZARD"];
const COMMAND_TYPES: &[&str] = &["SPEED_LIMIT", "LANE_CHANGE", "ROUTE_CHANGE", "STOP"];

#[derive(Debug, Clone, Copy)]
enum Lower {
    Inclusive(f64),
    Exclusive(f64),
}

impl Lower {
    fn admits(self, value: f64) -> bool {
        match self {
            Self::Inclusive(min) => value >= min,
            Self::Exclusive(min) => value > min,
        }
    }

    fn describe(self) -> (char, f64) {
        match self {
            Self::Inclusive(min) => ('[', min),
            Self::Exclusive(min) => ('(', min),
        }
    }
}

/// Domain checks for one message. Fields absent from the content are left to
/// the structural check and not reported again here.
pub(crate) fn check(message: &Message, now_ms: i64, out: &mut Vec<Violation>) {
    let content = &message.content;
    match message.message_type() {
        MessageType::PositionUpdate => check_position(content, out),
        MessageType::EmergencyAlert => check_emergency(content, out),
        MessageType::TrafficInfo => check_traffic(content, out),
        MessageType::InfrastructureStatus => check_infrastructure(content, now_ms, out),
        MessageType::SafetyWarning => check_safety(content, out),
        MessageType::ControlCommand => check_control(content, out),
    }
}

fn check_position(content: &Content, out: &mut Vec<Violation>) {
    range(content, "speed", Lower::Inclusive(0.0), 200.0, out);
    range(content, "direction", Lower::Inclusive(0.0), 360.0, out);
    if let Some(position) = content.get("position") {
        if position.is_object() {
            required_range(content, "position.latitude", Lower::Inclusive(-90.0), 90.0, out);
            required_range(content, "position.longitude", Lower::Inclusive(-180.0), 180.0, out);
        } else {
            out.push(Violation::invalid("position must be an object"));
        }
    }
}

fn check_emergency(content: &Content, out: &mut Vec<Violation>) {
    one_of(content, "severity", SEVERITIES, out);
    one_of(content, "alert_type", ALERT_TYPES, out);
    if content.contains_key("location") {
        if has_keys(content, "location", &["latitude", "longitude", "radius"]) {
            range(content, "location.radius", Lower::Inclusive(0.0), 10_000.0, out);
        } else {
            out.push(Violation::invalid(
                "location must carry latitude, longitude and radius",
            ));
        }
    }
}

fn check_traffic(content: &Content, out: &mut Vec<Violation>) {
    range(content, "congestion_level", Lower::Inclusive(0.0), 100.0, out);
    range(content, "average_speed", Lower::Inclusive(0.0), 200.0, out);
    range(content, "segment_length", Lower::Exclusive(0.0), 10_000.0, out);
}

fn check_infrastructure(content: &Content, now_ms: i64, out: &mut Vec<Violation>) {
    one_of(content, "status", DEVICE_STATUSES, out);
    if content.contains_key("health") {
        required_range(content, "health.battery_level", Lower::Inclusive(0.0), 100.0, out);
        required_range(content, "health.signal_strength", Lower::Inclusive(0.0), 100.0, out);
    }
    if content.contains_key("maintenance_data") {
        match content_path(content, "maintenance_data.last_check").and_then(Value::as_f64) {
            Some(last_check) if last_check > now_ms as f64 => out.push(Violation::invalid(
                format!("maintenance_data.last_check {last_check} is in the future"),
            )),
            Some(_) => {}
            None => out.push(Violation::invalid(
                "maintenance_data.last_check must be a unix millisecond timestamp",
            )),
        }
    }
}

fn check_safety(content: &Content, out: &mut Vec<Violation>) {
    one_of(content, "warning_type", WARNING_TYPES, out);
    range(content, "duration", Lower::Exclusive(0.0), 86_400.0, out);
    if content.contains_key("affected_area") {
        if has_keys(content, "affected_area", &["start_point", "end_point", "width"]) {
            range(content, "affected_area.width", Lower::Exclusive(0.0), 50.0, out);
        } else {
            out.push(Violation::invalid(
                "affected_area must carry start_point, end_point and width",
            ));
        }
    }
}

fn check_control(content: &Content, out: &mut Vec<Violation>) {
    one_of(content, "command_type", COMMAND_TYPES, out);
    if content.get("parameters").is_some_and(|params| !params.is_object()) {
        out.push(Violation::invalid("parameters must be an object"));
        return;
    }
    match content.get("command_type").and_then(Value::as_str) {
        Some("SPEED_LIMIT") => {
            required_range(content, "parameters.speed", Lower::Inclusive(0.0), 130.0, out)
        }
        Some("LANE_CHANGE") => {
            required_range(content, "parameters.lane_offset", Lower::Inclusive(-3.0), 3.0, out)
        }
        _ => {}
    }
}

fn has_keys(content: &Content, path: &str, keys: &[&str]) -> bool {
    content_path(content, path)
        .and_then(Value::as_object)
        .map(|obj| keys.iter().all(|key| obj.contains_key(*key)))
        .unwrap_or(false)
}

/// Checks `path` only when present.
fn range(content: &Content, path: &str, lower: Lower, max: f64, out: &mut Vec<Violation>) {
    let Some(value) = content_path(content, path) else {
        return;
    };
    check_number(path, value, lower, max, out);
}

/// Like [`range`], but a missing value is itself a violation.
fn required_range(content: &Content, path: &str, lower: Lower, max: f64, out: &mut Vec<Violation>) {
    match content_path(content, path) {
        Some(value) => check_number(path, value, lower, max, out),
        None => out.push(Violation::invalid(format!("{path} is missing"))),
    }
}

fn check_number(path: &str, value: &Value, lower: Lower, max: f64, out: &mut Vec<Violation>) {
    let Some(number) = value.as_f64() else {
        out.push(Violation::invalid(format!("{path} must be a number")));
        return;
    };
    if !lower.admits(number) || number > max {
        let (bracket, min) = lower.describe();
        out.push(Violation::invalid(format!(
            "{path} {number} outside {bracket}{min}, {max}]"
        )));
    }
}

fn one_of(content: &Content, path: &str, allowed: &[&str], out: &mut Vec<Violation>) {
    let Some(value) = content_path(content, path) else {
        return;
    };
    match value.as_str() {
        Some(text) if allowed.contains(&text) => {}
        _ => out.push(Violation::invalid(format!("{path} {value} not one of {allowed:?}"))),
    }
}
