use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const MESSAGE_TYPES: [MessageType; 6] = [
    MessageType::PositionUpdate,
    MessageType::EmergencyAlert,
    MessageType::TrafficInfo,
    MessageType::InfrastructureStatus,
    MessageType::SafetyWarning,
    MessageType::ControlCommand,
];
pub const MESSAGE_TYPE_COUNT: usize = MESSAGE_TYPES.len();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    PositionUpdate,
    EmergencyAlert,
    TrafficInfo,
    InfrastructureStatus,
    SafetyWarning,
    ControlCommand,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PositionUpdate => "position_update",
            Self::EmergencyAlert => "emergency_alert",
            Self::TrafficInfo => "traffic_info",
            Self::InfrastructureStatus => "infrastructure_status",
            Self::SafetyWarning => "safety_warning",
            Self::ControlCommand => "control_command",
        }
    }

    pub const fn index(self) -> usize {
        match self {
            Self::PositionUpdate => 0,
            Self::EmergencyAlert => 1,
            Self::TrafficInfo => 2,
            Self::InfrastructureStatus => 3,
            Self::SafetyWarning => 4,
            Self::ControlCommand => 5,
        }
    }

    /// Content keys every message of this type must carry.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::PositionUpdate => &["position", "speed", "direction"],
            Self::EmergencyAlert => &["alert_type", "severity", "location"],
            Self::TrafficInfo => &["road_id", "congestion_level", "average_speed"],
            Self::InfrastructureStatus => &["device_id", "status", "health"],
            Self::SafetyWarning => &["warning_type", "affected_area", "duration"],
            Self::ControlCommand => &["command_type", "parameters", "target_id"],
        }
    }

    /// Relative operational criticality in [0, 1], used as a context signal.
    pub fn criticality(self) -> f64 {
        match self {
            Self::EmergencyAlert => 1.0,
            Self::ControlCommand => 0.9,
            Self::SafetyWarning => 0.7,
            Self::InfrastructureStatus => 0.5,
            Self::TrafficInfo => 0.4,
            Self::PositionUpdate => 0.3,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

impl FromStr for MessageType {
    type Err = ParseEnumError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        MESSAGE_TYPES
            .into_iter()
            .find(|ty| ty.as_str() == normalized)
            .ok_or(ParseEnumError {
                kind: "message type",
                value: raw.to_string(),
            })
    }
}

pub const PRIORITIES: [Priority; 4] = [
    Priority::Critical,
    Priority::High,
    Priority::Medium,
    Priority::Low,
];

/// Delivery class. Declaration order is service order: `Critical` first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }

    pub const fn index(self) -> usize {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }

    /// One class more urgent, saturating at `Critical`.
    pub fn raised(self) -> Self {
        match self {
            Self::Critical | Self::High => Self::Critical,
            Self::Medium => Self::High,
            Self::Low => Self::Medium,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Ok(Self::Critical),
            "HIGH" => Ok(Self::High),
            "MEDIUM" => Ok(Self::Medium),
            "LOW" => Ok(Self::Low),
            _ => Err(ParseEnumError {
                kind: "priority",
                value: raw.to_string(),
            }),
        }
    }
}
