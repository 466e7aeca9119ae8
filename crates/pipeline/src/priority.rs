use protocol::{Message, MessageType, Priority};

/// Queue class for an admitted message, from its type and urgency markers.
pub fn derive_priority(message: &Message) -> Priority {
    let base = match message.message_type() {
        MessageType::EmergencyAlert => {
            if message.text("severity") == Some("CRITICAL") {
                return Priority::Critical;
            }
            Priority::High
        }
        MessageType::ControlCommand => {
            if message.text("command_type") == Some("STOP") {
                return Priority::Critical;
            }
            Priority::High
        }
        MessageType::SafetyWarning => Priority::High,
        MessageType::InfrastructureStatus | MessageType::TrafficInfo => Priority::Medium,
        MessageType::PositionUpdate => Priority::Low,
    };

    // A sender-claimed top urgency lifts routine telemetry one class, never
    // into the critical class.
    if message.metadata.priority_hint == 1 && base > Priority::High {
        base.raised()
    } else {
        base
    }
}
