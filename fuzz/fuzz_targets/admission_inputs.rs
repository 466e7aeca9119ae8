#![no_main]

use std::sync::{Arc, Mutex};

use admission::{
    KeyringTrustStore, MessageValidator, PatternSet, SecurityConfig, SecurityGate,
    ValidatorConfig,
};
use detection::{LinearDetector, NodeHistory, Observation, ScoringOracle};
use libfuzzer_sys::fuzz_target;
use once_cell::sync::Lazy;
use protocol::{Content, Message, MessageMetadata, MESSAGE_TYPES};
use serde_json::{json, Value};

const NOW: i64 = 1_700_000_000_000;

struct Harness {
    validator: MessageValidator,
    gate: SecurityGate,
    history: NodeHistory,
    detector: LinearDetector,
}

static HARNESS: Lazy<Mutex<Harness>> = Lazy::new(|| {
    let security = SecurityConfig {
        require_signature: false,
        require_trusted_sender: false,
        ..SecurityConfig::default()
    };
    Mutex::new(Harness {
        validator: MessageValidator::new(ValidatorConfig::default()),
        gate: SecurityGate::with_store(
            security,
            Arc::new(KeyringTrustStore::new()),
            PatternSet::default(),
        ),
        history: NodeHistory::new(32),
        detector: LinearDetector::new(),
    })
});

fn bounded_text(data: &[u8], offset: usize, len: usize) -> String {
    let start = offset.min(data.len());
    let end = (start + len).min(data.len());
    String::from_utf8_lossy(&data[start..end]).to_string()
}

fn byte(data: &[u8], index: usize) -> u8 {
    data.get(index).copied().unwrap_or_default()
}

/// Same field names as real telemetry, arbitrary values.
fn synthesized(data: &[u8]) -> Message {
    let kind = MESSAGE_TYPES[usize::from(byte(data, 0)) % MESSAGE_TYPES.len()];
    let number = |i: usize| f64::from(byte(data, i)) * 2.0 - 40.0;
    let content = json!({
        "position": {"latitude": number(1) / 2.0, "longitude": number(2)},
        "speed": number(3),
        "direction": number(4) * 2.0,
        "severity": bounded_text(data, 5, 8),
        "alert_type": bounded_text(data, 13, 12),
        "location": {"latitude": number(25), "longitude": number(26), "radius": number(27) * 50.0},
        "road_id": bounded_text(data, 28, 6),
        "congestion_level": number(34),
        "average_speed": number(35),
        "device_id": bounded_text(data, 36, 6),
        "status": bounded_text(data, 42, 10),
        "health": {"battery_level": number(52), "signal_strength": number(53)},
        "warning_type": bounded_text(data, 54, 12),
        "affected_area": {"radius": number(66)},
        "duration": number(67),
        "command_type": bounded_text(data, 68, 10),
        "parameters": {},
        "target_id": bounded_text(data, 78, 8),
        "sequence_number": byte(data, 86),
    });
    let content: Content = match content {
        Value::Object(map) => map,
        _ => Content::new(),
    };
    Message::new(
        MessageMetadata {
            message_id: bounded_text(data, 87, 4),
            sender_id: format!("VEH_{}", byte(data, 91) % 4),
            message_type: kind,
            timestamp_ms: NOW - i64::from(byte(data, 92)) * 40,
            priority_hint: byte(data, 93) % 6,
            hop_count: u32::from(byte(data, 94)),
            signature: None,
            previous_hop: None,
        },
        content,
    )
}

fuzz_target!(|data: &[u8]| {
    let message = std::str::from_utf8(data)
        .ok()
        .and_then(|raw| Message::from_json(raw).ok())
        .unwrap_or_else(|| synthesized(data));

    let Ok(mut harness) = HARNESS.lock() else {
        return;
    };
    let now = NOW + i64::from(byte(data, 95)) * 10;
    if harness.validator.check(&message, now).is_err() {
        return;
    }
    if harness.gate.authorize(&message, now).is_err() {
        return;
    }
    harness.validator.commit(&message, now);

    let message = Arc::new(message);
    harness.history.record(Observation::new(message, now));
    let features = harness.history.features();
    if let Ok(score) = harness.detector.score(&features) {
        assert!((0.0..=1.0).contains(&score.score));
    }
    harness.validator.sweep(now);
    harness.gate.sweep(now);
});
