use serde_json::json;

use super::*;

fn position_message() -> Message {
    let raw = json!({
        "message_id": "m-1",
        "sender_id": "VEH_1",
        "message_type": "position_update",
        "timestamp_ms": 1_000,
        "signature": "00",
        "content": {
            "speed": 50.0,
            "direction": 90,
            "position": {"longitude": 13.4, "latitude": 52.5}
        }
    });
    serde_json::from_value(raw).expect("decode message")
}

#[test]
fn message_decodes_flattened_metadata_with_defaults() {
    let msg = position_message();
    assert_eq!(msg.id(), "m-1");
    assert_eq!(msg.sender(), "VEH_1");
    assert_eq!(msg.message_type(), MessageType::PositionUpdate);
    assert_eq!(msg.metadata.priority_hint, 3);
    assert_eq!(msg.metadata.hop_count, 0);
    assert!(msg.metadata.previous_hop.is_none());
}

#[test]
fn dotted_paths_resolve_nested_fields() {
    let msg = position_message();
    assert_eq!(msg.number("position.latitude"), Some(52.5));
    assert_eq!(msg.number("speed"), Some(50.0));
    assert!(msg.field("position.altitude").is_none());
    assert!(msg.field("speed.inner").is_none());
}

#[test]
fn canonical_content_sorts_keys_at_every_depth() {
    let msg = position_message();
    assert_eq!(
        msg.canonical_content(),
        r#"{"direction":90,"position":{"latitude":52.5,"longitude":13.4},"speed":50.0}"#
    );
}

#[test]
fn digest_ignores_key_order_and_signature() {
    let a = position_message();
    let mut b = position_message();
    b.metadata.signature = None;
    b.content = serde_json::from_str(
        r#"{"position":{"latitude":52.5,"longitude":13.4},"speed":50.0,"direction":90}"#,
    )
    .expect("content");
    assert_eq!(a.content_digest(), b.content_digest());
    assert_eq!(a.content_digest_hex().len(), 64);
}

#[test]
fn message_type_parsing_and_required_fields() {
    assert_eq!(
        "Emergency_Alert".parse::<MessageType>(),
        Ok(MessageType::EmergencyAlert)
    );
    assert!("telemetry".parse::<MessageType>().is_err());
    for ty in MESSAGE_TYPES {
        assert_eq!(ty.required_fields().len(), 3, "{ty}");
        assert_eq!(MESSAGE_TYPES[ty.index()], ty);
    }
}

#[test]
fn priority_order_is_critical_first() {
    let mut shuffled = vec![Priority::Low, Priority::Critical, Priority::Medium, Priority::High];
    shuffled.sort();
    assert_eq!(shuffled, PRIORITIES.to_vec());
    assert_eq!(Priority::Low.raised(), Priority::Medium);
    assert_eq!(Priority::Critical.raised(), Priority::Critical);
    assert_eq!("high".parse::<Priority>(), Ok(Priority::High));
}

#[test]
fn manual_clock_moves_only_when_told() {
    let clock = ManualClock::new(1_000);
    assert_eq!(clock.now_ms(), 1_000);
    assert_eq!(clock.advance(250), 1_250);
    clock.set(5);
    assert_eq!(clock.now_ms(), 5);
    assert!(SystemClock.now_ms() > 1_600_000_000_000);
}
