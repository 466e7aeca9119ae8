use super::*;
use protocol::{Content, Message, MessageMetadata, MessageType};
use serde_json::{json, Value};

const NOW: i64 = 1_700_000_000_000;

fn message(id: &str, sender: &str, ty: MessageType, ts: i64, content: Value) -> Message {
    let Value::Object(content) = content else {
        panic!("content must be an object");
    };
    Message::new(
        MessageMetadata {
            message_id: id.to_string(),
            sender_id: sender.to_string(),
            message_type: ty,
            timestamp_ms: ts,
            priority_hint: 3,
            hop_count: 0,
            signature: None,
            previous_hop: None,
        },
        content,
    )
}

fn position(id: &str, ts: i64) -> Message {
    message(
        id,
        "VEH_1",
        MessageType::PositionUpdate,
        ts,
        json!({
            "position": {"latitude": 52.5, "longitude": 13.4},
            "speed": 50,
            "direction": 90
        }),
    )
}

#[test]
fn well_formed_position_update_passes() {
    let mut validator = MessageValidator::new(ValidatorConfig::default());
    assert_eq!(validator.validate(&position("m-1", NOW - 100), NOW), Ok(()));
    assert_eq!(validator.tracked_ids(), 1);
}

#[test]
fn stale_and_future_timestamps_are_rejected() {
    let mut validator = MessageValidator::new(ValidatorConfig::default());
    let stale = validator
        .validate(&position("m-1", NOW - 5_001), NOW)
        .expect_err("stale");
    assert_eq!(stale.codes(), vec![ValidationCode::Stale]);

    let future = validator
        .validate(&position("m-2", NOW + 1), NOW)
        .expect_err("future");
    assert_eq!(future.codes(), vec![ValidationCode::FutureTimestamp]);
}

#[test]
fn clock_skew_tolerance_admits_slightly_ahead_timestamps() {
    let mut validator = MessageValidator::new(ValidatorConfig {
        clock_skew_tolerance_ms: 50,
        ..ValidatorConfig::default()
    });
    assert!(validator.validate(&position("m-1", NOW + 40), NOW).is_ok());
}

#[test]
fn every_violation_is_reported_in_one_reason() {
    let mut validator = MessageValidator::new(ValidatorConfig::default());
    let msg = message(
        "m-1",
        "VEH_1",
        MessageType::PositionUpdate,
        NOW - 10_000,
        json!({"speed": 250, "direction": 400}),
    );
    let err = validator.validate(&msg, NOW).expect_err("invalid");
    assert_eq!(
        err.codes(),
        vec![
            ValidationCode::Stale,
            ValidationCode::MissingFields,
            ValidationCode::InvalidValue,
            ValidationCode::InvalidValue,
        ]
    );
    let reason = err.reason();
    assert!(reason.contains("missing required fields: position"));
    assert!(reason.contains("speed 250 outside [0, 200]"));
    assert!(reason.contains("direction 400 outside [0, 360]"));
    assert_eq!(reason.matches(" | ").count(), 3);
    assert_eq!(validator.tracked_ids(), 0);
}

#[test]
fn duplicate_inside_window_rejected_and_accepted_after() {
    let mut validator = MessageValidator::new(ValidatorConfig::default());
    let msg = position("m-1", NOW);
    assert!(validator.validate(&msg, NOW).is_ok());

    let err = validator.validate(&msg, NOW + 500).expect_err("duplicate");
    assert!(err.has(ValidationCode::Duplicate));

    assert!(validator.validate(&msg, NOW + 2_000).is_ok());
}

#[test]
fn rejected_message_does_not_poison_duplicate_cache() {
    let mut validator = MessageValidator::new(ValidatorConfig::default());
    let mut bad = position("m-1", NOW);
    bad.content.insert("speed".to_string(), json!(-1));
    assert!(validator.validate(&bad, NOW).is_err());
    assert!(validator.validate(&position("m-1", NOW), NOW + 10).is_ok());
}

#[test]
fn sequence_numbers_must_increase_per_sender() {
    let mut validator = MessageValidator::new(ValidatorConfig::default());
    let mut first = position("m-1", NOW);
    first.content.insert("sequence_number".to_string(), json!(7));
    assert!(validator.validate(&first, NOW).is_ok());

    let mut replayed = position("m-2", NOW);
    replayed
        .content
        .insert("sequence_number".to_string(), json!(7));
    let err = validator.validate(&replayed, NOW + 1).expect_err("replay");
    assert_eq!(err.codes(), vec![ValidationCode::OutOfSequence]);

    let mut other_sender = replayed.clone();
    other_sender.metadata.sender_id = "VEH_2".to_string();
    assert!(validator.validate(&other_sender, NOW + 2).is_ok());

    let mut garbage = position("m-3", NOW);
    garbage
        .content
        .insert("sequence_number".to_string(), json!("seven"));
    let err = validator.validate(&garbage, NOW + 3).expect_err("non numeric");
    assert_eq!(err.codes(), vec![ValidationCode::InvalidValue]);
}

#[test]
fn check_leaves_caches_untouched_until_commit() {
    let mut validator = MessageValidator::new(ValidatorConfig::default());
    let mut msg = position("m-1", NOW);
    msg.content
        .insert("sequence_number".to_string(), json!(1_000_000));

    assert!(validator.check(&msg, NOW).is_ok());
    assert!(validator.check(&msg, NOW + 10).is_ok());
    assert_eq!(validator.tracked_ids(), 0);
    assert_eq!(validator.tracked_senders(), 0);

    let mut next = position("m-2", NOW);
    next.content.insert("sequence_number".to_string(), json!(1));
    assert!(validator.check(&next, NOW + 20).is_ok());

    validator.commit(&msg, NOW + 30);
    assert_eq!(validator.tracked_ids(), 1);
    let err = validator.check(&msg, NOW + 40).expect_err("committed duplicate");
    assert!(err.codes().contains(&ValidationCode::Duplicate));
    let err = validator.check(&next, NOW + 40).expect_err("behind committed sequence");
    assert_eq!(err.codes(), vec![ValidationCode::OutOfSequence]);
}

#[test]
fn sweep_bounds_caches_by_age_and_cap() {
    let mut validator = MessageValidator::new(ValidatorConfig {
        max_tracked_ids: 3,
        ..ValidatorConfig::default()
    });
    for i in 0..5 {
        let msg = position(&format!("m-{i}"), NOW);
        assert!(validator.validate(&msg, NOW + i).is_ok());
    }
    assert_eq!(validator.tracked_ids(), 3);

    // Oldest ids were evicted, so they are no longer duplicates.
    assert!(validator.validate(&position("m-0", NOW), NOW + 10).is_ok());

    assert_eq!(validator.sweep(NOW + 10 + 10_001), 3);
    assert_eq!(validator.tracked_ids(), 0);
}

#[test]
fn reaccepted_id_survives_sweep_of_its_older_entry() {
    let mut validator = MessageValidator::new(ValidatorConfig::default());
    let msg = position("m-1", NOW);
    assert!(validator.validate(&msg, NOW).is_ok());
    let later = position("m-1", NOW + 9_000);
    assert!(validator.validate(&later, NOW + 9_000).is_ok());

    validator.sweep(NOW + 12_000);
    assert_eq!(validator.tracked_ids(), 1);
    let err = validator
        .validate(&later, NOW + 9_500)
        .expect_err("still tracked");
    assert!(err.has(ValidationCode::Duplicate));
}

fn constraint_details(ty: MessageType, content: Value) -> Vec<String> {
    let mut validator = MessageValidator::new(ValidatorConfig::default());
    match validator.validate(&message("c", "RSU_1", ty, NOW, content), NOW) {
        Ok(()) => Vec::new(),
        Err(err) => err.violations.iter().map(|v| v.detail.clone()).collect(),
    }
}

#[test]
fn emergency_alert_constraints() {
    let ok = json!({
        "alert_type": "COLLISION",
        "severity": "CRITICAL",
        "location": {"latitude": 1.0, "longitude": 2.0, "radius": 500}
    });
    assert!(constraint_details(MessageType::EmergencyAlert, ok).is_empty());

    let bad = json!({
        "alert_type": "ALIENS",
        "severity": "EXTREME",
        "location": {"latitude": 1.0, "longitude": 2.0}
    });
    let details = constraint_details(MessageType::EmergencyAlert, bad);
    assert_eq!(details.len(), 3, "{details:?}");
    assert!(details[2].contains("latitude, longitude and radius"));

    let wide = json!({
        "alert_type": "WEATHER",
        "severity": "LOW",
        "location": {"latitude": 1.0, "longitude": 2.0, "radius": 10_001}
    });
    assert_eq!(constraint_details(MessageType::EmergencyAlert, wide).len(), 1);
}

#[test]
fn traffic_segment_length_is_optional_but_positive() {
    let base = json!({"road_id": "A1", "congestion_level": 40, "average_speed": 80});
    assert!(constraint_details(MessageType::TrafficInfo, base.clone()).is_empty());

    let mut zero = base;
    zero["segment_length"] = json!(0);
    let details = constraint_details(MessageType::TrafficInfo, zero);
    assert_eq!(details, vec!["segment_length 0 outside (0, 10000]".to_string()]);
}

#[test]
fn infrastructure_health_and_maintenance_constraints() {
    let content = json!({
        "device_id": "RSU_1",
        "status": "DEGRADED",
        "health": {"battery_level": 101, "signal_strength": 50},
        "maintenance_data": {"last_check": NOW + 60_000}
    });
    let details = constraint_details(MessageType::InfrastructureStatus, content);
    assert_eq!(details.len(), 2, "{details:?}");
    assert!(details[0].starts_with("health.battery_level"));
    assert!(details[1].contains("in the future"));

    let no_signal = json!({
        "device_id": "RSU_1",
        "status": "OFFLINE",
        "health": {"battery_level": 10}
    });
    assert_eq!(
        constraint_details(MessageType::InfrastructureStatus, no_signal),
        vec!["health.signal_strength is missing".to_string()]
    );
}

#[test]
fn safety_warning_duration_and_area_width() {
    let content = json!({
        "warning_type": "ROAD_WORK",
        "duration": 0,
        "affected_area": {"start_point": [0, 0], "end_point": [1, 1], "width": 51}
    });
    let details = constraint_details(MessageType::SafetyWarning, content);
    assert_eq!(details.len(), 2, "{details:?}");

    let ok = json!({
        "warning_type": "ACCIDENT",
        "duration": 86_400,
        "affected_area": {"start_point": [0, 0], "end_point": [1, 1], "width": 3.5}
    });
    assert!(constraint_details(MessageType::SafetyWarning, ok).is_empty());
}

#[test]
fn control_command_parameters_depend_on_command_type() {
    let speed = json!({"command_type": "SPEED_LIMIT", "parameters": {"speed": 140}, "target_id": "VEH_1"});
    assert_eq!(constraint_details(MessageType::ControlCommand, speed).len(), 1);

    let lane = json!({"command_type": "LANE_CHANGE", "parameters": {}, "target_id": "VEH_1"});
    assert_eq!(
        constraint_details(MessageType::ControlCommand, lane),
        vec!["parameters.lane_offset is missing".to_string()]
    );

    let stop = json!({"command_type": "STOP", "parameters": {}, "target_id": "VEH_1"});
    assert!(constraint_details(MessageType::ControlCommand, stop).is_empty());

    let scalar = json!({"command_type": "STOP", "parameters": 3, "target_id": "VEH_1"});
    assert_eq!(constraint_details(MessageType::ControlCommand, scalar).len(), 1);
}

#[test]
fn rate_window_expires_old_admissions() {
    let mut window = RateWindow::new(2, 1_000);
    assert!(window.allow(0));
    assert!(window.allow(10));
    assert!(!window.allow(999));
    assert!(window.allow(1_000));
    assert_eq!(window.len(), 2);
}

#[test]
fn sender_rate_limiter_isolates_senders_and_sweeps_idle_ones() {
    let mut limiter = SenderRateLimiter::new(1, 1_000);
    assert!(limiter.allow("A", 0));
    assert!(!limiter.allow("A", 1));
    assert!(limiter.allow("B", 1));
    assert_eq!(limiter.sweep(500), 0);
    assert_eq!(limiter.sweep(1_000), 1);
    assert_eq!(limiter.tracked_senders(), 1);
}

#[test]
fn pattern_matchers_cover_each_operator() {
    let patterns = PatternSet::from_json(
        r#"[
            {"name": "teleport", "message_type": "position_update", "field": "speed", "matcher": {"op": "above", "value": 180}},
            {"name": "ghost-rsu", "sender_prefix": "RSU_X", "field": "status", "matcher": {"op": "equals", "value": "OFFLINE"}},
            {"name": "injection", "field": "road_id", "matcher": {"op": "contains", "value": "<script"}},
            {"name": "debug-flag", "field": "debug.override", "matcher": {"op": "present"}}
        ]"#,
    )
    .expect("patterns");
    assert_eq!(patterns.len(), 4);

    let mut fast = position("m-1", NOW);
    assert!(patterns.first_match(&fast).is_none());
    fast.content.insert("speed".to_string(), json!(190));
    assert_eq!(patterns.first_match(&fast).map(|p| p.name.as_str()), Some("teleport"));

    let mut content = Content::new();
    content.insert("status".to_string(), json!("OFFLINE"));
    let rsu = Message::new(
        MessageMetadata {
            sender_id: "RSU_X9".to_string(),
            ..position("m-2", NOW).metadata
        },
        content,
    );
    assert_eq!(patterns.first_match(&rsu).map(|p| p.name.as_str()), Some("ghost-rsu"));

    let mut flagged = position("m-3", NOW);
    flagged
        .content
        .insert("debug".to_string(), json!({"override": false}));
    assert_eq!(patterns.first_match(&flagged).map(|p| p.name.as_str()), Some("debug-flag"));

    let traffic = message(
        "m-4",
        "VEH_1",
        MessageType::TrafficInfo,
        NOW,
        json!({"road_id": "A1<script>", "congestion_level": 1, "average_speed": 1}),
    );
    assert_eq!(patterns.first_match(&traffic).map(|p| p.name.as_str()), Some("injection"));
}

#[test]
fn malformed_patterns_are_rejected_at_load() {
    let err = PatternSet::from_json(
        r#"[{"name": "bad", "field": "a..b", "matcher": {"op": "present"}}]"#,
    )
    .expect_err("malformed path");
    assert!(matches!(err, LoadError::Invalid(_)));

    let err = PatternSet::from_json(r#"[{"name": "x"}]"#).expect_err("missing fields");
    assert!(matches!(err, LoadError::Parse(_)));
}

#[test]
fn hex_material_decoding() {
    assert_eq!(decode_hex_bytes("0xDEad"), Some(vec![0xde, 0xad]));
    assert_eq!(decode_hex_bytes("abc"), None);
    assert_eq!(decode_hex_bytes("zz"), None);
    assert_eq!(encode_hex(&[0, 255]), "00ff");
    assert!(parse_ed25519_key_material(b"00").is_none());
    assert!(parse_ed25519_key_material("11".repeat(32).as_bytes()).is_some());
}
