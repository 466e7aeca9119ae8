use std::sync::Arc;

use protocol::{Content, Message, MessageMetadata, MessageType};
use serde_json::{json, Value};

use crate::features::{self, MESSAGE_RATE, POSITION_JUMP};
use crate::math::{haversine_m, robust_z, sigmoid};
use crate::*;

fn content(value: Value) -> Content {
    value.as_object().cloned().expect("object content")
}

fn message(id: &str, kind: MessageType, ts: i64, body: Value) -> Arc<Message> {
    Arc::new(Message::new(
        MessageMetadata {
            message_id: id.to_string(),
            sender_id: "VEH_1".to_string(),
            message_type: kind,
            timestamp_ms: ts,
            priority_hint: 3,
            hop_count: 0,
            signature: None,
            previous_hop: None,
        },
        content(body),
    ))
}

fn position(id: &str, ts: i64, lat: f64, lon: f64, speed: f64) -> Arc<Message> {
    message(
        id,
        MessageType::PositionUpdate,
        ts,
        json!({
            "position": { "latitude": lat, "longitude": lon },
            "speed": speed,
            "direction": 90.0,
        }),
    )
}

fn history_of(capacity: usize, messages: &[(Arc<Message>, i64)]) -> NodeHistory {
    let mut history = NodeHistory::new(capacity);
    for (message, received) in messages {
        history.record(Observation::new(Arc::clone(message), *received));
    }
    history
}

#[test]
fn sliding_window_evicts_oldest_first() {
    let mut window = SlidingWindow::new(3);
    assert_eq!(window.push(1), None);
    window.push(2);
    window.push(3);
    assert_eq!(window.push(4), Some(1));
    assert_eq!(window.to_vec(), vec![2, 3, 4]);
    assert_eq!(window.tail(2).copied().collect::<Vec<_>>(), vec![3, 4]);
    assert_eq!(window.latest(), Some(&4));
}

#[test]
fn zero_capacity_window_still_holds_latest() {
    let mut window = SlidingWindow::new(0);
    window.push("a");
    window.push("b");
    assert_eq!(window.to_vec(), vec!["b"]);
}

#[test]
fn redelivered_message_replaces_its_history_entry() {
    let first = position("m1", 0, 52.0, 13.0, 50.0);
    let mut history = history_of(10, &[(Arc::clone(&first), 0)]);
    history.record(Observation::new(Arc::clone(&first), 5_000));

    assert_eq!(history.len(), 1);
    assert_eq!(history.latest().map(|obs| obs.received_ms), Some(5_000));
}

#[test]
fn annotate_sets_detection_score_on_matching_entry() {
    let first = position("m1", 0, 52.0, 13.0, 50.0);
    let other = position("m2", 1_000, 52.0, 13.0, 50.0);
    let mut history = history_of(10, &[(Arc::clone(&first), 0)]);

    assert!(history.annotate(&first, 0.42));
    assert!(!history.annotate(&other, 0.9));
    assert_eq!(history.latest().and_then(|obs| obs.detection_score), Some(0.42));
}

#[test]
fn feature_vector_is_zero_padded_to_window_capacity() {
    let history = history_of(
        5,
        &[
            (position("m1", 0, 52.0, 13.0, 50.0), 0),
            (position("m2", 1_000, 52.0, 13.0, 50.0), 1_000),
        ],
    );
    let vector = history.features();

    assert_eq!(vector.sequence.len(), 5 * MESSAGE_FEATURES);
    assert_eq!(vector.capacity(), 5);
    assert_eq!(vector.observed, 2);
    assert_eq!(vector.observed_rows().count(), 2);
    for slot in 2..5 {
        assert!(vector.row(slot).expect("row").iter().all(|v| *v == 0.0));
    }
    assert!(vector.row(5).is_none());
}

#[test]
fn empty_history_yields_all_zero_features() {
    let vector = NodeHistory::new(4).features();
    assert_eq!(vector.observed, 0);
    assert_eq!(vector.sequence.len(), 4 * MESSAGE_FEATURES);
    assert!(vector.summary.iter().all(|v| *v == 0.0));
}

#[test]
fn per_type_table_normalises_position_values() {
    let row = features::message_features(&position("m1", 0, 0.0, 0.0, 50.0));
    assert_eq!(row[0], 1.0 / 6.0);
    assert_eq!(row[1], 0.25);
    assert_eq!(row[2], 0.25);
    assert_eq!(row[3], 0.5);
    assert_eq!(row[4], 0.5);

    let stop = message(
        "c1",
        MessageType::ControlCommand,
        0,
        json!({ "command_type": "STOP", "parameters": {}, "target_id": "VEH_9" }),
    );
    let row = features::message_features(&stop);
    assert_eq!(row[0], 1.0);
    assert_eq!(row[1], 1.0);
}

#[test]
fn implausible_position_jump_is_flagged() {
    // One degree of latitude in one second.
    let history = history_of(
        10,
        &[
            (position("m1", 0, 52.0, 13.0, 50.0), 0),
            (position("m2", 1_000, 53.0, 13.0, 50.0), 1_000),
        ],
    );
    assert!((history.features().summary[POSITION_JUMP] - 0.3).abs() < 1e-9);
}

#[test]
fn burst_of_messages_raises_rate_signal() {
    let messages: Vec<(Arc<Message>, i64)> = (0..20)
        .map(|i| (position(&format!("m{i}"), i * 5, 52.0, 13.0, 40.0 + i as f64), i * 5))
        .collect();
    let history = history_of(50, &messages);
    assert_eq!(history.features().summary[MESSAGE_RATE], 0.9);
}

#[test]
fn repeated_content_counts_as_duplicate() {
    let history = history_of(
        10,
        &[
            (position("m1", 0, 52.0, 13.0, 50.0), 0),
            (position("m2", 1_000, 52.0, 13.0, 50.0), 1_000),
            (position("m3", 2_000, 52.0, 13.0, 50.0), 2_000),
        ],
    );
    let summary = history.features().summary;
    assert_eq!(summary[3], 1.0);
    assert_eq!(summary[4], 0.0);
}

#[test]
fn math_helpers_behave() {
    assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
    assert!(sigmoid(1_000.0).is_finite());
    assert!(sigmoid(-1_000.0).is_finite());
    assert_eq!(robust_z(100.0, &[1.0, 2.0, 3.0]), 0.0);
    let history: Vec<f64> = (0..20).map(|i| i as f64).collect();
    assert!(robust_z(100.0, &history) > 5.0);
    let metres = haversine_m(0.0, 0.0, 1.0, 0.0);
    assert!((metres - 111_195.0).abs() < 100.0);
}

#[test]
fn default_detector_model_validates() {
    let model = DetectorModel::default();
    model.validate().expect("default model");
    assert_eq!(model.weights.len(), SUMMARY_FEATURES);
}

#[test]
fn detector_model_rejects_malformed_weights() {
    let mut model = DetectorModel::default();
    model.weights.pop();
    assert!(matches!(
        model.validate(),
        Err(ModelError::DimensionMismatch { expected: 8, got: 7 })
    ));

    let mut model = DetectorModel::default();
    model.weights[2] = f64::NAN;
    assert!(matches!(
        model.validate(),
        Err(ModelError::NonFiniteWeight { index: 2, .. })
    ));

    let mut model = DetectorModel::default();
    model.threshold = 1.5;
    assert!(matches!(model.validate(), Err(ModelError::InvalidThreshold(_))));

    let mut model = DetectorModel::default();
    model.feature_names.reverse();
    assert!(matches!(model.validate(), Err(ModelError::FeatureOrder)));
}

#[test]
fn detector_model_loads_from_json() {
    let json = serde_json::to_string(&DetectorModel::default()).expect("serialize");
    let loaded = DetectorModel::from_json(&json).expect("load");
    assert_eq!(loaded.bias, -3.0);
    assert!(matches!(
        DetectorModel::from_json("{not json"),
        Err(ModelError::ParseJson(_))
    ));
}

#[test]
fn quiet_sender_scores_below_threshold() {
    let history = history_of(
        10,
        &[
            (position("m1", 0, 52.0, 13.0, 50.0), 0),
            (position("m2", 1_000, 52.0001, 13.0, 52.0), 1_000),
        ],
    );
    let result = LinearDetector::new()
        .score(&history.features())
        .expect("score");
    assert!(result.score < 0.1, "score {}", result.score);
    assert!(!result.positive);
    assert!(result.label.is_none());
    assert_eq!(result.metadata["model_id"], "roadguard-default-v1");
}

#[test]
fn flooding_sender_is_labelled_by_dominant_signal() {
    let messages: Vec<(Arc<Message>, i64)> = (0..20)
        .map(|i| (position(&format!("m{i}"), i * 5, 52.0, 13.0, 40.0 + i as f64), i * 5))
        .collect();
    let history = history_of(50, &messages);
    let result = LinearDetector::new()
        .score(&history.features())
        .expect("score");
    assert!(result.score >= 0.75, "score {}", result.score);
    assert!(result.positive);
    assert_eq!(result.label.as_deref(), Some("message_flooding"));
}

#[test]
fn analyzer_combines_sub_scores_with_fixed_weights() {
    let all = SubScores {
        base: 1.0,
        temporal: 1.0,
        spatial: 1.0,
        context: 1.0,
    };
    assert!((all.combined() - 1.0).abs() < 1e-12);

    let base_only = SubScores {
        base: 0.5,
        temporal: 0.0,
        spatial: 0.0,
        context: 0.0,
    };
    assert!((base_only.combined() - 0.2).abs() < 1e-12);
    assert_eq!(base_only.classification(), "data_injection");

    let spatial = SubScores {
        base: 0.1,
        temporal: 0.1,
        spatial: 0.9,
        context: 0.2,
    };
    assert_eq!(spatial.classification(), "position_spoofing");
}

#[test]
fn analyzer_flags_reported_speed_that_contradicts_movement() {
    // Roughly 111 km covered per second while reporting 50 km/h.
    let messages: Vec<(Arc<Message>, i64)> = (0..4)
        .map(|i| {
            (
                position(&format!("m{i}"), i * 1_000, 50.0 + i as f64, 13.0, 50.0),
                i * 1_000,
            )
        })
        .collect();
    let history = history_of(10, &messages);
    let features = history.features();
    let detection = LinearDetector::new().score(&features).expect("detect");
    let input = AnalysisInput {
        message: Arc::clone(&messages[3].0),
        features,
        window: history.observations().cloned().collect(),
        detection,
    };
    let analyzer = WindowAnalyzer::default();
    let parts = analyzer.sub_scores(&input);
    assert!(parts.spatial > 0.9, "spatial {}", parts.spatial);

    let result = analyzer.score(&input).expect("analyze");
    assert!((0.0..=1.0).contains(&result.score));
    assert!(result.metadata.contains_key("components"));
}

#[test]
fn transform_summarises_session() {
    let messages: Vec<Arc<Message>> = (0..6)
        .map(|i| position(&format!("m{i}"), i * 1_000, 52.0, 13.0, 50.0))
        .collect();
    let input = SequenceInput {
        sender_id: "VEH_1".to_string(),
        messages,
        session_started_ms: 0,
        detection_score: 0.8,
        anomaly_score: 0.9,
    };
    let result = SequenceTransform::new().score(&input).expect("transform");
    assert_eq!(result.score, 0.0);
    assert!(!result.positive);
    assert_eq!(result.metadata["risk_assessment"]["level"], "low");
    assert_eq!(result.metadata["classification"]["position_update"], 1.0);
    assert_eq!(
        result.metadata["embedding"].as_array().map(Vec::len),
        Some(2 * MESSAGE_FEATURES)
    );
}

#[test]
fn transform_rejects_empty_session() {
    let input = SequenceInput {
        sender_id: "VEH_1".to_string(),
        messages: Vec::new(),
        session_started_ms: 0,
        detection_score: 0.0,
        anomaly_score: 0.0,
    };
    let err = SequenceTransform::new().score(&input).expect_err("empty");
    assert_eq!(err.oracle, TRANSFORM_NAME);
}

#[test]
fn risk_levels_follow_score_bands() {
    assert_eq!(RiskLevel::from_score(0.1), RiskLevel::Low);
    assert_eq!(RiskLevel::from_score(0.4), RiskLevel::Medium);
    assert_eq!(RiskLevel::from_score(0.7), RiskLevel::High);
}

#[test]
fn combiner_reports_detector_only_for_quiet_message() {
    let outputs = StageOutputs {
        detection: OracleScore::new(0.2, false),
        analysis: None,
        transform: None,
    };
    let verdict = combine(&outputs, 0.8, &RecommendationTemplates::default());

    assert!(!verdict.threat_detected);
    assert_eq!(verdict.confidence, 0.2);
    assert!(verdict.threat_type.is_none());
    assert_eq!(verdict.stages().collect::<Vec<_>>(), vec!["detection"]);
    assert_eq!(verdict.recommendations, vec![NO_ACTION_RECOMMENDATION.to_string()]);
}

#[test]
fn combiner_uses_analyzer_label_when_detector_has_none() {
    let outputs = StageOutputs {
        detection: OracleScore::new(0.8, false),
        analysis: Some(OracleScore::new(0.9, true).with_label("position_spoofing")),
        transform: Some(OracleScore::new(0.5, false)),
    };
    let verdict = combine(&outputs, 0.8, &RecommendationTemplates::default());

    assert!(verdict.threat_detected);
    assert_eq!(verdict.confidence, 0.9);
    assert_eq!(verdict.threat_type.as_deref(), Some("position_spoofing"));
    assert_eq!(
        verdict.stages().collect::<Vec<_>>(),
        vec!["analysis", "detection", "transform"]
    );
    assert_eq!(verdict.recommendations[0], "Initiate position verification protocol");
    assert!(!verdict
        .recommendations
        .iter()
        .any(|rec| rec == URGENT_RECOMMENDATION));
}

#[test]
fn high_confidence_prepends_urgent_clause() {
    let outputs = StageOutputs {
        detection: OracleScore::new(0.95, true).with_label("message_flooding"),
        analysis: None,
        transform: None,
    };
    let verdict = combine(&outputs, 0.8, &RecommendationTemplates::default());
    assert_eq!(verdict.recommendations[0], URGENT_RECOMMENDATION);
    assert_eq!(
        verdict.recommendations[1],
        "Implement rate limiting for affected node"
    );
}

#[test]
fn confident_clean_verdict_is_not_urgent() {
    let outputs = StageOutputs {
        detection: OracleScore::new(0.95, false),
        analysis: Some(OracleScore::new(0.4, false)),
        transform: None,
    };
    let verdict = combine(&outputs, 0.8, &RecommendationTemplates::default());

    assert!(!verdict.threat_detected);
    assert_eq!(verdict.confidence, 0.95);
    assert_eq!(verdict.recommendations, vec![NO_ACTION_RECOMMENDATION.to_string()]);
}

#[test]
fn unknown_threat_type_falls_back_to_general_measures() {
    let outputs = StageOutputs {
        detection: OracleScore::new(0.7, true).with_label("behavioral_anomaly"),
        analysis: None,
        transform: None,
    };
    let verdict = combine(&outputs, 0.8, &RecommendationTemplates::default());
    assert_eq!(verdict.recommendations[0], FALLBACK_RECOMMENDATION);
}

#[test]
fn template_overrides_replace_defaults() {
    let mut templates = RecommendationTemplates::default();
    templates.set("replay_attack", vec!["Rotate keys".to_string()]);
    let outputs = StageOutputs {
        detection: OracleScore::new(0.5, true).with_label("replay_attack"),
        analysis: None,
        transform: None,
    };
    let verdict = combine(&outputs, 0.8, &templates);
    assert_eq!(verdict.recommendations, vec!["Rotate keys".to_string()]);
}

#[tokio::test]
async fn registry_returns_one_handle_per_sender_and_bounds_senders() {
    let registry = SenderRegistry::new(HistoryConfig {
        max_senders: 2,
        ..HistoryConfig::default()
    });
    let a = registry.handle("a").expect("a");
    let again = registry.handle("a").expect("a again");
    assert!(Arc::ptr_eq(&a, &again));
    drop((a, again));

    registry.handle("b").expect("b");
    registry.handle("c").expect("c");
    assert_eq!(registry.len(), 2);
    assert!(registry.get("a").expect("get").is_none());
}

#[tokio::test]
async fn registry_never_evicts_a_sender_that_is_being_processed() {
    let registry = SenderRegistry::new(HistoryConfig {
        max_senders: 1,
        ..HistoryConfig::default()
    });
    let busy = registry.handle("a").expect("a");
    let guard = busy.lock().await;

    registry.handle("b").expect("b");
    let held = registry.handle("c").expect("c");
    assert_eq!(registry.len(), 2);
    assert!(registry.get("b").expect("get").is_none());
    let still_there = registry.get("a").expect("get").expect("a kept while busy");
    assert!(Arc::ptr_eq(&busy, &still_there));
    drop(still_there);

    let also_held = registry.handle("d").expect("d");
    assert_eq!(registry.len(), 3);
    assert!(registry.handle("a").expect("a again").try_lock().is_err());

    drop(guard);
    drop(busy);
    drop((held, also_held));
    registry.handle("e").expect("e");
    assert_eq!(registry.len(), 1);
    assert!(registry.get("e").expect("get").is_some());
}

#[tokio::test]
async fn session_is_seeded_from_history_then_appended() {
    let registry = SenderRegistry::new(HistoryConfig {
        max_sequence_length: 3,
        ..HistoryConfig::default()
    });
    let handle = registry.handle("VEH_1").expect("handle");
    let mut state = handle.lock().await;
    for i in 0..2 {
        state.observe(&position(&format!("m{i}"), i * 1_000, 52.0, 13.0, 50.0), i * 1_000);
    }
    assert!(state.session.is_none());

    let seeded = state.session_or_seed(2_000);
    assert_eq!(seeded.len(), 2);
    assert_eq!(seeded.started_ms(), 2_000);

    for i in 2..5 {
        state.observe(&position(&format!("m{i}"), i * 1_000, 52.0, 13.0, 50.0), i * 1_000);
    }
    let session = state.session.as_ref().expect("session");
    let ids: Vec<String> = session.messages().iter().map(|m| m.id().to_string()).collect();
    assert_eq!(ids, vec!["m2", "m3", "m4"]);
    assert_eq!(session.last_update_ms(), 4_000);
    assert_eq!(state.history.len(), 5);
}

#[tokio::test]
async fn idle_sessions_are_evicted_after_ttl() {
    let registry = SenderRegistry::new(HistoryConfig {
        session_ttl_ms: 1_000,
        ..HistoryConfig::default()
    });
    let handle = registry.handle("VEH_1").expect("handle");
    {
        let mut state = handle.lock().await;
        state.observe(&position("m1", 0, 52.0, 13.0, 50.0), 0);
        state.session_or_seed(0);
    }
    assert_eq!(registry.open_sessions(), 1);
    assert_eq!(registry.evict_idle_sessions(999).expect("sweep"), 0);
    assert_eq!(registry.evict_idle_sessions(1_000).expect("sweep"), 1);
    assert_eq!(registry.open_sessions(), 0);
    assert_eq!(handle.lock().await.history.len(), 1);
}

#[tokio::test]
async fn busy_sender_is_skipped_by_session_sweep() {
    let registry = SenderRegistry::new(HistoryConfig {
        session_ttl_ms: 10,
        ..HistoryConfig::default()
    });
    let handle = registry.handle("VEH_1").expect("handle");
    let mut state = handle.lock().await;
    state.session_or_seed(0);
    assert_eq!(registry.evict_idle_sessions(100).expect("sweep"), 0);
    assert!(state.session.is_some());
}
