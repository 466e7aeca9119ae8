use super::*;
use std::io::Write;
use std::sync::{Mutex, OnceLock};

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn clear_env() {
    let vars = [
        "ROADGUARD_AGENT_CONFIG",
        "ROADGUARD_MAX_MESSAGE_AGE_MS",
        "ROADGUARD_CLOCK_SKEW_TOLERANCE_MS",
        "ROADGUARD_DUPLICATE_WINDOW_MS",
        "ROADGUARD_REQUIRE_SIGNATURE",
        "ROADGUARD_REQUIRE_TRUSTED_SENDER",
        "ROADGUARD_RATE_LIMIT_MESSAGES",
        "ROADGUARD_RATE_LIMIT_WINDOW_MS",
        "ROADGUARD_KEYRING",
        "ROADGUARD_PATTERNS",
        "ROADGUARD_QUEUE_CAPACITY",
        "ROADGUARD_MAX_RETRIES",
        "ROADGUARD_PROCESSING_TIMEOUT_MS",
        "ROADGUARD_RETENTION_MS",
        "ROADGUARD_ANALYSIS_THRESHOLD",
        "ROADGUARD_TRANSFORM_THRESHOLD",
        "ROADGUARD_THREAT_THRESHOLD",
        "ROADGUARD_ORACLE_TIMEOUT_MS",
        "ROADGUARD_WORKERS",
        "ROADGUARD_ENQUEUE_WAIT_MS",
        "ROADGUARD_MODEL",
        "ROADGUARD_INGEST_PATH",
        "ROADGUARD_INGEST_MAX_LINE_BYTES",
    ];
    for v in vars {
        std::env::remove_var(v);
    }
}

fn write_config(body: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!(
        "roadguard-agent-config-{}.toml",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default()
    ));
    let mut f = std::fs::File::create(&path).expect("create file");
    f.write_all(body.as_bytes()).expect("write file");
    path
}

#[test]
fn defaults_match_documented_values() {
    let cfg = AgentConfig::default();
    cfg.validate().expect("defaults validate");
    assert_eq!(cfg.validator.max_message_age_ms, 5_000);
    assert_eq!(cfg.validator.duplicate_window_ms, 1_000);
    assert_eq!(cfg.security.rate_limit_messages, 50);
    assert_eq!(cfg.queue.max_retries, 3);
    assert_eq!(cfg.queue.processing_timeout_ms, 30_000);
    assert_eq!(cfg.pipeline.analysis_threshold, 0.75);
    assert_eq!(cfg.history.history_window, 100);
    assert!(cfg.ingest.path.is_none());
    assert!(cfg.keyring_path.is_none());
}

#[test]
fn file_config_is_loaded() {
    let _guard = env_lock().lock().expect("env lock");
    clear_env();

    let path = write_config(
        r#"
[validator]
max_message_age_ms = 8000
clock_skew_tolerance_ms = 50

[security]
require_signature = false
keyring_path = "/etc/roadguard/keyring.json"

[security.rate_limit]
max_messages = 20
window_ms = 2000

[queue]
capacity_per_priority = 64
max_retries = 5

[queue.health]
failure_rate_threshold = 0.2

[pipeline]
analysis_threshold = 0.6
worker_count = 2
model_path = "/etc/roadguard/model.json"

[history]
history_window = 40
session_ttl_ms = 1000

[ingest]
path = "/var/log/roadguard/feed.jsonl"

[recommendations]
impersonation = ["Quarantine the sender certificate"]
"#,
    );

    std::env::set_var("ROADGUARD_AGENT_CONFIG", &path);
    let cfg = AgentConfig::load().expect("load config");

    assert_eq!(cfg.validator.max_message_age_ms, 8_000);
    assert_eq!(cfg.validator.clock_skew_tolerance_ms, 50);
    assert_eq!(cfg.validator.duplicate_window_ms, 1_000);
    assert!(!cfg.security.require_signature);
    assert!(cfg.security.require_trusted_sender);
    assert_eq!(cfg.security.rate_limit_messages, 20);
    assert_eq!(cfg.security.rate_limit_window_ms, 2_000);
    assert_eq!(cfg.queue.capacity_per_priority, 64);
    assert_eq!(cfg.queue.max_retries, 5);
    assert_eq!(cfg.queue.failure_rate_threshold, 0.2);
    assert_eq!(cfg.pipeline.analysis_threshold, 0.6);
    assert_eq!(cfg.pipeline.worker_count, 2);
    assert_eq!(cfg.history.history_window, 40);
    assert_eq!(cfg.history.session_ttl_ms, 1_000);
    assert_eq!(cfg.history.max_sequence_length, 50);
    assert_eq!(cfg.ingest.path.as_deref(), Some("/var/log/roadguard/feed.jsonl"));
    assert_eq!(
        cfg.keyring_path.as_deref(),
        Some("/etc/roadguard/keyring.json")
    );
    assert_eq!(cfg.model_path.as_deref(), Some("/etc/roadguard/model.json"));
    assert_eq!(
        cfg.recommendations.for_type("impersonation"),
        Some(&["Quarantine the sender certificate".to_string()][..])
    );
    assert!(cfg.recommendations.for_type("replay_attack").is_some());

    clear_env();
    let _ = std::fs::remove_file(path);
}

#[test]
fn env_overrides_file_config() {
    let _guard = env_lock().lock().expect("env lock");
    clear_env();

    let path = write_config("[queue]\nmax_retries = 5\n[pipeline]\nworker_count = 2\n");
    std::env::set_var("ROADGUARD_AGENT_CONFIG", &path);
    std::env::set_var("ROADGUARD_MAX_RETRIES", "1");
    std::env::set_var("ROADGUARD_WORKERS", "8");
    std::env::set_var("ROADGUARD_REQUIRE_SIGNATURE", "off");
    std::env::set_var("ROADGUARD_INGEST_PATH", "/tmp/feed.jsonl");
    std::env::set_var("ROADGUARD_PATTERNS", "/tmp/patterns.json");

    let cfg = AgentConfig::load().expect("load config");
    assert_eq!(cfg.queue.max_retries, 1);
    assert_eq!(cfg.pipeline.worker_count, 8);
    assert!(!cfg.security.require_signature);
    assert_eq!(cfg.ingest.path.as_deref(), Some("/tmp/feed.jsonl"));
    assert_eq!(cfg.patterns_path.as_deref(), Some("/tmp/patterns.json"));

    clear_env();
    let _ = std::fs::remove_file(path);
}

#[test]
fn unparseable_env_values_are_ignored() {
    let _guard = env_lock().lock().expect("env lock");
    clear_env();

    std::env::set_var("ROADGUARD_QUEUE_CAPACITY", "lots");
    std::env::set_var("ROADGUARD_THREAT_THRESHOLD", "");
    let cfg = AgentConfig::load().expect("load config");
    assert_eq!(cfg.queue.capacity_per_priority, 10_000);
    assert_eq!(cfg.pipeline.threat_threshold, 0.8);

    clear_env();
}

#[test]
fn inverted_thresholds_fail_to_load() {
    let _guard = env_lock().lock().expect("env lock");
    clear_env();

    std::env::set_var("ROADGUARD_ANALYSIS_THRESHOLD", "0.9");
    std::env::set_var("ROADGUARD_TRANSFORM_THRESHOLD", "0.5");
    let err = AgentConfig::load().expect_err("threshold order");
    assert!(format!("{err:#}").contains("analysis_threshold"));

    clear_env();
}

#[test]
fn zero_capacity_fails_validation() {
    let mut cfg = AgentConfig::default();
    cfg.queue.capacity_per_priority = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn missing_configured_file_is_an_error() {
    let _guard = env_lock().lock().expect("env lock");
    clear_env();

    std::env::set_var("ROADGUARD_AGENT_CONFIG", "/nonexistent/roadguard/agent.toml");
    let err = AgentConfig::load().expect_err("missing file");
    assert!(err.to_string().contains("ROADGUARD_AGENT_CONFIG"));

    clear_env();
}

#[test]
fn malformed_toml_reports_the_path() {
    let _guard = env_lock().lock().expect("env lock");
    clear_env();

    let path = write_config("[queue\nmax_retries = ");
    std::env::set_var("ROADGUARD_AGENT_CONFIG", &path);
    let err = AgentConfig::load().expect_err("bad toml");
    assert!(err.to_string().contains("failed parsing TOML config"));

    clear_env();
    let _ = std::fs::remove_file(path);
}

#[test]
fn parse_bool_accepts_common_spellings() {
    for raw in ["1", "true", "YES", " enabled ", "on"] {
        assert!(parse_bool(raw), "{raw}");
    }
    for raw in ["0", "false", "no", "off", "maybe"] {
        assert!(!parse_bool(raw), "{raw}");
    }
}
