pub(super) const CONFIG_PATH_ENV: &str = "ROADGUARD_AGENT_CONFIG";

pub(super) const AGENT_CONFIG_CANDIDATES: [&str; 3] = [
    "/etc/roadguard/agent.toml",
    "./conf/agent.toml",
    "./agent.toml",
];

pub(super) const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;
pub(super) const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 30_000;
