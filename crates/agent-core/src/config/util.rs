use std::str::FromStr;

pub(super) fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

pub(super) fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| non_empty(Some(v)))
}

/// Unparseable values are ignored, leaving the previous layer in place.
pub(super) fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env_non_empty(name).and_then(|v| v.trim().parse::<T>().ok())
}

pub(super) fn env_bool(name: &str) -> Option<bool> {
    env_non_empty(name).map(|v| parse_bool(&v))
}

pub(super) fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "enabled" | "on"
    )
}
