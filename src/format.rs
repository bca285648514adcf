use chrono::{DateTime, Local, TimeZone};
use serde_json::Value;

const SHORT_ID_LEN: usize = 8;

pub fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

/// Pretty-prints a raw JSON document into display lines. Input that is not
/// JSON is passed through line by line.
pub fn pretty_print_as_lines(raw: &str) -> Vec<String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => pretty_value_lines(&value),
        Err(_) => raw.lines().map(str::to_string).collect(),
    }
}

pub fn pretty_value_lines(value: &Value) -> Vec<String> {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|error| format!("failed to format value: {error}"))
        .lines()
        .map(str::to_string)
        .collect()
}

/// Formats a Nomad timestamp (nanoseconds since the epoch) in local time.
pub fn format_nanos(nanos: i64) -> String {
    if nanos <= 0 {
        return "-".to_string();
    }
    let seconds = nanos.div_euclid(1_000_000_000);
    let subsec = nanos.rem_euclid(1_000_000_000) as u32;
    match Local.timestamp_opt(seconds, subsec).single() {
        Some(time) => time.format("%Y-%m-%dT%H:%M:%S").to_string(),
        None => "-".to_string(),
    }
}

/// Formats an RFC 3339 timestamp as reported in task states.
pub fn format_rfc3339(value: Option<&str>) -> String {
    let Some(value) = value.filter(|value| !value.is_empty()) else {
        return "-".to_string();
    };
    match DateTime::parse_from_rfc3339(value) {
        // task states report the zero time for tasks that never finished
        Ok(time) if time.timestamp() <= 0 => "-".to_string(),
        Ok(time) => time
            .with_timezone(&Local)
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string(),
        Err(_) => value.to_string(),
    }
}

pub fn strings<const N: usize>(values: [&str; N]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
