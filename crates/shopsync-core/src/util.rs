//! Shared utility functions used across multiple modules.

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Normalize optional text by trimming whitespace and removing empties.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current Unix timestamp in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Cutoff timestamp (Unix ms) lying `days` days before `now`.
pub const fn days_before(now: i64, days: i64) -> i64 {
    now.saturating_sub(days.saturating_mul(MILLIS_PER_DAY))
}
