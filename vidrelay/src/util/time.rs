use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

/// Source of the current Unix time in seconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Get the current time as a UTC datetime.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Clock backed by the system wall time.
pub fn system_clock() -> Clock {
    Arc::new(|| Utc::now().timestamp())
}

/// Convert Unix seconds into a UTC datetime, if representable.
pub fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// Human readable UTC rendering of Unix seconds (e.g. `2026-02-08 05:00:00 UTC`).
pub fn format_unix(secs: i64) -> String {
    match from_unix(secs) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => format!("{secs} (out of range)"),
    }
}
