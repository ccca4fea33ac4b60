use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as whole seconds since the Unix epoch (§4.4, §4.5
/// Open Question 3). Truncates, matching the integer-seconds timestamp
/// semantics used throughout the derived-quantity graph.
pub fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs() as i64
}
