//! Time helpers used by the run identity and exports.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Local;

/// Current timestamp in whole seconds since the Unix epoch.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Local wall-clock time at second resolution, safe for directory names.
pub fn timestamp_suffix() -> String {
    Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}
