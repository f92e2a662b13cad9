//! Wall-clock helper
//!
//! Codes and tokens record unix seconds, matching the `create_at` field of
//! the serialized token.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in whole seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
