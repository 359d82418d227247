//! Small shared helpers.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in seconds. Clamps to zero on a clock before the epoch
/// rather than failing; every consumer treats timestamps as best-effort
/// wall-clock.
pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
