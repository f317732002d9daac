//! Human-readable rendering of key timestamps.
//!
//! State is stored in UTC. A fixed display offset is applied here and
//! nowhere else.

use chrono::{DateTime, FixedOffset, Offset, Utc};

const SECONDS_PER_HOUR: i32 = 3600;

/// Build a fixed offset from whole hours, clamping to the valid range.
pub fn display_offset(hours: i32) -> FixedOffset {
    let hours = hours.clamp(-12, 14);
    FixedOffset::east_opt(hours * SECONDS_PER_HOUR).unwrap_or_else(|| Utc.fix())
}

/// Format `ts` as `YYYY-MM-DD HH:MM:SS` in the given offset.
pub fn format_local(ts: DateTime<Utc>, offset: FixedOffset) -> String {
    ts.with_timezone(&offset)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Describe the time left on a lease.
///
/// Returns `"not activated"` when there is no expiry yet, `"expired"` once
/// it has passed, and `"Xd Yh Zm"` otherwise.
pub fn remaining(now: DateTime<Utc>, expire_at: Option<DateTime<Utc>>) -> String {
    let Some(expire_at) = expire_at else {
        return "not activated".to_string();
    };

    let left = expire_at - now;
    if left < chrono::Duration::zero() {
        return "expired".to_string();
    }

    let minutes = left.num_minutes();
    format!(
        "{}d {}h {}m",
        minutes / (24 * 60),
        (minutes / 60) % 24,
        minutes % 60
    )
}
