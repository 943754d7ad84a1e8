//! Pure time-of-day arithmetic used by the scheduler and the due check.
//!
//! All values are wall-clock values in the user's local frame. Day wraparound
//! is handled explicitly: 23:58 and 00:02 are four minutes apart.

use anyhow::{bail, Result};
use chrono::{NaiveDateTime, NaiveTime, Timelike};

pub const SECONDS_PER_DAY: u32 = 86_400;
pub const MILLIS_PER_DAY: i64 = 86_400_000;

/// Default due window around a scheduled time: 15 minutes.
pub const DEFAULT_DUE_WINDOW_SECS: u32 = 900;

/// Seconds elapsed since local midnight, in `[0, 86399]`.
pub fn seconds_since_midnight(time: NaiveTime) -> u32 {
    time.num_seconds_from_midnight()
}

/// Milliseconds since the epoch of a local wall-clock instant, treating the
/// local time as if it were UTC. Only its remainder modulo one day matters to
/// [`delay_until`].
pub fn wall_clock_millis(now: NaiveDateTime) -> i64 {
    now.and_utc().timestamp_millis()
}

/// Milliseconds from `now_millis` until the next occurrence of `target_seconds`.
///
/// Returns 0 when `now` is within the target second itself. A target already
/// passed today rolls over to the same time tomorrow. The result is always in
/// `[0, MILLIS_PER_DAY)`.
pub fn delay_until(target_seconds: u32, now_millis: i64) -> u64 {
    let target_ms = i64::from(target_seconds % SECONDS_PER_DAY) * 1000;
    let now_of_day_ms = now_millis.rem_euclid(MILLIS_PER_DAY);
    let now_seconds = now_of_day_ms / 1000;

    let delay = if target_ms / 1000 == now_seconds {
        0
    } else if target_ms > now_of_day_ms {
        target_ms - now_of_day_ms
    } else {
        target_ms + MILLIS_PER_DAY - now_of_day_ms
    };
    delay as u64
}

/// [`delay_until`], except that it is 0 while `now` is still at most
/// `window_seconds` past the target. A key re-registered inside its due
/// window then keeps today's reminders instead of skipping to tomorrow.
pub fn delay_resuming(target_seconds: u32, now_millis: i64, window_seconds: u32) -> u64 {
    let target_ms = i64::from(target_seconds % SECONDS_PER_DAY) * 1000;
    let now_of_day_ms = now_millis.rem_euclid(MILLIS_PER_DAY);
    let since_target_ms = (now_of_day_ms - target_ms).rem_euclid(MILLIS_PER_DAY);
    if since_target_ms <= i64::from(window_seconds) * 1000 {
        0
    } else {
        delay_until(target_seconds, now_millis)
    }
}

/// Circular distance in seconds between two times of day.
pub fn circular_distance(a: u32, b: u32) -> u32 {
    let diff = a.abs_diff(b) % SECONDS_PER_DAY;
    diff.min(SECONDS_PER_DAY - diff)
}

/// True iff `target_seconds` and `current_seconds` are at most
/// `window_seconds` apart, measured around the clock.
pub fn within_window(target_seconds: u32, current_seconds: u32, window_seconds: u32) -> bool {
    circular_distance(target_seconds, current_seconds) <= window_seconds
}

/// 12-hour clock with AM/PM, e.g. `08:00 AM`.
pub fn format_12h(time: NaiveTime) -> String {
    time.format("%I:%M %p").to_string()
}

/// Parse `HH:MM` or `HH:MM:SS` (24-hour).
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime> {
    let value = value.trim();
    for format in ["%H:%M:%S", "%H:%M"] {
        if let Ok(time) = NaiveTime::parse_from_str(value, format) {
            return Ok(time);
        }
    }
    bail!("invalid time of day: {value:?} (expected HH:MM or HH:MM:SS)")
}

/// Inverse of [`seconds_since_midnight`]. Values past one day wrap.
pub fn time_from_seconds(seconds: u32) -> NaiveTime {
    NaiveTime::from_num_seconds_from_midnight_opt(seconds % SECONDS_PER_DAY, 0)
        .unwrap_or_default()
}
