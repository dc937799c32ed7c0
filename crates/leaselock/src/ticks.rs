//! Conversions between UTC instants and the on-disk tick format.
//!
//! A lock file stores a single signed decimal count of 100-nanosecond ticks
//! since 0001-01-01T00:00:00Z. The epoch and width match the lock files
//! written by existing deployments, so instants round-trip between
//! implementations unchanged.

use chrono::{DateTime, Utc};

/// Ticks between 0001-01-01T00:00:00Z and the Unix epoch.
pub const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// 100-nanosecond ticks per second.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

const NANOS_PER_TICK: i64 = 100;

/// Cached-release sentinel meaning "this handle never wrote a release".
pub const NEVER: i64 = i64::MIN;

/// Convert an instant to ticks, saturating at the `i64` range.
pub fn from_datetime(instant: DateTime<Utc>) -> i64 {
    let secs = instant.timestamp();
    let sub_ticks = i64::from(instant.timestamp_subsec_nanos()) / NANOS_PER_TICK;
    secs.checked_mul(TICKS_PER_SECOND)
        .and_then(|t| t.checked_add(sub_ticks))
        .and_then(|t| t.checked_add(UNIX_EPOCH_TICKS))
        .unwrap_or(if secs < 0 { i64::MIN } else { i64::MAX })
}

/// Convert on-disk ticks back to an instant.
///
/// Any `i64` can land on disk, so values outside the representable
/// wall-clock range clamp to the nearest bound instead of failing.
pub fn to_datetime(ticks: i64) -> DateTime<Utc> {
    let unix_ticks = match ticks.checked_sub(UNIX_EPOCH_TICKS) {
        Some(t) => t,
        None => return DateTime::<Utc>::MIN_UTC,
    };
    let secs = unix_ticks.div_euclid(TICKS_PER_SECOND);
    let nanos = (unix_ticks.rem_euclid(TICKS_PER_SECOND) * NANOS_PER_TICK) as u32;
    match DateTime::from_timestamp(secs, nanos) {
        Some(instant) => instant,
        None if secs < 0 => DateTime::<Utc>::MIN_UTC,
        None => DateTime::<Utc>::MAX_UTC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_unix_epoch_maps_to_known_tick_count() {
        let epoch = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(from_datetime(epoch), UNIX_EPOCH_TICKS);
        assert_eq!(to_datetime(UNIX_EPOCH_TICKS), epoch);
    }

    #[test]
    fn test_tick_zero_is_year_one() {
        let instant = to_datetime(0);
        assert_eq!(instant.format("%Y-%m-%d %H:%M:%S").to_string(), "0001-01-01 00:00:00");
        assert_eq!(from_datetime(instant), 0);
    }

    #[test]
    fn test_roundtrip_preserves_tick_precision() {
        // Sub-tick nanoseconds are truncated by the format, so compare at
        // tick granularity.
        let now = Utc::now();
        let ticks = from_datetime(now);
        let back = from_datetime(to_datetime(ticks));
        assert_eq!(ticks, back);

        let delta = (now - to_datetime(ticks)).num_nanoseconds().unwrap();
        assert!(delta.abs() < NANOS_PER_TICK, "lost more than one tick: {delta}ns");
    }

    #[test]
    fn test_pre_epoch_instants_roundtrip() {
        let instant = Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 59).unwrap();
        let ticks = from_datetime(instant);
        assert!(ticks < UNIX_EPOCH_TICKS);
        assert_eq!(to_datetime(ticks), instant);
    }

    #[test]
    fn test_extreme_ticks_clamp_instead_of_failing() {
        assert_eq!(to_datetime(i64::MIN), DateTime::<Utc>::MIN_UTC);
        // i64::MAX ticks is within the chrono range; it must simply convert.
        let far = to_datetime(i64::MAX);
        assert!(far > Utc::now());
    }

    #[test]
    fn test_far_future_instant_saturates() {
        assert_eq!(from_datetime(DateTime::<Utc>::MAX_UTC), i64::MAX);
    }
}
