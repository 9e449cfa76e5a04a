//! Canonical UTC timestamps.
//!
//! Every forecast hour is keyed by a single string form,
//! `YYYY-MM-DDTHH:MM:SSZ`, whatever shape the provider used for it.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::model::RawHourlyRecord;

pub const UTC_SUFFIX: char = 'Z';

/// Source of "now". Injected wherever normalization reads the wall clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Resolve the forecast hour of `rec`, first match wins:
///
/// 1. `timestamp_utc`
/// 2. `datetime`, then `ob_time` (taken as UTC even though the provider may
///    report local time here)
/// 3. `ts` epoch seconds
/// 4. `clock.now()`
pub fn canonical_timestamp(rec: &RawHourlyRecord, clock: &dyn Clock) -> String {
    let preformatted = [&rec.timestamp_utc, &rec.datetime, &rec.ob_time]
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty());

    if let Some(s) = preformatted {
        return with_utc_suffix(s);
    }

    rec.ts
        .and_then(epoch_to_iso)
        .unwrap_or_else(|| format_utc(clock.now()))
}

/// `2023-11-14T22:13:20Z`
pub fn format_utc(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Microsecond precision, used for bookkeeping stamps so they sort lexically.
pub fn format_utc_precise(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// `None` when `ts` is outside chrono's representable range.
pub fn epoch_to_iso(ts: i64) -> Option<String> {
    DateTime::from_timestamp(ts, 0).map(format_utc)
}

fn with_utc_suffix(s: &str) -> String {
    let mut out = s.replace(' ', "T");
    if !out.ends_with(UTC_SUFFIX) {
        out.push(UTC_SUFFIX);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
    }

    #[test]
    fn preformatted_utc_wins_over_epoch() {
        let rec = RawHourlyRecord {
            timestamp_utc: Some("2023-11-14 22:00:00".into()),
            ts: Some(1_700_000_000),
            ..Default::default()
        };
        assert_eq!(canonical_timestamp(&rec, &clock()), "2023-11-14T22:00:00Z");
    }

    #[test]
    fn existing_suffix_is_not_doubled() {
        let rec = RawHourlyRecord {
            timestamp_utc: Some("2023-11-14T22:00:00Z".into()),
            ..Default::default()
        };
        assert_eq!(canonical_timestamp(&rec, &clock()), "2023-11-14T22:00:00Z");
    }

    #[test]
    fn observation_time_is_taken_as_utc() {
        let rec = RawHourlyRecord {
            ob_time: Some("2023-11-14 16:13".into()),
            ts: Some(1_700_000_000),
            ..Default::default()
        };
        assert_eq!(canonical_timestamp(&rec, &clock()), "2023-11-14T16:13Z");
    }

    #[test]
    fn empty_strings_fall_through() {
        let rec = RawHourlyRecord {
            timestamp_utc: Some(String::new()),
            datetime: Some("2023-11-14:22".into()),
            ..Default::default()
        };
        assert_eq!(canonical_timestamp(&rec, &clock()), "2023-11-14:22Z");
    }

    #[test]
    fn epoch_matches_direct_conversion() {
        let rec = RawHourlyRecord {
            ts: Some(1_700_000_000),
            ..Default::default()
        };
        let direct = format_utc(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        assert_eq!(canonical_timestamp(&rec, &clock()), direct);
        assert_eq!(direct, "2023-11-14T22:13:20Z");
    }

    #[test]
    fn falls_back_to_clock() {
        let out = canonical_timestamp(&RawHourlyRecord::default(), &clock());
        assert_eq!(out, "2024-05-01T12:00:00Z");
    }

    #[test]
    fn fallback_with_system_clock_is_never_empty() {
        let out = canonical_timestamp(&RawHourlyRecord::default(), &SystemClock);
        assert!(!out.is_empty());
        assert!(out.ends_with(UTC_SUFFIX));
        assert!(out.contains('T'));
    }

    #[test]
    fn out_of_range_epoch_falls_back_to_clock() {
        let rec = RawHourlyRecord {
            ts: Some(i64::MAX),
            ..Default::default()
        };
        assert_eq!(canonical_timestamp(&rec, &clock()), "2024-05-01T12:00:00Z");
    }

    #[test]
    fn precise_format_keeps_suffix() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(format_utc_precise(t), "2024-05-01T12:00:00.000000Z");
    }
}
