use chrono::{
    DateTime, Duration, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime, Offset,
    TimeZone, Utc,
};
use thiserror::Error;

use crate::model::ReadingSession;

/// A simple clock abstraction for deterministic time in services and tests.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    Default,
    Fixed(DateTime<Utc>),
}

impl Clock {
    /// Returns a clock fixed at the given timestamp.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    /// Returns the current time according to the clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::Default => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// If this is a fixed clock, advance it by the given duration.
    ///
    /// Has no effect on `Clock::Default`.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }
}

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

/// Returns a `Clock` fixed at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

//
// ─── ZONE ──────────────────────────────────────────────────────────────────────
//

/// The wall-clock zone used to turn instants into calendar dates and back.
///
/// `Local` follows the device's ambient zone, including DST transitions.
/// `Fixed` pins a constant offset and is what tests use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Zone {
    #[default]
    Local,
    Fixed(FixedOffset),
}

/// Outcome of interpreting a wall-clock value in a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalInstant {
    Exact(DateTime<Utc>),
    /// DST fold: the earlier of the two candidate instants.
    Ambiguous(DateTime<Utc>),
    /// DST gap: the wall-clock value never happens in this zone.
    Nonexistent,
}

impl Zone {
    #[must_use]
    pub fn utc() -> Self {
        Self::Fixed(Utc.fix())
    }

    /// Fixed zone `minutes` east of UTC; `None` when out of range (±24h).
    #[must_use]
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(Self::Fixed)
    }

    /// Calendar date of `instant` as seen on a wall clock in this zone.
    #[must_use]
    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            Zone::Local => instant.with_timezone(&Local).date_naive(),
            Zone::Fixed(offset) => instant.with_timezone(offset).date_naive(),
        }
    }

    /// `instant` rendered on this zone's wall clock with a chrono format string.
    #[must_use]
    pub fn format(&self, instant: DateTime<Utc>, fmt: &str) -> String {
        match self {
            Zone::Local => instant.with_timezone(&Local).format(fmt).to_string(),
            Zone::Fixed(offset) => instant.with_timezone(offset).format(fmt).to_string(),
        }
    }

    /// Interprets a zone-less wall-clock value as an absolute instant.
    #[must_use]
    pub fn resolve_local(&self, naive: NaiveDateTime) -> LocalInstant {
        match self {
            Zone::Local => classify(Local.from_local_datetime(&naive)),
            Zone::Fixed(offset) => classify(offset.from_local_datetime(&naive)),
        }
    }
}

fn classify<Tz: TimeZone>(result: LocalResult<DateTime<Tz>>) -> LocalInstant {
    match result {
        LocalResult::Single(t) => LocalInstant::Exact(t.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => {
            LocalInstant::Ambiguous(earliest.with_timezone(&Utc))
        }
        LocalResult::None => LocalInstant::Nonexistent,
    }
}

impl LocalInstant {
    /// The instant to store for `raw`; a DST-gap value is an error.
    ///
    /// # Errors
    ///
    /// Returns `LocalTimeError::Nonexistent` for `LocalInstant::Nonexistent`.
    pub fn into_instant(self, raw: &str) -> Result<DateTime<Utc>, LocalTimeError> {
        match self {
            LocalInstant::Exact(t) | LocalInstant::Ambiguous(t) => Ok(t),
            LocalInstant::Nonexistent => Err(LocalTimeError::Nonexistent {
                raw: raw.to_owned(),
            }),
        }
    }
}

//
// ─── PARSING ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LocalTimeError {
    #[error("`{raw}` is not a YYYY-MM-DDTHH:MM timestamp")]
    Malformed { raw: String },

    #[error("`{raw}` does not exist in the local time zone")]
    Nonexistent { raw: String },
}

const LOCAL_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"];

/// Parses a `YYYY-MM-DDTHH:MM` value (seconds optional) entered without zone
/// information and converts it to an absolute instant in `zone`.
///
/// # Errors
///
/// Returns `LocalTimeError::Malformed` for unparseable input and
/// `LocalTimeError::Nonexistent` when the value falls into a DST gap.
pub fn parse_local_datetime(raw: &str, zone: Zone) -> Result<DateTime<Utc>, LocalTimeError> {
    let trimmed = raw.trim();
    let naive = LOCAL_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| LocalTimeError::Malformed {
            raw: raw.to_owned(),
        })?;

    zone.resolve_local(naive).into_instant(raw)
}

//
// ─── DURATIONS ─────────────────────────────────────────────────────────────────
//

/// Whole seconds between two instants; reversed ranges count as zero.
#[must_use]
pub fn elapsed_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_seconds().max(0)
}

/// Whole minutes between two instants, truncated; reversed ranges count as zero.
#[must_use]
pub fn elapsed_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_minutes().max(0)
}

/// Formats a timer readout as `MM:SS`. Minutes are not wrapped into hours.
#[must_use]
pub fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Formats a span as `1h 2m 3s`, dropping leading zero units.
#[must_use]
pub fn format_duration(seconds: u64) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

/// Duration column for a session row; active sessions render as `—`.
#[must_use]
pub fn format_session_duration(session: &ReadingSession) -> String {
    if session.is_active() {
        return "—".to_string();
    }
    format_duration(u64::try_from(session.duration_seconds()).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn fixed_clock_advances() {
        let mut clock = fixed_clock();
        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now(), fixed_now() + Duration::minutes(5));
    }

    #[test]
    fn formats_on_zone_wall_clock() {
        let zone = Zone::from_offset_minutes(-60).unwrap();
        assert_eq!(zone.format(fixed_now(), "%Y-%m-%d %H:%M"), "2023-11-14 21:13");
    }

    #[test]
    fn parses_local_wall_clock_in_fixed_zone() {
        let zone = Zone::from_offset_minutes(120).unwrap();
        let t = parse_local_datetime("2025-07-05T09:00", zone).unwrap();
        assert_eq!(t.to_rfc3339(), "2025-07-05T07:00:00+00:00");
    }

    #[test]
    fn parses_optional_seconds() {
        let t = parse_local_datetime("2025-07-05T09:00:30", Zone::utc()).unwrap();
        assert_eq!(t.second(), 30);
    }

    #[test]
    fn rejects_malformed_input() {
        let err = parse_local_datetime("05/07/2025 9am", Zone::utc()).unwrap_err();
        assert!(matches!(err, LocalTimeError::Malformed { .. }));
    }

    #[test]
    fn dst_fold_takes_earlier_instant() {
        let earlier = FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 10, 26, 2, 30, 0)
            .unwrap();
        let later = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2025, 10, 26, 2, 30, 0)
            .unwrap();
        let resolved = classify(LocalResult::Ambiguous(earlier, later));
        assert_eq!(resolved, LocalInstant::Ambiguous(earlier.with_timezone(&Utc)));
        assert_eq!(
            resolved.into_instant("2025-10-26T02:30").unwrap().to_rfc3339(),
            "2025-10-26T00:30:00+00:00"
        );
    }

    #[test]
    fn dst_gap_is_nonexistent() {
        let resolved = classify::<Utc>(LocalResult::None);
        assert_eq!(resolved, LocalInstant::Nonexistent);
        let err = resolved.into_instant("2025-03-30T02:30").unwrap_err();
        assert_eq!(
            err,
            LocalTimeError::Nonexistent {
                raw: "2025-03-30T02:30".into()
            }
        );
    }

    #[test]
    fn single_result_is_exact() {
        let t = Utc.with_ymd_and_hms(2025, 7, 5, 9, 0, 0).unwrap();
        assert_eq!(classify(LocalResult::Single(t)), LocalInstant::Exact(t));
    }

    #[test]
    fn date_of_respects_offset() {
        let instant = parse_local_datetime("2025-07-05T23:30", Zone::utc()).unwrap();
        let east = Zone::from_offset_minutes(60).unwrap();
        assert_eq!(east.date_of(instant).to_string(), "2025-07-06");
        assert_eq!(Zone::utc().date_of(instant).to_string(), "2025-07-05");
    }

    #[test]
    fn offset_out_of_range_is_rejected() {
        assert!(Zone::from_offset_minutes(24 * 60).is_none());
    }

    #[test]
    fn minutes_truncate_and_clamp() {
        let start = fixed_now();
        assert_eq!(elapsed_minutes(start, start + Duration::seconds(119)), 1);
        assert_eq!(elapsed_minutes(start + Duration::minutes(3), start), 0);
        assert_eq!(elapsed_seconds(start, start + Duration::minutes(2)), 120);
    }

    #[test]
    fn formats_clock_readout() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(65), "01:05");
        assert_eq!(format_clock(75 * 60), "75:00");
    }

    #[test]
    fn formats_human_duration() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(3723), "1h 2m 3s");
    }

    #[test]
    fn session_duration_column() {
        use crate::model::{BookId, SessionId};
        let start = fixed_now();
        let active = ReadingSession::started(BookId::new(1), start);
        assert_eq!(format_session_duration(&active), "—");
        let done = ReadingSession::from_persisted(
            SessionId::new(1),
            BookId::new(1),
            start,
            Some(start + Duration::seconds(3723)),
            None,
            "",
        )
        .unwrap();
        assert_eq!(format_session_duration(&done), "1h 2m 3s");
    }
}
