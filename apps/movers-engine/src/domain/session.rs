//! Trading Session Classification
//!
//! Maps a timestamp of unknown unit onto the exchange's local wall clock and
//! classifies it into pre-market, regular, after-hours or closed.
//!
//! # Unit inference
//!
//! | Magnitude | Unit |
//! |-----------|------|
//! | `> 1e14` | nanoseconds |
//! | `> 1e12` | milliseconds |
//! | `> 1e9` | seconds |
//! | otherwise | unusable |
//!
//! # Windows (exchange-local)
//!
//! - pre: 04:00 - 09:29
//! - regular: 09:30 - 15:59
//! - after: 16:00 - 19:59
//! - closed: everything else
//!
//! DST transitions are handled by `chrono_tz`.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

const PRE_OPEN_MINUTE: u32 = 4 * 60;
const REGULAR_OPEN_MINUTE: u32 = 9 * 60 + 30;
const AFTER_OPEN_MINUTE: u32 = 16 * 60;
const AFTER_CLOSE_MINUTE: u32 = 20 * 60;

/// Trading session by exchange-local wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Session {
    /// Pre-market (04:00 - 09:29).
    Pre,
    /// Regular session (09:30 - 15:59).
    Regular,
    /// After-hours (16:00 - 19:59).
    After,
    /// Outside every window.
    Closed,
}

impl Session {
    /// Session name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pre => "pre",
            Self::Regular => "regular",
            Self::After => "after",
            Self::Closed => "closed",
        }
    }

    /// Parse a session name, case-insensitively.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pre" | "premarket" | "pre-market" => Some(Self::Pre),
            "regular" | "rth" => Some(Self::Regular),
            "after" | "afterhours" | "after-hours" | "post" => Some(Self::After),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    /// Whether the session is one of the extended-hours windows.
    #[must_use]
    pub const fn is_extended(&self) -> bool {
        matches!(self, Self::Pre | Self::After)
    }
}

/// Unit inferred from a raw timestamp's magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampUnit {
    /// Nanoseconds since epoch.
    Nanoseconds,
    /// Milliseconds since epoch.
    Milliseconds,
    /// Seconds since epoch.
    Seconds,
}

impl TimestampUnit {
    /// Infer the unit of a raw epoch value.
    #[must_use]
    pub fn infer(raw: f64) -> Option<Self> {
        if !raw.is_finite() {
            return None;
        }
        if raw > 1e14 {
            Some(Self::Nanoseconds)
        } else if raw > 1e12 {
            Some(Self::Milliseconds)
        } else if raw > 1e9 {
            Some(Self::Seconds)
        } else {
            None
        }
    }
}

/// Normalize a raw epoch value of unknown unit to milliseconds.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn to_epoch_millis(raw: f64) -> Option<i64> {
    let millis = match TimestampUnit::infer(raw)? {
        TimestampUnit::Nanoseconds => raw / 1e6,
        TimestampUnit::Milliseconds => raw,
        TimestampUnit::Seconds => raw * 1e3,
    };
    Some(millis.round() as i64)
}

/// What a view does with a row whose timestamp is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingTimestampPolicy {
    /// Keep the row (avoids discarding movers lacking provenance).
    #[default]
    Keep,
    /// Drop the row.
    Drop,
}

/// Classifies timestamps against an exchange timezone.
#[derive(Debug, Clone, Copy)]
pub struct SessionClassifier {
    timezone: Tz,
}

impl Default for SessionClassifier {
    fn default() -> Self {
        Self::new(chrono_tz::America::New_York)
    }
}

impl SessionClassifier {
    /// Create a classifier for the given exchange timezone.
    #[must_use]
    pub const fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    /// Exchange timezone.
    #[must_use]
    pub const fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Classify an epoch-milliseconds timestamp.
    #[must_use]
    pub fn classify_millis(&self, millis: i64) -> Session {
        let Some(utc) = DateTime::<Utc>::from_timestamp_millis(millis) else {
            return Session::Closed;
        };
        let local = utc.with_timezone(&self.timezone);
        let minute_of_day = local.hour() * 60 + local.minute();

        match minute_of_day {
            m if (PRE_OPEN_MINUTE..REGULAR_OPEN_MINUTE).contains(&m) => Session::Pre,
            m if (REGULAR_OPEN_MINUTE..AFTER_OPEN_MINUTE).contains(&m) => Session::Regular,
            m if (AFTER_OPEN_MINUTE..AFTER_CLOSE_MINUTE).contains(&m) => Session::After,
            _ => Session::Closed,
        }
    }

    /// Classify a raw timestamp of unknown unit.
    ///
    /// Returns `None` when the unit cannot be inferred.
    #[must_use]
    pub fn classify(&self, raw: f64) -> Option<Session> {
        to_epoch_millis(raw).map(|ms| self.classify_millis(ms))
    }

    /// Exchange-local calendar date of an epoch-milliseconds timestamp.
    #[must_use]
    pub fn local_date(&self, millis: i64) -> Option<NaiveDate> {
        DateTime::<Utc>::from_timestamp_millis(millis)
            .map(|utc| utc.with_timezone(&self.timezone).date_naive())
    }

    /// Current exchange-local date.
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }

    /// Current session.
    #[must_use]
    pub fn current(&self) -> Session {
        self.classify_millis(Utc::now().timestamp_millis())
    }

    /// Decide whether a row belongs in a session-filtered view.
    ///
    /// `timestamp_millis` is the row's timestamp if known.
    #[must_use]
    pub fn admits(
        &self,
        timestamp_millis: Option<i64>,
        wanted: &[Session],
        policy: MissingTimestampPolicy,
    ) -> bool {
        match timestamp_millis {
            Some(ms) => wanted.contains(&self.classify_millis(ms)),
            None => policy == MissingTimestampPolicy::Keep,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    // 2024-01-01T09:00:00 America/New_York == 14:00:00 UTC
    const NY_0900_SECS: i64 = 1_704_117_600;

    #[test_case(NY_0900_SECS as f64 ; "seconds")]
    #[test_case(NY_0900_SECS as f64 * 1e3 ; "milliseconds")]
    #[test_case(NY_0900_SECS as f64 * 1e9 ; "nanoseconds")]
    fn nine_am_new_york_is_premarket_in_every_unit(raw: f64) {
        let classifier = SessionClassifier::default();
        assert_eq!(classifier.classify(raw), Some(Session::Pre));
    }

    #[test_case(4, 0, Session::Pre)]
    #[test_case(9, 29, Session::Pre)]
    #[test_case(9, 30, Session::Regular)]
    #[test_case(15, 59, Session::Regular)]
    #[test_case(16, 0, Session::After)]
    #[test_case(19, 59, Session::After)]
    #[test_case(20, 0, Session::Closed)]
    #[test_case(3, 59, Session::Closed)]
    fn window_boundaries(hour: i64, minute: i64, expected: Session) {
        // 2024-01-02 00:00 New York (EST, UTC-5)
        let midnight_ny_ms = (1_704_171_600_i64) * 1000;
        let ms = midnight_ny_ms + (hour * 60 + minute) * 60_000;
        assert_eq!(SessionClassifier::default().classify_millis(ms), expected);
    }

    #[test]
    fn summer_time_is_respected() {
        // 2024-07-01T13:30:00Z == 09:30 EDT
        let ms = 1_719_840_600_000;
        assert_eq!(
            SessionClassifier::default().classify_millis(ms),
            Session::Regular
        );
    }

    #[test]
    fn unit_inference() {
        assert_eq!(TimestampUnit::infer(1.7e9), Some(TimestampUnit::Seconds));
        assert_eq!(TimestampUnit::infer(1.7e12), Some(TimestampUnit::Milliseconds));
        assert_eq!(TimestampUnit::infer(1.7e18), Some(TimestampUnit::Nanoseconds));
        assert_eq!(TimestampUnit::infer(12345.0), None);
        assert_eq!(TimestampUnit::infer(f64::NAN), None);
    }

    #[test]
    fn unknown_unit_is_unclassified() {
        assert_eq!(SessionClassifier::default().classify(42.0), None);
    }

    #[test]
    fn missing_timestamp_policy() {
        let classifier = SessionClassifier::default();
        let wanted = [Session::Pre];
        assert!(classifier.admits(None, &wanted, MissingTimestampPolicy::Keep));
        assert!(!classifier.admits(None, &wanted, MissingTimestampPolicy::Drop));
        assert!(classifier.admits(
            Some(NY_0900_SECS * 1000),
            &wanted,
            MissingTimestampPolicy::Drop
        ));
    }

    #[test]
    fn local_date_uses_exchange_timezone() {
        // 2024-01-02T02:00:00Z is still 2024-01-01 in New York
        let ms = 1_704_160_800_000;
        let date = SessionClassifier::default().local_date(ms).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }

    #[test]
    fn session_parsing() {
        assert_eq!(Session::from_str_case_insensitive("PRE"), Some(Session::Pre));
        assert_eq!(
            Session::from_str_case_insensitive("after-hours"),
            Some(Session::After)
        );
        assert_eq!(Session::from_str_case_insensitive("lunch"), None);
    }
}
