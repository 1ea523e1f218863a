//! Date ranges, temporal extents and index granularities.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HarmonizeError;

/// An inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The window `[target - lookback_days, target]`, which spans
    /// `lookback_days + 1` calendar days.
    pub fn lookback(target: NaiveDate, lookback_days: u32) -> Self {
        Self {
            start: target - Duration::days(lookback_days as i64),
            end: target,
        }
    }

    /// Number of calendar days covered, counting both ends.
    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// The range as a UTC extent from the start midnight to the end midnight.
    pub fn to_extent(&self) -> TimeExtent {
        TimeExtent::new(midnight_utc(self.start), midnight_utc(self.end))
    }

    /// Parse a `YYYY-MM-DD` date.
    pub fn parse_date(s: &str) -> Result<NaiveDate, HarmonizeError> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map_err(|e| HarmonizeError::configuration(format!("invalid date '{}': {}", s, e)))
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.start, self.end)
    }
}

/// Midnight UTC of a calendar date.
pub fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Closed interval of instants covered by one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeExtent {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeExtent {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Extent spanned by a list of timestamps; `None` when empty.
    pub fn of(times: &[DateTime<Utc>]) -> Option<Self> {
        let start = times.iter().min()?;
        let end = times.iter().max()?;
        Some(Self::new(*start, *end))
    }

    /// Overlap of two extents.
    pub fn intersection(&self, other: &TimeExtent) -> Option<TimeExtent> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then(|| TimeExtent::new(start, end))
    }
}

/// Step size of the unified temporal index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl Granularity {
    /// Snap an instant to the start of its period.
    ///
    /// Daily and weekly periods start at midnight of the same day (weekly
    /// indices are anchored on their first timestamp, not on a weekday);
    /// monthly periods start on the first of the month.
    pub fn floor(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let date = t.date_naive();
        match self {
            Self::Daily | Self::Weekly => midnight_utc(date),
            Self::Monthly => midnight_utc(date.with_day(1).unwrap_or(date)),
        }
    }

    /// Start of the period following the one beginning at `t`.
    pub fn advance(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Daily => t + Duration::days(1),
            Self::Weekly => t + Duration::days(7),
            Self::Monthly => {
                let date = t.date_naive();
                let (year, month) = if date.month() == 12 {
                    (date.year() + 1, 1)
                } else {
                    (date.year(), date.month() + 1)
                };
                NaiveDate::from_ymd_opt(year, month, 1)
                    .map(midnight_utc)
                    .unwrap_or(t + Duration::days(31))
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl FromStr for Granularity {
    type Err = HarmonizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "d" | "1d" => Ok(Self::Daily),
            "weekly" | "w" | "7d" => Ok(Self::Weekly),
            "monthly" | "m" | "ms" => Ok(Self::Monthly),
            other => Err(HarmonizeError::configuration(format!(
                "unsupported temporal granularity '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
