use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use serde::Deserialize;
use utoipa::ToSchema;

/// Instant at which the wall clock of `offset` shows `date` `time`.
pub fn local_instant(offset: FixedOffset, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive_utc = date.and_time(time) - TimeDelta::seconds(offset.local_minus_utc() as i64);
    Utc.from_utc_datetime(&naive_utc)
}

/// Calendar day of `instant` in the given local offset.
pub fn local_date(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    instant.with_timezone(&offset).date_naive()
}

/// Parses `+03:00`, `-0530` or `Z`.
pub fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Optional inclusive bounds on local calendar dates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
pub struct DateRange {
    /// First day included
    #[schema(value_type = Option<String>, format = "date", example = "2026-03-01")]
    pub from: Option<NaiveDate>,
    /// Last day included
    #[schema(value_type = Option<String>, format = "date", example = "2026-03-31")]
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    pub fn single(date: NaiveDate) -> Self {
        Self::new(Some(date), Some(date))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }
}
