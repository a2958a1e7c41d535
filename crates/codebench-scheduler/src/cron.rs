use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

use crate::claims::truncate_to_minute;

/// Minutes in a (non-leap) year; the search horizon of [`CronExpr::next_after`].
pub const SEARCH_HORIZON_MINUTES: i64 = 525_600;

const FIELD_NAMES: [&str; 5] = ["minute", "hour", "day-of-month", "month", "day-of-week"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CronError {
    #[error("Expected 5 fields, found {0}")]
    FieldCount(usize),
    #[error("Invalid {field} field '{value}'")]
    InvalidField { field: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Any,
    Every(u32),
    Ranges(Vec<(u32, u32)>),
    /// Stepped ranges (`1-10/2`) parse but never fire.
    Never,
}

impl Field {
    fn parse(raw: &str, name: &'static str) -> Result<Self, CronError> {
        let invalid = || CronError::InvalidField {
            field: name,
            value: raw.to_string(),
        };

        if raw == "*" {
            return Ok(Field::Any);
        }

        if let Some((base, step)) = raw.split_once('/') {
            let step: u32 = step.parse().map_err(|_| invalid())?;
            if step == 0 {
                return Err(invalid());
            }
            return Ok(match base {
                "*" => Field::Every(step),
                _ => Field::Never,
            });
        }

        let ranges = raw
            .split(',')
            .map(|item| match item.split_once('-') {
                Some((lo, hi)) => Ok((lo.parse().map_err(|_| invalid())?, hi.parse().map_err(|_| invalid())?)),
                None => item.parse().map(|v| (v, v)).map_err(|_| invalid()),
            })
            .collect::<Result<Vec<(u32, u32)>, CronError>>()?;

        Ok(Field::Ranges(ranges))
    }

    fn matches(&self, value: u32) -> bool {
        match self {
            Field::Any => true,
            Field::Every(step) => value % step == 0,
            Field::Ranges(ranges) => ranges.iter().any(|&(lo, hi)| lo <= value && value <= hi),
            Field::Never => false,
        }
    }
}

/// A five-field cron expression evaluated in UTC.
///
/// Every field must match, including day-of-month and day-of-week together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    minute: Field,
    hour: Field,
    day_of_month: Field,
    month: Field,
    day_of_week: Field,
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let parts: Vec<&str> = expr.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = parts[..] else {
            return Err(CronError::FieldCount(parts.len()));
        };

        Ok(Self {
            source: parts.join(" "),
            minute: Field::parse(minute, FIELD_NAMES[0])?,
            hour: Field::parse(hour, FIELD_NAMES[1])?,
            day_of_month: Field::parse(dom, FIELD_NAMES[2])?,
            month: Field::parse(month, FIELD_NAMES[3])?,
            day_of_week: Field::parse(dow, FIELD_NAMES[4])?,
        })
    }

    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        self.minute.matches(at.minute())
            && self.hour.matches(at.hour())
            && self.day_of_month.matches(at.day())
            && self.month.matches(at.month())
            && self.day_of_week.matches(at.weekday().num_days_from_sunday())
    }

    /// First matching minute strictly after `from`, within one year.
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = truncate_to_minute(from) + Duration::minutes(1);
        (0..SEARCH_HORIZON_MINUTES)
            .map(|offset| start + Duration::minutes(offset))
            .find(|candidate| self.matches(*candidate))
    }
}

impl FromStr for CronExpr {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Malformed expressions never match.
pub fn matches(expr: &str, at: DateTime<Utc>) -> bool {
    CronExpr::parse(expr).is_ok_and(|cron| cron.matches(at))
}

pub fn next_run_time(expr: &str, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    CronExpr::parse(expr).ok()?.next_after(from)
}
