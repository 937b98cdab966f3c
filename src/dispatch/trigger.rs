//! Calendar trigger calculation
//!
//! Parses 5-field cron expressions (`minute hour day month weekday`) and turns
//! them into concrete future instants. The calculation is pure and
//! deterministic: the same expression and reference time always produce the
//! same next occurrence, which lets both the scheduler and the restart
//! recovery path share it.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

use super::error::{DispatchError, DispatchResult};

/// Search horizon for the next occurrence, in minutes (one leap year)
const SEARCH_HORIZON_MINUTES: i64 = 366 * 24 * 60;

/// A single field in a cron expression
#[derive(Debug, Clone, PartialEq, Eq)]
enum CronField {
    /// Wildcard (*) - matches all values
    Any,
    /// Specific value
    Value(u32),
    /// List of values (e.g., 1,3,5)
    List(Vec<u32>),
    /// Inclusive range (e.g., 1-5)
    Range(u32, u32),
    /// Step (e.g., */5)
    Step(u32),
}

impl CronField {
    fn matches(&self, value: u32) -> bool {
        match self {
            Self::Any => true,
            Self::Value(v) => *v == value,
            Self::List(values) => values.contains(&value),
            Self::Range(start, end) => value >= *start && value <= *end,
            Self::Step(step) => value % step == 0,
        }
    }
}

/// A parsed recurring trigger expression
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expr: String,
    minute: CronField,
    hour: CronField,
    day: CronField,
    month: CronField,
    weekday: CronField,
}

impl CronSchedule {
    /// Parse a 5-field cron expression
    ///
    /// # Format
    ///
    /// `minute hour day month weekday`, with `*`, single values, lists
    /// (`1,3,5`), ranges (`9-17`) and steps (`*/15`). Weekday runs 0-6 with
    /// Sunday as 0.
    pub fn parse(expr: &str) -> DispatchResult<Self> {
        let parts: Vec<&str> = expr.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(DispatchError::invalid_schedule(
                expr,
                format!("expected 5 fields, got {}", parts.len()),
            ));
        }

        Ok(Self {
            expr: expr.to_string(),
            minute: Self::parse_field(expr, parts[0], 0, 59)?,
            hour: Self::parse_field(expr, parts[1], 0, 23)?,
            day: Self::parse_field(expr, parts[2], 1, 31)?,
            month: Self::parse_field(expr, parts[3], 1, 12)?,
            weekday: Self::parse_field(expr, parts[4], 0, 6)?,
        })
    }

    /// Validate an expression without keeping the parse result
    pub fn validate(expr: &str) -> DispatchResult<()> {
        Self::parse(expr).map(|_| ())
    }

    fn parse_field(expr: &str, field: &str, min: u32, max: u32) -> DispatchResult<CronField> {
        let invalid =
            |reason: String| DispatchError::invalid_schedule(expr, format!("'{field}': {reason}"));

        if field == "*" {
            return Ok(CronField::Any);
        }

        if let Some(step_str) = field.strip_prefix("*/") {
            let step: u32 = step_str
                .parse()
                .map_err(|_| invalid("step is not a number".to_string()))?;
            if step == 0 || step > max {
                return Err(invalid(format!("step must be 1-{max}")));
            }
            return Ok(CronField::Step(step));
        }

        if field.contains('-') {
            let bounds: Vec<&str> = field.split('-').collect();
            if bounds.len() != 2 {
                return Err(invalid("malformed range".to_string()));
            }
            let start: u32 = bounds[0]
                .parse()
                .map_err(|_| invalid("range start is not a number".to_string()))?;
            let end: u32 = bounds[1]
                .parse()
                .map_err(|_| invalid("range end is not a number".to_string()))?;
            if start < min || end > max || start > end {
                return Err(invalid(format!(
                    "range must stay within {min}-{max} with start <= end"
                )));
            }
            return Ok(CronField::Range(start, end));
        }

        if field.contains(',') {
            let mut values = Vec::new();
            for part in field.split(',') {
                let value: u32 = part
                    .parse()
                    .map_err(|_| invalid(format!("list value '{part}' is not a number")))?;
                if value < min || value > max {
                    return Err(invalid(format!("list value {value} outside {min}-{max}")));
                }
                values.push(value);
            }
            return Ok(CronField::List(values));
        }

        let value: u32 = field
            .parse()
            .map_err(|_| invalid("not a number".to_string()))?;
        if value < min || value > max {
            return Err(invalid(format!("value {value} outside {min}-{max}")));
        }
        Ok(CronField::Value(value))
    }

    /// The original expression string
    pub fn expression(&self) -> &str {
        &self.expr
    }

    /// Check whether the expression matches a given instant (minute precision)
    pub fn matches(&self, time: &DateTime<Utc>) -> bool {
        self.minute.matches(time.minute())
            && self.hour.matches(time.hour())
            && self.day.matches(time.day())
            && self.month.matches(time.month())
            && self.weekday.matches(time.weekday().num_days_from_sunday())
    }

    /// Calculate the first occurrence strictly after the reference time
    ///
    /// Returns `None` when no occurrence exists within the search horizon
    /// (e.g. an expression pinned to a date that never comes around).
    pub fn next_occurrence(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut current = (*after + Duration::minutes(1))
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))?;

        for _ in 0..SEARCH_HORIZON_MINUTES {
            if self.matches(&current) {
                return Some(current);
            }
            current += Duration::minutes(1);
        }

        None
    }

    /// Next occurrence with the availability fallback
    ///
    /// An expression that can never recur degrades to "try again in 24 hours"
    /// instead of dropping the campaign from the schedule.
    pub fn next_or_fallback(&self, after: &DateTime<Utc>) -> DateTime<Utc> {
        match self.next_occurrence(after) {
            Some(next) => next,
            None => {
                tracing::warn!(
                    expr = %self.expr,
                    "No occurrence within the search horizon, falling back to +24h"
                );
                *after + Duration::hours(24)
            }
        }
    }
}
