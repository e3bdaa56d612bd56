//! Date range selection for statistics requests.

use crate::error::ChannelStatsError;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};

/// Accepted datetime formats, tried after a plain date.
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// An inclusive range of time index values.
///
/// An unbounded range selects the full series.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DateRange {
    bounds: Option<(NaiveDateTime, NaiveDateTime)>,
}

impl DateRange {
    /// Returns a range selecting the full series.
    pub fn full() -> Self {
        Self { bounds: None }
    }

    /// Returns a range between two datetimes, both inclusive.
    pub fn between(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, ChannelStatsError> {
        if start > end {
            return Err(ChannelStatsError::DateRangeOrder { start, end });
        }
        Ok(Self {
            bounds: Some((start, end)),
        })
    }

    /// Parse a date range from optional start and end dates, with the end defaulting to the
    /// current local time.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, ChannelStatsError> {
        Self::parse_at(start, end, Local::now().naive_local())
    }

    /// Parse a date range from optional start and end dates.
    ///
    /// * With neither date the full series is selected.
    /// * With only a start date the range ends at `now`.
    /// * An end date without a start date is rejected.
    ///
    /// # Arguments
    ///
    /// * `start`: Optional start date
    /// * `end`: Optional end date
    /// * `now`: Default end of the range
    pub fn parse_at(
        start: Option<&str>,
        end: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<Self, ChannelStatsError> {
        match (start, end) {
            (None, None) => Ok(Self::full()),
            (None, Some(_)) => Err(ChannelStatsError::EndDateWithoutStartDate),
            (Some(start), end) => {
                let start = parse_date("start_date", start)?;
                let end = match end {
                    Some(end) => parse_date("end_date", end)?,
                    None => now,
                };
                Self::between(start, end)
            }
        }
    }

    /// Returns the start and end of the range, or `None` for the full series.
    pub fn bounds(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        self.bounds
    }

    /// Returns whether an index value lies within the range.
    ///
    /// Null index values are only selected by the full range.
    pub fn contains(&self, value: Option<NaiveDateTime>) -> bool {
        match (self.bounds, value) {
            (None, _) => true,
            (Some((start, end)), Some(value)) => start <= value && value <= end,
            (Some(_), None) => false,
        }
    }
}

/// Parse a date as midnight at the start of the day, or a full datetime.
fn parse_date(field: &'static str, value: &str) -> Result<NaiveDateTime, ChannelStatsError> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .ok_or_else(|| ChannelStatsError::InvalidDate {
            field,
            value: value.to_string(),
        })
}
