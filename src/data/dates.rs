use chrono::{Duration, NaiveDate};
use thiserror::Error;

/// Accepted input formats, AU day-first forms before ISO.
const DATE_FORMATS: [&str; 4] = ["%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d", "%Y/%m/%d"];

/// Days of history requested when no start date is configured.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 60;

/// Parses AU-friendly (`25/10/2025`, `25-10-2025`) and ISO
/// (`2025-10-25`, `2025/10/25`) dates. Blank input yields `None`.
pub fn parse_date_any(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

#[derive(Error, Debug, PartialEq)]
pub enum DateRangeError {
    #[error("invalid date '{0}', use formats like 2025-10-25 or 25/10/2025")]
    Unparseable(String),
    #[error("end date {end} cannot precede start date {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
}

/// Inclusive range of calendar dates to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// # Errors
    /// Returns [`DateRangeError::EndBeforeStart`] if `end` precedes `start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DateRangeError> {
        if end < start {
            return Err(DateRangeError::EndBeforeStart { start, end });
        }
        Ok(Self { start, end })
    }

    /// The [`DEFAULT_LOOKBACK_DAYS`] days up to and including `today`.
    pub fn trailing(today: NaiveDate) -> Self {
        Self {
            start: today - Duration::days(DEFAULT_LOOKBACK_DAYS),
            end: today,
        }
    }

    /// Builds a range from optional user input, falling back to the trailing
    /// window ending `today` for whichever bound is absent.
    ///
    /// # Errors
    /// Returns [`DateRangeError::Unparseable`] for input no accepted format
    /// matches, or [`DateRangeError::EndBeforeStart`] for a reversed range.
    pub fn from_inputs(
        start: Option<&str>,
        end: Option<&str>,
        today: NaiveDate,
    ) -> Result<Self, DateRangeError> {
        let fallback = Self::trailing(today);
        let parse = |input: Option<&str>, default: NaiveDate| match input.map(str::trim) {
            None | Some("") => Ok(default),
            Some(s) => parse_date_any(s).ok_or_else(|| DateRangeError::Unparseable(s.to_string())),
        };
        Self::new(parse(start, fallback.start)?, parse(end, fallback.end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Exclusive upper bound for providers that treat `end` as open.
    pub fn end_exclusive(&self) -> NaiveDate {
        self.end + Duration::days(1)
    }
}
