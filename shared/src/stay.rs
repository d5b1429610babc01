use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire format for calendar dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Longest range accepted anywhere: stays, inventory allocations, rate loads.
pub const MAX_NIGHTS: i64 = 731;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("invalid {field} format, use YYYY-MM-DD")]
    DateFormat { field: &'static str },

    #[error("end_date must be after start_date")]
    EmptyStay,

    #[error("a date range may span at most {max} nights")]
    TooManyNights { max: i64 },

    #[error("num_adults must be at least 1")]
    NoAdults,

    #[error("num_children must not be negative")]
    NegativeChildren,
}

pub fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, InputError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| InputError::DateFormat { field })
}

/// Half-open range of nights `[start_date, end_date)`. Never empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawStayRange")]
pub struct StayRange {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

#[derive(Deserialize)]
struct RawStayRange {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

impl TryFrom<RawStayRange> for StayRange {
    type Error = InputError;

    fn try_from(raw: RawStayRange) -> Result<Self, Self::Error> {
        StayRange::new(raw.start_date, raw.end_date)
    }
}

impl StayRange {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Result<Self, InputError> {
        if end_date <= start_date {
            return Err(InputError::EmptyStay);
        }
        if (end_date - start_date).num_days() > MAX_NIGHTS {
            return Err(InputError::TooManyNights { max: MAX_NIGHTS });
        }
        Ok(Self { start_date, end_date })
    }

    pub fn parse(start_date: &str, end_date: &str) -> Result<Self, InputError> {
        let start_date = parse_date("start_date", start_date)?;
        let end_date = parse_date("end_date", end_date)?;
        Self::new(start_date, end_date)
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    /// First date *not* occupied by the stay.
    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn nights(&self) -> usize {
        (self.end_date - self.start_date).num_days() as usize
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let end_date = self.end_date;
        self.start_date.iter_days().take_while(move |date| *date < end_date)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date < self.end_date
    }

    /// True when the stay shares at least one night with the (possibly
    /// open-ended) window `[from, until)`.
    pub fn overlaps(&self, from: Option<NaiveDate>, until: Option<NaiveDate>) -> bool {
        let after_from = from.map_or(true, |from| self.end_date > from);
        let before_until = until.map_or(true, |until| self.start_date < until);
        after_from && before_until
    }
}

impl std::fmt::Display for StayRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}..{}",
            self.start_date.format(DATE_FORMAT),
            self.end_date.format(DATE_FORMAT)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupancy {
    pub num_adults: i32,
    pub num_children: i32,
}

impl Occupancy {
    pub fn new(num_adults: i32, num_children: i32) -> Result<Self, InputError> {
        if num_adults < 1 {
            return Err(InputError::NoAdults);
        }
        if num_children < 0 {
            return Err(InputError::NegativeChildren);
        }
        Ok(Self { num_adults, num_children })
    }
}
