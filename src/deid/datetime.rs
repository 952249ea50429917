//! Partial date and date-time values
//!
//! Record dates are frequently partial (`1974`, `1974-12`) and come in two notations:
//! ISO-8601 as used by FHIR (`1974-12-25T14:35:45-05:00`) and the DICOM `DA`/`DT`
//! forms (`19741225`, `19741225143545.000-0500`). [`PartialDateTime`] keeps the
//! original precision and notation so shifted or truncated values can be written
//! back the same way they were read.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

/// Notation a value was parsed from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateNotation {
    /// `YYYY[-MM[-DD[Thh:mm[:ss[.f]][tz]]]]`
    Iso,
    /// DICOM `DA`: `YYYYMMDD`
    DicomDate,
    /// DICOM `DT`: `YYYY[MM[DD[hh[mm[ss[.f]]]]]][&ZZXX]`
    DicomDateTime,
}

/// Finest component present in a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DatePrecision {
    Year,
    Month,
    Day,
    Time,
}

/// A date or date-time with its original precision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialDateTime {
    year: i32,
    month: Option<u32>,
    day: Option<u32>,
    /// Time-of-day text as written, without the leading `T`
    time: Option<String>,
    /// Offset text as written (`Z`, `+01:00`, `-0500`)
    offset: Option<String>,
    notation: DateNotation,
}

fn iso_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(\d{4})(?:-(\d{2})(?:-(\d{2})(?:T(\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?)(Z|[+-]\d{2}:\d{2})?)?)?)?$",
        )
        .expect("valid ISO date regex")
    })
}

fn dicom_dt_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{4})(\d{2})?(\d{2})?(\d{2}(?:\d{2}(?:\d{2}(?:\.\d{1,6})?)?)?)?([+-]\d{4})?$")
            .expect("valid DICOM DT regex")
    })
}

impl PartialDateTime {
    /// Parses an ISO-8601 (FHIR) date, dateTime or instant
    pub fn parse_iso(text: &str) -> Option<Self> {
        let caps = iso_regex().captures(text.trim())?;
        let value = Self {
            year: caps.get(1)?.as_str().parse().ok()?,
            month: caps.get(2).and_then(|m| m.as_str().parse().ok()),
            day: caps.get(3).and_then(|m| m.as_str().parse().ok()),
            time: caps.get(4).map(|m| m.as_str().to_string()),
            offset: caps.get(5).map(|m| m.as_str().to_string()),
            notation: DateNotation::Iso,
        };
        value.is_valid().then_some(value)
    }

    /// Parses a DICOM `DA` value
    pub fn parse_dicom_date(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.len() != 8 || !text.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let value = Self {
            year: text[0..4].parse().ok()?,
            month: Some(text[4..6].parse().ok()?),
            day: Some(text[6..8].parse().ok()?),
            time: None,
            offset: None,
            notation: DateNotation::DicomDate,
        };
        value.is_valid().then_some(value)
    }

    /// Parses a DICOM `DT` value
    pub fn parse_dicom_datetime(text: &str) -> Option<Self> {
        let caps = dicom_dt_regex().captures(text.trim())?;
        let month = caps.get(2).and_then(|m| m.as_str().parse().ok());
        let day = caps.get(3).and_then(|m| m.as_str().parse().ok());
        let time = caps.get(4).map(|m| m.as_str().to_string());
        if (time.is_some() && day.is_none()) || (day.is_some() && month.is_none()) {
            return None;
        }
        let value = Self {
            year: caps.get(1)?.as_str().parse().ok()?,
            month,
            day,
            time,
            offset: caps.get(5).map(|m| m.as_str().to_string()),
            notation: DateNotation::DicomDateTime,
        };
        value.is_valid().then_some(value)
    }

    /// Parses by trying ISO first, then DICOM `DA`, then DICOM `DT`
    pub fn parse_any(text: &str) -> Option<Self> {
        Self::parse_iso(text)
            .or_else(|| Self::parse_dicom_date(text))
            .or_else(|| Self::parse_dicom_datetime(text))
    }

    fn is_valid(&self) -> bool {
        match (self.month, self.day) {
            (None, _) => true,
            (Some(m), None) => (1..=12).contains(&m),
            (Some(m), Some(d)) => NaiveDate::from_ymd_opt(self.year, m, d).is_some(),
        }
    }

    /// Calendar year
    pub fn year(&self) -> i32 {
        self.year
    }

    /// Notation the value was parsed from
    pub fn notation(&self) -> DateNotation {
        self.notation
    }

    /// Finest component present
    pub fn precision(&self) -> DatePrecision {
        if self.time.is_some() {
            DatePrecision::Time
        } else if self.day.is_some() {
            DatePrecision::Day
        } else if self.month.is_some() {
            DatePrecision::Month
        } else {
            DatePrecision::Year
        }
    }

    /// Earliest calendar date covered by this value
    pub fn lower_date(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month.unwrap_or(1), self.day.unwrap_or(1))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Earliest instant covered by this value, ignoring any offset
    pub fn lower_bound(&self) -> NaiveDateTime {
        let time = self
            .time
            .as_deref()
            .and_then(parse_time_text)
            .unwrap_or(NaiveTime::MIN);
        self.lower_date().and_time(time)
    }

    /// Shifts the calendar date by `days`, keeping time of day, offset and precision
    ///
    /// Partial values are shifted from their earliest covered date and then truncated
    /// back, so a year-only value yields a year-only value.
    pub fn shift_days(&self, days: i64) -> Self {
        let shifted = self.lower_date() + Duration::days(days);
        Self {
            year: shifted.year(),
            month: self.month.map(|_| shifted.month()),
            day: self.day.map(|_| shifted.day()),
            time: self.time.clone(),
            offset: self.offset.clone(),
            notation: self.notation,
        }
    }

    /// Keeps only the year, in a form valid for the original notation
    pub fn truncate_to_year(&self) -> Self {
        match self.notation {
            // DA has no partial form, so the year is padded to January 1st.
            DateNotation::DicomDate => Self {
                year: self.year,
                month: Some(1),
                day: Some(1),
                time: None,
                offset: None,
                notation: self.notation,
            },
            _ => Self {
                year: self.year,
                month: None,
                day: None,
                time: None,
                offset: None,
                notation: self.notation,
            },
        }
    }
}

fn parse_time_text(text: &str) -> Option<NaiveTime> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).take(6).collect();
    let hour = digits.get(0..2)?.parse().ok()?;
    let minute = digits.get(2..4).and_then(|m| m.parse().ok()).unwrap_or(0);
    let second = digits.get(4..6).and_then(|s| s.parse().ok()).unwrap_or(0);
    NaiveTime::from_hms_opt(hour, minute, second)
}

impl fmt::Display for PartialDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.notation {
            DateNotation::Iso => {
                write!(f, "{:04}", self.year)?;
                if let Some(month) = self.month {
                    write!(f, "-{month:02}")?;
                }
                if let Some(day) = self.day {
                    write!(f, "-{day:02}")?;
                }
                if let Some(time) = &self.time {
                    write!(f, "T{time}")?;
                }
            }
            DateNotation::DicomDate | DateNotation::DicomDateTime => {
                write!(f, "{:04}", self.year)?;
                if let Some(month) = self.month {
                    write!(f, "{month:02}")?;
                }
                if let Some(day) = self.day {
                    write!(f, "{day:02}")?;
                }
                if let Some(time) = &self.time {
                    write!(f, "{time}")?;
                }
            }
        }
        if let Some(offset) = &self.offset {
            write!(f, "{offset}")?;
        }
        Ok(())
    }
}

impl PartialOrd for PartialDateTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.lower_bound().cmp(&other.lower_bound()))
    }
}

/// Whole years between a year and the current year
pub fn years_since(year: i32) -> i32 {
    chrono::Utc::now().year() - year
}
