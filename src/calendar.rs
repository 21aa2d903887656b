use crate::errors::{AppError, AppResult};
use crate::models::MoodEntry;
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

static YEAR_MONTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})$").expect("valid year-month regex"));

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// A calendar month that chrono can represent. Every constructor, including
/// deserialization, goes through [`YearMonth::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawYearMonth")]
pub struct YearMonth {
    year: i32,
    month: u32,
}

#[derive(Deserialize)]
struct RawYearMonth {
    year: i32,
    month: u32,
}

impl TryFrom<RawYearMonth> for YearMonth {
    type Error = AppError;

    fn try_from(raw: RawYearMonth) -> AppResult<Self> {
        Self::new(raw.year, raw.month)
    }
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> AppResult<Self> {
        if !(1..=12).contains(&month) || NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(AppError::Validation(format!("invalid month {}-{:02}", year, month)));
        }
        Ok(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn parse(raw: &str) -> AppResult<Self> {
        let captures = YEAR_MONTH
            .captures(raw.trim())
            .ok_or_else(|| AppError::Validation(format!("expected YYYY-MM, got '{}'", raw)))?;
        let year = captures[1]
            .parse::<i32>()
            .map_err(|error| AppError::Validation(error.to_string()))?;
        let month = captures[2]
            .parse::<u32>()
            .map_err(|error| AppError::Validation(error.to_string()))?;
        Self::new(year, month)
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    /// Stays put at the earliest month chrono supports.
    pub fn previous(self) -> Self {
        let (year, month) = if self.month == 1 {
            (self.year - 1, 12)
        } else {
            (self.year, self.month - 1)
        };
        Self::new(year, month).unwrap_or(self)
    }

    /// Stays put at the latest month chrono supports.
    pub fn next(self) -> Self {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        Self::new(year, month).unwrap_or(self)
    }

    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn days_in_month(self) -> u32 {
        (28..=31)
            .rev()
            .find(|&day| NaiveDate::from_ymd_opt(self.year, self.month, day).is_some())
            .unwrap_or(28)
    }

    /// 0 = Sunday.
    pub fn first_weekday(self) -> u32 {
        self.first_day().weekday().num_days_from_sunday()
    }

    pub fn label(self) -> String {
        let name = MONTH_NAMES.get(self.month.saturating_sub(1) as usize).copied().unwrap_or("Month");
        format!("{} {}", name, self.year)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MoodColor {
    VerySad,
    Sad,
    Neutral,
    Happy,
    VeryHappy,
}

impl MoodColor {
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(Self::VerySad),
            1 => Some(Self::Sad),
            2 => Some(Self::Neutral),
            3 => Some(Self::Happy),
            4 => Some(Self::VeryHappy),
            _ => None,
        }
    }

    pub fn swatch(self) -> &'static str {
        match self {
            Self::VerySad => "#FECACA",
            Self::Sad => "#FED7AA",
            Self::Neutral => "#FEF08A",
            Self::Happy => "#BBF7D0",
            Self::VeryHappy => "#86EFAC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayCell {
    pub date: NaiveDate,
    pub day: u32,
    pub color: Option<MoodColor>,
    pub entry: Option<MoodEntry>,
    pub is_today: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CalendarCell {
    Blank,
    Day(DayCell),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarGrid {
    pub month: YearMonth,
    pub label: String,
    pub cells: Vec<CalendarCell>,
}

impl CalendarGrid {
    pub fn blank_count(&self) -> usize {
        self.cells.iter().filter(|cell| matches!(cell, CalendarCell::Blank)).count()
    }

    pub fn days(&self) -> impl Iterator<Item = &DayCell> {
        self.cells.iter().filter_map(|cell| match cell {
            CalendarCell::Day(day) => Some(day),
            CalendarCell::Blank => None,
        })
    }
}

pub fn project(month: YearMonth, entries: &[MoodEntry], today: NaiveDate) -> CalendarGrid {
    let by_date: HashMap<NaiveDate, &MoodEntry> = entries.iter().map(|entry| (entry.date, entry)).collect();

    let leading = month.first_weekday() as usize;
    let total_days = month.days_in_month();
    let mut cells = Vec::with_capacity(leading + total_days as usize);
    cells.extend(std::iter::repeat(CalendarCell::Blank).take(leading));

    for (offset, date) in month.first_day().iter_days().take(total_days as usize).enumerate() {
        let entry = by_date.get(&date).map(|entry| (*entry).clone());
        cells.push(CalendarCell::Day(DayCell {
            date,
            day: offset as u32 + 1,
            color: entry.as_ref().and_then(|entry| MoodColor::from_level(entry.mood)),
            entry,
            is_today: date == today,
        }));
    }

    CalendarGrid {
        month,
        label: month.label(),
        cells,
    }
}
