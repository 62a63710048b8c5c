use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime, Timelike};
use derive_more::Display;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::ToSchema;

use crate::model::leave::LeaveType;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// A calendar month.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, ToSchema,
)]
#[display(fmt = "{:04}-{:02}", year, month)]
pub struct YearMonth {
    #[schema(example = 2025)]
    pub year: i32,
    #[schema(example = 3)]
    pub month: u32,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid month `{0}` (expected YYYY-MM)")]
pub struct InvalidMonth(pub String);

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, InvalidMonth> {
        if (1..=12).contains(&month) && NaiveDate::from_ymd_opt(year, month, 1).is_some() {
            Ok(Self { year, month })
        } else {
            Err(InvalidMonth(format!("{year}-{month}")))
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next().first_day().pred_opt().unwrap_or(NaiveDate::MAX)
    }

    /// Every calendar day of the month, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let last = self.last_day();
        self.first_day().iter_days().take_while(move |d| *d <= last)
    }

    /// Months from `self` to `to`, both inclusive. Empty when `to` is earlier.
    pub fn through(self, to: YearMonth) -> Vec<YearMonth> {
        let mut months = Vec::new();
        let mut current = self;
        while current <= to {
            months.push(current);
            current = current.next();
        }
        months
    }

    /// Number of months from `self` to `to`, both included; zero when `to`
    /// comes first.
    pub fn months_through(self, to: YearMonth) -> i64 {
        let span = i64::from(to.year - self.year) * 12 + i64::from(to.month) - i64::from(self.month) + 1;
        span.max(0)
    }
}

impl FromStr for YearMonth {
    type Err = InvalidMonth;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| InvalidMonth(s.to_string()))?;
        let year = year.parse().map_err(|_| InvalidMonth(s.to_string()))?;
        let month = month.parse().map_err(|_| InvalidMonth(s.to_string()))?;
        Self::new(year, month).map_err(|_| InvalidMonth(s.to_string()))
    }
}

/// Averaged time of day, already rounded to the minute.
///
/// Serialized as `HH:MM`, which is also exactly what the spreadsheet shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AverageTime {
    minutes: u32,
}

impl AverageTime {
    /// Rounds a mean offset in seconds to the nearest minute (30 s rounds up).
    pub fn from_mean_seconds(seconds: f64) -> Self {
        let minutes = (seconds / 60.0).round().max(0.0) as u32;
        Self {
            minutes: minutes.min(MINUTES_PER_DAY - 1),
        }
    }

    pub fn from_hm(hour: u32, minute: u32) -> Self {
        Self {
            minutes: (hour * 60 + minute).min(MINUTES_PER_DAY - 1),
        }
    }
}

impl fmt::Display for AverageTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.minutes / 60, self.minutes % 60)
    }
}

impl Serialize for AverageTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AverageTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let time = NaiveTime::parse_from_str(&text, "%H:%M").map_err(serde::de::Error::custom)?;
        Ok(Self::from_hm(time.hour(), time.minute()))
    }
}

/// Text shown for an undefined average.
pub const UNDEFINED_AVERAGE: &str = "-";

/// Display form of a day time: `HH:MM`, seconds truncated.
pub fn format_time(time: Option<NaiveTime>) -> String {
    time.map(|t| t.format("%H:%M").to_string())
        .unwrap_or_default()
}

pub fn format_average(avg: Option<AverageTime>) -> String {
    avg.map(|a| a.to_string())
        .unwrap_or_else(|| UNDEFINED_AVERAGE.to_string())
}

/// Rendering classification of one day cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DayClass {
    Normal,
    Weekend,
    /// Before the hire date; drawn with a diagonal and never averaged.
    PreEmployment,
    HalfDayLeave,
    FullLeave,
    /// Tombstoned record; renders empty.
    Deleted,
}

impl DayClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DayClass::Normal => "normal",
            DayClass::Weekend => "weekend",
            DayClass::PreEmployment => "pre_employment",
            DayClass::HalfDayLeave => "half_day_leave",
            DayClass::FullLeave => "full_leave",
            DayClass::Deleted => "deleted",
        }
    }
}

/// Strings a renderer puts on screen for a cell. Grid and export share these.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CellDisplay {
    #[schema(example = "09:00")]
    pub check_in: String,
    #[schema(example = "18:00")]
    pub check_out: String,
    #[schema(example = "반차")]
    pub leave: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DayCell {
    #[schema(example = "2025-03-10", value_type = String, format = "date")]
    pub date: NaiveDate,
    #[schema(example = "Mon")]
    pub weekday: String,
    pub class: DayClass,
    #[schema(value_type = Option<String>)]
    pub check_in: Option<NaiveTime>,
    #[schema(value_type = Option<String>)]
    pub check_out: Option<NaiveTime>,
    pub leave: Option<LeaveType>,
    /// Weight this day adds to the check-in average.
    pub check_in_weight: f64,
    /// Weight this day adds to the check-out average.
    pub check_out_weight: f64,
    /// Configured early-release day; its check-out is not averaged.
    pub early_release: bool,
    pub display: CellDisplay,
}

impl DayCell {
    /// Nothing to show: no times and no leave.
    pub fn is_empty(&self) -> bool {
        self.check_in.is_none() && self.check_out.is_none() && self.leave.is_none()
    }
}

/// Derived month view for one employee. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MonthlyGrid {
    #[schema(example = 1)]
    pub employee_id: i64,
    #[schema(example = "Kim Minji")]
    pub employee_name: String,
    pub month: YearMonth,
    pub cells: Vec<DayCell>,
    #[schema(value_type = Option<String>, example = "09:04")]
    pub average_check_in: Option<AverageTime>,
    #[schema(value_type = Option<String>, example = "18:12")]
    pub average_check_out: Option<AverageTime>,
    pub check_in_weight: f64,
    pub check_out_weight: f64,
}

impl MonthlyGrid {
    pub fn cell(&self, date: NaiveDate) -> Option<&DayCell> {
        self.cells.iter().find(|c| c.date == date)
    }

    pub fn average_check_in_text(&self) -> String {
        format_average(self.average_check_in)
    }

    pub fn average_check_out_text(&self) -> String {
        format_average(self.average_check_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_days_cover_whole_month() {
        let feb = YearMonth::new(2024, 2).unwrap();
        let days: Vec<_> = feb.days().collect();
        assert_eq!(days.len(), 29);
        assert_eq!(days[0], NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(days[28], NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        let dec = YearMonth::new(2025, 12).unwrap();
        assert_eq!(dec.days().count(), 31);
        assert_eq!(dec.next(), YearMonth::new(2026, 1).unwrap());
    }

    #[test]
    fn parses_and_formats_months() {
        let ym: YearMonth = "2025-03".parse().unwrap();
        assert_eq!(ym, YearMonth::new(2025, 3).unwrap());
        assert_eq!(ym.to_string(), "2025-03");
        assert!("2025-13".parse::<YearMonth>().is_err());
        assert!("march".parse::<YearMonth>().is_err());
    }

    #[test]
    fn month_range_is_inclusive() {
        let from = YearMonth::new(2024, 11).unwrap();
        let to = YearMonth::new(2025, 2).unwrap();
        let months = from.through(to);
        assert_eq!(months.len(), 4);
        assert_eq!(months[3], to);
        assert!(to.through(from).is_empty());
        assert_eq!(from.months_through(to), 4);
        assert_eq!(to.months_through(from), 0);
        assert_eq!(
            YearMonth::new(1, 1).unwrap().months_through(YearMonth::new(9999, 12).unwrap()),
            119_988
        );
    }

    #[test]
    fn averages_round_to_nearest_minute() {
        assert_eq!(AverageTime::from_mean_seconds(9.0 * 3600.0 + 29.0).to_string(), "09:00");
        assert_eq!(AverageTime::from_mean_seconds(9.0 * 3600.0 + 30.0).to_string(), "09:01");
        assert_eq!(AverageTime::from_mean_seconds(86_399.0).to_string(), "23:59");
    }

    #[test]
    fn average_serializes_as_display_text() {
        let avg = AverageTime::from_hm(18, 5);
        assert_eq!(serde_json::to_string(&avg).unwrap(), "\"18:05\"");
        let back: AverageTime = serde_json::from_str("\"18:05\"").unwrap();
        assert_eq!(back, avg);
        assert_eq!(format_average(None), UNDEFINED_AVERAGE);
    }

    #[test]
    fn day_times_drop_seconds() {
        let t = NaiveTime::from_hms_opt(8, 59, 59);
        assert_eq!(format_time(t), "08:59");
        assert_eq!(format_time(None), "");
    }
}
