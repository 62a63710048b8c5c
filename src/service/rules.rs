//! Calendar and leave predicates shared by the grid and the exporter.
//!
//! Everything here is pure. Both output paths receive the same [`RuleSet`]
//! so there is exactly one implementation of each rule.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, Weekday};

use crate::model::leave::{LeaveEffect, LeaveType};

/// Saturday or Sunday.
pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// The third Wednesday of the month, when staff leave at 17:00.
pub fn is_third_wednesday(date: NaiveDate) -> bool {
    EarlyReleaseRule::default().matches(date)
}

/// "nth `weekday` of the month" rule for the early-release day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarlyReleaseRule {
    pub nth: u32,
    pub weekday: Weekday,
}

impl Default for EarlyReleaseRule {
    fn default() -> Self {
        Self {
            nth: 3,
            weekday: Weekday::Wed,
        }
    }
}

impl EarlyReleaseRule {
    pub fn matches(&self, date: NaiveDate) -> bool {
        date.weekday() == self.weekday && (date.day() - 1) / 7 + 1 == self.nth
    }
}

impl fmt::Display for EarlyReleaseRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.nth, self.weekday)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid early-release rule `{0}` (expected `<nth>:<weekday>` or `off`)")]
pub struct InvalidRule(pub String);

impl FromStr for EarlyReleaseRule {
    type Err = InvalidRule;

    /// Parses `3:wed`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || InvalidRule(s.to_string());
        let (nth, weekday) = s.trim().split_once(':').ok_or_else(bad)?;
        let nth: u32 = nth.trim().parse().map_err(|_| bad())?;
        if !(1..=5).contains(&nth) {
            return Err(bad());
        }
        let weekday = weekday.trim().parse::<Weekday>().map_err(|_| bad())?;
        Ok(Self { nth, weekday })
    }
}

/// Configured exception rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    weekend_days: BTreeSet<u32>,
    early_release: Option<EarlyReleaseRule>,
    half_day_codes: BTreeSet<LeaveType>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new(
            [Weekday::Sat, Weekday::Sun],
            Some(EarlyReleaseRule::default()),
            [LeaveType::HalfDay, LeaveType::HalfDayAm, LeaveType::HalfDayPm],
        )
    }
}

impl RuleSet {
    pub fn new(
        weekend_days: impl IntoIterator<Item = Weekday>,
        early_release: Option<EarlyReleaseRule>,
        half_day_codes: impl IntoIterator<Item = LeaveType>,
    ) -> Self {
        Self {
            weekend_days: weekend_days
                .into_iter()
                .map(|d| d.number_from_monday())
                .collect(),
            early_release,
            half_day_codes: half_day_codes.into_iter().collect(),
        }
    }

    pub fn is_weekend(&self, date: NaiveDate) -> bool {
        self.weekend_days
            .contains(&date.weekday().number_from_monday())
    }

    /// Early-release day: its check-out is left out of the average.
    pub fn is_early_release_day(&self, date: NaiveDate) -> bool {
        self.early_release.is_some_and(|rule| rule.matches(date))
    }

    pub fn is_half_day_leave(&self, leave: LeaveType) -> bool {
        self.half_day_codes.contains(&leave)
    }

    /// Closed mapping from leave type to averaging behaviour.
    ///
    /// The configured half-day set wins; a half-day type taken out of that set
    /// counts as a full leave day.
    pub fn leave_effect(&self, leave: LeaveType) -> LeaveEffect {
        if self.is_half_day_leave(leave) {
            return LeaveEffect::HalfWeight;
        }
        match leave.base_effect() {
            LeaveEffect::HalfWeight => LeaveEffect::FullExclusion,
            other => other,
        }
    }

    pub fn early_release(&self) -> Option<EarlyReleaseRule> {
        self.early_release
    }

    pub fn half_day_codes(&self) -> impl Iterator<Item = LeaveType> + '_ {
        self.half_day_codes.iter().copied()
    }
}
