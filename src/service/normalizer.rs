//! Validation of raw day entries before they reach the staging buffer.

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use utoipa::ToSchema;

use crate::model::attendance::{CellKey, NormalizedDay, RawEntry};
use crate::model::leave::LeaveType;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("`{0}` is not a calendar date (expected YYYY-MM-DD)")]
    InvalidDate(String),
    #[error("`{0}` is not a time of day (expected HH:MM)")]
    InvalidTime(String),
    #[error("unknown leave type `{0}`")]
    UnknownLeave(String),
    #[error("check-out {check_out} is before check-in {check_in}")]
    CheckOutBeforeCheckIn {
        check_in: NaiveTime,
        check_out: NaiveTime,
    },
    #[error("cannot read cell text `{0}`")]
    UnreadableCell(String),
    #[error("entry has no times and no leave")]
    EmptyEntry,
    #[error("no such employee")]
    UnknownEmployee,
}

/// A single entry refused by the normalizer, flagged for manual correction.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, ToSchema)]
#[error("employee {employee_id} on {date}: {reason}")]
pub struct Rejection {
    pub employee_id: i64,
    /// Date as it was given, which may not be a valid date.
    pub date: String,
    #[serde(serialize_with = "serialize_reason")]
    #[schema(value_type = String)]
    pub reason: ValidationError,
}

fn serialize_reason<S: serde::Serializer>(
    reason: &ValidationError,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(reason)
}

pub fn parse_date(text: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(text.to_string()))
}

/// Accepts `HH:MM`, `HH:MM:SS` and `HHMM`.
pub fn parse_time(text: &str) -> Result<NaiveTime, ValidationError> {
    let text = text.trim();
    ["%H:%M", "%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            if text.len() == 4 && text.chars().all(|c| c.is_ascii_digit()) {
                NaiveTime::parse_from_str(text, "%H%M").ok()
            } else {
                None
            }
        })
        .ok_or_else(|| ValidationError::InvalidTime(text.to_string()))
}

pub fn parse_leave(text: &str) -> Result<LeaveType, ValidationError> {
    LeaveType::from_str(text.trim()).map_err(|_| ValidationError::UnknownLeave(text.to_string()))
}

fn optional<T>(
    text: Option<&str>,
    parse: impl Fn(&str) -> Result<T, ValidationError>,
) -> Result<Option<T>, ValidationError> {
    match text.map(str::trim) {
        None | Some("") => Ok(None),
        Some(t) => parse(t).map(Some),
    }
}

fn check_order(
    check_in: Option<NaiveTime>,
    check_out: Option<NaiveTime>,
) -> Result<(), ValidationError> {
    match (check_in, check_out) {
        (Some(check_in), Some(check_out)) if check_out < check_in => {
            Err(ValidationError::CheckOutBeforeCheckIn { check_in, check_out })
        }
        _ => Ok(()),
    }
}

/// Validate and canonicalize a raw entry.
pub fn normalize(raw: &RawEntry) -> Result<NormalizedDay, Rejection> {
    let reject = |reason| Rejection {
        employee_id: raw.employee_id,
        date: raw.date.clone(),
        reason,
    };

    let date = parse_date(&raw.date).map_err(reject)?;
    let check_in = optional(raw.check_in.as_deref(), parse_time).map_err(reject)?;
    let check_out = optional(raw.check_out.as_deref(), parse_time).map_err(reject)?;
    let leave = optional(raw.leave.as_deref(), parse_leave).map_err(reject)?;

    if check_in.is_none() && check_out.is_none() && leave.is_none() {
        return Err(reject(ValidationError::EmptyEntry));
    }
    check_order(check_in, check_out).map_err(reject)?;

    Ok(NormalizedDay {
        key: CellKey::new(raw.employee_id, date),
        check_in,
        check_out,
        leave,
    })
}

/// Normalize a batch; bad entries are returned beside the good ones.
pub fn normalize_batch(raws: &[RawEntry]) -> (Vec<NormalizedDay>, Vec<Rejection>) {
    let mut accepted = Vec::with_capacity(raws.len());
    let mut rejected = Vec::new();
    for raw in raws {
        match normalize(raw) {
            Ok(day) => accepted.push(day),
            Err(rejection) => {
                debug!(%rejection, "Entry rejected");
                rejected.push(rejection);
            }
        }
    }
    (accepted, rejected)
}

/// Split off days whose employee is not in `known`; they could never be stored.
pub fn reject_unknown_employees(
    days: Vec<NormalizedDay>,
    known: &HashSet<i64>,
) -> (Vec<NormalizedDay>, Vec<Rejection>) {
    let (accepted, unknown): (Vec<_>, Vec<_>) = days
        .into_iter()
        .partition(|day| known.contains(&day.key.employee_id));
    let rejected = unknown
        .into_iter()
        .map(|day| Rejection {
            employee_id: day.key.employee_id,
            date: day.key.date.to_string(),
            reason: ValidationError::UnknownEmployee,
        })
        .collect();
    (accepted, rejected)
}

/// Read the text of a grid cell.
///
/// Grammar: at most one leave token and at most one time token, separated by
/// whitespace. Time tokens are `09:00-18:00`, `09:00~18:00`, `09:00` (check-in
/// only) or `-18:00` / `~18:00` (check-out only). Blank text is delete intent
/// and must be handled by the caller.
pub fn parse_cell_text(key: CellKey, text: &str) -> Result<NormalizedDay, Rejection> {
    let reject = |reason| Rejection {
        employee_id: key.employee_id,
        date: key.date.to_string(),
        reason,
    };
    let unreadable = || reject(ValidationError::UnreadableCell(text.to_string()));

    let mut raw = RawEntry {
        employee_id: key.employee_id,
        date: key.date.to_string(),
        ..RawEntry::default()
    };
    let mut seen_times = false;

    for token in text.split_whitespace() {
        if is_time_token(token) {
            if seen_times {
                return Err(unreadable());
            }
            seen_times = true;
            match token.split_once(['-', '~']) {
                Some((check_in, check_out)) => {
                    raw.check_in = Some(check_in.to_string());
                    raw.check_out = Some(check_out.to_string());
                }
                None => raw.check_in = Some(token.to_string()),
            }
        } else {
            if raw.leave.is_some() {
                return Err(unreadable());
            }
            raw.leave = Some(token.to_string());
        }
    }

    normalize(&raw)
}

fn is_time_token(token: &str) -> bool {
    token
        .trim_start_matches(['-', '~'])
        .starts_with(|c: char| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(date: &str, check_in: Option<&str>, check_out: Option<&str>, leave: Option<&str>) -> RawEntry {
        RawEntry {
            employee_id: 7,
            date: date.into(),
            check_in: check_in.map(Into::into),
            check_out: check_out.map(Into::into),
            leave: leave.map(Into::into),
        }
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn key(d: u32) -> CellKey {
        CellKey::new(7, NaiveDate::from_ymd_opt(2025, 9, d).unwrap())
    }

    #[test]
    fn unknown_employees_are_split_off() {
        let days: Vec<_> = [7, 999, 7]
            .into_iter()
            .zip(1..)
            .map(|(employee_id, d)| {
                let mut entry = raw(&format!("2025-09-0{d}"), Some("09:00"), None, None);
                entry.employee_id = employee_id;
                normalize(&entry).unwrap()
            })
            .collect();
        let known = HashSet::from([7]);

        let (accepted, rejected) = reject_unknown_employees(days, &known);
        assert_eq!(accepted.len(), 2);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].employee_id, 999);
        assert_eq!(rejected[0].date, "2025-09-02");
        assert_eq!(rejected[0].reason, ValidationError::UnknownEmployee);
    }

    #[test]
    fn normalizes_a_regular_day() {
        let day = normalize(&raw("2025-09-01", Some("09:02"), Some("1810"), None)).unwrap();
        assert_eq!(day.key, key(1));
        assert_eq!(day.check_in, Some(hm(9, 2)));
        assert_eq!(day.check_out, Some(hm(18, 10)));
        assert_eq!(day.leave, None);
    }

    #[test]
    fn rejects_impossible_dates() {
        let err = normalize(&raw("2025-02-30", Some("09:00"), None, None)).unwrap_err();
        assert_eq!(err.reason, ValidationError::InvalidDate("2025-02-30".into()));
        assert_eq!(err.employee_id, 7);
        assert_eq!(err.date, "2025-02-30");
    }

    #[test]
    fn flags_check_out_before_check_in() {
        let err = normalize(&raw("2025-09-01", Some("18:00"), Some("09:00"), None)).unwrap_err();
        assert!(matches!(err.reason, ValidationError::CheckOutBeforeCheckIn { .. }));
        assert!(err.to_string().contains("employee 7 on 2025-09-01"));
    }

    #[test]
    fn equal_check_in_and_out_is_accepted() {
        assert!(normalize(&raw("2025-09-01", Some("09:00"), Some("09:00"), None)).is_ok());
    }

    #[test]
    fn rejects_unknown_leave_and_empty_entries() {
        let err = normalize(&raw("2025-09-01", None, None, Some("holiday?"))).unwrap_err();
        assert_eq!(err.reason, ValidationError::UnknownLeave("holiday?".into()));
        let err = normalize(&raw("2025-09-01", Some(" "), None, None)).unwrap_err();
        assert_eq!(err.reason, ValidationError::EmptyEntry);
    }

    #[test]
    fn batch_keeps_good_entries() {
        let (ok, bad) = normalize_batch(&[
            raw("2025-09-01", Some("09:00"), Some("18:00"), None),
            raw("2025-09-31", Some("09:00"), None, None),
            raw("2025-09-02", None, None, Some("annual")),
        ]);
        assert_eq!(ok.len(), 2);
        assert_eq!(bad.len(), 1);
        assert_eq!(bad[0].date, "2025-09-31");
    }

    #[test]
    fn reads_cell_text_forms() {
        let day = parse_cell_text(key(1), "09:00-18:00").unwrap();
        assert_eq!((day.check_in, day.check_out), (Some(hm(9, 0)), Some(hm(18, 0))));

        let day = parse_cell_text(key(1), "반차 13:00~18:30").unwrap();
        assert_eq!(day.leave, Some(LeaveType::HalfDay));
        assert_eq!(day.check_in, Some(hm(13, 0)));
        assert_eq!(day.check_out, Some(hm(18, 30)));

        let day = parse_cell_text(key(1), "08:55").unwrap();
        assert_eq!((day.check_in, day.check_out), (Some(hm(8, 55)), None));

        let day = parse_cell_text(key(1), "-18:00").unwrap();
        assert_eq!((day.check_in, day.check_out), (None, Some(hm(18, 0))));

        let day = parse_cell_text(key(1), "annual").unwrap();
        assert_eq!(day.leave, Some(LeaveType::Annual));
        assert!(day.check_in.is_none());
    }

    #[test]
    fn refuses_ambiguous_cell_text() {
        let err = parse_cell_text(key(1), "annual sick").unwrap_err();
        assert!(matches!(err.reason, ValidationError::UnreadableCell(_)));
        let err = parse_cell_text(key(1), "09:00-12:00 13:00-18:00").unwrap_err();
        assert!(matches!(err.reason, ValidationError::UnreadableCell(_)));
        let err = parse_cell_text(key(1), "18:00-09:00").unwrap_err();
        assert!(matches!(err.reason, ValidationError::CheckOutBeforeCheckIn { .. }));
    }
}
