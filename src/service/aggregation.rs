//! Monthly attendance grid construction.
//!
//! The grid API and the spreadsheet exporter both call [`build_monthly_grid`];
//! they differ only in how they encode the result.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use tracing::debug;

use crate::error::Result;
use crate::model::attendance::AttendanceDay;
use crate::model::employee::Employee;
use crate::model::grid::{AverageTime, CellDisplay, DayCell, DayClass, MonthlyGrid, YearMonth, format_time};
use crate::model::leave::LeaveEffect;
use crate::service::rules::RuleSet;

const FULL_WEIGHT: f64 = 1.0;
const HALF_WEIGHT: f64 = 0.5;

/// Store snapshot needed to build one employee's month.
#[derive(Debug, Clone)]
pub struct MonthRecords {
    pub employee: Employee,
    pub month: YearMonth,
    pub days: Vec<AttendanceDay>,
}

/// Weighted running mean of time-of-day offsets in seconds.
#[derive(Debug, Default, Clone, Copy)]
struct WeightedMean {
    weighted_seconds: f64,
    weight: f64,
}

impl WeightedMean {
    fn add(&mut self, time: NaiveTime, weight: f64) {
        if weight > 0.0 {
            self.weighted_seconds += f64::from(time.num_seconds_from_midnight()) * weight;
            self.weight += weight;
        }
    }

    /// `None` when nothing contributed.
    fn average(&self) -> Option<AverageTime> {
        (self.weight > 0.0).then(|| AverageTime::from_mean_seconds(self.weighted_seconds / self.weight))
    }
}

fn classify(
    date: NaiveDate,
    employee: &Employee,
    record: Option<&AttendanceDay>,
    rules: &RuleSet,
) -> (DayClass, f64) {
    if employee.is_before_hire(date) {
        return (DayClass::PreEmployment, 0.0);
    }
    if rules.is_weekend(date) {
        return (DayClass::Weekend, 0.0);
    }
    let Some(record) = record else {
        return (DayClass::Normal, FULL_WEIGHT);
    };
    if record.deleted {
        return (DayClass::Deleted, 0.0);
    }
    match record.leave.map(|leave| rules.leave_effect(leave)) {
        Some(LeaveEffect::FullExclusion) => (DayClass::FullLeave, 0.0),
        Some(LeaveEffect::HalfWeight) => (DayClass::HalfDayLeave, HALF_WEIGHT),
        Some(LeaveEffect::NoExclusion) | None => (DayClass::Normal, FULL_WEIGHT),
    }
}

fn build_cell(
    date: NaiveDate,
    employee: &Employee,
    record: Option<&AttendanceDay>,
    rules: &RuleSet,
) -> DayCell {
    let (class, weight) = classify(date, employee, record, rules);
    let early_release = rules.is_early_release_day(date);

    // Pre-employment and tombstoned days show nothing at all.
    let shown = match class {
        DayClass::PreEmployment | DayClass::Deleted => None,
        _ => record.and_then(AttendanceDay::live),
    };
    let check_in = shown.and_then(|r| r.check_in);
    let check_out = shown.and_then(|r| r.check_out);
    let leave = shown.and_then(|r| r.leave);

    let check_in_weight = if check_in.is_some() { weight } else { 0.0 };
    let check_out_weight = if check_out.is_some() && !early_release {
        weight
    } else {
        0.0
    };

    DayCell {
        date,
        weekday: date.weekday().to_string(),
        class,
        check_in,
        check_out,
        leave,
        check_in_weight,
        check_out_weight,
        early_release,
        display: CellDisplay {
            check_in: format_time(check_in),
            check_out: format_time(check_out),
            leave: leave.map(|l| l.label().to_string()).unwrap_or_default(),
        },
    }
}

/// Build the month grid for one employee from a store snapshot.
///
/// Deterministic: the same snapshot always yields an identical grid.
pub fn build_monthly_grid(records: &MonthRecords, rules: &RuleSet) -> MonthlyGrid {
    let by_date: HashMap<NaiveDate, &AttendanceDay> = records
        .days
        .iter()
        .filter(|d| d.key.employee_id == records.employee.id)
        .map(|d| (d.key.date, d))
        .collect();

    let mut check_ins = WeightedMean::default();
    let mut check_outs = WeightedMean::default();
    let mut cells = Vec::with_capacity(31);

    for date in records.month.days() {
        let cell = build_cell(date, &records.employee, by_date.get(&date).copied(), rules);
        if let Some(t) = cell.check_in {
            check_ins.add(t, cell.check_in_weight);
        }
        if let Some(t) = cell.check_out {
            check_outs.add(t, cell.check_out_weight);
        }
        cells.push(cell);
    }

    debug!(
        employee_id = records.employee.id,
        month = %records.month,
        check_in_weight = check_ins.weight,
        check_out_weight = check_outs.weight,
        "Monthly grid built"
    );

    MonthlyGrid {
        employee_id: records.employee.id,
        employee_name: records.employee.display_name.clone(),
        month: records.month,
        cells,
        average_check_in: check_ins.average(),
        average_check_out: check_outs.average(),
        check_in_weight: check_ins.weight,
        check_out_weight: check_outs.weight,
    }
}

/// Grids for a batch of snapshots. A failed snapshot stays a failure of its
/// own and does not affect the others.
pub fn build_many(
    batch: Vec<(i64, YearMonth, Result<MonthRecords>)>,
    rules: &RuleSet,
) -> Vec<(i64, YearMonth, Result<MonthlyGrid>)> {
    batch
        .into_iter()
        .map(|(employee_id, month, records)| {
            (employee_id, month, records.map(|r| build_monthly_grid(&r, rules)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attendance::CellKey;
    use crate::model::leave::LeaveType;
    use chrono::{TimeZone, Utc, Weekday};

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn hm(h: u32, m: u32) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(h, m, 0)
    }

    fn employee(hire_date: Option<NaiveDate>) -> Employee {
        Employee {
            id: 1,
            employee_code: "A01".into(),
            display_name: "Kim Minji".into(),
            hire_date,
            status: "active".into(),
        }
    }

    fn day(
        date: NaiveDate,
        check_in: Option<NaiveTime>,
        check_out: Option<NaiveTime>,
        leave: Option<LeaveType>,
    ) -> AttendanceDay {
        AttendanceDay {
            key: CellKey::new(1, date),
            check_in,
            check_out,
            leave,
            deleted: false,
            modified_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    /// September 2025: 30 days, 8 weekend days, third Wednesday on the 17th.
    fn september(days: Vec<AttendanceDay>) -> MonthRecords {
        MonthRecords {
            employee: employee(NaiveDate::from_ymd_opt(2020, 1, 1)),
            month: YearMonth::new(2025, 9).unwrap(),
            days,
        }
    }

    #[test]
    fn worked_example_weights_and_averages() {
        let month = YearMonth::new(2025, 9).unwrap();
        let mut days = Vec::new();
        for d in month.days() {
            if matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
                continue;
            }
            let entry = match d.day() {
                5 => day(d, hm(13, 0), hm(18, 0), Some(LeaveType::HalfDayAm)),
                8 | 9 => day(d, None, None, Some(LeaveType::Annual)),
                17 => day(d, hm(9, 0), hm(17, 0), None),
                _ => day(d, hm(9, 0), hm(18, 0), None),
            };
            days.push(entry);
        }

        let grid = build_monthly_grid(&september(days), &RuleSet::default());

        let weekends = grid.cells.iter().filter(|c| c.class == DayClass::Weekend).count();
        assert_eq!(grid.cells.len(), 30);
        assert_eq!(weekends, 8);
        // 30 - 8 weekend - 2 full leave - 0.5 for the half day
        assert_eq!(grid.check_in_weight, 19.5);
        // ...and the third Wednesday drops out of the check-out side
        assert_eq!(grid.check_out_weight, 18.5);
        // (19 * 540 + 0.5 * 780) / 19.5 = 546.15 minutes
        assert_eq!(grid.average_check_in_text(), "09:06");
        assert_eq!(grid.average_check_out_text(), "18:00");

        let early = grid.cell(date(9, 17)).unwrap();
        assert!(early.early_release);
        assert_eq!(early.check_in_weight, 1.0);
        assert_eq!(early.check_out_weight, 0.0);
        assert_eq!(early.display.check_out, "17:00");

        assert_eq!(grid.cell(date(9, 5)).unwrap().class, DayClass::HalfDayLeave);
        assert_eq!(grid.cell(date(9, 8)).unwrap().class, DayClass::FullLeave);
    }

    #[test]
    fn pre_employment_days_never_contribute() {
        let records = MonthRecords {
            employee: employee(NaiveDate::from_ymd_opt(2025, 3, 10)),
            month: YearMonth::new(2025, 3).unwrap(),
            days: vec![
                day(date(3, 5), hm(6, 0), hm(23, 0), None),
                day(date(3, 10), hm(9, 0), hm(18, 0), None),
                day(date(3, 11), hm(9, 30), hm(18, 30), None),
            ],
        };
        let grid = build_monthly_grid(&records, &RuleSet::default());

        for cell in &grid.cells {
            let before = cell.date < date(3, 10);
            assert_eq!(cell.class == DayClass::PreEmployment, before, "{}", cell.date);
            if before {
                assert!(cell.is_empty());
                assert_eq!(cell.check_in_weight, 0.0);
            }
        }
        assert_eq!(grid.check_in_weight, 2.0);
        assert_eq!(grid.average_check_in_text(), "09:15");
        assert_eq!(grid.average_check_out_text(), "18:15");
    }

    #[test]
    fn missing_hire_date_marks_nothing() {
        let records = MonthRecords {
            employee: employee(None),
            month: YearMonth::new(2025, 3).unwrap(),
            days: vec![day(date(3, 3), hm(9, 0), None, None)],
        };
        let grid = build_monthly_grid(&records, &RuleSet::default());
        assert!(grid.cells.iter().all(|c| c.class != DayClass::PreEmployment));
        assert_eq!(grid.average_check_in_text(), "09:00");
    }

    #[test]
    fn empty_month_has_undefined_averages() {
        let grid = build_monthly_grid(&september(Vec::new()), &RuleSet::default());
        assert_eq!(grid.average_check_in, None);
        assert_eq!(grid.average_check_out, None);
        assert_eq!(grid.average_check_in_text(), "-");
        assert!(grid.cells.iter().all(|c| c.is_empty()));
    }

    #[test]
    fn check_in_and_check_out_count_independently() {
        let grid = build_monthly_grid(
            &september(vec![
                day(date(9, 1), hm(9, 0), None, None),
                day(date(9, 2), None, hm(19, 0), None),
            ]),
            &RuleSet::default(),
        );
        assert_eq!(grid.check_in_weight, 1.0);
        assert_eq!(grid.check_out_weight, 1.0);
        assert_eq!(grid.average_check_in_text(), "09:00");
        assert_eq!(grid.average_check_out_text(), "19:00");
    }

    #[test]
    fn weekend_and_deleted_days_are_excluded() {
        let mut deleted = day(date(9, 3), hm(5, 0), hm(23, 0), None);
        deleted.deleted = true;
        let grid = build_monthly_grid(
            &september(vec![
                day(date(9, 6), hm(11, 0), hm(15, 0), None),
                deleted,
                day(date(9, 4), hm(9, 0), hm(18, 0), None),
            ]),
            &RuleSet::default(),
        );

        let weekend = grid.cell(date(9, 6)).unwrap();
        assert_eq!(weekend.class, DayClass::Weekend);
        assert_eq!(weekend.display.check_in, "11:00");
        assert_eq!(weekend.check_in_weight, 0.0);

        let tomb = grid.cell(date(9, 3)).unwrap();
        assert_eq!(tomb.class, DayClass::Deleted);
        assert!(tomb.is_empty());
        assert_eq!(tomb.display, CellDisplay::default());

        assert_eq!(grid.average_check_in_text(), "09:00");
        assert_eq!(grid.average_check_out_text(), "18:00");
    }

    #[test]
    fn no_exclusion_leave_counts_as_working_day() {
        let grid = build_monthly_grid(
            &september(vec![day(date(9, 1), hm(7, 0), hm(20, 0), Some(LeaveType::OfficialTrip))]),
            &RuleSet::default(),
        );
        let cell = grid.cell(date(9, 1)).unwrap();
        assert_eq!(cell.class, DayClass::Normal);
        assert_eq!(cell.display.leave, "출장");
        assert_eq!(grid.check_in_weight, 1.0);
    }

    #[test]
    fn building_twice_is_identical() {
        let records = september(vec![
            day(date(9, 1), hm(9, 1), hm(18, 2), None),
            day(date(9, 2), hm(8, 47), hm(18, 40), Some(LeaveType::HalfDayPm)),
        ]);
        let rules = RuleSet::default();
        assert_eq!(build_monthly_grid(&records, &rules), build_monthly_grid(&records, &rules));
    }

    #[test]
    fn batch_keeps_failures_separate() {
        let records = september(vec![day(date(9, 1), hm(9, 0), hm(18, 0), None)]);
        let month = records.month;
        let grids = build_many(
            vec![
                (1, month, Ok(records)),
                (2, month, Err(crate::error::AttendanceError::EmployeeNotFound(2))),
            ],
            &RuleSet::default(),
        );
        assert_eq!(grids.len(), 2);
        assert_eq!(grids[0].2.as_ref().unwrap().average_check_in_text(), "09:00");
        assert!(grids[1].2.is_err());
    }
}
