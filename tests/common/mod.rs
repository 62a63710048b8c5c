#![allow(dead_code)]

use std::time::Duration;

use attendance_ledger::db::{DbSettings, init_db};
use attendance_ledger::model::attendance::{CellKey, NormalizedDay, StagedChange};
use attendance_ledger::model::employee::Employee;
use attendance_ledger::model::leave::LeaveType;
use attendance_ledger::service::persistence::PersistenceCoordinator;
use chrono::{NaiveDate, NaiveTime};
use tempfile::TempDir;

/// A fresh database file that lives as long as the value.
pub struct TestStore {
    pub url: String,
    pub settings: DbSettings,
    pub store: PersistenceCoordinator,
    _dir: TempDir,
}

pub async fn test_store() -> TestStore {
    test_store_with(DbSettings::default()).await
}

pub async fn test_store_with(settings: DbSettings) -> TestStore {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("ledger.db").display());
    let pool = init_db(&url, &settings).await.unwrap();
    TestStore {
        url,
        settings,
        store: PersistenceCoordinator::new(pool),
        _dir: dir,
    }
}

pub fn short_busy_timeout() -> DbSettings {
    DbSettings {
        max_connections: 2,
        busy_timeout: Duration::from_millis(100),
    }
}

pub async fn hire(store: &PersistenceCoordinator, code: &str, name: &str, hire_date: Option<NaiveDate>) -> Employee {
    store.create_employee(code, name, hire_date).await.unwrap()
}

pub fn sept(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, day).unwrap()
}

pub fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub fn worked(employee_id: i64, date: NaiveDate, check_in: NaiveTime, check_out: NaiveTime) -> StagedChange {
    StagedChange::Upsert {
        day: NormalizedDay {
            key: CellKey::new(employee_id, date),
            check_in: Some(check_in),
            check_out: Some(check_out),
            leave: None,
        },
    }
}

pub fn on_leave(employee_id: i64, date: NaiveDate, leave: LeaveType) -> StagedChange {
    StagedChange::Upsert {
        day: NormalizedDay {
            key: CellKey::new(employee_id, date),
            check_in: None,
            check_out: None,
            leave: Some(leave),
        },
    }
}
