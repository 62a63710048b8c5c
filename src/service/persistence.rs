//! Sole writer of canonical attendance records.
//!
//! A save runs inside one transaction on one pooled connection. The
//! [`SaveScope`] owning that transaction is handed by `&mut` to every write
//! step, so no step can open a second connection to the same file. Saves hold
//! the write side of an async gate for their whole duration and snapshot reads
//! hold the read side, so a reader never sees a save half-way through.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::error::{AttendanceError, Result};
use crate::model::attendance::{AttendanceDay, CellKey, StagedChange};
use crate::model::employee::Employee;
use crate::model::grid::YearMonth;
use crate::repository::{self, NewEmployee};
use crate::service::aggregation::MonthRecords;
use crate::utils::db_utils::{SqlUpdate, execute_update};

/// SQLite primary and extended result codes meaning "someone else holds the lock".
const BUSY_CODES: &[&str] = &["5", "6", "261", "262", "517"];

/// True for failures caused by another writer rather than by the data.
pub fn is_contention(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => {
            db.code().is_some_and(|c| BUSY_CODES.contains(&c.as_ref()))
                || db.message().contains("database is locked")
        }
        _ => false,
    }
}

fn is_contention_error(err: &AttendanceError) -> bool {
    match err {
        AttendanceError::WriteFailed { source, .. } | AttendanceError::Database(source) => {
            is_contention(source)
        }
        _ => false,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SaveReport {
    pub upserted: usize,
    pub deleted: usize,
    /// 2 when the first attempt hit a busy store.
    pub attempts: u32,
}

/// Transaction scope of one save. Every write goes through it.
pub struct SaveScope<'c> {
    tx: Transaction<'c, Sqlite>,
    now: DateTime<Utc>,
    report: SaveReport,
}

impl<'c> SaveScope<'c> {
    async fn begin(pool: &'c SqlitePool) -> Result<Self> {
        Ok(Self {
            tx: pool.begin().await?,
            now: Utc::now(),
            report: SaveReport::default(),
        })
    }

    async fn apply(&mut self, change: &StagedChange) -> Result<()> {
        let key = change.key();
        let written = match change {
            StagedChange::Upsert { day } => repository::upsert_day(&mut self.tx, day, self.now).await,
            StagedChange::Delete { key } => repository::tombstone_day(&mut self.tx, *key, self.now).await,
        };
        written.map_err(|source| AttendanceError::WriteFailed { key, source })?;
        if change.is_delete() {
            self.report.deleted += 1;
        } else {
            self.report.upserted += 1;
        }
        Ok(())
    }

    async fn restore(&mut self, key: CellKey) -> Result<bool> {
        repository::restore_day(&mut self.tx, key, self.now)
            .await
            .map_err(|source| AttendanceError::WriteFailed { key, source })
    }

    async fn commit(self) -> Result<SaveReport> {
        self.tx.commit().await?;
        Ok(self.report)
    }

    async fn rollback(self) {
        if let Err(e) = self.tx.rollback().await {
            warn!(error = %e, "Rollback failed; the connection discards the transaction on drop");
        }
    }
}

#[derive(Clone)]
pub struct PersistenceCoordinator {
    pool: SqlitePool,
    gate: Arc<RwLock<()>>,
}

impl PersistenceCoordinator {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            gate: Arc::new(RwLock::new(())),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Commit `changes` all-or-nothing.
    ///
    /// A busy store is retried once with a fresh transaction; a second busy
    /// result becomes [`AttendanceError::PersistenceConflict`]. Any other
    /// failure rolls back and names the record that failed.
    pub async fn save(&self, changes: &[StagedChange]) -> Result<SaveReport> {
        if changes.is_empty() {
            return Ok(SaveReport::default());
        }
        let _writer = self.gate.write().await;

        match self.save_once(changes).await {
            Ok(report) => Ok(self.saved(report, 1)),
            Err(first) if is_contention_error(&first) => {
                warn!(error = %first, staged = changes.len(), "Store busy, retrying save once");
                match self.save_once(changes).await {
                    Ok(report) => Ok(self.saved(report, 2)),
                    Err(second) => Err(self.conflict(second, changes)),
                }
            }
            Err(e) => {
                error!(error = %e, staged = changes.len(), "Save rolled back");
                Err(e)
            }
        }
    }

    fn saved(&self, mut report: SaveReport, attempts: u32) -> SaveReport {
        report.attempts = attempts;
        info!(
            upserted = report.upserted,
            deleted = report.deleted,
            attempts,
            "Attendance changes committed"
        );
        report
    }

    fn conflict(&self, err: AttendanceError, changes: &[StagedChange]) -> AttendanceError {
        let context = match &err {
            AttendanceError::WriteFailed { key, .. } => key.to_string(),
            _ => format!("{} staged change(s)", changes.len()),
        };
        error!(error = %err, %context, "Save failed after retry");
        match err {
            AttendanceError::WriteFailed { source, .. } | AttendanceError::Database(source)
                if is_contention(&source) =>
            {
                AttendanceError::PersistenceConflict { context, source }
            }
            other => other,
        }
    }

    async fn save_once(&self, changes: &[StagedChange]) -> Result<SaveReport> {
        let mut scope = SaveScope::begin(&self.pool).await?;
        for change in changes {
            if let Err(e) = scope.apply(change).await {
                scope.rollback().await;
                return Err(e);
            }
        }
        scope.commit().await
    }

    /// Undo a deletion.
    pub async fn restore(&self, key: CellKey) -> Result<()> {
        let _writer = self.gate.write().await;
        let mut scope = SaveScope::begin(&self.pool).await?;
        match scope.restore(key).await {
            Ok(true) => {
                scope.commit().await?;
                info!(%key, "Attendance day restored");
                Ok(())
            }
            Ok(false) => {
                scope.rollback().await;
                Err(AttendanceError::RecordNotFound(key))
            }
            Err(e) => {
                scope.rollback().await;
                Err(e)
            }
        }
    }

    pub async fn create_employee(
        &self,
        employee_code: &str,
        display_name: &str,
        hire_date: Option<NaiveDate>,
    ) -> Result<Employee> {
        let _writer = self.gate.write().await;
        let mut tx = self.pool.begin().await?;
        let employee = repository::insert_employee(
            &mut tx,
            NewEmployee {
                employee_code,
                display_name,
                hire_date,
            },
        )
        .await?;
        tx.commit().await?;
        info!(employee_id = employee.id, employee_code, "Employee created");
        Ok(employee)
    }

    /// Administrative correction of an employee row.
    pub async fn update_employee(&self, employee_id: i64, update: SqlUpdate) -> Result<Employee> {
        let _writer = self.gate.write().await;
        let mut tx = self.pool.begin().await?;
        if execute_update(&mut tx, update).await? == 0 {
            tx.rollback().await?;
            return Err(AttendanceError::EmployeeNotFound(employee_id));
        }
        let employee = repository::fetch_employee(&mut tx, employee_id)
            .await?
            .ok_or(AttendanceError::EmployeeNotFound(employee_id))?;
        tx.commit().await?;
        info!(employee_id, "Employee corrected");
        Ok(employee)
    }

    pub async fn employee(&self, employee_id: i64) -> Result<Employee> {
        let _reader = self.gate.read().await;
        let mut conn = self.pool.acquire().await?;
        repository::fetch_employee(&mut conn, employee_id)
            .await?
            .ok_or(AttendanceError::EmployeeNotFound(employee_id))
    }

    pub async fn employees(&self, search: Option<&str>, limit: i64, offset: i64) -> Result<(Vec<Employee>, i64)> {
        let _reader = self.gate.read().await;
        let mut conn = self.pool.acquire().await?;
        repository::list_employees(&mut conn, search, limit, offset).await
    }

    /// Read one employee's month inside a single read transaction.
    pub async fn load_month(&self, employee_id: i64, month: YearMonth) -> Result<MonthRecords> {
        let _reader = self.gate.read().await;
        let mut tx = self.pool.begin().await?;
        let records = Self::read_month(&mut tx, employee_id, month).await;
        tx.rollback().await?;
        records
    }

    /// Read several months from one consistent snapshot.
    ///
    /// Failures are per (employee, month) so one bad record does not hide
    /// everyone else.
    pub async fn load_months(
        &self,
        employee_ids: &[i64],
        months: &[YearMonth],
    ) -> Result<Vec<(i64, YearMonth, Result<MonthRecords>)>> {
        let _reader = self.gate.read().await;
        let mut tx = self.pool.begin().await?;
        let mut out = Vec::with_capacity(employee_ids.len() * months.len());
        for &employee_id in employee_ids {
            for &month in months {
                let records = Self::read_month(&mut tx, employee_id, month).await;
                out.push((employee_id, month, records));
            }
        }
        tx.rollback().await?;
        Ok(out)
    }

    async fn read_month(
        tx: &mut Transaction<'_, Sqlite>,
        employee_id: i64,
        month: YearMonth,
    ) -> Result<MonthRecords> {
        let employee = repository::fetch_employee(tx, employee_id)
            .await?
            .ok_or(AttendanceError::EmployeeNotFound(employee_id))?;
        let days = repository::fetch_days(tx, employee_id, month.first_day(), month.last_day()).await?;
        Ok(MonthRecords {
            employee,
            month,
            days,
        })
    }

    pub async fn employee_ids(&self) -> Result<Vec<i64>> {
        let _reader = self.gate.read().await;
        let mut conn = self.pool.acquire().await?;
        repository::all_employee_ids(&mut conn).await
    }

    pub async fn day(&self, key: CellKey) -> Result<Option<AttendanceDay>> {
        let _reader = self.gate.read().await;
        let mut conn = self.pool.acquire().await?;
        repository::fetch_day(&mut conn, key).await
    }
}
