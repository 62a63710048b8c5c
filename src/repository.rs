//! SQL for the canonical store.
//!
//! Every function takes the connection it runs on. Callers decide which
//! transaction that connection belongs to; nothing here opens its own.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use futures_util::TryStreamExt;
use sqlx::{FromRow, SqliteConnection};

use crate::error::{AttendanceError, Result};
use crate::model::attendance::{AttendanceDay, CellKey, NormalizedDay};
use crate::model::employee::Employee;
use crate::model::leave::LeaveType;

#[derive(Debug, FromRow)]
struct AttendanceRow {
    employee_id: i64,
    work_date: NaiveDate,
    check_in: Option<NaiveTime>,
    check_out: Option<NaiveTime>,
    leave_code: Option<String>,
    is_deleted: bool,
    modified_at: DateTime<Utc>,
}

impl TryFrom<AttendanceRow> for AttendanceDay {
    type Error = AttendanceError;

    fn try_from(row: AttendanceRow) -> Result<Self> {
        let corrupt = |reason: String| AttendanceError::CorruptRecord {
            employee_id: row.employee_id,
            date: row.work_date,
            reason,
        };

        let leave = row
            .leave_code
            .as_deref()
            .map(LeaveType::from_str)
            .transpose()
            .map_err(|_| corrupt(format!("unknown leave code {:?}", row.leave_code)))?;

        if let (Some(check_in), Some(check_out)) = (row.check_in, row.check_out) {
            if check_out < check_in {
                return Err(corrupt(format!(
                    "check-out {check_out} before check-in {check_in}"
                )));
            }
        }

        Ok(AttendanceDay {
            key: CellKey::new(row.employee_id, row.work_date),
            check_in: row.check_in,
            check_out: row.check_out,
            leave,
            deleted: row.is_deleted,
            modified_at: row.modified_at,
        })
    }
}

pub struct NewEmployee<'a> {
    pub employee_code: &'a str,
    pub display_name: &'a str,
    pub hire_date: Option<NaiveDate>,
}

pub async fn insert_employee(conn: &mut SqliteConnection, new: NewEmployee<'_>) -> Result<Employee> {
    let id = sqlx::query(
        r#"
        INSERT INTO employees (employee_code, display_name, hire_date)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(new.employee_code)
    .bind(new.display_name)
    .bind(new.hire_date)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    fetch_employee(conn, id)
        .await?
        .ok_or(AttendanceError::EmployeeNotFound(id))
}

pub async fn fetch_employee(conn: &mut SqliteConnection, id: i64) -> Result<Option<Employee>> {
    let employee = sqlx::query_as::<_, Employee>(
        r#"
        SELECT id, employee_code, display_name, hire_date, status
        FROM employees
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(employee)
}

/// Page of employees, newest first, with the total matching count.
pub async fn list_employees(
    conn: &mut SqliteConnection,
    search: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Employee>, i64)> {
    let pattern = search.map(|s| format!("%{s}%"));

    let total = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM employees
        WHERE ?1 IS NULL OR display_name LIKE ?1 OR employee_code LIKE ?1
        "#,
    )
    .bind(pattern.as_deref())
    .fetch_one(&mut *conn)
    .await?;

    let employees = sqlx::query_as::<_, Employee>(
        r#"
        SELECT id, employee_code, display_name, hire_date, status
        FROM employees
        WHERE ?1 IS NULL OR display_name LIKE ?1 OR employee_code LIKE ?1
        ORDER BY id DESC
        LIMIT ?2 OFFSET ?3
        "#,
    )
    .bind(pattern.as_deref())
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut *conn)
    .await?;

    Ok((employees, total))
}

pub async fn all_employee_ids(conn: &mut SqliteConnection) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar::<_, i64>("SELECT id FROM employees ORDER BY id")
        .fetch_all(conn)
        .await?;
    Ok(ids)
}

/// Stored days for one employee in `[from, to]`, tombstones included.
pub async fn fetch_days(
    conn: &mut SqliteConnection,
    employee_id: i64,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<AttendanceDay>> {
    let mut rows = sqlx::query_as::<_, AttendanceRow>(
        r#"
        SELECT employee_id, work_date, check_in, check_out, leave_code, is_deleted, modified_at
        FROM attendance_days
        WHERE employee_id = ? AND work_date BETWEEN ? AND ?
        ORDER BY work_date
        "#,
    )
    .bind(employee_id)
    .bind(from)
    .bind(to)
    .fetch(conn);

    let mut days = Vec::new();
    while let Some(row) = rows.try_next().await? {
        days.push(AttendanceDay::try_from(row)?);
    }
    Ok(days)
}

pub async fn fetch_day(conn: &mut SqliteConnection, key: CellKey) -> Result<Option<AttendanceDay>> {
    let row = sqlx::query_as::<_, AttendanceRow>(
        r#"
        SELECT employee_id, work_date, check_in, check_out, leave_code, is_deleted, modified_at
        FROM attendance_days
        WHERE employee_id = ? AND work_date = ?
        "#,
    )
    .bind(key.employee_id)
    .bind(key.date)
    .fetch_optional(conn)
    .await?;
    row.map(AttendanceDay::try_from).transpose()
}

/// Write a day, clearing any tombstone on it.
pub async fn upsert_day(
    conn: &mut SqliteConnection,
    day: &NormalizedDay,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO attendance_days
            (employee_id, work_date, check_in, check_out, leave_code, is_deleted, modified_at)
        VALUES (?, ?, ?, ?, ?, 0, ?)
        ON CONFLICT (employee_id, work_date) DO UPDATE SET
            check_in    = excluded.check_in,
            check_out   = excluded.check_out,
            leave_code  = excluded.leave_code,
            is_deleted  = 0,
            modified_at = excluded.modified_at
        "#,
    )
    .bind(day.key.employee_id)
    .bind(day.key.date)
    .bind(day.check_in)
    .bind(day.check_out)
    .bind(day.leave.map(|l| l.code().to_string()))
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

/// Mark a day deleted. Stored values are kept so the day can be restored.
pub async fn tombstone_day(
    conn: &mut SqliteConnection,
    key: CellKey,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO attendance_days (employee_id, work_date, is_deleted, modified_at)
        VALUES (?, ?, 1, ?)
        ON CONFLICT (employee_id, work_date) DO UPDATE SET
            is_deleted  = 1,
            modified_at = excluded.modified_at
        "#,
    )
    .bind(key.employee_id)
    .bind(key.date)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

/// Clear a tombstone. Returns false when there is no tombstone to clear.
pub async fn restore_day(
    conn: &mut SqliteConnection,
    key: CellKey,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE attendance_days
        SET is_deleted = 0, modified_at = ?
        WHERE employee_id = ? AND work_date = ? AND is_deleted = 1
        "#,
    )
    .bind(now)
    .bind(key.employee_id)
    .bind(key.date)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}
