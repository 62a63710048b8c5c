use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::info;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS employees (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        employee_code TEXT NOT NULL UNIQUE,
        display_name  TEXT NOT NULL,
        hire_date     TEXT NULL,
        status        TEXT NOT NULL DEFAULT 'active'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS attendance_days (
        employee_id INTEGER NOT NULL REFERENCES employees(id),
        work_date   TEXT NOT NULL,
        check_in    TEXT NULL,
        check_out   TEXT NULL,
        leave_code  TEXT NULL,
        is_deleted  INTEGER NOT NULL DEFAULT 0,
        modified_at TEXT NOT NULL,
        PRIMARY KEY (employee_id, work_date)
    )
    "#,
];

#[derive(Debug, Clone)]
pub struct DbSettings {
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl Default for DbSettings {
    fn default() -> Self {
        Self {
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

pub fn connect_options(
    database_url: &str,
    settings: &DbSettings,
) -> Result<SqliteConnectOptions, sqlx::Error> {
    Ok(SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(settings.busy_timeout))
}

pub async fn init_db(database_url: &str, settings: &DbSettings) -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .connect_with(connect_options(database_url, settings)?)
        .await?;
    migrate(&pool).await?;
    info!(database_url, "Database ready");
    Ok(pool)
}

/// Create missing tables. Safe to run on every start.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for statement in SCHEMA {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await
}
