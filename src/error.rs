use chrono::NaiveDate;
use thiserror::Error;

use crate::model::attendance::CellKey;
use crate::service::normalizer::Rejection;

/// Failures surfaced by the attendance engine.
///
/// Every variant that concerns a record names the employee and, where known,
/// the date, so the person at the grid can correct the entry.
#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error(transparent)]
    Validation(#[from] Rejection),

    #[error("store busy while saving {context}; retried once, please try again")]
    PersistenceConflict {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to write {key}: {source}")]
    WriteFailed {
        key: CellKey,
        #[source]
        source: sqlx::Error,
    },

    #[error("employee {0} not found")]
    EmployeeNotFound(i64),

    #[error("no stored record for {0}")]
    RecordNotFound(CellKey),

    #[error("stored record for employee {employee_id} on {date} is unreadable: {reason}")]
    CorruptRecord {
        employee_id: i64,
        date: NaiveDate,
        reason: String,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("spreadsheet export failed: {0}")]
    Export(#[from] rust_xlsxwriter::XlsxError),
}

impl AttendanceError {
    /// Employee the failure is about, when there is one.
    pub fn employee_id(&self) -> Option<i64> {
        match self {
            AttendanceError::Validation(r) => Some(r.employee_id),
            AttendanceError::WriteFailed { key, .. } | AttendanceError::RecordNotFound(key) => {
                Some(key.employee_id)
            }
            AttendanceError::EmployeeNotFound(id) => Some(*id),
            AttendanceError::CorruptRecord { employee_id, .. } => Some(*employee_id),
            _ => None,
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            AttendanceError::WriteFailed { key, .. } | AttendanceError::RecordNotFound(key) => {
                Some(key.date)
            }
            AttendanceError::CorruptRecord { date, .. } => Some(*date),
            _ => None,
        }
    }
}

pub type Result<T, E = AttendanceError> = std::result::Result<T, E>;
