use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::leave::LeaveType;

/// Address of one attendance record: one employee on one calendar day.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, ToSchema,
)]
#[display(fmt = "employee {} on {}", employee_id, date)]
pub struct CellKey {
    #[schema(example = 1)]
    pub employee_id: i64,
    #[schema(example = "2025-03-10", value_type = String, format = "date")]
    pub date: NaiveDate,
}

impl CellKey {
    pub fn new(employee_id: i64, date: NaiveDate) -> Self {
        Self { employee_id, date }
    }
}

/// A validated day entry, ready to be written to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NormalizedDay {
    pub key: CellKey,
    #[schema(example = "09:00:00", value_type = Option<String>)]
    pub check_in: Option<NaiveTime>,
    #[schema(example = "18:00:00", value_type = Option<String>)]
    pub check_out: Option<NaiveTime>,
    pub leave: Option<LeaveType>,
}

/// Canonical stored record. Deleted records are tombstones, never removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceDay {
    pub key: CellKey,
    pub check_in: Option<NaiveTime>,
    pub check_out: Option<NaiveTime>,
    pub leave: Option<LeaveType>,
    pub deleted: bool,
    pub modified_at: DateTime<Utc>,
}

impl AttendanceDay {
    /// Values that still count; `None` for tombstones.
    pub fn live(&self) -> Option<&Self> {
        (!self.deleted).then_some(self)
    }
}

/// Unvalidated entry as it arrives from an import or an API caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RawEntry {
    #[schema(example = 1)]
    pub employee_id: i64,
    #[schema(example = "2025-03-10")]
    pub date: String,
    #[schema(example = "09:00")]
    pub check_in: Option<String>,
    #[schema(example = "18:00")]
    pub check_out: Option<String>,
    #[schema(example = "반차")]
    pub leave: Option<String>,
}

/// One pending write in the staging buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StagedChange {
    Upsert { day: NormalizedDay },
    /// Blank edit; tombstones the stored record.
    Delete { key: CellKey },
}

impl StagedChange {
    pub fn key(&self) -> CellKey {
        match self {
            StagedChange::Upsert { day } => day.key,
            StagedChange::Delete { key } => *key,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, StagedChange::Delete { .. })
    }
}
