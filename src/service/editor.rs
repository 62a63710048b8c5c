//! Interactive cell edits and the staging buffer.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::model::attendance::{CellKey, NormalizedDay, StagedChange};
use crate::service::normalizer::{Rejection, ValidationError, parse_cell_text};

/// Lifecycle of one grid cell between loads and saves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CellState {
    Unmodified,
    /// Text received but not (yet) accepted into the buffer.
    Edited,
    Staged,
}

/// Collects grid edits until an explicit save.
///
/// Keyed by (employee, date); a later edit of the same cell replaces the
/// earlier one outright.
#[derive(Debug, Default)]
pub struct EditController {
    staged: BTreeMap<CellKey, StagedChange>,
    pending: HashMap<CellKey, Rejection>,
}

impl EditController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the new text of a cell.
    ///
    /// Blank text means "delete this day". Text that cannot be read leaves the
    /// cell in `Edited` with the rejection kept for correction; any change
    /// staged earlier for the cell is dropped, since the user replaced it.
    pub fn edit_cell(&mut self, key: CellKey, text: &str) -> Result<&StagedChange, Rejection> {
        let change = if text.trim().is_empty() {
            StagedChange::Delete { key }
        } else {
            match parse_cell_text(key, text) {
                Ok(day) => StagedChange::Upsert { day },
                Err(rejection) => return Err(self.hold(key, rejection)),
            }
        };
        Ok(self.stage(change))
    }

    /// Refuse an edit for a reason outside its text, such as an unknown
    /// employee. The cell stays `Edited` like any other rejected edit.
    pub fn reject_cell(&mut self, key: CellKey, reason: ValidationError) -> Rejection {
        self.hold(
            key,
            Rejection {
                employee_id: key.employee_id,
                date: key.date.to_string(),
                reason,
            },
        )
    }

    fn hold(&mut self, key: CellKey, rejection: Rejection) -> Rejection {
        debug!(%rejection, "Cell edit rejected");
        self.staged.remove(&key);
        self.pending.insert(key, rejection.clone());
        rejection
    }

    /// Stage an already validated day.
    pub fn stage_day(&mut self, day: NormalizedDay) -> &StagedChange {
        self.stage(StagedChange::Upsert { day })
    }

    fn stage(&mut self, change: StagedChange) -> &StagedChange {
        let key = change.key();
        self.pending.remove(&key);
        debug!(%key, delete = change.is_delete(), "Cell staged");
        self.staged.insert(key, change);
        &self.staged[&key]
    }

    pub fn state(&self, key: &CellKey) -> CellState {
        if self.staged.contains_key(key) {
            CellState::Staged
        } else if self.pending.contains_key(key) {
            CellState::Edited
        } else {
            CellState::Unmodified
        }
    }

    pub fn rejection(&self, key: &CellKey) -> Option<&Rejection> {
        self.pending.get(key)
    }

    pub fn rejections(&self) -> impl Iterator<Item = &Rejection> {
        self.pending.values()
    }

    /// Snapshot of the buffer in key order, for a save.
    pub fn staged(&self) -> Vec<StagedChange> {
        self.staged.values().cloned().collect()
    }

    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty() && self.pending.is_empty()
    }

    /// Clear entries that were committed.
    ///
    /// An entry re-edited while the save ran differs from the snapshot and is
    /// kept for the next save.
    pub fn mark_saved(&mut self, saved: &[StagedChange]) {
        let mut cleared = 0;
        for change in saved {
            let key = change.key();
            if self.staged.get(&key) == Some(change) {
                self.staged.remove(&key);
                cleared += 1;
            }
        }
        info!(cleared, remaining = self.staged.len(), "Staging buffer cleared after save");
    }

    /// Drop every staged and pending edit.
    pub fn discard(&mut self) {
        self.staged.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn key(d: u32) -> CellKey {
        CellKey::new(3, NaiveDate::from_ymd_opt(2025, 9, d).unwrap())
    }

    #[test]
    fn cells_start_unmodified() {
        let editor = EditController::new();
        assert_eq!(editor.state(&key(1)), CellState::Unmodified);
        assert!(editor.is_empty());
    }

    #[test]
    fn blank_text_is_delete_intent() {
        let mut editor = EditController::new();
        let change = editor.edit_cell(key(1), "   ").unwrap();
        assert!(change.is_delete());
        assert_eq!(editor.state(&key(1)), CellState::Staged);
    }

    #[test]
    fn last_write_wins() {
        let mut editor = EditController::new();
        editor.edit_cell(key(1), "09:00-18:00").unwrap();
        editor.edit_cell(key(1), "08:30-17:30").unwrap();
        let staged = editor.staged();
        assert_eq!(staged.len(), 1);
        match &staged[0] {
            StagedChange::Upsert { day } => {
                assert_eq!(day.check_in, NaiveTime::from_hms_opt(8, 30, 0));
            }
            other => panic!("unexpected {other:?}"),
        }

        editor.edit_cell(key(1), "").unwrap();
        assert!(editor.staged()[0].is_delete());
    }

    #[test]
    fn rejected_edit_stays_edited_and_unstaged() {
        let mut editor = EditController::new();
        editor.edit_cell(key(2), "09:00-18:00").unwrap();
        let err = editor.edit_cell(key(2), "18:00-09:00").unwrap_err();
        assert_eq!(err.employee_id, 3);
        assert_eq!(editor.state(&key(2)), CellState::Edited);
        assert!(editor.rejection(&key(2)).is_some());
        assert_eq!(editor.staged_len(), 0);

        editor.edit_cell(key(2), "09:10-18:00").unwrap();
        assert_eq!(editor.state(&key(2)), CellState::Staged);
        assert!(editor.rejection(&key(2)).is_none());
    }

    #[test]
    fn mark_saved_keeps_newer_edits() {
        let mut editor = EditController::new();
        editor.edit_cell(key(1), "09:00-18:00").unwrap();
        editor.edit_cell(key(2), "annual").unwrap();
        let snapshot = editor.staged();

        editor.edit_cell(key(2), "sick").unwrap();
        editor.mark_saved(&snapshot);

        assert_eq!(editor.state(&key(1)), CellState::Unmodified);
        assert_eq!(editor.state(&key(2)), CellState::Staged);
    }

    #[test]
    fn staged_snapshot_is_key_ordered() {
        let mut editor = EditController::new();
        editor.edit_cell(key(9), "09:00").unwrap();
        editor.edit_cell(key(1), "09:00").unwrap();
        let keys: Vec<_> = editor.staged().iter().map(StagedChange::key).collect();
        assert_eq!(keys, vec![key(1), key(9)]);
    }

    #[test]
    fn validated_day_replaces_pending_rejection() {
        let mut editor = EditController::new();
        editor.edit_cell(key(4), "nap").unwrap_err();
        assert!(editor.rejection(&key(4)).is_some());

        let day = NormalizedDay {
            key: key(4),
            check_in: NaiveTime::from_hms_opt(9, 0, 0),
            check_out: None,
            leave: None,
        };
        editor.stage_day(day);
        assert_eq!(editor.state(&key(4)), CellState::Staged);
        assert!(editor.rejection(&key(4)).is_none());
        assert_eq!(editor.staged_len(), 1);
    }

    #[test]
    fn rejected_cell_drops_earlier_staged_value() {
        let mut editor = EditController::new();
        editor.edit_cell(key(5), "09:00-18:00").unwrap();

        let rejection = editor.reject_cell(key(5), ValidationError::UnknownEmployee);
        assert_eq!(rejection.date, "2025-09-05");
        assert_eq!(editor.state(&key(5)), CellState::Edited);
        assert_eq!(editor.rejection(&key(5)), Some(&rejection));
        assert!(editor.staged().is_empty());
    }
}
