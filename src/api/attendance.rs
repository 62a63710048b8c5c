use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use crate::{
    error::AttendanceError,
    model::{
        attendance::{CellKey, RawEntry, StagedChange},
        grid::YearMonth,
        leave::{LeaveEffect, LeaveType},
    },
    service::{
        aggregation::build_monthly_grid,
        editor::{CellState, EditController},
        normalizer::{Rejection, ValidationError, normalize_batch, reject_unknown_employees},
        persistence::{PersistenceCoordinator, SaveReport},
        rules::RuleSet,
    },
};
use actix_web::{HttpResponse, Responder, error::ErrorBadRequest, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use strum::IntoEnumIterator;
use tracing::{info, warn};
use utoipa::ToSchema;

pub type SharedEditor = Mutex<EditController>;

fn editor_lock(editor: &SharedEditor) -> actix_web::Result<MutexGuard<'_, EditController>> {
    editor.lock().map_err(|_| {
        tracing::error!("Staging buffer lock poisoned");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })
}

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CellEdit {
    #[schema(example = 1)]
    pub employee_id: i64,
    #[schema(example = "2025-09-01", value_type = String, format = "date")]
    pub date: NaiveDate,
    /// Whole cell text, e.g. `09:00-18:00` or `반차 09:00-13:00`. Blank deletes the day.
    #[schema(example = "09:00-18:00")]
    pub text: String,
}

#[derive(Serialize, ToSchema)]
pub struct CellEditResponse {
    pub state: CellState,
    pub change: StagedChange,
}

#[derive(Serialize, ToSchema)]
pub struct StagingResponse {
    pub staged: Vec<StagedChange>,
    pub rejections: Vec<Rejection>,
}

#[derive(Serialize, ToSchema)]
pub struct ImportResponse {
    pub saved: SaveReport,
    pub rejections: Vec<Rejection>,
}

#[derive(Serialize, ToSchema)]
pub struct LeaveTypeInfo {
    pub code: LeaveType,
    #[schema(example = "반차")]
    pub label: String,
    pub effect: LeaveEffect,
}

/// Monthly grid for one employee
#[utoipa::path(
    get,
    path = "/api/attendance/{employee_id}/{year}/{month}",
    params(
        ("employee_id", Path, description = "Employee ID"),
        ("year", Path, description = "Calendar year"),
        ("month", Path, description = "Month 1-12")
    ),
    responses(
        (status = 200, description = "Derived monthly grid", body = crate::model::grid::MonthlyGrid),
        (status = 400, description = "Invalid month"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Attendance"
)]
pub async fn get_monthly_grid(
    store: web::Data<PersistenceCoordinator>,
    rules: web::Data<RuleSet>,
    path: web::Path<(i64, i32, u32)>,
) -> actix_web::Result<impl Responder> {
    let (employee_id, year, month) = path.into_inner();
    let month = YearMonth::new(year, month).map_err(ErrorBadRequest)?;

    let records = store.load_month(employee_id, month).await?;
    let grid = build_monthly_grid(&records, &rules);

    Ok(HttpResponse::Ok().json(grid))
}

/// Stage one cell edit
#[utoipa::path(
    put,
    path = "/api/attendance/edits",
    request_body = CellEdit,
    responses(
        (status = 200, description = "Edit staged", body = CellEditResponse),
        (status = 400, description = "Cell text rejected or no such employee; the cell stays edited", body = Object, example = json!({
            "message": "employee 1 on 2025-09-01: check-out 08:00:00 is before check-in 09:00:00",
            "employee_id": 1,
            "date": null
        }))
    ),
    tag = "Attendance"
)]
pub async fn stage_edit(
    store: web::Data<PersistenceCoordinator>,
    editor: web::Data<SharedEditor>,
    payload: web::Json<CellEdit>,
) -> actix_web::Result<impl Responder> {
    let key = CellKey::new(payload.employee_id, payload.date);
    let known = match store.employee(key.employee_id).await {
        Ok(_) => true,
        Err(AttendanceError::EmployeeNotFound(_)) => false,
        Err(e) => return Err(e.into()),
    };

    let mut editor = editor_lock(&editor)?;
    if !known {
        let rejection = editor.reject_cell(key, ValidationError::UnknownEmployee);
        return Err(AttendanceError::from(rejection).into());
    }

    let change = editor
        .edit_cell(key, &payload.text)
        .map_err(AttendanceError::from)?
        .clone();

    Ok(HttpResponse::Ok().json(CellEditResponse {
        state: editor.state(&key),
        change,
    }))
}

#[utoipa::path(
    get,
    path = "/api/attendance/edits",
    responses(
        (status = 200, description = "Staged changes and rejected edits", body = StagingResponse)
    ),
    tag = "Attendance"
)]
pub async fn list_staged(editor: web::Data<SharedEditor>) -> actix_web::Result<impl Responder> {
    let editor = editor_lock(&editor)?;
    Ok(HttpResponse::Ok().json(StagingResponse {
        staged: editor.staged(),
        rejections: editor.rejections().cloned().collect(),
    }))
}

/// Throw away all unsaved edits
#[utoipa::path(
    delete,
    path = "/api/attendance/edits",
    responses(
        (status = 204, description = "Staging buffer cleared")
    ),
    tag = "Attendance"
)]
pub async fn discard_staged(editor: web::Data<SharedEditor>) -> actix_web::Result<impl Responder> {
    editor_lock(&editor)?.discard();
    info!("Staged edits discarded");
    Ok(HttpResponse::NoContent().finish())
}

/// Commit every staged change in one transaction
#[utoipa::path(
    post,
    path = "/api/attendance/save",
    responses(
        (status = 200, description = "All staged changes committed", body = SaveReport),
        (status = 409, description = "Store busy after one retry; nothing was written"),
        (status = 422, description = "A record failed to write; nothing was written")
    ),
    tag = "Attendance"
)]
pub async fn save(
    store: web::Data<PersistenceCoordinator>,
    editor: web::Data<SharedEditor>,
) -> actix_web::Result<impl Responder> {
    // The guard is not held across the await; edits made meanwhile stay staged.
    let snapshot = editor_lock(&editor)?.staged();

    let report = store.save(&snapshot).await?;
    editor_lock(&editor)?.mark_saved(&snapshot);

    Ok(HttpResponse::Ok().json(report))
}

/// Undo the deletion of one day
#[utoipa::path(
    post,
    path = "/api/attendance/{employee_id}/{date}/restore",
    params(
        ("employee_id", Path, description = "Employee ID"),
        ("date", Path, description = "Day, YYYY-MM-DD")
    ),
    responses(
        (status = 200, description = "Day restored", body = Object, example = json!({
            "message": "Day restored"
        })),
        (status = 404, description = "No deleted record for that day")
    ),
    tag = "Attendance"
)]
pub async fn restore_day(
    store: web::Data<PersistenceCoordinator>,
    path: web::Path<(i64, NaiveDate)>,
) -> actix_web::Result<impl Responder> {
    let (employee_id, date) = path.into_inner();
    store.restore(CellKey::new(employee_id, date)).await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Day restored"
    })))
}

/// Bulk import of raw entries
///
/// Valid entries are saved together; invalid ones, including entries for
/// employees that do not exist, are returned for manual correction and never
/// reach the store.
#[utoipa::path(
    post,
    path = "/api/attendance/import",
    request_body = [RawEntry],
    responses(
        (status = 200, description = "Valid entries saved", body = ImportResponse),
        (status = 409, description = "Store busy after one retry"),
        (status = 422, description = "A record failed to write; nothing was written")
    ),
    tag = "Attendance"
)]
pub async fn import_entries(
    store: web::Data<PersistenceCoordinator>,
    payload: web::Json<Vec<RawEntry>>,
) -> actix_web::Result<impl Responder> {
    let (accepted, mut rejections) = normalize_batch(&payload);
    let known: HashSet<i64> = store.employee_ids().await?.into_iter().collect();
    let (accepted, unknown) = reject_unknown_employees(accepted, &known);
    rejections.extend(unknown);
    if !rejections.is_empty() {
        warn!(rejected = rejections.len(), accepted = accepted.len(), "Import entries flagged");
    }

    let changes: Vec<StagedChange> = accepted
        .into_iter()
        .map(|day| StagedChange::Upsert { day })
        .collect();
    let saved = store.save(&changes).await?;

    Ok(HttpResponse::Ok().json(ImportResponse { saved, rejections }))
}

#[utoipa::path(
    get,
    path = "/api/leave-types",
    responses(
        (status = 200, description = "Leave types and how they count", body = [LeaveTypeInfo])
    ),
    tag = "Attendance"
)]
pub async fn leave_types(rules: web::Data<RuleSet>) -> impl Responder {
    let types: Vec<LeaveTypeInfo> = LeaveType::iter()
        .map(|code| LeaveTypeInfo {
            code,
            label: code.label().to_string(),
            effect: rules.leave_effect(code),
        })
        .collect();
    HttpResponse::Ok().json(types)
}
