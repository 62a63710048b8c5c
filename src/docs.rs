use crate::api::attendance::{
    CellEdit, CellEditResponse, ImportResponse, LeaveTypeInfo, StagingResponse,
};
use crate::api::employee::{CreateEmployee, EmployeeListResponse, EmployeeQuery};
use crate::model::attendance::{CellKey, NormalizedDay, RawEntry, StagedChange};
use crate::model::employee::Employee;
use crate::model::grid::{CellDisplay, DayCell, DayClass, MonthlyGrid, YearMonth};
use crate::model::leave::{LeaveEffect, LeaveType};
use crate::service::editor::CellState;
use crate::service::normalizer::Rejection;
use crate::service::persistence::SaveReport;
use crate::service::report::{ExportFailure, ExportReport};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Attendance Ledger API",
        version = "1.0.0",
        description = r#"
## Attendance & Leave Time Accounting

Monthly attendance grids with leave-aware average check-in and check-out times.

### 🔹 Key Features
- **Monthly grid**
  - Per-day classification (weekend, pre-employment, half-day and full leave, deleted)
  - Weighted averages: half-day leave counts 0.5, full leave and weekends are excluded
- **Editing**
  - Stage cell edits, review rejected text, save all-or-nothing
  - Deleted days are kept and can be restored
- **Import**
  - Bulk raw entries; invalid rows are returned for manual correction
- **Export**
  - xlsx workbook, one sheet per employee-month, identical to the grid

### 📦 Response Format
- JSON-based RESTful responses
- Errors carry `message`, and `employee_id` / `date` when they concern a record

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::employee::create_employee,
        crate::api::employee::get_employee,
        crate::api::employee::list_employees,
        crate::api::employee::update_employee,

        crate::api::attendance::get_monthly_grid,
        crate::api::attendance::stage_edit,
        crate::api::attendance::list_staged,
        crate::api::attendance::discard_staged,
        crate::api::attendance::save,
        crate::api::attendance::restore_day,
        crate::api::attendance::import_entries,
        crate::api::attendance::leave_types,

        crate::api::export::export_workbook
    ),
    components(
        schemas(
            CreateEmployee,
            Employee,
            EmployeeListResponse,
            EmployeeQuery,
            CellKey,
            NormalizedDay,
            RawEntry,
            StagedChange,
            CellEdit,
            CellEditResponse,
            CellState,
            StagingResponse,
            ImportResponse,
            Rejection,
            SaveReport,
            LeaveType,
            LeaveEffect,
            LeaveTypeInfo,
            YearMonth,
            DayClass,
            CellDisplay,
            DayCell,
            MonthlyGrid,
            ExportFailure,
            ExportReport
        )
    ),
    tags(
        (name = "Employee", description = "Employee records"),
        (name = "Attendance", description = "Monthly grids, edits and saves"),
        (name = "Export", description = "Spreadsheet export"),
    )
)]
pub struct ApiDoc;

/// Where the handlers document themselves as mounted.
const DOCUMENTED_PREFIX: &str = "/api";

/// The API description with every path moved under the configured prefix.
pub fn openapi_for_prefix(prefix: &str) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    let prefix = prefix.trim_end_matches('/');
    doc.paths.paths = std::mem::take(&mut doc.paths.paths)
        .into_iter()
        .map(|(path, item)| {
            let rest = path.strip_prefix(DOCUMENTED_PREFIX).unwrap_or(path.as_str());
            (format!("{prefix}{rest}"), item)
        })
        .collect();
    doc
}
