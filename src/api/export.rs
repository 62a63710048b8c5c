use crate::{
    model::grid::YearMonth,
    service::{persistence::PersistenceCoordinator, report::ReportExporter, rules::RuleSet},
};
use actix_web::{HttpResponse, Responder, error::ErrorBadRequest, http::header, web};
use serde::Deserialize;
use utoipa::IntoParams;

/// Widest month range one export may cover.
pub const MAX_EXPORT_MONTHS: i64 = 120;

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ExportQuery {
    /// First month, YYYY-MM
    pub from: String,
    /// Last month, YYYY-MM. Defaults to `from`.
    pub to: Option<String>,
    /// Limit to one employee; all employees when absent
    pub employee_id: Option<i64>,
}

/// Spreadsheet export, one sheet per employee-month
#[utoipa::path(
    get,
    path = "/api/export",
    params(ExportQuery),
    responses(
        (status = 200, description = "xlsx workbook; failed employee-months are listed on an Errors sheet and counted in X-Export-Failures"),
        (status = 400, description = "Invalid month range, or wider than 120 months")
    ),
    tag = "Export"
)]
pub async fn export_workbook(
    store: web::Data<PersistenceCoordinator>,
    rules: web::Data<RuleSet>,
    query: web::Query<ExportQuery>,
) -> actix_web::Result<impl Responder> {
    let from: YearMonth = query.from.parse().map_err(ErrorBadRequest)?;
    let to: YearMonth = match &query.to {
        Some(to) => to.parse().map_err(ErrorBadRequest)?,
        None => from,
    };
    if to < from {
        return Err(ErrorBadRequest("`to` is before `from`"));
    }
    if from.months_through(to) > MAX_EXPORT_MONTHS {
        return Err(ErrorBadRequest(format!(
            "export covers at most {MAX_EXPORT_MONTHS} months"
        )));
    }

    let employee_ids: Vec<i64> = query.employee_id.into_iter().collect();
    let mut export = ReportExporter::new(&store, &rules)
        .export(&employee_ids, from, to)
        .await?;
    let bytes = export.to_bytes()?;

    Ok(HttpResponse::Ok()
        .content_type(XLSX_CONTENT_TYPE)
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"attendance_{from}_{to}.xlsx\""),
        ))
        .insert_header(("X-Export-Failures", export.report.failures.len().to_string()))
        .body(bytes))
}
