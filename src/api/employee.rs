use crate::{
    error::AttendanceError,
    model::employee::Employee,
    service::{normalizer::parse_date, persistence::PersistenceCoordinator},
    utils::db_utils::build_update_sql,
};
use actix_web::{HttpResponse, Responder, error::ErrorBadRequest, web};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::error::ErrorKind;
use tracing::{debug, warn};
use utoipa::{IntoParams, ToSchema};

/// Columns an administrator may correct.
const UPDATABLE_COLUMNS: &[&str] = &["employee_code", "display_name", "hire_date", "status"];

/// Reject corrections the table would refuse, so they surface as 400 rather
/// than a database failure.
fn check_correction(body: &Value) -> actix_web::Result<()> {
    let Some(fields) = body.as_object() else {
        return Ok(());
    };
    for (column, value) in fields {
        match (column.as_str(), value) {
            ("hire_date", Value::Null) => {}
            ("hire_date", Value::String(text)) => {
                parse_date(text).map_err(ErrorBadRequest)?;
            }
            ("hire_date", _) => return Err(ErrorBadRequest("`hire_date` must be YYYY-MM-DD or null")),
            ("employee_code" | "display_name" | "status", Value::String(text)) if !text.trim().is_empty() => {}
            ("employee_code" | "display_name" | "status", _) => {
                return Err(ErrorBadRequest(format!("`{column}` must be a non-empty string")));
            }
            _ => {}
        }
    }
    Ok(())
}

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CreateEmployee {
    #[schema(example = "A01", value_type = String)]
    pub employee_code: String,
    #[schema(example = "Kim Minji", value_type = String)]
    pub display_name: String,
    #[schema(example = "2025-03-10", format = "date", value_type = Option<String>)]
    pub hire_date: Option<chrono::NaiveDate>,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct EmployeeQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Matches display name or employee code
    pub search: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct EmployeeListResponse {
    #[schema(
    example = json!([{
        "id": 1,
        "employee_code": "A01",
        "display_name": "Kim Minji",
        "hire_date": "2025-03-10",
        "status": "active"
    }])
)]
    pub data: Vec<Employee>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}

/// Create Employee
#[utoipa::path(
    post,
    path = "/api/employees",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created", body = Employee),
        (status = 409, description = "Employee code already in use", body = Object, example = json!({
            "message": "Employee code already in use"
        })),
        (status = 500, description = "Internal server error")
    ),
    tag = "Employee"
)]
pub async fn create_employee(
    store: web::Data<PersistenceCoordinator>,
    payload: web::Json<CreateEmployee>,
) -> actix_web::Result<impl Responder> {
    let result = store
        .create_employee(&payload.employee_code, &payload.display_name, payload.hire_date)
        .await;

    match result {
        Ok(employee) => Ok(HttpResponse::Created().json(employee)),
        Err(AttendanceError::Database(sqlx::Error::Database(db_err))) if db_err.is_unique_violation() => {
            warn!(employee_code = %payload.employee_code, "Duplicate employee code");
            Ok(HttpResponse::Conflict().json(json!({
                "message": "Employee code already in use"
            })))
        }
        Err(e) => Err(e.into()),
    }
}

#[utoipa::path(
    get,
    path = "/api/employees",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated employee list", body = EmployeeListResponse)
    ),
    tag = "Employee"
)]
pub async fn list_employees(
    store: web::Data<PersistenceCoordinator>,
    query: web::Query<EmployeeQuery>,
) -> actix_web::Result<impl Responder> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * per_page;

    debug!(page, per_page, search = ?query.search, "Listing employees");
    let (data, total) = store
        .employees(query.search.as_deref(), per_page.into(), offset.into())
        .await?;

    Ok(HttpResponse::Ok().json(EmployeeListResponse {
        data,
        page,
        per_page,
        total,
    }))
}

/// Get Employee by ID
#[utoipa::path(
    get,
    path = "/api/employees/{employee_id}",
    params(
        ("employee_id", Path, description = "Employee ID")
    ),
    responses(
        (status = 200, description = "Employee found", body = Employee),
        (status = 404, description = "Employee not found", body = Object, example = json!({
            "message": "employee 9 not found"
        }))
    ),
    tag = "Employee"
)]
pub async fn get_employee(
    store: web::Data<PersistenceCoordinator>,
    path: web::Path<i64>,
) -> actix_web::Result<impl Responder> {
    let employee = store.employee(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(employee))
}

/// Correct an employee (name, code, hire date, status)
#[utoipa::path(
    put,
    path = "/api/employees/{employee_id}",
    params(
        ("employee_id", Path, description = "Employee ID")
    ),
    request_body(content = Object, example = json!({"hire_date": "2025-03-10"})),
    responses(
        (status = 200, description = "Employee updated", body = Employee),
        (status = 400, description = "Field cannot be updated or value is invalid"),
        (status = 404, description = "Employee not found"),
        (status = 409, description = "Employee code already in use")
    ),
    tag = "Employee"
)]
pub async fn update_employee(
    store: web::Data<PersistenceCoordinator>,
    path: web::Path<i64>,
    body: web::Json<Value>,
) -> actix_web::Result<impl Responder> {
    let employee_id = path.into_inner();

    check_correction(&body)?;
    let update = build_update_sql("employees", &body, UPDATABLE_COLUMNS, "id", employee_id)?;

    match store.update_employee(employee_id, update).await {
        Ok(employee) => Ok(HttpResponse::Ok().json(employee)),
        Err(AttendanceError::Database(sqlx::Error::Database(db_err))) => match db_err.kind() {
            ErrorKind::UniqueViolation => {
                warn!(employee_id, "Duplicate employee code");
                Ok(HttpResponse::Conflict().json(json!({
                    "message": "Employee code already in use"
                })))
            }
            ErrorKind::NotNullViolation | ErrorKind::CheckViolation | ErrorKind::ForeignKeyViolation => {
                Err(ErrorBadRequest(db_err.message().to_string()))
            }
            _ => Err(AttendanceError::Database(sqlx::Error::Database(db_err)).into()),
        },
        Err(e) => Err(e.into()),
    }
}
