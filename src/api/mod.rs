use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

use crate::error::AttendanceError;

pub mod attendance;
pub mod employee;
pub mod export;

impl ResponseError for AttendanceError {
    fn status_code(&self) -> StatusCode {
        match self {
            AttendanceError::Validation(_) => StatusCode::BAD_REQUEST,
            AttendanceError::EmployeeNotFound(_) | AttendanceError::RecordNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            AttendanceError::PersistenceConflict { .. } => StatusCode::CONFLICT,
            AttendanceError::WriteFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AttendanceError::CorruptRecord { .. }
            | AttendanceError::Database(_)
            | AttendanceError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        HttpResponse::build(self.status_code()).json(json!({
            "message": self.to_string(),
            "employee_id": self.employee_id(),
            "date": self.date(),
        }))
    }
}
