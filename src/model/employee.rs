use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "employee_code": "A01",
        "display_name": "Kim Minji",
        "hire_date": "2025-03-10",
        "status": "active"
    })
)]
pub struct Employee {
    #[schema(example = 1)]
    pub id: i64,

    #[schema(example = "A01")]
    pub employee_code: String,

    #[schema(example = "Kim Minji")]
    pub display_name: String,

    /// Anchors pre-employment marking; unknown hire dates disable it.
    #[schema(
        example = "2025-03-10",
        value_type = Option<String>,
        format = "date",
        nullable = true
    )]
    pub hire_date: Option<NaiveDate>,

    #[schema(example = "active")]
    pub status: String,
}

impl Employee {
    /// True when `date` falls before the first working day.
    pub fn is_before_hire(&self, date: NaiveDate) -> bool {
        self.hire_date.is_some_and(|hired| date < hired)
    }
}
