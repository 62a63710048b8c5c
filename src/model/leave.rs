use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumIter, EnumString};
use utoipa::ToSchema;

/// Leave classification attached to a single attendance day.
///
/// The stored code is the `to_string` value; the extra `serialize` entries are
/// the labels people actually type into the grid.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    ToSchema,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum LeaveType {
    #[strum(to_string = "annual", serialize = "연차", serialize = "annual_leave")]
    Annual,
    #[strum(to_string = "sick", serialize = "병가")]
    Sick,
    #[strum(to_string = "unpaid", serialize = "무급")]
    Unpaid,
    #[strum(to_string = "special", serialize = "경조사")]
    Special,
    #[strum(to_string = "half_day", serialize = "반차", serialize = "half")]
    HalfDay,
    #[strum(to_string = "half_day_am", serialize = "오전반차", serialize = "half_am")]
    HalfDayAm,
    #[strum(to_string = "half_day_pm", serialize = "오후반차", serialize = "half_pm")]
    HalfDayPm,
    #[strum(to_string = "official_trip", serialize = "출장", serialize = "trip")]
    OfficialTrip,
    #[strum(to_string = "training", serialize = "교육")]
    Training,
}

/// How a leave day participates in the monthly time averages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LeaveEffect {
    /// Day is left out of both averages.
    FullExclusion,
    /// Day contributes with weight 0.5.
    HalfWeight,
    /// Day counts like an ordinary working day.
    NoExclusion,
}

impl LeaveType {
    pub fn code(&self) -> &str {
        self.as_ref()
    }

    /// Effect before the configured half-day set is applied.
    pub fn base_effect(&self) -> LeaveEffect {
        match self {
            LeaveType::Annual | LeaveType::Sick | LeaveType::Unpaid | LeaveType::Special => {
                LeaveEffect::FullExclusion
            }
            LeaveType::HalfDay | LeaveType::HalfDayAm | LeaveType::HalfDayPm => {
                LeaveEffect::HalfWeight
            }
            LeaveType::OfficialTrip | LeaveType::Training => LeaveEffect::NoExclusion,
        }
    }

    /// Short label shown in grid cells and spreadsheet rows.
    pub fn label(&self) -> &'static str {
        match self {
            LeaveType::Annual => "연차",
            LeaveType::Sick => "병가",
            LeaveType::Unpaid => "무급",
            LeaveType::Special => "경조사",
            LeaveType::HalfDay => "반차",
            LeaveType::HalfDayAm => "오전반차",
            LeaveType::HalfDayPm => "오후반차",
            LeaveType::OfficialTrip => "출장",
            LeaveType::Training => "교육",
        }
    }
}
