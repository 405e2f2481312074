use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use derive_more::Display;
use serde::Serialize;
use strum_macros::AsRefStr;
use utoipa::ToSchema;

use super::UserId;
use super::attendance::LocationStatus;

/// Penalty class derived from late minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, strum_macros::Display, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeductionTier {
    #[strum(serialize = "none")]
    NoDeduction,
    #[strum(serialize = "attention (late)")]
    Attention,
    #[strum(serialize = "half-day deduction")]
    HalfDay,
    #[strum(serialize = "full-day deduction")]
    FullDay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeductionOutcome {
    Tier { tier: DeductionTier },
    /// An approved permission request covers the day.
    Excused { reason: String },
}

impl DeductionOutcome {
    pub fn label(&self) -> String {
        match self {
            DeductionOutcome::Tier { tier } => tier.to_string(),
            DeductionOutcome::Excused { reason } => format!("excused: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, ToSchema)]
#[display(fmt = "{}h {}m", hours, minutes)]
pub struct WorkedDuration {
    pub hours: i64,
    pub minutes: i64,
}

impl WorkedDuration {
    /// Whole minutes, rounded; negative spans clamp to zero.
    pub fn from_delta(delta: TimeDelta) -> Self {
        let total = (delta.num_milliseconds() as f64 / 60_000.0).round().max(0.0) as i64;
        Self {
            hours: total / 60,
            minutes: total % 60,
        }
    }

    pub fn total_minutes(&self) -> i64 {
        self.hours * 60 + self.minutes
    }
}

/// Per user per day compliance record. Always recomputed, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[schema(example = json!({
    "user_id": "u-1001",
    "date": "2026-03-02",
    "check_in": "2026-03-02T05:20:00Z",
    "check_in_status": "inside_zone",
    "check_out": "2026-03-02T13:00:00Z",
    "check_out_status": "inside_zone",
    "late_minutes": 20,
    "early_minutes": 0,
    "worked_duration": { "hours": 7, "minutes": 40 },
    "deduction": { "kind": "tier", "tier": "attention" }
}))]
pub struct DailySummary {
    pub user_id: UserId,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_in: Option<DateTime<Utc>>,
    pub check_in_status: Option<LocationStatus>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_out: Option<DateTime<Utc>>,
    pub check_out_status: Option<LocationStatus>,
    /// `None` when the user has no zone or no IN event.
    pub late_minutes: Option<i64>,
    /// `None` when the user has no zone or no OUT event.
    pub early_minutes: Option<i64>,
    pub worked_duration: Option<WorkedDuration>,
    pub deduction: Option<DeductionOutcome>,
}
