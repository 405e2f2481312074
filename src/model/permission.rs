use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use super::UserId;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PermissionStatus {
    Pending,
    Approved,
    Rejected,
}

/// Operator verdict on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

impl From<Decision> for PermissionStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approved => PermissionStatus::Approved,
            Decision::Rejected => PermissionStatus::Rejected,
        }
    }
}

/// Exception ("excuse") request for a single day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "0f2d5a3c-7b1e-4c8a-9e2d-3b4c5d6e7f80",
    "user_id": "u-1001",
    "user_name": "Sara",
    "reason": "Hospital appointment",
    "status": "pending",
    "requested_at": "2026-03-02T04:10:00Z",
    "date": "2026-03-02"
}))]
pub struct PermissionRequest {
    pub id: String,
    pub user_id: UserId,
    pub user_name: String,
    pub reason: String,
    pub status: PermissionStatus,
    #[schema(value_type = String, format = "date-time")]
    pub requested_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
}

impl PermissionRequest {
    pub fn is_pending(&self) -> bool {
        self.status == PermissionStatus::Pending
    }
}
