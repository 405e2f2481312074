use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};
use utoipa::ToSchema;

use super::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PresenceStatus {
    Unassigned,
    Inside,
    Outside,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PresenceSample {
    pub user_id: UserId,
    pub lat: f64,
    pub lng: f64,
    pub sampled_at: DateTime<Utc>,
}

/// Latest classification held for a user.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PresenceSnapshot {
    pub status: PresenceStatus,
    /// Rounded distance to the zone center, when a fix was classified.
    pub distance_meters: Option<u64>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

/// Emitted only when a user's status changes.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PresenceTransition {
    pub user_id: UserId,
    pub from: Option<PresenceStatus>,
    pub to: PresenceStatus,
    #[schema(value_type = String, format = "date-time")]
    pub at: DateTime<Utc>,
}
