use std::collections::BTreeSet;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::UserId;
use crate::error::EngineError;
use crate::utils::time::local_instant;

pub type ZoneId = String;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Display, ToSchema)]
#[display(fmt = "({}, {})", lat, lng)]
pub struct Coordinates {
    #[schema(example = 24.7136)]
    pub lat: f64,
    #[schema(example = 46.6753)]
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(EngineError::validation(format!(
                "latitude {} is outside [-90, 90]",
                self.lat
            )));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(EngineError::validation(format!(
                "longitude {} is outside [-180, 180]",
                self.lng
            )));
        }
        Ok(())
    }
}

/// Circular geofence with a daily shift window and its roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(
    example = json!({
        "id": "5b0b7a3e-3d4c-4d5e-9f58-0b6a1c2d3e4f",
        "name": "Riyadh HQ",
        "center_lat": 24.7136,
        "center_lng": 46.6753,
        "radius_meters": 200.0,
        "shift_start": "08:00:00",
        "shift_end": "16:00:00",
        "assigned_user_ids": ["u-1001"]
    })
)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    pub center_lat: f64,
    pub center_lng: f64,
    pub radius_meters: f64,
    #[schema(value_type = String, example = "08:00:00")]
    pub shift_start: NaiveTime,
    #[schema(value_type = String, example = "16:00:00")]
    pub shift_end: NaiveTime,
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    pub assigned_user_ids: BTreeSet<UserId>,
}

impl Zone {
    pub fn center(&self) -> Coordinates {
        Coordinates::new(self.center_lat, self.center_lng)
    }

    pub fn has_member(&self, user_id: &str) -> bool {
        self.assigned_user_ids.contains(user_id)
    }

    /// Shift start and end instants of `date`, read in the given local offset.
    pub fn shift_window(&self, date: NaiveDate, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            local_instant(offset, date, self.shift_start),
            local_instant(offset, date, self.shift_end),
        )
    }
}

/// Operator input for a new zone.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ZoneSpec {
    #[schema(example = "Riyadh HQ")]
    pub name: String,
    #[schema(example = 24.7136)]
    pub center_lat: f64,
    #[schema(example = 46.6753)]
    pub center_lng: f64,
    #[schema(example = 200.0)]
    pub radius_meters: f64,
    #[schema(value_type = String, example = "08:00:00")]
    pub shift_start: NaiveTime,
    #[schema(value_type = String, example = "16:00:00")]
    pub shift_end: NaiveTime,
}

impl ZoneSpec {
    pub fn validate(&self) -> Result<(), EngineError> {
        Coordinates::new(self.center_lat, self.center_lng).validate()?;
        validate_radius(self.radius_meters)?;
        validate_shift(self.shift_start, self.shift_end)
    }

    pub fn into_zone(self, id: ZoneId) -> Zone {
        Zone {
            id,
            name: self.name.trim().to_string(),
            center_lat: self.center_lat,
            center_lng: self.center_lng,
            radius_meters: self.radius_meters,
            shift_start: self.shift_start,
            shift_end: self.shift_end,
            assigned_user_ids: BTreeSet::new(),
        }
    }
}

pub fn validate_radius(radius_meters: f64) -> Result<(), EngineError> {
    if radius_meters.is_finite() && radius_meters > 0.0 {
        Ok(())
    } else {
        Err(EngineError::validation("radius_meters must be greater than 0"))
    }
}

pub fn validate_shift(start: NaiveTime, end: NaiveTime) -> Result<(), EngineError> {
    if start < end {
        Ok(())
    } else {
        Err(EngineError::validation("shift_start must be before shift_end"))
    }
}
