use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use super::UserId;
use super::presence::PresenceStatus;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum EventType {
    In,
    Out,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LocationStatus {
    InsideZone,
    OutsideZone,
}

impl LocationStatus {
    /// Tag implied by the caller's current presence classification.
    pub fn from_presence(status: PresenceStatus) -> Self {
        match status {
            PresenceStatus::Inside => LocationStatus::InsideZone,
            PresenceStatus::Outside | PresenceStatus::Unassigned | PresenceStatus::Error => {
                LocationStatus::OutsideZone
            }
        }
    }

    /// Outside-zone actions must be explicitly confirmed by the caller.
    pub fn needs_confirmation(self) -> bool {
        self == LocationStatus::OutsideZone
    }
}

/// Immutable check-in or check-out record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "9c3f2c1e-0a43-4a2b-8d0e-51f7a3f0a2b1",
    "user_id": "u-1001",
    "type": "IN",
    "timestamp": "2026-03-02T05:20:00Z",
    "location_status": "inside_zone"
}))]
pub struct AttendanceEvent {
    pub id: String,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[schema(value_type = String, format = "date-time")]
    pub timestamp: DateTime<Utc>,
    pub location_status: LocationStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DailyAttendanceState {
    NotStarted,
    CheckedIn,
    CheckedOut,
}

/// The first IN and first OUT of one user's local day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct DayAttendance {
    #[serde(rename = "in")]
    pub check_in: Option<AttendanceEvent>,
    #[serde(rename = "out")]
    pub check_out: Option<AttendanceEvent>,
}

impl DayAttendance {
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a AttendanceEvent>) -> Self {
        let mut day = DayAttendance::default();
        for event in events {
            let slot = match event.event_type {
                EventType::In => &mut day.check_in,
                EventType::Out => &mut day.check_out,
            };
            if slot.is_none() {
                *slot = Some(event.clone());
            }
        }
        day
    }

    pub fn state(&self) -> DailyAttendanceState {
        match (&self.check_in, &self.check_out) {
            (_, Some(_)) => DailyAttendanceState::CheckedOut,
            (Some(_), None) => DailyAttendanceState::CheckedIn,
            (None, None) => DailyAttendanceState::NotStarted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: EventType, minute: u32) -> AttendanceEvent {
        AttendanceEvent {
            id: format!("e{minute}"),
            user_id: "u1".into(),
            event_type,
            timestamp: format!("2026-03-02T05:{minute:02}:00Z").parse().unwrap(),
            location_status: LocationStatus::InsideZone,
        }
    }

    #[test]
    fn day_state_follows_events() {
        assert_eq!(DayAttendance::default().state(), DailyAttendanceState::NotStarted);

        let only_in = [event(EventType::In, 5)];
        assert_eq!(
            DayAttendance::from_events(&only_in).state(),
            DailyAttendanceState::CheckedIn
        );

        let both = [event(EventType::In, 5), event(EventType::Out, 40)];
        assert_eq!(
            DayAttendance::from_events(&both).state(),
            DailyAttendanceState::CheckedOut
        );
    }

    #[test]
    fn first_event_of_each_kind_wins() {
        let events = [event(EventType::In, 5), event(EventType::In, 9)];
        let day = DayAttendance::from_events(&events);
        assert_eq!(day.check_in.unwrap().id, "e5");
    }

    #[test]
    fn wire_names_match_record_format() {
        let json = serde_json::to_value(event(EventType::Out, 1)).unwrap();
        assert_eq!(json["type"], "OUT");
        assert_eq!(json["location_status"], "inside_zone");
        assert_eq!(LocationStatus::OutsideZone.to_string(), "outside_zone");
    }

    #[test]
    fn only_inside_presence_skips_confirmation() {
        assert!(!LocationStatus::from_presence(PresenceStatus::Inside).needs_confirmation());
        for status in [
            PresenceStatus::Outside,
            PresenceStatus::Unassigned,
            PresenceStatus::Error,
        ] {
            assert!(LocationStatus::from_presence(status).needs_confirmation());
        }
    }
}
