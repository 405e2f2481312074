use std::collections::HashMap;
use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::model::attendance::{
    AttendanceEvent, DailyAttendanceState, DayAttendance, EventType, LocationStatus,
};
use crate::model::{UserId, new_record_id};
use crate::store::{Collection, RecordStore};
use crate::utils::clock::Clock;
use crate::utils::time::{DateRange, local_date};

/// Append-only check-in/check-out log with the per-day state machine
/// `NOT_STARTED -> CHECKED_IN -> CHECKED_OUT`.
///
/// Actions of one user are serialized through a per-user async lock that is
/// held from the state read until the event is both persisted and indexed.
pub struct AttendanceLedger {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
    events: RwLock<HashMap<UserId, Vec<AttendanceEvent>>>,
    user_locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl AttendanceLedger {
    pub async fn load(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        offset: FixedOffset,
    ) -> Result<Self, EngineError> {
        let mut events: HashMap<UserId, Vec<AttendanceEvent>> = HashMap::new();
        let mut total = 0usize;
        for record in store.load(Collection::Attendance).await? {
            let event: AttendanceEvent = serde_json::from_value(record.body)?;
            events.entry(event.user_id.clone()).or_default().push(event);
            total += 1;
        }
        for list in events.values_mut() {
            list.sort_by_key(|e| e.timestamp);
        }
        info!(events = total, users = events.len(), "Attendance ledger loaded");

        Ok(Self {
            store,
            clock,
            offset,
            events: RwLock::new(events),
            user_locks: DashMap::new(),
        })
    }

    pub async fn check_in(
        &self,
        user_id: &str,
        location_status: LocationStatus,
    ) -> Result<AttendanceEvent, EngineError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let today = local_date(now, self.offset);
        if self.day(user_id, today).state() != DailyAttendanceState::NotStarted {
            warn!(user_id, %today, "Duplicate check-in rejected");
            return Err(EngineError::conflict("already checked in"));
        }

        let event = AttendanceEvent {
            id: new_record_id(),
            user_id: user_id.to_string(),
            event_type: EventType::In,
            timestamp: now,
            location_status,
        };
        self.append(&event).await?;

        info!(user_id, %location_status, "Checked in");
        Ok(event)
    }

    pub async fn check_out(
        &self,
        user_id: &str,
        location_status: LocationStatus,
    ) -> Result<AttendanceEvent, EngineError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let today = local_date(now, self.offset);
        match self.day(user_id, today).state() {
            DailyAttendanceState::CheckedIn => {}
            DailyAttendanceState::NotStarted => {
                warn!(user_id, %today, "Check-out without check-in rejected");
                return Err(EngineError::conflict("no active check-in"));
            }
            DailyAttendanceState::CheckedOut => {
                warn!(user_id, %today, "Duplicate check-out rejected");
                return Err(EngineError::conflict("already checked out"));
            }
        }

        let event = AttendanceEvent {
            id: new_record_id(),
            user_id: user_id.to_string(),
            event_type: EventType::Out,
            timestamp: now,
            location_status,
        };
        self.append(&event).await?;

        info!(user_id, %location_status, "Checked out");
        Ok(event)
    }

    /// Today's IN/OUT pair for the user, in the ledger's local offset.
    pub fn today_state(&self, user_id: &str) -> DayAttendance {
        self.day(user_id, local_date(self.clock.now(), self.offset))
    }

    pub fn day(&self, user_id: &str, date: NaiveDate) -> DayAttendance {
        let events = self.events.read();
        let list = events.get(user_id).map(Vec::as_slice).unwrap_or_default();
        DayAttendance::from_events(
            list.iter()
                .filter(|e| local_date(e.timestamp, self.offset) == date),
        )
    }

    pub fn events_for(&self, user_id: &str, range: DateRange) -> Vec<AttendanceEvent> {
        self.events
            .read()
            .get(user_id)
            .map(|list| {
                list.iter()
                    .filter(|e| range.contains(local_date(e.timestamp, self.offset)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every event in range, across users.
    pub fn events_in(&self, range: DateRange) -> Vec<AttendanceEvent> {
        self.events
            .read()
            .values()
            .flatten()
            .filter(|e| range.contains(local_date(e.timestamp, self.offset)))
            .cloned()
            .collect()
    }

    pub fn latest_event(&self, user_id: &str) -> Option<AttendanceEvent> {
        self.events
            .read()
            .get(user_id)
            .and_then(|list| list.last().cloned())
    }

    pub fn users(&self) -> Vec<UserId> {
        self.events.read().keys().cloned().collect()
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    async fn append(&self, event: &AttendanceEvent) -> Result<(), EngineError> {
        let body = serde_json::to_value(event)?;
        self.store
            .append(Collection::Attendance, &event.id, &body)
            .await?;

        let mut events = self.events.write();
        let list = events.entry(event.user_id.clone()).or_default();
        let at = list.partition_point(|e| e.timestamp <= event.timestamp);
        list.insert(at, event.clone());
        Ok(())
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }
}
