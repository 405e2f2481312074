//! Attendance compliance engine.
//!
//! [`AttendanceEngine`] wires the components together and is the call-level
//! surface the transport layer wraps:
//!
//! ```text
//! ZoneRegistry ──geometry──▶ PresenceTracker ──location tag──▶ AttendanceLedger
//!      │                                                          │
//!      └──shift window──▶ ComplianceCalculator ◀──events──────────┘
//!                              ▲          │
//!       PermissionWorkflow ────┘          ▼
//!                                   ReportAggregator
//! ```

pub mod compliance;
pub mod ledger;
pub mod permissions;
pub mod presence;
pub mod report;
pub mod zones;

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use futures::Stream;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;
use utoipa::ToSchema;

use crate::error::EngineError;
use crate::model::attendance::{
    AttendanceEvent, DailyAttendanceState, DayAttendance, LocationStatus,
};
use crate::model::permission::{Decision, PermissionRequest};
use crate::model::presence::{PresenceSample, PresenceSnapshot, PresenceStatus, PresenceTransition};
use crate::model::summary::DailySummary;
use crate::model::zone::{Coordinates, Zone, ZoneSpec};
use crate::store::{ChangeEvent, Collection, RecordStore};
use crate::utils::clock::Clock;
use crate::utils::time::{DateRange, local_date};

use compliance::{ComplianceCalculator, DeductionPolicy};
use ledger::AttendanceLedger;
use permissions::{PermissionFilter, PermissionPage, PermissionWorkflow};
use presence::{LocationError, LocationFix, PresenceTracker, WatchHandle, WatchOptions};
use report::{LiveEntry, ReportAggregator};
use zones::ZoneRegistry;

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Offset that defines the local calendar day and shift wall times.
    pub utc_offset: FixedOffset,
    pub policy: DeductionPolicy,
    pub watch: WatchOptions,
    pub channel_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            utc_offset: FixedOffset::east_opt(3 * 3600).unwrap_or_else(|| Utc.fix()),
            policy: DeductionPolicy::default(),
            watch: WatchOptions::default(),
            channel_capacity: 256,
        }
    }
}

/// Outcome of a check-in or check-out.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AttendanceAction {
    pub state: DailyAttendanceState,
    pub today: DayAttendance,
}

pub struct AttendanceEngine {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
    zones: Arc<ZoneRegistry>,
    presence: Arc<PresenceTracker>,
    ledger: Arc<AttendanceLedger>,
    permissions: Arc<PermissionWorkflow>,
    calculator: Arc<ComplianceCalculator>,
    reports: ReportAggregator,
}

impl AttendanceEngine {
    /// Hydrates every component from the record store.
    pub async fn bootstrap(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Result<Self, EngineError> {
        let zones = Arc::new(ZoneRegistry::load(store.clone()).await?);
        let presence = Arc::new(PresenceTracker::new(
            zones.clone(),
            clock.clone(),
            settings.watch,
            settings.channel_capacity,
        ));
        let ledger = Arc::new(
            AttendanceLedger::load(store.clone(), clock.clone(), settings.utc_offset).await?,
        );
        let permissions = Arc::new(
            PermissionWorkflow::load(store.clone(), clock.clone(), settings.utc_offset).await?,
        );
        let calculator = Arc::new(ComplianceCalculator::new(
            zones.clone(),
            ledger.clone(),
            permissions.clone(),
            settings.policy,
        ));
        let reports = ReportAggregator::new(
            calculator.clone(),
            ledger.clone(),
            zones.clone(),
            presence.clone(),
        );

        info!(offset = %settings.utc_offset, "Attendance engine ready");
        Ok(Self {
            store,
            clock,
            offset: settings.utc_offset,
            zones,
            presence,
            ledger,
            permissions,
            calculator,
            reports,
        })
    }

    // ---- zones ----

    pub async fn create_zone(&self, spec: ZoneSpec) -> Result<Zone, EngineError> {
        self.zones.create_zone(spec).await
    }

    pub async fn assign_zone(&self, user_id: &str, zone_id: &str) -> Result<Zone, EngineError> {
        self.zones.assign(user_id, zone_id).await?;
        self.zones.get(zone_id)
    }

    /// Removes the user from the roster and ends their live presence watch.
    pub async fn unassign_zone(&self, user_id: &str, zone_id: &str) -> Result<Zone, EngineError> {
        self.zones.unassign(user_id, zone_id).await?;
        self.presence.stop(user_id);
        self.zones.get(zone_id)
    }

    pub async fn update_zone_geometry(
        &self,
        zone_id: &str,
        center: Coordinates,
        radius_meters: f64,
    ) -> Result<Zone, EngineError> {
        self.zones.update_geometry(zone_id, center, radius_meters).await
    }

    pub async fn update_zone_schedule(
        &self,
        zone_id: &str,
        shift_start: NaiveTime,
        shift_end: NaiveTime,
    ) -> Result<Zone, EngineError> {
        self.zones.update_schedule(zone_id, shift_start, shift_end).await
    }

    pub async fn remove_zone(&self, zone_id: &str) -> Result<Zone, EngineError> {
        let removed = self.zones.remove_zone(zone_id).await?;
        for user_id in &removed.assigned_user_ids {
            self.presence.stop(user_id);
        }
        Ok(removed)
    }

    pub fn zone(&self, zone_id: &str) -> Result<Zone, EngineError> {
        self.zones.get(zone_id)
    }

    pub fn zones(&self) -> Vec<Zone> {
        self.zones.list()
    }

    pub fn zone_of(&self, user_id: &str) -> Option<Zone> {
        self.zones.zone_of(user_id)
    }

    // ---- presence ----

    /// Classifies one position. `sampled_at` defaults to now.
    pub fn submit_presence_sample(
        &self,
        user_id: &str,
        lat: f64,
        lng: f64,
        sampled_at: Option<DateTime<Utc>>,
    ) -> Result<PresenceStatus, EngineError> {
        Coordinates::new(lat, lng).validate()?;
        let sample = PresenceSample {
            user_id: user_id.to_string(),
            lat,
            lng,
            sampled_at: sampled_at.unwrap_or_else(|| self.clock.now()),
        };
        Ok(self.presence.submit_sample(sample))
    }

    pub fn report_presence_failure(&self, user_id: &str, error: &LocationError) -> PresenceStatus {
        self.presence.report_failure(user_id, error)
    }

    pub fn watch_presence<S>(&self, user_id: &str, source: S) -> WatchHandle
    where
        S: Stream<Item = LocationFix> + Send + 'static,
    {
        self.presence.watch(user_id, source)
    }

    /// Ends the user's presence session (logout, navigation away).
    pub fn stop_presence(&self, user_id: &str) -> bool {
        self.presence.stop(user_id)
    }

    pub fn presence_of(&self, user_id: &str) -> Option<PresenceSnapshot> {
        self.presence.snapshot(user_id)
    }

    pub fn presence_transitions(&self) -> broadcast::Receiver<PresenceTransition> {
        self.presence.transitions()
    }

    // ---- attendance ----

    /// Location tag for an attendance action. An explicit tag wins; otherwise
    /// the user's current presence decides. Outside-zone tags require
    /// `confirmed`.
    pub fn resolve_location(
        &self,
        user_id: &str,
        requested: Option<LocationStatus>,
        confirmed: bool,
    ) -> Result<LocationStatus, EngineError> {
        let status = requested.unwrap_or_else(|| {
            LocationStatus::from_presence(
                self.presence
                    .status(user_id)
                    .unwrap_or(PresenceStatus::Unassigned),
            )
        });
        if status.needs_confirmation() && !confirmed {
            return Err(EngineError::validation(
                "outside-zone attendance requires explicit confirmation",
            ));
        }
        Ok(status)
    }

    pub async fn check_in(
        &self,
        user_id: &str,
        location_status: Option<LocationStatus>,
        confirmed: bool,
    ) -> Result<AttendanceAction, EngineError> {
        let location_status = self.resolve_location(user_id, location_status, confirmed)?;
        self.ledger.check_in(user_id, location_status).await?;
        Ok(self.today(user_id))
    }

    pub async fn check_out(
        &self,
        user_id: &str,
        location_status: Option<LocationStatus>,
        confirmed: bool,
    ) -> Result<AttendanceAction, EngineError> {
        let location_status = self.resolve_location(user_id, location_status, confirmed)?;
        self.ledger.check_out(user_id, location_status).await?;
        Ok(self.today(user_id))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Today's calendar date in the configured offset.
    pub fn local_today(&self) -> NaiveDate {
        local_date(self.clock.now(), self.offset)
    }

    pub fn today(&self, user_id: &str) -> AttendanceAction {
        let today = self.ledger.today_state(user_id);
        AttendanceAction {
            state: today.state(),
            today,
        }
    }

    pub fn events_for(&self, user_id: &str, range: DateRange) -> Vec<AttendanceEvent> {
        self.ledger.events_for(user_id, range)
    }

    // ---- permissions ----

    pub async fn request_permission(
        &self,
        user_id: &str,
        user_name: &str,
        reason: &str,
        date: Option<NaiveDate>,
    ) -> Result<PermissionRequest, EngineError> {
        self.permissions.request(user_id, user_name, reason, date).await
    }

    pub async fn decide_permission(
        &self,
        request_id: &str,
        decision: Decision,
    ) -> Result<PermissionRequest, EngineError> {
        self.permissions.decide(request_id, decision).await
    }

    pub async fn permission(&self, request_id: &str) -> Result<PermissionRequest, EngineError> {
        self.permissions.get(request_id).await
    }

    pub async fn pending_permissions(&self) -> Vec<PermissionRequest> {
        self.permissions.pending().await
    }

    pub async fn list_permissions(&self, filter: &PermissionFilter) -> PermissionPage {
        self.permissions.list(filter).await
    }

    // ---- reporting ----

    pub async fn get_daily_summary(&self, user_id: &str, date: NaiveDate) -> DailySummary {
        self.calculator.compute_daily(user_id, date).await
    }

    pub async fn list_summaries(&self, range: DateRange, user_filter: Option<&str>) -> Vec<DailySummary> {
        self.reports.summarize(range, user_filter).await
    }

    pub async fn live_board(&self) -> Vec<LiveEntry> {
        self.reports.live_board().await
    }

    /// Live change feed of one collection.
    pub fn subscribe(&self, collection: Collection) -> broadcast::Receiver<ChangeEvent> {
        self.store.subscribe(collection)
    }
}
