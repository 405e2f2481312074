use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

use super::compliance::ComplianceCalculator;
use super::ledger::AttendanceLedger;
use super::presence::PresenceTracker;
use super::zones::ZoneRegistry;
use crate::model::UserId;
use crate::model::attendance::AttendanceEvent;
use crate::model::presence::PresenceSnapshot;
use crate::model::summary::DailySummary;
use crate::utils::time::{DateRange, local_date};

/// One row of the live attendance board.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LiveEntry {
    pub user_id: UserId,
    pub zone_id: Option<String>,
    pub last_event: Option<AttendanceEvent>,
    pub presence: Option<PresenceSnapshot>,
}

/// Read-only aggregation over the calculator. Holds no state of its own.
pub struct ReportAggregator {
    calculator: Arc<ComplianceCalculator>,
    ledger: Arc<AttendanceLedger>,
    zones: Arc<ZoneRegistry>,
    presence: Arc<PresenceTracker>,
}

impl ReportAggregator {
    pub fn new(
        calculator: Arc<ComplianceCalculator>,
        ledger: Arc<AttendanceLedger>,
        zones: Arc<ZoneRegistry>,
        presence: Arc<PresenceTracker>,
    ) -> Self {
        Self {
            calculator,
            ledger,
            zones,
            presence,
        }
    }

    /// One summary per (user, day) that has ledger events, newest day first.
    pub async fn summarize(&self, range: DateRange, user_filter: Option<&str>) -> Vec<DailySummary> {
        let offset = self.ledger.offset();
        let groups: BTreeSet<(NaiveDate, UserId)> = self
            .ledger
            .events_in(range)
            .into_iter()
            .filter(|e| user_filter.is_none_or(|u| e.user_id == u))
            .map(|e| (local_date(e.timestamp, offset), e.user_id))
            .collect();

        let mut summaries = Vec::with_capacity(groups.len());
        // newest day first, users alphabetical within a day
        let mut ordered: Vec<_> = groups.into_iter().collect();
        ordered.sort_by(|(d1, u1), (d2, u2)| d2.cmp(d1).then_with(|| u1.cmp(u2)));
        for (date, user_id) in ordered {
            summaries.push(self.calculator.compute_daily(&user_id, date).await);
        }
        summaries
    }

    pub async fn live_board(&self) -> Vec<LiveEntry> {
        let zones = self.zones.list();
        let mut users: BTreeSet<UserId> = self.ledger.users().into_iter().collect();
        for zone in &zones {
            users.extend(zone.assigned_user_ids.iter().cloned());
        }

        users
            .into_iter()
            .map(|user_id| LiveEntry {
                zone_id: zones
                    .iter()
                    .find(|z| z.has_member(&user_id))
                    .map(|z| z.id.clone()),
                last_event: self.ledger.latest_event(&user_id),
                presence: self.presence.snapshot(&user_id),
                user_id,
            })
            .collect()
    }
}
