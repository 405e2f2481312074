//! Derivation of daily compliance figures.
//!
//! This is the only place lateness, earliness, worked time and deductions are
//! computed; reports and the HTTP layer always call through here.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use super::ledger::AttendanceLedger;
use super::permissions::PermissionWorkflow;
use super::zones::ZoneRegistry;
use crate::model::attendance::DayAttendance;
use crate::model::permission::PermissionRequest;
use crate::model::summary::{DailySummary, DeductionOutcome, DeductionTier, WorkedDuration};
use crate::model::zone::Zone;

/// Late-minute thresholds. A value equal to a threshold falls in the milder tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeductionPolicy {
    pub grace_minutes: i64,
    pub half_day_after_minutes: i64,
    pub full_day_after_minutes: i64,
}

impl Default for DeductionPolicy {
    fn default() -> Self {
        Self {
            grace_minutes: 15,
            half_day_after_minutes: 30,
            full_day_after_minutes: 60,
        }
    }
}

impl DeductionPolicy {
    pub fn tier_for(&self, late_minutes: i64) -> DeductionTier {
        if late_minutes <= self.grace_minutes {
            DeductionTier::NoDeduction
        } else if late_minutes <= self.half_day_after_minutes {
            DeductionTier::Attention
        } else if late_minutes <= self.full_day_after_minutes {
            DeductionTier::HalfDay
        } else {
            DeductionTier::FullDay
        }
    }
}

/// Whole minutes from `from` to `to`, rounded, never negative.
fn positive_minutes(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    let millis = (to - from).num_milliseconds() as f64;
    (millis / 60_000.0).round().max(0.0) as i64
}

/// Pure daily computation over already fetched inputs.
pub fn summarize_day(
    user_id: &str,
    date: NaiveDate,
    zone: Option<&Zone>,
    day: &DayAttendance,
    excuse: Option<&PermissionRequest>,
    offset: FixedOffset,
    policy: &DeductionPolicy,
) -> DailySummary {
    let actual_in = day.check_in.as_ref().map(|e| e.timestamp);
    let actual_out = day.check_out.as_ref().map(|e| e.timestamp);
    let window = zone.map(|z| z.shift_window(date, offset));

    let late_minutes = window
        .zip(actual_in)
        .map(|((shift_start, _), actual_in)| positive_minutes(shift_start, actual_in));
    let early_minutes = window
        .zip(actual_out)
        .map(|((_, shift_end), actual_out)| positive_minutes(actual_out, shift_end));
    let worked_duration = actual_in
        .zip(actual_out)
        .map(|(actual_in, actual_out)| WorkedDuration::from_delta(actual_out - actual_in));

    let deduction = match excuse {
        Some(request) => Some(DeductionOutcome::Excused {
            reason: request.reason.clone(),
        }),
        None => late_minutes.map(|late| DeductionOutcome::Tier {
            tier: policy.tier_for(late),
        }),
    };

    DailySummary {
        user_id: user_id.to_string(),
        date,
        check_in: actual_in,
        check_in_status: day.check_in.as_ref().map(|e| e.location_status),
        check_out: actual_out,
        check_out_status: day.check_out.as_ref().map(|e| e.location_status),
        late_minutes,
        early_minutes,
        worked_duration,
        deduction,
    }
}

pub struct ComplianceCalculator {
    zones: Arc<ZoneRegistry>,
    ledger: Arc<AttendanceLedger>,
    permissions: Arc<PermissionWorkflow>,
    policy: DeductionPolicy,
}

impl ComplianceCalculator {
    pub fn new(
        zones: Arc<ZoneRegistry>,
        ledger: Arc<AttendanceLedger>,
        permissions: Arc<PermissionWorkflow>,
        policy: DeductionPolicy,
    ) -> Self {
        Self {
            zones,
            ledger,
            permissions,
            policy,
        }
    }

    pub fn policy(&self) -> &DeductionPolicy {
        &self.policy
    }

    pub async fn compute_daily(&self, user_id: &str, date: NaiveDate) -> DailySummary {
        let zone = self.zones.zone_of(user_id);
        let day = self.ledger.day(user_id, date);
        let excuse = self.permissions.approved_for(user_id, date).await;

        summarize_day(
            user_id,
            date,
            zone.as_ref(),
            &day,
            excuse.as_ref(),
            self.ledger.offset(),
            &self.policy,
        )
    }
}
