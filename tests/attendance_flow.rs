use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use futures::stream::unfold;
use tokio::sync::mpsc;

use hrm_attendance::engine::presence::{Fix, LocationFix};
use hrm_attendance::model::attendance::{DailyAttendanceState, LocationStatus};
use hrm_attendance::model::permission::Decision;
use hrm_attendance::model::presence::PresenceStatus;
use hrm_attendance::model::summary::{DeductionOutcome, DeductionTier};
use hrm_attendance::model::zone::{Coordinates, Zone, ZoneSpec};
use hrm_attendance::store::{ChangeEvent, Collection, InMemoryStore};
use hrm_attendance::utils::clock::ManualClock;
use hrm_attendance::utils::time::DateRange;
use hrm_attendance::{AttendanceEngine, EngineError, EngineSettings};

const HQ_LAT: f64 = 24.7136;
const HQ_LNG: f64 = 46.6753;
/// Roughly 150 m of latitude.
const NORTH_150M: f64 = 0.00135;

fn at(ts: &str) -> DateTime<Utc> {
    ts.parse().unwrap()
}

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

fn hq_spec() -> ZoneSpec {
    ZoneSpec {
        name: "Riyadh HQ".into(),
        center_lat: HQ_LAT,
        center_lng: HQ_LNG,
        radius_meters: 200.0,
        shift_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        shift_end: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    clock: Arc<ManualClock>,
    engine: AttendanceEngine,
}

/// Engine on a Riyadh (+03:00) calendar, clock at `start`.
async fn harness(start: &str) -> Harness {
    let store = Arc::new(InMemoryStore::default());
    let clock = Arc::new(ManualClock::new(at(start)));
    let engine = AttendanceEngine::bootstrap(store.clone(), clock.clone(), EngineSettings::default())
        .await
        .unwrap();
    Harness { store, clock, engine }
}

async fn hq_with(h: &Harness, users: &[&str]) -> Zone {
    let zone = h.engine.create_zone(hq_spec()).await.unwrap();
    for user in users {
        h.engine.assign_zone(user, &zone.id).await.unwrap();
    }
    h.engine.zone(&zone.id).unwrap()
}

#[tokio::test]
async fn late_arrival_full_day() {
    // 08:18 local
    let h = harness("2026-03-02T05:18:00Z").await;
    hq_with(&h, &["sara"]).await;

    let status = h
        .engine
        .submit_presence_sample("sara", HQ_LAT + NORTH_150M, HQ_LNG, None)
        .unwrap();
    assert_eq!(status, PresenceStatus::Inside);
    let distance = h.engine.presence_of("sara").unwrap().distance_meters.unwrap();
    assert!((149..=151).contains(&distance), "distance = {distance}");

    // 08:20 local, tag derived from presence
    h.clock.set(at("2026-03-02T05:20:00Z"));
    let action = h.engine.check_in("sara", None, false).await.unwrap();
    assert_eq!(action.state, DailyAttendanceState::CheckedIn);
    assert_eq!(
        action.today.check_in.unwrap().location_status,
        LocationStatus::InsideZone
    );

    // 16:00 local
    h.clock.set(at("2026-03-02T13:00:00Z"));
    let action = h.engine.check_out("sara", None, false).await.unwrap();
    assert_eq!(action.state, DailyAttendanceState::CheckedOut);

    let summary = h.engine.get_daily_summary("sara", monday()).await;
    assert_eq!(summary.late_minutes, Some(20));
    assert_eq!(summary.early_minutes, Some(0));
    assert_eq!(summary.worked_duration.unwrap().to_string(), "7h 40m");
    let deduction = summary.deduction.unwrap();
    assert_eq!(deduction, DeductionOutcome::Tier { tier: DeductionTier::Attention });
    assert_eq!(deduction.label(), "attention (late)");
}

#[tokio::test]
async fn approved_permission_excuses_a_late_day() {
    // 09:30 local, 90 minutes late
    let h = harness("2026-03-02T06:30:00Z").await;
    hq_with(&h, &["omar"]).await;
    h.engine
        .check_in("omar", Some(LocationStatus::InsideZone), false)
        .await
        .unwrap();

    let before = h.engine.get_daily_summary("omar", monday()).await;
    assert_eq!(before.late_minutes, Some(90));
    assert_eq!(
        before.deduction,
        Some(DeductionOutcome::Tier { tier: DeductionTier::FullDay })
    );

    let request = h
        .engine
        .request_permission("omar", "Omar", "Hospital appointment", None)
        .await
        .unwrap();
    assert_eq!(request.date, monday());
    // pending requests do not excuse anything
    assert_eq!(h.engine.get_daily_summary("omar", monday()).await, before);

    h.engine
        .decide_permission(&request.id, Decision::Approved)
        .await
        .unwrap();

    let first = h.engine.get_daily_summary("omar", monday()).await;
    let second = h.engine.get_daily_summary("omar", monday()).await;
    assert_eq!(
        first.deduction,
        Some(DeductionOutcome::Excused { reason: "Hospital appointment".into() })
    );
    assert_eq!(first, second);

    let again = h
        .engine
        .decide_permission(&request.id, Decision::Rejected)
        .await
        .unwrap_err();
    assert!(matches!(again, EngineError::Conflict(_)));
}

#[tokio::test]
async fn outside_zone_needs_confirmation() {
    let h = harness("2026-03-02T05:00:00Z").await;
    hq_with(&h, &["lina"]).await;

    // about 1.1 km away
    let status = h
        .engine
        .submit_presence_sample("lina", HQ_LAT + 0.01, HQ_LNG, None)
        .unwrap();
    assert_eq!(status, PresenceStatus::Outside);

    let err = h.engine.check_in("lina", None, false).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(h.engine.today("lina").state, DailyAttendanceState::NotStarted);

    let action = h.engine.check_in("lina", None, true).await.unwrap();
    assert_eq!(
        action.today.check_in.unwrap().location_status,
        LocationStatus::OutsideZone
    );
}

#[tokio::test]
async fn unassigned_user_checks_in_outside_without_lateness() {
    let h = harness("2026-03-02T06:00:00Z").await;

    let status = h
        .engine
        .submit_presence_sample("guest", HQ_LAT, HQ_LNG, None)
        .unwrap();
    assert_eq!(status, PresenceStatus::Unassigned);

    h.engine.check_in("guest", None, true).await.unwrap();
    h.clock.advance(TimeDelta::hours(8));
    h.engine.check_out("guest", None, true).await.unwrap();

    let summary = h.engine.get_daily_summary("guest", monday()).await;
    assert_eq!(summary.late_minutes, None);
    assert_eq!(summary.deduction, None);
    assert_eq!(summary.worked_duration.unwrap().total_minutes(), 480);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_assignment_to_two_zones() {
    for _ in 0..20 {
        let h = harness("2026-03-02T05:00:00Z").await;
        let engine = Arc::new(h.engine);
        let a = engine.create_zone(hq_spec()).await.unwrap();
        let mut other = hq_spec();
        other.name = "Jeddah Branch".into();
        let b = engine.create_zone(other).await.unwrap();

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.assign_zone("sara", &a.id).await })
        };
        let second = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.assign_zone("sara", &b.id).await })
        };
        let results = [first.await.unwrap(), second.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(EngineError::Conflict(m)) if m == "already assigned elsewhere")));
        let memberships = engine
            .zones()
            .iter()
            .filter(|z| z.has_member("sara"))
            .count();
        assert_eq!(memberships, 1);
    }
}

#[tokio::test]
async fn store_outage_surfaces_and_changes_nothing() {
    let h = harness("2026-03-02T05:00:00Z").await;
    let zone = hq_with(&h, &[]).await;

    h.store.set_unavailable(true);
    assert!(matches!(
        h.engine.assign_zone("sara", &zone.id).await,
        Err(EngineError::External(_))
    ));
    assert!(matches!(
        h.engine.check_in("sara", Some(LocationStatus::InsideZone), false).await,
        Err(EngineError::External(_))
    ));

    h.store.set_unavailable(false);
    assert!(h.engine.zone_of("sara").is_none());
    assert_eq!(h.engine.today("sara").state, DailyAttendanceState::NotStarted);
}

#[tokio::test]
async fn summaries_cover_each_user_day_newest_first() {
    let h = harness("2026-03-02T05:00:00Z").await;
    hq_with(&h, &["omar", "sara"]).await;

    for user in ["sara", "omar"] {
        h.engine
            .check_in(user, Some(LocationStatus::InsideZone), false)
            .await
            .unwrap();
    }
    h.clock.advance(TimeDelta::days(1));
    h.engine
        .check_in("sara", Some(LocationStatus::InsideZone), false)
        .await
        .unwrap();

    let all = h.engine.list_summaries(DateRange::default(), None).await;
    let keys: Vec<_> = all.iter().map(|s| (s.date, s.user_id.as_str())).collect();
    let tuesday = monday().succ_opt().unwrap();
    assert_eq!(
        keys,
        [(tuesday, "sara"), (monday(), "omar"), (monday(), "sara")]
    );

    let only_monday = h
        .engine
        .list_summaries(DateRange::single(monday()), Some("sara"))
        .await;
    assert_eq!(only_monday.len(), 1);
    assert_eq!(only_monday[0].late_minutes, Some(0));
}

#[tokio::test]
async fn live_board_and_change_feed() {
    let h = harness("2026-03-02T05:00:00Z").await;
    let zone = hq_with(&h, &["sara", "omar"]).await;
    let mut feed = h.engine.subscribe(Collection::Attendance);

    let action = h
        .engine
        .check_in("sara", Some(LocationStatus::InsideZone), false)
        .await
        .unwrap();
    let event_id = action.today.check_in.unwrap().id;

    match feed.recv().await.unwrap() {
        ChangeEvent::Upserted { collection, record } => {
            assert_eq!(collection, Collection::Attendance);
            assert_eq!(record.id, event_id);
        }
        other => panic!("unexpected change {other:?}"),
    }

    let board = h.engine.live_board().await;
    let users: Vec<_> = board.iter().map(|e| e.user_id.as_str()).collect();
    assert_eq!(users, ["omar", "sara"]);
    assert!(board[0].last_event.is_none());
    assert_eq!(board[1].last_event.as_ref().unwrap().id, event_id);
    assert!(board.iter().all(|e| e.zone_id.as_deref() == Some(zone.id.as_str())));
}

#[tokio::test]
async fn removing_zone_unassigns_members() {
    let h = harness("2026-03-02T05:00:00Z").await;
    let zone = hq_with(&h, &["sara"]).await;

    let removed = h.engine.remove_zone(&zone.id).await.unwrap();
    assert!(removed.has_member("sara"));
    assert!(h.engine.zone_of("sara").is_none());
    assert!(matches!(
        h.engine.zone(&zone.id),
        Err(EngineError::NotFound(_))
    ));

    let status = h
        .engine
        .submit_presence_sample("sara", HQ_LAT, HQ_LNG, None)
        .unwrap();
    assert_eq!(status, PresenceStatus::Unassigned);
}

#[tokio::test]
async fn geometry_change_reclassifies_next_sample() {
    let h = harness("2026-03-02T05:00:00Z").await;
    let zone = hq_with(&h, &["sara"]).await;
    let position = (HQ_LAT + NORTH_150M, HQ_LNG);

    let inside = h
        .engine
        .submit_presence_sample("sara", position.0, position.1, None)
        .unwrap();
    assert_eq!(inside, PresenceStatus::Inside);

    h.engine
        .update_zone_geometry(&zone.id, Coordinates::new(HQ_LAT, HQ_LNG), 100.0)
        .await
        .unwrap();
    let outside = h
        .engine
        .submit_presence_sample("sara", position.0, position.1, None)
        .unwrap();
    assert_eq!(outside, PresenceStatus::Outside);
}

#[tokio::test]
async fn state_survives_restart() {
    let h = harness("2026-03-02T05:20:00Z").await;
    hq_with(&h, &["sara"]).await;
    h.engine
        .check_in("sara", Some(LocationStatus::InsideZone), false)
        .await
        .unwrap();
    let request = h
        .engine
        .request_permission("sara", "Sara", "traffic", None)
        .await
        .unwrap();

    let restarted = AttendanceEngine::bootstrap(h.store.clone(), h.clock.clone(), EngineSettings::default())
        .await
        .unwrap();
    assert!(restarted.zone_of("sara").is_some());
    assert_eq!(restarted.today("sara").state, DailyAttendanceState::CheckedIn);
    assert_eq!(restarted.permission(&request.id).await.unwrap().reason, "traffic");
    assert_eq!(
        restarted.get_daily_summary("sara", monday()).await.late_minutes,
        Some(20)
    );
}

#[tokio::test]
async fn live_watch_feeds_presence_until_stopped() {
    let h = harness("2026-03-02T05:00:00Z").await;
    hq_with(&h, &["sara"]).await;
    let mut transitions = h.engine.presence_transitions();

    let (tx, rx) = mpsc::channel::<LocationFix>(8);
    let source = unfold(rx, |mut rx| async move { rx.recv().await.map(|fix| (fix, rx)) });
    let handle = h.engine.watch_presence("sara", source);

    tx.send(Ok(Fix {
        position: Coordinates::new(HQ_LAT + NORTH_150M, HQ_LNG),
        sampled_at: at("2026-03-02T05:00:00Z"),
    }))
    .await
    .unwrap();
    let first = tokio::time::timeout(Duration::from_secs(5), transitions.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.to, PresenceStatus::Inside);

    tx.send(Ok(Fix {
        position: Coordinates::new(HQ_LAT + 0.01, HQ_LNG),
        sampled_at: at("2026-03-02T05:01:00Z"),
    }))
    .await
    .unwrap();
    let second = tokio::time::timeout(Duration::from_secs(5), transitions.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.from, Some(PresenceStatus::Inside));
    assert_eq!(second.to, PresenceStatus::Outside);

    assert!(h.engine.stop_presence("sara"));
    assert!(h.engine.presence_of("sara").is_none());
    handle.shutdown().await;

    // the ledger is untouched by presence
    assert_eq!(h.engine.today("sara").state, DailyAttendanceState::NotStarted);
}
