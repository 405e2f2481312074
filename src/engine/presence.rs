//! Geofence presence tracking.
//!
//! Each user's latest classification lives in a sharded table owned by the
//! tracker. A user's live watch is a task consuming that user's location
//! stream in arrival order; it touches only that user's entry, so users never
//! contend with each other. Cancelling a watch drops the entry and stops
//! delivery without touching attendance data.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::zones::ZoneRegistry;
use crate::model::UserId;
use crate::model::presence::{PresenceSample, PresenceSnapshot, PresenceStatus, PresenceTransition};
use crate::model::zone::Coordinates;
use crate::utils::clock::Clock;
use crate::utils::geo::{haversine_distance, within_radius};

/// Why a location source could not produce a fix.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable: {0}")]
    Unavailable(String),
    #[error("no fix within {0:?}")]
    Timeout(Duration),
}

/// One position reported by a location source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub position: Coordinates,
    pub sampled_at: DateTime<Utc>,
}

pub type LocationFix = Result<Fix, LocationError>;

#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    /// Longest wait for the next fix before the user is reported as `ERROR`.
    pub fix_timeout: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            fix_timeout: Duration::from_secs(10),
        }
    }
}

struct PresenceEntry {
    snapshot: Option<PresenceSnapshot>,
    watch: Option<CancellationToken>,
    generation: u64,
}

pub struct PresenceTracker {
    zones: Arc<ZoneRegistry>,
    clock: Arc<dyn Clock>,
    options: WatchOptions,
    entries: DashMap<UserId, PresenceEntry>,
    transitions: broadcast::Sender<PresenceTransition>,
    generation: AtomicU64,
}

impl PresenceTracker {
    pub fn new(
        zones: Arc<ZoneRegistry>,
        clock: Arc<dyn Clock>,
        options: WatchOptions,
        channel_capacity: usize,
    ) -> Self {
        let (transitions, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            zones,
            clock,
            options,
            entries: DashMap::new(),
            transitions,
            generation: AtomicU64::new(1),
        }
    }

    /// Classifies one sample against the user's current zone.
    pub fn submit_sample(&self, sample: PresenceSample) -> PresenceStatus {
        let (status, distance) = self.classify(&sample);
        self.record(&sample.user_id, status, distance, sample.sampled_at, None);
        status
    }

    /// The location source failed or timed out. Assigned users become `ERROR`.
    pub fn report_failure(&self, user_id: &str, error: &LocationError) -> PresenceStatus {
        let status = self.classify_failure(user_id, error);
        self.record(user_id, status, None, self.clock.now(), None);
        status
    }

    fn classify(&self, sample: &PresenceSample) -> (PresenceStatus, Option<f64>) {
        match self.zones.zone_of(&sample.user_id) {
            None => (PresenceStatus::Unassigned, None),
            Some(zone) => {
                let distance =
                    haversine_distance(Coordinates::new(sample.lat, sample.lng), zone.center());
                let status = if within_radius(distance, zone.radius_meters) {
                    PresenceStatus::Inside
                } else {
                    PresenceStatus::Outside
                };
                (status, Some(distance))
            }
        }
    }

    fn classify_failure(&self, user_id: &str, error: &LocationError) -> PresenceStatus {
        warn!(user_id, %error, "Location fix failed");
        match self.zones.zone_of(user_id) {
            None => PresenceStatus::Unassigned,
            Some(_) => PresenceStatus::Error,
        }
    }

    pub fn snapshot(&self, user_id: &str) -> Option<PresenceSnapshot> {
        self.entries.get(user_id).and_then(|e| e.snapshot.clone())
    }

    pub fn status(&self, user_id: &str) -> Option<PresenceStatus> {
        self.snapshot(user_id).map(|s| s.status)
    }

    pub fn transitions(&self) -> broadcast::Receiver<PresenceTransition> {
        self.transitions.subscribe()
    }

    pub fn is_watching(&self, user_id: &str) -> bool {
        self.entries
            .get(user_id)
            .is_some_and(|e| e.watch.as_ref().is_some_and(|t| !t.is_cancelled()))
    }

    /// Starts consuming `source` for `user_id`, replacing any running watch.
    pub fn watch<S>(self: &Arc<Self>, user_id: impl Into<UserId>, source: S) -> WatchHandle
    where
        S: Stream<Item = LocationFix> + Send + 'static,
    {
        let user_id = user_id.into();
        let token = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        let previous = {
            let mut entry = self.entries.entry(user_id.clone()).or_insert_with(|| PresenceEntry {
                snapshot: None,
                watch: None,
                generation,
            });
            entry.generation = generation;
            entry.watch.replace(token.clone())
        };
        if let Some(previous) = previous {
            previous.cancel();
        }

        info!(user_id = %user_id, "Presence watch started");
        let task = tokio::spawn(self.clone().run_watch(
            user_id.clone(),
            Box::pin(source),
            token.clone(),
            generation,
        ));

        WatchHandle {
            user_id,
            token,
            task: Some(task),
        }
    }

    /// Cancels the user's watch, if any, and forgets their status.
    pub fn stop(&self, user_id: &str) -> bool {
        match self.entries.remove(user_id) {
            Some((_, entry)) => {
                if let Some(token) = entry.watch {
                    token.cancel();
                    info!(user_id, "Presence watch stopped");
                }
                true
            }
            None => false,
        }
    }

    async fn run_watch(
        self: Arc<Self>,
        user_id: UserId,
        mut source: std::pin::Pin<Box<dyn Stream<Item = LocationFix> + Send>>,
        token: CancellationToken,
        generation: u64,
    ) {
        let fix_timeout = self.options.fix_timeout;
        loop {
            let next = tokio::select! {
                _ = token.cancelled() => break,
                next = tokio::time::timeout(fix_timeout, source.next()) => next,
            };

            match next {
                Ok(Some(Ok(fix))) => {
                    let sample = PresenceSample {
                        user_id: user_id.clone(),
                        lat: fix.position.lat,
                        lng: fix.position.lng,
                        sampled_at: fix.sampled_at,
                    };
                    let (status, distance) = self.classify(&sample);
                    self.record(&user_id, status, distance, sample.sampled_at, Some(generation));
                }
                Ok(Some(Err(error))) => {
                    let status = self.classify_failure(&user_id, &error);
                    self.record(&user_id, status, None, self.clock.now(), Some(generation));
                }
                Ok(None) => {
                    debug!(user_id = %user_id, "Location source closed");
                    break;
                }
                Err(_) => {
                    let status =
                        self.classify_failure(&user_id, &LocationError::Timeout(fix_timeout));
                    self.record(&user_id, status, None, self.clock.now(), Some(generation));
                }
            }
        }

        self.entries.remove_if(&user_id, |_, e| e.generation == generation);
        debug!(user_id = %user_id, "Presence watch finished");
    }

    /// Stores the new status and emits a transition only when it changed.
    ///
    /// A write from a watch (`watch = Some(generation)`) lands only while that
    /// watch still owns a live entry; once the watch is stopped or replaced the
    /// sample is dropped instead of recreating the entry.
    fn record(
        &self,
        user_id: &str,
        status: PresenceStatus,
        distance: Option<f64>,
        at: DateTime<Utc>,
        watch: Option<u64>,
    ) {
        let previous = {
            let mut entry = match watch {
                None => self
                    .entries
                    .entry(user_id.to_string())
                    .or_insert_with(|| PresenceEntry {
                        snapshot: None,
                        watch: None,
                        generation: 0,
                    }),
                Some(generation) => match self.entries.get_mut(user_id) {
                    Some(entry)
                        if entry.generation == generation
                            && entry.watch.as_ref().is_some_and(|t| !t.is_cancelled()) =>
                    {
                        entry
                    }
                    _ => {
                        debug!(user_id, generation, "Dropped sample from a stopped watch");
                        return;
                    }
                },
            };
            let previous = entry.snapshot.as_ref().map(|s| s.status);
            entry.snapshot = Some(PresenceSnapshot {
                status,
                distance_meters: distance.map(|d| d.round() as u64),
                updated_at: at,
            });
            previous
        };

        if previous != Some(status) {
            debug!(user_id, ?previous, ?status, "Presence changed");
            // nobody listening is fine
            let _ = self.transitions.send(PresenceTransition {
                user_id: user_id.to_string(),
                from: previous,
                to: status,
                at,
            });
        }
    }
}

/// A running live watch. Cancelled explicitly or when dropped.
pub struct WatchHandle {
    user_id: UserId,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancels and waits for the watch task to wind down.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::zone::ZoneSpec;
    use crate::store::InMemoryStore;
    use crate::store::testing::GatedStore;
    use crate::utils::clock::SystemClock;
    use chrono::NaiveTime;
    use tokio::sync::mpsc;
    use support::ReceiverStream;

    /// Minimal mpsc → Stream adapter so tests can push fixes by hand.
    mod support {
        use super::*;
        use std::pin::Pin;
        use std::task::{Context, Poll};

        pub struct ReceiverStream(pub mpsc::Receiver<LocationFix>);

        impl Stream for ReceiverStream {
            type Item = LocationFix;

            fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
                self.0.poll_recv(cx)
            }
        }
    }

    const CENTER: Coordinates = Coordinates { lat: 24.7136, lng: 46.6753 };

    async fn tracker_with_zone(user: &str) -> Arc<PresenceTracker> {
        tracker_with_options(user, WatchOptions::default()).await
    }

    fn hq() -> ZoneSpec {
        ZoneSpec {
            name: "HQ".into(),
            center_lat: CENTER.lat,
            center_lng: CENTER.lng,
            radius_meters: 200.0,
            shift_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            shift_end: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        }
    }

    async fn tracker_with_options(user: &str, options: WatchOptions) -> Arc<PresenceTracker> {
        let store = Arc::new(InMemoryStore::default());
        let zones = Arc::new(ZoneRegistry::load(store).await.unwrap());
        let zone = zones.create_zone(hq()).await.unwrap();
        zones.assign(user, &zone.id).await.unwrap();
        Arc::new(PresenceTracker::new(zones, Arc::new(SystemClock), options, 64))
    }

    fn sample(user: &str, lat_offset: f64) -> PresenceSample {
        PresenceSample {
            user_id: user.into(),
            lat: CENTER.lat + lat_offset,
            lng: CENTER.lng,
            sampled_at: Utc::now(),
        }
    }

    fn fix(lat_offset: f64) -> LocationFix {
        Ok(Fix {
            position: Coordinates::new(CENTER.lat + lat_offset, CENTER.lng),
            sampled_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn classifies_against_assigned_zone() {
        let tracker = tracker_with_zone("u1").await;

        assert_eq!(tracker.submit_sample(sample("u1", 0.00135)), PresenceStatus::Inside);
        assert_eq!(tracker.snapshot("u1").unwrap().distance_meters, Some(150));
        assert_eq!(tracker.submit_sample(sample("u1", 0.003)), PresenceStatus::Outside);
        assert_eq!(tracker.submit_sample(sample("stranger", 0.0)), PresenceStatus::Unassigned);
        assert_eq!(tracker.snapshot("stranger").unwrap().distance_meters, None);
    }

    #[tokio::test]
    async fn transitions_are_edge_triggered() {
        let tracker = tracker_with_zone("u1").await;
        let mut transitions = tracker.transitions();

        tracker.submit_sample(sample("u1", 0.0));
        tracker.submit_sample(sample("u1", 0.0001));
        tracker.submit_sample(sample("u1", 0.01));
        tracker.submit_sample(sample("u1", 0.02));

        let first = transitions.recv().await.unwrap();
        assert_eq!((first.from, first.to), (None, PresenceStatus::Inside));
        let second = transitions.recv().await.unwrap();
        assert_eq!(
            (second.from, second.to),
            (Some(PresenceStatus::Inside), PresenceStatus::Outside)
        );
        assert!(transitions.try_recv().is_err());
    }

    #[tokio::test]
    async fn failure_surfaces_as_error() {
        let tracker = tracker_with_zone("u1").await;
        let status = tracker.report_failure("u1", &LocationError::Unavailable("no gps".into()));
        assert_eq!(status, PresenceStatus::Error);
        assert_eq!(
            tracker.report_failure("nobody", &LocationError::PermissionDenied),
            PresenceStatus::Unassigned
        );
    }

    #[tokio::test]
    async fn watch_applies_fixes_in_order_and_cancel_cleans_up() {
        let tracker = tracker_with_zone("u1").await;
        let mut transitions = tracker.transitions();
        let (tx, rx) = mpsc::channel(8);

        let handle = tracker.watch("u1", ReceiverStream(rx));
        assert!(tracker.is_watching("u1"));

        tx.send(fix(0.0)).await.unwrap();
        tx.send(fix(0.05)).await.unwrap();
        assert_eq!(transitions.recv().await.unwrap().to, PresenceStatus::Inside);
        assert_eq!(transitions.recv().await.unwrap().to, PresenceStatus::Outside);

        handle.shutdown().await;
        assert!(!tracker.is_watching("u1"));
        assert!(tracker.snapshot("u1").is_none());
        // delivery stopped: the receiver side is gone
        assert!(tx.send(fix(0.0)).await.is_err());
    }

    #[tokio::test]
    async fn dropping_the_handle_cancels() {
        let tracker = tracker_with_zone("u1").await;
        let (tx, rx) = mpsc::channel(8);
        let handle = tracker.watch("u1", ReceiverStream(rx));
        drop(handle);

        tokio::time::timeout(Duration::from_secs(1), tx.closed())
            .await
            .expect("watch task should release the source");
    }

    #[tokio::test]
    async fn stop_by_user_id() {
        let tracker = tracker_with_zone("u1").await;
        let (_tx, rx) = mpsc::channel(8);
        let handle = tracker.watch("u1", ReceiverStream(rx));

        assert!(tracker.stop("u1"));
        assert!(handle.is_cancelled());
        assert!(!tracker.stop("u1"));
    }

    #[tokio::test]
    async fn silent_source_times_out_to_error() {
        let options = WatchOptions {
            fix_timeout: Duration::from_millis(20),
        };
        let tracker = tracker_with_options("u1", options).await;
        let mut transitions = tracker.transitions();
        let (_tx, rx) = mpsc::channel(8);
        let _handle = tracker.watch("u1", ReceiverStream(rx));

        let transition = tokio::time::timeout(Duration::from_secs(2), transitions.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(transition.to, PresenceStatus::Error);
    }

    #[tokio::test]
    async fn new_watch_replaces_previous() {
        let tracker = tracker_with_zone("u1").await;
        let (_tx1, rx1) = mpsc::channel(8);
        let (tx2, rx2) = mpsc::channel(8);

        let first = tracker.watch("u1", ReceiverStream(rx1));
        let _second = tracker.watch("u1", ReceiverStream(rx2));
        assert!(first.is_cancelled());

        let mut transitions = tracker.transitions();
        tx2.send(fix(0.0)).await.unwrap();
        assert_eq!(transitions.recv().await.unwrap().to, PresenceStatus::Inside);
        assert!(tracker.is_watching("u1"));
    }

    #[tokio::test]
    async fn sampling_does_not_wait_for_roster_writes() {
        let store = Arc::new(GatedStore::new());
        let zones = Arc::new(ZoneRegistry::load(store.clone()).await.unwrap());
        let zone = zones.create_zone(hq()).await.unwrap();
        zones.assign("u1", &zone.id).await.unwrap();
        let tracker = PresenceTracker::new(zones.clone(), Arc::new(SystemClock), WatchOptions::default(), 64);

        store.hold();
        let pending = tokio::spawn({
            let zones = zones.clone();
            let zone_id = zone.id.clone();
            async move { zones.assign("u2", &zone_id).await }
        });
        store.entered.notified().await;

        // u2's assignment is still being written
        assert_eq!(tracker.submit_sample(sample("u1", 0.0)), PresenceStatus::Inside);
        assert_eq!(tracker.submit_sample(sample("u2", 0.0)), PresenceStatus::Unassigned);
        assert_eq!(zones.get(&zone.id).unwrap().assigned_user_ids.len(), 1);

        store.release();
        pending.await.unwrap().unwrap();
        assert_eq!(tracker.submit_sample(sample("u2", 0.0)), PresenceStatus::Inside);
    }

    #[tokio::test]
    async fn stopped_watch_cannot_bring_presence_back() {
        let tracker = tracker_with_zone("u1").await;
        let (_tx, rx) = mpsc::channel(8);
        let _handle = tracker.watch("u1", ReceiverStream(rx));
        let generation = tracker.entries.get("u1").unwrap().generation;

        tracker.stop("u1");
        // a fix classified just before the stop lands just after it
        tracker.record("u1", PresenceStatus::Inside, Some(0.0), Utc::now(), Some(generation));

        assert!(tracker.snapshot("u1").is_none());
        assert!(tracker.entries.get("u1").is_none());
    }

    #[tokio::test]
    async fn replaced_watch_writes_are_dropped() {
        let tracker = tracker_with_zone("u1").await;
        let (_tx1, rx1) = mpsc::channel(8);
        let _first = tracker.watch("u1", ReceiverStream(rx1));
        let stale = tracker.entries.get("u1").unwrap().generation;
        let (_tx2, rx2) = mpsc::channel(8);
        let _second = tracker.watch("u1", ReceiverStream(rx2));

        tracker.record("u1", PresenceStatus::Outside, Some(500.0), Utc::now(), Some(stale));

        assert!(tracker.snapshot("u1").is_none());
        assert!(tracker.is_watching("u1"));
    }
}
