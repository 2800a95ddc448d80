//! Live stopwatches for time-tracking activities.
//!
//! Each activity has at most one timer. A timer moves from running to paused
//! and back any number of times, and ends either with `stop` (which commits a
//! [`TimeLogEntry`]) or with `discard`. The whole set is written to the
//! key-value store after every change so timers survive a restart.

use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use crate::kv::{keys, KeyValueStore};
use crate::models::{NewTimeLogEntry, TimeLogEntry};
use crate::repository::TimeLogRepository;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTimer {
    pub activity_id: Uuid,
    /// Shifted forward on every resume, so `now - start_time` never counts
    /// paused time.
    pub start_time: DateTime<Utc>,
    pub is_paused: bool,
    #[serde(default)]
    pub pause_time: Option<DateTime<Utc>>,
}

impl ActiveTimer {
    fn started(activity_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            activity_id,
            start_time: now,
            is_paused: false,
            pause_time: None,
        }
    }

    /// The point at which tracked time stops accruing.
    pub fn end_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.pause_time {
            Some(paused) if self.is_paused => paused,
            _ => now,
        }
    }

    /// Active (unpaused) time tracked so far.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (self.end_time(now) - self.start_time).max(Duration::zero())
    }
}

/// The single-timer record written by older versions.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyActiveTimer {
    activity_id: Uuid,
    start_time: DateTime<Utc>,
    #[serde(default)]
    paused_at: Option<DateTime<Utc>>,
}

impl From<LegacyActiveTimer> for ActiveTimer {
    fn from(legacy: LegacyActiveTimer) -> Self {
        Self {
            activity_id: legacy.activity_id,
            start_time: legacy.start_time,
            is_paused: legacy.paused_at.is_some(),
            pause_time: legacy.paused_at,
        }
    }
}

pub struct TimerTracker {
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    log: Arc<dyn TimeLogRepository>,
    timers: Mutex<BTreeMap<Uuid, ActiveTimer>>,
}

impl TimerTracker {
    /// Restores persisted timers, converting a legacy single-timer record if
    /// one is present.
    pub async fn load(
        kv: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        log: Arc<dyn TimeLogRepository>,
    ) -> CoreResult<Self> {
        let mut timers: BTreeMap<Uuid, ActiveTimer> = kv
            .get_json::<Vec<ActiveTimer>>(keys::ACTIVE_TIMERS)
            .await?
            .unwrap_or_default()
            .into_iter()
            .map(|t| (t.activity_id, t))
            .collect();

        let tracker_needs_save =
            if let Some(legacy) = kv.get_json::<LegacyActiveTimer>(keys::LEGACY_ACTIVE_TIMER).await? {
                let timer = ActiveTimer::from(legacy);
                info!(activity_id = %timer.activity_id, "migrating legacy active timer");
                timers.entry(timer.activity_id).or_insert(timer);
                true
            } else {
                false
            };

        let tracker = Self {
            kv,
            clock,
            log,
            timers: Mutex::new(timers),
        };

        if tracker_needs_save {
            let timers = tracker.timers.lock().await;
            tracker.persist(&timers).await?;
            tracker.kv.remove(keys::LEGACY_ACTIVE_TIMER).await?;
        }
        Ok(tracker)
    }

    async fn persist(&self, timers: &BTreeMap<Uuid, ActiveTimer>) -> CoreResult<()> {
        let list: Vec<&ActiveTimer> = timers.values().collect();
        self.kv.set_json(keys::ACTIVE_TIMERS, &list).await
    }

    /// Starts a timer, or resumes it if it is paused. Starting a running
    /// timer changes nothing.
    pub async fn start(&self, activity_id: Uuid) -> CoreResult<ActiveTimer> {
        if self.log.activity(activity_id).is_none() {
            return Err(CoreError::NotFound(format!("Activity with id {activity_id}")));
        }

        let mut timers = self.timers.lock().await;
        let now = self.clock.now();
        let timer = match timers.get(&activity_id) {
            Some(existing) if !existing.is_paused => return Ok(existing.clone()),
            Some(existing) => resumed(existing, now),
            None => ActiveTimer::started(activity_id, now),
        };

        timers.insert(activity_id, timer.clone());
        self.persist(&timers).await?;
        info!(%activity_id, "timer started");
        Ok(timer)
    }

    pub async fn pause(&self, activity_id: Uuid) -> CoreResult<ActiveTimer> {
        let mut timers = self.timers.lock().await;
        let timer = timers
            .get_mut(&activity_id)
            .ok_or_else(|| no_timer(activity_id))?;
        if timer.is_paused {
            return Err(CoreError::InvalidInput(
                "Timer is already paused".to_string(),
            ));
        }

        timer.is_paused = true;
        timer.pause_time = Some(self.clock.now());
        let timer = timer.clone();
        self.persist(&timers).await?;
        info!(%activity_id, "timer paused");
        Ok(timer)
    }

    pub async fn resume(&self, activity_id: Uuid) -> CoreResult<ActiveTimer> {
        let mut timers = self.timers.lock().await;
        let existing = timers
            .get(&activity_id)
            .ok_or_else(|| no_timer(activity_id))?;
        if !existing.is_paused {
            return Err(CoreError::InvalidInput(
                "Timer is not paused".to_string(),
            ));
        }

        let timer = resumed(existing, self.clock.now());
        timers.insert(activity_id, timer.clone());
        self.persist(&timers).await?;
        info!(%activity_id, "timer resumed");
        Ok(timer)
    }

    /// Commits the tracked time as a log entry and removes the timer.
    ///
    /// The timer is first persisted as gone, then the entry is inserted. If
    /// either step fails the timer stays (in memory and on disk) and nothing
    /// is logged, so the span is never lost and never logged twice.
    pub async fn stop(&self, activity_id: Uuid, notes: Option<String>) -> CoreResult<TimeLogEntry> {
        let mut timers = self.timers.lock().await;
        let timer = timers
            .get(&activity_id)
            .cloned()
            .ok_or_else(|| no_timer(activity_id))?;

        let mut remaining = timers.clone();
        remaining.remove(&activity_id);
        self.persist(&remaining).await?;

        let end_time = timer.end_time(self.clock.now());
        let inserted = self
            .log
            .add_time_log_entry(NewTimeLogEntry {
                activity_id,
                start_time: timer.start_time,
                end_time: end_time.max(timer.start_time),
                notes,
                is_manual: false,
            })
            .await;

        let entry = match inserted {
            Ok(entry) => entry,
            Err(e) => {
                if let Err(restore) = self.persist(&timers).await {
                    warn!(%activity_id, error = %restore, "could not restore timer after failed stop");
                }
                return Err(e);
            }
        };

        *timers = remaining;
        info!(%activity_id, duration_ms = entry.duration_ms, "timer stopped");
        Ok(entry)
    }

    /// Drops a timer without logging anything.
    pub async fn discard(&self, activity_id: Uuid) -> CoreResult<ActiveTimer> {
        let mut timers = self.timers.lock().await;
        let timer = timers
            .remove(&activity_id)
            .ok_or_else(|| no_timer(activity_id))?;
        self.persist(&timers).await?;
        info!(%activity_id, "timer discarded");
        Ok(timer)
    }

    pub async fn active(&self) -> Vec<ActiveTimer> {
        self.timers.lock().await.values().cloned().collect()
    }

    pub async fn get(&self, activity_id: Uuid) -> Option<ActiveTimer> {
        self.timers.lock().await.get(&activity_id).cloned()
    }

    pub async fn elapsed(&self, activity_id: Uuid) -> CoreResult<Duration> {
        let timers = self.timers.lock().await;
        let timer = timers
            .get(&activity_id)
            .ok_or_else(|| no_timer(activity_id))?;
        Ok(timer.elapsed(self.clock.now()))
    }
}

fn resumed(timer: &ActiveTimer, now: DateTime<Utc>) -> ActiveTimer {
    let paused_for = timer
        .pause_time
        .map(|paused| now - paused)
        .unwrap_or_else(Duration::zero);
    ActiveTimer {
        activity_id: timer.activity_id,
        start_time: timer.start_time + paused_for,
        is_paused: false,
        pause_time: None,
    }
}

fn no_timer(activity_id: Uuid) -> CoreError {
    CoreError::NotFound(format!("No active timer for activity {activity_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::kv::MemoryKeyValueStore;
    use crate::models::{NewActivityData, TimeActivity, UpdateActivityData, UpdateTimeLogEntry};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex as StdMutex;

    /// Knows a single activity and records (or refuses) inserted entries.
    struct FakeLog {
        activity: TimeActivity,
        fail_inserts: bool,
        inserted: StdMutex<Vec<TimeLogEntry>>,
    }

    impl FakeLog {
        fn new(fail_inserts: bool) -> Self {
            Self {
                activity: TimeActivity {
                    id: Uuid::now_v7(),
                    name: "Deep work".to_string(),
                    icon: None,
                    color: None,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                },
                fail_inserts,
                inserted: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TimeLogRepository for FakeLog {
        async fn add_activity(&self, _: NewActivityData) -> CoreResult<TimeActivity> {
            unimplemented!()
        }
        async fn update_activity(&self, _: Uuid, _: UpdateActivityData) -> CoreResult<TimeActivity> {
            unimplemented!()
        }
        async fn delete_activity(&self, _: Uuid) -> CoreResult<()> {
            unimplemented!()
        }
        async fn add_time_log_entry(&self, data: NewTimeLogEntry) -> CoreResult<TimeLogEntry> {
            if self.fail_inserts {
                return Err(CoreError::Database(sqlx::Error::PoolClosed));
            }
            let entry = TimeLogEntry {
                id: Uuid::now_v7(),
                activity_id: data.activity_id,
                start_time: data.start_time,
                end_time: data.end_time,
                duration_ms: (data.end_time - data.start_time).num_milliseconds(),
                notes: data.notes,
                is_manual: data.is_manual,
                updated_at: Utc::now(),
            };
            self.inserted.lock().unwrap().push(entry.clone());
            Ok(entry)
        }
        async fn update_time_log_entry(&self, _: Uuid, _: UpdateTimeLogEntry) -> CoreResult<TimeLogEntry> {
            unimplemented!()
        }
        async fn delete_time_log_entry(&self, _: Uuid) -> CoreResult<()> {
            unimplemented!()
        }
        fn activities(&self) -> Arc<Vec<TimeActivity>> {
            Arc::new(vec![self.activity.clone()])
        }
        fn activity(&self, id: Uuid) -> Option<TimeActivity> {
            (id == self.activity.id).then(|| self.activity.clone())
        }
        fn time_log_entries(&self) -> Arc<Vec<TimeLogEntry>> {
            Arc::new(self.inserted.lock().unwrap().clone())
        }
        fn time_log_entry(&self, _: Uuid) -> Option<TimeLogEntry> {
            None
        }
        fn entries_for_activity(&self, _: Uuid) -> Vec<TimeLogEntry> {
            Vec::new()
        }
        fn total_duration_for(&self, _: Uuid) -> Duration {
            Duration::zero()
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    async fn tracker(fail_inserts: bool) -> (TimerTracker, Arc<ManualClock>, Arc<FakeLog>, Arc<MemoryKeyValueStore>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let log = Arc::new(FakeLog::new(fail_inserts));
        let kv = Arc::new(MemoryKeyValueStore::new());
        let tracker = TimerTracker::load(kv.clone(), clock.clone(), log.clone())
            .await
            .unwrap();
        (tracker, clock, log, kv)
    }

    #[tokio::test]
    async fn paused_time_is_excluded_from_logged_duration() {
        let (tracker, clock, log, _) = tracker(false).await;
        let id = log.activity.id;

        tracker.start(id).await.unwrap();
        clock.advance(Duration::seconds(60));
        tracker.pause(id).await.unwrap();
        clock.advance(Duration::seconds(30));
        tracker.resume(id).await.unwrap();
        clock.advance(Duration::seconds(20));

        let entry = tracker.stop(id, None).await.unwrap();
        assert_eq!(entry.duration_ms, 80_000);
        assert_eq!(entry.end_time - entry.start_time, Duration::seconds(80));
        assert!(tracker.active().await.is_empty());
    }

    #[tokio::test]
    async fn stopping_while_paused_ends_at_pause_time() {
        let (tracker, clock, log, _) = tracker(false).await;
        let id = log.activity.id;

        tracker.start(id).await.unwrap();
        clock.advance(Duration::seconds(45));
        tracker.pause(id).await.unwrap();
        clock.advance(Duration::minutes(10));

        let entry = tracker.stop(id, Some("reading".into())).await.unwrap();
        assert_eq!(entry.duration_ms, 45_000);
        assert_eq!(entry.notes.as_deref(), Some("reading"));
    }

    #[tokio::test]
    async fn start_on_running_timer_is_a_no_op() {
        let (tracker, clock, log, _) = tracker(false).await;
        let id = log.activity.id;

        let first = tracker.start(id).await.unwrap();
        clock.advance(Duration::seconds(5));
        let second = tracker.start(id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(tracker.active().await.len(), 1);
    }

    #[tokio::test]
    async fn start_on_paused_timer_resumes() {
        let (tracker, clock, log, _) = tracker(false).await;
        let id = log.activity.id;

        tracker.start(id).await.unwrap();
        clock.advance(Duration::seconds(10));
        tracker.pause(id).await.unwrap();
        clock.advance(Duration::seconds(50));
        let timer = tracker.start(id).await.unwrap();

        assert!(!timer.is_paused);
        assert_eq!(timer.start_time, t0() + Duration::seconds(50));
        assert_eq!(tracker.elapsed(id).await.unwrap(), Duration::seconds(10));
    }

    #[tokio::test]
    async fn invalid_transitions_are_rejected() {
        let (tracker, _, log, _) = tracker(false).await;
        let id = log.activity.id;

        assert!(matches!(tracker.pause(id).await, Err(CoreError::NotFound(_))));
        tracker.start(id).await.unwrap();
        assert!(matches!(tracker.resume(id).await, Err(CoreError::InvalidInput(_))));
        tracker.pause(id).await.unwrap();
        assert!(matches!(tracker.pause(id).await, Err(CoreError::InvalidInput(_))));
        assert!(matches!(
            tracker.start(Uuid::now_v7()).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn failed_insert_keeps_the_timer() {
        let (tracker, clock, log, _) = tracker(true).await;
        let id = log.activity.id;

        tracker.start(id).await.unwrap();
        clock.advance(Duration::minutes(3));
        assert!(tracker.stop(id, None).await.is_err());

        let timer = tracker.get(id).await.expect("timer must survive");
        assert_eq!(timer.elapsed(clock.now()), Duration::minutes(3));
    }

    /// Wraps the in-memory store and refuses writes while `failing` is set.
    #[derive(Default)]
    struct FlakyKv {
        inner: MemoryKeyValueStore,
        failing: std::sync::atomic::AtomicBool,
    }

    impl FlakyKv {
        fn fail_writes(&self, failing: bool) {
            self.failing.store(failing, std::sync::atomic::Ordering::SeqCst);
        }

        fn check(&self) -> CoreResult<()> {
            if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
                Err(CoreError::Io(std::io::Error::other("disk full")))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl KeyValueStore for FlakyKv {
        async fn get(&self, key: &str) -> CoreResult<Option<String>> {
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: String) -> CoreResult<()> {
            self.check()?;
            self.inner.set(key, value).await
        }
        async fn remove(&self, key: &str) -> CoreResult<()> {
            self.check()?;
            self.inner.remove(key).await
        }
    }

    #[tokio::test]
    async fn failed_save_on_stop_logs_nothing_and_keeps_the_timer() {
        let clock = Arc::new(ManualClock::new(t0()));
        let log = Arc::new(FakeLog::new(false));
        let kv = Arc::new(FlakyKv::default());
        let tracker = TimerTracker::load(kv.clone(), clock.clone(), log.clone())
            .await
            .unwrap();
        let id = log.activity.id;

        tracker.start(id).await.unwrap();
        clock.advance(Duration::minutes(5));
        kv.fail_writes(true);
        assert!(tracker.stop(id, None).await.is_err());
        assert!(log.time_log_entries().is_empty());
        assert!(tracker.get(id).await.is_some());

        kv.fail_writes(false);
        let reloaded = TimerTracker::load(kv.clone(), clock.clone(), log.clone())
            .await
            .unwrap();
        let entry = reloaded.stop(id, None).await.unwrap();
        assert_eq!(entry.duration_ms, 300_000);
        assert_eq!(log.time_log_entries().len(), 1);

        let after = TimerTracker::load(kv, clock, log.clone()).await.unwrap();
        assert!(after.active().await.is_empty());
    }

    #[tokio::test]
    async fn failed_insert_leaves_the_timer_on_disk() {
        let (tracker, clock, log, kv) = tracker(true).await;
        let id = log.activity.id;

        tracker.start(id).await.unwrap();
        assert!(tracker.stop(id, None).await.is_err());

        let reloaded = TimerTracker::load(kv, clock, log).await.unwrap();
        assert!(reloaded.get(id).await.is_some());
    }

    #[tokio::test]
    async fn timers_survive_reload() {
        let (tracker, clock, log, kv) = tracker(false).await;
        let id = log.activity.id;
        tracker.start(id).await.unwrap();
        drop(tracker);

        let reloaded = TimerTracker::load(kv, clock, log).await.unwrap();
        let timer = reloaded.get(id).await.unwrap();
        assert_eq!(timer.start_time, t0());
    }

    #[tokio::test]
    async fn legacy_record_is_converted_and_removed() {
        let clock = Arc::new(ManualClock::new(t0()));
        let log = Arc::new(FakeLog::new(false));
        let kv = Arc::new(MemoryKeyValueStore::new());
        let paused_at = t0() + Duration::seconds(90);
        let legacy = serde_json::json!({
            "activityId": log.activity.id,
            "startTime": t0(),
            "pausedAt": paused_at,
        });
        kv.set(keys::LEGACY_ACTIVE_TIMER, legacy.to_string())
            .await
            .unwrap();

        let tracker = TimerTracker::load(kv.clone(), clock, log.clone()).await.unwrap();

        let timer = tracker.get(log.activity.id).await.unwrap();
        assert!(timer.is_paused);
        assert_eq!(timer.pause_time, Some(paused_at));
        assert_eq!(kv.get(keys::LEGACY_ACTIVE_TIMER).await.unwrap(), None);
        assert!(kv.get(keys::ACTIVE_TIMERS).await.unwrap().is_some());
    }
}
