//! Remembers which event reminders have already been shown.

use crate::error::CoreResult;
use crate::kv::{keys, KeyValueStore};
use crate::models::CalendarEvent;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// A reminder is identified by the event and the start time it announced, so
/// moving an event arms its reminder again.
fn reminder_key(event: &CalendarEvent) -> String {
    format!("{}@{}", event.id, event.start_time.timestamp())
}

pub struct ReminderLedger {
    kv: Arc<dyn KeyValueStore>,
    fired: Mutex<BTreeMap<String, DateTime<Utc>>>,
}

impl ReminderLedger {
    pub async fn load(kv: Arc<dyn KeyValueStore>) -> CoreResult<Self> {
        let fired = kv
            .get_json::<BTreeMap<String, DateTime<Utc>>>(keys::FIRED_NOTIFICATIONS)
            .await?
            .unwrap_or_default();
        Ok(Self {
            kv,
            fired: Mutex::new(fired),
        })
    }

    /// Events starting within `lead` of `now` (and not yet started) whose
    /// reminder has not fired, ordered by start time.
    pub async fn due_reminders(
        &self,
        events: &[CalendarEvent],
        now: DateTime<Utc>,
        lead: Duration,
    ) -> Vec<CalendarEvent> {
        let fired = self.fired.lock().await;
        let mut due: Vec<CalendarEvent> = events
            .iter()
            .filter(|e| e.start_time > now && e.start_time - lead <= now)
            .filter(|e| !fired.contains_key(&reminder_key(e)))
            .cloned()
            .collect();
        due.sort_by_key(|e| e.start_time);
        due
    }

    pub async fn has_fired(&self, event: &CalendarEvent) -> bool {
        self.fired.lock().await.contains_key(&reminder_key(event))
    }

    pub async fn mark_fired(&self, event: &CalendarEvent, at: DateTime<Utc>) -> CoreResult<()> {
        let mut fired = self.fired.lock().await;
        fired.insert(reminder_key(event), at);
        self.kv.set_json(keys::FIRED_NOTIFICATIONS, &*fired).await
    }

    /// Forgets markers recorded before `older_than`; returns how many went.
    pub async fn prune(&self, older_than: DateTime<Utc>) -> CoreResult<usize> {
        let mut fired = self.fired.lock().await;
        let before = fired.len();
        fired.retain(|_, at| *at >= older_than);
        let removed = before - fired.len();
        if removed > 0 {
            self.kv.set_json(keys::FIRED_NOTIFICATIONS, &*fired).await?;
            debug!(removed, "pruned fired reminders");
        }
        Ok(removed)
    }
}
