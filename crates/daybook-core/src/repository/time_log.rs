use crate::error::CoreError;
use crate::models::{
    NewActivityData, NewTimeLogEntry, TimeActivity, TimeLogEntry, UpdateActivityData,
    UpdateTimeLogEntry,
};
use crate::repository::{not_found, optional_text, required_text, SqliteRepository, TimeLogRepository};
use crate::store;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::cmp::Reverse;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

fn validate_bounds(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), CoreError> {
    if end < start {
        Err(CoreError::InvalidInput(
            "Time log entry cannot end before it starts".to_string(),
        ))
    } else {
        Ok(())
    }
}

impl SqliteRepository {
    async fn ensure_activity_exists(&self, id: Uuid) -> Result<(), CoreError> {
        if self.db().get::<TimeActivity>(id).await?.is_none() {
            return Err(not_found("Activity", id));
        }
        Ok(())
    }
}

#[async_trait]
impl TimeLogRepository for SqliteRepository {
    async fn add_activity(&self, data: NewActivityData) -> Result<TimeActivity, CoreError> {
        let name = required_text(&data.name, "Activity name")?;

        let now = self.now();
        let activity = TimeActivity {
            id: Uuid::new_v4(),
            name,
            icon: optional_text(data.icon),
            color: optional_text(data.color),
            created_at: now,
            updated_at: now,
        };

        self.db().insert(&activity).await?;
        self.cache().refresh::<TimeActivity>(self.db()).await?;
        Ok(activity)
    }

    async fn update_activity(&self, id: Uuid, data: UpdateActivityData) -> Result<TimeActivity, CoreError> {
        let mut activity = self
            .db()
            .get::<TimeActivity>(id)
            .await?
            .ok_or_else(|| not_found("Activity", id))?;

        if let Some(name) = data.name {
            activity.name = required_text(&name, "Activity name")?;
        }
        if let Some(icon) = data.icon {
            activity.icon = optional_text(icon);
        }
        if let Some(color) = data.color {
            activity.color = optional_text(color);
        }
        activity.updated_at = self.now();

        self.db().put(&activity).await?;
        self.cache().refresh::<TimeActivity>(self.db()).await?;
        Ok(activity)
    }

    async fn delete_activity(&self, id: Uuid) -> Result<(), CoreError> {
        let mut tx = self.db().pool().begin().await?;

        let referencing =
            store::find_by_field_in::<TimeLogEntry>(&mut tx, "a", &id.to_string()).await?;
        if !referencing.is_empty() {
            return Err(CoreError::InvalidInput(format!(
                "Cannot delete activity because it has {} time log entr{}. Delete them first.",
                referencing.len(),
                if referencing.len() == 1 { "y" } else { "ies" }
            )));
        }
        if store::delete_in::<TimeActivity>(&mut tx, id).await? == 0 {
            return Err(not_found("Activity", id));
        }
        tx.commit().await?;

        self.cache().refresh::<TimeActivity>(self.db()).await?;
        Ok(())
    }

    async fn add_time_log_entry(&self, data: NewTimeLogEntry) -> Result<TimeLogEntry, CoreError> {
        validate_bounds(data.start_time, data.end_time)?;
        self.ensure_activity_exists(data.activity_id).await?;

        let mut entry = TimeLogEntry {
            id: Uuid::new_v4(),
            activity_id: data.activity_id,
            start_time: data.start_time,
            end_time: data.end_time,
            duration_ms: 0,
            notes: optional_text(data.notes),
            is_manual: data.is_manual,
            updated_at: self.now(),
        };
        entry.recompute_duration();

        self.db().insert(&entry).await?;
        self.cache().refresh::<TimeLogEntry>(self.db()).await?;
        debug!(entry_id = %entry.id, duration_ms = entry.duration_ms, "time logged");
        Ok(entry)
    }

    async fn update_time_log_entry(&self, id: Uuid, data: UpdateTimeLogEntry) -> Result<TimeLogEntry, CoreError> {
        let mut entry = self
            .db()
            .get::<TimeLogEntry>(id)
            .await?
            .ok_or_else(|| not_found("Time log entry", id))?;

        if let Some(activity_id) = data.activity_id {
            self.ensure_activity_exists(activity_id).await?;
            entry.activity_id = activity_id;
        }
        if let Some(start) = data.start_time {
            entry.start_time = start;
        }
        if let Some(end) = data.end_time {
            entry.end_time = end;
        }
        if let Some(notes) = data.notes {
            entry.notes = optional_text(notes);
        }
        validate_bounds(entry.start_time, entry.end_time)?;
        entry.recompute_duration();
        entry.updated_at = self.now();

        self.db().put(&entry).await?;
        self.cache().refresh::<TimeLogEntry>(self.db()).await?;
        Ok(entry)
    }

    async fn delete_time_log_entry(&self, id: Uuid) -> Result<(), CoreError> {
        if !self.db().delete::<TimeLogEntry>(id).await? {
            return Err(not_found("Time log entry", id));
        }
        self.cache().refresh::<TimeLogEntry>(self.db()).await?;
        Ok(())
    }

    fn activities(&self) -> Arc<Vec<TimeActivity>> {
        self.cache().get::<TimeActivity>()
    }

    fn activity(&self, id: Uuid) -> Option<TimeActivity> {
        self.cache().find::<TimeActivity>(id)
    }

    fn time_log_entries(&self) -> Arc<Vec<TimeLogEntry>> {
        self.cache().get::<TimeLogEntry>()
    }

    fn time_log_entry(&self, id: Uuid) -> Option<TimeLogEntry> {
        self.cache().find::<TimeLogEntry>(id)
    }

    fn entries_for_activity(&self, activity_id: Uuid) -> Vec<TimeLogEntry> {
        let mut entries: Vec<TimeLogEntry> = self
            .time_log_entries()
            .iter()
            .filter(|e| e.activity_id == activity_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| Reverse(e.start_time));
        entries
    }

    fn total_duration_for(&self, activity_id: Uuid) -> Duration {
        let total_ms: i64 = self
            .time_log_entries()
            .iter()
            .filter(|e| e.activity_id == activity_id)
            .map(|e| e.duration_ms)
            .sum();
        Duration::milliseconds(total_ms)
    }
}
