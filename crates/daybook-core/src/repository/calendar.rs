use crate::error::CoreError;
use crate::models::{CalendarEvent, NewEventData, UpdateEventData};
use crate::repository::{not_found, optional_text, required_text, CalendarRepository, SqliteRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

fn validate_span(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), CoreError> {
    if end < start {
        Err(CoreError::InvalidInput(
            "Event end time cannot be before its start time".to_string(),
        ))
    } else {
        Ok(())
    }
}

#[async_trait]
impl CalendarRepository for SqliteRepository {
    async fn add_event(&self, data: NewEventData) -> Result<CalendarEvent, CoreError> {
        let title = required_text(&data.title, "Event title")?;
        validate_span(data.start_time, data.end_time)?;
        let now = self.now();

        let event = CalendarEvent {
            id: Uuid::new_v4(),
            title,
            start_time: data.start_time,
            end_time: data.end_time,
            location: optional_text(data.location),
            recurrence: optional_text(data.recurrence),
            color: optional_text(data.color),
            created_at: now,
            updated_at: now,
        };

        self.db().insert(&event).await?;
        self.cache().refresh::<CalendarEvent>(self.db()).await?;
        Ok(event)
    }

    async fn update_event(&self, id: Uuid, data: UpdateEventData) -> Result<CalendarEvent, CoreError> {
        let mut event = self
            .db()
            .get::<CalendarEvent>(id)
            .await?
            .ok_or_else(|| not_found("Event", id))?;

        if let Some(title) = data.title {
            event.title = required_text(&title, "Event title")?;
        }
        if let Some(start) = data.start_time {
            event.start_time = start;
        }
        if let Some(end) = data.end_time {
            event.end_time = end;
        }
        if let Some(location) = data.location {
            event.location = optional_text(location);
        }
        if let Some(recurrence) = data.recurrence {
            event.recurrence = optional_text(recurrence);
        }
        if let Some(color) = data.color {
            event.color = optional_text(color);
        }
        validate_span(event.start_time, event.end_time)?;
        event.updated_at = self.now();

        self.db().put(&event).await?;
        self.cache().refresh::<CalendarEvent>(self.db()).await?;
        Ok(event)
    }

    async fn delete_event(&self, id: Uuid) -> Result<(), CoreError> {
        if !self.db().delete::<CalendarEvent>(id).await? {
            return Err(not_found("Event", id));
        }
        self.cache().refresh::<CalendarEvent>(self.db()).await?;
        Ok(())
    }

    fn events(&self) -> Arc<Vec<CalendarEvent>> {
        self.cache().get::<CalendarEvent>()
    }

    fn event(&self, id: Uuid) -> Option<CalendarEvent> {
        self.cache().find::<CalendarEvent>(id)
    }

    fn events_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<CalendarEvent> {
        let mut events: Vec<CalendarEvent> = self
            .events()
            .iter()
            .filter(|e| e.overlaps(from, to))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.start_time);
        events
    }
}
