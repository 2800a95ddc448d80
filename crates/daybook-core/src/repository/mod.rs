use crate::cache::Cache;
use crate::clock::Clock;
use crate::error::CoreError;
use crate::models::{
    CalendarEvent, Habit, HabitCompletion, NewActivityData, NewEventData, NewHabitData,
    NewNoteData, NewTaskData, NewTimeLogEntry, Note, Notebook, Task, TimeActivity, TimeLogEntry,
    UpdateActivityData, UpdateEventData, UpdateHabitData, UpdateNoteData, UpdateTaskData,
    UpdateTimeLogEntry,
};
use crate::store::LocalDb;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::Arc;
use uuid::Uuid;

// Re-export domain modules
pub mod calendar;
pub mod habits;
pub mod notes;
pub mod tasks;
pub mod time_log;

// Every write follows the same sequence: local database write, full refresh of
// the affected collections into the cache, publish. Reads never touch the
// database.

/// Domain-specific trait for task operations
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn add_task(&self, data: NewTaskData) -> Result<Task, CoreError>;
    async fn update_task(&self, id: Uuid, data: UpdateTaskData) -> Result<Task, CoreError>;
    async fn delete_task(&self, id: Uuid) -> Result<(), CoreError>;
    async fn toggle_task_completion(&self, id: Uuid) -> Result<Task, CoreError>;
    /// Makes `task_id` depend on `depends_on_id`. Only direct (one-hop)
    /// cycles are detected.
    async fn add_dependency(&self, task_id: Uuid, depends_on_id: Uuid) -> Result<Task, CoreError>;
    async fn remove_dependency(&self, task_id: Uuid, depends_on_id: Uuid) -> Result<Task, CoreError>;
    async fn add_subtask(&self, task_id: Uuid, text: String) -> Result<Task, CoreError>;
    async fn toggle_subtask(&self, task_id: Uuid, subtask_id: Uuid) -> Result<Task, CoreError>;
    /// Starts the task's stopwatch, or pauses it if it is running.
    async fn toggle_task_timer(&self, id: Uuid) -> Result<Task, CoreError>;
    /// Overwrites the whole task collection (remote snapshot import).
    async fn replace_tasks(&self, tasks: Vec<Task>) -> Result<(), CoreError>;
    fn tasks(&self) -> Arc<Vec<Task>>;
    fn task(&self, id: Uuid) -> Option<Task>;
    fn find_tasks_by_short_id_prefix(&self, short_id: &str) -> Vec<Task>;
}

/// Domain-specific trait for note and notebook operations
#[async_trait]
pub trait NoteRepository: Send + Sync {
    async fn add_notebook(&self, name: String) -> Result<Notebook, CoreError>;
    async fn rename_notebook(&self, id: Uuid, name: String) -> Result<Notebook, CoreError>;
    /// Deletes the notebook and every note in it; returns the number of notes removed.
    async fn delete_notebook(&self, id: Uuid) -> Result<u64, CoreError>;
    async fn add_note(&self, data: NewNoteData) -> Result<Note, CoreError>;
    async fn update_note(&self, id: Uuid, data: UpdateNoteData) -> Result<Note, CoreError>;
    async fn toggle_note_pin(&self, id: Uuid) -> Result<Note, CoreError>;
    async fn move_note(&self, id: Uuid, notebook_id: Option<Uuid>) -> Result<Note, CoreError>;
    async fn delete_note(&self, id: Uuid) -> Result<(), CoreError>;
    fn notebooks(&self) -> Arc<Vec<Notebook>>;
    fn notebook(&self, id: Uuid) -> Option<Notebook>;
    fn notes(&self) -> Arc<Vec<Note>>;
    fn note(&self, id: Uuid) -> Option<Note>;
    /// Notes in `notebook_id` (`None` = unfiled), pinned first, newest first.
    fn notes_in_notebook(&self, notebook_id: Option<Uuid>) -> Vec<Note>;
}

/// Domain-specific trait for habit operations
#[async_trait]
pub trait HabitRepository: Send + Sync {
    async fn add_habit(&self, data: NewHabitData) -> Result<Habit, CoreError>;
    async fn update_habit(&self, id: Uuid, data: UpdateHabitData) -> Result<Habit, CoreError>;
    /// Deletes the habit and all of its completions; returns the number of completions removed.
    async fn delete_habit(&self, id: Uuid) -> Result<u64, CoreError>;
    /// Upserts the completion for `(habit_id, date)`. A count of zero removes it.
    async fn log_completion(
        &self,
        habit_id: Uuid,
        date: NaiveDate,
        count: u32,
    ) -> Result<Option<HabitCompletion>, CoreError>;
    fn habits(&self) -> Arc<Vec<Habit>>;
    fn habit(&self, id: Uuid) -> Option<Habit>;
    fn completions_for(&self, habit_id: Uuid) -> Vec<HabitCompletion>;
    /// Consecutive days, ending today (or yesterday if today is not done yet),
    /// on which the habit reached its target.
    fn current_streak(&self, habit_id: Uuid, today: NaiveDate) -> Result<u32, CoreError>;
}

/// Domain-specific trait for calendar operations
#[async_trait]
pub trait CalendarRepository: Send + Sync {
    async fn add_event(&self, data: NewEventData) -> Result<CalendarEvent, CoreError>;
    async fn update_event(&self, id: Uuid, data: UpdateEventData) -> Result<CalendarEvent, CoreError>;
    async fn delete_event(&self, id: Uuid) -> Result<(), CoreError>;
    fn events(&self) -> Arc<Vec<CalendarEvent>>;
    fn event(&self, id: Uuid) -> Option<CalendarEvent>;
    /// Events overlapping `[from, to)`, ordered by start time.
    fn events_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<CalendarEvent>;
}

/// Domain-specific trait for time tracking operations
#[async_trait]
pub trait TimeLogRepository: Send + Sync {
    async fn add_activity(&self, data: NewActivityData) -> Result<TimeActivity, CoreError>;
    async fn update_activity(&self, id: Uuid, data: UpdateActivityData) -> Result<TimeActivity, CoreError>;
    /// Refused while log entries still reference the activity.
    async fn delete_activity(&self, id: Uuid) -> Result<(), CoreError>;
    async fn add_time_log_entry(&self, data: NewTimeLogEntry) -> Result<TimeLogEntry, CoreError>;
    async fn update_time_log_entry(&self, id: Uuid, data: UpdateTimeLogEntry) -> Result<TimeLogEntry, CoreError>;
    async fn delete_time_log_entry(&self, id: Uuid) -> Result<(), CoreError>;
    fn activities(&self) -> Arc<Vec<TimeActivity>>;
    fn activity(&self, id: Uuid) -> Option<TimeActivity>;
    fn time_log_entries(&self) -> Arc<Vec<TimeLogEntry>>;
    fn time_log_entry(&self, id: Uuid) -> Option<TimeLogEntry>;
    /// Entries for one activity, most recent first.
    fn entries_for_activity(&self, activity_id: Uuid) -> Vec<TimeLogEntry>;
    fn total_duration_for(&self, activity_id: Uuid) -> Duration;
}

/// Main repository trait that composes all domain traits
pub trait Repository:
    TaskRepository + NoteRepository + HabitRepository + CalendarRepository + TimeLogRepository
{
}

/// SQLite implementation of the repository pattern
pub struct SqliteRepository {
    db: LocalDb,
    cache: Arc<Cache>,
    clock: Arc<dyn Clock>,
}

impl SqliteRepository {
    pub fn new(db: LocalDb, cache: Arc<Cache>, clock: Arc<dyn Clock>) -> Self {
        Self { db, cache, clock }
    }

    /// Builds a repository with a freshly hydrated cache.
    pub async fn open(db: LocalDb, clock: Arc<dyn Clock>) -> Result<Self, CoreError> {
        let cache = Arc::new(Cache::new());
        cache.hydrate(&db).await?;
        Ok(Self::new(db, cache, clock))
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    pub fn local_db(&self) -> &LocalDb {
        &self.db
    }

    pub(crate) fn db(&self) -> &LocalDb {
        &self.db
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl Repository for SqliteRepository {}

/// Trims `value` and rejects it if nothing is left.
pub(crate) fn required_text(value: &str, field: &str) -> Result<String, CoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(CoreError::InvalidInput(format!("{field} cannot be empty")))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Trims optional text, mapping blank strings to `None`.
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn not_found(kind: &str, id: Uuid) -> CoreError {
    CoreError::NotFound(format!("{kind} with id {id}"))
}
