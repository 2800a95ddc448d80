use crate::schema::collections;
use crate::store::Entity;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Tasks
// ============================================================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    #[default]
    None,
    Low,
    Medium,
    High,
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid task priority: {0}")]
pub struct ParseTaskPriorityError(String);

impl FromStr for TaskPriority {
    type Err = ParseTaskPriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(TaskPriority::None),
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            _ => Err(ParseTaskPriorityError(s.to_string())),
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPriority::None => write!(f, "none"),
            TaskPriority::Low => write!(f, "low"),
            TaskPriority::Medium => write!(f, "medium"),
            TaskPriority::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: Uuid,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

/// Per-task stopwatch embedded in the task record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskTimer {
    /// Milliseconds accumulated by completed runs.
    pub accumulated_ms: i64,
    pub is_running: bool,
    pub is_paused: bool,
    pub started_at: Option<DateTime<Utc>>,
}

impl TaskTimer {
    /// Accumulated time plus the in-flight run, if any.
    pub fn total(&self, now: DateTime<Utc>) -> Duration {
        let running = match (self.is_running, self.started_at) {
            (true, Some(started)) => (now - started).max(Duration::zero()),
            _ => Duration::zero(),
        };
        Duration::milliseconds(self.accumulated_ms) + running
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub text: String,
    pub due_date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    #[serde(default)]
    pub priority: TaskPriority,
    pub label: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    /// Tasks that must be finished before this one.
    #[serde(default)]
    pub depends_on: Vec<Uuid>,
    /// Tasks waiting on this one; the mirror of `depends_on`.
    #[serde(default)]
    pub blocks_tasks: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer: Option<TaskTimer>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Task {
    const COLLECTION: &'static str = collections::TASKS;

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewTaskData {
    pub text: String,
    pub due_date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub priority: Option<TaskPriority>,
    pub label: Option<String>,
    pub notes: Option<String>,
    pub subtasks: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTaskData {
    pub text: Option<String>,
    pub due_date: Option<Option<NaiveDate>>,
    pub time: Option<Option<NaiveTime>>,
    pub priority: Option<TaskPriority>,
    pub label: Option<Option<String>>,
    pub notes: Option<Option<String>>,
}

// ============================================================================
// Habits
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Completions per day needed for the day to count.
    pub target_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Habit {
    const COLLECTION: &'static str = collections::HABITS;

    fn id(&self) -> Uuid {
        self.id
    }
}

/// Unique per `(habit_id, date)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HabitCompletion {
    pub id: Uuid,
    pub habit_id: Uuid,
    pub date: NaiveDate,
    pub count: u32,
    pub updated_at: DateTime<Utc>,
}

impl Entity for HabitCompletion {
    const COLLECTION: &'static str = collections::HABIT_COMPLETIONS;

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewHabitData {
    pub name: String,
    pub description: Option<String>,
    pub target_count: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateHabitData {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub target_count: Option<u32>,
}

// ============================================================================
// Notes
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notebook {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Records written before renames were stamped read back as the epoch.
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

impl Entity for Notebook {
    const COLLECTION: &'static str = collections::NOTEBOOKS;

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: Uuid,
    pub title: String,
    /// Rich text, stored as the editor produced it.
    pub content: String,
    pub notebook_id: Option<Uuid>,
    #[serde(default)]
    pub pinned: bool,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Note {
    const COLLECTION: &'static str = collections::NOTES;

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewNoteData {
    pub title: String,
    pub content: String,
    pub notebook_id: Option<Uuid>,
    pub pinned: bool,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateNoteData {
    pub title: Option<String>,
    pub content: Option<String>,
    pub color: Option<Option<String>>,
}

// ============================================================================
// Calendar
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: Uuid,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location: Option<String>,
    /// RFC 5545 RRULE text, kept verbatim.
    pub recurrence: Option<String>,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for CalendarEvent {
    const COLLECTION: &'static str = collections::CALENDAR_EVENTS;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl CalendarEvent {
    pub fn overlaps(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        self.start_time < to && self.end_time >= from
    }
}

#[derive(Debug, Clone)]
pub struct NewEventData {
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location: Option<String>,
    pub recurrence: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateEventData {
    pub title: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub location: Option<Option<String>>,
    pub recurrence: Option<Option<String>>,
    pub color: Option<Option<String>>,
}

// ============================================================================
// Time tracking
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimeActivity {
    pub id: Uuid,
    pub name: String,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

impl Entity for TimeActivity {
    const COLLECTION: &'static str = collections::TIME_ACTIVITIES;

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewActivityData {
    pub name: String,
    pub icon: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateActivityData {
    pub name: Option<String>,
    pub icon: Option<Option<String>>,
    pub color: Option<Option<String>>,
}

/// A finished span of tracked time. Stored with compacted keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeLogEntry {
    pub id: Uuid,
    #[serde(rename = "a")]
    pub activity_id: Uuid,
    #[serde(rename = "s")]
    pub start_time: DateTime<Utc>,
    #[serde(rename = "e")]
    pub end_time: DateTime<Utc>,
    /// Always `end_time - start_time`.
    #[serde(rename = "d")]
    pub duration_ms: i64,
    #[serde(rename = "n", default)]
    pub notes: Option<String>,
    #[serde(rename = "m", default)]
    pub is_manual: bool,
    #[serde(rename = "u", default)]
    pub updated_at: DateTime<Utc>,
}

impl Entity for TimeLogEntry {
    const COLLECTION: &'static str = collections::TIME_LOG_ENTRIES;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl TimeLogEntry {
    pub fn duration(&self) -> Duration {
        Duration::milliseconds(self.duration_ms)
    }

    pub(crate) fn recompute_duration(&mut self) {
        self.duration_ms = (self.end_time - self.start_time).num_milliseconds();
    }
}

#[derive(Debug, Clone)]
pub struct NewTimeLogEntry {
    pub activity_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub notes: Option<String>,
    pub is_manual: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTimeLogEntry {
    pub activity_id: Option<Uuid>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub notes: Option<Option<String>>,
}
