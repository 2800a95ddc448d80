use clap::{Args, Parser, Subcommand};
use daybook_core::features::Feature;
use daybook_core::models::TaskPriority;

/// Daybook: tasks, notes, habits, calendar and time tracking in one local database
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCommand),
    /// Manage notebooks
    #[command(subcommand)]
    Notebook(NotebookCommand),
    /// Manage notes
    #[command(subcommand)]
    Note(NoteCommand),
    /// Track habits
    #[command(subcommand)]
    Habit(HabitCommand),
    /// Manage calendar events
    #[command(subcommand)]
    Event(EventCommand),
    /// Manage time-tracking activities
    #[command(subcommand)]
    Activity(ActivityCommand),
    /// Run live timers for activities
    #[command(subcommand)]
    Timer(TimerCommand),
    /// Manage the time log
    #[command(subcommand)]
    Log(LogCommand),
    /// Show or override feature flags
    Features(FeaturesCommand),
    /// Copy tasks to or from the remote folder
    #[command(subcommand)]
    Sync(SyncCommand),
}

/// A record id or a unique prefix of it (at least 2 characters)
#[derive(Args, Debug, Clone)]
pub struct IdArg {
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    pub id: String,
    /// Delete without asking for confirmation
    #[arg(short, long)]
    pub force: bool,
}

// ============================================================================
// Tasks
// ============================================================================

#[derive(Subcommand, Debug, Clone)]
pub enum TaskCommand {
    /// Add a new task
    Add(TaskAddCommand),
    /// List tasks
    List(TaskListCommand),
    /// Edit a task
    Edit(TaskEditCommand),
    /// Toggle a task between done and not done
    Done(IdArg),
    /// Delete a task
    Delete(DeleteArgs),
    /// Make a task depend on another
    Depend(DependCommand),
    /// Remove a dependency
    Undepend(DependCommand),
    /// Add or toggle subtasks
    #[command(subcommand)]
    Subtask(SubtaskCommand),
}

#[derive(Args, Debug, Clone)]
pub struct TaskAddCommand {
    /// The text of the task
    pub text: String,
    /// The due date of the task
    #[arg(short, long)]
    pub due: Option<String>,
    /// Time of day the task is due
    #[arg(long)]
    pub at: Option<String>,
    /// The priority of the task (none, low, medium, high)
    #[arg(short, long)]
    pub priority: Option<TaskPriority>,
    /// A free-form label
    #[arg(short, long)]
    pub label: Option<String>,
    /// Longer notes
    #[arg(short, long)]
    pub notes: Option<String>,
    /// Subtasks to create along with the task
    #[arg(short, long = "subtask")]
    pub subtasks: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct TaskListCommand {
    /// Include completed tasks
    #[arg(short, long)]
    pub all: bool,
    /// Only tasks with this label
    #[arg(short, long)]
    pub label: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct TaskEditCommand {
    /// The ID of the task to edit
    pub id: String,

    #[arg(long)]
    pub text: Option<String>,

    #[arg(long)]
    pub due: Option<String>,
    #[arg(long, conflicts_with = "due")]
    pub due_clear: bool,

    #[arg(long)]
    pub at: Option<String>,
    #[arg(long, conflicts_with = "at")]
    pub at_clear: bool,

    #[arg(long)]
    pub priority: Option<TaskPriority>,

    #[arg(long)]
    pub label: Option<String>,
    #[arg(long, conflicts_with = "label")]
    pub label_clear: bool,

    #[arg(long)]
    pub notes: Option<String>,
    #[arg(long, conflicts_with = "notes")]
    pub notes_clear: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DependCommand {
    /// The task that waits
    pub id: String,
    /// The task it waits on
    pub on: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubtaskCommand {
    /// Add a subtask
    Add { task: String, text: String },
    /// Toggle a subtask by its position (starting at 1)
    Toggle { task: String, position: usize },
}

// ============================================================================
// Notes
// ============================================================================

#[derive(Subcommand, Debug, Clone)]
pub enum NotebookCommand {
    /// Create a notebook
    Add { name: String },
    /// List notebooks
    List,
    /// Rename a notebook
    Rename { id: String, name: String },
    /// Delete a notebook and every note in it
    Delete(DeleteArgs),
}

#[derive(Subcommand, Debug, Clone)]
pub enum NoteCommand {
    /// Add a note
    Add(NoteAddCommand),
    /// List notes
    List(NoteListCommand),
    /// Print a note
    Show(IdArg),
    /// Edit a note
    Edit(NoteEditCommand),
    /// Pin or unpin a note
    Pin(IdArg),
    /// Delete a note
    Delete(DeleteArgs),
}

#[derive(Args, Debug, Clone)]
pub struct NoteAddCommand {
    pub title: String,
    /// Note body
    #[arg(short, long, default_value = "")]
    pub content: String,
    /// Notebook ID or prefix
    #[arg(short, long)]
    pub notebook: Option<String>,
    #[arg(short, long)]
    pub pin: bool,
}

#[derive(Args, Debug, Clone)]
pub struct NoteListCommand {
    /// Only notes in this notebook
    #[arg(short, long, conflicts_with = "unfiled")]
    pub notebook: Option<String>,
    /// Only notes outside any notebook
    #[arg(short, long)]
    pub unfiled: bool,
}

#[derive(Args, Debug, Clone)]
pub struct NoteEditCommand {
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub content: Option<String>,
    /// Move the note to this notebook
    #[arg(long, conflicts_with = "unfile")]
    pub notebook: Option<String>,
    /// Take the note out of its notebook
    #[arg(long)]
    pub unfile: bool,
}

// ============================================================================
// Habits
// ============================================================================

#[derive(Subcommand, Debug, Clone)]
pub enum HabitCommand {
    /// Add a habit
    Add {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
        /// Completions per day that count as done
        #[arg(short, long)]
        target: Option<u32>,
    },
    /// List habits with today's progress
    List,
    /// Record today's (or another day's) completion count
    Log {
        id: String,
        /// Count for the day; 0 clears it
        #[arg(short, long)]
        count: Option<u32>,
        #[arg(short, long)]
        date: Option<String>,
    },
    /// Delete a habit and its history
    Delete(DeleteArgs),
}

// ============================================================================
// Calendar
// ============================================================================

#[derive(Subcommand, Debug, Clone)]
pub enum EventCommand {
    /// Add an event
    Add(EventAddCommand),
    /// List events in a date range
    List {
        /// First day (defaults to today)
        #[arg(long)]
        from: Option<String>,
        /// Number of days to show
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
    /// Delete an event
    Delete(DeleteArgs),
    /// Show reminders for events starting soon
    Reminders {
        /// Look-ahead window in minutes (defaults to the configured value)
        #[arg(long)]
        lead: Option<i64>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct EventAddCommand {
    pub title: String,
    /// Start, e.g. "2024-06-03 09:00" or "tomorrow 9am"
    #[arg(short, long)]
    pub start: String,
    /// End; defaults to one hour after the start
    #[arg(short, long, conflicts_with = "duration")]
    pub end: Option<String>,
    /// Length instead of an end, e.g. "30m"
    #[arg(long)]
    pub duration: Option<String>,
    #[arg(short, long)]
    pub location: Option<String>,
    /// RFC 5545 recurrence rule, stored as given
    #[arg(long)]
    pub recurrence: Option<String>,
}

// ============================================================================
// Time tracking
// ============================================================================

#[derive(Subcommand, Debug, Clone)]
pub enum ActivityCommand {
    /// Add an activity
    Add {
        name: String,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    /// List activities with their tracked totals
    List,
    /// Delete an activity that has no log entries
    Delete(DeleteArgs),
}

#[derive(Subcommand, Debug, Clone)]
pub enum TimerCommand {
    /// Start (or resume) the timer for an activity
    Start(IdArg),
    /// Pause a running timer
    Pause(IdArg),
    /// Resume a paused timer
    Resume(IdArg),
    /// Stop a timer and log the tracked time
    Stop {
        id: String,
        #[arg(short, long)]
        notes: Option<String>,
    },
    /// Throw a timer away without logging anything
    Discard(DeleteArgs),
    /// Show active timers
    List,
}

#[derive(Subcommand, Debug, Clone)]
pub enum LogCommand {
    /// Log time manually
    Add(LogAddCommand),
    /// List log entries
    List {
        /// Only entries for this activity
        #[arg(short, long)]
        activity: Option<String>,
    },
    /// Delete a log entry
    Delete(DeleteArgs),
}

#[derive(Args, Debug, Clone)]
pub struct LogAddCommand {
    /// Activity ID or prefix
    pub activity: String,
    /// When the span started
    #[arg(short, long)]
    pub start: String,
    /// When it ended
    #[arg(short, long, conflicts_with = "duration", required_unless_present = "duration")]
    pub end: Option<String>,
    /// Length instead of an end, e.g. "1h30m"
    #[arg(short, long)]
    pub duration: Option<String>,
    #[arg(short, long)]
    pub notes: Option<String>,
}

// ============================================================================
// Features
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct FeaturesCommand {
    #[command(subcommand)]
    pub action: Option<FeatureAction>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum FeatureAction {
    /// Turn a feature on for this machine
    Enable { feature: Feature },
    /// Turn a feature off for this machine
    Disable { feature: Feature },
    /// Drop all local overrides
    Reset,
}

// ============================================================================
// Sync
// ============================================================================

#[derive(Subcommand, Debug, Clone)]
pub enum SyncCommand {
    /// Replace local tasks with the remote copy
    Pull,
    /// Replace the remote copy with local tasks
    Push,
}
