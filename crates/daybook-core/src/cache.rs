//! In-memory snapshot of every collection plus change notification.
//!
//! The cache is the only read path for callers. It is written only by
//! `refresh`, which re-reads a whole collection from [`LocalDb`] and publishes
//! the new snapshot. Two overlapping write sequences on the same collection
//! can finish their refreshes in either order; the last refresh wins.

use crate::error::CoreResult;
use crate::models::{
    CalendarEvent, Habit, HabitCompletion, Note, Notebook, Task, TimeActivity, TimeLogEntry,
};
use crate::store::{Entity, LocalDb};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const CHANNEL_CAPACITY: usize = 64;

/// A fresh snapshot of one collection, published after every refresh.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Tasks(Arc<Vec<Task>>),
    Habits(Arc<Vec<Habit>>),
    HabitCompletions(Arc<Vec<HabitCompletion>>),
    Notebooks(Arc<Vec<Notebook>>),
    Notes(Arc<Vec<Note>>),
    CalendarEvents(Arc<Vec<CalendarEvent>>),
    TimeActivities(Arc<Vec<TimeActivity>>),
    TimeLogEntries(Arc<Vec<TimeLogEntry>>),
}

impl ChangeEvent {
    /// Name of the collection this event carries.
    pub fn collection(&self) -> &'static str {
        match self {
            ChangeEvent::Tasks(_) => Task::COLLECTION,
            ChangeEvent::Habits(_) => Habit::COLLECTION,
            ChangeEvent::HabitCompletions(_) => HabitCompletion::COLLECTION,
            ChangeEvent::Notebooks(_) => Notebook::COLLECTION,
            ChangeEvent::Notes(_) => Note::COLLECTION,
            ChangeEvent::CalendarEvents(_) => CalendarEvent::COLLECTION,
            ChangeEvent::TimeActivities(_) => TimeActivity::COLLECTION,
            ChangeEvent::TimeLogEntries(_) => TimeLogEntry::COLLECTION,
        }
    }
}

#[derive(Default)]
pub struct Snapshot {
    tasks: Arc<Vec<Task>>,
    habits: Arc<Vec<Habit>>,
    habit_completions: Arc<Vec<HabitCompletion>>,
    notebooks: Arc<Vec<Notebook>>,
    notes: Arc<Vec<Note>>,
    calendar_events: Arc<Vec<CalendarEvent>>,
    time_activities: Arc<Vec<TimeActivity>>,
    time_log_entries: Arc<Vec<TimeLogEntry>>,
}

/// An entity type that has a slot in the [`Snapshot`].
pub trait Cached: Entity {
    fn slot(snapshot: &Snapshot) -> &Arc<Vec<Self>>;
    fn slot_mut(snapshot: &mut Snapshot) -> &mut Arc<Vec<Self>>;
    fn event(records: Arc<Vec<Self>>) -> ChangeEvent;
}

macro_rules! cached {
    ($ty:ty, $field:ident, $variant:ident) => {
        impl Cached for $ty {
            fn slot(snapshot: &Snapshot) -> &Arc<Vec<Self>> {
                &snapshot.$field
            }

            fn slot_mut(snapshot: &mut Snapshot) -> &mut Arc<Vec<Self>> {
                &mut snapshot.$field
            }

            fn event(records: Arc<Vec<Self>>) -> ChangeEvent {
                ChangeEvent::$variant(records)
            }
        }
    };
}

cached!(Task, tasks, Tasks);
cached!(Habit, habits, Habits);
cached!(HabitCompletion, habit_completions, HabitCompletions);
cached!(Notebook, notebooks, Notebooks);
cached!(Note, notes, Notes);
cached!(CalendarEvent, calendar_events, CalendarEvents);
cached!(TimeActivity, time_activities, TimeActivities);
cached!(TimeLogEntry, time_log_entries, TimeLogEntries);

pub struct Cache {
    snapshot: RwLock<Snapshot>,
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            snapshot: RwLock::new(Snapshot::default()),
            tx,
        }
    }

    /// Current snapshot of `T`'s collection.
    pub fn get<T: Cached>(&self) -> Arc<Vec<T>> {
        let snapshot = self.snapshot.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(T::slot(&snapshot))
    }

    pub fn find<T: Cached>(&self, id: uuid::Uuid) -> Option<T> {
        self.get::<T>().iter().find(|r| r.id() == id).cloned()
    }

    /// Records whose id, as text, starts with `prefix` (case-insensitive).
    pub fn find_by_id_prefix<T: Cached>(&self, prefix: &str) -> Vec<T> {
        let prefix = prefix.to_lowercase();
        self.get::<T>()
            .iter()
            .filter(|r| r.id().to_string().starts_with(&prefix))
            .cloned()
            .collect()
    }

    /// Re-reads `T`'s collection in full, swaps it in and publishes it.
    pub async fn refresh<T: Cached>(&self, db: &LocalDb) -> CoreResult<Arc<Vec<T>>> {
        let records = Arc::new(db.all::<T>().await?);
        self.replace(Arc::clone(&records));
        Ok(records)
    }

    fn replace<T: Cached>(&self, records: Arc<Vec<T>>) {
        {
            let mut snapshot = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
            *T::slot_mut(&mut snapshot) = Arc::clone(&records);
        }
        debug!(collection = T::COLLECTION, len = records.len(), "cache refreshed");
        self.publish(T::event(records));
    }

    /// Loads every collection; used once at startup.
    pub async fn hydrate(&self, db: &LocalDb) -> CoreResult<()> {
        self.refresh::<Task>(db).await?;
        self.refresh::<Habit>(db).await?;
        self.refresh::<HabitCompletion>(db).await?;
        self.refresh::<Notebook>(db).await?;
        self.refresh::<Note>(db).await?;
        self.refresh::<CalendarEvent>(db).await?;
        self.refresh::<TimeActivity>(db).await?;
        self.refresh::<TimeLogEntry>(db).await?;
        Ok(())
    }

    fn publish(&self, event: ChangeEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!("change event dropped (no subscribers): {}", e.0.collection());
        }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A stream of [`ChangeEvent`]s that ends when cancelled.
pub struct Subscription {
    rx: broadcast::Receiver<ChangeEvent>,
    cancel: CancellationToken,
}

impl Subscription {
    /// Next event, or `None` once the subscription is cancelled or the cache
    /// is gone. A subscriber that falls behind skips the events it missed.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                received = self.rx.recv() => match received {
                    Ok(event) => return Some(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "change subscriber lagged");
                    }
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    }

    /// A token that cancels this subscription from elsewhere.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}
