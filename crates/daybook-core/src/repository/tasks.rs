use crate::error::CoreError;
use crate::models::{NewTaskData, Subtask, Task, TaskTimer, UpdateTaskData};
use crate::repository::{not_found, optional_text, required_text, SqliteRepository, TaskRepository};
use crate::store;
use async_trait::async_trait;
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Swaps the whole task collection on `conn`; returns how many were removed.
pub(crate) async fn replace_tasks_in(
    conn: &mut SqliteConnection,
    tasks: &[Task],
) -> Result<u64, CoreError> {
    let removed = store::delete_all_in::<Task>(&mut *conn).await?;
    for task in tasks {
        store::put_in(&mut *conn, task).await?;
    }
    Ok(removed)
}

impl SqliteRepository {
    async fn load_task(&self, id: Uuid) -> Result<Task, CoreError> {
        self.db()
            .get::<Task>(id)
            .await?
            .ok_or_else(|| not_found("Task", id))
    }

    async fn save_task(&self, task: Task) -> Result<Task, CoreError> {
        self.db().put(&task).await?;
        self.cache().refresh::<Task>(self.db()).await?;
        Ok(task)
    }
}

#[async_trait]
impl TaskRepository for SqliteRepository {
    async fn add_task(&self, data: NewTaskData) -> Result<Task, CoreError> {
        let text = required_text(&data.text, "Task text")?;
        let now = self.now();

        let subtasks = data
            .subtasks
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| Subtask {
                id: Uuid::new_v4(),
                text: s.to_string(),
                completed: false,
            })
            .collect();

        let task = Task {
            id: Uuid::new_v4(),
            text,
            due_date: data.due_date,
            time: data.time,
            priority: data.priority.unwrap_or_default(),
            label: optional_text(data.label),
            notes: optional_text(data.notes),
            completed: false,
            completed_at: None,
            subtasks,
            depends_on: Vec::new(),
            blocks_tasks: Vec::new(),
            timer: None,
            created_at: now,
            updated_at: now,
        };

        self.db().insert(&task).await?;
        self.cache().refresh::<Task>(self.db()).await?;
        debug!(task_id = %task.id, "task added");
        Ok(task)
    }

    async fn update_task(&self, id: Uuid, data: UpdateTaskData) -> Result<Task, CoreError> {
        let mut task = self.load_task(id).await?;

        if let Some(text) = data.text {
            task.text = required_text(&text, "Task text")?;
        }
        if let Some(due_date) = data.due_date {
            task.due_date = due_date;
        }
        if let Some(time) = data.time {
            task.time = time;
        }
        if let Some(priority) = data.priority {
            task.priority = priority;
        }
        if let Some(label) = data.label {
            task.label = optional_text(label);
        }
        if let Some(notes) = data.notes {
            task.notes = optional_text(notes);
        }
        task.updated_at = self.now();

        self.save_task(task).await
    }

    async fn delete_task(&self, id: Uuid) -> Result<(), CoreError> {
        let mut tx = self.db().pool().begin().await?;

        if store::delete_in::<Task>(&mut tx, id).await? == 0 {
            return Err(not_found("Task", id));
        }

        // Drop dangling dependency links on both sides.
        let now = self.now();
        for mut other in store::all_in::<Task>(&mut tx).await? {
            let before = other.depends_on.len() + other.blocks_tasks.len();
            other.depends_on.retain(|d| *d != id);
            other.blocks_tasks.retain(|b| *b != id);
            if other.depends_on.len() + other.blocks_tasks.len() != before {
                other.updated_at = now;
                store::put_in(&mut tx, &other).await?;
            }
        }

        tx.commit().await?;
        self.cache().refresh::<Task>(self.db()).await?;
        Ok(())
    }

    async fn toggle_task_completion(&self, id: Uuid) -> Result<Task, CoreError> {
        let mut task = self.load_task(id).await?;
        let now = self.now();

        task.completed = !task.completed;
        task.completed_at = task.completed.then_some(now);
        task.updated_at = now;

        self.save_task(task).await
    }

    async fn add_dependency(&self, task_id: Uuid, depends_on_id: Uuid) -> Result<Task, CoreError> {
        if task_id == depends_on_id {
            return Err(CoreError::InvalidInput(
                "A task cannot depend on itself.".to_string(),
            ));
        }

        let mut tx = self.db().pool().begin().await?;
        let mut task: Task = store::get_in(&mut tx, task_id)
            .await?
            .ok_or_else(|| not_found("Task", task_id))?;
        let mut prerequisite: Task = store::get_in(&mut tx, depends_on_id)
            .await?
            .ok_or_else(|| not_found("Task", depends_on_id))?;

        // One hop only: longer cycles (A -> B -> C -> A) are not detected.
        if prerequisite.depends_on.contains(&task_id) {
            return Err(CoreError::CircularDependency(task.text, prerequisite.text));
        }
        if task.depends_on.contains(&depends_on_id) {
            return Ok(task);
        }

        let now = self.now();
        task.depends_on.push(depends_on_id);
        task.updated_at = now;
        if !prerequisite.blocks_tasks.contains(&task_id) {
            prerequisite.blocks_tasks.push(task_id);
        }
        prerequisite.updated_at = now;

        store::put_in(&mut tx, &task).await?;
        store::put_in(&mut tx, &prerequisite).await?;
        tx.commit().await?;

        self.cache().refresh::<Task>(self.db()).await?;
        Ok(task)
    }

    async fn remove_dependency(&self, task_id: Uuid, depends_on_id: Uuid) -> Result<Task, CoreError> {
        let mut tx = self.db().pool().begin().await?;
        let mut task: Task = store::get_in(&mut tx, task_id)
            .await?
            .ok_or_else(|| not_found("Task", task_id))?;

        if !task.depends_on.contains(&depends_on_id) {
            return Ok(task);
        }

        let now = self.now();
        task.depends_on.retain(|d| *d != depends_on_id);
        task.updated_at = now;
        store::put_in(&mut tx, &task).await?;

        if let Some(mut prerequisite) = store::get_in::<Task>(&mut tx, depends_on_id).await? {
            prerequisite.blocks_tasks.retain(|b| *b != task_id);
            prerequisite.updated_at = now;
            store::put_in(&mut tx, &prerequisite).await?;
        }

        tx.commit().await?;
        self.cache().refresh::<Task>(self.db()).await?;
        Ok(task)
    }

    async fn add_subtask(&self, task_id: Uuid, text: String) -> Result<Task, CoreError> {
        let text = required_text(&text, "Subtask text")?;
        let mut task = self.load_task(task_id).await?;

        task.subtasks.push(Subtask {
            id: Uuid::new_v4(),
            text,
            completed: false,
        });
        task.updated_at = self.now();

        self.save_task(task).await
    }

    async fn toggle_subtask(&self, task_id: Uuid, subtask_id: Uuid) -> Result<Task, CoreError> {
        let mut task = self.load_task(task_id).await?;

        let subtask = task
            .subtasks
            .iter_mut()
            .find(|s| s.id == subtask_id)
            .ok_or_else(|| not_found("Subtask", subtask_id))?;
        subtask.completed = !subtask.completed;
        task.updated_at = self.now();

        self.save_task(task).await
    }

    async fn toggle_task_timer(&self, id: Uuid) -> Result<Task, CoreError> {
        let mut task = self.load_task(id).await?;
        let now = self.now();

        let timer = task.timer.get_or_insert_with(TaskTimer::default);
        if timer.is_running {
            if let Some(started) = timer.started_at.take() {
                timer.accumulated_ms += (now - started).num_milliseconds().max(0);
            }
            timer.is_running = false;
            timer.is_paused = true;
        } else {
            timer.is_running = true;
            timer.is_paused = false;
            timer.started_at = Some(now);
        }
        task.updated_at = now;

        self.save_task(task).await
    }

    async fn replace_tasks(&self, tasks: Vec<Task>) -> Result<(), CoreError> {
        let mut tx = self.db().pool().begin().await?;
        let removed = replace_tasks_in(&mut tx, &tasks).await?;
        tx.commit().await?;

        info!(removed, imported = tasks.len(), "task collection replaced");
        self.cache().refresh::<Task>(self.db()).await?;
        Ok(())
    }

    fn tasks(&self) -> Arc<Vec<Task>> {
        self.cache().get::<Task>()
    }

    fn task(&self, id: Uuid) -> Option<Task> {
        self.cache().find::<Task>(id)
    }

    fn find_tasks_by_short_id_prefix(&self, short_id: &str) -> Vec<Task> {
        self.cache().find_by_id_prefix::<Task>(short_id)
    }
}
