use anyhow::{anyhow, Result};
use daybook_core::error::CoreError;
use daybook_core::models::{NewTaskData, UpdateTaskData};
use daybook_core::repository::TaskRepository;
use owo_colors::OwoColorize;

use crate::app::App;
use crate::cli::{
    DeleteArgs, DependCommand, SubtaskCommand, TaskAddCommand, TaskCommand, TaskEditCommand,
    TaskListCommand,
};
use crate::parser::{parse_date, parse_time};
use crate::util::{confirm, resolve_task_id, short_id};
use crate::views::table::display_tasks;

pub async fn run(app: &App, command: TaskCommand) -> Result<()> {
    match command {
        TaskCommand::Add(command) => add_task(app, command).await,
        TaskCommand::List(command) => list_tasks(app, command),
        TaskCommand::Edit(command) => edit_task(app, command).await,
        TaskCommand::Done(command) => {
            let id = resolve_task_id(app.repo.as_ref(), &command.id)?;
            let task = app.repo.toggle_task_completion(id).await?;
            if task.completed {
                println!("{} {}", "Completed task:".green(), task.text);
            } else {
                println!("Reopened task: {}", task.text);
            }
            Ok(())
        }
        TaskCommand::Delete(command) => delete_task(app, command).await,
        TaskCommand::Depend(command) => depend(app, command, true).await,
        TaskCommand::Undepend(command) => depend(app, command, false).await,
        TaskCommand::Subtask(command) => subtask(app, command).await,
    }
}

async fn add_task(app: &App, command: TaskAddCommand) -> Result<()> {
    let due_date = command.due.as_deref().map(parse_date).transpose()?;
    let time = command.at.as_deref().map(parse_time).transpose()?;

    let task = app
        .repo
        .add_task(NewTaskData {
            text: command.text,
            due_date,
            time,
            priority: command.priority,
            label: command.label,
            notes: command.notes,
            subtasks: command.subtasks,
        })
        .await?;

    println!("Added task {} ({})", task.text, short_id(&task.id).yellow());
    Ok(())
}

fn list_tasks(app: &App, command: TaskListCommand) -> Result<()> {
    let mut tasks: Vec<_> = app
        .repo
        .tasks()
        .iter()
        .filter(|t| command.all || !t.completed)
        .filter(|t| match &command.label {
            Some(label) => t.label.as_deref().is_some_and(|l| l.eq_ignore_ascii_case(label)),
            None => true,
        })
        .cloned()
        .collect();

    tasks.sort_by(|a, b| {
        a.completed
            .cmp(&b.completed)
            .then(b.priority.cmp(&a.priority))
            .then(match (a.due_date, b.due_date) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
            .then(a.created_at.cmp(&b.created_at))
    });

    display_tasks(&tasks, app.now());
    Ok(())
}

async fn edit_task(app: &App, command: TaskEditCommand) -> Result<()> {
    let id = resolve_task_id(app.repo.as_ref(), &command.id)?;

    let due_date = if command.due_clear {
        Some(None)
    } else {
        command.due.as_deref().map(parse_date).transpose()?.map(Some)
    };
    let time = if command.at_clear {
        Some(None)
    } else {
        command.at.as_deref().map(parse_time).transpose()?.map(Some)
    };
    let label = if command.label_clear {
        Some(None)
    } else {
        command.label.map(Some)
    };
    let notes = if command.notes_clear {
        Some(None)
    } else {
        command.notes.map(Some)
    };

    let update = UpdateTaskData {
        text: command.text,
        due_date,
        time,
        priority: command.priority,
        label,
        notes,
    };
    let task = app.repo.update_task(id, update).await?;
    println!("Updated task {}", task.text);
    Ok(())
}

async fn delete_task(app: &App, command: DeleteArgs) -> Result<()> {
    let id = resolve_task_id(app.repo.as_ref(), &command.id)?;
    let task = app
        .repo
        .task(id)
        .ok_or_else(|| anyhow!(CoreError::NotFound(format!("Task with ID '{id}'"))))?;

    if !confirm(
        format!("Are you sure you want to delete task '{}'?", task.text),
        command.force,
    ) {
        println!("Deletion cancelled.");
        return Ok(());
    }

    app.repo.delete_task(id).await?;
    println!("Deleted task {}", task.text);
    Ok(())
}

async fn depend(app: &App, command: DependCommand, add: bool) -> Result<()> {
    let id = resolve_task_id(app.repo.as_ref(), &command.id)?;
    let on = resolve_task_id(app.repo.as_ref(), &command.on)?;
    let on_text = app.repo.task(on).map(|t| t.text).unwrap_or_default();

    let task = if add {
        app.repo.add_dependency(id, on).await?
    } else {
        app.repo.remove_dependency(id, on).await?
    };

    if add {
        println!("'{}' now waits on '{}'", task.text, on_text);
    } else {
        println!("'{}' no longer waits on '{}'", task.text, on_text);
    }
    Ok(())
}

async fn subtask(app: &App, command: SubtaskCommand) -> Result<()> {
    match command {
        SubtaskCommand::Add { task, text } => {
            let id = resolve_task_id(app.repo.as_ref(), &task)?;
            let task = app.repo.add_subtask(id, text).await?;
            println!("'{}' has {} subtasks", task.text, task.subtasks.len());
        }
        SubtaskCommand::Toggle { task, position } => {
            let id = resolve_task_id(app.repo.as_ref(), &task)?;
            let current = app
                .repo
                .task(id)
                .ok_or_else(|| anyhow!(CoreError::NotFound(format!("Task with ID '{id}'"))))?;
            let subtask = position
                .checked_sub(1)
                .and_then(|i| current.subtasks.get(i))
                .ok_or_else(|| {
                    anyhow!(CoreError::InvalidInput(format!(
                        "Task '{}' has no subtask #{position}",
                        current.text
                    )))
                })?;
            let task = app.repo.toggle_subtask(id, subtask.id).await?;
            let done = task.subtasks.iter().filter(|s| s.completed).count();
            println!("{done}/{} subtasks done", task.subtasks.len());
        }
    }
    Ok(())
}
