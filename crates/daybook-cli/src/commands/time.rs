use anyhow::Result;
use chrono::Duration;
use daybook_core::models::{NewActivityData, NewTimeLogEntry, TimeActivity, TimeLogEntry};
use daybook_core::repository::TimeLogRepository;
use owo_colors::OwoColorize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::app::App;
use crate::cli::{ActivityCommand, LogAddCommand, LogCommand, TimerCommand};
use crate::parser::{end_after, format_duration, parse_datetime, parse_duration};
use crate::util::{confirm, resolve_id, short_id};
use crate::views::table::{display_activities, display_time_log, display_timers};

fn resolve_activity(app: &App, short: &str) -> Result<Uuid> {
    resolve_id(&app.repo.activities(), short, "activity", |a: &TimeActivity| {
        a.name.clone()
    })
}

fn activity_names(app: &App) -> HashMap<Uuid, String> {
    app.repo
        .activities()
        .iter()
        .map(|a| (a.id, a.name.clone()))
        .collect()
}

fn activity_name(app: &App, id: Uuid) -> String {
    app.repo
        .activity(id)
        .map(|a| a.name)
        .unwrap_or_else(|| short_id(&id))
}

pub async fn run_activity(app: &App, command: ActivityCommand) -> Result<()> {
    match command {
        ActivityCommand::Add { name, icon, color } => {
            let activity = app
                .repo
                .add_activity(NewActivityData { name, icon, color })
                .await?;
            println!(
                "Added activity {} ({})",
                activity.name,
                short_id(&activity.id).yellow()
            );
        }
        ActivityCommand::List => {
            let mut rows: Vec<(TimeActivity, Duration)> = app
                .repo
                .activities()
                .iter()
                .map(|a| (a.clone(), app.repo.total_duration_for(a.id)))
                .collect();
            rows.sort_by_key(|(a, _)| a.name.to_lowercase());
            display_activities(&rows);
        }
        ActivityCommand::Delete(command) => {
            let id = resolve_activity(app, &command.id)?;
            let name = activity_name(app, id);
            if !confirm(format!("Delete activity '{name}'?"), command.force) {
                println!("Deletion cancelled.");
                return Ok(());
            }
            app.repo.delete_activity(id).await?;
            println!("Deleted activity {name}");
        }
    }
    Ok(())
}

pub async fn run_timer(app: &App, command: TimerCommand) -> Result<()> {
    let tracker = app.timers().await?;
    let now = app.now();

    match command {
        TimerCommand::Start(command) => {
            let id = resolve_activity(app, &command.id)?;
            let timer = tracker.start(id).await?;
            println!(
                "{} {} ({} so far)",
                "Tracking".green(),
                activity_name(app, id),
                format_duration(timer.elapsed(now))
            );
        }
        TimerCommand::Pause(command) => {
            let id = resolve_activity(app, &command.id)?;
            let timer = tracker.pause(id).await?;
            println!(
                "Paused {} at {}",
                activity_name(app, id),
                format_duration(timer.elapsed(now))
            );
        }
        TimerCommand::Resume(command) => {
            let id = resolve_activity(app, &command.id)?;
            tracker.resume(id).await?;
            println!("Resumed {}", activity_name(app, id));
        }
        TimerCommand::Stop { id, notes } => {
            let id = resolve_activity(app, &id)?;
            let entry = tracker.stop(id, notes).await?;
            println!(
                "Logged {} for {}",
                format_duration(entry.duration()).bold(),
                activity_name(app, id)
            );
        }
        TimerCommand::Discard(command) => {
            let id = resolve_activity(app, &command.id)?;
            let name = activity_name(app, id);
            if !confirm(format!("Discard the running timer for '{name}'?"), command.force) {
                println!("Discard cancelled.");
                return Ok(());
            }
            tracker.discard(id).await?;
            println!("Discarded timer for {name}");
        }
        TimerCommand::List => {
            display_timers(&tracker.active().await, &activity_names(app), now);
        }
    }
    Ok(())
}

pub async fn run_log(app: &App, command: LogCommand) -> Result<()> {
    match command {
        LogCommand::Add(command) => add_entry(app, command).await?,
        LogCommand::List { activity } => {
            let entries: Vec<TimeLogEntry> = match activity.as_deref() {
                Some(short) => app.repo.entries_for_activity(resolve_activity(app, short)?),
                None => {
                    let mut entries = app.repo.time_log_entries().to_vec();
                    entries.sort_by(|a, b| b.start_time.cmp(&a.start_time));
                    entries
                }
            };
            display_time_log(&entries, &activity_names(app));
        }
        LogCommand::Delete(command) => {
            let id = resolve_id(
                &app.repo.time_log_entries(),
                &command.id,
                "log entry",
                |e: &TimeLogEntry| format_duration(e.duration()),
            )?;
            if !confirm("Delete this log entry?".to_string(), command.force) {
                println!("Deletion cancelled.");
                return Ok(());
            }
            app.repo.delete_time_log_entry(id).await?;
            println!("Deleted log entry {}", short_id(&id));
        }
    }
    Ok(())
}

async fn add_entry(app: &App, command: LogAddCommand) -> Result<()> {
    let activity_id = resolve_activity(app, &command.activity)?;
    let start_time = parse_datetime(&command.start)?;
    let end_time = match (command.end.as_deref(), command.duration.as_deref()) {
        (Some(end), _) => parse_datetime(end)?,
        (None, Some(length)) => end_after(start_time, parse_duration(length)?)?,
        // clap requires one of the two
        (None, None) => start_time,
    };

    let entry = app
        .repo
        .add_time_log_entry(NewTimeLogEntry {
            activity_id,
            start_time,
            end_time,
            notes: command.notes,
            is_manual: true,
        })
        .await?;
    println!(
        "Logged {} for {}",
        format_duration(entry.duration()).bold(),
        activity_name(app, activity_id)
    );
    Ok(())
}
