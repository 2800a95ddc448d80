use anyhow::{anyhow, Result};
use chrono::{Duration, Local, TimeZone, Utc};
use daybook_core::error::CoreError;
use daybook_core::models::{CalendarEvent, NewEventData};
use daybook_core::repository::CalendarRepository;
use owo_colors::OwoColorize;

use crate::app::App;
use crate::cli::{EventAddCommand, EventCommand};
use crate::parser::{end_after, parse_date, parse_datetime, parse_duration};
use crate::util::{confirm, resolve_id, short_id};
use crate::views::table::display_events;

pub async fn run(app: &App, command: EventCommand) -> Result<()> {
    match command {
        EventCommand::Add(command) => add_event(app, command).await,
        EventCommand::List { from, days } => {
            let first = match from.as_deref() {
                Some(d) => parse_date(d)?,
                None => app.now().with_timezone(&Local).date_naive(),
            };
            let start = first
                .and_hms_opt(0, 0, 0)
                .and_then(|naive| Local.from_local_datetime(&naive).earliest())
                .map(|local| local.with_timezone(&Utc))
                .ok_or_else(|| anyhow!(CoreError::InvalidInput(format!("No midnight on {first}"))))?;
            let span = Duration::try_days(days.max(1)).ok_or_else(|| {
                anyhow!(CoreError::InvalidInput(format!("Too many days: {days}")))
            })?;
            let end = end_after(start, span)?;
            display_events(&app.repo.events_between(start, end));
            Ok(())
        }
        EventCommand::Delete(command) => {
            let id = resolve_id(&app.repo.events(), &command.id, "event", |e: &CalendarEvent| {
                e.title.clone()
            })?;
            let title = app.repo.event(id).map(|e| e.title).unwrap_or_default();
            if !confirm(format!("Delete event '{title}'?"), command.force) {
                println!("Deletion cancelled.");
                return Ok(());
            }
            app.repo.delete_event(id).await?;
            println!("Deleted event {title}");
            Ok(())
        }
        EventCommand::Reminders { lead } => reminders(app, lead).await,
    }
}

async fn add_event(app: &App, command: EventAddCommand) -> Result<()> {
    let start_time = parse_datetime(&command.start)?;
    let end_time = match (command.end.as_deref(), command.duration.as_deref()) {
        (Some(end), _) => parse_datetime(end)?,
        (None, Some(length)) => end_after(start_time, parse_duration(length)?)?,
        (None, None) => start_time + Duration::hours(1),
    };

    let event = app
        .repo
        .add_event(NewEventData {
            title: command.title,
            start_time,
            end_time,
            location: command.location,
            recurrence: command.recurrence,
            color: None,
        })
        .await?;
    println!("Added event {} ({})", event.title, short_id(&event.id).yellow());
    Ok(())
}

/// Prints each due reminder once, then records it so later runs stay quiet.
async fn reminders(app: &App, lead: Option<i64>) -> Result<()> {
    let now = app.now();
    let lead = Duration::minutes(lead.unwrap_or(app.config.reminder_lead_minutes));
    let ledger = app.reminders().await?;
    ledger.prune(now - Duration::days(7)).await?;

    let due = ledger.due_reminders(&app.repo.events(), now, lead).await;
    if due.is_empty() {
        println!("No upcoming reminders.");
        return Ok(());
    }
    for event in &due {
        let minutes = (event.start_time - now).num_minutes();
        println!("{} {} in {minutes} min", "⏰".yellow(), event.title.bold());
        ledger.mark_fired(event, now).await?;
    }
    Ok(())
}
