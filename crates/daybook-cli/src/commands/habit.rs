use anyhow::Result;
use daybook_core::models::{Habit, NewHabitData};
use daybook_core::repository::HabitRepository;
use owo_colors::OwoColorize;

use crate::app::App;
use crate::cli::HabitCommand;
use crate::parser::parse_date;
use crate::util::{confirm, resolve_id, short_id};
use crate::views::table::{display_habits, HabitRow};

pub async fn run(app: &App, command: HabitCommand) -> Result<()> {
    match command {
        HabitCommand::Add {
            name,
            description,
            target,
        } => {
            let habit = app
                .repo
                .add_habit(NewHabitData {
                    name,
                    description,
                    target_count: target,
                })
                .await?;
            println!("Added habit {} ({})", habit.name, short_id(&habit.id).yellow());
        }
        HabitCommand::List => {
            let today = app.today();
            let mut rows = Vec::new();
            for habit in app.repo.habits().iter() {
                let done_today = app
                    .repo
                    .completions_for(habit.id)
                    .iter()
                    .find(|c| c.date == today)
                    .map(|c| c.count)
                    .unwrap_or(0);
                rows.push(HabitRow {
                    habit: habit.clone(),
                    today: done_today,
                    streak: app.repo.current_streak(habit.id, today)?,
                });
            }
            rows.sort_by_key(|r| r.habit.name.to_lowercase());
            display_habits(&rows);
        }
        HabitCommand::Log { id, count, date } => {
            let id = resolve_id(&app.repo.habits(), &id, "habit", |h: &Habit| h.name.clone())?;
            let date = match date.as_deref() {
                Some(d) => parse_date(d)?,
                None => app.today(),
            };
            let habit = app.repo.habit(id);
            let count = count.unwrap_or_else(|| habit.as_ref().map_or(1, |h| h.target_count));
            let name = habit.map(|h| h.name).unwrap_or_default();

            match app.repo.log_completion(id, date, count).await? {
                Some(completion) => println!("{name}: {} on {date}", completion.count),
                None => println!("{name}: cleared {date}"),
            }
        }
        HabitCommand::Delete(command) => {
            let id = resolve_id(&app.repo.habits(), &command.id, "habit", |h: &Habit| {
                h.name.clone()
            })?;
            let name = app.repo.habit(id).map(|h| h.name).unwrap_or_default();
            if !confirm(
                format!("Delete habit '{name}' and its history?"),
                command.force,
            ) {
                println!("Deletion cancelled.");
                return Ok(());
            }
            let removed = app.repo.delete_habit(id).await?;
            println!("Deleted habit {name} ({removed} completions)");
        }
    }
    Ok(())
}
