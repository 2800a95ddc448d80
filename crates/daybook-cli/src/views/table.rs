use crate::parser::format_duration;
use crate::util::short_id;
use chrono::{DateTime, Local, Utc};
use chrono_humanize::Humanize;
use comfy_table::{Attribute, Cell, Color, Row, Table};
use daybook_core::features::{Feature, FeatureFlags};
use daybook_core::models::{
    CalendarEvent, Habit, Note, Notebook, Task, TaskPriority, TimeActivity, TimeLogEntry,
};
use daybook_core::timer::ActiveTimer;
use std::collections::HashMap;
use uuid::Uuid;

fn local(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn none_or(value: Option<&str>) -> &str {
    value.unwrap_or("None")
}

pub fn display_tasks(tasks: &[Task], now: DateTime<Utc>) {
    if tasks.is_empty() {
        println!("No tasks found.");
        return;
    }

    let today = now.with_timezone(&Local).date_naive();
    let mut table = Table::new();
    table.set_header(vec!["ID", "Task", "Priority", "Due", "Label", "Subtasks", "Blocked by"]);

    for task in tasks {
        let mut row = Row::new();
        row.add_cell(Cell::new(short_id(&task.id)));

        let mut name_cell = Cell::new(&task.text);
        name_cell = if task.completed {
            name_cell
                .add_attribute(Attribute::CrossedOut)
                .fg(Color::DarkGrey)
        } else {
            match task.priority {
                TaskPriority::High => name_cell.fg(Color::Red).add_attribute(Attribute::Bold),
                TaskPriority::Medium => name_cell.fg(Color::Yellow),
                TaskPriority::Low => name_cell.fg(Color::Green),
                TaskPriority::None => name_cell,
            }
        };
        row.add_cell(name_cell);
        row.add_cell(Cell::new(task.priority.to_string()));

        let due_cell = match task.due_date {
            Some(due) => {
                let mut text = due.format("%Y-%m-%d").to_string();
                if let Some(time) = task.time {
                    text.push_str(&time.format(" %H:%M").to_string());
                }
                let cell = Cell::new(text);
                if task.completed {
                    cell
                } else if due < today {
                    cell.fg(Color::Red) // Overdue
                } else if due == today {
                    cell.fg(Color::Yellow) // Due today
                } else {
                    cell
                }
            }
            None => Cell::new("None"),
        };
        row.add_cell(due_cell);

        row.add_cell(Cell::new(none_or(task.label.as_deref())));
        let done = task.subtasks.iter().filter(|s| s.completed).count();
        row.add_cell(Cell::new(if task.subtasks.is_empty() {
            "-".to_string()
        } else {
            format!("{done}/{}", task.subtasks.len())
        }));
        row.add_cell(Cell::new(if task.depends_on.is_empty() {
            "-".to_string()
        } else {
            task.depends_on.iter().map(short_id).collect::<Vec<_>>().join(", ")
        }));
        table.add_row(row);
    }

    println!("{table}");
}

pub fn display_notebooks(notebooks: &[Notebook], note_counts: &HashMap<Uuid, usize>) {
    if notebooks.is_empty() {
        println!("No notebooks found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Notes", "Created"]);
    for notebook in notebooks {
        let mut row = Row::new();
        row.add_cell(Cell::new(short_id(&notebook.id)));
        row.add_cell(Cell::new(&notebook.name));
        row.add_cell(Cell::new(note_counts.get(&notebook.id).copied().unwrap_or(0)));
        row.add_cell(Cell::new(notebook.created_at.humanize()));
        table.add_row(row);
    }
    println!("{table}");
}

pub fn display_notes(notes: &[Note], notebook_names: &HashMap<Uuid, String>) {
    if notes.is_empty() {
        println!("No notes found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Title", "Notebook", "Updated"]);
    for note in notes {
        let mut row = Row::new();
        row.add_cell(Cell::new(short_id(&note.id)));
        let mut title = Cell::new(&note.title);
        if note.pinned {
            title = Cell::new(format!("📌 {}", note.title)).add_attribute(Attribute::Bold);
        }
        row.add_cell(title);
        row.add_cell(Cell::new(
            note.notebook_id
                .and_then(|id| notebook_names.get(&id).cloned())
                .unwrap_or_else(|| "Unfiled".to_string()),
        ));
        row.add_cell(Cell::new(note.updated_at.humanize()));
        table.add_row(row);
    }
    println!("{table}");
}

pub struct HabitRow {
    pub habit: Habit,
    pub today: u32,
    pub streak: u32,
}

pub fn display_habits(rows: &[HabitRow]) {
    if rows.is_empty() {
        println!("No habits found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Habit", "Today", "Streak"]);
    for entry in rows {
        let mut row = Row::new();
        row.add_cell(Cell::new(short_id(&entry.habit.id)));
        row.add_cell(Cell::new(&entry.habit.name));
        let progress = format!("{}/{}", entry.today, entry.habit.target_count);
        row.add_cell(if entry.today >= entry.habit.target_count {
            Cell::new(progress).fg(Color::Green)
        } else {
            Cell::new(progress)
        });
        row.add_cell(Cell::new(format!("{} days", entry.streak)));
        table.add_row(row);
    }
    println!("{table}");
}

pub fn display_events(events: &[CalendarEvent]) {
    if events.is_empty() {
        println!("No events found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Title", "Start", "End", "Location", "Repeats"]);
    for event in events {
        let mut row = Row::new();
        row.add_cell(Cell::new(short_id(&event.id)));
        row.add_cell(Cell::new(&event.title));
        row.add_cell(Cell::new(local(event.start_time)));
        row.add_cell(Cell::new(local(event.end_time)));
        row.add_cell(Cell::new(none_or(event.location.as_deref())));
        row.add_cell(Cell::new(if event.recurrence.is_some() { "↻" } else { "" }));
        table.add_row(row);
    }
    println!("{table}");
}

pub fn display_activities(activities: &[(TimeActivity, chrono::Duration)]) {
    if activities.is_empty() {
        println!("No activities found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Activity", "Total tracked"]);
    for (activity, total) in activities {
        let mut row = Row::new();
        row.add_cell(Cell::new(short_id(&activity.id)));
        let name = match &activity.icon {
            Some(icon) => format!("{icon} {}", activity.name),
            None => activity.name.clone(),
        };
        row.add_cell(Cell::new(name));
        row.add_cell(Cell::new(format_duration(*total)));
        table.add_row(row);
    }
    println!("{table}");
}

pub fn display_timers(timers: &[ActiveTimer], names: &HashMap<Uuid, String>, now: DateTime<Utc>) {
    if timers.is_empty() {
        println!("No active timers.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["Activity", "State", "Elapsed", "Started"]);
    for timer in timers {
        let mut row = Row::new();
        row.add_cell(Cell::new(
            names
                .get(&timer.activity_id)
                .cloned()
                .unwrap_or_else(|| short_id(&timer.activity_id)),
        ));
        row.add_cell(if timer.is_paused {
            Cell::new("paused").fg(Color::Yellow)
        } else {
            Cell::new("running").fg(Color::Green)
        });
        row.add_cell(Cell::new(format_duration(timer.elapsed(now))));
        row.add_cell(Cell::new(local(timer.start_time)));
        table.add_row(row);
    }
    println!("{table}");
}

pub fn display_time_log(entries: &[TimeLogEntry], names: &HashMap<Uuid, String>) {
    if entries.is_empty() {
        println!("No time log entries found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Activity", "Start", "Duration", "Notes", "Source"]);
    for entry in entries {
        let mut row = Row::new();
        row.add_cell(Cell::new(short_id(&entry.id)));
        row.add_cell(Cell::new(
            names
                .get(&entry.activity_id)
                .cloned()
                .unwrap_or_else(|| short_id(&entry.activity_id)),
        ));
        row.add_cell(Cell::new(local(entry.start_time)));
        row.add_cell(Cell::new(format_duration(entry.duration())));
        row.add_cell(Cell::new(entry.notes.as_deref().unwrap_or("")));
        row.add_cell(Cell::new(if entry.is_manual { "manual" } else { "timer" }));
        table.add_row(row);
    }
    println!("{table}");
}

pub fn display_features(flags: &FeatureFlags) {
    let mut table = Table::new();
    table.set_header(vec!["Feature", "Enabled"]);
    for feature in Feature::ALL {
        let mut row = Row::new();
        row.add_cell(Cell::new(feature.as_str()));
        row.add_cell(if flags.is_enabled(feature) {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("no").fg(Color::DarkGrey)
        });
        table.add_row(row);
    }
    println!("{table}");
}
