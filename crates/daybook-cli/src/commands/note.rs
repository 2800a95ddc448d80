use anyhow::{anyhow, Result};
use daybook_core::error::CoreError;
use daybook_core::models::{NewNoteData, Note, Notebook, UpdateNoteData};
use daybook_core::repository::NoteRepository;
use owo_colors::OwoColorize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::app::App;
use crate::cli::{DeleteArgs, NoteAddCommand, NoteCommand, NoteEditCommand, NoteListCommand, NotebookCommand};
use crate::util::{confirm, resolve_id, short_id};
use crate::views::table::{display_notebooks, display_notes};

fn resolve_notebook(app: &App, short: &str) -> Result<Uuid> {
    resolve_id(&app.repo.notebooks(), short, "notebook", |n: &Notebook| n.name.clone())
}

fn resolve_note(app: &App, short: &str) -> Result<Note> {
    let id = resolve_id(&app.repo.notes(), short, "note", |n: &Note| n.title.clone())?;
    app.repo
        .note(id)
        .ok_or_else(|| anyhow!(CoreError::NotFound(format!("Note with ID '{id}'"))))
}

fn notebook_names(app: &App) -> HashMap<Uuid, String> {
    app.repo
        .notebooks()
        .iter()
        .map(|n| (n.id, n.name.clone()))
        .collect()
}

pub async fn run_notebook(app: &App, command: NotebookCommand) -> Result<()> {
    match command {
        NotebookCommand::Add { name } => {
            let notebook = app.repo.add_notebook(name).await?;
            println!("Created notebook {} ({})", notebook.name, short_id(&notebook.id).yellow());
        }
        NotebookCommand::List => {
            let mut counts: HashMap<Uuid, usize> = HashMap::new();
            for note in app.repo.notes().iter() {
                if let Some(id) = note.notebook_id {
                    *counts.entry(id).or_default() += 1;
                }
            }
            let mut notebooks = app.repo.notebooks().to_vec();
            notebooks.sort_by_key(|n| n.name.to_lowercase());
            display_notebooks(&notebooks, &counts);
        }
        NotebookCommand::Rename { id, name } => {
            let id = resolve_notebook(app, &id)?;
            let notebook = app.repo.rename_notebook(id, name).await?;
            println!("Renamed notebook to {}", notebook.name);
        }
        NotebookCommand::Delete(command) => delete_notebook(app, command).await?,
    }
    Ok(())
}

async fn delete_notebook(app: &App, command: DeleteArgs) -> Result<()> {
    let id = resolve_notebook(app, &command.id)?;
    let name = app.repo.notebook(id).map(|n| n.name).unwrap_or_default();
    if !confirm(
        format!("Delete notebook '{name}' and every note in it?"),
        command.force,
    ) {
        println!("Deletion cancelled.");
        return Ok(());
    }
    let removed = app.repo.delete_notebook(id).await?;
    println!("Deleted notebook {name} ({removed} notes)");
    Ok(())
}

pub async fn run_note(app: &App, command: NoteCommand) -> Result<()> {
    match command {
        NoteCommand::Add(command) => add_note(app, command).await,
        NoteCommand::List(command) => list_notes(app, command),
        NoteCommand::Show(command) => {
            let note = resolve_note(app, &command.id)?;
            println!("{}", note.title.bold());
            if !note.content.is_empty() {
                println!();
                println!("{}", note.content);
            }
            Ok(())
        }
        NoteCommand::Edit(command) => edit_note(app, command).await,
        NoteCommand::Pin(command) => {
            let note = resolve_note(app, &command.id)?;
            let note = app.repo.toggle_note_pin(note.id).await?;
            if note.pinned {
                println!("Pinned {}", note.title);
            } else {
                println!("Unpinned {}", note.title);
            }
            Ok(())
        }
        NoteCommand::Delete(command) => {
            let note = resolve_note(app, &command.id)?;
            if !confirm(format!("Delete note '{}'?", note.title), command.force) {
                println!("Deletion cancelled.");
                return Ok(());
            }
            app.repo.delete_note(note.id).await?;
            println!("Deleted note {}", note.title);
            Ok(())
        }
    }
}

async fn add_note(app: &App, command: NoteAddCommand) -> Result<()> {
    let notebook_id = command
        .notebook
        .as_deref()
        .map(|n| resolve_notebook(app, n))
        .transpose()?;
    let note = app
        .repo
        .add_note(NewNoteData {
            title: command.title,
            content: command.content,
            notebook_id,
            pinned: command.pin,
            color: None,
        })
        .await?;
    println!("Added note {} ({})", note.title, short_id(&note.id).yellow());
    Ok(())
}

fn list_notes(app: &App, command: NoteListCommand) -> Result<()> {
    let notes = if command.unfiled {
        app.repo.notes_in_notebook(None)
    } else if let Some(notebook) = command.notebook.as_deref() {
        app.repo.notes_in_notebook(Some(resolve_notebook(app, notebook)?))
    } else {
        let mut notes = app.repo.notes().to_vec();
        notes.sort_by(|a, b| b.pinned.cmp(&a.pinned).then(b.updated_at.cmp(&a.updated_at)));
        notes
    };
    display_notes(&notes, &notebook_names(app));
    Ok(())
}

async fn edit_note(app: &App, command: NoteEditCommand) -> Result<()> {
    let mut note = resolve_note(app, &command.id)?;

    if command.title.is_some() || command.content.is_some() {
        note = app
            .repo
            .update_note(
                note.id,
                UpdateNoteData {
                    title: command.title,
                    content: command.content,
                    color: None,
                },
            )
            .await?;
    }

    if command.unfile {
        note = app.repo.move_note(note.id, None).await?;
    } else if let Some(notebook) = command.notebook.as_deref() {
        let notebook_id = resolve_notebook(app, notebook)?;
        note = app.repo.move_note(note.id, Some(notebook_id)).await?;
    }

    println!("Updated note {}", note.title);
    Ok(())
}
