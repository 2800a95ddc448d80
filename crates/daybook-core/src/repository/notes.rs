use crate::error::CoreError;
use crate::models::{NewNoteData, Note, Notebook, UpdateNoteData};
use crate::repository::{not_found, optional_text, required_text, NoteRepository, SqliteRepository};
use crate::store;
use async_trait::async_trait;
use std::cmp::Reverse;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

impl SqliteRepository {
    /// Case-insensitive name check against the stored notebooks.
    async fn ensure_unique_notebook_name(
        &self,
        name: &str,
        except: Option<Uuid>,
    ) -> Result<(), CoreError> {
        let wanted = name.to_lowercase();
        let clash = self
            .db()
            .all::<Notebook>()
            .await?
            .into_iter()
            .any(|nb| Some(nb.id) != except && nb.name.to_lowercase() == wanted);

        if clash {
            Err(CoreError::Duplicate(format!(
                "a notebook named '{name}' already exists"
            )))
        } else {
            Ok(())
        }
    }

    async fn load_note(&self, id: Uuid) -> Result<Note, CoreError> {
        self.db()
            .get::<Note>(id)
            .await?
            .ok_or_else(|| not_found("Note", id))
    }

    async fn save_note(&self, note: Note) -> Result<Note, CoreError> {
        self.db().put(&note).await?;
        self.cache().refresh::<Note>(self.db()).await?;
        Ok(note)
    }

    async fn ensure_notebook_exists(&self, id: Option<Uuid>) -> Result<(), CoreError> {
        if let Some(id) = id {
            if self.db().get::<Notebook>(id).await?.is_none() {
                return Err(not_found("Notebook", id));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl NoteRepository for SqliteRepository {
    async fn add_notebook(&self, name: String) -> Result<Notebook, CoreError> {
        let name = required_text(&name, "Notebook name")?;
        self.ensure_unique_notebook_name(&name, None).await?;

        let now = self.now();
        let notebook = Notebook {
            id: Uuid::new_v4(),
            name,
            created_at: now,
            updated_at: now,
        };

        self.db().insert(&notebook).await?;
        self.cache().refresh::<Notebook>(self.db()).await?;
        Ok(notebook)
    }

    async fn rename_notebook(&self, id: Uuid, name: String) -> Result<Notebook, CoreError> {
        let name = required_text(&name, "Notebook name")?;
        let mut notebook = self
            .db()
            .get::<Notebook>(id)
            .await?
            .ok_or_else(|| not_found("Notebook", id))?;
        self.ensure_unique_notebook_name(&name, Some(id)).await?;

        notebook.name = name;
        notebook.updated_at = self.now();
        self.db().put(&notebook).await?;
        self.cache().refresh::<Notebook>(self.db()).await?;
        Ok(notebook)
    }

    async fn delete_notebook(&self, id: Uuid) -> Result<u64, CoreError> {
        let mut tx = self.db().pool().begin().await?;

        let notes_removed =
            store::delete_by_field_in::<Note>(&mut tx, "notebookId", &id.to_string()).await?;
        if store::delete_in::<Notebook>(&mut tx, id).await? == 0 {
            return Err(not_found("Notebook", id));
        }
        tx.commit().await?;

        info!(notebook_id = %id, notes_removed, "notebook deleted");
        self.cache().refresh::<Note>(self.db()).await?;
        self.cache().refresh::<Notebook>(self.db()).await?;
        Ok(notes_removed)
    }

    async fn add_note(&self, data: NewNoteData) -> Result<Note, CoreError> {
        let title = required_text(&data.title, "Note title")?;
        self.ensure_notebook_exists(data.notebook_id).await?;

        let now = self.now();
        let note = Note {
            id: Uuid::new_v4(),
            title,
            content: data.content,
            notebook_id: data.notebook_id,
            pinned: data.pinned,
            color: optional_text(data.color),
            created_at: now,
            updated_at: now,
        };

        self.db().insert(&note).await?;
        self.cache().refresh::<Note>(self.db()).await?;
        Ok(note)
    }

    async fn update_note(&self, id: Uuid, data: UpdateNoteData) -> Result<Note, CoreError> {
        let mut note = self.load_note(id).await?;

        if let Some(title) = data.title {
            note.title = required_text(&title, "Note title")?;
        }
        if let Some(content) = data.content {
            note.content = content;
        }
        if let Some(color) = data.color {
            note.color = optional_text(color);
        }
        note.updated_at = self.now();

        self.save_note(note).await
    }

    async fn toggle_note_pin(&self, id: Uuid) -> Result<Note, CoreError> {
        let mut note = self.load_note(id).await?;
        note.pinned = !note.pinned;
        note.updated_at = self.now();
        self.save_note(note).await
    }

    async fn move_note(&self, id: Uuid, notebook_id: Option<Uuid>) -> Result<Note, CoreError> {
        let mut note = self.load_note(id).await?;
        self.ensure_notebook_exists(notebook_id).await?;

        note.notebook_id = notebook_id;
        note.updated_at = self.now();
        self.save_note(note).await
    }

    async fn delete_note(&self, id: Uuid) -> Result<(), CoreError> {
        if !self.db().delete::<Note>(id).await? {
            return Err(not_found("Note", id));
        }
        self.cache().refresh::<Note>(self.db()).await?;
        Ok(())
    }

    fn notebooks(&self) -> Arc<Vec<Notebook>> {
        self.cache().get::<Notebook>()
    }

    fn notebook(&self, id: Uuid) -> Option<Notebook> {
        self.cache().find::<Notebook>(id)
    }

    fn notes(&self) -> Arc<Vec<Note>> {
        self.cache().get::<Note>()
    }

    fn note(&self, id: Uuid) -> Option<Note> {
        self.cache().find::<Note>(id)
    }

    fn notes_in_notebook(&self, notebook_id: Option<Uuid>) -> Vec<Note> {
        let mut notes: Vec<Note> = self
            .notes()
            .iter()
            .filter(|n| n.notebook_id == notebook_id)
            .cloned()
            .collect();
        notes.sort_by_key(|n| (Reverse(n.pinned), Reverse(n.updated_at)));
        notes
    }
}
