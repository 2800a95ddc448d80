use anyhow::{anyhow, Result};
use daybook_core::error::CoreError;
use daybook_core::repository::TaskRepository;
use daybook_core::store::Entity;
use dialoguer::Confirm;
use uuid::Uuid;

const MIN_PREFIX_LEN: usize = 2;

fn check_prefix(short_id: &str) -> Result<String> {
    let short_id = short_id.trim().to_lowercase();
    if short_id.len() < MIN_PREFIX_LEN {
        return Err(anyhow!(CoreError::InvalidInput(format!(
            "Short ID must be at least {MIN_PREFIX_LEN} characters long."
        ))));
    }
    Ok(short_id)
}

fn pick_one<T: Entity>(
    matches: Vec<&T>,
    short_id: &str,
    kind: &str,
    label: impl Fn(&T) -> String,
) -> Result<Uuid> {
    match matches.as_slice() {
        [only] => Ok(only.id()),
        [] => Err(anyhow!(CoreError::NotFound(format!(
            "No {kind} found with ID prefix '{short_id}'"
        )))),
        many => Err(anyhow!(CoreError::AmbiguousId(
            many.iter().map(|r| (r.id().to_string(), label(r))).collect()
        ))),
    }
}

pub fn resolve_task_id(repo: &impl TaskRepository, short_id: &str) -> Result<Uuid> {
    let short_id = check_prefix(short_id)?;
    let tasks = repo.find_tasks_by_short_id_prefix(&short_id);
    pick_one(tasks.iter().collect(), &short_id, "task", |t| t.text.clone())
}

/// Resolves a unique id prefix among `records`.
pub fn resolve_id<T: Entity>(
    records: &[T],
    short_id: &str,
    kind: &str,
    label: impl Fn(&T) -> String,
) -> Result<Uuid> {
    let short_id = check_prefix(short_id)?;
    let matches = records
        .iter()
        .filter(|r| r.id().to_string().starts_with(&short_id))
        .collect();
    pick_one(matches, &short_id, kind, label)
}

/// Asks before destructive operations unless `force` is set.
pub fn confirm(prompt: String, force: bool) -> bool {
    if force {
        return true;
    }
    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .unwrap_or(false)
}

pub fn short_id(id: &Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}
