use crate::error::CoreError;
use crate::models::{Habit, HabitCompletion, NewHabitData, UpdateHabitData};
use crate::repository::{not_found, optional_text, required_text, HabitRepository, SqliteRepository};
use crate::store;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

fn validate_target(target: u32) -> Result<u32, CoreError> {
    if target == 0 {
        Err(CoreError::InvalidInput(
            "Habit target count must be at least 1".to_string(),
        ))
    } else {
        Ok(target)
    }
}

#[async_trait]
impl HabitRepository for SqliteRepository {
    async fn add_habit(&self, data: NewHabitData) -> Result<Habit, CoreError> {
        let name = required_text(&data.name, "Habit name")?;
        let target_count = validate_target(data.target_count.unwrap_or(1))?;
        let now = self.now();

        let habit = Habit {
            id: Uuid::new_v4(),
            name,
            description: optional_text(data.description),
            target_count,
            created_at: now,
            updated_at: now,
        };

        self.db().insert(&habit).await?;
        self.cache().refresh::<Habit>(self.db()).await?;
        Ok(habit)
    }

    async fn update_habit(&self, id: Uuid, data: UpdateHabitData) -> Result<Habit, CoreError> {
        let mut habit = self
            .db()
            .get::<Habit>(id)
            .await?
            .ok_or_else(|| not_found("Habit", id))?;

        if let Some(name) = data.name {
            habit.name = required_text(&name, "Habit name")?;
        }
        if let Some(description) = data.description {
            habit.description = optional_text(description);
        }
        if let Some(target) = data.target_count {
            habit.target_count = validate_target(target)?;
        }
        habit.updated_at = self.now();

        self.db().put(&habit).await?;
        self.cache().refresh::<Habit>(self.db()).await?;
        Ok(habit)
    }

    async fn delete_habit(&self, id: Uuid) -> Result<u64, CoreError> {
        let mut tx = self.db().pool().begin().await?;

        let completions_removed =
            store::delete_by_field_in::<HabitCompletion>(&mut tx, "habitId", &id.to_string())
                .await?;
        if store::delete_in::<Habit>(&mut tx, id).await? == 0 {
            return Err(not_found("Habit", id));
        }
        tx.commit().await?;

        info!(habit_id = %id, completions_removed, "habit deleted");
        self.cache().refresh::<HabitCompletion>(self.db()).await?;
        self.cache().refresh::<Habit>(self.db()).await?;
        Ok(completions_removed)
    }

    async fn log_completion(
        &self,
        habit_id: Uuid,
        date: NaiveDate,
        count: u32,
    ) -> Result<Option<HabitCompletion>, CoreError> {
        let mut tx = self.db().pool().begin().await?;

        if store::get_in::<Habit>(&mut tx, habit_id).await?.is_none() {
            return Err(not_found("Habit", habit_id));
        }

        let date_key = date.to_string();
        let existing = store::find_by_field_in::<HabitCompletion>(
            &mut tx,
            "habitId",
            &habit_id.to_string(),
        )
        .await?
        .into_iter()
        .find(|c| c.date.to_string() == date_key);

        let now = self.now();
        let result = match (existing, count) {
            (Some(completion), 0) => {
                store::delete_in::<HabitCompletion>(&mut tx, completion.id).await?;
                None
            }
            (None, 0) => None,
            (Some(mut completion), count) => {
                completion.count = count;
                completion.updated_at = now;
                store::put_in(&mut tx, &completion).await?;
                Some(completion)
            }
            (None, count) => {
                let completion = HabitCompletion {
                    id: Uuid::new_v4(),
                    habit_id,
                    date,
                    count,
                    updated_at: now,
                };
                store::insert_in(&mut tx, &completion).await?;
                Some(completion)
            }
        };

        tx.commit().await?;
        self.cache().refresh::<HabitCompletion>(self.db()).await?;
        Ok(result)
    }

    fn habits(&self) -> Arc<Vec<Habit>> {
        self.cache().get::<Habit>()
    }

    fn habit(&self, id: Uuid) -> Option<Habit> {
        self.cache().find::<Habit>(id)
    }

    fn completions_for(&self, habit_id: Uuid) -> Vec<HabitCompletion> {
        let mut completions: Vec<HabitCompletion> = self
            .cache()
            .get::<HabitCompletion>()
            .iter()
            .filter(|c| c.habit_id == habit_id)
            .cloned()
            .collect();
        completions.sort_by_key(|c| c.date);
        completions
    }

    fn current_streak(&self, habit_id: Uuid, today: NaiveDate) -> Result<u32, CoreError> {
        let habit = self.habit(habit_id).ok_or_else(|| not_found("Habit", habit_id))?;
        let counts: BTreeMap<NaiveDate, u32> = self
            .completions_for(habit_id)
            .into_iter()
            .map(|c| (c.date, c.count))
            .collect();
        let met = |day: NaiveDate| counts.get(&day).is_some_and(|n| *n >= habit.target_count);

        // An unfinished today does not break the streak yet.
        let mut day = if met(today) {
            today
        } else {
            today - Duration::days(1)
        };
        let mut streak = 0;
        while met(day) {
            streak += 1;
            day -= Duration::days(1);
        }
        Ok(streak)
    }
}
