//! Versioned schema declarations and the migration runner.
//!
//! Every collection is stored as its own SQLite table holding one JSON record
//! per row. A [`SchemaVersion`] describes the diff against the previous
//! version: collections that are (re)defined, collections that are removed,
//! and optionally an [`Upgrade`] transform that rewrites every record of one
//! collection. [`SchemaManager::migrate`] applies pending versions strictly in
//! ascending order, each inside its own transaction together with the bump of
//! the stored version number. A failing version leaves the database on the
//! previous version.

use crate::db::DbPool;
use crate::error::{CoreError, CoreResult};
use crate::store::field_expr;
use serde_json::{Map, Value};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Collection names used by the application schema.
pub mod collections {
    pub const TASKS: &str = "tasks";
    pub const HABITS: &str = "habits";
    pub const HABIT_COMPLETIONS: &str = "habit_completions";
    pub const NOTEBOOKS: &str = "notebooks";
    pub const NOTES: &str = "notes";
    pub const CALENDAR_EVENTS: &str = "calendar_events";
    pub const TIME_ACTIVITIES: &str = "time_activities";
    pub const TIME_LOG_ENTRIES: &str = "time_log_entries";
    pub const APP_STATE: &str = "app_state";
    /// Existed in version 3 only.
    pub const POMODORO_SESSIONS: &str = "pomodoro_sessions";
}

const META_TABLE: &str = "_schema_meta";

/// A secondary index over one or more top-level record fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub fields: Vec<String>,
    pub unique: bool,
}

impl IndexDef {
    fn name(&self, collection: &str) -> String {
        let prefix = if self.unique { "ux" } else { "ix" };
        format!("{}_{}_{}", prefix, collection, self.fields.join("_"))
    }
}

/// The declared shape of one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDef {
    pub name: String,
    pub indexes: Vec<IndexDef>,
}

impl CollectionDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexes: Vec::new(),
        }
    }

    /// Adds a non-unique index over the given fields.
    pub fn index(mut self, fields: &[&str]) -> Self {
        self.indexes.push(IndexDef {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            unique: false,
        });
        self
    }

    /// Adds a unique (possibly compound) index over the given fields.
    pub fn unique(mut self, fields: &[&str]) -> Self {
        self.indexes.push(IndexDef {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            unique: true,
        });
        self
    }
}

/// One entry of a version's store diff.
#[derive(Debug, Clone)]
pub enum StoreChange {
    /// Create the collection, or replace its index set if it already exists.
    Define(CollectionDef),
    /// Drop the collection and all of its records. Irreversible.
    Remove(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransformError(pub String);

/// Rewrites a single record in place.
pub type TransformFn = fn(&mut Map<String, Value>) -> Result<(), TransformError>;

/// A data transform applied once to every record of `collection`.
#[derive(Debug, Clone)]
pub struct Upgrade {
    pub collection: String,
    pub transform: TransformFn,
}

#[derive(Debug, Clone)]
pub struct SchemaVersion {
    pub version: u32,
    pub stores: Vec<StoreChange>,
    pub upgrade: Option<Upgrade>,
}

impl SchemaVersion {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            stores: Vec::new(),
            upgrade: None,
        }
    }

    pub fn define(mut self, collection: CollectionDef) -> Self {
        self.stores.push(StoreChange::Define(collection));
        self
    }

    pub fn remove(mut self, collection: &str) -> Self {
        self.stores.push(StoreChange::Remove(collection.to_string()));
        self
    }

    pub fn upgrade(mut self, collection: &str, transform: TransformFn) -> Self {
        self.upgrade = Some(Upgrade {
            collection: collection.to_string(),
            transform,
        });
        self
    }
}

/// Outcome of a [`SchemaManager::migrate`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub from: u32,
    pub to: u32,
    pub applied: Vec<u32>,
    pub transformed_records: usize,
}

#[derive(Debug, Clone)]
pub struct SchemaManager {
    versions: Vec<SchemaVersion>,
}

impl SchemaManager {
    /// Validates a version list: non-zero, strictly ascending, identifier-safe
    /// names, and every upgrade targets a collection present in its version.
    pub fn new(versions: Vec<SchemaVersion>) -> CoreResult<Self> {
        let mut previous = 0;
        let mut running: BTreeMap<String, CollectionDef> = BTreeMap::new();

        for version in &versions {
            if version.version <= previous {
                return Err(CoreError::InvalidInput(format!(
                    "schema versions must be strictly ascending and non-zero (found {} after {})",
                    version.version, previous
                )));
            }
            previous = version.version;

            for change in &version.stores {
                match change {
                    StoreChange::Define(def) => {
                        validate_identifier(&def.name)?;
                        for index in &def.indexes {
                            if index.fields.is_empty() {
                                return Err(CoreError::InvalidInput(format!(
                                    "empty index declared on '{}'",
                                    def.name
                                )));
                            }
                            for field in &index.fields {
                                validate_identifier(field)?;
                            }
                        }
                        running.insert(def.name.clone(), def.clone());
                    }
                    StoreChange::Remove(name) => {
                        validate_identifier(name)?;
                        running.remove(name);
                    }
                }
            }

            if let Some(upgrade) = &version.upgrade {
                if !running.contains_key(&upgrade.collection) {
                    return Err(CoreError::MissingDependency(format!(
                        "version {} upgrades unknown collection '{}'",
                        version.version, upgrade.collection
                    )));
                }
            }
        }

        Ok(Self { versions })
    }

    /// The schema history shipped with the application.
    pub fn declared() -> Self {
        Self {
            versions: declared_versions(),
        }
    }

    /// The declared versions up to and including `version`.
    pub fn up_to(&self, version: u32) -> Self {
        Self {
            versions: self
                .versions
                .iter()
                .filter(|v| v.version <= version)
                .cloned()
                .collect(),
        }
    }

    pub fn latest_version(&self) -> u32 {
        self.versions.last().map(|v| v.version).unwrap_or(0)
    }

    /// The merged collection definitions as of `version`.
    pub fn schema_at(&self, version: u32) -> BTreeMap<String, CollectionDef> {
        let mut running = BTreeMap::new();
        for v in self.versions.iter().take_while(|v| v.version <= version) {
            for change in &v.stores {
                match change {
                    StoreChange::Define(def) => {
                        running.insert(def.name.clone(), def.clone());
                    }
                    StoreChange::Remove(name) => {
                        running.remove(name);
                    }
                }
            }
        }
        running
    }

    /// Names of the collections present in the latest version.
    pub fn collections(&self) -> BTreeSet<String> {
        self.schema_at(self.latest_version()).into_keys().collect()
    }

    /// Reads the version the database was last migrated to (0 when fresh).
    pub async fn stored_version(pool: &DbPool) -> CoreResult<u32> {
        ensure_meta_table(pool).await?;
        let version: Option<i64> =
            sqlx::query_scalar(&format!("SELECT version FROM {META_TABLE} WHERE id = 1"))
                .fetch_optional(pool)
                .await?;
        Ok(version.unwrap_or(0) as u32)
    }

    /// Applies every pending version in order.
    pub async fn migrate(&self, pool: &DbPool) -> CoreResult<MigrationReport> {
        let stored = Self::stored_version(pool).await?;
        let declared = self.latest_version();
        if stored > declared {
            return Err(CoreError::SchemaDowngrade { stored, declared });
        }

        let mut report = MigrationReport {
            from: stored,
            to: stored,
            applied: Vec::new(),
            transformed_records: 0,
        };

        for version in self.versions.iter().filter(|v| v.version > stored) {
            info!(version = version.version, "applying schema version");
            let mut tx = pool.begin().await?;
            let transformed = match apply_version(&mut tx, version).await {
                Ok(transformed) => transformed,
                Err(e) => {
                    if let Err(rollback) = tx.rollback().await {
                        warn!(version = version.version, "rollback failed: {rollback}");
                    }
                    return Err(wrap_migration_error(version.version, e));
                }
            };
            tx.commit()
                .await
                .map_err(|e| wrap_migration_error(version.version, e.into()))?;

            report.to = version.version;
            report.applied.push(version.version);
            report.transformed_records += transformed;
        }

        if report.applied.is_empty() {
            debug!(version = stored, "schema is up to date");
        }
        Ok(report)
    }
}

fn wrap_migration_error(version: u32, error: CoreError) -> CoreError {
    match error {
        CoreError::Migration { .. } => error,
        other => CoreError::Migration {
            version,
            reason: other.to_string(),
        },
    }
}

pub(crate) fn validate_identifier(name: &str) -> CoreResult<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(CoreError::InvalidInput(format!(
            "'{name}' is not a valid collection or field name"
        )))
    }
}

async fn ensure_meta_table(pool: &DbPool) -> CoreResult<()> {
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {META_TABLE} (id INTEGER PRIMARY KEY CHECK (id = 1), version INTEGER NOT NULL)"
    ))
    .execute(pool)
    .await?;
    Ok(())
}

async fn apply_version(
    tx: &mut Transaction<'_, Sqlite>,
    version: &SchemaVersion,
) -> CoreResult<usize> {
    for change in &version.stores {
        match change {
            StoreChange::Define(def) => define_collection(&mut **tx, def).await?,
            StoreChange::Remove(name) => {
                warn!(
                    version = version.version,
                    collection = %name,
                    "dropping collection and all of its records"
                );
                sqlx::query(&format!("DROP TABLE IF EXISTS \"{name}\""))
                    .execute(&mut **tx)
                    .await?;
            }
        }
    }

    let transformed = match &version.upgrade {
        Some(upgrade) => run_upgrade(&mut **tx, version.version, upgrade).await?,
        None => 0,
    };

    sqlx::query(&format!(
        "INSERT INTO {META_TABLE} (id, version) VALUES (1, $1) \
         ON CONFLICT(id) DO UPDATE SET version = excluded.version"
    ))
    .bind(version.version as i64)
    .execute(&mut **tx)
    .await?;

    Ok(transformed)
}

async fn define_collection(conn: &mut SqliteConnection, def: &CollectionDef) -> CoreResult<()> {
    let table = &def.name;
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" (id TEXT PRIMARY KEY NOT NULL, body TEXT NOT NULL)"
    ))
    .execute(&mut *conn)
    .await?;

    // Automatic indexes (primary key) have no SQL and are left alone.
    let existing: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = $1 AND sql IS NOT NULL",
    )
    .bind(table.as_str())
    .fetch_all(&mut *conn)
    .await?;

    let wanted: BTreeMap<String, &IndexDef> = def
        .indexes
        .iter()
        .map(|index| (index.name(table), index))
        .collect();

    for name in existing.iter().filter(|name| !wanted.contains_key(*name)) {
        debug!(collection = %table, index = %name, "dropping index");
        sqlx::query(&format!("DROP INDEX IF EXISTS \"{name}\""))
            .execute(&mut *conn)
            .await?;
    }

    for (name, index) in wanted.iter().filter(|(name, _)| !existing.contains(name)) {
        let columns = index
            .fields
            .iter()
            .map(|field| field_expr(field))
            .collect::<CoreResult<Vec<_>>>()?
            .join(", ");
        let unique = if index.unique { "UNIQUE " } else { "" };
        debug!(collection = %table, index = %name, "creating index");
        sqlx::query(&format!(
            "CREATE {unique}INDEX \"{name}\" ON \"{table}\" ({columns})"
        ))
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

async fn run_upgrade(
    conn: &mut SqliteConnection,
    version: u32,
    upgrade: &Upgrade,
) -> CoreResult<usize> {
    let table = &upgrade.collection;
    let rows: Vec<(String, String)> = sqlx::query_as(&format!("SELECT id, body FROM \"{table}\""))
        .fetch_all(&mut *conn)
        .await?;

    for (id, body) in &rows {
        let mut record = match serde_json::from_str::<Value>(body)? {
            Value::Object(map) => map,
            _ => {
                return Err(CoreError::Migration {
                    version,
                    reason: format!("record '{id}' in '{table}' is not an object"),
                })
            }
        };

        (upgrade.transform)(&mut record).map_err(|e| CoreError::Migration {
            version,
            reason: format!("record '{id}' in '{table}': {e}"),
        })?;

        sqlx::query(&format!("UPDATE \"{table}\" SET body = $1 WHERE id = $2"))
            .bind(serde_json::to_string(&record)?)
            .bind(id.as_str())
            .execute(&mut *conn)
            .await?;
    }

    info!(version, collection = %table, records = rows.len(), "upgrade transform applied");
    Ok(rows.len())
}

/// Legacy → compacted field names for time log entries (version 4).
pub const TIME_LOG_FIELD_RENAMES: [(&str, &str); 6] = [
    ("activityId", "a"),
    ("startTime", "s"),
    ("endTime", "e"),
    ("durationMs", "d"),
    ("notes", "n"),
    ("isManual", "m"),
];

/// Moves every legacy time-log field to its compacted key and drops the old
/// key. Records already in compacted form pass through unchanged.
pub fn compact_time_log_entry(record: &mut Map<String, Value>) -> Result<(), TransformError> {
    for (old, new) in TIME_LOG_FIELD_RENAMES {
        if let Some(value) = record.remove(old) {
            record.insert(new.to_string(), value);
        }
    }
    if !record.contains_key("a") || !record.contains_key("s") {
        return Err(TransformError(
            "time log entry has no activity or start time".to_string(),
        ));
    }
    Ok(())
}

fn declared_versions() -> Vec<SchemaVersion> {
    use collections::*;

    vec![
        SchemaVersion::new(1)
            .define(CollectionDef::new(TASKS).index(&["dueDate"]).index(&["completed"]))
            .define(CollectionDef::new(HABITS))
            .define(
                CollectionDef::new(HABIT_COMPLETIONS)
                    .index(&["habitId"])
                    .unique(&["habitId", "date"]),
            )
            .define(CollectionDef::new(APP_STATE)),
        SchemaVersion::new(2)
            .define(CollectionDef::new(NOTEBOOKS).index(&["name"]))
            .define(
                CollectionDef::new(NOTES)
                    .index(&["notebookId"])
                    .index(&["pinned"]),
            ),
        SchemaVersion::new(3)
            .define(CollectionDef::new(CALENDAR_EVENTS).index(&["startTime"]))
            .define(CollectionDef::new(TIME_ACTIVITIES).index(&["name"]))
            .define(
                CollectionDef::new(TIME_LOG_ENTRIES)
                    .index(&["activityId"])
                    .index(&["startTime"]),
            )
            .define(CollectionDef::new(POMODORO_SESSIONS).index(&["startedAt"])),
        // Breaking: pomodoro history is discarded.
        SchemaVersion::new(4)
            .remove(POMODORO_SESSIONS)
            .define(CollectionDef::new(TIME_LOG_ENTRIES).index(&["a"]).index(&["s"]))
            .upgrade(TIME_LOG_ENTRIES, compact_time_log_entry),
    ]
}
