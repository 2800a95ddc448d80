use crate::error::CoreError;
use crate::schema::SchemaManager;
use crate::store::LocalDb;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

// Re-export the pool for use in other parts of the core crate
pub use sqlx::SqlitePool as DbPool;

/// Opens the SQLite database at `db_path` and migrates it to the declared
/// application schema.
///
/// # Arguments
///
/// * `db_path` - The path to the SQLite database file.
///
/// # Returns
///
/// A `Result` containing the [`LocalDb`] or a `CoreError` if the connection
/// fails or a schema version cannot be applied. A failed migration leaves the
/// file on its previous version.
pub async fn establish_connection(db_path: &str) -> Result<LocalDb, CoreError> {
    open(Path::new(db_path), &SchemaManager::declared()).await
}

/// Opens a database file with an explicit schema history.
pub async fn open(db_path: &Path, schema: &SchemaManager) -> Result<LocalDb, CoreError> {
    // Create the directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    let report = schema.migrate(&pool).await?;
    if !report.applied.is_empty() {
        info!(from = report.from, to = report.to, path = %db_path.display(), "database migrated");
    }

    Ok(LocalDb::new(pool, schema.collections()))
}

/// Opens a private in-memory database. Everything is lost when it is dropped.
pub async fn open_in_memory(schema: &SchemaManager) -> Result<LocalDb, CoreError> {
    // A single, never-recycled connection keeps the in-memory database alive.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    schema.migrate(&pool).await?;
    Ok(LocalDb::new(pool, schema.collections()))
}
