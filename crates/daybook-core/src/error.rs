use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Ambiguous ID: {} candidates", .0.len())]
    AmbiguousId(Vec<(String, String)>),

    #[error("Already exists: {0}")]
    Duplicate(String),

    #[error("Circular dependency detected: Task '{0}' cannot depend on '{1}'.")]
    CircularDependency(String, String),

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("Schema migration to version {version} failed: {reason}")]
    Migration { version: u32, reason: String },

    #[error("Database is at schema version {stored}, newer than the supported version {declared}")]
    SchemaDowngrade { stored: u32, declared: u32 },

    #[error("Remote store error: {0}")]
    Remote(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
