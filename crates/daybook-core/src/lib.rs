//! # Daybook Core Library
//!
//! Local-first persistence for the Daybook productivity suite: tasks, notes,
//! habits, calendar events and time tracking, stored in SQLite and served to
//! callers from an in-memory cache that publishes a fresh snapshot after
//! every write.
//!
//! ## Features
//!
//! - **Versioned Schema**: An ordered history of collection and index
//!   declarations, applied one transaction per version, with optional record
//!   transforms for breaking changes
//! - **Domain Services**: Validated CRUD for every domain with cascading
//!   deletes and symmetric task dependencies
//! - **Change Notification**: Cancellable subscriptions to whole-collection
//!   snapshots
//! - **Active Timers**: Concurrent, pausable stopwatches that survive restarts
//!   and only disappear once their time is logged
//! - **Remote Sync**: Whole-document pull, push and follow against a remote
//!   document store
//!
//! ## Core Modules
//!
//! - [`schema`]: Schema history and the migration runner
//! - [`db`]: Opening databases
//! - [`store`]: JSON record storage on top of SQLite
//! - [`cache`]: Snapshots and change events
//! - [`repository`]: Domain services with the Repository pattern
//! - [`timer`]: Active-timer tracking
//! - [`kv`]: Small key-value state outside the database
//! - [`reminders`]: Which event reminders have already fired
//! - [`features`]: Feature flags
//! - [`remote`]: Remote document sync
//! - [`error`]: Error types
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use daybook_core::{
//!     clock::SystemClock, db, models::NewTaskData,
//!     repository::{SqliteRepository, TaskRepository},
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let local = db::establish_connection("daybook.db").await?;
//!     let repo = SqliteRepository::open(local, Arc::new(SystemClock)).await?;
//!
//!     let mut changes = repo.cache().subscribe();
//!     let task = repo
//!         .add_task(NewTaskData {
//!             text: "Water the plants".to_string(),
//!             ..Default::default()
//!         })
//!         .await?;
//!     println!("Created task: {}", task.text);
//!
//!     if let Some(event) = changes.recv().await {
//!         println!("{} changed", event.collection());
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod clock;
pub mod db;
pub mod error;
pub mod features;
pub mod kv;
pub mod models;
pub mod reminders;
pub mod remote;
pub mod repository;
pub mod schema;
pub mod store;
pub mod timer;
