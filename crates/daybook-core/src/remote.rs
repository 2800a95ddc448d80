//! Whole-document sync of a user's tasks with a remote document store.
//!
//! The remote side holds one document per user. Every save overwrites the
//! whole document and every pull overwrites the local task collection; there
//! is no merge.

use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use crate::models::Task;
use crate::repository::tasks::replace_tasks_in;
use crate::repository::{SqliteRepository, TaskRepository};
use crate::schema::collections;
use crate::store;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const PROJECTS_STATE_KEY: &str = "remote.projects";
const KANBAN_STATE_KEY: &str = "remote.kanbanColumns";
const SUBSCRIPTION_BUFFER: usize = 16;
const FILE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// The per-user document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Opaque to this crate; stored and returned unchanged.
    #[serde(default)]
    pub projects: Vec<Value>,
    #[serde(default)]
    pub kanban_columns: Vec<Value>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentPath {
    user_id: String,
}

impl DocumentPath {
    pub fn user_data(user_id: impl Into<String>) -> CoreResult<Self> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() || user_id.contains('/') {
            return Err(CoreError::InvalidInput(format!(
                "Invalid user id: '{user_id}'"
            )));
        }
        Ok(Self { user_id })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "users/{}/appData/userSpecificData", self.user_id)
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn fetch(&self, path: &DocumentPath) -> CoreResult<Option<UserData>>;
    async fn save(&self, path: &DocumentPath, data: &UserData) -> CoreResult<()>;
    /// Streams the document, starting with its current contents if any.
    async fn subscribe(&self, path: &DocumentPath) -> CoreResult<RemoteSubscription>;
}

/// A live stream of document snapshots. Dropping it or calling
/// [`RemoteSubscription::cancel`] tears the stream down.
pub struct RemoteSubscription {
    rx: mpsc::Receiver<UserData>,
    cancel: CancellationToken,
}

impl RemoteSubscription {
    pub fn new(rx: mpsc::Receiver<UserData>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }

    pub async fn recv(&mut self) -> Option<UserData> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            snapshot = self.rx.recv() => snapshot,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for RemoteSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// An in-process document store.
#[derive(Default)]
pub struct MemoryRemoteStore {
    documents: Mutex<HashMap<String, watch::Sender<Option<UserData>>>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn document(&self, path: &DocumentPath) -> watch::Sender<Option<UserData>> {
        let mut documents = self.documents.lock().unwrap_or_else(|e| e.into_inner());
        documents
            .entry(path.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .clone()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn fetch(&self, path: &DocumentPath) -> CoreResult<Option<UserData>> {
        let document = self.document(path);
        let current = document.borrow().clone();
        Ok(current)
    }

    async fn save(&self, path: &DocumentPath, data: &UserData) -> CoreResult<()> {
        self.document(path).send_replace(Some(data.clone()));
        Ok(())
    }

    async fn subscribe(&self, path: &DocumentPath) -> CoreResult<RemoteSubscription> {
        let mut watcher = self.document(path).subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            let mut current = watcher.borrow_and_update().clone();
            loop {
                if let Some(snapshot) = current.take() {
                    if tx.send(snapshot).await.is_err() {
                        break;
                    }
                }
                tokio::select! {
                    _ = token.cancelled() => break,
                    changed = watcher.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        current = watcher.borrow_and_update().clone();
                    }
                }
            }
        });

        Ok(RemoteSubscription::new(rx, cancel))
    }
}

/// Documents stored as JSON files under a root directory, one file per
/// document path. Suited to a folder shared through a file-sync tool.
pub struct FileRemoteStore {
    root: PathBuf,
    poll_interval: Duration,
}

impl FileRemoteStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            poll_interval: FILE_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn document_file(&self, path: &DocumentPath) -> PathBuf {
        self.root.join(format!("{path}.json"))
    }
}

async fn read_document(file: &Path) -> CoreResult<Option<UserData>> {
    match tokio::fs::read_to_string(file).await {
        Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl RemoteStore for FileRemoteStore {
    async fn fetch(&self, path: &DocumentPath) -> CoreResult<Option<UserData>> {
        read_document(&self.document_file(path)).await
    }

    async fn save(&self, path: &DocumentPath, data: &UserData) -> CoreResult<()> {
        let file = self.document_file(path);
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = file.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(data)?).await?;
        tokio::fs::rename(&tmp, &file).await?;
        debug!(file = %file.display(), "remote document written");
        Ok(())
    }

    /// Polls the file and emits a snapshot whenever its contents change.
    async fn subscribe(&self, path: &DocumentPath) -> CoreResult<RemoteSubscription> {
        let file = self.document_file(path);
        let mut last = read_document(&file).await?;
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let mut ticker = tokio::time::interval(self.poll_interval);

        tokio::spawn(async move {
            if let Some(snapshot) = last.clone() {
                if tx.send(snapshot).await.is_err() {
                    return;
                }
            }
            // first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let current = match read_document(&file).await {
                    Ok(current) => current,
                    Err(e) => {
                        warn!(file = %file.display(), "unreadable remote document: {e}");
                        continue;
                    }
                };
                if current != last {
                    if let Some(snapshot) = current.clone() {
                        if tx.send(snapshot).await.is_err() {
                            break;
                        }
                    }
                    last = current;
                }
            }
        });

        Ok(RemoteSubscription::new(rx, cancel))
    }
}

/// Handle to a running [`SyncService::follow`] loop.
pub struct FollowHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl FollowHandle {
    /// Stops following and waits for the loop to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            warn!("remote follow task ended abnormally: {e}");
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

pub struct SyncService {
    remote: Arc<dyn RemoteStore>,
    repo: Arc<SqliteRepository>,
    clock: Arc<dyn Clock>,
    path: DocumentPath,
}

impl SyncService {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        repo: Arc<SqliteRepository>,
        clock: Arc<dyn Clock>,
        path: DocumentPath,
    ) -> Self {
        Self {
            remote,
            repo,
            clock,
            path,
        }
    }

    pub fn path(&self) -> &DocumentPath {
        &self.path
    }

    /// Fetches the document once and overwrites local state with it.
    /// Returns `false` if the remote document does not exist yet.
    pub async fn pull(&self) -> CoreResult<bool> {
        match self.remote.fetch(&self.path).await? {
            Some(data) => {
                self.apply_snapshot(data).await?;
                Ok(true)
            }
            None => {
                debug!(path = %self.path, "no remote document to pull");
                Ok(false)
            }
        }
    }

    /// Replaces the local tasks and stashes the opaque collections, all in
    /// one transaction.
    pub async fn apply_snapshot(&self, data: UserData) -> CoreResult<()> {
        let db = self.repo.local_db();
        db.ensure_collection(collections::APP_STATE)?;
        db.ensure_collection(collections::TASKS)?;

        let mut tx = db.pool().begin().await?;
        store::set_app_state_in(&mut tx, PROJECTS_STATE_KEY, &data.projects).await?;
        store::set_app_state_in(&mut tx, KANBAN_STATE_KEY, &data.kanban_columns).await?;
        let removed = replace_tasks_in(&mut tx, &data.tasks).await?;
        tx.commit().await?;

        self.repo.cache().refresh::<Task>(db).await?;
        info!(path = %self.path, removed, tasks = data.tasks.len(), "remote snapshot applied");
        Ok(())
    }

    /// Uploads the whole local document, replacing the remote one.
    pub async fn push(&self) -> CoreResult<UserData> {
        let db = self.repo.local_db();
        let data = UserData {
            tasks: self.repo.tasks().as_ref().clone(),
            projects: db
                .get_app_state(PROJECTS_STATE_KEY)
                .await?
                .unwrap_or_default(),
            kanban_columns: db
                .get_app_state(KANBAN_STATE_KEY)
                .await?
                .unwrap_or_default(),
            updated_at: Some(self.clock.now()),
        };
        self.remote.save(&self.path, &data).await?;
        info!(path = %self.path, tasks = data.tasks.len(), "local data pushed");
        Ok(data)
    }

    /// Applies every snapshot the remote store streams until the returned
    /// handle is stopped. A snapshot that fails to apply is logged and skipped.
    pub async fn follow(self: Arc<Self>) -> CoreResult<FollowHandle> {
        let mut subscription = self.remote.subscribe(&self.path).await?;
        let cancel = subscription.cancellation_token();

        let join = tokio::spawn(async move {
            while let Some(snapshot) = subscription.recv().await {
                if let Err(e) = self.apply_snapshot(snapshot).await {
                    warn!(path = %self.path, "failed to apply remote snapshot: {e}");
                }
            }
            debug!(path = %self.path, "stopped following remote document");
        });

        Ok(FollowHandle { cancel, join })
    }
}
