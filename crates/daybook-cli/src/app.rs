use crate::config::Config;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use daybook_core::clock::{Clock, SystemClock};
use daybook_core::db;
use daybook_core::features::FeatureFlags;
use daybook_core::kv::{FileKeyValueStore, KeyValueStore};
use daybook_core::reminders::ReminderLedger;
use daybook_core::remote::{DocumentPath, FileRemoteStore, RemoteStore, SyncService};
use daybook_core::repository::{SqliteRepository, TimeLogRepository};
use daybook_core::schema::SchemaManager;
use daybook_core::timer::TimerTracker;
use std::sync::Arc;
use tracing::debug;

/// Everything a command needs, opened once per invocation.
pub struct App {
    pub config: Config,
    pub repo: Arc<SqliteRepository>,
    pub kv: Arc<FileKeyValueStore>,
    pub clock: Arc<dyn Clock>,
    pub features: FeatureFlags,
}

impl App {
    pub async fn open(config: Config) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let local = db::open(&config.database_path, &SchemaManager::declared())
            .await
            .with_context(|| format!("opening {}", config.database_path.display()))?;
        let repo = Arc::new(SqliteRepository::open(local, clock.clone()).await?);
        let kv = Arc::new(FileKeyValueStore::open(&config.state_path).await?);
        let features = config.features.apply_overrides(kv.as_ref()).await?;
        debug!(?features, "app opened");

        Ok(Self {
            config,
            repo,
            kv,
            clock,
            features,
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn kv(&self) -> Arc<dyn KeyValueStore> {
        self.kv.clone()
    }

    pub async fn timers(&self) -> Result<TimerTracker> {
        let log: Arc<dyn TimeLogRepository> = self.repo.clone();
        Ok(TimerTracker::load(self.kv(), self.clock.clone(), log).await?)
    }

    pub async fn reminders(&self) -> Result<ReminderLedger> {
        Ok(ReminderLedger::load(self.kv()).await?)
    }

    pub fn sync_service(&self) -> Result<SyncService> {
        let remote: Arc<dyn RemoteStore> = Arc::new(FileRemoteStore::new(&self.config.remote_dir));
        Ok(SyncService::new(
            remote,
            self.repo.clone(),
            self.clock.clone(),
            DocumentPath::user_data(self.config.user_id.clone())?,
        ))
    }
}
