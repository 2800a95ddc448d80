use daybook_core::features::FeatureFlags;
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const CONFIG_FILE: &str = "daybook.toml";

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// SQLite database holding every collection
    pub database_path: PathBuf,
    /// JSON file for active timers, fired reminders and feature overrides
    pub state_path: PathBuf,
    /// `tracing` filter directive; `RUST_LOG` wins when set
    pub log_filter: String,
    /// How far ahead `event reminders` looks
    pub reminder_lead_minutes: i64,
    /// Folder `sync push` writes to and `sync pull` reads from
    pub remote_dir: PathBuf,
    /// Whose document to sync
    pub user_id: String,
    #[serde(default)]
    pub features: FeatureFlags,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            database_path: data_dir.join("daybook.db"),
            state_path: data_dir.join("state.json"),
            log_filter: "warn".to_string(),
            reminder_lead_minutes: 15,
            remote_dir: data_dir.join("remote"),
            user_id: "local".to_string(),
            features: FeatureFlags::default(),
        }
    }
}

impl Config {
    /// Defaults, then the user config file, then `./daybook.toml`, then
    /// `DAYBOOK_*` environment variables (`__` separates nested keys).
    pub fn new() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(dirs) = project_dirs() {
            figment = figment.merge(Toml::file(dirs.config_dir().join(CONFIG_FILE)));
        }
        figment
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed("DAYBOOK_").split("__"))
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("app", "daybook", "daybook")
}

fn data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}
