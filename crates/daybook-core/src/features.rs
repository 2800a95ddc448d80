//! Feature flags, resolved once at startup.

use crate::error::{CoreError, CoreResult};
use crate::kv::{keys, KeyValueStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Tasks,
    Notes,
    Habits,
    TimeTracking,
    Calendar,
    RemoteSync,
}

impl Feature {
    pub const ALL: [Feature; 6] = [
        Feature::Tasks,
        Feature::Notes,
        Feature::Habits,
        Feature::TimeTracking,
        Feature::Calendar,
        Feature::RemoteSync,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Tasks => "tasks",
            Feature::Notes => "notes",
            Feature::Habits => "habits",
            Feature::TimeTracking => "time_tracking",
            Feature::Calendar => "calendar",
            Feature::RemoteSync => "remote_sync",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        Feature::ALL
            .into_iter()
            .find(|f| f.as_str() == wanted)
            .ok_or_else(|| CoreError::InvalidInput(format!("Unknown feature: '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub tasks: bool,
    pub notes: bool,
    pub habits: bool,
    pub time_tracking: bool,
    pub calendar: bool,
    pub remote_sync: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            tasks: true,
            notes: true,
            habits: true,
            time_tracking: true,
            calendar: true,
            remote_sync: false,
        }
    }
}

impl FeatureFlags {
    pub fn is_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::Tasks => self.tasks,
            Feature::Notes => self.notes,
            Feature::Habits => self.habits,
            Feature::TimeTracking => self.time_tracking,
            Feature::Calendar => self.calendar,
            Feature::RemoteSync => self.remote_sync,
        }
    }

    pub fn set(&mut self, feature: Feature, enabled: bool) {
        let slot = match feature {
            Feature::Tasks => &mut self.tasks,
            Feature::Notes => &mut self.notes,
            Feature::Habits => &mut self.habits,
            Feature::TimeTracking => &mut self.time_tracking,
            Feature::Calendar => &mut self.calendar,
            Feature::RemoteSync => &mut self.remote_sync,
        };
        *slot = enabled;
    }

    pub fn require(&self, feature: Feature) -> CoreResult<()> {
        if self.is_enabled(feature) {
            Ok(())
        } else {
            Err(CoreError::InvalidInput(format!(
                "The '{feature}' feature is disabled"
            )))
        }
    }

    /// Overlays the overrides cached in the key-value store.
    pub async fn apply_overrides(mut self, kv: &dyn KeyValueStore) -> CoreResult<Self> {
        let overrides = load_overrides(kv).await?;
        for (feature, enabled) in overrides {
            debug!(%feature, enabled, "feature override applied");
            self.set(feature, enabled);
        }
        Ok(self)
    }
}

async fn load_overrides(kv: &dyn KeyValueStore) -> CoreResult<BTreeMap<Feature, bool>> {
    Ok(kv
        .get_json::<BTreeMap<Feature, bool>>(keys::FEATURE_OVERRIDES)
        .await?
        .unwrap_or_default())
}

/// Records an override that later [`FeatureFlags::apply_overrides`] calls pick up.
pub async fn save_override(kv: &dyn KeyValueStore, feature: Feature, enabled: bool) -> CoreResult<()> {
    let mut overrides = load_overrides(kv).await?;
    overrides.insert(feature, enabled);
    kv.set_json(keys::FEATURE_OVERRIDES, &overrides).await
}

pub async fn clear_overrides(kv: &dyn KeyValueStore) -> CoreResult<()> {
    kv.remove(keys::FEATURE_OVERRIDES).await
}
