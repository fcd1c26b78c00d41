//! Configuration management for GrantSync
//!
//! This crate handles loading and validating `.grantsync/config.toml`.
//! Every field has a default, so an absent file (or an empty one) yields
//! the timings the collaboration and sync layers are designed around.

use grant_common::{GrantError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory holding the config file, relative to the workspace root
pub const CONFIG_DIR: &str = ".grantsync";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Workspace root (set programmatically, not in TOML)
    #[serde(skip)]
    pub root: PathBuf,

    /// Remote settings endpoint
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Collaboration coordinator timings
    #[serde(default)]
    pub collaboration: CollaborationConfig,

    /// Offline sync queue settings
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Remote store configuration ([remote])
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Sent as a bearer token when present
    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:3000/api".to_string()
}
fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_token: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Collaboration configuration ([collaboration])
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationConfig {
    /// How often remote events and locks are polled
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How often presence is refreshed and pruned
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Inactivity after which a user is evicted from presence
    #[serde(default = "default_user_timeout_ms")]
    pub user_timeout_ms: u64,

    /// Age cap of events kept in the shared event list
    #[serde(default = "default_event_retention_ms")]
    pub event_retention_ms: u64,

    /// Readers ignore events older than this
    #[serde(default = "default_event_freshness_ms")]
    pub event_freshness_ms: u64,

    /// Size cap of the shared event list
    #[serde(default = "default_max_events")]
    pub max_events: usize,
}

fn default_poll_interval_ms() -> u64 {
    2_000
}
fn default_heartbeat_interval_ms() -> u64 {
    30_000
}
fn default_user_timeout_ms() -> u64 {
    5 * 60 * 1_000
}
fn default_event_retention_ms() -> u64 {
    30_000
}
fn default_event_freshness_ms() -> u64 {
    5_000
}
fn default_max_events() -> usize {
    100
}

impl Default for CollaborationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            user_timeout_ms: default_user_timeout_ms(),
            event_retention_ms: default_event_retention_ms(),
            event_freshness_ms: default_event_freshness_ms(),
            max_events: default_max_events(),
        }
    }
}

impl CollaborationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

/// Sync queue configuration ([sync])
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Failed attempts before an item is left in `failed` for good
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_connectivity_check_interval_ms")]
    pub connectivity_check_interval_ms: u64,

    #[serde(default = "default_periodic_sync_interval_ms")]
    pub periodic_sync_interval_ms: u64,

    /// One of `last-write-wins`, `merge`, `manual`
    #[serde(default = "default_conflict_strategy")]
    pub conflict_strategy: String,

    /// Visibility of synced resources: `user` or `organization`
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Where the queue and the offline cache are persisted
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
}

fn default_max_retries() -> u32 {
    3
}
fn default_connectivity_check_interval_ms() -> u64 {
    30_000
}
fn default_periodic_sync_interval_ms() -> u64 {
    5 * 60 * 1_000
}
fn default_conflict_strategy() -> String {
    "last-write-wins".to_string()
}
fn default_scope() -> String {
    "user".to_string()
}
fn default_storage_dir() -> PathBuf {
    PathBuf::from(".grantsync/offline")
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            connectivity_check_interval_ms: default_connectivity_check_interval_ms(),
            periodic_sync_interval_ms: default_periodic_sync_interval_ms(),
            conflict_strategy: default_conflict_strategy(),
            scope: default_scope(),
            storage_dir: default_storage_dir(),
        }
    }
}

impl SyncConfig {
    pub fn connectivity_check_interval(&self) -> Duration {
        Duration::from_millis(self.connectivity_check_interval_ms)
    }

    pub fn periodic_sync_interval(&self) -> Duration {
        Duration::from_millis(self.periodic_sync_interval_ms)
    }
}

const CONFLICT_STRATEGIES: [&str; 3] = ["last-write-wins", "merge", "manual"];
const SCOPES: [&str; 2] = ["user", "organization"];

impl Config {
    /// Load configuration from workspace root
    pub fn load(workspace_root: &Path) -> Result<Self> {
        let config_path = Self::path_for(workspace_root);

        if !config_path.exists() {
            tracing::debug!("No config at {:?}, using defaults", config_path);
            return Ok(Self {
                root: workspace_root.to_path_buf(),
                ..Self::default()
            });
        }

        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| GrantError::ConfigError(format!("Failed to read config: {}", e)))?;

        let mut config: Config = toml::from_str(&content)
            .map_err(|e| GrantError::ConfigError(format!("Failed to parse config: {}", e)))?;

        config.root = workspace_root.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    /// Location of the config file for a workspace
    pub fn path_for(workspace_root: &Path) -> PathBuf {
        workspace_root.join(CONFIG_DIR).join("config.toml")
    }

    /// Serialize to TOML (used by `grant init`)
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| GrantError::ConfigError(format!("Failed to serialize config: {}", e)))
    }

    /// Absolute directory for the persisted queue and cache
    pub fn storage_path(&self) -> PathBuf {
        if self.sync.storage_dir.is_absolute() {
            self.sync.storage_dir.clone()
        } else {
            self.root.join(&self.sync.storage_dir)
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(GrantError::ConfigError(msg));

        if !self.remote.base_url.starts_with("http://") && !self.remote.base_url.starts_with("https://") {
            return invalid("remote.base_url must start with http:// or https://".into());
        }

        let collab = &self.collaboration;
        let intervals = [
            ("collaboration.poll_interval_ms", collab.poll_interval_ms),
            ("collaboration.heartbeat_interval_ms", collab.heartbeat_interval_ms),
            ("collaboration.user_timeout_ms", collab.user_timeout_ms),
            ("collaboration.event_retention_ms", collab.event_retention_ms),
            ("collaboration.event_freshness_ms", collab.event_freshness_ms),
            ("sync.connectivity_check_interval_ms", self.sync.connectivity_check_interval_ms),
            ("sync.periodic_sync_interval_ms", self.sync.periodic_sync_interval_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return invalid(format!("{} must be greater than zero", name));
        }

        if collab.event_freshness_ms > collab.event_retention_ms {
            return invalid(
                "collaboration.event_freshness_ms cannot exceed event_retention_ms".into(),
            );
        }
        if collab.max_events == 0 {
            return invalid("collaboration.max_events must be greater than zero".into());
        }
        if self.sync.max_retries == 0 {
            return invalid("sync.max_retries must be greater than zero".into());
        }
        if !CONFLICT_STRATEGIES.contains(&self.sync.conflict_strategy.as_str()) {
            return invalid(format!(
                "sync.conflict_strategy must be one of {:?}",
                CONFLICT_STRATEGIES
            ));
        }
        if !SCOPES.contains(&self.sync.scope.as_str()) {
            return invalid(format!("sync.scope must be one of {:?}", SCOPES));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_defaults_when_missing() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = Config::load(temp.path()).unwrap();

        assert_eq!(config.root, temp.path());
        assert_eq!(config.collaboration.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.collaboration.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.collaboration.user_timeout_ms, 300_000);
        assert_eq!(config.sync.max_retries, 3);
        assert_eq!(config.sync.periodic_sync_interval(), Duration::from_secs(300));
        assert_eq!(config.storage_path(), temp.path().join(".grantsync/offline"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child(".grantsync/config.toml")
            .write_str(
                "[remote]\nbase_url = \"https://grants.example.org/api\"\n\n[sync]\nconflict_strategy = \"merge\"\n",
            )
            .unwrap();

        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config.remote.base_url, "https://grants.example.org/api");
        assert_eq!(config.sync.conflict_strategy, "merge");
        assert_eq!(config.sync.max_retries, 3);
        assert_eq!(config.collaboration.event_freshness_ms, 5_000);
    }

    #[test]
    fn test_invalid_strategy_rejected() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child(".grantsync/config.toml")
            .write_str("[sync]\nconflict_strategy = \"first-write-wins\"\n")
            .unwrap();

        let err = Config::load(temp.path()).unwrap_err();
        assert!(err.to_string().contains("conflict_strategy"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = Config::default();
        config.collaboration.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_freshness_wider_than_retention_rejected() {
        let mut config = Config::default();
        config.collaboration.event_freshness_ms = 60_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let text = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.sync.scope, "user");
        assert_eq!(parsed.collaboration.max_events, 100);
    }
}
