//! OpsRelay configuration system.
//!
//! TOML file at `~/.opsrelay/config.toml`, every field defaulted so a
//! partial file (or none at all) still produces a usable config.
//! Environment variables override the file for deploy-time secrets.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RelayError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub drive: DriveConfig,
    #[serde(default)]
    pub forward: ForwardConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
}

impl RelayConfig {
    /// Load config from the default path (~/.opsrelay/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| RelayError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| RelayError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Overlay environment variables onto the loaded file.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("OPSRELAY_FOLDER_ID") {
            self.watch.folder_id = v;
        }
        if let Ok(v) = std::env::var("OPSRELAY_FORWARD_ENABLED") {
            self.forward.enabled = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("OPSRELAY_FORWARD_RECIPIENT_ID") {
            self.forward.recipient_id = v;
        }
        if let Ok(v) = std::env::var("OPSRELAY_FORWARD_HEADER") {
            self.forward.header = v;
        }
        if let Ok(v) = std::env::var("OPSRELAY_PAGE_ACCESS_TOKEN") {
            let messenger = self.channel.messenger.get_or_insert_with(Default::default);
            messenger.page_access_token = v;
            messenger.enabled = true;
        }
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the OpsRelay home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".opsrelay")
    }

    /// Resolved database path (config override or ~/.opsrelay/watch.db).
    pub fn db_path(&self) -> PathBuf {
        if self.watch.db_path.is_empty() {
            Self::home_dir().join("watch.db")
        } else {
            PathBuf::from(&self.watch.db_path)
        }
    }
}

/// Watcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// The cloud folder to watch. Empty means the watcher logs and skips.
    #[serde(default)]
    pub folder_id: String,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_watcher_id")]
    pub watcher_id: String,
    /// Optional lower bound on file creation time for listings.
    #[serde(default)]
    pub since: Option<chrono::DateTime<chrono::Utc>>,
    /// Database path override (default: ~/.opsrelay/watch.db).
    #[serde(default)]
    pub db_path: String,
}

fn default_interval() -> u64 {
    300
}
fn default_watcher_id() -> String {
    "drive-pdf".into()
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            folder_id: String::new(),
            interval_secs: default_interval(),
            watcher_id: default_watcher_id(),
            since: None,
            db_path: String::new(),
        }
    }
}

/// Google Drive OAuth credentials (refresh-token flow).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriveConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub refresh_token: String,
}

/// Static fallback forwarding, used when no routing flow is configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub recipient_id: String,
    #[serde(default = "default_header")]
    pub header: String,
}

fn default_header() -> String {
    "New PDF files:".into()
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            recipient_id: String::new(),
            header: default_header(),
        }
    }
}

/// Channel configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub messenger: Option<MessengerChannelConfig>,
}

/// Facebook Messenger channel configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessengerChannelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub page_access_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.watch.interval_secs, 300);
        assert_eq!(config.watch.watcher_id, "drive-pdf");
        assert!(!config.forward.enabled);
        assert_eq!(config.forward.header, "New PDF files:");
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [watch]
            folder_id = "abc123"
            interval_secs = 60

            [forward]
            enabled = true
            recipient_id = "R1"

            [channel.messenger]
            enabled = true
            page_access_token = "tok"
        "#;
        let config: RelayConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.watch.folder_id, "abc123");
        assert_eq!(config.watch.interval_secs, 60);
        assert!(config.forward.enabled);
        assert_eq!(
            config.channel.messenger.unwrap().page_access_token,
            "tok"
        );
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: RelayConfig = toml::from_str("").unwrap();
        assert_eq!(config.watch.interval_secs, 300);
        assert!(config.channel.messenger.is_none());
        assert!(config.watch.since.is_none());
    }

    #[test]
    fn test_home_dir() {
        let home = RelayConfig::home_dir();
        assert!(home.to_string_lossy().contains("opsrelay"));
    }
}
