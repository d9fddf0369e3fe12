// Configuration management for the SMS backup CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/smsbackup/config.json
// - Linux: ~/.config/smsbackup/config.json
// - Windows: %APPDATA%\smsbackup\config.json

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Location of the message store (defaults to <data dir>/store)
    pub store_path: Option<String>,

    /// Directory new backup files are written to (defaults to the cwd)
    pub backup_dir: Option<String>,

    /// Whether this tool currently holds the default-handler role,
    /// i.e. may write into the message store
    pub default_handler: bool,

    /// Whether reading the message store is permitted
    pub read_permission: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: None,
            backup_dir: None,
            default_handler: false,
            read_permission: true,
        }
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("smsbackup");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the data directory path (cross-platform)
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to determine data directory")?
            .join("smsbackup");

        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        Ok(data_dir)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Resolved message store location
    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(Self::data_dir()?.join("store")),
        }
    }

    /// Resolved directory for new backups
    pub fn backup_dir(&self) -> Result<PathBuf> {
        match &self.backup_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => std::env::current_dir().context("Failed to determine current directory"),
        }
    }

    /// Set a config value (does not persist)
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "store_path" => {
                self.store_path = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "backup_dir" => {
                self.backup_dir = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "default_handler" => {
                self.default_handler = value.parse().context("Invalid boolean value")?;
            }
            "read_permission" => {
                self.read_permission = value.parse().context("Invalid boolean value")?;
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        Ok(())
    }

    /// Get a config value
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "store_path" => self.store_path.clone(),
            "backup_dir" => self.backup_dir.clone(),
            "default_handler" => Some(self.default_handler.to_string()),
            "read_permission" => Some(self.read_permission.to_string()),
            _ => None,
        }
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        vec![
            (
                "store_path".to_string(),
                self.store_path.clone().unwrap_or_else(|| "(auto)".to_string()),
            ),
            (
                "backup_dir".to_string(),
                self.backup_dir.clone().unwrap_or_else(|| "(cwd)".to_string()),
            ),
            ("default_handler".to_string(), self.default_handler.to_string()),
            ("read_permission".to_string(), self.read_permission.to_string()),
        ]
    }
}
