//! Configuration management

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::catalog::Channel;
use crate::error::{InstallerError, Result};

pub const DEFAULT_CATALOG_URL: &str = "https://data.services.jetbrains.com/products/releases";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub prefix: PathBuf,
    pub tmp_dir: PathBuf,
    pub channel: Channel,
    pub applications_dir: PathBuf,
    pub desktop_dir: PathBuf,
    pub catalog_url: String,
    pub catalog_retries: u32,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            prefix: PathBuf::from("/opt"),
            tmp_dir: PathBuf::from("/tmp"),
            channel: Channel::Release,
            applications_dir: home.join(".local/share/applications"),
            desktop_dir: home.join("Desktop"),
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            catalog_retries: 2,
            timeout_secs: 60,
        }
    }
}

impl Config {
    /// Load the user config, falling back to defaults when none exists.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            InstallerError::Config(format!("failed to parse {}: {e}", path.display()))
        })
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            InstallerError::Config("could not determine config directory".into())
        })?;
        Ok(config_dir.join("jbi").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from(&temp_dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.prefix, PathBuf::from("/opt"));
        assert_eq!(config.tmp_dir, PathBuf::from("/tmp"));
        assert_eq!(config.channel, Channel::Release);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{ "tmp_dir": "/var/cache/jbi", "channel": "rc" }"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.tmp_dir, PathBuf::from("/var/cache/jbi"));
        assert_eq!(config.channel, Channel::Rc);
        assert_eq!(config.prefix, PathBuf::from("/opt"));
    }

    #[test]
    fn test_unknown_channel_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{ "channel": "eap" }"#).unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_corrupt_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(InstallerError::Config(_))
        ));
    }
}
