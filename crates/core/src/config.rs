//! Configuration management
//!
//! Handles loading and saving the TOML configuration file holding network
//! timeouts and the named remotes the CLI talks to.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "CA_CONFIG_DIR";

const CONFIG_FILE: &str = "config.toml";

/// Fixed connection budgets applied when a transport is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkTimeouts {
    /// Establishing the TCP/TLS connection
    pub connect_secs: u64,
    /// Idle time between received chunks
    pub read_secs: u64,
    /// Sending a request body and receiving the response head
    pub write_secs: u64,
}

impl Default for NetworkTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: 30,
            read_secs: 60,
            write_secs: 300,
        }
    }
}

impl NetworkTimeouts {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }
}

/// Connection details of one remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RemoteConfig {
    /// A WebDAV server; `url` includes the root path, e.g.
    /// `https://cloud.example.com/remote.php/webdav`
    Webdav {
        url: String,
        username: String,
        password: String,
    },
    /// A directory on this machine
    Local { root: PathBuf },
}

impl RemoteConfig {
    /// Short backend name for display
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteConfig::Webdav { .. } => "webdav",
            RemoteConfig::Local { .. } => "local",
        }
    }

    /// Location without credentials, safe to print
    pub fn location(&self) -> String {
        match self {
            RemoteConfig::Webdav { url, .. } => url.clone(),
            RemoteConfig::Local { root } => root.display().to_string(),
        }
    }
}

/// Root configuration document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub timeouts: NetworkTimeouts,

    #[serde(default)]
    pub remotes: BTreeMap<String, RemoteConfig>,
}

impl Config {
    pub fn remote(&self, name: &str) -> Result<&RemoteConfig> {
        self.remotes
            .get(name)
            .ok_or_else(|| Error::Config(format!("remote '{name}' is not configured")))
    }
}

/// Loads and stores the configuration file
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Locate the configuration file
    ///
    /// `$CA_CONFIG_DIR` wins, otherwise the platform config directory is used.
    pub fn new() -> Result<Self> {
        let dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .ok_or_else(|| Error::Config("cannot determine config directory".to_string()))?
                .join("cloud-access"),
        };
        Ok(Self::with_path(dir.join(CONFIG_FILE)))
    }

    /// Use an explicit configuration file
    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the configuration, falling back to defaults when no file exists
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            tracing::debug!(path = %self.config_path.display(), "No config file, using defaults");
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&self.config_path)?;
        toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "failed to parse {}: {e}",
                self.config_path.display()
            ))
        })
    }

    /// Persist the configuration, creating parent directories as needed
    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(&self.config_path, content)?;
        tracing::debug!(path = %self.config_path.display(), "Saved config");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("config.toml"));
        let config = manager.load().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.timeouts.connect(), Duration::from_secs(30));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("nested").join("config.toml"));

        let mut config = Config::default();
        config.remotes.insert(
            "nextcloud".to_string(),
            RemoteConfig::Webdav {
                url: "https://cloud.example.com/remote.php/webdav".to_string(),
                username: "foo".to_string(),
                password: "bar".to_string(),
            },
        );
        config.remotes.insert(
            "home".to_string(),
            RemoteConfig::Local {
                root: PathBuf::from("/tmp/home"),
            },
        );
        manager.save(&config).unwrap();

        let loaded = manager.load().unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.remote("home").unwrap().kind(), "local");
        assert!(matches!(loaded.remote("missing"), Err(Error::Config(_))));
    }

    #[test]
    fn test_partial_timeouts() {
        let config: Config = toml::from_str(
            r#"
            [timeouts]
            read_secs = 5

            [remotes.dav]
            type = "webdav"
            url = "http://localhost:8080/dav"
            username = "u"
            password = "p"
            "#,
        )
        .unwrap();

        assert_eq!(config.timeouts.read(), Duration::from_secs(5));
        assert_eq!(config.timeouts.connect_secs, 30);
        assert_eq!(
            config.remote("dav").unwrap().location(),
            "http://localhost:8080/dav"
        );
    }

    #[test]
    fn test_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "remotes = 42").unwrap();
        let manager = ConfigManager::with_path(&path);
        assert!(matches!(manager.load(), Err(Error::Config(_))));
    }
}
