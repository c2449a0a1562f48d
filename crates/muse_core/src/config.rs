//! Repository configuration (`config.toml`) and identity (`repo.json`).

use crate::error::{MuseError, Result};
use crate::object_store::DEFAULT_COMPRESSION_LEVEL;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding the commit author.
pub const AUTHOR_ENV: &str = "MUSE_AUTHOR";

/// Environment variable overriding the bearer token sent to remotes.
pub const TOKEN_ENV: &str = "MUSE_HUB_TOKEN";

/// Current on-disk format version written to `repo.json`.
pub const FORMAT_VERSION: u32 = 1;

/// Repository configuration stored in `.muse/config.toml`.
///
/// Every table is optional; a missing file loads as defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Author identity.
    #[serde(default)]
    pub user: UserConfig,

    /// Locking and behaviour knobs.
    #[serde(default)]
    pub core: CoreConfig,

    /// Storage-related configuration.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Named remotes (`[remote.origin]`).
    #[serde(default, rename = "remote", skip_serializing_if = "BTreeMap::is_empty")]
    pub remotes: BTreeMap<String, RemoteConfig>,
}

impl Config {
    /// Load configuration from `<muse_root>/config.toml`.
    pub fn load(muse_root: &Path) -> Result<Self> {
        let path = muse_root.join("config.toml");
        if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| MuseError::Config(format!("failed to read config: {}", e)))?;
            toml::from_str(&content)
                .map_err(|e| MuseError::Config(format!("failed to parse config: {}", e)))
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to `<muse_root>/config.toml`.
    pub fn save(&self, muse_root: &Path) -> Result<()> {
        let path = muse_root.join("config.toml");
        let content = toml::to_string_pretty(self)
            .map_err(|e| MuseError::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(&path, content)
            .map_err(|e| MuseError::Config(format!("failed to write config: {}", e)))?;
        Ok(())
    }

    /// Author string for new commits.
    ///
    /// `MUSE_AUTHOR` wins, then `user.name <user.email>`, then `user.name`,
    /// then "unknown".
    pub fn author(&self) -> String {
        if let Ok(author) = std::env::var(AUTHOR_ENV) {
            if !author.trim().is_empty() {
                return author;
            }
        }
        match (&self.user.name, &self.user.email) {
            (Some(name), Some(email)) => format!("{} <{}>", name, email),
            (Some(name), None) => name.clone(),
            _ => "unknown".to_string(),
        }
    }

    /// Looks up a remote by name.
    pub fn remote(&self, name: &str) -> Result<&RemoteConfig> {
        self.remotes
            .get(name)
            .ok_or_else(|| MuseError::RemoteNotFound(name.to_string()))
    }
}

/// Author identity.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UserConfig {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Locking and behaviour knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoreConfig {
    /// How long a writer waits for `.muse/LOCK` before giving up (default: 5000).
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl CoreConfig {
    /// Returns the lock timeout as a Duration.
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Storage-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Compression level for zstd (1-22, default: 3).
    /// Higher values mean better compression but slower performance.
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
}

fn default_compression_level() -> i32 {
    DEFAULT_COMPRESSION_LEVEL
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            compression_level: default_compression_level(),
        }
    }
}

/// A named remote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteConfig {
    /// Full repository URL (`http://hub/repos/<id>`) or a local path.
    pub url: String,
    /// Bearer token; `MUSE_HUB_TOKEN` takes precedence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl RemoteConfig {
    /// Token to send, honouring the environment override.
    pub fn effective_token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.token.clone())
    }
}

/// Repository identity stored in `.muse/repo.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepoInfo {
    /// Random identifier (UUID v4).
    pub repo_id: String,
    /// Creation time, Unix seconds.
    pub created_at: u64,
    /// On-disk format version.
    pub format_version: u32,
}

impl RepoInfo {
    /// Creates identity for a new repository.
    pub fn new(created_at: u64) -> Self {
        Self {
            repo_id: uuid::Uuid::new_v4().to_string(),
            created_at,
            format_version: FORMAT_VERSION,
        }
    }

    /// Reads `<muse_root>/repo.json`.
    pub fn load(muse_root: &Path) -> Result<Self> {
        let path = muse_root.join("repo.json");
        let content = fs::read_to_string(&path)?;
        serde_json::from_str(&content)
            .map_err(|e| MuseError::Config(format!("invalid repo.json: {}", e)))
    }

    /// Writes `<muse_root>/repo.json`.
    pub fn save(&self, muse_root: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| MuseError::Serialization(e.to_string()))?;
        fs::write(muse_root.join("repo.json"), content + "\n")?;
        Ok(())
    }
}
