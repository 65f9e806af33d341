// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! History store configuration
//!
//! Loaded from a TOML file when one is given, then overridden by environment
//! variables:
//! - `HUBHISTORY_BACKEND`: storage backend (`kvbtree` or `memory`)
//! - `HUBHISTORY_DATA_DIR`: directory holding the store file
//! - `HUBHISTORY_CURSOR_LIFESPAN`: cursor inactivity lifespan in seconds
//! - `HUBHISTORY_FLUSH_INTERVAL_MS`: latest-values flush interval

use crate::error::{HistoryError, Result};
use crate::retention::RetentionRule;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File backed in-memory B-tree buckets.
pub const BACKEND_KVBTREE: &str = "kvbtree";
/// In-memory B-tree buckets without persistence.
pub const BACKEND_MEMORY: &str = "memory";

pub const SUPPORTED_BACKENDS: &[&str] = &[BACKEND_KVBTREE, BACKEND_MEMORY];

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HistoryConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cursor: CursorConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Initial retention rules. Empty retains everything.
    #[serde(default)]
    pub retention: Vec<RetentionRule>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Bucket store backend
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Directory of the store file
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Store name, used as the store file name
    #[serde(default = "default_store_name")]
    pub store_name: String,

    /// Delay between background writes of a file backed store
    #[serde(default = "default_autosave_interval_ms")]
    pub autosave_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CursorConfig {
    /// Lifespan of an unused remote cursor
    #[serde(default = "default_cursor_lifespan_secs")]
    pub lifespan_secs: u64,

    /// Maximum number of open remote cursors
    #[serde(default = "default_max_cursors")]
    pub max_cursors: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Interval between writes of changed latest values
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

fn default_backend() -> String {
    BACKEND_KVBTREE.to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./hubhistory-data")
}

fn default_store_name() -> String {
    "history".to_string()
}

fn default_autosave_interval_ms() -> u64 {
    3000
}

fn default_cursor_lifespan_secs() -> u64 {
    60
}

fn default_max_cursors() -> u64 {
    10_000
}

fn default_flush_interval_ms() -> u64 {
    3000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: default_data_dir(),
            store_name: default_store_name(),
            autosave_interval_ms: default_autosave_interval_ms(),
        }
    }
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            lifespan_secs: default_cursor_lifespan_secs(),
            max_cursors: default_max_cursors(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl StorageConfig {
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_millis(self.autosave_interval_ms)
    }

    /// Path of the store file for file backed backends.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.{}", self.store_name, self.backend))
    }
}

impl CursorConfig {
    pub fn lifespan(&self) -> Duration {
        Duration::from_secs(self.lifespan_secs)
    }
}

impl CacheConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl HistoryConfig {
    /// In-memory configuration, mostly for tests.
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.storage.backend = BACKEND_MEMORY.to_string();
        config
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| HistoryError::Config(e.to_string()))
    }

    /// Load configuration with priority: env > file > defaults
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let config = match config_file {
            Some(path) if path.exists() => {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(path)?
            }
            Some(path) => {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
            None => Self::default(),
        };
        let config = config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Override settings from environment variables, looked up through
    /// `lookup`. Unparseable numbers are ignored.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(backend) = lookup("HUBHISTORY_BACKEND") {
            self.storage.backend = backend;
        }
        if let Some(dir) = lookup("HUBHISTORY_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(val) = lookup("HUBHISTORY_CURSOR_LIFESPAN").and_then(|v| v.parse().ok()) {
            self.cursor.lifespan_secs = val;
        }
        if let Some(val) = lookup("HUBHISTORY_FLUSH_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.cache.flush_interval_ms = val;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_BACKENDS.contains(&self.storage.backend.as_str()) {
            return Err(HistoryError::UnsupportedBackend(self.storage.backend.clone()));
        }
        if self.storage.autosave_interval_ms == 0 {
            return Err(HistoryError::Config("storage.autosave_interval_ms must be > 0".into()));
        }
        if self.cursor.max_cursors == 0 {
            return Err(HistoryError::Config("cursor.max_cursors must be > 0".into()));
        }
        if self.cursor.lifespan_secs == 0 {
            return Err(HistoryError::Config("cursor.lifespan_secs must be > 0".into()));
        }
        if self.cache.flush_interval_ms == 0 {
            return Err(HistoryError::Config("cache.flush_interval_ms must be > 0".into()));
        }
        Ok(())
    }
}
