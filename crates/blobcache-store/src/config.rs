use std::path::Path;
use std::time::Duration;

use blobcache_codec::Codec;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Configuration for both store backends, usually read from a TOML file.
///
/// ```toml
/// [sqlite]
/// default_codec = "zstd"
/// busy_timeout_ms = 5000
///
/// [archive]
/// file_mode = 384
/// sync_on_append = true
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub sqlite: SqliteConfig,
    pub archive: ArchiveConfig,
}

impl StoreConfig {
    /// Parse a configuration from TOML text. Missing fields take defaults.
    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        toml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Read and parse a TOML configuration file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Settings for [`SqliteStore`](crate::SqliteStore).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Codec used by `put_file` without `always_compress` and by
    /// [`BlobStore::write`](crate::BlobStore::write).
    pub default_codec: Codec,
    /// How long a connection waits on a lock held by another process.
    pub busy_timeout_ms: u64,
    /// Idle connections kept open for reuse.
    pub max_idle_connections: usize,
}

impl SqliteConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            default_codec: Codec::Zstd,
            busy_timeout_ms: 5_000,
            max_idle_connections: 4,
        }
    }
}

/// Settings for [`ArchiveStore`](crate::ArchiveStore).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Permission bits recorded for entries written by `put_bytes`.
    pub file_mode: u32,
    /// `fsync` the container after every append.
    pub sync_on_append: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            file_mode: 0o600,
            sync_on_append: false,
        }
    }
}
