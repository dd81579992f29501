//! Application configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use vellum_isolation::{EmbedderPolicy, HostSupport};
use vellum_storage::{origin_root, StoreConfig, DEFAULT_STORE_NAME};

use crate::error::CoreError;
use crate::Result;

/// What to do when the page cannot be cross-origin isolated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Keep working on a store that is lost when the worker stops
    #[default]
    InMemory,
    /// Refuse to start without persistence
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root under which every origin gets its private directory
    pub data_dir: PathBuf,
    /// Origin the page is served from
    pub origin: String,
    /// Database file name
    pub store_name: String,
    /// Whether the host can send the isolation headers itself
    pub host_support: HostSupport,
    pub embedder_policy: EmbedderPolicy,
    pub fallback: FallbackPolicy,
    pub handshake_timeout_ms: u64,
    pub busy_timeout_ms: u64,
}

impl Config {
    pub fn new(data_dir: PathBuf, origin: impl Into<String>) -> Self {
        Self {
            data_dir,
            origin: origin.into(),
            store_name: DEFAULT_STORE_NAME.to_string(),
            host_support: HostSupport::NoCustomHeaders,
            embedder_policy: EmbedderPolicy::RequireCorp,
            fallback: FallbackPolicy::InMemory,
            handshake_timeout_ms: 10_000,
            busy_timeout_ms: 5_000,
        }
    }

    /// Read a JSON config file; missing fields take their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        if config.store_name.trim().is_empty() {
            return Err(CoreError::Config("store_name cannot be empty".to_string()));
        }
        Ok(config)
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("Vellum"))
            .unwrap_or_else(|| PathBuf::from(".vellum"))
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Origin in its serialized `scheme://host[:port]` form
    pub fn normalized_origin(&self) -> Result<String> {
        let origin = url::Url::parse(&self.origin)?.origin();
        if !origin.is_tuple() {
            return Err(CoreError::Config(format!(
                "origin {} is opaque and cannot own storage",
                self.origin
            )));
        }
        Ok(origin.ascii_serialization())
    }

    /// The persistent store for this origin
    pub fn persistent_store(&self) -> Result<StoreConfig> {
        let root = origin_root(&self.data_dir, &self.normalized_origin()?);
        Ok(StoreConfig {
            busy_timeout_ms: self.busy_timeout_ms,
            ..StoreConfig::persistent(root, self.store_name.clone())
        })
    }

    /// The non-persistent store used as fallback
    pub fn memory_store(&self) -> StoreConfig {
        StoreConfig {
            busy_timeout_ms: self.busy_timeout_ms,
            ..StoreConfig::memory(self.store_name.clone())
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::data_dir(), "http://localhost")
    }
}

// Simple dirs implementation for common directories
mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("LOCALAPPDATA").ok().map(PathBuf::from)
        }
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            None
        }
    }
}
