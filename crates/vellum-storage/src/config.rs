//! Store location

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Well-known file name of the notes database
pub const DEFAULT_STORE_NAME: &str = "vellum.sqlite3";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Backend {
    /// File-backed store inside an origin-private directory
    Persistent { root: PathBuf },
    /// Lives and dies with the worker
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file name within the backend
    pub name: String,
    pub backend: Backend,
    /// How long SQLite waits on a locked file
    pub busy_timeout_ms: u64,
}

impl StoreConfig {
    pub fn persistent(root: PathBuf, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend: Backend::Persistent { root },
            busy_timeout_ms: 5_000,
        }
    }

    pub fn memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend: Backend::Memory,
            busy_timeout_ms: 5_000,
        }
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, Backend::Persistent { .. })
    }

    /// Path of the database file, `None` for in-memory stores
    pub fn path(&self) -> Option<PathBuf> {
        match &self.backend {
            Backend::Persistent { root } => Some(root.join(&self.name)),
            Backend::Memory => None,
        }
    }

    /// Human-readable location reported in the handshake
    pub fn location(&self) -> String {
        match self.path() {
            Some(path) => path.display().to_string(),
            None => format!("memory:{}", self.name),
        }
    }
}

/// Directory private to `origin` under `base`.
///
/// Every character outside `[A-Za-z0-9.-]` maps to `_`, so distinct
/// origins such as `https://a.example` and `http://a.example` never share
/// a directory.
pub fn origin_root(base: &Path, origin: &str) -> PathBuf {
    let key: String = origin
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    base.join("origins").join(key)
}
