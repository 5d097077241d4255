//! Storage configuration and path management for Warden.
//!
//! Every file the daemon and its clients share lives under one root
//! (default `~/.warden`, overridable with `WARDEN_HOME`). Tests use
//! [`StorageConfig::with_root`] with a temp directory.

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Result, WardenError};

pub const ROOT_ENV: &str = "WARDEN_HOME";
const ROOT_DIR_NAME: &str = ".warden";

#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl StorageConfig {
    /// Resolves the root from `WARDEN_HOME`, falling back to `~/.warden`.
    pub fn resolve() -> Result<Self> {
        if let Ok(root) = env::var(ROOT_ENV) {
            if !root.trim().is_empty() {
                return Ok(Self::with_root(PathBuf::from(root)));
            }
        }
        let home = dirs::home_dir().ok_or(WardenError::HomeDirNotFound)?;
        Ok(Self::with_root(home.join(ROOT_DIR_NAME)))
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Files
    // ─────────────────────────────────────────────────────────────────────────────

    /// Path to warden.toml (daemon configuration).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("warden.toml")
    }

    /// Path to auth-status.json (persisted session status).
    pub fn auth_status_file(&self) -> PathBuf {
        self.root.join("auth-status.json")
    }

    /// Path to surfaces.json (active UI surfaces, read by UI clients).
    pub fn surfaces_file(&self) -> PathBuf {
        self.root.join("surfaces.json")
    }

    /// Path to the daemon's IPC socket.
    pub fn socket_file(&self) -> PathBuf {
        self.root.join("daemon.sock")
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Directories
    // ─────────────────────────────────────────────────────────────────────────────

    /// Path to logs/ directory (daemon log files).
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}
