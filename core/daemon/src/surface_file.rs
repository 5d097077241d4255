//! Publishes surface state to `surfaces.json` for the UI shell.
//!
//! The shell watches the file and shows whichever surfaces are listed as
//! active. The file also carries the current session phase so toolbar-style
//! consumers can render a badge without talking to the daemon.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;
use warden_core::{SessionPhase, SurfaceControl, WardenError};

const SURFACE_FILE_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceFile {
    pub version: u32,
    pub phase: SessionPhase,
    pub active: BTreeSet<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

pub struct FileSurfaceControl {
    path: PathBuf,
    state: Mutex<SurfaceFile>,
}

impl FileSurfaceControl {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(SurfaceFile {
                version: SURFACE_FILE_VERSION,
                ..SurfaceFile::default()
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrites the file with no active surfaces. Called once at startup so a
    /// file left over from a previous run cannot show a stale surface.
    pub fn reset(&self, phase: SessionPhase) -> Result<(), String> {
        self.update(|file| {
            file.phase = phase;
            file.active.clear();
        })
    }

    pub fn publish_phase(&self, phase: SessionPhase) -> Result<(), String> {
        self.update(|file| file.phase = phase)
    }

    #[cfg(test)]
    fn snapshot(&self) -> SurfaceFile {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Applies `change` and writes the result. On a failed write the in-memory
    /// state is left as it was.
    fn update(&self, change: impl FnOnce(&mut SurfaceFile)) -> Result<(), String> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next = state.clone();
        change(&mut next);
        next.updated_at = Some(Utc::now());
        write_surface_file(&self.path, &next)?;
        *state = next;
        Ok(())
    }
}

#[async_trait]
impl SurfaceControl for FileSurfaceControl {
    async fn enable(&self, name: &str) -> warden_core::Result<()> {
        self.update(|file| {
            file.active.insert(name.to_string());
        })
        .map_err(|details| WardenError::Surface {
            name: name.to_string(),
            details,
        })?;
        debug!(surface = %name, path = %self.path.display(), "Surface enabled");
        Ok(())
    }

    async fn disable(&self, name: &str) -> warden_core::Result<()> {
        self.update(|file| {
            file.active.remove(name);
        })
        .map_err(|details| WardenError::Surface {
            name: name.to_string(),
            details,
        })?;
        debug!(surface = %name, path = %self.path.display(), "Surface disabled");
        Ok(())
    }
}

fn write_surface_file(path: &Path, file: &SurfaceFile) -> Result<(), String> {
    let parent = path
        .parent()
        .ok_or_else(|| "surfaces path has no parent directory".to_string())?;
    fs::create_dir_all(parent)
        .map_err(|err| format!("Failed to create {}: {}", parent.display(), err))?;

    let content = serde_json::to_string_pretty(file)
        .map_err(|err| format!("Failed to serialize surfaces: {}", err))?;
    let mut temp_file = NamedTempFile::new_in(parent)
        .map_err(|err| format!("Failed to create temp surfaces file: {}", err))?;
    temp_file
        .write_all(content.as_bytes())
        .and_then(|_| temp_file.flush())
        .map_err(|err| format!("Failed to write temp surfaces file: {}", err))?;
    temp_file
        .persist(path)
        .map_err(|err| format!("Failed to commit {}: {}", path.display(), err.error))?;
    Ok(())
}
