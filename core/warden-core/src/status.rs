//! Persisted auth status: the last known session phase and the check history
//! that produced it.
//!
//! [`AuthStatusStore`] is the only owner of [`AuthStatusRecord`]. It is read by
//! anyone and written only by the session monitor, one check at a time.
//!
//! # File Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "record": {
//!     "phase": "authenticated",
//!     "last_checked_at": "2026-01-31T00:00:00Z",
//!     "last_success_at": "2026-01-31T00:00:00Z",
//!     "consecutive_failures": 0
//!   }
//! }
//! ```
//!
//! Empty, corrupt and wrong-version files load as "no record", so a damaged
//! file costs one fresh check rather than the daemon.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{Result, WardenError};
use crate::phase::{next_phase, CheckOutcome, SessionPhase};

const STATUS_FILE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthStatusRecord {
    pub phase: SessionPhase,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub consecutive_failures: u32,
}

/// Load/save of the status record across process restarts.
pub trait StatusPersistence: Send + Sync {
    fn load(&self) -> Result<Option<AuthStatusRecord>>;
    fn save(&self, record: &AuthStatusRecord) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// File-backed persistence
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize, Deserialize)]
struct StatusFile {
    version: u32,
    record: AuthStatusRecord,
}

pub struct JsonFileStatusPersistence {
    path: PathBuf,
}

impl JsonFileStatusPersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatusPersistence for JsonFileStatusPersistence {
    fn load(&self) -> Result<Option<AuthStatusRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(WardenError::Io {
                    context: "reading auth status file".to_string(),
                    source: err,
                })
            }
        };

        if content.trim().is_empty() {
            warn!(path = %self.path.display(), "Empty auth status file; starting fresh");
            return Ok(None);
        }

        match serde_json::from_str::<StatusFile>(&content) {
            Ok(file) if file.version == STATUS_FILE_VERSION => Ok(Some(file.record)),
            Ok(file) => {
                warn!(
                    version = file.version,
                    expected = STATUS_FILE_VERSION,
                    "Unsupported auth status file version; starting fresh"
                );
                Ok(None)
            }
            Err(err) => {
                warn!(error = %err, "Failed to parse auth status file; starting fresh");
                Ok(None)
            }
        }
    }

    fn save(&self, record: &AuthStatusRecord) -> Result<()> {
        let parent = self.path.parent().ok_or_else(|| {
            WardenError::Persistence("auth status path has no parent directory".to_string())
        })?;
        fs::create_dir_all(parent).map_err(|err| WardenError::Io {
            context: "creating auth status directory".to_string(),
            source: err,
        })?;

        let file = StatusFile {
            version: STATUS_FILE_VERSION,
            record: record.clone(),
        };
        let content = serde_json::to_string_pretty(&file).map_err(|err| WardenError::Json {
            context: "serializing auth status".to_string(),
            source: err,
        })?;

        let mut temp_file = NamedTempFile::new_in(parent).map_err(|err| WardenError::Io {
            context: "creating temp auth status file".to_string(),
            source: err,
        })?;
        temp_file
            .write_all(content.as_bytes())
            .and_then(|_| temp_file.flush())
            .map_err(|err| WardenError::Io {
                context: "writing temp auth status file".to_string(),
                source: err,
            })?;
        temp_file
            .persist(&self.path)
            .map_err(|err| WardenError::Io {
                context: "committing auth status file".to_string(),
                source: err.error,
            })?;
        Ok(())
    }
}

/// Keeps the record in memory only. Used by tests and as the fallback when no
/// storage root can be resolved.
#[derive(Default)]
pub struct MemoryStatusPersistence {
    record: Mutex<Option<AuthStatusRecord>>,
}

impl MemoryStatusPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: AuthStatusRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }

    pub fn saved(&self) -> Option<AuthStatusRecord> {
        self.record
            .lock()
            .map(|record| record.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl StatusPersistence for MemoryStatusPersistence {
    fn load(&self) -> Result<Option<AuthStatusRecord>> {
        Ok(self.saved())
    }

    fn save(&self, record: &AuthStatusRecord) -> Result<()> {
        let mut slot = self
            .record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(record.clone());
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store
// ═══════════════════════════════════════════════════════════════════════════════

pub struct AuthStatusStore {
    record: RwLock<AuthStatusRecord>,
    persistence: Box<dyn StatusPersistence>,
    grace_failures: u32,
}

impl AuthStatusStore {
    /// Loads the persisted record. A load failure leaves the store at
    /// `Unknown`; the daemon keeps running on in-memory state.
    pub fn open(persistence: Box<dyn StatusPersistence>, grace_failures: u32) -> Self {
        let record = match persistence.load() {
            Ok(Some(record)) => {
                debug!(
                    phase = %record.phase,
                    consecutive_failures = record.consecutive_failures,
                    "Loaded persisted auth status"
                );
                record
            }
            Ok(None) => AuthStatusRecord::default(),
            Err(err) => {
                warn!(error = %err, "Failed to load auth status; starting from unknown");
                AuthStatusRecord::default()
            }
        };

        Self {
            record: RwLock::new(record),
            persistence,
            grace_failures,
        }
    }

    pub fn grace_failures(&self) -> u32 {
        self.grace_failures
    }

    pub fn read(&self) -> AuthStatusRecord {
        self.record
            .read()
            .map(|record| record.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// The check call returned. `authenticated` is its answer.
    pub fn record_success(&self, authenticated: bool, at: DateTime<Utc>) -> AuthStatusRecord {
        let outcome = if authenticated {
            CheckOutcome::Authenticated
        } else {
            CheckOutcome::NotAuthenticated
        };
        self.apply(outcome, at)
    }

    /// The check call itself failed (transport or service unavailable).
    pub fn record_failure(&self, at: DateTime<Utc>) -> AuthStatusRecord {
        self.apply(CheckOutcome::TransportFailure, at)
    }

    // The new record is computed and swapped in under the write lock, so
    // readers see either the old record or the new one. Persisting happens
    // after the guard is dropped; the monitor's check gate keeps writers in
    // order, so saves land in the same order as the swaps.
    fn apply(&self, outcome: CheckOutcome, at: DateTime<Utc>) -> AuthStatusRecord {
        let updated = {
            let mut guard = self
                .record
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            let mut updated = guard.clone();
            updated.last_checked_at = Some(at);
            match outcome {
                CheckOutcome::Authenticated => {
                    updated.consecutive_failures = 0;
                    updated.last_success_at = Some(at);
                }
                CheckOutcome::NotAuthenticated => {
                    updated.consecutive_failures = 0;
                }
                CheckOutcome::TransportFailure => {
                    updated.consecutive_failures =
                        updated.consecutive_failures.saturating_add(1);
                }
            }
            updated.phase = next_phase(
                guard.phase,
                outcome,
                updated.consecutive_failures,
                self.grace_failures,
            );
            *guard = updated.clone();
            updated
        };

        if let Err(err) = self.persistence.save(&updated) {
            warn!(error = %err, phase = %updated.phase, "Failed to persist auth status");
        }
        updated
    }
}
