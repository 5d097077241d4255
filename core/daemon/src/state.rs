//! State shared by every daemon connection.
//!
//! The session monitor is the only writer of auth status; connections read
//! it, trigger checks through it, and touch the entity caches directly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use warden_core::{
    AuthStatusRecord, CacheEntry, Folder, PutOutcome, Resource, SessionCaches, SessionMonitor,
    SurfaceActivator,
};
use warden_daemon_protocol::{CacheInvalidation, CacheKind, CacheLookup, CacheWrite, ErrorInfo};

pub struct SharedState {
    monitor: Arc<SessionMonitor>,
    caches: SessionCaches,
    activator: Arc<SurfaceActivator>,
    auth_configured: bool,
    started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    #[serde(flatten)]
    pub record: AuthStatusRecord,
    pub signed_in: bool,
    pub monitor_running: bool,
    pub check_interval_ms: u64,
    pub auth_configured: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub resources: usize,
    pub folders: usize,
}

impl SharedState {
    pub fn new(
        monitor: Arc<SessionMonitor>,
        caches: SessionCaches,
        activator: Arc<SurfaceActivator>,
        auth_configured: bool,
    ) -> Self {
        Self {
            monitor,
            caches,
            activator,
            auth_configured,
            started_at: Utc::now(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn status_snapshot(&self) -> StatusSnapshot {
        let record = self.monitor.status();
        let check_interval_ms =
            u64::try_from(self.monitor.interval().as_millis()).unwrap_or(u64::MAX);
        StatusSnapshot {
            signed_in: record.phase.is_signed_in(),
            record,
            monitor_running: self.monitor.is_running(),
            check_interval_ms,
            auth_configured: self.auth_configured,
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            resources: self.caches.resources.len(),
            folders: self.caches.folders.len(),
        }
    }

    pub async fn active_surfaces(&self) -> Vec<String> {
        self.activator.active_surfaces().await
    }

    /// Runs one check and starts the loop if the session is signed in.
    /// Returns `None` when no server is configured.
    pub async fn check_now(&self) -> Option<AuthStatusRecord> {
        if !self.auth_configured {
            return None;
        }
        Some(self.monitor.check_then_start().await)
    }

    pub fn cache_get(&self, lookup: &CacheLookup) -> Result<Option<Value>, ErrorInfo> {
        match lookup.cache {
            CacheKind::Resources => entry_to_value(self.caches.resources.entry(&lookup.key)),
            CacheKind::Folders => entry_to_value(self.caches.folders.entry(&lookup.key)),
        }
    }

    pub fn cache_put(&self, write: CacheWrite) -> Result<PutOutcome, ErrorInfo> {
        match write.cache {
            CacheKind::Resources => {
                let resource: Resource = decode_entity(write.cache, write.value)?;
                ensure_key_matches(&write.key, &resource.id)?;
                Ok(self
                    .caches
                    .resources
                    .put(&write.key, resource, write.version))
            }
            CacheKind::Folders => {
                let folder: Folder = decode_entity(write.cache, write.value)?;
                ensure_key_matches(&write.key, &folder.id)?;
                Ok(self.caches.folders.put(&write.key, folder, write.version))
            }
        }
    }

    /// Returns whether an entry was removed. Clearing a whole cache is
    /// reserved for session end.
    pub fn cache_invalidate(&self, invalidation: &CacheInvalidation) -> bool {
        match invalidation.cache {
            CacheKind::Resources => self.caches.resources.invalidate(&invalidation.key),
            CacheKind::Folders => self.caches.folders.invalidate(&invalidation.key),
        }
    }
}

fn entry_to_value<T: Serialize>(
    entry: Option<CacheEntry<T>>,
) -> Result<Option<Value>, ErrorInfo> {
    entry
        .map(|entry| {
            serde_json::to_value(entry).map_err(|err| {
                ErrorInfo::new(
                    "serialization_error",
                    format!("Failed to serialize cache entry: {}", err),
                )
            })
        })
        .transpose()
}

fn decode_entity<T: serde::de::DeserializeOwned>(
    cache: CacheKind,
    value: Value,
) -> Result<T, ErrorInfo> {
    serde_json::from_value(value).map_err(|err| {
        ErrorInfo::new(
            "invalid_params",
            format!("value is not a valid {} entry: {}", cache.as_str(), err),
        )
    })
}

fn ensure_key_matches(key: &str, id: &str) -> Result<(), ErrorInfo> {
    if key != id {
        return Err(ErrorInfo::new(
            "invalid_params",
            format!("key {} does not match value id {}", key, id),
        ));
    }
    Ok(())
}
