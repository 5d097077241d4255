//! Local caches of domain entities (resources and folders).
//!
//! Caches never fetch. An external collaborator queries upstream and calls
//! [`EntityCache::put`]; the session monitor clears everything when the
//! session ends; upstream change notifications drop single keys.
//!
//! Each write carries a version. A write whose version is not newer than the
//! stored one is dropped, so a slow fetch that lands after a fresh one cannot
//! roll an entry back.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry<T> {
    pub key: String,
    pub value: T,
    pub fetched_at: DateTime<Utc>,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    /// Dropped: the cache already holds this version or a newer one.
    Stale { stored_version: u64 },
}

pub struct EntityCache<T> {
    name: &'static str,
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
}

impl<T: Clone> EntityCache<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the cached value regardless of age; freshness is the caller's call.
    pub fn get(&self, key: &str) -> Option<T> {
        // Recover from poisoning - cached entities can always be refetched
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn entry(&self, key: &str) -> Option<CacheEntry<T>> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.get(key).cloned()
    }

    /// Stores `value` unless the cache already holds `version` or newer for `key`.
    ///
    /// The version comparison and the insert happen under one write lock.
    pub fn put(&self, key: &str, value: T, version: u64) -> PutOutcome {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(existing) = entries.get(key) {
            if version <= existing.version {
                debug!(
                    cache = self.name,
                    key,
                    version,
                    stored_version = existing.version,
                    "Dropping stale cache write"
                );
                return PutOutcome::Stale {
                    stored_version: existing.version,
                };
            }
        }

        entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                value,
                fetched_at: Utc::now(),
                version,
            },
        );
        PutOutcome::Stored
    }

    pub fn invalidate(&self, key: &str) -> bool {
        // Recover from poisoning - invalidation clears corrupt data anyway
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.remove(key).is_some()
    }

    pub fn invalidate_all(&self) -> usize {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let cleared = entries.len();
        entries.clear();
        cleared
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .map(|entries| entries.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}

pub type ResourceCache = EntityCache<Resource>;
pub type FolderCache = EntityCache<Folder>;

/// The caches the session monitor clears when a session ends.
#[derive(Clone)]
pub struct SessionCaches {
    pub resources: Arc<ResourceCache>,
    pub folders: Arc<FolderCache>,
}

impl SessionCaches {
    pub fn new() -> Self {
        Self {
            resources: Arc::new(ResourceCache::new("resources")),
            folders: Arc::new(FolderCache::new("folders")),
        }
    }

    /// Clears both caches. Returns how many entries were dropped in total.
    ///
    /// Resources are cleared before folders, each under its own lock, so a
    /// reader may briefly see empty resources next to full folders. Nothing
    /// reads the two as a pair, and folders only carry names and parents.
    pub fn invalidate_all(&self) -> usize {
        self.resources.invalidate_all() + self.folders.invalidate_all()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.folders.is_empty()
    }
}

impl Default for SessionCaches {
    fn default() -> Self {
        Self::new()
    }
}
