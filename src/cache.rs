//! Local key/value cache with a manual time-to-live wrapper.
//!
//! Values are stored as JSON documents of the form
//! `{"expiry": <unix millis or null>, "data": <payload>}`. A `null` expiry means the
//! entry stays valid until the caller overwrites or removes it.
//!
//! Storage and serialization failures are logged and swallowed: a broken cache
//! behaves like an empty one.

use chrono::{Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Key for the cached category list
pub const CATEGORIES_KEY: &str = "categories";
pub const PLAYER1_NAME_KEY: &str = "player1_name";
pub const PLAYER2_NAME_KEY: &str = "player2_name";

/// Upper bound for `CATEGORY_CACHE_TTL_HOURS` (ten years)
const MAX_CATEGORY_TTL_HOURS: i64 = 24 * 365 * 10;

/// Key for the cached question list of a category
pub fn questions_key(category_id: &str) -> String {
    format!("questions_{}", category_id)
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("storage failure: {0}")]
    Storage(String),

    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid cache key: {0}")]
    InvalidKey(String),
}

/// A string-keyed, string-valued storage medium
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), CacheError>;
    fn remove_item(&self, key: &str) -> Result<(), CacheError>;
}

/// Process-local storage, lost on restart
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, CacheError> {
        let items = self
            .items
            .lock()
            .map_err(|e| CacheError::Storage(e.to_string()))?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut items = self
            .items
            .lock()
            .map_err(|e| CacheError::Storage(e.to_string()))?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), CacheError> {
        let mut items = self
            .items
            .lock()
            .map_err(|e| CacheError::Storage(e.to_string()))?;
        items.remove(key);
        Ok(())
    }
}

/// One JSON file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, CacheError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, CacheError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::Storage(format!("{}: {}", path.display(), e))),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| CacheError::Storage(format!("{}: {}", self.dir.display(), e)))?;
        std::fs::write(&path, value)
            .map_err(|e| CacheError::Storage(format!("{}: {}", path.display(), e)))
    }

    fn remove_item(&self, key: &str) -> Result<(), CacheError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Storage(format!("{}: {}", path.display(), e))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedEntry<T> {
    /// Unix timestamp in milliseconds, `None` = no expiry
    expiry: Option<i64>,
    data: T,
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory for the file-backed store (None = in-memory)
    pub dir: Option<PathBuf>,
    /// Time-to-live for the category list
    pub category_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            category_ttl: Duration::hours(24),
        }
    }
}

impl CacheConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let dir = std::env::var("CACHE_DIR").ok().and_then(|dir| {
            let trimmed = dir.trim();
            (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
        });

        let category_ttl = std::env::var("CATEGORY_CACHE_TTL_HOURS")
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|hours| *hours > 0)
            .and_then(|hours| Duration::try_hours(hours.min(MAX_CATEGORY_TTL_HOURS)))
            .unwrap_or_else(|| Duration::hours(24));

        Self { dir, category_ttl }
    }

    /// Build the cache this configuration describes
    pub fn build_cache(&self) -> LocalCache {
        match &self.dir {
            Some(dir) => {
                tracing::info!("Using file cache at {}", dir.display());
                LocalCache::new(Arc::new(FileStore::new(dir.clone())))
            }
            None => {
                tracing::info!("Using in-memory cache");
                LocalCache::in_memory()
            }
        }
    }
}

/// JSON cache over a [`KeyValueStore`]
#[derive(Clone)]
pub struct LocalCache {
    store: Arc<dyn KeyValueStore>,
}

impl LocalCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Returns the payload if an entry exists, parses, and has not expired.
    /// Expired entries are left in place; callers overwrite them on refetch.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get_item(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Error loading {} from cache: {}", key, e);
                return None;
            }
        };

        let entry: CachedEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Discarding unparseable cache entry {}: {}", key, e);
                return None;
            }
        };

        if let Some(expiry) = entry.expiry {
            if Utc::now().timestamp_millis() >= expiry {
                tracing::debug!("Cache entry {} expired", key);
                return None;
            }
        }

        Some(entry.data)
    }

    /// Store a payload, replacing any prior entry. `ttl = None` never expires.
    /// A TTL that overflows the clock skips the write.
    pub fn put<T: Serialize>(&self, key: &str, payload: &T, ttl: Option<Duration>) {
        let expiry = match ttl {
            None => None,
            Some(ttl) => match Utc::now().checked_add_signed(ttl) {
                Some(at) => Some(at.timestamp_millis()),
                None => {
                    tracing::warn!("TTL for {} out of range, not caching", key);
                    return;
                }
            },
        };
        let entry = CachedEntry {
            expiry,
            data: payload,
        };

        let result = serde_json::to_string(&entry)
            .map_err(CacheError::from)
            .and_then(|serialized| self.store.set_item(key, &serialized));

        if let Err(e) = result {
            tracing::warn!("Error saving {} to cache: {}", key, e);
        }
    }

    pub fn remove(&self, key: &str) {
        if let Err(e) = self.store.remove_item(key) {
            tracing::warn!("Error removing {} from cache: {}", key, e);
        }
    }
}
