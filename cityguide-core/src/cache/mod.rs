mod store;

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::discovery::Locator;
use crate::poi::{EnrichedPoi, Poi};

pub use store::{SqlitePoiCache, SqlitePoiCacheBuilder};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("cache path not configured")]
    MissingPath,
    #[error("failed to open cache at {path}: {source}")]
    OpenDatabase {
        path: PathBuf,
        source: rusqlite::Error,
    },
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// One discovery run for a locator, with whatever enrichment succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedDiscovery {
    pub key: String,
    pub locator: Locator,
    pub pois: Vec<Poi>,
    pub enrichment: HashMap<String, EnrichedPoi>,
    pub stored_at: DateTime<Utc>,
}

impl CachedDiscovery {
    pub fn new(
        locator: Locator,
        pois: Vec<Poi>,
        enrichment: HashMap<String, EnrichedPoi>,
    ) -> Self {
        Self {
            key: locator.cache_key(),
            locator,
            pois,
            enrichment,
            stored_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub entries: Vec<CachedDiscovery>,
}

impl CacheSnapshot {
    pub fn get(&self, key: &str) -> Option<&CachedDiscovery> {
        self.entries.iter().find(|entry| entry.key == key)
    }

    pub fn for_locator(&self, locator: &Locator) -> Option<&CachedDiscovery> {
        self.get(&locator.cache_key())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStatistics {
    pub entries: usize,
    pub pois: usize,
    pub enriched: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub expired_removed: usize,
    pub remaining: usize,
}

/// Persistent store for discovery results, used at startup and shutdown.
pub trait PoiCache: Send + Sync {
    fn load(&self) -> CacheResult<CacheSnapshot>;
    fn save(&self, entry: &CachedDiscovery) -> CacheResult<()>;
    fn clear_all(&self) -> CacheResult<usize>;
    fn maintain(&self) -> CacheResult<MaintenanceReport>;
    fn statistics(&self) -> CacheResult<CacheStatistics>;
}
