use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use tracing::{debug, info};

use super::{
    CacheError, CacheResult, CacheSnapshot, CacheStatistics, CachedDiscovery, MaintenanceReport,
    PoiCache,
};
use crate::config::CacheSection;
use crate::sqlite::configure_connection;

const CACHE_SCHEMA: &str = include_str!("../../../sql/cache.sql");

#[derive(Debug, Clone)]
pub struct SqlitePoiCacheBuilder {
    path: Option<PathBuf>,
    ttl: Duration,
    read_only: bool,
    create_if_missing: bool,
}

impl Default for SqlitePoiCacheBuilder {
    fn default() -> Self {
        Self {
            path: None,
            ttl: Duration::hours(168),
            read_only: false,
            create_if_missing: true,
        }
    }
}

impl SqlitePoiCacheBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl_hours(self, hours: u64) -> Self {
        self.ttl(Duration::hours(hours.min(i64::MAX as u64) as i64))
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn build(self) -> CacheResult<SqlitePoiCache> {
        let path = self.path.ok_or(CacheError::MissingPath)?;
        let mut flags = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };

        if !self.read_only && self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }

        Ok(SqlitePoiCache {
            path,
            flags,
            ttl: self.ttl,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SqlitePoiCache {
    path: PathBuf,
    flags: OpenFlags,
    ttl: Duration,
}

impl SqlitePoiCache {
    pub fn builder() -> SqlitePoiCacheBuilder {
        SqlitePoiCacheBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> CacheResult<Self> {
        SqlitePoiCacheBuilder::new().path(path).build()
    }

    pub fn from_section(section: &CacheSection, path: impl AsRef<Path>) -> CacheResult<Self> {
        SqlitePoiCacheBuilder::new()
            .path(path)
            .ttl_hours(section.ttl_hours)
            .build()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn open(&self) -> CacheResult<Connection> {
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            CacheError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        configure_connection(&conn).map_err(|source| CacheError::OpenDatabase {
            path: self.path.clone(),
            source,
        })?;
        Ok(conn)
    }

    pub fn initialize(&self) -> CacheResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = self.open()?;
        conn.execute_batch(CACHE_SCHEMA)?;
        Ok(())
    }

    pub fn fetch(&self, key: &str) -> CacheResult<Option<CachedDiscovery>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT cache_key, locator, pois, enrichment, stored_at
             FROM poi_cache WHERE cache_key = ?1",
        )?;
        let raw = stmt.query_row([key], RawEntry::from_row).optional()?;
        raw.map(RawEntry::decode).transpose()
    }

    /// Entries newer than the TTL relative to `now`.
    pub fn is_fresh(&self, entry: &CachedDiscovery, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.stored_at) <= self.ttl
    }

    pub fn maintain_at(&self, now: DateTime<Utc>) -> CacheResult<MaintenanceReport> {
        let cutoff = now - self.ttl;
        let conn = self.open()?;
        let removed = conn.execute("DELETE FROM poi_cache WHERE stored_at < ?1", [cutoff])?;
        let remaining: i64 =
            conn.query_row("SELECT COUNT(*) FROM poi_cache", [], |row| row.get(0))?;
        info!(removed, remaining, cutoff = %cutoff, "poi cache maintenance finished");
        Ok(MaintenanceReport {
            expired_removed: removed,
            remaining: remaining.max(0) as usize,
        })
    }
}

impl PoiCache for SqlitePoiCache {
    fn load(&self) -> CacheResult<CacheSnapshot> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT cache_key, locator, pois, enrichment, stored_at
             FROM poi_cache ORDER BY stored_at DESC",
        )?;
        let raw = stmt
            .query_map([], RawEntry::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        let entries = raw
            .into_iter()
            .map(RawEntry::decode)
            .collect::<CacheResult<Vec<_>>>()?;
        debug!(entries = entries.len(), path = %self.path.display(), "poi cache loaded");
        Ok(CacheSnapshot { entries })
    }

    fn save(&self, entry: &CachedDiscovery) -> CacheResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO poi_cache (cache_key, locator, pois, enrichment, poi_count, enriched_count, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(cache_key) DO UPDATE SET
                locator = excluded.locator,
                pois = excluded.pois,
                enrichment = excluded.enrichment,
                poi_count = excluded.poi_count,
                enriched_count = excluded.enriched_count,
                stored_at = excluded.stored_at",
            params![
                entry.key,
                serde_json::to_string(&entry.locator)?,
                serde_json::to_string(&entry.pois)?,
                serde_json::to_string(&entry.enrichment)?,
                entry.pois.len() as i64,
                entry.enrichment.len() as i64,
                entry.stored_at,
            ],
        )?;
        debug!(key = %entry.key, pois = entry.pois.len(), "poi cache entry saved");
        Ok(())
    }

    fn clear_all(&self) -> CacheResult<usize> {
        let conn = self.open()?;
        let removed = conn.execute("DELETE FROM poi_cache", [])?;
        info!(removed, "poi cache cleared");
        Ok(removed)
    }

    fn maintain(&self) -> CacheResult<MaintenanceReport> {
        self.maintain_at(Utc::now())
    }

    fn statistics(&self) -> CacheResult<CacheStatistics> {
        let conn = self.open()?;
        let stats = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(poi_count), 0), COALESCE(SUM(enriched_count), 0),
                    MIN(stored_at), MAX(stored_at)
             FROM poi_cache",
            [],
            |row| {
                Ok(CacheStatistics {
                    entries: row.get::<_, i64>(0)?.max(0) as usize,
                    pois: row.get::<_, i64>(1)?.max(0) as usize,
                    enriched: row.get::<_, i64>(2)?.max(0) as usize,
                    oldest: row.get::<_, Option<DateTime<Utc>>>(3)?,
                    newest: row.get::<_, Option<DateTime<Utc>>>(4)?,
                })
            },
        )?;
        Ok(stats)
    }
}

struct RawEntry {
    key: String,
    locator: String,
    pois: String,
    enrichment: String,
    stored_at: DateTime<Utc>,
}

impl RawEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            locator: row.get(1)?,
            pois: row.get(2)?,
            enrichment: row.get(3)?,
            stored_at: row.get(4)?,
        })
    }

    fn decode(self) -> CacheResult<CachedDiscovery> {
        Ok(CachedDiscovery {
            key: self.key,
            locator: serde_json::from_str(&self.locator)?,
            pois: serde_json::from_str(&self.pois)?,
            enrichment: serde_json::from_str(&self.enrichment)?,
            stored_at: self.stored_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::Locator;
    use crate::poi::{Coordinate, EnrichedPoi, EnrichmentStatus, Poi, PoiCategory};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn setup_cache() -> (TempDir, SqlitePoiCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = SqlitePoiCache::builder()
            .path(dir.path().join("nested").join("poi_cache.sqlite"))
            .ttl_hours(24)
            .build()
            .unwrap();
        cache.initialize().unwrap();
        (dir, cache)
    }

    fn entry(city: &str) -> CachedDiscovery {
        let poi = Poi::new("node/1", "Kaiserburg", Coordinate::new(49.4578, 11.0758), PoiCategory::Castle);
        let mut enrichment = HashMap::new();
        enrichment.insert(
            poi.id.clone(),
            EnrichedPoi {
                poi_id: poi.id.clone(),
                summary: Some("Imperial castle".into()),
                image_url: None,
                link: Some("https://de.wikipedia.org/wiki/Kaiserburg_Nürnberg".into()),
                status: EnrichmentStatus::Succeeded,
            },
        );
        CachedDiscovery::new(Locator::city(city), vec![poi], enrichment)
    }

    #[test]
    fn save_and_load_restore_entries() {
        let (_dir, cache) = setup_cache();
        let saved = entry("Nürnberg");
        cache.save(&saved).unwrap();

        let snapshot = cache.load().unwrap();
        assert_eq!(snapshot.len(), 1);
        let restored = snapshot.for_locator(&Locator::city("nürnberg")).unwrap();
        assert_eq!(restored.pois, saved.pois);
        assert_eq!(restored.enrichment, saved.enrichment);
        assert_eq!(cache.fetch(&saved.key).unwrap().unwrap().key, saved.key);
        assert!(cache.fetch("city:atlantis").unwrap().is_none());
    }

    #[test]
    fn save_replaces_existing_key() {
        let (_dir, cache) = setup_cache();
        cache.save(&entry("Nürnberg")).unwrap();
        let mut updated = entry("Nürnberg");
        updated.pois.clear();
        updated.enrichment.clear();
        cache.save(&updated).unwrap();

        let stats = cache.statistics().unwrap();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.pois, 0);
        assert_eq!(stats.enriched, 0);
    }

    #[test]
    fn maintain_removes_only_expired_rows() {
        let (_dir, cache) = setup_cache();
        let mut stale = entry("Fürth");
        stale.stored_at = Utc::now() - Duration::hours(48);
        cache.save(&stale).unwrap();
        cache.save(&entry("Nürnberg")).unwrap();

        assert!(!cache.is_fresh(&stale, Utc::now()));
        let report = cache.maintain().unwrap();
        assert_eq!(report.expired_removed, 1);
        assert_eq!(report.remaining, 1);
        assert!(cache.load().unwrap().for_locator(&Locator::city("Fürth")).is_none());
    }

    #[test]
    fn statistics_and_clear() {
        let (_dir, cache) = setup_cache();
        assert_eq!(cache.statistics().unwrap(), CacheStatistics::default());

        cache.save(&entry("Nürnberg")).unwrap();
        cache.save(&entry("Bamberg")).unwrap();
        let stats = cache.statistics().unwrap();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.pois, 2);
        assert_eq!(stats.enriched, 2);
        assert!(stats.oldest.is_some());
        assert!(stats.oldest <= stats.newest);

        assert_eq!(cache.clear_all().unwrap(), 2);
        assert!(cache.load().unwrap().is_empty());
    }

    #[test]
    fn builder_requires_path() {
        assert!(matches!(
            SqlitePoiCache::builder().build(),
            Err(CacheError::MissingPath)
        ));
    }
}
