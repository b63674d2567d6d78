use clap::Subcommand;
use serde::Serialize;

use cityguide_core::{CacheStatistics, MaintenanceReport, PoiCache};

use crate::{AppContext, DisplayFallback, Result};

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show entry and POI counts
    Stats,
    /// Remove every cached discovery
    Clear,
    /// Drop entries older than the configured TTL
    Maintain,
}

#[derive(Debug, Serialize)]
pub(crate) struct CacheStatsReport {
    pub path: String,
    pub statistics: CacheStatistics,
}

impl DisplayFallback for CacheStatsReport {
    fn display(&self) -> String {
        let stats = &self.statistics;
        let mut lines = vec![
            format!("Cache: {}", self.path),
            format!(
                "  {} entries, {} POIs, {} enriched",
                stats.entries, stats.pois, stats.enriched
            ),
        ];
        if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
            lines.push(format!("  oldest: {}", oldest.to_rfc3339()));
            lines.push(format!("  newest: {}", newest.to_rfc3339()));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CacheClearReport {
    pub removed: usize,
}

impl DisplayFallback for CacheClearReport {
    fn display(&self) -> String {
        format!("Removed {} cached discoveries", self.removed)
    }
}

impl DisplayFallback for MaintenanceReport {
    fn display(&self) -> String {
        format!(
            "Expired entries removed: {} (remaining: {})",
            self.expired_removed, self.remaining
        )
    }
}

impl AppContext {
    pub(crate) fn cache_stats(&self) -> Result<CacheStatsReport> {
        let statistics = self.open_cache()?.statistics()?;
        Ok(CacheStatsReport {
            path: self.cache_path.display().to_string(),
            statistics,
        })
    }

    pub(crate) fn cache_clear(&self) -> Result<CacheClearReport> {
        let removed = self.open_cache()?.clear_all()?;
        Ok(CacheClearReport { removed })
    }

    pub(crate) fn cache_maintain(&self) -> Result<MaintenanceReport> {
        Ok(self.open_cache()?.maintain()?)
    }
}
