use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::provider::{EnrichmentContext, EnrichmentProvider};
use crate::config::EnrichmentSection;
use crate::network::RateLimiter;
use crate::poi::{EnrichedPoi, EnrichmentStatus, Poi};

pub const DEFAULT_BATCH_SIZE: usize = 5;

#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub batch_size: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl From<&EnrichmentSection> for EnrichmentConfig {
    fn from(section: &EnrichmentSection) -> Self {
        Self {
            batch_size: section.batch_size.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentItemFailure {
    pub poi_id: String,
    pub poi_name: String,
    pub status: EnrichmentStatus,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentReport {
    /// Succeeded items only, keyed by POI id.
    pub enriched: HashMap<String, EnrichedPoi>,
    pub failures: Vec<EnrichmentItemFailure>,
    pub processed: usize,
    pub duration_ms: u64,
}

/// Fraction of processed items in `[0, 1]`, non-decreasing within a run.
#[derive(Debug, Clone)]
pub struct EnrichmentProgress {
    sender: Arc<watch::Sender<f64>>,
}

impl Default for EnrichmentProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl EnrichmentProgress {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(0.0);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.sender.subscribe()
    }

    pub fn value(&self) -> f64 {
        *self.sender.borrow()
    }

    pub fn reset(&self) {
        self.sender.send_replace(0.0);
    }

    fn advance(&self, done: usize, total: usize) {
        let next = if total == 0 || done >= total {
            1.0
        } else {
            done as f64 / total as f64
        };
        self.sender.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        });
    }
}

pub struct EnrichmentPipeline {
    provider: Arc<dyn EnrichmentProvider>,
    limiter: RateLimiter,
    config: EnrichmentConfig,
}

impl EnrichmentPipeline {
    pub fn new(
        provider: Arc<dyn EnrichmentProvider>,
        limiter: RateLimiter,
        config: EnrichmentConfig,
    ) -> Self {
        Self {
            provider,
            limiter,
            config,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size.max(1)
    }

    /// Batches run in input order; items inside a batch run concurrently and
    /// are all settled before the next batch starts.
    pub async fn enrich(
        &self,
        pois: &[Poi],
        context: &EnrichmentContext,
        progress: &EnrichmentProgress,
    ) -> EnrichmentReport {
        let start = Instant::now();
        let total = pois.len();
        let mut report = EnrichmentReport::default();
        progress.reset();
        if total == 0 {
            progress.advance(0, 0);
            return report;
        }

        let mut seen = HashSet::new();
        let batch_count = total.div_ceil(self.batch_size());
        for (batch_index, batch) in pois.chunks(self.batch_size()).enumerate() {
            if batch_index > 0 {
                self.limiter.background_tick().await;
            }

            let mut in_flight = FuturesUnordered::new();
            for poi in batch {
                if !seen.insert(poi.id.as_str()) {
                    report.processed += 1;
                    progress.advance(report.processed, total);
                    continue;
                }
                let provider = Arc::clone(&self.provider);
                in_flight.push(async move { (poi, provider.enrich(poi, context).await) });
            }

            while let Some((poi, outcome)) = in_flight.next().await {
                match outcome {
                    Ok(payload) => {
                        report.enriched.insert(
                            poi.id.clone(),
                            EnrichedPoi {
                                poi_id: poi.id.clone(),
                                summary: payload.summary,
                                image_url: payload.image_url,
                                link: payload.link,
                                status: EnrichmentStatus::Succeeded,
                            },
                        );
                    }
                    Err(err) => {
                        debug!(poi = %poi.name, status = %err.status(), error = %err, "enrichment item failed");
                        report.failures.push(EnrichmentItemFailure {
                            poi_id: poi.id.clone(),
                            poi_name: poi.name.clone(),
                            status: err.status(),
                            message: err.to_string(),
                        });
                    }
                }
                report.processed += 1;
                progress.advance(report.processed, total);
            }
            debug!(batch = batch_index + 1, batches = batch_count, processed = report.processed, "enrichment batch settled");
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        if !report.failures.is_empty() {
            warn!(failed = report.failures.len(), total, "some points of interest could not be enriched");
        }
        info!(
            enriched = report.enriched.len(),
            failed = report.failures.len(),
            total,
            duration_ms = report.duration_ms,
            "enrichment finished"
        );
        report
    }
}
