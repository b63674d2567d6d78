use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use clap::Args;
use serde::Serialize;
use tracing::info;

use cityguide_core::discovery::{NominatimGeocoder, OverpassDirectory};
use cityguide_core::enrichment::EnrichmentItemFailure;
use cityguide_core::{
    CachedDiscovery, Coordinate, CurationOrchestrator, DiscoveryClient, DiscoveryConfig,
    EnrichedPoi, EnrichmentConfig, EnrichmentPipeline, Locator, PlanningRequest, Poi, PoiCache,
    PoiCategory, WikipediaEnricher,
};

use crate::{AppContext, AppError, DisplayFallback, Result};

/// Where to search: a city name, or a coordinate plus radius.
#[derive(Args, Debug, Clone)]
pub struct LocatorArgs {
    /// City to search in
    #[arg(long, conflicts_with_all = ["lat", "lon"])]
    pub city: Option<String>,
    /// Latitude of the area center
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    pub lat: Option<f64>,
    /// Longitude of the area center
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    pub lon: Option<f64>,
    /// Search radius in meters for area searches
    #[arg(long, default_value_t = 1500.0)]
    pub radius: f64,
}

impl LocatorArgs {
    pub fn locator(&self) -> Result<Locator> {
        match (&self.city, self.lat, self.lon) {
            (Some(city), _, _) if !city.trim().is_empty() => Ok(Locator::city(city.trim())),
            (_, Some(lat), Some(lon)) => {
                let center = Coordinate::new(lat, lon);
                if !center.is_valid() || !(self.radius > 0.0) {
                    return Err(AppError::InvalidArguments(format!(
                        "invalid area {center} with radius {}",
                        self.radius
                    )));
                }
                Ok(Locator::area(center, self.radius))
            }
            _ => Err(AppError::InvalidArguments(
                "either --city or --lat/--lon is required".to_string(),
            )),
        }
    }
}

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    #[command(flatten)]
    pub locator: LocatorArgs,
    /// Restrict to a category (repeatable, defaults to all)
    #[arg(long = "category", value_name = "CATEGORY")]
    pub categories: Vec<PoiCategory>,
    /// Fetch Wikipedia summaries for the results
    #[arg(long)]
    pub enrich: bool,
    /// Serve from and store into the local cache
    #[arg(long)]
    pub use_cache: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct DiscoveryReport {
    pub locator: String,
    pub source: &'static str,
    pub pois: Vec<PoiRow>,
    pub enriched: usize,
    pub failures: Vec<EnrichmentItemFailure>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PoiRow {
    pub id: String,
    pub name: String,
    pub category: PoiCategory,
    pub lat: f64,
    pub lon: f64,
    pub address: Option<String>,
    pub summary: Option<String>,
    pub link: Option<String>,
}

impl DiscoveryReport {
    fn new(
        locator: &Locator,
        source: &'static str,
        pois: &[Poi],
        enrichment: &HashMap<String, EnrichedPoi>,
        failures: Vec<EnrichmentItemFailure>,
    ) -> Self {
        let rows = pois
            .iter()
            .map(|poi| {
                let enriched = enrichment.get(&poi.id);
                PoiRow {
                    id: poi.id.clone(),
                    name: poi.name.clone(),
                    category: poi.category,
                    lat: poi.coordinate.lat,
                    lon: poi.coordinate.lon,
                    address: (!poi.address.is_empty()).then(|| poi.address.clone()),
                    summary: enriched.and_then(|entry| entry.summary.clone()),
                    link: enriched.and_then(|entry| entry.link.clone()),
                }
            })
            .collect();
        Self {
            locator: locator.to_string(),
            source,
            pois: rows,
            enriched: enrichment.len(),
            failures,
        }
    }
}

impl DisplayFallback for DiscoveryReport {
    fn display(&self) -> String {
        if self.pois.is_empty() {
            return format!("No points of interest found for {}", self.locator);
        }
        let mut lines = vec![format!(
            "{}: {} points of interest ({}, {} enriched)",
            self.locator,
            self.pois.len(),
            self.source,
            self.enriched
        )];
        for row in &self.pois {
            lines.push(format!(
                "  - {} [{}] {:.5},{:.5}",
                row.name, row.category, row.lat, row.lon
            ));
            if let Some(address) = &row.address {
                lines.push(format!("      {address}"));
            }
            if let Some(summary) = &row.summary {
                lines.push(format!("      {}", truncate(summary, 120)));
            }
        }
        if !self.failures.is_empty() {
            lines.push(format!("Not enriched: {}", self.failures.len()));
        }
        lines.join("\n")
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}...")
}

type OnlineOutcome = (Vec<Poi>, HashMap<String, EnrichedPoi>, Vec<EnrichmentItemFailure>);

impl AppContext {
    pub(crate) fn discover(&self, args: &DiscoverArgs) -> Result<DiscoveryReport> {
        let locator = args.locator.locator()?;
        let request = PlanningRequest::new(locator.clone(), args.categories.clone());

        let cache = if args.use_cache {
            let cache = self.open_cache()?;
            cache.maintain()?;
            Some(cache)
        } else {
            None
        };

        if let Some(cache) = &cache {
            if let Some(entry) = cache.fetch(&locator.cache_key())? {
                let usable = cache.is_fresh(&entry, Utc::now())
                    && (!args.enrich || !entry.enrichment.is_empty());
                if usable {
                    info!(key = %entry.key, pois = entry.pois.len(), "serving discovery from cache");
                    let pois: Vec<Poi> = entry
                        .pois
                        .into_iter()
                        .filter(|poi| request.categories.contains(&poi.category))
                        .collect();
                    return Ok(DiscoveryReport::new(
                        &locator,
                        "cache",
                        &pois,
                        &entry.enrichment,
                        Vec::new(),
                    ));
                }
            }
        }

        let runtime = self.runtime()?;
        let (pois, enrichment, failures) = runtime.block_on(self.discover_online(&request, args.enrich))?;

        if let Some(cache) = &cache {
            cache.save(&CachedDiscovery::new(
                locator.clone(),
                pois.clone(),
                enrichment.clone(),
            ))?;
        }
        Ok(DiscoveryReport::new(&locator, "network", &pois, &enrichment, failures))
    }

    async fn discover_online(&self, request: &PlanningRequest, enrich: bool) -> Result<OnlineOutcome> {
        let client = self.upstream()?;
        let directory = OverpassDirectory::new(
            Arc::clone(&client),
            &self.config.discovery.overpass_endpoint,
            self.config.discovery.overpass_timeout_seconds,
        )?;
        let geocoder = NominatimGeocoder::new(Arc::clone(&client), &self.config.discovery.nominatim_endpoint)?;
        let discovery = Arc::new(DiscoveryClient::new(
            Arc::new(directory),
            Arc::new(geocoder),
            DiscoveryConfig::from(&self.config.discovery),
        ));

        let outcome = if enrich {
            let enricher = WikipediaEnricher::new(
                Arc::clone(&client),
                self.config.enrichment.wikipedia_base_url.clone(),
                self.config.enrichment.language.clone(),
            )?;
            let pipeline = EnrichmentPipeline::new(
                Arc::new(enricher),
                client.limiter().clone(),
                EnrichmentConfig::from(&self.config.enrichment),
            );
            let orchestrator = CurationOrchestrator::new(discovery, Arc::new(pipeline));
            let curated = orchestrator.generate(request.clone()).await?;
            (curated.pois, curated.enrichment, curated.failures)
        } else {
            let pois = discovery.discover(&request.locator, &request.categories).await?;
            (pois, HashMap::new(), Vec::new())
        };

        let metrics = client.metrics();
        info!(
            requests = metrics.requests,
            failures = metrics.failures,
            throttled = metrics.throttled,
            waited_ms = metrics.total_wait_ms,
            "upstream usage"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_address_is_omitted_from_rows() {
        let mut with_address = Poi::new(
            "node/1",
            "Kaiserburg",
            Coordinate::new(49.4578, 11.0758),
            PoiCategory::Castle,
        );
        with_address.address = "Burg 17, Nürnberg".to_string();
        let without_address = Poi::new(
            "node/2",
            "Stadtpark",
            Coordinate::new(49.4603, 11.0640),
            PoiCategory::Park,
        );

        let report = DiscoveryReport::new(
            &Locator::city("Nürnberg"),
            "cache",
            &[with_address, without_address],
            &HashMap::new(),
            Vec::new(),
        );
        assert_eq!(report.pois[0].address.as_deref(), Some("Burg 17, Nürnberg"));
        assert!(report.pois[1].address.is_none());

        let text = report.display();
        assert!(text.contains("      Burg 17, Nürnberg"));
        assert_eq!(text.lines().count(), 4);
    }
}
