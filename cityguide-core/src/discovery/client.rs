use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, trace};

use super::error::{DiscoveryError, DiscoveryResult};
use super::geocoder::Geocoder;
use super::overpass::{PoiDirectory, SearchArea};
use crate::config::DiscoverySection;
use crate::poi::{Coordinate, Poi, PoiCategory};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Locator {
    City { name: String },
    Area { center: Coordinate, radius_m: f64 },
}

impl Locator {
    pub fn city(name: impl Into<String>) -> Self {
        Locator::City { name: name.into() }
    }

    pub fn area(center: Coordinate, radius_m: f64) -> Self {
        Locator::Area { center, radius_m }
    }

    /// Stable key for caching discovery results.
    pub fn cache_key(&self) -> String {
        match self {
            Locator::City { name } => format!("city:{}", name.trim().to_lowercase()),
            Locator::Area { center, radius_m } => {
                format!("area:{:.4},{:.4},r{:.0}", center.lat, center.lon, radius_m)
            }
        }
    }

    pub fn city_name(&self) -> Option<&str> {
        match self {
            Locator::City { name } => Some(name),
            Locator::Area { .. } => None,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::City { name } => f.write_str(name),
            Locator::Area { center, radius_m } => write!(f, "{radius_m:.0} m around {center}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub city_radius_m: f64,
    pub max_results: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            city_radius_m: 5000.0,
            max_results: 100,
        }
    }
}

impl From<&DiscoverySection> for DiscoveryConfig {
    fn from(section: &DiscoverySection) -> Self {
        Self {
            city_radius_m: section.city_radius_m,
            max_results: section.max_results,
        }
    }
}

pub struct DiscoveryClient {
    directory: Arc<dyn PoiDirectory>,
    geocoder: Arc<dyn Geocoder>,
    config: DiscoveryConfig,
}

impl DiscoveryClient {
    pub fn new(
        directory: Arc<dyn PoiDirectory>,
        geocoder: Arc<dyn Geocoder>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            directory,
            geocoder,
            config,
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// An empty list is a valid answer ("nothing here"), distinct from errors.
    pub async fn discover(
        &self,
        locator: &Locator,
        categories: &[PoiCategory],
    ) -> DiscoveryResult<Vec<Poi>> {
        let start = Instant::now();
        let area = self.resolve(locator).await?;
        let raw = self.directory.search(&area, categories).await?;
        let found = raw.len();
        let pois = self.normalize(raw);
        info!(
            locator = %locator,
            categories = categories.len(),
            found,
            kept = pois.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "discovery completed"
        );
        Ok(pois)
    }

    async fn resolve(&self, locator: &Locator) -> DiscoveryResult<SearchArea> {
        match locator {
            Locator::City { name } => {
                let trimmed = name.trim();
                if trimmed.is_empty() {
                    return Err(DiscoveryError::InvalidLocator("empty city name".into()));
                }
                let place = self
                    .geocoder
                    .geocode(trimmed)
                    .await?
                    .ok_or_else(|| DiscoveryError::LocatorResolution {
                        city: trimmed.to_string(),
                    })?;
                trace!(city = trimmed, center = %place.center, "city geocoded");
                Ok(SearchArea {
                    center: place.center,
                    radius_m: self.config.city_radius_m,
                    city: Some(trimmed.to_string()),
                })
            }
            Locator::Area { center, radius_m } => {
                if !center.is_valid() {
                    return Err(DiscoveryError::InvalidLocator(format!(
                        "coordinate out of range: {center}"
                    )));
                }
                if !radius_m.is_finite() || *radius_m <= 0.0 {
                    return Err(DiscoveryError::InvalidLocator(format!(
                        "radius must be positive, got {radius_m}"
                    )));
                }
                Ok(SearchArea {
                    center: *center,
                    radius_m: *radius_m,
                    city: None,
                })
            }
        }
    }

    /// Keeps provider order; drops repeated ids and later listings of the
    /// same place.
    fn normalize(&self, raw: Vec<Poi>) -> Vec<Poi> {
        let mut seen_ids = HashSet::new();
        let mut kept: Vec<Poi> = Vec::new();
        for poi in raw {
            if kept.len() >= self.config.max_results {
                break;
            }
            if poi.name.trim().is_empty() {
                continue;
            }
            if !seen_ids.insert(poi.id.clone()) {
                trace!(id = %poi.id, "duplicate id dropped");
                continue;
            }
            if kept.iter().any(|existing| existing.same_place_as(&poi)) {
                trace!(id = %poi.id, name = %poi.name, "duplicate listing dropped");
                continue;
            }
            kept.push(poi);
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::GeocodedPlace;
    use crate::network::{NetworkError, NetworkResult};
    use async_trait::async_trait;

    struct FixedGeocoder(Option<Coordinate>);

    #[async_trait]
    impl Geocoder for FixedGeocoder {
        async fn geocode(&self, city: &str) -> NetworkResult<Option<GeocodedPlace>> {
            Ok(self.0.map(|center| GeocodedPlace {
                display_name: city.to_string(),
                center,
            }))
        }
    }

    struct StaticDirectory(NetworkResult<Vec<Poi>>);

    #[async_trait]
    impl PoiDirectory for StaticDirectory {
        async fn search(&self, _area: &SearchArea, _categories: &[PoiCategory]) -> NetworkResult<Vec<Poi>> {
            self.0.clone()
        }
    }

    fn client(geocoded: Option<Coordinate>, result: NetworkResult<Vec<Poi>>) -> DiscoveryClient {
        DiscoveryClient::new(
            Arc::new(StaticDirectory(result)),
            Arc::new(FixedGeocoder(geocoded)),
            DiscoveryConfig {
                city_radius_m: 3000.0,
                max_results: 3,
            },
        )
    }

    fn poi(id: &str, name: &str, lat: f64, lon: f64) -> Poi {
        Poi::new(id, name, Coordinate::new(lat, lon), PoiCategory::Museum)
    }

    #[tokio::test]
    async fn normalizes_duplicates_and_caps_results() {
        let raw = vec![
            poi("node/1", "Museum X", 49.4530, 11.0780),
            poi("node/1", "Museum X", 49.4530, 11.0780),
            poi("way/9", "museum x", 49.45302, 11.07805),
            poi("node/2", "Museum X", 49.4600, 11.0780),
            poi("node/3", "Park", 49.4400, 11.0700),
            poi("node/4", "Castle", 49.4578, 11.0758),
        ];
        let client = client(Some(Coordinate::new(49.45, 11.07)), Ok(raw));
        let pois = client.discover(&Locator::city("Nürnberg"), &[PoiCategory::Museum]).await.unwrap();
        let ids: Vec<&str> = pois.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["node/1", "node/2", "node/3"]);
    }

    #[tokio::test]
    async fn zero_cap_returns_nothing() {
        let client = DiscoveryClient::new(
            Arc::new(StaticDirectory(Ok(vec![poi("node/1", "Museum X", 49.4530, 11.0780)]))),
            Arc::new(FixedGeocoder(Some(Coordinate::new(49.45, 11.07)))),
            DiscoveryConfig {
                city_radius_m: 3000.0,
                max_results: 0,
            },
        );
        let pois = client.discover(&Locator::city("Nürnberg"), &[PoiCategory::Museum]).await.unwrap();
        assert!(pois.is_empty());
    }

    #[tokio::test]
    async fn unknown_city_is_a_locator_error() {
        let client = client(None, Ok(vec![]));
        let err = client.discover(&Locator::city("Atlantis"), &[PoiCategory::Park]).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::LocatorResolution { ref city } if city == "Atlantis"));
    }

    #[tokio::test]
    async fn certificate_failures_keep_their_identity() {
        let client = client(
            Some(Coordinate::new(49.45, 11.07)),
            Err(NetworkError::CertificateValidation {
                host: "overpass-api.de".into(),
            }),
        );
        let err = client.discover(&Locator::city("Nürnberg"), &[PoiCategory::Park]).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::CertificateValidation { .. }));
    }

    #[tokio::test]
    async fn invalid_area_is_rejected_before_any_request() {
        let client = client(None, Ok(vec![]));
        let err = client
            .discover(&Locator::area(Coordinate::new(120.0, 11.0), 500.0), &[PoiCategory::Park])
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidLocator(_)));
    }

    #[test]
    fn cache_keys_are_stable() {
        assert_eq!(Locator::city(" Nürnberg ").cache_key(), "city:nürnberg");
        assert_eq!(
            Locator::area(Coordinate::new(49.45301, 11.07799), 1500.0).cache_key(),
            "area:49.4530,11.0780,r1500"
        );
    }
}
