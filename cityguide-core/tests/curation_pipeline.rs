use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cityguide_core::curation::{
    EndpointPolicy, OrderedRoute, RouteOrderer, RouteOrderingError, RouteRequest,
};
use cityguide_core::discovery::{GeocodedPlace, Geocoder, PoiDirectory, SearchArea};
use cityguide_core::enrichment::{EnrichmentItemError, EnrichmentPayload, EnrichmentProvider};
use cityguide_core::network::NetworkResult;
use cityguide_core::{
    Coordinate, CurationError, CurationEvent, CurationOrchestrator, DiscoveryClient,
    DiscoveryConfig, EnrichmentConfig, EnrichmentContext, EnrichmentPipeline, GenerationPhase,
    Locator, PlanningRequest, Poi, PoiCategory, RateLimiter, RouteConstraints, Waypoint,
};
use tokio::sync::Notify;

struct CityGeocoder;

#[async_trait]
impl Geocoder for CityGeocoder {
    async fn geocode(&self, query: &str) -> NetworkResult<Option<GeocodedPlace>> {
        let center = match query.to_lowercase().as_str() {
            "nürnberg" => Coordinate::new(49.4521, 11.0767),
            "bamberg" => Coordinate::new(49.8988, 10.9028),
            _ => return Ok(None),
        };
        Ok(Some(GeocodedPlace {
            display_name: query.to_string(),
            center,
        }))
    }
}

/// Twelve POIs around whatever center is searched; Bamberg waits for a gate.
struct GridDirectory {
    bamberg_gate: Option<Arc<Notify>>,
    searches: AtomicUsize,
}

impl GridDirectory {
    fn new() -> Self {
        Self {
            bamberg_gate: None,
            searches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PoiDirectory for GridDirectory {
    async fn search(&self, area: &SearchArea, categories: &[PoiCategory]) -> NetworkResult<Vec<Poi>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if area.city.as_deref() == Some("Bamberg") {
            if let Some(gate) = &self.bamberg_gate {
                gate.notified().await;
            }
        }
        let prefix = area.city.clone().unwrap_or_else(|| "area".into());
        Ok((0..12)
            .map(|idx| {
                Poi::new(
                    format!("node/{prefix}-{idx}"),
                    format!("{prefix} Sight {idx}"),
                    Coordinate::new(area.center.lat + idx as f64 * 0.002, area.center.lon),
                    categories[idx % categories.len()],
                )
            })
            .collect())
    }
}

struct SelectiveProvider {
    missing: HashSet<usize>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl SelectiveProvider {
    fn new(missing: &[usize]) -> Self {
        Self {
            missing: missing.iter().copied().collect(),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EnrichmentProvider for SelectiveProvider {
    async fn enrich(
        &self,
        poi: &Poi,
        context: &EnrichmentContext,
    ) -> Result<EnrichmentPayload, EnrichmentItemError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let index: usize = poi
            .id
            .rsplit('-')
            .next()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default();
        if self.missing.contains(&index) {
            return Err(EnrichmentItemError::NotFound);
        }
        Ok(EnrichmentPayload {
            summary: Some(format!(
                "{} in {}",
                poi.name,
                context.city.as_deref().unwrap_or("the area")
            )),
            image_url: None,
            link: Some(format!("https://de.wikipedia.org/wiki/{}", poi.name.replace(' ', "_"))),
        })
    }
}

struct StraightLineOrderer;

#[async_trait]
impl RouteOrderer for StraightLineOrderer {
    async fn order(&self, request: RouteRequest) -> Result<OrderedRoute, RouteOrderingError> {
        if request.stops.is_empty() {
            return Err(RouteOrderingError::Unroutable("no stops".into()));
        }
        let mut waypoints = vec![request.start.clone()];
        waypoints.extend(request.stops.iter().cloned());
        if request.constraints.endpoint == EndpointPolicy::RoundTrip {
            waypoints.push(request.start.clone());
        }
        let total_distance_m = waypoints
            .windows(2)
            .map(|pair| pair[0].coordinate.distance_to(&pair[1].coordinate))
            .sum::<f64>();
        Ok(OrderedRoute {
            total_duration_s: total_distance_m / 1.3,
            total_distance_m,
            waypoints,
        })
    }
}

fn build(
    directory: GridDirectory,
    provider: Arc<SelectiveProvider>,
) -> Arc<CurationOrchestrator> {
    let discovery = DiscoveryClient::new(
        Arc::new(directory),
        Arc::new(CityGeocoder),
        DiscoveryConfig::default(),
    );
    let pipeline = EnrichmentPipeline::new(provider, RateLimiter::unthrottled(), EnrichmentConfig::default());
    Arc::new(
        CurationOrchestrator::new(Arc::new(discovery), Arc::new(pipeline))
            .with_route_orderer(Arc::new(StraightLineOrderer)),
    )
}

fn city(name: &str) -> PlanningRequest {
    PlanningRequest::new(
        Locator::city(name),
        vec![PoiCategory::Museum, PoiCategory::Castle, PoiCategory::Park],
    )
}

#[tokio::test(start_paused = true)]
async fn city_request_reaches_ready_with_enrichment() {
    let provider = Arc::new(SelectiveProvider::new(&[]));
    let orchestrator = build(GridDirectory::new(), provider.clone());
    let mut progress = orchestrator.progress();

    let curated = orchestrator.generate(city("Nürnberg")).await.unwrap();
    assert_eq!(curated.pois.len(), 12);
    assert_eq!(curated.enrichment.len(), 12);
    assert!(curated
        .enrichment_for("node/Nürnberg-0")
        .and_then(|entry| entry.summary.as_deref())
        .is_some_and(|summary| summary.ends_with("in Nürnberg")));
    assert!(provider.peak.load(Ordering::SeqCst) <= 5);

    assert_eq!(orchestrator.phase(), GenerationPhase::Ready);
    assert_eq!(*progress.borrow_and_update(), 1.0);
}

#[tokio::test(start_paused = true)]
async fn partial_enrichment_failures_keep_the_request_alive() {
    let provider = Arc::new(SelectiveProvider::new(&[2, 7, 11]));
    let orchestrator = build(GridDirectory::new(), provider);

    let curated = orchestrator.generate(city("Nürnberg")).await.unwrap();
    assert_eq!(curated.pois.len(), 12);
    assert_eq!(curated.enrichment.len(), 9);
    assert_eq!(curated.failures.len(), 3);
    assert!(curated
        .enrichment
        .keys()
        .all(|id| curated.pois.iter().any(|poi| &poi.id == id)));
    let state = orchestrator.state();
    assert_eq!(state.phase, GenerationPhase::Ready);
    assert_eq!(state.progress, 1.0);
}

#[tokio::test(start_paused = true)]
async fn newer_generation_supersedes_older_one() {
    let gate = Arc::new(Notify::new());
    let directory = GridDirectory {
        bamberg_gate: Some(gate.clone()),
        searches: AtomicUsize::new(0),
    };
    let orchestrator = build(directory, Arc::new(SelectiveProvider::new(&[])));
    let mut events = orchestrator.subscribe();

    let slow = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.generate(city("Bamberg")).await })
    };
    while orchestrator.phase() != GenerationPhase::Discovering {
        tokio::task::yield_now().await;
    }

    let fast = orchestrator.generate(city("Nürnberg")).await.unwrap();
    gate.notify_one();
    let slow = slow.await.unwrap();

    assert!(matches!(slow, Err(CurationError::Superseded { .. })));
    let state = orchestrator.state();
    assert_eq!(state.phase, GenerationPhase::Ready);
    assert_eq!(state.request_id, Some(fast.request_id));
    assert_eq!(state.curated.map(|set| set.locator), Some(Locator::city("Nürnberg")));

    let mut ready_events = 0;
    while let Ok(event) = events.try_recv() {
        if let CurationEvent::PhaseChanged { phase: GenerationPhase::Ready, request_id } = event {
            assert_eq!(request_id, Some(fast.request_id));
            ready_events += 1;
        }
    }
    assert_eq!(ready_events, 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_city_fails_without_searching() {
    let directory = GridDirectory::new();
    let orchestrator = build(directory, Arc::new(SelectiveProvider::new(&[])));
    let err = orchestrator.generate(city("Atlantis")).await.unwrap_err();
    assert_eq!(err.to_string(), "city 'Atlantis' could not be found");
    assert_eq!(orchestrator.phase(), GenerationPhase::Failed);
}

#[tokio::test(start_paused = true)]
async fn swapping_a_stop_offers_it_back_first() {
    let orchestrator = build(GridDirectory::new(), Arc::new(SelectiveProvider::new(&[])));
    let curated = orchestrator.generate(city("Nürnberg")).await.unwrap();

    let route: Vec<Waypoint> = curated.pois.iter().take(3).map(Waypoint::from).collect();
    let swapped_out = curated.pois[1].clone();
    let replacement = curated.pois[5].clone();
    let mut new_route = route.clone();
    new_route[1] = Waypoint::from(&replacement);
    orchestrator.record_replacement(swapped_out.clone());

    let cards = orchestrator.swipe_cards(&new_route[1], &new_route).unwrap();
    assert_eq!(cards[0].candidate.poi.id, swapped_out.id);
    assert!(cards[0].was_previously_replaced());
    assert!(cards
        .iter()
        .all(|card| new_route.iter().all(|stop| !card.candidate.poi.matches_waypoint(stop))));
    assert!(cards.iter().skip(1).all(|card| card.enrichment.is_some()));
}

#[tokio::test(start_paused = true)]
async fn plan_route_hands_curated_stops_to_orderer() {
    let orchestrator = build(GridDirectory::new(), Arc::new(SelectiveProvider::new(&[])));
    let curated = orchestrator.generate(city("Nürnberg")).await.unwrap();

    let start = Waypoint::from(&curated.pois[0]);
    let route = orchestrator
        .plan_route(
            start.clone(),
            RouteConstraints {
                max_stops: 4,
                ..RouteConstraints::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(route.waypoints.len(), 6);
    assert_eq!(route.waypoints.first(), Some(&start));
    assert_eq!(route.waypoints.last(), Some(&start));
    assert!(route.waypoints[1..5].iter().all(|stop| stop.poi_id != start.poi_id));
    assert!(route.total_distance_m > 0.0);
}
