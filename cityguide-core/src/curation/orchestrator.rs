use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::alternatives::{find_alternatives, swipe_cards, AlternativeCandidate, SwipeCard};
use super::error::{CurationError, CurationResult};
use super::route::{
    build_route_request, OrderedRoute, RouteConstraints, RouteOrderer, RouteOrderingError,
};
use crate::discovery::{DiscoveryClient, DiscoveryError, Locator};
use crate::enrichment::{
    EnrichmentContext, EnrichmentItemFailure, EnrichmentPipeline, EnrichmentProgress,
};
use crate::poi::{EnrichedPoi, Poi, PoiCategory, Waypoint};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningRequest {
    pub locator: Locator,
    pub categories: Vec<PoiCategory>,
}

impl PlanningRequest {
    pub fn new(locator: Locator, categories: Vec<PoiCategory>) -> Self {
        let categories = if categories.is_empty() {
            PoiCategory::ALL.to_vec()
        } else {
            categories
        };
        Self {
            locator,
            categories,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPhase {
    Idle,
    Discovering,
    Enriching,
    Ready,
    Failed,
}

impl GenerationPhase {
    /// Transitions within one generation. A new generation always restarts
    /// at `Discovering`, and `reset` always returns to `Idle`.
    pub fn can_advance_to(self, next: GenerationPhase) -> bool {
        use GenerationPhase::*;
        matches!(
            (self, next),
            (Discovering, Enriching)
                | (Discovering, Failed)
                | (Enriching, Ready)
                | (Enriching, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationPhase::Idle => "idle",
            GenerationPhase::Discovering => "discovering",
            GenerationPhase::Enriching => "enriching",
            GenerationPhase::Ready => "ready",
            GenerationPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for GenerationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuratedSet {
    pub request_id: Uuid,
    pub locator: Locator,
    pub pois: Vec<Poi>,
    pub enrichment: HashMap<String, EnrichedPoi>,
    pub failures: Vec<EnrichmentItemFailure>,
    pub completed_at: DateTime<Utc>,
}

impl CuratedSet {
    pub fn enrichment_for(&self, poi_id: &str) -> Option<&EnrichedPoi> {
        self.enrichment.get(poi_id)
    }
}

/// Point-in-time copy of the orchestrator state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationState {
    pub phase: GenerationPhase,
    pub request_id: Option<Uuid>,
    pub request: Option<PlanningRequest>,
    pub curated: Option<CuratedSet>,
    pub replaced: Vec<Poi>,
    pub last_error: Option<String>,
    pub progress: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CurationEvent {
    PhaseChanged {
        request_id: Option<Uuid>,
        phase: GenerationPhase,
    },
    Progress {
        request_id: Uuid,
        fraction: f64,
    },
}

struct Inner {
    epoch: u64,
    phase: GenerationPhase,
    request_id: Option<Uuid>,
    request: Option<PlanningRequest>,
    curated: Option<CuratedSet>,
    replaced: Vec<Poi>,
    last_error: Option<String>,
}

impl Inner {
    fn idle(epoch: u64) -> Self {
        Self {
            epoch,
            phase: GenerationPhase::Idle,
            request_id: None,
            request: None,
            curated: None,
            replaced: Vec::new(),
            last_error: None,
        }
    }
}

#[derive(Clone, Copy)]
struct Generation {
    epoch: u64,
    request_id: Uuid,
}

pub struct CurationOrchestrator {
    discovery: Arc<DiscoveryClient>,
    enrichment: Arc<EnrichmentPipeline>,
    orderer: Option<Arc<dyn RouteOrderer>>,
    inner: Mutex<Inner>,
    events: broadcast::Sender<CurationEvent>,
    progress: watch::Sender<f64>,
}

impl CurationOrchestrator {
    pub fn new(discovery: Arc<DiscoveryClient>, enrichment: Arc<EnrichmentPipeline>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (progress, _) = watch::channel(0.0);
        Self {
            discovery,
            enrichment,
            orderer: None,
            inner: Mutex::new(Inner::idle(0)),
            events,
            progress,
        }
    }

    pub fn with_route_orderer(mut self, orderer: Arc<dyn RouteOrderer>) -> Self {
        self.orderer = Some(orderer);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CurationEvent> {
        self.events.subscribe()
    }

    pub fn progress(&self) -> watch::Receiver<f64> {
        self.progress.subscribe()
    }

    pub fn phase(&self) -> GenerationPhase {
        self.lock().phase
    }

    pub fn state(&self) -> GenerationState {
        let inner = self.lock();
        GenerationState {
            phase: inner.phase,
            request_id: inner.request_id,
            request: inner.request.clone(),
            curated: inner.curated.clone(),
            replaced: inner.replaced.clone(),
            last_error: inner.last_error.clone(),
            progress: *self.progress.borrow(),
        }
    }

    /// Runs discovery then enrichment for `request`, superseding any earlier
    /// generation. Results of a generation that was reset or superseded while
    /// in flight are discarded.
    pub async fn generate(&self, request: PlanningRequest) -> CurationResult<CuratedSet> {
        let generation = self.begin(&request);
        info!(request_id = %generation.request_id, locator = %request.locator, "curation started");

        let discovered = self
            .discovery
            .discover(&request.locator, &request.categories)
            .await;
        self.ensure_current(generation)?;

        let pois = match discovered {
            Ok(pois) if pois.is_empty() => {
                let error = CurationError::NothingFound {
                    message: nothing_found_message(&request.locator),
                };
                return Err(self.fail(generation, error));
            }
            Ok(pois) => pois,
            Err(source) => {
                let error = CurationError::Discovery {
                    message: discovery_failure_message(&source),
                    source,
                };
                return Err(self.fail(generation, error));
            }
        };

        self.transition(generation, GenerationPhase::Enriching)?;
        let context = EnrichmentContext {
            city: request.locator.city_name().map(str::to_string),
        };
        let tracker = EnrichmentProgress::new();
        let report = {
            let mut updates = tracker.subscribe();
            let run = self.enrichment.enrich(&pois, &context, &tracker);
            tokio::pin!(run);
            loop {
                tokio::select! {
                    report = &mut run => break report,
                    changed = updates.changed() => match changed {
                        Ok(()) => {
                            let fraction = *updates.borrow_and_update();
                            self.publish_progress(generation, fraction);
                        }
                        Err(_) => break (&mut run).await,
                    },
                }
            }
        };
        self.publish_progress(generation, tracker.value());
        self.ensure_current(generation)?;

        let curated = CuratedSet {
            request_id: generation.request_id,
            locator: request.locator.clone(),
            pois,
            enrichment: report.enriched,
            failures: report.failures,
            completed_at: Utc::now(),
        };
        self.complete(generation, curated.clone())?;
        info!(
            request_id = %generation.request_id,
            pois = curated.pois.len(),
            enriched = curated.enrichment.len(),
            "curation ready"
        );
        Ok(curated)
    }

    /// Back to idle with all accumulated state dropped. In-flight work keeps
    /// running but its results are discarded.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let epoch = inner.epoch + 1;
        *inner = Inner::idle(epoch);
        drop(inner);
        self.progress.send_replace(0.0);
        let _ = self.events.send(CurationEvent::PhaseChanged {
            request_id: None,
            phase: GenerationPhase::Idle,
        });
        debug!(epoch, "curation state reset");
    }

    /// Remembers a POI the user swapped out so it stays offered as an
    /// alternative.
    pub fn record_replacement(&self, poi: Poi) {
        let mut inner = self.lock();
        if inner.replaced.iter().any(|existing| existing.id == poi.id) {
            return;
        }
        debug!(poi = %poi.name, "replacement recorded");
        inner.replaced.push(poi);
    }

    pub fn alternatives(
        &self,
        reference: &Waypoint,
        route: &[Waypoint],
    ) -> CurationResult<Vec<AlternativeCandidate>> {
        let inner = self.lock();
        let curated = ready_set(&inner)?;
        Ok(find_alternatives(&curated.pois, &inner.replaced, reference, route))
    }

    pub fn swipe_cards(
        &self,
        reference: &Waypoint,
        route: &[Waypoint],
    ) -> CurationResult<Vec<SwipeCard>> {
        let inner = self.lock();
        let curated = ready_set(&inner)?;
        let candidates = find_alternatives(&curated.pois, &inner.replaced, reference, route);
        Ok(swipe_cards(candidates, &curated.enrichment))
    }

    pub async fn plan_route(
        &self,
        start: Waypoint,
        constraints: RouteConstraints,
    ) -> CurationResult<OrderedRoute> {
        let orderer = self.orderer.clone().ok_or_else(|| {
            CurationError::RouteOrdering(RouteOrderingError::Service(
                "no route orderer configured".into(),
            ))
        })?;
        let request = {
            let inner = self.lock();
            let curated = ready_set(&inner)?;
            build_route_request(&curated.pois, start, constraints)
        };
        debug!(stops = request.stops.len(), "route ordering requested");
        Ok(orderer.order(request).await?)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, request: &PlanningRequest) -> Generation {
        let request_id = Uuid::new_v4();
        let mut inner = self.lock();
        let epoch = inner.epoch + 1;
        *inner = Inner::idle(epoch);
        inner.phase = GenerationPhase::Discovering;
        inner.request_id = Some(request_id);
        inner.request = Some(request.clone());
        drop(inner);
        self.progress.send_replace(0.0);
        let _ = self.events.send(CurationEvent::PhaseChanged {
            request_id: Some(request_id),
            phase: GenerationPhase::Discovering,
        });
        Generation { epoch, request_id }
    }

    fn ensure_current(&self, generation: Generation) -> CurationResult<()> {
        if self.lock().epoch == generation.epoch {
            Ok(())
        } else {
            debug!(request_id = %generation.request_id, "discarding superseded generation");
            Err(CurationError::Superseded {
                request_id: generation.request_id,
            })
        }
    }

    fn transition(&self, generation: Generation, next: GenerationPhase) -> CurationResult<()> {
        self.transition_with(generation, next, |_| {})
    }

    /// Applies `update` and the phase change under one lock, after the epoch
    /// check, so a concurrent `reset` never sees half of it.
    fn transition_with(
        &self,
        generation: Generation,
        next: GenerationPhase,
        update: impl FnOnce(&mut Inner),
    ) -> CurationResult<()> {
        let mut inner = self.lock();
        if inner.epoch != generation.epoch {
            return Err(CurationError::Superseded {
                request_id: generation.request_id,
            });
        }
        if !inner.phase.can_advance_to(next) {
            warn!(from = %inner.phase, to = %next, "unexpected curation transition");
        }
        update(&mut inner);
        inner.phase = next;
        drop(inner);
        let _ = self.events.send(CurationEvent::PhaseChanged {
            request_id: Some(generation.request_id),
            phase: next,
        });
        Ok(())
    }

    fn fail(&self, generation: Generation, error: CurationError) -> CurationError {
        let message = error.to_string();
        if let Err(superseded) =
            self.transition_with(generation, GenerationPhase::Failed, |inner| {
                inner.last_error = Some(message)
            })
        {
            return superseded;
        }
        warn!(request_id = %generation.request_id, error = %error, "curation failed");
        error
    }

    fn complete(&self, generation: Generation, curated: CuratedSet) -> CurationResult<()> {
        self.transition_with(generation, GenerationPhase::Ready, |inner| {
            inner.curated = Some(curated)
        })
    }

    fn publish_progress(&self, generation: Generation, fraction: f64) {
        if self.lock().epoch != generation.epoch {
            return;
        }
        self.progress.send_if_modified(|current| {
            if fraction > *current {
                *current = fraction;
                true
            } else {
                false
            }
        });
        let _ = self.events.send(CurationEvent::Progress {
            request_id: generation.request_id,
            fraction,
        });
    }
}

fn ready_set(inner: &Inner) -> CurationResult<&CuratedSet> {
    match (&inner.phase, &inner.curated) {
        (GenerationPhase::Ready, Some(curated)) => Ok(curated),
        (phase, _) => Err(CurationError::NotReady {
            phase: phase.to_string(),
        }),
    }
}

fn nothing_found_message(locator: &Locator) -> String {
    match locator {
        Locator::City { name } => format!("no points of interest found in {name}"),
        Locator::Area { center, radius_m } => {
            format!("no points of interest found within {radius_m:.0} m of {center}")
        }
    }
}

fn discovery_failure_message(error: &DiscoveryError) -> String {
    match error {
        DiscoveryError::LocatorResolution { city } => format!("city '{city}' could not be found"),
        DiscoveryError::InvalidLocator(reason) => format!("invalid search area: {reason}"),
        DiscoveryError::CertificateValidation { host } => {
            format!("secure connection to {host} was rejected")
        }
        DiscoveryError::Network(err) => {
            format!("could not reach the point-of-interest provider: {err}")
        }
    }
}
