mod alternatives;
mod error;
mod orchestrator;
mod route;

pub use alternatives::{
    find_alternatives, swipe_cards, AlternativeCandidate, SwipeCard, MAX_ALTERNATIVES,
};
pub use error::{CurationError, CurationResult};
pub use orchestrator::{
    CuratedSet, CurationEvent, CurationOrchestrator, GenerationPhase, GenerationState,
    PlanningRequest,
};
pub use route::{
    build_route_request, EndpointPolicy, OrderedRoute, RouteConstraints, RouteOrderer,
    RouteOrderingError, RouteRequest,
};
