use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::poi::{Poi, Waypoint};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum EndpointPolicy {
    RoundTrip,
    Open,
    FixedEnd { end: Waypoint },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteConstraints {
    pub max_stops: usize,
    pub time_budget_minutes: Option<u32>,
    pub endpoint: EndpointPolicy,
}

impl Default for RouteConstraints {
    fn default() -> Self {
        Self {
            max_stops: 5,
            time_budget_minutes: None,
            endpoint: EndpointPolicy::RoundTrip,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub start: Waypoint,
    pub stops: Vec<Waypoint>,
    pub constraints: RouteConstraints,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedRoute {
    pub waypoints: Vec<Waypoint>,
    pub total_distance_m: f64,
    pub total_duration_s: f64,
}

#[derive(Debug, Clone, Error)]
pub enum RouteOrderingError {
    #[error("no route could be ordered: {0}")]
    Unroutable(String),
    #[error("route ordering service failed: {0}")]
    Service(String),
}

/// The itinerary optimiser. Opaque to the curation core.
#[async_trait]
pub trait RouteOrderer: Send + Sync {
    async fn order(&self, request: RouteRequest) -> Result<OrderedRoute, RouteOrderingError>;
}

/// Stops for the orderer: no endpoint duplicates, no repeated places, at most
/// `max_stops`, curated order preserved.
pub fn build_route_request(
    curated: &[Poi],
    start: Waypoint,
    constraints: RouteConstraints,
) -> RouteRequest {
    let mut endpoints = vec![start.clone()];
    if let EndpointPolicy::FixedEnd { end } = &constraints.endpoint {
        endpoints.push(end.clone());
    }

    let mut stops: Vec<Waypoint> = Vec::new();
    for poi in curated {
        if stops.len() >= constraints.max_stops {
            break;
        }
        let represented = endpoints
            .iter()
            .chain(stops.iter())
            .any(|waypoint| poi.matches_waypoint(waypoint));
        if !represented {
            stops.push(Waypoint::from(poi));
        }
    }

    RouteRequest {
        start,
        stops,
        constraints,
    }
}
