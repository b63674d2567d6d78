pub mod models;

pub use models::{
    same_place, Coordinate, EnrichedPoi, EnrichmentStatus, Poi, PoiCategory, Waypoint,
    SAME_PLACE_TOLERANCE_M,
};
