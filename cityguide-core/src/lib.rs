pub mod cache;
pub mod config;
pub mod curation;
pub mod discovery;
pub mod enrichment;
pub mod error;
pub mod network;
pub mod poi;
pub mod sqlite;

pub use cache::{
    CacheError, CacheResult, CacheSnapshot, CacheStatistics, CachedDiscovery, MaintenanceReport,
    PoiCache, SqlitePoiCache, SqlitePoiCacheBuilder,
};
pub use config::{
    load_cityguide_config, CacheSection, CityGuideConfig, DiscoverySection, EnrichmentSection,
    RateLimitSection, TransportSection,
};
pub use curation::{
    find_alternatives, AlternativeCandidate, CuratedSet, CurationError, CurationEvent,
    CurationOrchestrator, CurationResult, GenerationPhase, GenerationState, PlanningRequest,
    RouteConstraints, RouteOrderer, SwipeCard,
};
pub use discovery::{DiscoveryClient, DiscoveryConfig, DiscoveryError, Locator};
pub use enrichment::{
    EnrichmentConfig, EnrichmentContext, EnrichmentPipeline, EnrichmentProgress, EnrichmentReport,
    WikipediaEnricher,
};
pub use error::{ConfigError, Result};
pub use network::{
    CertificatePin, NetworkError, PinTable, RateLimiter, RateLimiterConfig, SecureTransport,
    TransportConfig, UpstreamClient,
};
pub use poi::{Coordinate, EnrichedPoi, EnrichmentStatus, Poi, PoiCategory, Waypoint};
