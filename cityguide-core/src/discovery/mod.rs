mod client;
mod error;
mod geocoder;
mod overpass;

pub use client::{DiscoveryClient, DiscoveryConfig, Locator};
pub use error::{DiscoveryError, DiscoveryResult};
pub use geocoder::{GeocodedPlace, Geocoder, NominatimGeocoder};
pub use overpass::{build_overpass_query, OverpassDirectory, PoiDirectory, SearchArea};
