use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::network::{NetworkError, NetworkResult, UpstreamClient};
use crate::poi::Coordinate;

#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedPlace {
    pub display_name: String,
    pub center: Coordinate,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` when the name does not resolve to a place.
    async fn geocode(&self, city: &str) -> NetworkResult<Option<GeocodedPlace>>;
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
}

pub struct NominatimGeocoder {
    client: Arc<UpstreamClient>,
    endpoint: Url,
}

impl NominatimGeocoder {
    pub fn new(client: Arc<UpstreamClient>, endpoint: &str) -> NetworkResult<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|err| NetworkError::Configuration(format!("nominatim endpoint: {err}")))?;
        Ok(Self { client, endpoint })
    }

    pub fn build_query_url(&self, city: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("q", city)
            .append_pair("format", "json")
            .append_pair("limit", "1");
        url
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, city: &str) -> NetworkResult<Option<GeocodedPlace>> {
        let url = self.build_query_url(city);
        let places: Vec<NominatimPlace> = self.client.get_json(url).await?.unwrap_or_default();
        let place = places.into_iter().next().and_then(parse_place);
        debug!(city, resolved = place.is_some(), "geocoding finished");
        Ok(place)
    }
}

fn parse_place(place: NominatimPlace) -> Option<GeocodedPlace> {
    let lat = place.lat.parse::<f64>().ok()?;
    let lon = place.lon.parse::<f64>().ok()?;
    let center = Coordinate::new(lat, lon);
    center.is_valid().then_some(GeocodedPlace {
        display_name: place.display_name,
        center,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nominatim_payload_parses_string_coordinates() {
        let payload = r#"[{"lat":"49.4538723","lon":"11.0772978","display_name":"Nürnberg, Bayern, Deutschland"}]"#;
        let places: Vec<NominatimPlace> = serde_json::from_str(payload).unwrap();
        let place = places.into_iter().next().and_then(parse_place).unwrap();
        assert!((place.center.lat - 49.4538723).abs() < 1e-9);
        assert!(place.display_name.starts_with("Nürnberg"));
    }

    #[test]
    fn garbage_coordinates_are_dropped() {
        let place = NominatimPlace {
            lat: "north".into(),
            lon: "11.0".into(),
            display_name: "x".into(),
        };
        assert!(parse_place(place).is_none());
    }
}
