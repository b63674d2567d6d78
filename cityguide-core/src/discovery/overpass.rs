use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, trace};
use url::Url;

use crate::network::{NetworkError, NetworkResult, UpstreamClient};
use crate::poi::{Coordinate, Poi, PoiCategory};

#[derive(Debug, Clone, PartialEq)]
pub struct SearchArea {
    pub center: Coordinate,
    pub radius_m: f64,
    /// Used as address fallback when elements carry no `addr:*` tags.
    pub city: Option<String>,
}

#[async_trait]
pub trait PoiDirectory: Send + Sync {
    async fn search(&self, area: &SearchArea, categories: &[PoiCategory]) -> NetworkResult<Vec<Poi>>;
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    kind: String,
    id: i64,
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

pub struct OverpassDirectory {
    client: Arc<UpstreamClient>,
    endpoint: Url,
    timeout_seconds: u64,
}

impl OverpassDirectory {
    pub fn new(
        client: Arc<UpstreamClient>,
        endpoint: &str,
        timeout_seconds: u64,
    ) -> NetworkResult<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|err| NetworkError::Configuration(format!("overpass endpoint: {err}")))?;
        Ok(Self {
            client,
            endpoint,
            timeout_seconds,
        })
    }

    pub fn build_query_url(&self, area: &SearchArea, categories: &[PoiCategory]) -> Url {
        let script = build_overpass_query(area, categories, self.timeout_seconds);
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("data", &script);
        url
    }
}

#[async_trait]
impl PoiDirectory for OverpassDirectory {
    async fn search(&self, area: &SearchArea, categories: &[PoiCategory]) -> NetworkResult<Vec<Poi>> {
        if categories.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.build_query_url(area, categories);
        trace!(center = %area.center, radius_m = area.radius_m, "querying overpass");
        let response: OverpassResponse = self
            .client
            .get_json(url)
            .await?
            .unwrap_or(OverpassResponse {
                elements: Vec::new(),
            });
        let elements = response.elements.len();
        let pois = parse_elements(response.elements, categories, area.city.as_deref());
        debug!(elements, pois = pois.len(), "overpass response parsed");
        Ok(pois)
    }
}

pub fn build_overpass_query(area: &SearchArea, categories: &[PoiCategory], timeout_seconds: u64) -> String {
    let around = format!(
        "(around:{:.0},{:.6},{:.6})",
        area.radius_m, area.center.lat, area.center.lon
    );
    let mut query = format!("[out:json][timeout:{timeout_seconds}];\n(\n");
    for category in categories {
        let (key, value) = category.osm_tag();
        for element in ["node", "way", "relation"] {
            query.push_str(&format!("  {element}[\"{key}\"=\"{value}\"][\"name\"]{around};\n"));
        }
    }
    query.push_str(");\nout center tags;");
    query
}

fn parse_elements(
    elements: Vec<OverpassElement>,
    requested: &[PoiCategory],
    city: Option<&str>,
) -> Vec<Poi> {
    elements
        .into_iter()
        .filter_map(|element| parse_element(element, requested, city))
        .collect()
}

fn parse_element(
    element: OverpassElement,
    requested: &[PoiCategory],
    city: Option<&str>,
) -> Option<Poi> {
    let name = element.tags.get("name")?.trim().to_string();
    if name.is_empty() {
        return None;
    }
    let coordinate = match (element.lat, element.lon, &element.center) {
        (Some(lat), Some(lon), _) => Coordinate::new(lat, lon),
        (_, _, Some(center)) => Coordinate::new(center.lat, center.lon),
        _ => return None,
    };
    if !coordinate.is_valid() {
        return None;
    }
    let category = requested.iter().copied().find(|category| {
        let (key, value) = category.osm_tag();
        element.tags.get(key).map(String::as_str) == Some(value)
    })?;

    let mut poi = Poi::new(
        format!("{}/{}", element.kind, element.id),
        name,
        coordinate,
        category,
    );
    poi.address = format_address(&element.tags, city);
    poi.wikipedia = element.tags.get("wikipedia").cloned();
    poi.website = element
        .tags
        .get("website")
        .or_else(|| element.tags.get("contact:website"))
        .cloned();
    Some(poi)
}

fn format_address(tags: &HashMap<String, String>, city: Option<&str>) -> String {
    let tag = |key: &str| tags.get(key).map(|value| value.trim()).filter(|v| !v.is_empty());
    let street = match (tag("addr:street"), tag("addr:housenumber")) {
        (Some(street), Some(number)) => Some(format!("{street} {number}")),
        (Some(street), None) => Some(street.to_string()),
        _ => None,
    };
    let locality = match (tag("addr:postcode"), tag("addr:city").or(city)) {
        (Some(postcode), Some(city)) => Some(format!("{postcode} {city}")),
        (None, Some(city)) => Some(city.to_string()),
        (Some(postcode), None) => Some(postcode.to_string()),
        (None, None) => None,
    };
    [street, locality]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ")
}
