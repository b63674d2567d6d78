use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Two listings closer than this (and sharing a name) are the same place.
pub const SAME_PLACE_TOLERANCE_M: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance in meters (haversine).
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let phi1 = self.lat.to_radians();
        let phi2 = other.lat.to_radians();
        let d_phi = (other.lat - self.lat).to_radians();
        let d_lambda = (other.lon - self.lon).to_radians();
        let a = (d_phi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5},{:.5}", self.lat, self.lon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoiCategory {
    Attraction,
    Museum,
    Gallery,
    Artwork,
    Viewpoint,
    Monument,
    Memorial,
    Castle,
    Ruins,
    Park,
    Garden,
    PlaceOfWorship,
}

impl PoiCategory {
    pub const ALL: [PoiCategory; 12] = [
        PoiCategory::Attraction,
        PoiCategory::Museum,
        PoiCategory::Gallery,
        PoiCategory::Artwork,
        PoiCategory::Viewpoint,
        PoiCategory::Monument,
        PoiCategory::Memorial,
        PoiCategory::Castle,
        PoiCategory::Ruins,
        PoiCategory::Park,
        PoiCategory::Garden,
        PoiCategory::PlaceOfWorship,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PoiCategory::Attraction => "attraction",
            PoiCategory::Museum => "museum",
            PoiCategory::Gallery => "gallery",
            PoiCategory::Artwork => "artwork",
            PoiCategory::Viewpoint => "viewpoint",
            PoiCategory::Monument => "monument",
            PoiCategory::Memorial => "memorial",
            PoiCategory::Castle => "castle",
            PoiCategory::Ruins => "ruins",
            PoiCategory::Park => "park",
            PoiCategory::Garden => "garden",
            PoiCategory::PlaceOfWorship => "place_of_worship",
        }
    }

    /// OpenStreetMap tag (key, value) selecting this category.
    pub fn osm_tag(&self) -> (&'static str, &'static str) {
        match self {
            PoiCategory::Attraction => ("tourism", "attraction"),
            PoiCategory::Museum => ("tourism", "museum"),
            PoiCategory::Gallery => ("tourism", "gallery"),
            PoiCategory::Artwork => ("tourism", "artwork"),
            PoiCategory::Viewpoint => ("tourism", "viewpoint"),
            PoiCategory::Monument => ("historic", "monument"),
            PoiCategory::Memorial => ("historic", "memorial"),
            PoiCategory::Castle => ("historic", "castle"),
            PoiCategory::Ruins => ("historic", "ruins"),
            PoiCategory::Park => ("leisure", "park"),
            PoiCategory::Garden => ("leisure", "garden"),
            PoiCategory::PlaceOfWorship => ("amenity", "place_of_worship"),
        }
    }
}

impl fmt::Display for PoiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoiCategory {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase().replace(['-', ' '], "_");
        PoiCategory::ALL
            .iter()
            .copied()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| format!("unknown poi category: {value}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub id: String,
    pub name: String,
    pub coordinate: Coordinate,
    pub category: PoiCategory,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wikipedia: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl Poi {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        coordinate: Coordinate,
        category: PoiCategory,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            coordinate,
            category,
            address: String::new(),
            wikipedia: None,
            website: None,
        }
    }

    pub fn same_place_as(&self, other: &Poi) -> bool {
        same_place(&self.name, &self.coordinate, &other.name, &other.coordinate)
    }

    pub fn matches_waypoint(&self, waypoint: &Waypoint) -> bool {
        same_place(&self.name, &self.coordinate, &waypoint.name, &waypoint.coordinate)
    }
}

/// Name equality (case-insensitive) AND proximity below [`SAME_PLACE_TOLERANCE_M`].
pub fn same_place(name_a: &str, at_a: &Coordinate, name_b: &str, at_b: &Coordinate) -> bool {
    name_a.to_lowercase() == name_b.to_lowercase()
        && at_a.distance_to(at_b) < SAME_PLACE_TOLERANCE_M
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub name: String,
    pub coordinate: Coordinate,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<PoiCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poi_id: Option<String>,
}

impl Waypoint {
    /// Start/end point without provider identity.
    pub fn synthetic(name: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            name: name.into(),
            coordinate,
            address: String::new(),
            category: None,
            poi_id: None,
        }
    }
}

impl From<&Poi> for Waypoint {
    fn from(poi: &Poi) -> Self {
        Self {
            name: poi.name.clone(),
            coordinate: poi.coordinate,
            address: poi.address.clone(),
            category: Some(poi.category),
            poi_id: Some(poi.id.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    Succeeded,
    NotFound,
    Failed,
}

impl fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EnrichmentStatus::Succeeded => "succeeded",
            EnrichmentStatus::NotFound => "not_found",
            EnrichmentStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedPoi {
    pub poi_id: String,
    pub summary: Option<String>,
    pub image_url: Option<String>,
    pub link: Option<String>,
    pub status: EnrichmentStatus,
}
