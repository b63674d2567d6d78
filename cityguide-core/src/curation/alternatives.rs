use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::poi::{EnrichedPoi, Poi, Waypoint};

pub const MAX_ALTERNATIVES: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlternativeCandidate {
    pub poi: Poi,
    pub distance_m: f64,
    pub category_match: bool,
    pub previously_replaced: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwipeCard {
    pub candidate: AlternativeCandidate,
    pub enrichment: Option<EnrichedPoi>,
}

impl SwipeCard {
    pub fn was_previously_replaced(&self) -> bool {
        self.candidate.previously_replaced
    }
}

/// Ranked replacement candidates for `reference`.
///
/// Previously replaced POIs stay eligible and rank first, then POIs sharing
/// the reference category, then the nearest. Anything already represented in
/// `route` is excluded. Pure; the same inputs always give the same output.
pub fn find_alternatives(
    pool: &[Poi],
    previously_replaced: &[Poi],
    reference: &Waypoint,
    route: &[Waypoint],
) -> Vec<AlternativeCandidate> {
    let replaced_ids: HashSet<&str> = previously_replaced.iter().map(|p| p.id.as_str()).collect();

    let mut seen = HashSet::new();
    let mut candidates: Vec<AlternativeCandidate> = pool
        .iter()
        .chain(previously_replaced.iter())
        .filter(|poi| seen.insert(poi.id.as_str()))
        .filter(|poi| !route.iter().any(|waypoint| poi.matches_waypoint(waypoint)))
        .map(|poi| AlternativeCandidate {
            poi: poi.clone(),
            distance_m: poi.coordinate.distance_to(&reference.coordinate),
            category_match: reference.category == Some(poi.category),
            previously_replaced: replaced_ids.contains(poi.id.as_str()),
        })
        .collect();

    candidates.sort_by(rank);
    candidates.truncate(MAX_ALTERNATIVES);
    candidates
}

fn rank(a: &AlternativeCandidate, b: &AlternativeCandidate) -> Ordering {
    b.previously_replaced
        .cmp(&a.previously_replaced)
        .then_with(|| b.category_match.cmp(&a.category_match))
        .then_with(|| a.distance_m.total_cmp(&b.distance_m))
}

pub fn swipe_cards(
    candidates: Vec<AlternativeCandidate>,
    enrichment: &HashMap<String, EnrichedPoi>,
) -> Vec<SwipeCard> {
    candidates
        .into_iter()
        .map(|candidate| SwipeCard {
            enrichment: enrichment.get(&candidate.poi.id).cloned(),
            candidate,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poi::{Coordinate, EnrichmentStatus, PoiCategory};

    fn poi(id: &str, name: &str, lat: f64, lon: f64, category: PoiCategory) -> Poi {
        Poi::new(id, name, Coordinate::new(lat, lon), category)
    }

    fn reference() -> Waypoint {
        let mut waypoint = Waypoint::synthetic("Museum X", Coordinate::new(49.4530, 11.0780));
        waypoint.category = Some(PoiCategory::Museum);
        waypoint
    }

    #[test]
    fn excludes_pois_already_in_route() {
        let route = vec![reference()];
        let pool = vec![
            poi("a", "museum x", 49.45302, 11.07805, PoiCategory::Museum),
            poi("b", "Museum X", 49.4600, 11.0780, PoiCategory::Museum),
            poi("c", "Park", 49.4531, 11.0781, PoiCategory::Park),
        ];
        let result = find_alternatives(&pool, &[], &reference(), &route);
        let ids: Vec<&str> = result.iter().map(|c| c.poi.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn ordering_prefers_replaced_then_category_then_distance() {
        let pool = vec![
            poi("near-park", "Park", 49.4531, 11.0780, PoiCategory::Park),
            poi("far-museum", "Far Museum", 49.4700, 11.0780, PoiCategory::Museum),
            poi("near-museum", "Near Museum", 49.4540, 11.0780, PoiCategory::Museum),
        ];
        let replaced = vec![poi("old", "Old Choice", 49.5000, 11.2000, PoiCategory::Garden)];
        let result = find_alternatives(&pool, &replaced, &reference(), &[]);
        let ids: Vec<&str> = result.iter().map(|c| c.poi.id.as_str()).collect();
        assert_eq!(ids, vec!["old", "near-museum", "far-museum", "near-park"]);
        assert!(result[0].previously_replaced);
        assert!(!result[1].previously_replaced);
        assert!(result[1].category_match);
    }

    #[test]
    fn poi_in_pool_and_replaced_list_appears_once_flagged() {
        let shared = poi("shared", "Garden", 49.46, 11.08, PoiCategory::Garden);
        let result = find_alternatives(&[shared.clone()], &[shared], &reference(), &[]);
        assert_eq!(result.len(), 1);
        assert!(result[0].previously_replaced);
    }

    #[test]
    fn output_is_capped() {
        let pool: Vec<Poi> = (0..80)
            .map(|idx| poi(&format!("p{idx}"), &format!("Place {idx}"), 49.40 + idx as f64 * 0.001, 11.0, PoiCategory::Park))
            .collect();
        let result = find_alternatives(&pool, &[], &reference(), &[]);
        assert_eq!(result.len(), MAX_ALTERNATIVES);
        assert!(result.windows(2).all(|pair| pair[0].distance_m <= pair[1].distance_m));
    }

    #[test]
    fn swipe_cards_attach_enrichment() {
        let pool = vec![poi("a", "A", 49.46, 11.08, PoiCategory::Museum)];
        let candidates = find_alternatives(&pool, &[], &reference(), &[]);
        let mut enrichment = HashMap::new();
        enrichment.insert(
            "a".to_string(),
            EnrichedPoi {
                poi_id: "a".into(),
                summary: Some("A museum".into()),
                image_url: None,
                link: None,
                status: EnrichmentStatus::Succeeded,
            },
        );
        let cards = swipe_cards(candidates, &enrichment);
        assert_eq!(cards.len(), 1);
        assert!(cards[0].enrichment.is_some());
        assert!(!cards[0].was_previously_replaced());
    }
}
