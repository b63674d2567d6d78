use cityguide_core::curation::{find_alternatives, MAX_ALTERNATIVES};
use cityguide_core::{Coordinate, Poi, PoiCategory, Waypoint};

/// Small deterministic generator so fixtures are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn offset(&mut self) -> f64 {
        (self.next() % 2000) as f64 / 100_000.0
    }
}

fn generate_pool(seed: u64, count: usize) -> Vec<Poi> {
    let mut rng = Lcg(seed);
    (0..count)
        .map(|idx| {
            let category = PoiCategory::ALL[(rng.next() as usize) % PoiCategory::ALL.len()];
            Poi::new(
                format!("node/{idx}"),
                format!("Sight {}", rng.next() % 40),
                Coordinate::new(49.44 + rng.offset(), 11.06 + rng.offset()),
                category,
            )
        })
        .collect()
}

#[test]
fn route_members_never_come_back_as_alternatives() {
    for seed in 1..20 {
        let pool = generate_pool(seed, 90);
        let route: Vec<Waypoint> = pool.iter().step_by(7).map(Waypoint::from).collect();
        let replaced: Vec<Poi> = pool.iter().skip(3).step_by(11).cloned().collect();
        let reference = route[0].clone();

        let result = find_alternatives(&pool, &replaced, &reference, &route);
        assert!(result.len() <= MAX_ALTERNATIVES);
        for candidate in &result {
            assert!(
                route.iter().all(|stop| !candidate.poi.matches_waypoint(stop)),
                "seed {seed}: {} is already on the route",
                candidate.poi.name
            );
        }
    }
}

#[test]
fn previously_replaced_always_rank_first() {
    for seed in 1..20 {
        let pool = generate_pool(seed, 60);
        let replaced: Vec<Poi> = pool.iter().skip(1).step_by(9).cloned().collect();
        let reference = Waypoint::from(&pool[0]);
        let route = vec![reference.clone()];

        let result = find_alternatives(&pool, &replaced, &reference, &route);
        let first_regular = result
            .iter()
            .position(|candidate| !candidate.previously_replaced)
            .unwrap_or(result.len());
        assert!(result[first_regular..]
            .iter()
            .all(|candidate| !candidate.previously_replaced));
    }
}

#[test]
fn same_inputs_give_same_output() {
    let pool = generate_pool(42, 120);
    let replaced: Vec<Poi> = pool.iter().step_by(13).cloned().collect();
    let reference = Waypoint::synthetic("Hauptmarkt", Coordinate::new(49.4539, 11.0775));

    let first = find_alternatives(&pool, &replaced, &reference, &[]);
    let second = find_alternatives(&pool, &replaced, &reference, &[]);
    assert_eq!(first, second);
    assert_eq!(first.len(), MAX_ALTERNATIVES);
}
