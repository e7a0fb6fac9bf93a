//! In-process street network router.
//!
//! A directed street graph that answers closest-facility, cheapest-route and
//! service-area queries with Dijkstra. Point barriers are snapped onto the
//! network: a barrier on a street's interior closes that street in both
//! directions, a barrier on a junction closes the junction.

use std::collections::{HashMap, HashSet};

use geo::{ConvexHull, LineString, MultiPoint, Point, Polygon};
use pathfinding::prelude::{dijkstra, dijkstra_reach};

use crate::error::RoutingError;
use crate::haversine::haversine_km;
use crate::polyline::{Polyline, planar_distance_sq, project_onto_segment};
use crate::traits::{
    ClosestFacilitySolver, CostQuery, Id, Location, Route, RouteSolver, Stop, StreetProximity, TerritorySolver,
    TravelDirection, TravelMode,
};

/// Costs are searched as integer thousandths of a metre or second.
const COST_SCALE: f64 = 1000.0;

/// Barriers closer than this (in degrees) to a junction close the junction.
const JUNCTION_TOLERANCE_DEG: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
struct Street {
    from: usize,
    to: usize,
    meters: f64,
    seconds: f64,
}

impl Street {
    fn passable(&self, mode: TravelMode) -> bool {
        match mode {
            TravelMode::Distance => self.meters.is_finite(),
            TravelMode::Time => self.seconds.is_finite(),
        }
    }

    fn cost(&self, mode: TravelMode) -> u64 {
        let value = match mode {
            TravelMode::Distance => self.meters,
            TravelMode::Time => self.seconds,
        };
        (value * COST_SCALE).round() as u64
    }
}

#[derive(Debug, Default)]
struct Closures {
    junctions: HashSet<usize>,
    streets: HashSet<(usize, usize)>,
}

impl Closures {
    fn street_closed(&self, a: usize, b: usize) -> bool {
        self.streets.contains(&(a.min(b), a.max(b)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreetNetwork {
    nodes: Vec<Location>,
    index: HashMap<String, usize>,
    streets: Vec<Street>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
}

impl StreetNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a two-way street. Junctions are shared by exact coordinates.
    pub fn add_street(&mut self, a: Location, b: Location, speed_kmh: f64) {
        self.add_one_way(a, b, speed_kmh);
        self.add_one_way(b, a, speed_kmh);
    }

    pub fn add_one_way(&mut self, from: Location, to: Location, speed_kmh: f64) {
        let from = self.junction(from);
        let to = self.junction(to);
        let km = haversine_km(self.nodes[from], self.nodes[to]);
        let seconds = if speed_kmh > 0.0 { km / speed_kmh * 3600.0 } else { f64::INFINITY };

        let id = self.streets.len();
        self.streets.push(Street {
            from,
            to,
            meters: km * 1000.0,
            seconds,
        });
        self.outgoing[from].push(id);
        self.incoming[to].push(id);
    }

    pub fn junction_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn street_count(&self) -> usize {
        self.streets.len()
    }

    fn junction(&mut self, location: Location) -> usize {
        let key = location_key(location);
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(location);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        self.index.insert(key, id);
        id
    }

    fn nearest_junction(&self, location: Location) -> Option<usize> {
        self.nodes
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| haversine_km(**a, location).total_cmp(&haversine_km(**b, location)))
            .map(|(id, _)| id)
    }

    fn closures(&self, barriers: &[Location]) -> Closures {
        let mut closures = Closures::default();
        for &barrier in barriers {
            let nearest = self
                .streets
                .iter()
                .map(|street| {
                    let (a, b) = (self.nodes[street.from], self.nodes[street.to]);
                    let snapped = project_onto_segment(barrier, a, b);
                    (street, snapped, planar_distance_sq(snapped, barrier))
                })
                .min_by(|x, y| x.2.total_cmp(&y.2));
            let Some((street, snapped, _)) = nearest else {
                continue;
            };

            let tolerance = JUNCTION_TOLERANCE_DEG * JUNCTION_TOLERANCE_DEG;
            if planar_distance_sq(snapped, self.nodes[street.from]) <= tolerance {
                closures.junctions.insert(street.from);
            } else if planar_distance_sq(snapped, self.nodes[street.to]) <= tolerance {
                closures.junctions.insert(street.to);
            } else {
                closures
                    .streets
                    .insert((street.from.min(street.to), street.from.max(street.to)));
            }
        }
        closures
    }

    /// Open neighbours of `node`, following streets forward or backward.
    fn neighbours(&self, node: usize, forward: bool, mode: TravelMode, closures: &Closures) -> Vec<(usize, u64)> {
        let streets = if forward { &self.outgoing[node] } else { &self.incoming[node] };
        streets
            .iter()
            .map(|&id| &self.streets[id])
            .filter(|street| street.passable(mode))
            .filter_map(|street| {
                let next = if forward { street.to } else { street.from };
                if closures.junctions.contains(&next) || closures.street_closed(street.from, street.to) {
                    None
                } else {
                    Some((next, street.cost(mode)))
                }
            })
            .collect()
    }

    /// Groups stops by the junction they snap to, each group sorted by id.
    fn snap_stops<'s, I: Id>(&self, stops: &'s [Stop<I>]) -> HashMap<usize, Vec<&'s I>> {
        let mut snapped: HashMap<usize, Vec<&I>> = HashMap::new();
        for stop in stops {
            if let Some(node) = self.nearest_junction(stop.location) {
                snapped.entry(node).or_default().push(&stop.id);
            }
        }
        for ids in snapped.values_mut() {
            ids.sort();
        }
        snapped
    }

    fn require_streets(&self) -> Result<(), RoutingError> {
        if self.streets.is_empty() {
            Err(RoutingError::Unavailable("street network has no streets".to_string()))
        } else {
            Ok(())
        }
    }
}

impl ClosestFacilitySolver for StreetNetwork {
    fn ensure_available(&self) -> Result<(), RoutingError> {
        self.require_streets()
    }

    fn solve_closest<F: Id, P: Id>(
        &self,
        facilities: &[Stop<F>],
        points: &[Stop<P>],
        query: &CostQuery,
        k: usize,
    ) -> Result<Vec<Vec<(f64, F)>>, RoutingError> {
        let at_junction = self.snap_stops(facilities);
        // Searching from the point: against street direction when travel
        // starts at the facility.
        let forward = query.direction == TravelDirection::ToFacilities;
        let closures = Closures::default();

        Ok(points
            .iter()
            .map(|point| {
                let Some(start) = self.nearest_junction(point.location) else {
                    return Vec::new();
                };
                let mut row = Vec::with_capacity(k);
                for item in dijkstra_reach(&start, |&node| self.neighbours(node, forward, query.mode, &closures)) {
                    if row.len() >= k {
                        break;
                    }
                    if let Some(ids) = at_junction.get(&item.node) {
                        let cost = item.total_cost as f64 / COST_SCALE;
                        row.extend(ids.iter().take(k - row.len()).map(|id| (cost, (*id).clone())));
                    }
                }
                row
            })
            .collect())
    }
}

impl RouteSolver for StreetNetwork {
    fn ensure_available(&self) -> Result<(), RoutingError> {
        self.require_streets()
    }

    fn solve_route<F: Id>(
        &self,
        origins: &[Stop<F>],
        destination: Location,
        query: &CostQuery,
        barriers: &[Location],
    ) -> Result<Option<Route<F>>, RoutingError> {
        let closures = self.closures(barriers);
        let Some(target) = self.nearest_junction(destination) else {
            return Ok(None);
        };
        if closures.junctions.contains(&target) {
            return Ok(None);
        }

        let at_junction = self.snap_stops(origins);
        let forward = query.direction == TravelDirection::ToFacilities;
        let Some((path, cost)) = dijkstra(
            &target,
            |&node| self.neighbours(node, forward, query.mode, &closures),
            |node| at_junction.contains_key(node),
        ) else {
            return Ok(None);
        };

        let Some(origin) = path
            .last()
            .and_then(|node| at_junction.get(node))
            .and_then(|ids| ids.first())
        else {
            return Ok(None);
        };

        let mut points: Vec<Location> = path.iter().map(|&node| self.nodes[node]).collect();
        if !forward {
            // Read the geometry from the origin facility to the target.
            points.reverse();
        }

        Ok(Some(Route {
            origin: (*origin).clone(),
            cost: cost as f64 / COST_SCALE,
            geometry: Polyline::new(points),
        }))
    }
}

impl TerritorySolver for StreetNetwork {
    fn ensure_available(&self) -> Result<(), RoutingError> {
        self.require_streets()
    }

    /// Convex hull of every junction reachable within `max_cost`.
    fn solve_territory<F: Id>(
        &self,
        facility: &Stop<F>,
        query: &CostQuery,
        max_cost: f64,
        barriers: &[Location],
    ) -> Result<Polygon<f64>, RoutingError> {
        let empty = Polygon::new(LineString::new(Vec::new()), Vec::new());
        let closures = self.closures(barriers);
        let Some(start) = self.nearest_junction(facility.location) else {
            return Ok(empty);
        };
        if closures.junctions.contains(&start) {
            return Ok(empty);
        }

        let limit = (max_cost * COST_SCALE) as u64;
        let forward = query.direction == TravelDirection::FromFacilities;
        let reached: Vec<Point<f64>> =
            dijkstra_reach(&start, |&node| self.neighbours(node, forward, query.mode, &closures))
                .take_while(|item| item.total_cost <= limit)
                .map(|item| {
                    let (lat, lng) = self.nodes[item.node];
                    Point::new(lng, lat)
                })
                .collect();

        Ok(MultiPoint::new(reached).convex_hull())
    }
}

impl StreetProximity for StreetNetwork {
    fn distance_to_street(&self, location: Location) -> Option<f64> {
        self.streets
            .iter()
            .map(|street| {
                let snapped = project_onto_segment(location, self.nodes[street.from], self.nodes[street.to]);
                haversine_km(snapped, location) * 1000.0
            })
            .min_by(f64::total_cmp)
    }
}

fn location_key(location: Location) -> String {
    format!("{:.7},{:.7}", location.0, location.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEED: f64 = 36.0; // 10 m/s

    /// Straight east-west street: a (0,0) - b (0,0.01) - c (0,0.02).
    fn line() -> StreetNetwork {
        let mut network = StreetNetwork::new();
        network.add_street((0.0, 0.0), (0.0, 0.01), SPEED);
        network.add_street((0.0, 0.01), (0.0, 0.02), SPEED);
        network
    }

    fn distance() -> CostQuery {
        CostQuery {
            mode: TravelMode::Distance,
            direction: TravelDirection::FromFacilities,
        }
    }

    #[test]
    fn test_junctions_are_shared() {
        let network = line();
        assert_eq!(network.junction_count(), 3);
        assert_eq!(network.street_count(), 4);
    }

    #[test]
    fn test_closest_orders_by_network_cost() {
        let network = line();
        let facilities = vec![Stop::new("east", (0.0, 0.02)), Stop::new("west", (0.0, 0.0))];
        let points = vec![Stop::new(1u32, (0.0, 0.004))];

        let rows = network.solve_closest(&facilities, &points, &distance(), 5).unwrap();
        let ids: Vec<&str> = rows[0].iter().map(|(_, id)| *id).collect();
        assert_eq!(ids, vec!["west", "east"]);
        assert!(rows[0][0].0 < rows[0][1].0);
    }

    #[test]
    fn test_closest_respects_one_way_streets() {
        let mut network = StreetNetwork::new();
        network.add_one_way((0.0, 0.0), (0.0, 0.01), SPEED);
        let facilities = vec![Stop::new("f", (0.0, 0.01))];
        let points = vec![Stop::new(1u32, (0.0, 0.0))];

        let from = network.solve_closest(&facilities, &points, &distance(), 5).unwrap();
        assert!(from[0].is_empty(), "facility cannot drive against the one-way");

        let to_query = CostQuery {
            direction: TravelDirection::ToFacilities,
            ..distance()
        };
        let to = network.solve_closest(&facilities, &points, &to_query, 5).unwrap();
        assert_eq!(to[0].len(), 1);
    }

    #[test]
    fn test_route_blocked_by_barrier_on_street() {
        let network = line();
        let origins = vec![Stop::new("west", (0.0, 0.0))];

        let route = network
            .solve_route(&origins, (0.0, 0.02), &distance(), &[])
            .unwrap()
            .expect("open street has a route");
        assert_eq!(route.origin, "west");
        assert_eq!(route.geometry.points().first(), Some(&(0.0, 0.0)));

        let blocked = network
            .solve_route(&origins, (0.0, 0.02), &distance(), &[(0.0, 0.015)])
            .unwrap();
        assert!(blocked.is_none());
    }

    #[test]
    fn test_barrier_on_junction_closes_it() {
        let network = line();
        let origins = vec![Stop::new("west", (0.0, 0.0))];
        let route = network
            .solve_route(&origins, (0.0, 0.02), &distance(), &[(0.0, 0.01)])
            .unwrap();
        assert!(route.is_none());
    }

    #[test]
    fn test_territory_stops_at_barrier() {
        let mut network = line();
        network.add_street((0.0, 0.0), (0.01, 0.0), SPEED);
        let facility = Stop::new("west", (0.0, 0.0));

        let open = network.solve_territory(&facility, &distance(), 1e9, &[]).unwrap();
        let east = open.exterior().points().map(|p| p.x()).fold(f64::MIN, f64::max);
        assert!(east > 0.019, "open territory reaches the east end");

        let cut = network
            .solve_territory(&facility, &distance(), 1e9, &[(0.0, 0.005)])
            .unwrap();
        let lngs: Vec<f64> = cut.exterior().points().map(|p| p.x()).collect();
        assert!(!lngs.is_empty());
        assert!(lngs.iter().all(|lng| *lng <= 1e-12));
    }

    #[test]
    fn test_territory_respects_cost_threshold() {
        let network = line();
        let facility = Stop::new("west", (0.0, 0.0));
        // Roughly 1.1 km per street; 1.5 km reaches only the middle junction.
        let territory = network.solve_territory(&facility, &distance(), 1500.0, &[]).unwrap();
        let east = territory.exterior().points().map(|p| p.x()).fold(f64::MIN, f64::max);
        assert!((east - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_distance_to_street_measures_to_nearest_segment() {
        let network = line();
        // 0.001 degrees of latitude north of the middle of the first street.
        let metres = network.distance_to_street((0.001, 0.005)).unwrap();
        assert!((metres - 111.2).abs() < 0.5, "got {metres}");
        assert!(network.distance_to_street((0.0, 0.015)).unwrap() < 1e-6);
        assert_eq!(StreetNetwork::new().distance_to_street((0.0, 0.0)), None);
    }
}
