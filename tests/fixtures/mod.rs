//! Test fixtures for territory-planner.
//!
//! Provides:
//! - Builders for facilities and demand points
//! - A scripted closest-facility solver with fixed costs
//! - Small street networks with predictable shortest paths

#![allow(dead_code)]

pub mod las_vegas_locations;

pub use las_vegas_locations::*;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use territory_planner::error::RoutingError;
use territory_planner::network::StreetNetwork;
use territory_planner::traits::{ClosestFacilitySolver, CostQuery, DemandSite, FacilitySite, Id, Location, Stop};

/// Builder for test facilities with sensible defaults.
#[derive(Debug, Clone)]
pub struct TestFacility {
    pub id: String,
    pub location: Location,
    pub capacity: f64,
}

impl TestFacility {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            location: (0.0, 0.0),
            capacity: 1.0,
        }
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn with_capacity(mut self, capacity: f64) -> Self {
        self.capacity = capacity;
        self
    }
}

impl FacilitySite for TestFacility {
    type Id = String;

    fn id(&self) -> &String {
        &self.id
    }

    fn location(&self) -> Location {
        self.location
    }

    fn capacity(&self) -> f64 {
        self.capacity
    }
}

/// Builder for test demand points.
#[derive(Debug, Clone)]
pub struct TestPoint {
    pub id: String,
    pub location: Location,
    pub weight: f64,
}

impl TestPoint {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            location: (0.0, 0.0),
            weight: 1.0,
        }
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

impl DemandSite for TestPoint {
    type Id = String;

    fn id(&self) -> &String {
        &self.id
    }

    fn location(&self) -> Location {
        self.location
    }

    fn weight(&self) -> f64 {
        self.weight
    }
}

/// Closest-facility solver answering from a fixed cost table.
///
/// Pairs are keyed by the `Debug` form of the ids, so `"A"` and
/// `String::from("A")` address the same entry. Missing pairs are unreachable.
#[derive(Debug, Default)]
pub struct ScriptedSolver {
    costs: HashMap<(String, String), f64>,
    calls: AtomicUsize,
}

impl ScriptedSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cost(mut self, facility: &str, point: &str, cost: f64) -> Self {
        self.costs.insert((format!("{:?}", facility), format!("{:?}", point)), cost);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ClosestFacilitySolver for ScriptedSolver {
    fn solve_closest<F: Id, P: Id>(
        &self,
        facilities: &[Stop<F>],
        points: &[Stop<P>],
        _query: &CostQuery,
        k: usize,
    ) -> Result<Vec<Vec<(f64, F)>>, RoutingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(points
            .iter()
            .map(|point| {
                let point_key = format!("{:?}", point.id);
                let mut row: Vec<(f64, F)> = facilities
                    .iter()
                    .filter_map(|facility| {
                        self.costs
                            .get(&(format!("{:?}", facility.id), point_key.clone()))
                            .map(|cost| (*cost, facility.id.clone()))
                    })
                    .collect();
                row.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
                row.truncate(k);
                row
            })
            .collect())
    }
}

/// Latitude of every junction of [`line_network`].
pub const LINE_LAT: f64 = 36.0;

/// Longitude of junction `i` of [`line_network`].
pub fn line_lng(i: usize) -> f64 {
    -115.10 + i as f64 * 0.01
}

pub fn line_junction(i: usize) -> Location {
    (LINE_LAT, line_lng(i))
}

/// A straight east-west road of `junctions` evenly spaced junctions.
pub fn line_network(junctions: usize, speed_kmh: f64) -> StreetNetwork {
    let mut network = StreetNetwork::new();
    for i in 1..junctions {
        network.add_street(line_junction(i - 1), line_junction(i), speed_kmh);
    }
    network
}
