//! Core domain traits for the territory planner.
//!
//! Input records (facilities, demand points) and the routing/geometry
//! collaborators are expressed as traits. Concrete apps implement the input
//! traits for their own data models; the crate ships `StreetNetwork`,
//! `HaversineSolver`, `OsrmClient` and `PlanarGeometry` as collaborators.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::hash::Hash;

use geo::{MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};

use crate::error::RoutingError;
use crate::polyline::Polyline;

/// Unique identifier for planner entities.
///
/// `Ord` is required so every tie in the algorithms can be broken by id.
pub trait Id: Clone + Eq + Hash + Ord + Debug + Send + Sync {}

impl<T> Id for T where T: Clone + Eq + Hash + Ord + Debug + Send + Sync {}

/// Geographic position as (lat, lng).
pub type Location = (f64, f64);

/// A capacity-bounded service point.
pub trait FacilitySite {
    type Id: Id;

    fn id(&self) -> &Self::Id;

    /// Location coordinates (lat, lng).
    fn location(&self) -> Location;

    /// Capacity in the facility's own units. Normalized into burden before use.
    fn capacity(&self) -> f64;
}

/// A unit of spatial demand to be served by exactly one facility.
pub trait DemandSite {
    type Id: Id;

    fn id(&self) -> &Self::Id;

    /// Location coordinates (lat, lng).
    fn location(&self) -> Location;

    /// Scalar demand carried by this point.
    fn weight(&self) -> f64;
}

/// An identified location handed to a routing collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct Stop<I> {
    pub id: I,
    pub location: Location,
}

impl<I> Stop<I> {
    pub fn new(id: I, location: Location) -> Self {
        Self { id, location }
    }
}

/// Which impedance the routing collaborator minimizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TravelMode {
    #[default]
    Time,
    Distance,
}

/// Whether travel is measured from facilities out to points, or inward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TravelDirection {
    #[default]
    FromFacilities,
    ToFacilities,
}

/// Cost mode and direction shared by every routing call of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CostQuery {
    pub mode: TravelMode,
    pub direction: TravelDirection,
}

/// Cheapest route found between an origin facility and a destination.
#[derive(Debug, Clone, PartialEq)]
pub struct Route<I> {
    /// The origin the route starts from (the nearest competitor).
    pub origin: I,
    pub cost: f64,
    pub geometry: Polyline,
}

/// Finds the k nearest facilities of each point.
pub trait ClosestFacilitySolver {
    /// Capability check performed before a run mutates anything.
    fn ensure_available(&self) -> Result<(), RoutingError> {
        Ok(())
    }

    /// Returns, per point in input order, up to `k` `(cost, facility id)`
    /// pairs in ascending cost order. An unreachable point gets an empty list.
    fn solve_closest<F: Id, P: Id>(
        &self,
        facilities: &[Stop<F>],
        points: &[Stop<P>],
        query: &CostQuery,
        k: usize,
    ) -> Result<Vec<Vec<(f64, F)>>, RoutingError>;
}

/// Finds the cheapest route from any origin to one destination.
pub trait RouteSolver {
    fn ensure_available(&self) -> Result<(), RoutingError> {
        Ok(())
    }

    /// `Ok(None)` means no route exists under the given barriers.
    fn solve_route<F: Id>(
        &self,
        origins: &[Stop<F>],
        destination: Location,
        query: &CostQuery,
        barriers: &[Location],
    ) -> Result<Option<Route<F>>, RoutingError>;
}

/// Produces the service-area polygon of one facility.
pub trait TerritorySolver {
    fn ensure_available(&self) -> Result<(), RoutingError> {
        Ok(())
    }

    fn solve_territory<F: Id>(
        &self,
        facility: &Stop<F>,
        query: &CostQuery,
        max_cost: f64,
        barriers: &[Location],
    ) -> Result<Polygon<f64>, RoutingError>;
}

/// Distance from a location to the nearest street, used to drop grid cells
/// no street serves.
pub trait StreetProximity {
    /// Metres to the nearest street, or `None` when there are no streets.
    fn distance_to_street(&self, location: Location) -> Option<f64>;
}

/// Merges point samples sharing a group key into one territory per key.
pub trait Dissolve {
    fn dissolve<K: Id>(&self, groups: &BTreeMap<K, Vec<Location>>) -> Vec<(K, MultiPolygon<f64>)>;
}

/// Why a demand point ended a run without a facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnassignedReason {
    /// No facility is reachable from the point, even after a full solve.
    NoReachableFacility,
}
