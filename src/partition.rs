//! Partition orchestration.
//!
//! Distance mode carves territories with boundary barriers; capacity mode
//! assigns demand points under facility burdens and dissolves the result.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Debug;

use geo::{Area, BooleanOps, MultiPolygon};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::assignment::{AssignmentOptions, AssignmentOutcome, CandidateFallback, CapacitatedAssignmentEngine};
use crate::boundary::{BoundaryOptions, BoundarySet, solve_boundary};
use crate::error::PartitionError;
use crate::geometry::{GridPoint, PlanarGeometry, Zone};
use crate::matrix::{DEFAULT_CANDIDATES, build_distance_matrix, distribute_burden};
use crate::traits::{
    ClosestFacilitySolver, CostQuery, DemandSite, Dissolve, FacilitySite, Id, Location, RouteSolver, Stop,
    StreetProximity, TerritorySolver,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionOptions {
    pub query: CostQuery,
    /// Nearest facilities fetched per point for the distance matrix.
    pub candidates_to_find: usize,
    /// Points per closest-facility request.
    pub batch_size: usize,
    /// Cost threshold of the territory solves in distance mode.
    pub max_cost: f64,
    pub assignment: AssignmentOptions,
    pub boundary: BoundaryOptions,
    /// Grid cells farther than this many metres from any street carry no
    /// demand.
    pub street_buffer_m: f64,
}

impl Default for PartitionOptions {
    fn default() -> Self {
        Self {
            query: CostQuery::default(),
            candidates_to_find: DEFAULT_CANDIDATES,
            batch_size: 256,
            max_cost: 1_000_000.0,
            assignment: AssignmentOptions::default(),
            boundary: BoundaryOptions::default(),
            street_buffer_m: 200.0,
        }
    }
}

/// The region assigned to one facility.
#[derive(Debug, Clone, PartialEq)]
pub struct Territory<F> {
    pub facility_id: F,
    pub geometry: MultiPolygon<f64>,
    /// Target burden (capacity mode only).
    pub burden: Option<f64>,
    /// Realized assigned load (capacity mode only).
    pub assigned_load: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct DistancePartition<F: Id> {
    pub territories: Vec<Territory<F>>,
    pub boundary: BoundarySet<F>,
    /// Targets whose bisection stopped before the boundary closed.
    pub open_passes: Vec<F>,
    pub routing_calls: usize,
}

#[derive(Debug, Clone)]
pub struct CapacityPartition<F: Id, P: Id> {
    pub territories: Vec<Territory<F>>,
    pub burdens: BTreeMap<F, f64>,
    pub assignment: AssignmentOutcome<F, P>,
}

/// Working state scoped to one run.
struct RunContext<F: Id> {
    boundary: BoundarySet<F>,
    open_passes: Vec<F>,
    routing_calls: usize,
}

impl<F: Id> RunContext<F> {
    fn new() -> Self {
        Self {
            boundary: BoundarySet::new(),
            open_passes: Vec::new(),
            routing_calls: 0,
        }
    }
}

/// Partitions the network so every location belongs to its nearest facility.
///
/// Facilities are processed in input order; each one except the last is
/// bisected against the facilities after it. Territories are then solved
/// with every boundary point as a barrier. Where service areas still
/// overlap, the overlap stays with the facility listed first.
#[tracing::instrument(skip_all, fields(facilities = facilities.len()))]
pub fn partition_by_distance<S, FS>(
    service: &S,
    facilities: &[FS],
    options: &PartitionOptions,
) -> Result<DistancePartition<FS::Id>, PartitionError>
where
    S: RouteSolver + TerritorySolver,
    FS: FacilitySite,
{
    RouteSolver::ensure_available(service)
        .map_err(|err| PartitionError::routing("ensure_available", "route solver", err))?;
    TerritorySolver::ensure_available(service)
        .map_err(|err| PartitionError::routing("ensure_available", "territory solver", err))?;
    let stops = facility_stops(facilities)?;

    let mut context = RunContext::new();
    for (index, target) in stops.iter().enumerate() {
        if index + 1 == stops.len() {
            break;
        }
        let remaining = &stops[index + 1..];
        info!(facility = ?target.id, remaining = remaining.len(), "solving boundary");

        let pass = solve_boundary(
            service,
            target,
            remaining,
            &options.query,
            &mut context.boundary,
            &options.boundary,
        )?;
        context.routing_calls += pass.routing_calls;
        if !pass.closed {
            context.open_passes.push(target.id.clone());
        }
    }

    let barriers = context.boundary.locations();
    let mut territories = Vec::with_capacity(stops.len());
    for stop in &stops {
        let polygon = service
            .solve_territory(stop, &options.query, options.max_cost, &barriers)
            .map_err(|err| {
                PartitionError::routing(
                    "solve_territory",
                    format!("facility {:?} with {} barriers", stop.id, barriers.len()),
                    err,
                )
            })?;
        context.routing_calls += 1;
        let geometry = clip_to_unclaimed(MultiPolygon::new(vec![polygon]), &territories);
        territories.push(Territory {
            facility_id: stop.id.clone(),
            geometry,
            burden: None,
            assigned_load: None,
        });
    }

    if !context.open_passes.is_empty() {
        warn!(open = ?context.open_passes, "some boundaries did not close");
    }
    info!(
        boundary_points = context.boundary.len(),
        routing_calls = context.routing_calls,
        "distance partition complete"
    );

    Ok(DistancePartition {
        territories,
        boundary: context.boundary,
        open_passes: context.open_passes,
        routing_calls: context.routing_calls,
    })
}

/// Assigns demand points to facilities under capacity-proportional burdens
/// and dissolves each facility's points into its territory.
#[tracing::instrument(skip_all, fields(facilities = facilities.len(), points = points.len()))]
pub fn partition_by_capacity<S, G, FS, DS>(
    service: &S,
    geometry: &G,
    facilities: &[FS],
    points: &[DS],
    options: &PartitionOptions,
) -> Result<CapacityPartition<FS::Id, DS::Id>, PartitionError>
where
    S: ClosestFacilitySolver + Sync,
    G: Dissolve,
    FS: FacilitySite,
    DS: DemandSite,
{
    ClosestFacilitySolver::ensure_available(service)
        .map_err(|err| PartitionError::routing("ensure_available", "closest facility solver", err))?;
    let stops = facility_stops(facilities)?;
    let locations = point_locations(points)?;

    let burdens = distribute_burden(facilities, points)?;
    let matrix = build_distance_matrix(
        service,
        facilities,
        points,
        &options.query,
        options.candidates_to_find,
        options.batch_size,
    )?;

    let engine = CapacitatedAssignmentEngine::new(
        burdens.clone(),
        points.iter().map(|point| (point.id().clone(), point.weight())),
        matrix,
        options.assignment.clone(),
    );
    let mut fallback = RoutedFallback {
        service,
        facilities: stops,
        locations,
        query: options.query,
    };
    let assignment = engine.run(&mut fallback)?;

    let mut groups: BTreeMap<FS::Id, Vec<Location>> = BTreeMap::new();
    for point in points {
        if let Some(facility) = assignment.facility_of(point.id()) {
            groups.entry(facility.clone()).or_default().push(point.location());
        }
    }
    let mut dissolved: BTreeMap<FS::Id, MultiPolygon<f64>> = geometry.dissolve(&groups).into_iter().collect();

    let territories = facilities
        .iter()
        .map(|facility| {
            let id = facility.id();
            Territory {
                facility_id: id.clone(),
                geometry: dissolved.remove(id).unwrap_or_else(|| MultiPolygon::new(Vec::new())),
                burden: burdens.get(id).copied(),
                assigned_load: Some(assignment.facilities.get(id).map_or(0.0, |load| load.load)),
            }
        })
        .collect();

    info!(
        converged = assignment.converged,
        total_cost = assignment.total_cost(),
        "capacity partition complete"
    );

    Ok(CapacityPartition {
        territories,
        burdens,
        assignment,
    })
}

/// Rasterizes burden-carrying zones into grid points within
/// `street_buffer_m` of a street, then runs [`partition_by_capacity`] over
/// them.
pub fn partition_zones_by_capacity<S, FS, Z>(
    service: &S,
    geometry: &PlanarGeometry,
    facilities: &[FS],
    zones: &[Zone<Z>],
    options: &PartitionOptions,
) -> Result<(Vec<GridPoint<Z>>, CapacityPartition<FS::Id, usize>), PartitionError>
where
    S: ClosestFacilitySolver + StreetProximity + Sync,
    FS: FacilitySite,
    Z: Clone + Debug,
{
    let buffer = options.street_buffer_m;
    let points = geometry.rasterize_zones(zones, |location| {
        service
            .distance_to_street(location)
            .is_some_and(|metres| metres <= buffer)
    });
    info!(zones = zones.len(), points = points.len(), "rasterized zones");
    let partition = partition_by_capacity(service, geometry, facilities, &points, options)?;
    Ok((points, partition))
}

/// Fallback that re-solves a point against every facility not yet offered.
struct RoutedFallback<'a, S, F, P> {
    service: &'a S,
    facilities: Vec<Stop<F>>,
    locations: HashMap<P, Location>,
    query: CostQuery,
}

impl<S, F, P> CandidateFallback<F, P> for RoutedFallback<'_, S, F, P>
where
    S: ClosestFacilitySolver,
    F: Id,
    P: Id,
{
    fn fetch(&mut self, point: &P, exclude: &HashSet<F>) -> Result<Vec<(f64, F)>, PartitionError> {
        let Some(&location) = self.locations.get(point) else {
            return Ok(Vec::new());
        };
        let facilities: Vec<Stop<F>> = self
            .facilities
            .iter()
            .filter(|facility| !exclude.contains(&facility.id))
            .cloned()
            .collect();
        if facilities.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self
            .service
            .solve_closest(&facilities, &[Stop::new(point.clone(), location)], &self.query, facilities.len())
            .map_err(|err| {
                PartitionError::routing(
                    "solve_closest",
                    format!("fallback for point {:?} against {} facilities", point, facilities.len()),
                    err,
                )
            })?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }
}

/// Removes the area already claimed by earlier territories. Degenerate
/// (zero-area) shapes are left as they are.
fn clip_to_unclaimed<F>(geometry: MultiPolygon<f64>, claimed: &[Territory<F>]) -> MultiPolygon<f64> {
    if geometry.unsigned_area() <= 0.0 {
        return geometry;
    }
    claimed
        .iter()
        .filter(|earlier| earlier.geometry.unsigned_area() > 0.0)
        .fold(geometry, |remaining, earlier| remaining.difference(&earlier.geometry))
}

fn facility_stops<FS: FacilitySite>(facilities: &[FS]) -> Result<Vec<Stop<FS::Id>>, PartitionError> {
    let mut seen = HashSet::new();
    facilities
        .iter()
        .map(|facility| {
            if !seen.insert(facility.id()) {
                return Err(PartitionError::InvalidInput(format!(
                    "duplicate facility id {:?}",
                    facility.id()
                )));
            }
            Ok(Stop::new(facility.id().clone(), facility.location()))
        })
        .collect()
}

fn point_locations<DS: DemandSite>(points: &[DS]) -> Result<HashMap<DS::Id, Location>, PartitionError> {
    let mut locations = HashMap::with_capacity(points.len());
    for point in points {
        if locations.insert(point.id().clone(), point.location()).is_some() {
            return Err(PartitionError::InvalidInput(format!(
                "duplicate point id {:?}",
                point.id()
            )));
        }
    }
    Ok(locations)
}
