//! Equidistant boundary points by iterative route bisection.
//!
//! For a target facility, the cheapest route from any remaining facility is
//! cut at its midpoint and the midpoint becomes a barrier. Repeating until no
//! route is left traces the locus where the target and its nearest competitor
//! are equally far away.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PartitionError;
use crate::polyline::planar_distance_sq;
use crate::traits::{CostQuery, Id, Location, RouteSolver, Stop};

/// Midpoints closer than this (in degrees) to an existing barrier are
/// treated as the same barrier.
const DUPLICATE_TOLERANCE_DEG: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryOptions {
    /// Upper bound on boundary points found for one target.
    pub max_points_per_target: usize,
}

impl Default for BoundaryOptions {
    fn default() -> Self {
        Self {
            max_points_per_target: 10_000,
        }
    }
}

/// A network location equally costly to reach from `target` and `competitor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryPoint<F> {
    pub location: Location,
    pub target: F,
    pub competitor: F,
    /// Cost of the route that was bisected.
    pub route_cost: f64,
}

/// Boundary points in discovery order. Only ever grows.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundarySet<F> {
    points: Vec<BoundaryPoint<F>>,
}

impl<F> Default for BoundarySet<F> {
    fn default() -> Self {
        Self { points: Vec::new() }
    }
}

impl<F: Id> BoundarySet<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundaryPoint<F>> {
        self.points.iter()
    }

    pub fn locations(&self) -> Vec<Location> {
        self.points.iter().map(|point| point.location).collect()
    }

    pub fn for_target<'a>(&'a self, target: &'a F) -> impl Iterator<Item = &'a BoundaryPoint<F>> + 'a {
        self.points.iter().filter(move |point| &point.target == target)
    }

    fn push(&mut self, point: BoundaryPoint<F>) {
        self.points.push(point);
    }
}

/// Result of one target-versus-remaining pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryPass {
    pub added: usize,
    /// True when the pass ended because no route was left.
    pub closed: bool,
    pub routing_calls: usize,
}

/// Bisects routes between `target` and `remaining` until none is left,
/// appending each midpoint to `boundary`. Barriers already in `boundary`
/// from earlier passes are honored from the first solve on.
pub fn solve_boundary<R, F>(
    router: &R,
    target: &Stop<F>,
    remaining: &[Stop<F>],
    query: &CostQuery,
    boundary: &mut BoundarySet<F>,
    options: &BoundaryOptions,
) -> Result<BoundaryPass, PartitionError>
where
    R: RouteSolver,
    F: Id,
{
    let mut pass = BoundaryPass {
        added: 0,
        closed: true,
        routing_calls: 0,
    };
    if remaining.is_empty() {
        return Ok(pass);
    }

    let mut barriers = boundary.locations();
    loop {
        if pass.added >= options.max_points_per_target {
            warn!(target = ?target.id, added = pass.added, "boundary point cap reached");
            pass.closed = false;
            break;
        }

        pass.routing_calls += 1;
        let route = router
            .solve_route(remaining, target.location, query, &barriers)
            .map_err(|err| {
                PartitionError::routing(
                    "solve_route",
                    format!(
                        "target {:?} against {} facilities with {} barriers",
                        target.id,
                        remaining.len(),
                        barriers.len()
                    ),
                    err,
                )
            })?;
        let Some(route) = route else {
            break;
        };
        if route.geometry.length_km() <= 0.0 {
            // Co-located facilities: there is nothing to bisect.
            warn!(target = ?target.id, competitor = ?route.origin, "zero-length route, facilities share a location");
            pass.closed = false;
            break;
        }

        let Some(midpoint) = route
            .geometry
            .interpolate(0.5)
            .and_then(|halfway| route.geometry.project(halfway))
        else {
            warn!(target = ?target.id, competitor = ?route.origin, "route has no geometry");
            pass.closed = false;
            break;
        };

        let tolerance = DUPLICATE_TOLERANCE_DEG * DUPLICATE_TOLERANCE_DEG;
        if barriers.iter().any(|b| planar_distance_sq(*b, midpoint) <= tolerance) {
            warn!(target = ?target.id, location = ?midpoint, "router returned a route through an existing barrier");
            pass.closed = false;
            break;
        }

        debug!(
            target = ?target.id,
            competitor = ?route.origin,
            cost = route.cost,
            location = ?midpoint,
            "boundary point"
        );
        barriers.push(midpoint);
        boundary.push(BoundaryPoint {
            location: midpoint,
            target: target.id.clone(),
            competitor: route.origin,
            route_cost: route.cost,
        });
        pass.added += 1;
    }

    Ok(pass)
}
