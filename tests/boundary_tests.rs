//! Boundary bisection tests
//!
//! Uses stub routers with known stopping behavior, plus the street network
//! for cases where the midpoint location matters.

mod fixtures;

use std::cell::Cell;

use proptest::prelude::*;

use fixtures::{line_junction, line_network};
use territory_planner::boundary::{BoundaryOptions, BoundarySet, solve_boundary};
use territory_planner::error::RoutingError;
use territory_planner::polyline::Polyline;
use territory_planner::traits::{CostQuery, Id, Location, Route, RouteSolver, Stop};

/// Finds a route until `limit` barriers exist. Each route bends through a
/// different latitude, so consecutive midpoints never coincide.
struct CountdownRouter {
    limit: usize,
    calls: Cell<usize>,
}

impl CountdownRouter {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            calls: Cell::new(0),
        }
    }
}

impl RouteSolver for CountdownRouter {
    fn solve_route<F: Id>(
        &self,
        origins: &[Stop<F>],
        _destination: Location,
        _query: &CostQuery,
        barriers: &[Location],
    ) -> Result<Option<Route<F>>, RoutingError> {
        self.calls.set(self.calls.get() + 1);
        if barriers.len() >= self.limit {
            return Ok(None);
        }
        let bend = barriers.len() as f64 + 1.0;
        Ok(Some(Route {
            origin: origins[0].id.clone(),
            cost: 10.0,
            geometry: Polyline::new(vec![(0.0, 0.0), (bend, 1.0), (0.0, 2.0)]),
        }))
    }
}

/// Returns the same route no matter which barriers are set.
struct StubbornRouter;

impl RouteSolver for StubbornRouter {
    fn solve_route<F: Id>(
        &self,
        origins: &[Stop<F>],
        _destination: Location,
        _query: &CostQuery,
        _barriers: &[Location],
    ) -> Result<Option<Route<F>>, RoutingError> {
        Ok(Some(Route {
            origin: origins[0].id.clone(),
            cost: 1.0,
            geometry: Polyline::new(vec![(0.0, 0.0), (0.0, 2.0)]),
        }))
    }
}

struct FailingRouter;

impl RouteSolver for FailingRouter {
    fn solve_route<F: Id>(
        &self,
        _origins: &[Stop<F>],
        _destination: Location,
        _query: &CostQuery,
        _barriers: &[Location],
    ) -> Result<Option<Route<F>>, RoutingError> {
        Err(RoutingError::InvalidResponse("no solve".to_string()))
    }
}

fn stops() -> (Stop<&'static str>, Vec<Stop<&'static str>>) {
    (Stop::new("a", (0.0, 0.0)), vec![Stop::new("b", (0.0, 2.0))])
}

proptest! {
    #[test]
    fn prop_bisection_stops_after_last_route(limit in 0usize..60) {
        let router = CountdownRouter::new(limit);
        let (target, remaining) = stops();
        let mut boundary = BoundarySet::new();

        let pass = solve_boundary(
            &router,
            &target,
            &remaining,
            &CostQuery::default(),
            &mut boundary,
            &BoundaryOptions::default(),
        )
        .unwrap();

        prop_assert!(pass.closed);
        prop_assert_eq!(pass.added, limit);
        prop_assert_eq!(pass.routing_calls, limit + 1);
        prop_assert_eq!(router.calls.get(), limit + 1);
        prop_assert_eq!(boundary.len(), limit);
    }
}

#[test]
fn test_single_facility_has_empty_boundary() {
    let router = CountdownRouter::new(5);
    let mut boundary = BoundarySet::new();

    let pass = solve_boundary(
        &router,
        &Stop::new("a", (0.0, 0.0)),
        &[],
        &CostQuery::default(),
        &mut boundary,
        &BoundaryOptions::default(),
    )
    .unwrap();

    assert!(pass.closed);
    assert_eq!(pass.added, 0);
    assert_eq!(pass.routing_calls, 0);
    assert_eq!(router.calls.get(), 0);
    assert!(boundary.is_empty());
}

#[test]
fn test_point_cap_leaves_pass_open() {
    let router = CountdownRouter::new(20);
    let (target, remaining) = stops();
    let mut boundary = BoundarySet::new();
    let options = BoundaryOptions {
        max_points_per_target: 5,
    };

    let pass = solve_boundary(&router, &target, &remaining, &CostQuery::default(), &mut boundary, &options).unwrap();

    assert!(!pass.closed);
    assert_eq!(pass.added, 5);
    assert_eq!(pass.routing_calls, 5);
}

#[test]
fn test_router_ignoring_barriers_is_detected() {
    let (target, remaining) = stops();
    let mut boundary = BoundarySet::new();

    let pass = solve_boundary(
        &StubbornRouter,
        &target,
        &remaining,
        &CostQuery::default(),
        &mut boundary,
        &BoundaryOptions::default(),
    )
    .unwrap();

    assert!(!pass.closed);
    assert_eq!(pass.added, 1);
    assert_eq!(pass.routing_calls, 2);
}

#[test]
fn test_colocated_facilities_add_no_barrier() {
    let network = line_network(5, 50.0);
    let target = Stop::new("a", line_junction(2));
    let remaining = vec![Stop::new("b", line_junction(2))];
    let mut boundary = BoundarySet::new();

    let pass = solve_boundary(
        &network,
        &target,
        &remaining,
        &CostQuery::default(),
        &mut boundary,
        &BoundaryOptions::default(),
    )
    .unwrap();

    assert!(!pass.closed);
    assert_eq!(pass.added, 0);
    assert_eq!(pass.routing_calls, 1);
    assert!(boundary.is_empty());
}

#[test]
fn test_routing_failure_aborts_pass() {
    let (target, remaining) = stops();
    let mut boundary = BoundarySet::new();

    let result = solve_boundary(
        &FailingRouter,
        &target,
        &remaining,
        &CostQuery::default(),
        &mut boundary,
        &BoundaryOptions::default(),
    );

    assert!(result.is_err());
    assert!(boundary.is_empty());
}

#[test]
fn test_barriers_accumulate_across_passes() {
    let router = CountdownRouter::new(3);
    let (target, remaining) = stops();
    let mut boundary = BoundarySet::new();

    let first = solve_boundary(
        &router,
        &target,
        &remaining,
        &CostQuery::default(),
        &mut boundary,
        &BoundaryOptions::default(),
    )
    .unwrap();
    // The second pass sees the first pass's barriers and stops right away.
    let second = solve_boundary(
        &router,
        &Stop::new("b", (0.0, 2.0)),
        &[Stop::new("c", (0.0, 4.0))],
        &CostQuery::default(),
        &mut boundary,
        &BoundaryOptions::default(),
    )
    .unwrap();

    assert_eq!(first.added, 3);
    assert_eq!(second.added, 0);
    assert_eq!(second.routing_calls, 1);
    assert_eq!(boundary.len(), 3);
    assert!(boundary.for_target(&"a").all(|point| point.competitor == "b"));
}

#[test]
fn test_line_network_is_cut_at_midpoint_junction() {
    let network = line_network(11, 50.0);
    let target = Stop::new("a", line_junction(0));
    let remaining = vec![Stop::new("b", line_junction(10))];
    let mut boundary = BoundarySet::new();

    let pass = solve_boundary(
        &network,
        &target,
        &remaining,
        &CostQuery::default(),
        &mut boundary,
        &BoundaryOptions::default(),
    )
    .unwrap();

    assert!(pass.closed);
    assert_eq!(pass.added, 1);
    assert_eq!(pass.routing_calls, 2);

    let point = boundary.iter().next().unwrap();
    let (lat, lng) = point.location;
    let (mid_lat, mid_lng) = line_junction(5);
    assert!((lat - mid_lat).abs() < 1e-9);
    assert!((lng - mid_lng).abs() < 1e-9);
    assert_eq!(point.target, "a");
    assert_eq!(point.competitor, "b");
    assert!(point.route_cost > 0.0);
}
