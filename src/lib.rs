//! territory-planner core
//!
//! Partitions a service region among capacity-constrained facilities on a
//! street network, either by capacitated assignment of demand points or by
//! equidistant boundaries found through route bisection.

pub mod traits;
pub mod error;
pub mod candidates;
pub mod matrix;
pub mod assignment;
pub mod boundary;
pub mod partition;
pub mod network;
pub mod osrm;
pub mod haversine;
pub mod polyline;
pub mod geometry;
