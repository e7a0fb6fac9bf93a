//! Haversine closest-facility solver (fallback when no street network is
//! available).
//!
//! Uses great-circle distance to estimate travel cost.
//! Less accurate than a network solve (ignores roads) but always available.

use crate::error::RoutingError;
use crate::traits::{ClosestFacilitySolver, CostQuery, Id, Location, Stop, TravelMode};

/// Average driving speed assumption for time estimation.
const DEFAULT_SPEED_KMH: f64 = 40.0;

/// Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two (lat, lng) points in kilometres.
pub fn haversine_km(from: Location, to: Location) -> f64 {
    let (lat1, lng1) = from;
    let (lat2, lng2) = to;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Haversine-based closest-facility solver.
///
/// Costs are metres in `TravelMode::Distance` and seconds at an assumed
/// speed in `TravelMode::Time`. Every facility is reachable, so each point
/// gets exactly `min(k, facilities)` candidates.
#[derive(Debug, Clone)]
pub struct HaversineSolver {
    /// Assumed average driving speed in km/h.
    pub speed_kmh: f64,
}

impl Default for HaversineSolver {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
        }
    }
}

impl HaversineSolver {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    /// Convert distance in km to travel time in seconds.
    fn km_to_seconds(&self, km: f64) -> f64 {
        km / self.speed_kmh * 3600.0
    }

    fn cost(&self, from: Location, to: Location, mode: TravelMode) -> f64 {
        let km = haversine_km(from, to);
        match mode {
            TravelMode::Distance => km * 1000.0,
            TravelMode::Time => self.km_to_seconds(km),
        }
    }
}

impl ClosestFacilitySolver for HaversineSolver {
    fn ensure_available(&self) -> Result<(), RoutingError> {
        if self.speed_kmh > 0.0 {
            Ok(())
        } else {
            Err(RoutingError::Unavailable(format!(
                "haversine solver needs a positive speed, got {}",
                self.speed_kmh
            )))
        }
    }

    fn solve_closest<F: Id, P: Id>(
        &self,
        facilities: &[Stop<F>],
        points: &[Stop<P>],
        query: &CostQuery,
        k: usize,
    ) -> Result<Vec<Vec<(f64, F)>>, RoutingError> {
        Ok(points
            .iter()
            .map(|point| {
                // Great-circle distance is symmetric, so direction is moot.
                let mut row: Vec<(f64, F)> = facilities
                    .iter()
                    .map(|facility| (self.cost(facility.location, point.location, query.mode), facility.id.clone()))
                    .collect();
                row.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
                row.truncate(k);
                row
            })
            .collect())
    }
}
