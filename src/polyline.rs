//! Polyline representation for route geometries.
//!
//! Points are (lat, lng) tuples. Lengths are great-circle kilometres;
//! projection treats coordinates as planar, which holds at street scale.

use serde::{Deserialize, Serialize};

use crate::haversine::haversine_km;
use crate::traits::Location;

/// A polyline representing a route geometry as decoded coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<Location>,
}

impl Polyline {
    /// Creates a new Polyline from decoded coordinate points.
    ///
    /// Each point is a (latitude, longitude) tuple.
    pub fn new(points: Vec<Location>) -> Self {
        Self { points }
    }

    /// Returns a reference to the coordinate points.
    pub fn points(&self) -> &[Location] {
        &self.points
    }

    /// Consumes the polyline and returns the owned coordinate points.
    pub fn into_points(self) -> Vec<Location> {
        self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Total length in kilometres.
    pub fn length_km(&self) -> f64 {
        self.points
            .windows(2)
            .map(|pair| haversine_km(pair[0], pair[1]))
            .sum()
    }

    /// The point at `fraction` (clamped to 0..=1) of the polyline's length.
    pub fn interpolate(&self, fraction: f64) -> Option<Location> {
        let first = *self.points.first()?;
        let total = self.length_km();
        if total <= 0.0 {
            return Some(first);
        }

        let target = total * fraction.clamp(0.0, 1.0);
        let mut walked = 0.0;
        for pair in self.points.windows(2) {
            let segment = haversine_km(pair[0], pair[1]);
            if segment > 0.0 && walked + segment >= target {
                let t = (target - walked) / segment;
                return Some(lerp(pair[0], pair[1], t));
            }
            walked += segment;
        }
        self.points.last().copied()
    }

    /// The point on the polyline closest to `location`.
    pub fn project(&self, location: Location) -> Option<Location> {
        match self.points.as_slice() {
            [] => None,
            [only] => Some(*only),
            points => points
                .windows(2)
                .map(|pair| project_onto_segment(location, pair[0], pair[1]))
                .min_by(|a, b| planar_distance_sq(*a, location).total_cmp(&planar_distance_sq(*b, location))),
        }
    }
}

fn lerp(a: Location, b: Location, t: f64) -> Location {
    (a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t)
}

pub(crate) fn planar_distance_sq(a: Location, b: Location) -> f64 {
    let dlat = a.0 - b.0;
    let dlng = a.1 - b.1;
    dlat * dlat + dlng * dlng
}

/// Closest point to `p` on the segment `a`–`b`, in planar coordinates.
pub(crate) fn project_onto_segment(p: Location, a: Location, b: Location) -> Location {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return a;
    }
    let t = (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len_sq).clamp(0.0, 1.0);
    lerp(a, b, t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Location, b: Location) -> bool {
        (a.0 - b.0).abs() < 1e-9 && (a.1 - b.1).abs() < 1e-9
    }

    #[test]
    fn test_new_and_points() {
        let points = vec![(38.5, -120.2), (40.7, -120.95), (43.252, -126.453)];
        let polyline = Polyline::new(points.clone());
        assert_eq!(polyline.points(), &points[..]);
        assert_eq!(polyline.into_points(), points);
    }

    #[test]
    fn test_empty_polyline() {
        let polyline = Polyline::new(vec![]);
        assert!(polyline.is_empty());
        assert_eq!(polyline.length_km(), 0.0);
        assert!(polyline.interpolate(0.5).is_none());
        assert!(polyline.project((0.0, 0.0)).is_none());
    }

    #[test]
    fn test_midpoint_of_straight_line() {
        let polyline = Polyline::new(vec![(0.0, 0.0), (0.0, 0.01)]);
        let mid = polyline.interpolate(0.5).unwrap();
        assert!(close(mid, (0.0, 0.005)), "got {:?}", mid);
    }

    #[test]
    fn test_midpoint_lands_on_longer_segment() {
        // Segments of 0.01 and 0.03 degrees along the equator.
        let polyline = Polyline::new(vec![(0.0, 0.0), (0.0, 0.01), (0.0, 0.04)]);
        let mid = polyline.interpolate(0.5).unwrap();
        assert!(close(mid, (0.0, 0.02)), "got {:?}", mid);
    }

    #[test]
    fn test_single_point_interpolates_to_itself() {
        let polyline = Polyline::new(vec![(1.5, 2.5)]);
        assert_eq!(polyline.interpolate(0.5), Some((1.5, 2.5)));
    }

    #[test]
    fn test_project_snaps_onto_nearest_segment() {
        let polyline = Polyline::new(vec![(0.0, 0.0), (0.0, 1.0), (1.0, 1.0)]);
        let snapped = polyline.project((0.2, 0.5)).unwrap();
        assert!(close(snapped, (0.0, 0.5)), "got {:?}", snapped);
    }

    #[test]
    fn test_project_clamps_to_endpoints() {
        let polyline = Polyline::new(vec![(0.0, 0.0), (0.0, 1.0)]);
        let snapped = polyline.project((0.0, 3.0)).unwrap();
        assert!(close(snapped, (0.0, 1.0)));
    }
}
