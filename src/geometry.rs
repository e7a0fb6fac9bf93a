//! Planar geometry helpers: zone rasterization and territory dissolve.

use std::collections::BTreeMap;
use std::fmt::Debug;

use geo::{BooleanOps, BoundingRect, Centroid, Contains, MultiPolygon, Point, Polygon, Rect, coord};
use tracing::warn;

use crate::error::PartitionError;
use crate::traits::{DemandSite, Dissolve, Id, Location};

/// Default grid cell size in degrees.
pub const DEFAULT_CELL_SIZE: f64 = 0.003;

/// An input polygon carrying burden to spread over its grid cells.
#[derive(Debug, Clone)]
pub struct Zone<Z> {
    pub id: Z,
    /// Exterior in (x = lng, y = lat).
    pub polygon: Polygon<f64>,
    pub burden: f64,
}

/// One grid cell sample of a zone.
#[derive(Debug, Clone, PartialEq)]
pub struct GridPoint<Z> {
    pub id: usize,
    pub zone: Z,
    pub location: Location,
    pub weight: f64,
}

impl<Z> DemandSite for GridPoint<Z> {
    type Id = usize;

    fn id(&self) -> &usize {
        &self.id
    }

    fn location(&self) -> Location {
        self.location
    }

    fn weight(&self) -> f64 {
        self.weight
    }
}

#[derive(Debug, Clone)]
pub struct PlanarGeometry {
    cell_size: f64,
}

impl Default for PlanarGeometry {
    fn default() -> Self {
        Self {
            cell_size: DEFAULT_CELL_SIZE,
        }
    }
}

impl PlanarGeometry {
    pub fn new(cell_size: f64) -> Result<Self, PartitionError> {
        if cell_size > 0.0 && cell_size.is_finite() {
            Ok(Self { cell_size })
        } else {
            Err(PartitionError::InvalidInput(format!(
                "cell size must be positive, got {cell_size}"
            )))
        }
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Samples every zone on one global grid of `cell_size` squares anchored
    /// at the origin. A cell centre inside a zone is kept only if `keep`
    /// accepts it; the zone's burden is split evenly among the kept centres.
    /// A zone too small to contain any centre is sampled once at its
    /// centroid. A zone whose centres are all rejected is dropped.
    pub fn rasterize_zones<Z, K>(&self, zones: &[Zone<Z>], keep: K) -> Vec<GridPoint<Z>>
    where
        Z: Clone + Debug,
        K: Fn(Location) -> bool,
    {
        let mut samples = Vec::new();
        for zone in zones {
            let Some(bounds) = zone.polygon.bounding_rect() else {
                continue;
            };
            let mut inside = 0;
            let mut centres: Vec<Location> = Vec::new();
            for row in self.lattice(bounds.min().y, bounds.max().y) {
                let y = (row as f64 + 0.5) * self.cell_size;
                for column in self.lattice(bounds.min().x, bounds.max().x) {
                    let x = (column as f64 + 0.5) * self.cell_size;
                    if !zone.polygon.contains(&Point::new(x, y)) {
                        continue;
                    }
                    inside += 1;
                    if keep((y, x)) {
                        centres.push((y, x));
                    }
                }
            }
            if inside == 0 {
                if let Some(centroid) = zone.polygon.centroid() {
                    centres.push((centroid.y(), centroid.x()));
                }
            } else if centres.is_empty() {
                warn!(zone = ?zone.id, cells = inside, burden = zone.burden, "no grid cell of the zone is near a street");
                continue;
            }

            let weight = zone.burden / centres.len().max(1) as f64;
            for location in centres {
                samples.push(GridPoint {
                    id: samples.len(),
                    zone: zone.id.clone(),
                    location,
                    weight,
                });
            }
        }
        samples
    }

    /// Lattice indices of the cells overlapping `min..=max`.
    fn lattice(&self, min: f64, max: f64) -> std::ops::Range<i64> {
        (min / self.cell_size).floor() as i64..(max / self.cell_size).ceil() as i64 + 1
    }

    /// The lattice cell containing `location`. Neighbouring cells share
    /// their corner coordinates exactly.
    fn cell(&self, (lat, lng): Location) -> Polygon<f64> {
        let column = (lng / self.cell_size).floor();
        let row = (lat / self.cell_size).floor();
        Rect::new(
            coord! { x: column * self.cell_size, y: row * self.cell_size },
            coord! { x: (column + 1.0) * self.cell_size, y: (row + 1.0) * self.cell_size },
        )
        .to_polygon()
    }
}

impl Dissolve for PlanarGeometry {
    /// Each group becomes the union of its points' grid cells: one polygon
    /// per contiguous patch.
    fn dissolve<K: Id>(&self, groups: &BTreeMap<K, Vec<Location>>) -> Vec<(K, MultiPolygon<f64>)> {
        groups
            .iter()
            .map(|(key, locations)| {
                let mut cells: Vec<Polygon<f64>> = locations.iter().map(|location| self.cell(*location)).collect();
                cells.sort_by(|a, b| {
                    let (a, b) = (a.exterior().0[0], b.exterior().0[0]);
                    a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x))
                });
                cells.dedup();
                let merged = cells
                    .into_iter()
                    .fold(MultiPolygon::new(Vec::new()), |merged, cell| {
                        merged.union(&MultiPolygon::new(vec![cell]))
                    });
                (key.clone(), merged)
            })
            .collect()
    }
}
