//! Distance matrix construction and burden distribution.

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::debug;

use crate::candidates::CandidateHeap;
use crate::error::{PartitionError, RoutingError};
use crate::traits::{ClosestFacilitySolver, CostQuery, DemandSite, FacilitySite, Id, Stop};

/// Default number of nearest facilities fetched per point.
pub const DEFAULT_CANDIDATES: usize = 5;

/// Per-point ascending candidate lists, keyed by point id.
#[derive(Debug, Clone)]
pub struct DistanceMatrix<F: Id, P: Id> {
    rows: BTreeMap<P, CandidateHeap<F>>,
}

impl<F: Id, P: Id> Default for DistanceMatrix<F, P> {
    fn default() -> Self {
        Self { rows: BTreeMap::new() }
    }
}

impl<F: Id, P: Id> DistanceMatrix<F, P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the candidate list of a point, replacing any previous row.
    pub fn insert(&mut self, point: P, candidates: impl IntoIterator<Item = (f64, F)>) {
        self.rows.insert(point, candidates.into_iter().collect());
    }

    pub fn get(&self, point: &P) -> Option<&CandidateHeap<F>> {
        self.rows.get(point)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Points that no facility can reach.
    pub fn unreachable(&self) -> impl Iterator<Item = &P> + '_ {
        self.rows
            .iter()
            .filter(|(_, heap)| heap.is_empty())
            .map(|(point, _)| point)
    }

    pub(crate) fn into_rows(self) -> BTreeMap<P, CandidateHeap<F>> {
        self.rows
    }
}

/// Queries the k nearest facilities of every point.
///
/// Points are solved in batches of `batch_size`; batches run in parallel and
/// are merged back in input order.
pub fn build_distance_matrix<S, FS, DS>(
    solver: &S,
    facilities: &[FS],
    points: &[DS],
    query: &CostQuery,
    k: usize,
    batch_size: usize,
) -> Result<DistanceMatrix<FS::Id, DS::Id>, PartitionError>
where
    S: ClosestFacilitySolver + Sync,
    FS: FacilitySite,
    DS: DemandSite,
{
    let facility_stops: Vec<Stop<FS::Id>> = facilities
        .iter()
        .map(|facility| Stop::new(facility.id().clone(), facility.location()))
        .collect();
    let point_stops: Vec<Stop<DS::Id>> = points
        .iter()
        .map(|point| Stop::new(point.id().clone(), point.location()))
        .collect();

    let batch_size = batch_size.max(1);
    debug!(
        points = point_stops.len(),
        facilities = facility_stops.len(),
        k,
        batch_size,
        "building distance matrix"
    );

    let batches: Vec<Vec<Vec<(f64, FS::Id)>>> = point_stops
        .par_chunks(batch_size)
        .map(|batch| {
            let rows = solver
                .solve_closest(&facility_stops, batch, query, k)
                .map_err(|err| {
                    PartitionError::routing(
                        "solve_closest",
                        format!("{} points x {} facilities, k = {}", batch.len(), facility_stops.len(), k),
                        err,
                    )
                })?;
            if rows.len() != batch.len() {
                return Err(PartitionError::routing(
                    "solve_closest",
                    format!("batch of {} points", batch.len()),
                    RoutingError::InvalidResponse(format!("expected {} rows, got {}", batch.len(), rows.len())),
                ));
            }
            Ok(rows)
        })
        .collect::<Result<_, PartitionError>>()?;

    let mut matrix = DistanceMatrix::new();
    for (stop, mut row) in point_stops.into_iter().zip(batches.into_iter().flatten()) {
        row.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        row.truncate(k);
        matrix.insert(stop.id, row);
    }

    debug!(unreachable = matrix.unreachable().count(), "distance matrix built");
    Ok(matrix)
}

/// Spreads total demand over facilities in proportion to their capacity.
///
/// Each facility's burden is `capacity * (total weight / total capacity)`.
pub fn distribute_burden<FS, DS>(facilities: &[FS], points: &[DS]) -> Result<BTreeMap<FS::Id, f64>, PartitionError>
where
    FS: FacilitySite,
    DS: DemandSite,
{
    if let Some(facility) = facilities.iter().find(|f| !(f.capacity() >= 0.0)) {
        return Err(PartitionError::InvalidInput(format!(
            "facility {:?} has invalid capacity {}",
            facility.id(),
            facility.capacity()
        )));
    }
    if let Some(point) = points.iter().find(|p| !(p.weight() >= 0.0)) {
        return Err(PartitionError::InvalidInput(format!(
            "point {:?} has invalid weight {}",
            point.id(),
            point.weight()
        )));
    }

    let total_demand: f64 = points.iter().map(|p| p.weight()).sum();
    let total_capacity: f64 = facilities.iter().map(|f| f.capacity()).sum();

    let ratio = if total_capacity > 0.0 {
        total_demand / total_capacity
    } else if total_demand == 0.0 {
        0.0
    } else {
        return Err(PartitionError::InvalidInput(
            "total facility capacity is zero but demand is not".to_string(),
        ));
    };

    Ok(facilities
        .iter()
        .map(|facility| (facility.id().clone(), facility.capacity() * ratio))
        .collect())
}
