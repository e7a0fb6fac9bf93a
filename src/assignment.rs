//! Capacitated assignment of demand points to facilities.
//!
//! A greedy seed assigns every point to its nearest facility, then a
//! rebalancing loop moves points off overloaded facilities, cheapest
//! marginal cost first, onto facilities that still have room. The loop is a
//! bounded heuristic: it stops once the overloaded set stops shrinking for as
//! many rounds as there are facilities.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::candidates::{Candidate, CandidateHeap, PointSlot};
use crate::error::PartitionError;
use crate::matrix::DistanceMatrix;
use crate::traits::{Id, UnassignedReason};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentOptions {
    /// Hard cap on rebalancing rounds, on top of stall detection.
    pub max_rounds: usize,
    /// Maximum number of lazy closest-facility solves. `None` means no cap.
    pub max_fallback_solves: Option<usize>,
}

impl Default for AssignmentOptions {
    fn default() -> Self {
        Self {
            max_rounds: 10_000,
            max_fallback_solves: None,
        }
    }
}

/// Supplies more candidates for a point whose list ran dry.
pub trait CandidateFallback<F, P> {
    /// Returns `(cost, facility)` pairs for `point`, ignoring `exclude`.
    fn fetch(&mut self, point: &P, exclude: &HashSet<F>) -> Result<Vec<(f64, F)>, PartitionError>;
}

/// Fallback that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFallback;

impl<F, P> CandidateFallback<F, P> for NoFallback {
    fn fetch(&mut self, _point: &P, _exclude: &HashSet<F>) -> Result<Vec<(f64, F)>, PartitionError> {
        Ok(Vec::new())
    }
}

/// A facility's target burden, realized load and assigned points.
#[derive(Debug, Clone, PartialEq)]
pub struct FacilityLoad<P: Id> {
    pub burden: f64,
    pub load: f64,
    /// Assigned point id to the cost of serving it from this facility.
    pub points: BTreeMap<P, f64>,
}

impl<P: Id> FacilityLoad<P> {
    fn new(burden: f64) -> Self {
        Self {
            burden,
            load: 0.0,
            points: BTreeMap::new(),
        }
    }

    pub fn is_overloaded(&self) -> bool {
        self.load > self.burden
    }

    pub fn overload(&self) -> f64 {
        self.load - self.burden
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnassignedPoint<P> {
    pub point: P,
    pub reason: UnassignedReason,
}

#[derive(Debug, Clone)]
pub struct AssignmentOutcome<F: Id, P: Id> {
    pub facilities: BTreeMap<F, FacilityLoad<P>>,
    pub assignments: BTreeMap<P, Candidate<F>>,
    pub unassigned: Vec<UnassignedPoint<P>>,
    /// Points left on an overloaded facility with no alternative to move to.
    pub stranded: Vec<P>,
    /// Facilities still over their burden when the loop stopped.
    pub overloaded: Vec<F>,
    pub converged: bool,
    pub rounds: usize,
    pub moves: usize,
    pub fallback_solves: usize,
}

impl<F: Id, P: Id> AssignmentOutcome<F, P> {
    pub fn facility_of(&self, point: &P) -> Option<&F> {
        self.assignments.get(point).map(|candidate| &candidate.facility)
    }

    pub fn total_cost(&self) -> f64 {
        self.assignments.values().map(|candidate| candidate.cost).sum()
    }
}

/// A pending move of one point off the facility being relieved.
#[derive(Debug, Clone, PartialEq)]
struct MoveCandidate<F, P> {
    delta: f64,
    point: P,
    to: F,
    cost: f64,
}

impl<F: Id, P: Id> Eq for MoveCandidate<F, P> {}

impl<F: Id, P: Id> Ord for MoveCandidate<F, P> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.delta
            .total_cmp(&other.delta)
            .then_with(|| self.point.cmp(&other.point))
            .then_with(|| self.to.cmp(&other.to))
    }
}

impl<F: Id, P: Id> PartialOrd for MoveCandidate<F, P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct CapacitatedAssignmentEngine<F: Id, P: Id> {
    facilities: BTreeMap<F, FacilityLoad<P>>,
    points: BTreeMap<P, PointSlot<F>>,
    overloaded: BTreeSet<F>,
    /// Facilities relieved without a move since the last successful move.
    tried: BTreeSet<F>,
    unassigned: Vec<UnassignedPoint<P>>,
    options: AssignmentOptions,
    rounds: usize,
    moves: usize,
    fallback_solves: usize,
}

impl<F: Id, P: Id> CapacitatedAssignmentEngine<F, P> {
    /// `burdens` defines the facility set; `weights` the point set. Matrix
    /// rows for unknown points and candidates naming unknown facilities are
    /// ignored. A point without a matrix row starts with no candidates.
    pub fn new(
        burdens: BTreeMap<F, f64>,
        weights: impl IntoIterator<Item = (P, f64)>,
        matrix: DistanceMatrix<F, P>,
        options: AssignmentOptions,
    ) -> Self {
        let facilities: BTreeMap<F, FacilityLoad<P>> = burdens
            .into_iter()
            .map(|(id, burden)| (id, FacilityLoad::new(burden)))
            .collect();

        let mut rows = matrix.into_rows();
        let points = weights
            .into_iter()
            .map(|(id, weight)| {
                let candidates = rows
                    .remove(&id)
                    .map(|heap| known_candidates(&facilities, heap.to_sorted_vec()))
                    .unwrap_or_default();
                (id, PointSlot::new(weight, candidates))
            })
            .collect();

        Self {
            facilities,
            points,
            overloaded: BTreeSet::new(),
            tried: BTreeSet::new(),
            unassigned: Vec::new(),
            options,
            rounds: 0,
            moves: 0,
            fallback_solves: 0,
        }
    }

    pub fn run<X: CandidateFallback<F, P>>(mut self, fallback: &mut X) -> Result<AssignmentOutcome<F, P>, PartitionError> {
        self.seed(fallback)?;
        self.rebalance(fallback)?;
        Ok(self.finish())
    }

    /// Assigns every point to its nearest candidate.
    fn seed<X: CandidateFallback<F, P>>(&mut self, fallback: &mut X) -> Result<(), PartitionError> {
        let ids: Vec<P> = self.points.keys().cloned().collect();
        for id in ids {
            let empty = self.points.get(&id).is_some_and(|slot| slot.candidates().is_empty());
            if empty {
                self.try_extend(&id, fallback)?;
            }
            let Some(slot) = self.points.get_mut(&id) else {
                continue;
            };
            let weight = slot.weight();
            match slot.advance() {
                Some((_, nearest)) => self.attach(id, weight, nearest),
                None => {
                    debug!(point = ?id, "no reachable facility");
                    self.unassigned.push(UnassignedPoint {
                        point: id,
                        reason: UnassignedReason::NoReachableFacility,
                    });
                }
            }
        }
        debug!(
            overloaded = self.overloaded.len(),
            unassigned = self.unassigned.len(),
            "greedy seed complete"
        );
        Ok(())
    }

    fn rebalance<X: CandidateFallback<F, P>>(&mut self, fallback: &mut X) -> Result<(), PartitionError> {
        let facility_count = self.facilities.len();
        let mut stall = 0;

        while !self.overloaded.is_empty() && stall < facility_count {
            if self.rounds >= self.options.max_rounds {
                warn!(rounds = self.rounds, "rebalancing round cap reached");
                break;
            }
            self.rounds += 1;

            let before = self.overloaded.len();
            let Some(facility) = self.next_overloaded() else {
                break;
            };
            self.overloaded.remove(&facility);

            let moves_before = self.moves;
            self.relieve(&facility, fallback)?;
            if self.moves > moves_before {
                self.tried.clear();
            } else {
                self.tried.insert(facility.clone());
            }

            if self.is_overloaded(&facility) {
                self.overloaded.insert(facility);
            }

            if self.overloaded.len() >= before {
                stall += 1;
            } else {
                stall = 0;
            }
        }
        Ok(())
    }

    /// Largest overload first among facilities not yet tried since the last
    /// move; ties go to the smallest facility id. Once every overloaded
    /// facility has been tried, the rotation starts over.
    fn next_overloaded(&mut self) -> Option<F> {
        if self.overloaded.iter().all(|id| self.tried.contains(id)) {
            self.tried.clear();
        }
        let mut best: Option<(&F, f64)> = None;
        for id in self.overloaded.difference(&self.tried) {
            let Some(facility) = self.facilities.get(id) else {
                continue;
            };
            let overload = facility.overload();
            if best.is_none_or(|(_, current)| overload > current) {
                best = Some((id, overload));
            }
        }
        best.map(|(id, _)| id.clone())
    }

    /// Moves points off `facility`, smallest cost increase first, until it is
    /// within burden or out of moves.
    fn relieve<X: CandidateFallback<F, P>>(&mut self, facility: &F, fallback: &mut X) -> Result<(), PartitionError> {
        let assigned: Vec<(P, f64)> = match self.facilities.get(facility) {
            Some(load) => load.points.iter().map(|(p, c)| (p.clone(), *c)).collect(),
            None => return Ok(()),
        };

        let mut moves = BinaryHeap::new();
        for (point, cost) in assigned {
            let dry = self.points.get(&point).is_some_and(|slot| slot.peek_next().is_none());
            if dry {
                self.try_extend(&point, fallback)?;
            }
            let Some(next) = self.points.get(&point).and_then(|slot| slot.peek_next()) else {
                continue;
            };
            moves.push(Reverse(MoveCandidate {
                delta: next.cost - cost,
                to: next.facility.clone(),
                cost: next.cost,
                point,
            }));
        }

        while self.is_overloaded(facility) {
            let Some(Reverse(candidate)) = moves.pop() else {
                break;
            };
            if self.is_overloaded(&candidate.to) {
                continue;
            }
            self.move_point(facility, candidate);
        }
        Ok(())
    }

    fn move_point(&mut self, from: &F, candidate: MoveCandidate<F, P>) {
        let Some(slot) = self.points.get_mut(&candidate.point) else {
            return;
        };
        let weight = slot.weight();
        let Some((_, next)) = slot.advance() else {
            return;
        };
        debug_assert!(next.facility == candidate.to && next.cost == candidate.cost);

        if let Some(source) = self.facilities.get_mut(from) {
            source.points.remove(&candidate.point);
            source.load -= weight;
        }
        debug_assert!(self.load_is_consistent(from));

        self.attach(candidate.point, weight, next);
        self.moves += 1;
    }

    fn attach(&mut self, point: P, weight: f64, candidate: Candidate<F>) {
        let Some(facility) = self.facilities.get_mut(&candidate.facility) else {
            return;
        };
        facility.points.insert(point, candidate.cost);
        facility.load += weight;
        if facility.is_overloaded() {
            self.overloaded.insert(candidate.facility.clone());
        }
        debug_assert!(self.load_is_consistent(&candidate.facility));
    }

    /// Spends the point's one lazy extension. Returns how many new
    /// candidates were added.
    fn try_extend<X: CandidateFallback<F, P>>(&mut self, point: &P, fallback: &mut X) -> Result<usize, PartitionError> {
        let Some(slot) = self.points.get(point) else {
            return Ok(0);
        };
        if slot.is_extended() {
            return Ok(0);
        }
        if self
            .options
            .max_fallback_solves
            .is_some_and(|cap| self.fallback_solves >= cap)
        {
            debug!(point = ?point, "fallback solve budget exhausted");
            return Ok(0);
        }

        let fetched = fallback.fetch(point, slot.offered())?;
        self.fallback_solves += 1;

        let fetched: Vec<(f64, F)> = fetched
            .into_iter()
            .filter(|(_, facility)| self.facilities.contains_key(facility))
            .collect();
        let kept = match self.points.get_mut(point) {
            Some(slot) => slot.extend(fetched),
            None => 0,
        };
        debug!(point = ?point, kept, "extended candidate list");
        Ok(kept)
    }

    fn is_overloaded(&self, facility: &F) -> bool {
        self.facilities.get(facility).is_some_and(FacilityLoad::is_overloaded)
    }

    fn load_is_consistent(&self, facility: &F) -> bool {
        let Some(load) = self.facilities.get(facility) else {
            return true;
        };
        let expected: f64 = load
            .points
            .keys()
            .filter_map(|p| self.points.get(p))
            .map(PointSlot::weight)
            .sum();
        (expected - load.load).abs() <= 1e-6 * expected.abs().max(1.0)
    }

    fn finish(self) -> AssignmentOutcome<F, P> {
        let overloaded: Vec<F> = self.overloaded.iter().cloned().collect();
        let converged = overloaded.is_empty();

        let mut assignments = BTreeMap::new();
        let mut stranded = Vec::new();
        for (id, slot) in self.points {
            if let Some(candidate) = slot.assigned() {
                if self.overloaded.contains(&candidate.facility) && slot.peek_next().is_none() {
                    stranded.push(id.clone());
                }
                assignments.insert(id, candidate.clone());
            }
        }

        if !converged {
            warn!(
                overloaded = ?overloaded,
                rounds = self.rounds,
                "rebalancing stopped with facilities over burden"
            );
        }
        if !self.unassigned.is_empty() {
            warn!(count = self.unassigned.len(), "points left without a reachable facility");
        }
        info!(
            assigned = assignments.len(),
            moves = self.moves,
            rounds = self.rounds,
            fallback_solves = self.fallback_solves,
            "assignment complete"
        );

        AssignmentOutcome {
            facilities: self.facilities,
            assignments,
            unassigned: self.unassigned,
            stranded,
            overloaded,
            converged,
            rounds: self.rounds,
            moves: self.moves,
            fallback_solves: self.fallback_solves,
        }
    }
}

/// Keeps the cheapest entry per known facility.
fn known_candidates<F: Id, P: Id>(
    facilities: &BTreeMap<F, FacilityLoad<P>>,
    sorted: Vec<Candidate<F>>,
) -> CandidateHeap<F> {
    let mut seen = HashSet::new();
    sorted
        .into_iter()
        .filter(|c| facilities.contains_key(&c.facility) && seen.insert(c.facility.clone()))
        .map(|c| (c.cost, c.facility))
        .collect()
}
