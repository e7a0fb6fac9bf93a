//! Point-local candidate heaps and the slot that couples them with an
//! assignment.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use crate::traits::Id;

/// A facility a point could be served by, at a given cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<F> {
    pub cost: f64,
    pub facility: F,
}

impl<F: Id> Eq for Candidate<F> {}

impl<F: Id> Ord for Candidate<F> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then_with(|| self.facility.cmp(&other.facility))
    }
}

impl<F: Id> PartialOrd for Candidate<F> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap over `(cost, facility)`, ties broken by facility id.
#[derive(Debug, Clone)]
pub struct CandidateHeap<F: Id> {
    heap: BinaryHeap<Reverse<Candidate<F>>>,
}

impl<F: Id> Default for CandidateHeap<F> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }
}

impl<F: Id> CandidateHeap<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cost: f64, facility: F) {
        self.heap.push(Reverse(Candidate { cost, facility }));
    }

    pub fn pop(&mut self) -> Option<Candidate<F>> {
        self.heap.pop().map(|Reverse(candidate)| candidate)
    }

    pub fn peek(&self) -> Option<&Candidate<F>> {
        self.heap.peek().map(|Reverse(candidate)| candidate)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Remaining candidates in ascending order, without consuming the heap.
    pub fn to_sorted_vec(&self) -> Vec<Candidate<F>> {
        let mut items: Vec<_> = self.heap.iter().map(|Reverse(c)| c.clone()).collect();
        items.sort();
        items
    }
}

impl<F: Id> FromIterator<(f64, F)> for CandidateHeap<F> {
    fn from_iter<T: IntoIterator<Item = (f64, F)>>(iter: T) -> Self {
        let mut heap = Self::new();
        for (cost, facility) in iter {
            heap.push(cost, facility);
        }
        heap
    }
}

/// A demand point's assignment slot and its remaining candidates.
///
/// Every facility ever offered to the point is remembered in `offered`, so a
/// lazy extension never re-offers a facility the point has already consumed.
#[derive(Debug, Clone)]
pub struct PointSlot<F: Id> {
    weight: f64,
    assigned: Option<Candidate<F>>,
    candidates: CandidateHeap<F>,
    offered: HashSet<F>,
    extended: bool,
}

impl<F: Id> PointSlot<F> {
    pub fn new(weight: f64, candidates: CandidateHeap<F>) -> Self {
        let offered = candidates.heap.iter().map(|Reverse(c)| c.facility.clone()).collect();
        Self {
            weight,
            assigned: None,
            candidates,
            offered,
            extended: false,
        }
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn assigned(&self) -> Option<&Candidate<F>> {
        self.assigned.as_ref()
    }

    pub fn candidates(&self) -> &CandidateHeap<F> {
        &self.candidates
    }

    pub fn offered(&self) -> &HashSet<F> {
        &self.offered
    }

    /// Whether the one allowed lazy extension has been spent.
    pub fn is_extended(&self) -> bool {
        self.extended
    }

    pub fn peek_next(&self) -> Option<&Candidate<F>> {
        self.candidates.peek()
    }

    /// Consumes the nearest candidate and makes it the assignment. Returns the
    /// previous assignment, if any, together with the new one.
    pub fn advance(&mut self) -> Option<(Option<Candidate<F>>, Candidate<F>)> {
        let next = self.candidates.pop()?;
        let previous = self.assigned.replace(next.clone());
        Some((previous, next))
    }

    /// Adds newly fetched candidates, dropping facilities already offered.
    /// Marks the slot as extended; returns how many candidates were kept.
    pub fn extend(&mut self, fetched: impl IntoIterator<Item = (f64, F)>) -> usize {
        self.extended = true;
        let mut kept = 0;
        for (cost, facility) in fetched {
            if self.offered.insert(facility.clone()) {
                self.candidates.push(cost, facility);
                kept += 1;
            }
        }
        kept
    }
}
