//! Execution traces
//!
//! An [`ExecutionTrace`] records what happened while instrumented code ran:
//! which code objects were entered, how often each predicate was evaluated and
//! the smallest distance observed so far towards each of its two branches.

use std::collections::{HashMap, HashSet};

use crate::distance::BranchDistance;
use crate::known_data::{CodeObjectId, PredicateId};

/// The result of executing instrumented code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionTrace {
    executed_code_objects: HashSet<CodeObjectId>,
    executed_predicates: HashMap<PredicateId, u64>,
    true_distances: HashMap<PredicateId, f64>,
    false_distances: HashMap<PredicateId, f64>,
}

impl ExecutionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `other` into this trace.
    ///
    /// Executed code objects are united, execution counts are summed and
    /// distances keep the per-branch minimum, an absent entry counting as
    /// infinitely far.
    pub fn merge(&mut self, other: &ExecutionTrace) {
        self.executed_code_objects
            .extend(other.executed_code_objects.iter().copied());
        for (&predicate, &count) in &other.executed_predicates {
            *self.executed_predicates.entry(predicate).or_insert(0) += count;
        }
        merge_min(&mut self.true_distances, &other.true_distances);
        merge_min(&mut self.false_distances, &other.false_distances);
    }

    /// Empties the trace.
    pub fn clear(&mut self) {
        self.executed_code_objects.clear();
        self.executed_predicates.clear();
        self.true_distances.clear();
        self.false_distances.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.executed_code_objects.is_empty() && self.executed_predicates.is_empty()
    }

    pub(crate) fn record_code_object(&mut self, code_object_id: CodeObjectId) {
        self.executed_code_objects.insert(code_object_id);
    }

    /// Counts one evaluation of `predicate` and lowers its stored distances.
    pub(crate) fn record_predicate(&mut self, predicate: PredicateId, distance: BranchDistance) {
        *self.executed_predicates.entry(predicate).or_insert(0) += 1;
        lower(&mut self.true_distances, predicate, distance.true_distance);
        lower(&mut self.false_distances, predicate, distance.false_distance);
    }

    pub fn executed_code_objects(&self) -> &HashSet<CodeObjectId> {
        &self.executed_code_objects
    }

    /// Number of evaluations per predicate.
    pub fn executed_predicates(&self) -> &HashMap<PredicateId, u64> {
        &self.executed_predicates
    }

    /// Smallest observed distance to the true branch, per predicate.
    pub fn true_distances(&self) -> &HashMap<PredicateId, f64> {
        &self.true_distances
    }

    /// Smallest observed distance to the false branch, per predicate.
    pub fn false_distances(&self) -> &HashMap<PredicateId, f64> {
        &self.false_distances
    }

    /// Smallest observed distance to one branch of `predicate`, or `None` if
    /// the predicate never executed.
    pub fn branch_distance(&self, predicate: PredicateId, branch: bool) -> Option<f64> {
        let distances = if branch {
            &self.true_distances
        } else {
            &self.false_distances
        };
        distances.get(&predicate).copied()
    }

    /// Whether the given branch of `predicate` was taken at least once.
    pub fn is_branch_covered(&self, predicate: PredicateId, branch: bool) -> bool {
        self.branch_distance(predicate, branch) == Some(0.0)
    }
}

fn lower(distances: &mut HashMap<PredicateId, f64>, predicate: PredicateId, distance: f64) {
    let current = distances.entry(predicate).or_insert(f64::INFINITY);
    if distance < *current {
        *current = distance;
    }
}

fn merge_min(target: &mut HashMap<PredicateId, f64>, source: &HashMap<PredicateId, f64>) {
    for (&predicate, &distance) in source {
        lower(target, predicate, distance);
    }
}
