//! Solution variants: atomic fragments, composed sequences, container lifts.
//!
//! All solutions live in the task's plan graph arena and are addressed by
//! [`SolutionId`]. A solution is an edge from its start state to its end
//! state; chains link through shared endpoint states. Failed solutions
//! (non-finite cost) stay linked into the graph so the pruner can observe
//! them, but chain enumeration never traverses them.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::interface::StateId;
use crate::types::Trajectory;

/// Index of a solution in the plan graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SolutionId(pub(crate) u32);

impl SolutionId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifies the container whose chain search treats a solution as an edge.
///
/// Solutions produced by a container's direct children carry that container's
/// id; lifted sequences carry the parent's. `None` marks a task-level
/// end-to-end solution, which no further search consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerId(pub(crate) u16);

/// One stage-local atomic fragment. The trajectory may be absent — a
/// generator spawn carries none.
#[derive(Debug, Clone, Default)]
pub struct SubTrajectory {
    pub trajectory: Option<Trajectory>,
}

impl SubTrajectory {
    pub fn new(trajectory: Option<Trajectory>) -> Self {
        Self { trajectory }
    }

    pub const fn empty() -> Self {
        Self { trajectory: None }
    }
}

/// An ordered chain of child solutions whose endpoints link up:
/// `child[i].end == child[i+1].start`.
#[derive(Debug, Clone)]
pub struct SolutionSequence {
    pub children: Vec<SolutionId>,
}

/// A container-level solution wrapping a single inner solution.
#[derive(Debug, Clone)]
pub struct WrappedSolution {
    pub inner: SolutionId,
}

/// Closed set of solution shapes.
#[derive(Debug, Clone)]
pub enum SolutionBody {
    Atomic(SubTrajectory),
    Sequence(SolutionSequence),
    Wrapped(WrappedSolution),
}

/// A solution with its bookkeeping header.
#[derive(Debug, Clone)]
pub struct Solution {
    start: StateId,
    end: StateId,
    cost: f64,
    failed: bool,
    comment: Option<String>,
    owner: Option<ContainerId>,
    body: SolutionBody,
}

impl Solution {
    pub(crate) fn new(
        owner: Option<ContainerId>,
        start: StateId,
        end: StateId,
        cost: f64,
        body: SolutionBody,
    ) -> Self {
        Self {
            start,
            end,
            cost,
            failed: !cost.is_finite(),
            comment: None,
            owner,
            body,
        }
    }

    pub(crate) fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment;
        self
    }

    /// Reassign the cost, e.g. after a stage's cost term ran. A non-finite
    /// cost marks the solution as a failure.
    pub(crate) fn set_cost(&mut self, cost: f64) {
        self.cost = cost;
        self.failed = !cost.is_finite();
    }

    pub(crate) fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = Some(comment.into());
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn is_failure(&self) -> bool {
        self.failed
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn start(&self) -> StateId {
        self.start
    }

    pub fn end(&self) -> StateId {
        self.end
    }

    pub(crate) fn owner(&self) -> Option<ContainerId> {
        self.owner
    }

    pub fn body(&self) -> &SolutionBody {
        &self.body
    }
}

// ─── Cost terms ─────────────────────────────────────────────────────────────

/// Pluggable cost evaluation, applied to each solution a stage produces
/// before it is integrated into the graph.
///
/// Returning a non-finite value marks the solution as a failure. The
/// `comment` may be appended to for a human-readable explanation.
pub trait CostTerm {
    fn cost(&self, solution: &Solution, comment: &mut String) -> f64;
}

/// A predefined stream of costs.
///
/// Pops from the front of a list. A *finite* stream reports exhaustion once
/// the list runs dry; an *infinite* stream keeps repeating the last value.
#[derive(Debug, Clone)]
pub struct CostStream {
    costs: VecDeque<f64>,
    last: f64,
    finite: bool,
}

impl CostStream {
    /// Stream that ends after the given costs.
    pub fn finite(costs: impl IntoIterator<Item = f64>) -> Self {
        Self {
            costs: costs.into_iter().collect(),
            last: 0.0,
            finite: true,
        }
    }

    /// Stream that repeats its last value forever once the list is empty.
    pub fn repeating(costs: impl IntoIterator<Item = f64>) -> Self {
        Self {
            costs: costs.into_iter().collect(),
            last: 0.0,
            finite: false,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.finite && self.costs.is_empty()
    }

    pub fn next_cost(&mut self) -> f64 {
        if let Some(front) = self.costs.pop_front() {
            self.last = front;
        }
        self.last
    }
}

/// Cost term drawing from a [`CostStream`], one value per produced solution.
///
/// The workhorse of the mock pipelines in the scheduling tests: it lets a
/// test script the exact costs (including failures) a stage will report.
pub struct PredefinedCosts {
    stream: RefCell<CostStream>,
}

impl PredefinedCosts {
    pub fn new(stream: CostStream) -> Self {
        Self {
            stream: RefCell::new(stream),
        }
    }

    /// Infinite stream over the given values (the common test shape).
    pub fn repeating(costs: impl IntoIterator<Item = f64>) -> Self {
        Self::new(CostStream::repeating(costs))
    }
}

impl CostTerm for PredefinedCosts {
    fn cost(&self, _solution: &Solution, _comment: &mut String) -> f64 {
        self.stream.borrow_mut().next_cost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_tracks_cost_finiteness() {
        let mut s = Solution::new(
            None,
            StateId(0),
            StateId(1),
            1.5,
            SolutionBody::Atomic(SubTrajectory::empty()),
        );
        assert!(!s.is_failure());
        s.set_cost(f64::INFINITY);
        assert!(s.is_failure());
    }

    #[test]
    fn test_finite_stream_exhausts() {
        let mut s = CostStream::finite([1.0, 2.0]);
        assert!(!s.exhausted());
        assert_eq!(s.next_cost(), 1.0);
        assert_eq!(s.next_cost(), 2.0);
        assert!(s.exhausted());
    }

    #[test]
    fn test_repeating_stream_holds_last_value() {
        let mut s = CostStream::repeating([3.0]);
        assert_eq!(s.next_cost(), 3.0);
        assert_eq!(s.next_cost(), 3.0);
        assert!(!s.exhausted());
    }

    #[test]
    fn test_empty_repeating_stream_yields_zero() {
        let mut s = CostStream::repeating([]);
        assert_eq!(s.next_cost(), 0.0);
    }

    #[test]
    fn test_predefined_costs_pop_in_order() {
        let term = PredefinedCosts::repeating([f64::INFINITY, 0.0]);
        let sol = Solution::new(
            None,
            StateId(0),
            StateId(1),
            0.0,
            SolutionBody::Atomic(SubTrajectory::empty()),
        );
        let mut comment = String::new();
        assert!(term.cost(&sol, &mut comment).is_infinite());
        assert_eq!(term.cost(&sol, &mut comment), 0.0);
        assert_eq!(term.cost(&sol, &mut comment), 0.0);
    }
}
