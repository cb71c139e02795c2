//! Generator stage: spawns candidate states into both adjacent boundaries.
//!
//! Each `compute()` spawns exactly one candidate: two fresh states sharing
//! the candidate's scene — one pushed into the previous boundary for the
//! backward neighbor, one into the next boundary for the forward neighbor —
//! linked by a zero-length sub-trajectory carrying the candidate cost.

use std::sync::Arc;

use crate::graph::PlanGraph;
use crate::interface::{InterfaceId, Priority};
use crate::solution::{ContainerId, CostStream, Solution, SolutionBody, SubTrajectory};
use crate::types::{RobotModel, Scene};

use super::{apply_cost_term, ComputeEffects, StageConfig, WorkKey, RANK_GENERATE};

/// One candidate to spawn.
pub struct Candidate {
    pub scene: Scene,
    pub cost: f64,
    pub comment: Option<String>,
}

/// Supplies generator candidates. The engine calls [`generate`] only while
/// [`can_generate`] holds.
///
/// [`generate`]: CandidateSource::generate
/// [`can_generate`]: CandidateSource::can_generate
pub trait CandidateSource {
    fn init(&mut self, _model: &Arc<RobotModel>) {}
    fn can_generate(&self) -> bool;
    fn generate(&mut self) -> Candidate;
}

pub struct Generator {
    pub(crate) source: Box<dyn CandidateSource>,
}

impl Generator {
    pub(crate) fn new(source: impl CandidateSource + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    pub(crate) fn peek(&self) -> Option<WorkKey> {
        self.source.can_generate().then_some(WorkKey {
            priority: Priority::IDLE,
            rank: RANK_GENERATE,
        })
    }
}

pub(crate) fn compute(
    gen: &mut Generator,
    config: &StageConfig,
    graph: &mut PlanGraph,
    owner: ContainerId,
    starts: Option<InterfaceId>,
    ends: Option<InterfaceId>,
    effects: &mut ComputeEffects,
) {
    let candidate = gen.source.generate();
    let (Some(starts), Some(ends)) = (starts, ends) else {
        return;
    };

    let from = graph.new_state(candidate.scene.clone(), starts);
    let to = graph.new_state(candidate.scene, ends);
    let mut solution = Solution::new(
        Some(owner),
        from,
        to,
        candidate.cost,
        SolutionBody::Atomic(SubTrajectory::empty()),
    )
    .with_comment(candidate.comment);
    apply_cost_term(config, &mut solution);

    if solution.is_failure() {
        // Recorded for the pruner, but both endpoints are infeasible at
        // birth and never enter a consumption queue.
        graph.dead.mark_forward(from);
        graph.dead.mark_backward(from);
        graph.dead.mark_forward(to);
        graph.dead.mark_backward(to);
        let id = graph.add_solution(solution);
        effects.failures.push(id);
    } else {
        let priority = Priority::new(1, solution.cost());
        graph.enqueue_state(from, priority);
        graph.enqueue_state(to, priority);
        let id = graph.add_solution(solution);
        effects.successes.push(id);
    }
}

// ─── Built-in sources ───────────────────────────────────────────────────────

/// Source spawning one candidate per cost in a finite list, all sharing the
/// root scene of the robot model.
pub struct FixedCandidates {
    costs: CostStream,
    scene: Option<Scene>,
}

impl FixedCandidates {
    pub fn new(costs: impl IntoIterator<Item = f64>) -> Self {
        Self {
            costs: CostStream::finite(costs),
            scene: None,
        }
    }
}

impl CandidateSource for FixedCandidates {
    fn init(&mut self, model: &Arc<RobotModel>) {
        self.scene = Some(Scene::new(Arc::clone(model)));
    }

    fn can_generate(&self) -> bool {
        !self.costs.exhausted()
    }

    fn generate(&mut self) -> Candidate {
        let scene = self
            .scene
            .as_ref()
            .expect("candidate source used before init")
            .clone();
        Candidate {
            scene,
            cost: self.costs.next_cost(),
            comment: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_candidates_exhaust_in_order() {
        let mut src = FixedCandidates::new([1.0, 2.0]);
        src.init(&Arc::new(RobotModel::new("m")));
        assert!(src.can_generate());
        assert_eq!(src.generate().cost, 1.0);
        assert_eq!(src.generate().cost, 2.0);
        assert!(!src.can_generate());
    }
}
