//! Propagator stage: extends an incoming state to fresh successor states.
//!
//! One pending input state is consumed per `compute()`. The pluggable
//! [`Propagation`] delegate may return several extensions; each success
//! mints a fresh state on the output side (conventionally built from
//! `scene.diff()`), each infeasible extension is recorded with a dead-born
//! end state, and the outputs stay independent downstream — the failure of
//! one branch never poisons its siblings.

use std::sync::Arc;

use crate::graph::PlanGraph;
use crate::interface::{Direction, InterfaceId, StateId};
use crate::solution::{ContainerId, CostStream, Solution, SolutionBody, SubTrajectory};
use crate::types::{RobotModel, Scene, Trajectory};

use super::{apply_cost_term, ComputeEffects, StageConfig, WorkKey, RANK_BACKWARD, RANK_FORWARD};

/// Which way a propagator extends chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationDirection {
    Forward,
    Backward,
    /// Registers on both sides; the effective sides are resolved against the
    /// neighbors at wiring time.
    EitherWay,
}

/// One propagation product.
pub struct Extension {
    pub scene: Scene,
    pub trajectory: Option<Trajectory>,
    pub cost: f64,
    pub comment: Option<String>,
}

/// The opaque extension computation behind a propagator.
pub trait Propagation {
    fn init(&mut self, _model: &Arc<RobotModel>) {}

    /// Extend `scene` in `direction`. Zero extensions exhaust the input with
    /// no continuation; a non-finite cost records an infeasible branch.
    fn extend(&mut self, scene: &Scene, direction: Direction) -> Vec<Extension>;
}

pub struct Propagator {
    pub(crate) direction: PropagationDirection,
    pub(crate) delegate: Box<dyn Propagation>,
    /// Effective flows, resolved at wiring time.
    pub(crate) forward_active: bool,
    pub(crate) backward_active: bool,
}

impl Propagator {
    pub(crate) fn new(direction: PropagationDirection, delegate: impl Propagation + 'static) -> Self {
        Self {
            direction,
            delegate: Box::new(delegate),
            forward_active: direction != PropagationDirection::Backward,
            backward_active: direction != PropagationDirection::Forward,
        }
    }

    pub fn direction(&self) -> PropagationDirection {
        self.direction
    }

    /// Best unconsumed alive input on the given interface.
    fn best_input(graph: &PlanGraph, interface: Option<InterfaceId>) -> Option<StateId> {
        let interface = interface?;
        graph
            .interface(interface)
            .iter()
            .find(|&s| !graph.state(s).consumed && graph.alive(s))
    }

    pub(crate) fn peek(
        &self,
        graph: &PlanGraph,
        starts: Option<InterfaceId>,
        ends: Option<InterfaceId>,
    ) -> Option<WorkKey> {
        let fwd = self
            .forward_active
            .then(|| Self::best_input(graph, starts))
            .flatten()
            .map(|s| WorkKey {
                priority: graph.state(s).priority(),
                rank: RANK_FORWARD,
            });
        let bwd = self
            .backward_active
            .then(|| Self::best_input(graph, ends))
            .flatten()
            .map(|s| WorkKey {
                priority: graph.state(s).priority(),
                rank: RANK_BACKWARD,
            });
        match (fwd, bwd) {
            (Some(f), Some(b)) => Some(f.min(b)),
            (f, b) => f.or(b),
        }
    }
}

pub(crate) fn compute(
    prop: &mut Propagator,
    config: &StageConfig,
    graph: &mut PlanGraph,
    owner: ContainerId,
    starts: Option<InterfaceId>,
    ends: Option<InterfaceId>,
    effects: &mut ComputeEffects,
) {
    // Re-pick the item `peek` saw: the better of the two sides.
    let fwd = prop
        .forward_active
        .then(|| Propagator::best_input(graph, starts))
        .flatten();
    let bwd = prop
        .backward_active
        .then(|| Propagator::best_input(graph, ends))
        .flatten();
    let (input, direction) = match (fwd, bwd) {
        (Some(f), Some(b)) => {
            if graph.state(f).priority() <= graph.state(b).priority() {
                (f, Direction::Forward)
            } else {
                (b, Direction::Backward)
            }
        }
        (Some(f), None) => (f, Direction::Forward),
        (None, Some(b)) => (b, Direction::Backward),
        (None, None) => return,
    };

    graph.state_mut(input).consumed = true;
    effects.processed = Some((input, direction));

    let input_scene = graph.state(input).scene().clone();
    let extensions = prop.delegate.extend(&input_scene, direction);

    let output_interface = match direction {
        Direction::Forward => ends,
        Direction::Backward => starts,
    };
    let Some(output_interface) = output_interface else {
        return;
    };

    for ext in extensions {
        let output = graph.new_state(ext.scene, output_interface);
        // All solutions are left-to-right edges, whichever way we extended.
        let (start, end) = match direction {
            Direction::Forward => (input, output),
            Direction::Backward => (output, input),
        };
        let mut solution = Solution::new(
            Some(owner),
            start,
            end,
            ext.cost,
            SolutionBody::Atomic(SubTrajectory::new(ext.trajectory)),
        )
        .with_comment(ext.comment);
        apply_cost_term(config, &mut solution);

        if solution.is_failure() {
            graph.dead.mark_forward(output);
            graph.dead.mark_backward(output);
            let id = graph.add_solution(solution);
            effects.failures.push(id);
        } else {
            let priority = graph.state(input).priority().extended(solution.cost());
            graph.enqueue_state(output, priority);
            let id = graph.add_solution(solution);
            effects.successes.push(id);
        }
    }
}

// ─── Built-in delegates ─────────────────────────────────────────────────────

/// Delegate minting `per_compute` diffed scenes per input, with costs drawn
/// from a repeating stream.
pub struct FixedExtensions {
    costs: CostStream,
    per_compute: usize,
}

impl FixedExtensions {
    pub fn new(costs: impl IntoIterator<Item = f64>) -> Self {
        Self {
            costs: CostStream::repeating(costs),
            per_compute: 1,
        }
    }

    /// Number of extensions produced per consumed input.
    pub fn per_compute(mut self, n: usize) -> Self {
        self.per_compute = n;
        self
    }
}

impl Propagation for FixedExtensions {
    fn extend(&mut self, scene: &Scene, _direction: Direction) -> Vec<Extension> {
        (0..self.per_compute)
            .map(|_| Extension {
                scene: scene.diff(),
                trajectory: None,
                cost: self.costs.next_cost(),
                comment: None,
            })
            .collect()
    }
}

/// Delegate contributing no extensions at all.
pub struct NoopPropagation;

impl Propagation for NoopPropagation {
    fn extend(&mut self, _scene: &Scene, _direction: Direction) -> Vec<Extension> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> Scene {
        Scene::new(Arc::new(RobotModel::new("m")))
    }

    #[test]
    fn test_fixed_extensions_repeat_last_cost() {
        let mut delegate = FixedExtensions::new([1.0, f64::INFINITY]);
        let s = scene();
        assert_eq!(delegate.extend(&s, Direction::Forward)[0].cost, 1.0);
        assert!(delegate.extend(&s, Direction::Forward)[0].cost.is_infinite());
        assert!(delegate.extend(&s, Direction::Forward)[0].cost.is_infinite());
    }

    #[test]
    fn test_per_compute_multiplies_outputs() {
        let mut delegate = FixedExtensions::new([0.0]).per_compute(3);
        let out = delegate.extend(&scene(), Direction::Forward);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|e| e.scene.generation() == 1));
    }

    #[test]
    fn test_noop_propagation_is_a_dead_end() {
        assert!(NoopPropagation.extend(&scene(), Direction::Forward).is_empty());
    }
}
