//! The scheduling loop.
//!
//! Single-threaded cooperative rounds. Each round picks the work item with
//! the minimum `(priority, direction-rank)` key across all leaf stages,
//! invokes that stage's `compute()` exactly once, integrates the outputs —
//! pruning cascade on failures, chain enumeration on successes — and checks
//! the soft deadline. The loop ends when no stage has a viable item.
//!
//! Chain enumeration is lazy and recursive through container levels: a
//! complete chain inside a container lifts to a sequence solution one level
//! up, where the search runs again, until a task-level end-to-end solution
//! lands in the sorted list.

use std::time::Instant;

use crate::graph::PlanGraph;
use crate::interface::{InterfaceId, StateId};
use crate::pruning::{self, PruneCtx};
use crate::solution::{
    ContainerId, Solution, SolutionBody, SolutionId, SolutionSequence, WrappedSolution,
};
use crate::stage::{SerialContainer, StageKind, WorkKey};

use super::observer::{ComputeReport, PlanObserver, StageClock};
use super::{stage_at_mut, Registry, StagePath};

/// Enter a tracing span for one compute step (when the `tracing` feature is
/// enabled). When disabled, this is a no-op and the compiler eliminates it.
macro_rules! trace_compute {
    ($name:expr) => {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("stage_compute", stage = $name).entered();
    };
}

pub(crate) fn run(
    root: &mut SerialContainer,
    graph: &mut PlanGraph,
    registry: &Registry,
    solutions: &mut Vec<SolutionId>,
    deadline: Option<Instant>,
    observer: &mut dyn PlanObserver,
) {
    let mut round: u32 = 0;
    loop {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                break;
            }
        }
        round += 1;
        observer.on_round(round);

        let mut best: Option<(WorkKey, StagePath)> = None;
        find_best(root, graph, &mut Vec::new(), &mut best);
        let Some((_, path)) = best else {
            break;
        };

        let owner = registry.container_of(&path);
        let clock = StageClock::start();
        let stage = stage_at_mut(root, &path);
        let name = stage.name().to_string();
        trace_compute!(name.as_str());
        let effects = stage.compute(graph, owner);
        let report = ComputeReport {
            produced: effects.successes.len(),
            failures: effects.failures.len(),
            elapsed: clock.elapsed(),
        };
        observer.on_compute(&name, &report);

        // Failures first: the pruning cascade may retire work the
        // enumeration below must not see as viable.
        if let Some((input, direction)) = effects.processed {
            if effects.successes.is_empty() {
                let ctx = PruneCtx {
                    root: &*root,
                    registry,
                };
                pruning::on_propagation_exhausted(input, direction, graph, &ctx);
            }
        }
        if let Some((from, to)) = effects.failed_pair {
            let ctx = PruneCtx {
                root: &*root,
                registry,
            };
            pruning::on_pair_failed(from, to, graph, &ctx);
        }

        for solution in effects.successes {
            enumerate_through(solution, owner, root, graph, registry, solutions, observer);
        }
    }
}

/// Depth-first scan for the minimum work key. Strict `<` keeps the earliest
/// stage in serial order on ties.
fn find_best(
    container: &mut SerialContainer,
    graph: &PlanGraph,
    prefix: &mut StagePath,
    best: &mut Option<(WorkKey, StagePath)>,
) {
    for i in 0..container.children.len() {
        prefix.push(i);
        let child = &mut container.children[i];
        let is_container = matches!(child.kind, StageKind::Container(_));
        if is_container {
            if let StageKind::Container(inner) = &mut child.kind {
                find_best(inner, graph, prefix, best);
            }
        } else if let Some(key) = child.peek(graph) {
            if best.as_ref().map_or(true, |(bk, _)| key < *bk) {
                *best = Some((key, prefix.clone()));
            }
        }
        prefix.pop();
    }
}

// ─── Chain enumeration ──────────────────────────────────────────────────────

/// A new solution landed at `container` level: assemble every chain through
/// it that now spans the container's boundaries, lift each one level up, and
/// recurse. At the task level the chain is wrapped and inserted at its
/// sorted position.
fn enumerate_through(
    solution: SolutionId,
    container: ContainerId,
    root: &mut SerialContainer,
    graph: &mut PlanGraph,
    registry: &Registry,
    solutions: &mut Vec<SolutionId>,
    observer: &mut dyn PlanObserver,
) {
    let record = registry.container(container);
    let (start, end) = {
        let sol = graph.solution(solution);
        (sol.start(), sol.end())
    };
    let back = chains_back(graph, start, record.starts, container);
    if back.is_empty() {
        return;
    }
    let forward = chains_forward(graph, end, record.ends, container);

    for back_chain in &back {
        for forward_chain in &forward {
            let mut children = back_chain.clone();
            children.push(solution);
            children.extend(forward_chain.iter().copied());

            let cost: f64 = children.iter().map(|&c| graph.solution(c).cost()).sum();
            let chain_start = graph.solution(children[0]).start();
            let chain_end = graph
                .solution(*children.last().unwrap_or(&solution))
                .end();
            let sequence = SolutionBody::Sequence(SolutionSequence { children });

            match record.parent {
                Some(parent) => {
                    let lifted = Solution::new(Some(parent), chain_start, chain_end, cost, sequence);
                    let lifted_id = graph.add_solution(lifted);
                    stage_at_mut(root, &record.path).solutions.push(lifted_id);
                    enumerate_through(
                        lifted_id, parent, root, graph, registry, solutions, observer,
                    );
                }
                None => {
                    let inner =
                        graph.add_solution(Solution::new(None, chain_start, chain_end, cost, sequence));
                    let wrapped = Solution::new(
                        None,
                        chain_start,
                        chain_end,
                        cost,
                        SolutionBody::Wrapped(WrappedSolution { inner }),
                    );
                    let wrapped_id = graph.add_solution(wrapped);
                    let position = solutions
                        .partition_point(|&existing| graph.solution(existing).cost() <= cost);
                    solutions.insert(position, wrapped_id);
                    observer.on_solution(cost);
                }
            }
        }
    }
}

/// All partial chains of non-failed, same-level solutions running from the
/// container's starts boundary up to (excluding) `state`, in left-to-right
/// order. Empty when `state` is not yet reachable from the boundary.
fn chains_back(
    graph: &PlanGraph,
    state: StateId,
    boundary: InterfaceId,
    owner: ContainerId,
) -> Vec<Vec<SolutionId>> {
    if graph.state(state).interface() == boundary {
        return vec![Vec::new()];
    }
    let mut out = Vec::new();
    for &sid in &graph.state(state).incoming {
        let sol = graph.solution(sid);
        if sol.is_failure() || sol.owner() != Some(owner) {
            continue;
        }
        for mut chain in chains_back(graph, sol.start(), boundary, owner) {
            chain.push(sid);
            out.push(chain);
        }
    }
    out
}

/// Mirror image of [`chains_back`]: chains from (excluding) `state` to the
/// container's ends boundary.
fn chains_forward(
    graph: &PlanGraph,
    state: StateId,
    boundary: InterfaceId,
    owner: ContainerId,
) -> Vec<Vec<SolutionId>> {
    if graph.state(state).interface() == boundary {
        return vec![Vec::new()];
    }
    let mut out = Vec::new();
    for &sid in &graph.state(state).outgoing {
        let sol = graph.solution(sid);
        if sol.is_failure() || sol.owner() != Some(owner) {
            continue;
        }
        for chain in chains_forward(graph, sol.end(), boundary, owner) {
            let mut extended = vec![sid];
            extended.extend(chain);
            out.push(extended);
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::pipeline::observer::TimingObserver;
    use crate::pipeline::Task;
    use crate::solution::PredefinedCosts;
    use crate::solvers::JointInterpolation;
    use crate::stage::{
        FixedCandidates, FixedExtensions, GroupPlannerVec, MergeMode, NoopPropagation,
        PropagationDirection, Stage,
    };
    use crate::types::RobotModel;

    const INF: f64 = f64::INFINITY;
    const LONG: Duration = Duration::from_secs(10);

    fn model() -> RobotModel {
        RobotModel::new("pr2")
            .with_group("group", &["j1", "j2"])
            .with_group("eef_group", &["j3"])
    }

    fn planners() -> GroupPlannerVec {
        let planner = Arc::new(JointInterpolation::new());
        vec![
            ("group".to_string(), planner.clone() as _),
            ("eef_group".to_string(), planner as _),
        ]
    }

    /// Generator spawning one candidate per cost.
    fn gen(name: &str, costs: &[f64]) -> Stage {
        Stage::generator(name, FixedCandidates::new(costs.iter().copied()))
    }

    /// Forward propagator with a scripted cost stream.
    fn forward(name: &str, costs: &[f64], per_compute: usize) -> Stage {
        Stage::propagator(
            name,
            PropagationDirection::Forward,
            FixedExtensions::new(costs.iter().copied()).per_compute(per_compute),
        )
    }

    fn backward(name: &str, costs: &[f64]) -> Stage {
        Stage::propagator(
            name,
            PropagationDirection::Backward,
            FixedExtensions::new(costs.iter().copied()),
        )
    }

    /// Connector whose solution costs are scripted (empty list ⇒ all zero).
    fn connect(name: &str, costs: &[f64]) -> Stage {
        Stage::connector(name, planners())
            .with_cost_term(PredefinedCosts::repeating(costs.iter().copied()))
    }

    fn calls(task: &Task, name: &str) -> u32 {
        task.find_stage(name).map(|s| s.calls()).unwrap_or(u32::MAX)
    }

    // ─── End-to-end scenarios ───────────────────────────────────────────

    #[test]
    fn test_connect_connect_succ_succ() {
        let mut task = Task::new("succ_succ", model());
        task.add(gen("GEN1", &[1.0, 2.0, 3.0]))
            .add(connect("CON1", &[]))
            .add(gen("GEN2", &[10.0, 20.0]))
            .add(connect("CON2", &[]))
            .add(gen("GEN3", &[0.0]));

        assert!(task.plan(LONG).unwrap());
        assert_eq!(task.num_solutions(), 3 * 2);
        assert_eq!(
            task.solution_costs(),
            vec![11.0, 12.0, 13.0, 21.0, 22.0, 23.0]
        );
    }

    #[test]
    fn test_connect_connect_fail_succ() {
        let mut task = Task::new("fail_succ", model());
        task.add(gen("GEN1", &[0.0]))
            .add(connect("CON1", &[INF]).with_merge_mode(MergeMode::Sequential))
            .add(gen("GEN2", &[0.0]))
            .add(connect("CON2", &[]))
            .add(gen("GEN3", &[0.0]))
            .add(Stage::propagator(
                "FWDUMMY",
                PropagationDirection::Forward,
                NoopPropagation,
            ));

        assert!(!task.plan(LONG).unwrap());
        assert_eq!(task.num_solutions(), 0);
    }

    #[test]
    fn test_propagator_failure_prunes_upstream() {
        let mut task = Task::new("propagator_failure", model());
        task.add(backward("BW1", &[0.0]))
            .add(gen("GEN1", &[0.0]))
            .add(forward("FW1", &[INF], 1));

        assert!(!task.plan(LONG).unwrap());
        assert_eq!(task.num_solutions(), 0);
        // FW1 fails, so the backward stage must never be scheduled.
        assert_eq!(calls(&task, "BW1"), 0);
        assert_eq!(calls(&task, "FW1"), 1);
        assert_eq!(task.find_stage("FW1").unwrap().failures(), 1);
    }

    #[test]
    fn test_partial_solution_isolation() {
        let mut task = Task::new("multi_forward", model());
        task.add(backward("BW1", &[0.0]))
            .add(backward("BW2", &[0.0]))
            .add(gen("GEN1", &[0.0]))
            // Two solutions spawned for the only incoming state...
            .add(forward("FW1", &[0.0, 0.0], 2))
            // ...and only the second extension fails downstream.
            .add(forward("FW2", &[0.0, INF], 1));

        assert!(task.plan(LONG).unwrap());
        // The infeasible branch must not disable the sibling that shares
        // its incoming state.
        assert_eq!(task.num_solutions(), 1);
        assert_eq!(task.solution_costs(), vec![0.0]);
    }

    #[test]
    fn test_connector_pruning_forward() {
        let mut task = Task::new("connect_connect_forward", model());
        task.add(gen("GEN1", &[0.0]))
            .add(connect("CON1", &[INF, 0.0])) // 1st attempt fails
            .add(gen("GEN2", &[0.0, 10.0, 20.0]))
            .add(forward("FW1", &[0.0], 1))
            .add(connect("CON2", &[]))
            .add(gen("GEN3", &[1.0, 2.0, 3.0]));

        assert!(task.plan(LONG).unwrap());
        assert_eq!(task.num_solutions(), 3 * 2);
        assert_eq!(
            task.solution_costs(),
            vec![11.0, 12.0, 13.0, 21.0, 22.0, 23.0]
        );
        // The failed pair is never retried, and the dead candidate never
        // reaches the second connector.
        assert_eq!(calls(&task, "CON1"), 3);
        assert_eq!(calls(&task, "CON2"), 6);
    }

    #[test]
    fn test_container_transparent_pruning() {
        use crate::stage::SerialContainer;

        let mut task = Task::new("inside_container", model());
        task.add(backward("BW1", &[INF])).add(gen("GEN1", &[0.0]));
        let mut inner = SerialContainer::new();
        inner.add(connect("CON1", &[]));
        inner.add(gen("GEN2", &[0.0]));
        task.add(Stage::container("SC1", inner));

        assert!(!task.plan(LONG).unwrap());
        // The failure outside the container prunes the compute inside it.
        assert_eq!(calls(&task, "CON1"), 0);
    }

    // ─── Structure and ordering properties ──────────────────────────────

    #[test]
    fn test_solution_flattens_to_ordered_subtrajectories() {
        let mut task = Task::new("flatten", model());
        task.add(gen("GEN1", &[1.0]))
            .add(connect("CON1", &[]))
            .add(gen("GEN2", &[2.0]));

        assert!(task.plan(LONG).unwrap());
        let best = task.solutions().next().unwrap();
        assert_eq!(best.cost(), 3.0);
        // spawn + connect + spawn
        let ids: Vec<_> = task.solutions.clone();
        let atoms = task.flattened(ids[0]);
        assert_eq!(atoms.len(), 3);
        let sum: f64 = atoms.iter().map(|&a| task.solution(a).cost()).sum();
        assert_eq!(sum, best.cost());
    }

    #[test]
    fn test_container_lifts_inner_chains() {
        use crate::stage::SerialContainer;

        let mut task = Task::new("lift", model());
        task.add(gen("GEN1", &[1.0])).add(connect("CON1", &[]));
        let mut inner = SerialContainer::new();
        inner.add(gen("GEN2", &[2.0]));
        task.add(Stage::container("SC1", inner));

        assert!(task.plan(LONG).unwrap());
        assert_eq!(task.solution_costs(), vec![3.0]);
        // The container records the lifted chain in its own store.
        assert_eq!(task.find_stage("SC1").unwrap().solutions().len(), 1);
    }

    #[test]
    fn test_merge_mode_round_trip() {
        // Sequential merging with group-consistent planners must match the
        // parallel variant in count, cost, and endpoints.
        let run = |mode: MergeMode| {
            let mut task = Task::new("merge", model());
            task.add(gen("GEN1", &[1.0]))
                .add(Stage::connector("CON1", planners()).with_merge_mode(mode))
                .add(gen("GEN2", &[2.0]));
            assert!(task.plan(LONG).unwrap());
            task.solution_costs()
        };
        assert_eq!(run(MergeMode::Parallel), run(MergeMode::Sequential));
    }

    #[test]
    fn test_zero_timeout_plans_nothing() {
        let mut task = Task::new("deadline", model());
        task.add(gen("GEN1", &[1.0]))
            .add(connect("CON1", &[]))
            .add(gen("GEN2", &[2.0]));

        assert!(!task.plan(Duration::ZERO).unwrap());
        assert_eq!(task.num_solutions(), 0);
        assert_eq!(calls(&task, "GEN1"), 0);
    }

    #[test]
    fn test_reset_allows_replanning() {
        let mut task = Task::new("reset", model());
        task.add(gen("GEN1", &[1.0]))
            .add(connect("CON1", &[]))
            .add(gen("GEN2", &[2.0]));

        assert!(task.plan(LONG).unwrap());
        task.reset();
        assert_eq!(task.num_solutions(), 0);
        assert_eq!(calls(&task, "GEN1"), 0);
        // Candidate sources are not rewound, so a replan finds nothing new.
        assert!(!task.plan(LONG).unwrap());
    }

    #[test]
    fn test_observer_sees_computes_and_solutions() {
        let mut task = Task::new("observed", model());
        task.add(gen("GEN1", &[1.0]))
            .add(connect("CON1", &[]))
            .add(gen("GEN2", &[2.0]));

        let mut obs = TimingObserver::new();
        assert!(task.plan_with_observer(LONG, &mut obs).unwrap());
        let names: Vec<_> = obs.reports().iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"GEN1"));
        assert!(names.contains(&"CON1"));
        assert!(names.contains(&"GEN2"));
    }

    #[test]
    fn test_per_stage_solution_stores() {
        let mut task = Task::new("stores", model());
        task.add(gen("GEN1", &[1.0, 2.0]))
            .add(connect("CON1", &[]))
            .add(gen("GEN2", &[0.0]));

        assert!(task.plan(LONG).unwrap());
        assert_eq!(task.find_stage("GEN1").unwrap().solutions().len(), 2);
        assert_eq!(task.find_stage("CON1").unwrap().solutions().len(), 2);
        assert_eq!(task.find_stage("GEN1").unwrap().failures(), 0);
    }

    #[test]
    fn test_solution_count_bounded_by_generator_product() {
        let mut task = Task::new("bound", model());
        task.add(gen("GEN1", &[1.0, 2.0, 3.0]))
            .add(connect("CON1", &[]))
            .add(gen("GEN2", &[1.0, 2.0]))
            .add(connect("CON2", &[]))
            .add(gen("GEN3", &[5.0]));

        assert!(task.plan(LONG).unwrap());
        assert!(task.num_solutions() <= 3 * 2);
        // Costs are enumerated in non-decreasing order.
        let costs = task.solution_costs();
        assert!(costs.windows(2).all(|w| w[0] <= w[1]));
    }
}
