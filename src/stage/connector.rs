//! Connector stage: joins one state from each side with a computed
//! trajectory.
//!
//! The connector keeps a pair ledger: every newly observed state on one side
//! is paired with every alive state already known on the opposite side.
//! Pairs are consumed in combined-priority order, each at most once. A
//! failed pair is dropped without condemning either endpoint — an endpoint
//! dies only when the pruner proves no pair involving it can ever succeed.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::graph::PlanGraph;
use crate::interface::{InterfaceId, Priority, StateId};
use crate::solution::{ContainerId, Solution, SolutionBody, SubTrajectory};
use crate::solvers::JoiningPlanner;
use crate::types::Trajectory;

use super::{apply_cost_term, ComputeEffects, StageConfig, WorkKey, RANK_CONNECT};

/// How per-group trajectories are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Each group's fragment runs independently; fragments are concatenated.
    Parallel,
    /// Fragments must merge waypoint-by-waypoint; inconsistency is a
    /// failure.
    Sequential,
}

impl MergeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parallel => "parallel",
            Self::Sequential => "sequential",
        }
    }
}

/// One joining planner per planning group.
pub type GroupPlannerVec = Vec<(String, Arc<dyn JoiningPlanner>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PairStatus {
    Pending,
    Done,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Pair {
    pub from: StateId,
    pub to: StateId,
    pub status: PairStatus,
}

pub struct Connector {
    pub(crate) planners: GroupPlannerVec,
    pub(crate) merge_mode: MergeMode,
    pub(crate) pairs: Vec<Pair>,
    seen: FxHashSet<StateId>,
    known_left: Vec<StateId>,
    known_right: Vec<StateId>,
}

impl Connector {
    pub(crate) fn new(planners: GroupPlannerVec) -> Self {
        Self {
            planners,
            merge_mode: MergeMode::Parallel,
            pairs: Vec::new(),
            seen: FxHashSet::default(),
            known_left: Vec::new(),
            known_right: Vec::new(),
        }
    }

    pub fn merge_mode(&self) -> MergeMode {
        self.merge_mode
    }

    /// Fold newly arrived interface states into the pair ledger.
    ///
    /// Dead states are skipped for good — deadness is monotonic within one
    /// planning run, so they can never become pairable later.
    fn sync(&mut self, graph: &PlanGraph, starts: InterfaceId, ends: InterfaceId) {
        let new_left: Vec<StateId> = graph
            .interface(starts)
            .iter()
            .filter(|s| !self.seen.contains(s))
            .collect();
        let new_right: Vec<StateId> = graph
            .interface(ends)
            .iter()
            .filter(|s| !self.seen.contains(s))
            .collect();

        for &left in &new_left {
            self.seen.insert(left);
            if !graph.alive(left) {
                continue;
            }
            for &right in &self.known_right {
                if graph.alive(right) {
                    self.pairs.push(Pair {
                        from: left,
                        to: right,
                        status: PairStatus::Pending,
                    });
                }
            }
            self.known_left.push(left);
        }
        for &right in &new_right {
            self.seen.insert(right);
            if !graph.alive(right) {
                continue;
            }
            for &left in &self.known_left {
                if graph.alive(left) {
                    self.pairs.push(Pair {
                        from: left,
                        to: right,
                        status: PairStatus::Pending,
                    });
                }
            }
            self.known_right.push(right);
        }
    }

    fn best_pending(&self, graph: &PlanGraph) -> Option<(usize, Priority)> {
        self.pairs
            .iter()
            .enumerate()
            .filter(|(_, p)| {
                p.status == PairStatus::Pending && graph.alive(p.from) && graph.alive(p.to)
            })
            .map(|(i, p)| {
                (
                    i,
                    Priority::combine(graph.state(p.from).priority(), graph.state(p.to).priority()),
                )
            })
            .min_by(|a, b| a.1.cmp(&b.1))
    }

    pub(crate) fn peek(
        &mut self,
        graph: &PlanGraph,
        starts: InterfaceId,
        ends: InterfaceId,
    ) -> Option<WorkKey> {
        self.sync(graph, starts, ends);
        self.best_pending(graph).map(|(_, priority)| WorkKey {
            priority,
            rank: RANK_CONNECT,
        })
    }

    /// True while a pending pair involving `state` (with an alive partner)
    /// remains. Used by the pruner's exhaustion rule.
    pub(crate) fn has_pending_with(&self, graph: &PlanGraph, state: StateId) -> bool {
        self.pairs.iter().any(|p| {
            p.status == PairStatus::Pending
                && ((p.from == state && graph.alive(p.to))
                    || (p.to == state && graph.alive(p.from)))
        })
    }

    pub(crate) fn clear_ledger(&mut self) {
        self.pairs.clear();
        self.seen.clear();
        self.known_left.clear();
        self.known_right.clear();
    }

    /// Partners of `state` across all pairs, pending or not.
    pub(crate) fn partners_of(&self, state: StateId) -> Vec<StateId> {
        self.pairs
            .iter()
            .filter_map(|p| {
                if p.from == state {
                    Some(p.to)
                } else if p.to == state {
                    Some(p.from)
                } else {
                    None
                }
            })
            .collect()
    }
}

pub(crate) fn compute(
    conn: &mut Connector,
    config: &StageConfig,
    graph: &mut PlanGraph,
    owner: ContainerId,
    effects: &mut ComputeEffects,
) {
    let Some((index, _)) = conn.best_pending(graph) else {
        return;
    };
    conn.pairs[index].status = PairStatus::Done;
    let Pair { from, to, .. } = conn.pairs[index];

    let from_scene = graph.state(from).scene().clone();
    let to_scene = graph.state(to).scene().clone();

    let mut parts: Vec<Trajectory> = Vec::with_capacity(conn.planners.len());
    let mut refusal: Option<String> = None;
    for (group, planner) in &conn.planners {
        match planner.plan(&from_scene, &to_scene, group, config.timeout) {
            Some(traj) => parts.push(traj),
            None => {
                refusal = Some(format!("planner refused group `{group}`"));
                break;
            }
        }
    }

    let (cost, trajectory, comment) = if let Some(reason) = refusal {
        (f64::INFINITY, None, Some(reason))
    } else {
        let merged = match conn.merge_mode {
            MergeMode::Parallel => Some(Trajectory::concat(&parts)),
            MergeMode::Sequential => Trajectory::zip_merge(&parts),
        };
        match merged {
            Some(traj) => (traj.path_length(), Some(traj), None),
            None => (
                f64::INFINITY,
                None,
                Some("group trajectories do not merge consistently".to_string()),
            ),
        }
    };

    let mut solution = Solution::new(
        Some(owner),
        from,
        to,
        cost,
        SolutionBody::Atomic(SubTrajectory::new(trajectory)),
    )
    .with_comment(comment);
    apply_cost_term(config, &mut solution);

    if solution.is_failure() {
        let id = graph.add_solution(solution);
        effects.failures.push(id);
        effects.failed_pair = Some((from, to));
    } else {
        let id = graph.add_solution(solution);
        effects.successes.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_mode_serializes_snake_case() {
        let json = serde_json::to_value(MergeMode::Sequential).unwrap();
        assert_eq!(json, "sequential");
        assert_eq!(MergeMode::Parallel.as_str(), "parallel");
    }
}
