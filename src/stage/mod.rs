//! Stages: the nodes of a pipeline.
//!
//! A [`Stage`] is a shared header (name, boundary interface handles, local
//! solution store, counters, typed config) plus a closed [`StageKind`]
//! variant — the hierarchy is known at compile time, so dispatch is a match,
//! not a vtable. The domain-specific work inside each variant (candidate
//! generation, scene extension, trajectory joining) stays behind small
//! pluggable traits; the routing logic here is what the engine owns.

pub mod connector;
pub mod container;
pub mod generator;
pub mod propagator;

use std::cmp::Ordering;
use std::time::Duration;

use crate::graph::PlanGraph;
use crate::interface::{Direction, InterfaceId, Priority, StateId};
use crate::solution::{ContainerId, CostTerm, Solution, SolutionId};

pub use connector::{Connector, GroupPlannerVec, MergeMode};
pub use container::SerialContainer;
pub use generator::{Candidate, CandidateSource, FixedCandidates, Generator};
pub use propagator::{
    Extension, FixedExtensions, NoopPropagation, Propagation, PropagationDirection, Propagator,
};

// ─── Work keys ──────────────────────────────────────────────────────────────

/// Tie-break rank of a work item at equal priority: forward work first, then
/// connector pairs, then backward work; generators run only when nothing is
/// in flight.
pub(crate) const RANK_FORWARD: u8 = 0;
pub(crate) const RANK_CONNECT: u8 = 1;
pub(crate) const RANK_BACKWARD: u8 = 2;
pub(crate) const RANK_GENERATE: u8 = 3;

/// Scheduling key of a stage's next-to-compute item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WorkKey {
    pub priority: Priority,
    pub rank: u8,
}

impl Ord for WorkKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.rank.cmp(&other.rank))
    }
}

impl PartialOrd for WorkKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ─── Config ─────────────────────────────────────────────────────────────────

/// Typed per-stage configuration. Connector-specific options live on
/// [`Connector`] itself.
#[derive(Default)]
pub struct StageConfig {
    /// Time limit handed to external planners; `None` means unbounded.
    pub timeout: Option<Duration>,
    /// Optional cost override applied to every produced solution.
    pub(crate) cost_term: Option<Box<dyn CostTerm>>,
}

// ─── Compute effects ────────────────────────────────────────────────────────

/// What one `compute()` invocation did, for the runner to integrate.
#[derive(Default)]
pub(crate) struct ComputeEffects {
    pub successes: Vec<SolutionId>,
    pub failures: Vec<SolutionId>,
    /// A propagator input fully processed, with its extension direction.
    pub processed: Option<(StateId, Direction)>,
    /// A connector pair that came back infeasible.
    pub failed_pair: Option<(StateId, StateId)>,
}

/// Apply a stage's cost term, if any, to a freshly built solution.
///
/// Solutions that already failed (a planner refused, groups did not merge)
/// are not repriced: a cost term can condemn a feasible solution, never
/// resurrect an infeasible one.
pub(crate) fn apply_cost_term(config: &StageConfig, solution: &mut Solution) {
    if solution.is_failure() {
        return;
    }
    if let Some(term) = &config.cost_term {
        let mut comment = String::new();
        let cost = term.cost(solution, &mut comment);
        solution.set_cost(cost);
        if !comment.is_empty() && solution.comment().is_none() {
            solution.set_comment(comment);
        }
    }
}

// ─── Stage ──────────────────────────────────────────────────────────────────

/// A node in the pipeline, with up to two boundary interfaces and a local
/// solution store.
pub struct Stage {
    name: String,
    pub(crate) starts: Option<InterfaceId>,
    pub(crate) ends: Option<InterfaceId>,
    pub(crate) config: StageConfig,
    pub(crate) calls: u32,
    pub(crate) failures: u32,
    pub(crate) solutions: Vec<SolutionId>,
    pub(crate) kind: StageKind,
}

/// The four stage variants.
pub enum StageKind {
    Generator(Generator),
    Propagator(Propagator),
    Connector(Connector),
    Container(SerialContainer),
}

impl Stage {
    fn with_kind(name: impl Into<String>, kind: StageKind) -> Self {
        Self {
            name: name.into(),
            starts: None,
            ends: None,
            config: StageConfig::default(),
            calls: 0,
            failures: 0,
            solutions: Vec::new(),
            kind,
        }
    }

    /// A stage spawning candidate states from the given source.
    pub fn generator(name: impl Into<String>, source: impl CandidateSource + 'static) -> Self {
        Self::with_kind(name, StageKind::Generator(Generator::new(source)))
    }

    /// A stage extending incoming states in one (or either) direction.
    pub fn propagator(
        name: impl Into<String>,
        direction: PropagationDirection,
        delegate: impl Propagation + 'static,
    ) -> Self {
        Self::with_kind(
            name,
            StageKind::Propagator(Propagator::new(direction, delegate)),
        )
    }

    /// A stage joining one state from each side with a computed trajectory.
    pub fn connector(name: impl Into<String>, planners: GroupPlannerVec) -> Self {
        Self::with_kind(name, StageKind::Connector(Connector::new(planners)))
    }

    /// A sub-pipeline presenting itself as a single stage.
    pub fn container(name: impl Into<String>, inner: SerialContainer) -> Self {
        Self::with_kind(name, StageKind::Container(inner))
    }

    // ─── Builders ───────────────────────────────────────────────────────

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn with_cost_term(mut self, term: impl CostTerm + 'static) -> Self {
        self.config.cost_term = Some(Box::new(term));
        self
    }

    /// Connector merge mode. Panics when applied to any other variant.
    pub fn with_merge_mode(mut self, mode: MergeMode) -> Self {
        match &mut self.kind {
            StageKind::Connector(c) => c.merge_mode = mode,
            _ => panic!("merge_mode applies only to connector stages"),
        }
        self
    }

    // ─── Accessors ──────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of `compute()` invocations so far.
    pub fn calls(&self) -> u32 {
        self.calls
    }

    /// Number of infeasible solutions this stage produced.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// All solutions this stage produced, failures included.
    pub fn solutions(&self) -> &[SolutionId] {
        &self.solutions
    }

    pub fn kind(&self) -> &StageKind {
        &self.kind
    }

    /// Clear planning-run state: counters, the local solution store, and the
    /// connector pair ledger. Delegates are not rewound.
    pub(crate) fn reset_runtime(&mut self) {
        self.calls = 0;
        self.failures = 0;
        self.solutions.clear();
        if let StageKind::Connector(c) = &mut self.kind {
            c.clear_ledger();
        }
    }

    // ─── Scheduling ─────────────────────────────────────────────────────

    /// Key of this leaf stage's next-to-compute item, or `None` when idle.
    /// Containers are traversed by the runner, not peeked here.
    pub(crate) fn peek(&mut self, graph: &PlanGraph) -> Option<WorkKey> {
        let (starts, ends) = (self.starts, self.ends);
        match &mut self.kind {
            StageKind::Generator(g) => g.peek(),
            StageKind::Propagator(p) => p.peek(graph, starts, ends),
            StageKind::Connector(c) => c.peek(graph, starts?, ends?),
            StageKind::Container(_) => None,
        }
    }

    /// Run one compute step. Must only be called after `peek` returned
    /// `Some` in the same round.
    pub(crate) fn compute(&mut self, graph: &mut PlanGraph, owner: ContainerId) -> ComputeEffects {
        self.calls += 1;
        let (starts, ends) = (self.starts, self.ends);
        let mut effects = ComputeEffects::default();
        match &mut self.kind {
            StageKind::Generator(gen) => {
                generator::compute(gen, &self.config, graph, owner, starts, ends, &mut effects)
            }
            StageKind::Propagator(prop) => {
                propagator::compute(prop, &self.config, graph, owner, starts, ends, &mut effects)
            }
            StageKind::Connector(conn) => {
                connector::compute(conn, &self.config, graph, owner, &mut effects)
            }
            StageKind::Container(_) => {}
        }
        self.failures += effects.failures.len() as u32;
        self.solutions.extend(effects.failures.iter().copied());
        self.solutions.extend(effects.successes.iter().copied());
        effects
    }
}
