//! Dead-end marking.
//!
//! The pruner is a side structure next to the plan graph: two bitmaps per
//! state (`dead_forward`, `dead_backward`) plus the transitive cascade that
//! keeps them current. Marks are monotonic within one planning run — a dead
//! state never revives — which is why marking must be *proved*, not guessed:
//! an endpoint whose connector pairs all failed is only dead once the
//! opposite interface provably cannot produce another partner.
//!
//! Container boundaries are invisible here: adjacency is recorded between
//! leaf stages, so a failure outside a container prunes work inside it the
//! same as anywhere else.

use crate::graph::PlanGraph;
use crate::interface::{Direction, InterfaceId, StateId};
use crate::pipeline::{stage_at, Registry};
use crate::stage::{SerialContainer, StageKind};

/// Per-state dead bits, growable alongside the state arena.
#[derive(Debug, Default)]
pub struct DeadMarks {
    forward: Vec<bool>,
    backward: Vec<bool>,
}

impl DeadMarks {
    pub(crate) fn grow_to(&mut self, len: usize) {
        self.forward.resize(len, false);
        self.backward.resize(len, false);
    }

    /// No feasible continuation toward the pipeline end.
    pub fn forward(&self, id: StateId) -> bool {
        self.forward[id.index()]
    }

    /// No feasible continuation toward the pipeline start.
    pub fn backward(&self, id: StateId) -> bool {
        self.backward[id.index()]
    }

    pub(crate) fn mark_forward(&mut self, id: StateId) {
        self.forward[id.index()] = true;
    }

    pub(crate) fn mark_backward(&mut self, id: StateId) {
        self.backward[id.index()] = true;
    }
}

/// Read-only view of the pipeline structure the cascade walks.
pub(crate) struct PruneCtx<'a> {
    pub root: &'a SerialContainer,
    pub registry: &'a Registry,
}

// ─── Event entry points ─────────────────────────────────────────────────────

/// A propagator fully processed `input` in `direction` without a single
/// feasible extension.
pub(crate) fn on_propagation_exhausted(
    input: StateId,
    direction: Direction,
    graph: &mut PlanGraph,
    ctx: &PruneCtx<'_>,
) {
    match direction {
        Direction::Forward => evaluate_forward(input, graph, ctx),
        Direction::Backward => evaluate_backward(input, graph, ctx),
    }
}

/// A connector pair `(from, to)` came back infeasible. Neither endpoint is
/// condemned outright; each is re-evaluated under the exhaustion rule.
pub(crate) fn on_pair_failed(
    from: StateId,
    to: StateId,
    graph: &mut PlanGraph,
    ctx: &PruneCtx<'_>,
) {
    evaluate_forward(from, graph, ctx);
    evaluate_backward(to, graph, ctx);
}

// ─── Evaluation ─────────────────────────────────────────────────────────────

/// Mark `state` dead toward the pipeline end if it can neither gain another
/// outgoing solution nor reach the end through an existing one, then cascade.
pub(crate) fn evaluate_forward(state: StateId, graph: &mut PlanGraph, ctx: &PruneCtx<'_>) {
    if graph.dead.forward(state) {
        return;
    }
    let interface = graph.state(state).interface();
    let boundary = &ctx.registry.boundaries[interface.index()];
    // States on the terminal ends boundary have arrived; they cannot die
    // forward.
    let Some(right_path) = &boundary.right else {
        return;
    };

    let right = stage_at(ctx.root, right_path);
    let can_gain = match &right.kind {
        StageKind::Propagator(p) => p.forward_active && !graph.state(state).consumed,
        StageKind::Connector(c) => {
            c.has_pending_with(graph, state)
                || right
                    .ends
                    .is_some_and(|opposite| interface_can_grow(opposite, graph, ctx))
        }
        StageKind::Generator(_) | StageKind::Container(_) => false,
    };
    if can_gain {
        return;
    }

    let all_dead = graph.state(state).outgoing.iter().all(|&s| {
        let sol = graph.solution(s);
        sol.is_failure() || graph.dead.forward(sol.end())
    });
    if !all_dead {
        return;
    }

    graph.dead.mark_forward(state);
    cascade_from(state, graph, ctx);
}

/// Mirror image of [`evaluate_forward`], toward the pipeline start.
pub(crate) fn evaluate_backward(state: StateId, graph: &mut PlanGraph, ctx: &PruneCtx<'_>) {
    if graph.dead.backward(state) {
        return;
    }
    let interface = graph.state(state).interface();
    let boundary = &ctx.registry.boundaries[interface.index()];
    let Some(left_path) = &boundary.left else {
        return;
    };

    let left = stage_at(ctx.root, left_path);
    let can_gain = match &left.kind {
        StageKind::Propagator(p) => p.backward_active && !graph.state(state).consumed,
        StageKind::Connector(c) => {
            c.has_pending_with(graph, state)
                || left
                    .starts
                    .is_some_and(|opposite| interface_can_grow(opposite, graph, ctx))
        }
        StageKind::Generator(_) | StageKind::Container(_) => false,
    };
    if can_gain {
        return;
    }

    let all_dead = graph.state(state).incoming.iter().all(|&s| {
        let sol = graph.solution(s);
        sol.is_failure() || graph.dead.backward(sol.start())
    });
    if !all_dead {
        return;
    }

    graph.dead.mark_backward(state);
    cascade_from(state, graph, ctx);
}

/// Propagate a fresh mark: re-evaluate neighbors whose viability depended on
/// `state` — chain predecessors/successors through linked solutions, and the
/// partners of every connector pair `state` took part in.
fn cascade_from(state: StateId, graph: &mut PlanGraph, ctx: &PruneCtx<'_>) {
    if graph.dead.forward(state) {
        let incoming = graph.state(state).incoming.clone();
        for sol_id in incoming {
            let sol = graph.solution(sol_id);
            if !sol.is_failure() {
                let predecessor = sol.start();
                evaluate_forward(predecessor, graph, ctx);
            }
        }
    }
    if graph.dead.backward(state) {
        let outgoing = graph.state(state).outgoing.clone();
        for sol_id in outgoing {
            let sol = graph.solution(sol_id);
            if !sol.is_failure() {
                let successor = sol.end();
                evaluate_backward(successor, graph, ctx);
            }
        }
    }

    // Pairs involving a dead state are off the table in both adjacent
    // connectors; their partners may have just lost their last opportunity.
    let interface = graph.state(state).interface();
    let boundary = &ctx.registry.boundaries[interface.index()];
    if let Some(right_path) = boundary.right.clone() {
        if let StageKind::Connector(c) = &stage_at(ctx.root, &right_path).kind {
            for partner in c.partners_of(state) {
                evaluate_backward(partner, graph, ctx);
            }
        }
    }
    if let Some(left_path) = boundary.left.clone() {
        if let StageKind::Connector(c) = &stage_at(ctx.root, &left_path).kind {
            for partner in c.partners_of(state) {
                evaluate_forward(partner, graph, ctx);
            }
        }
    }
}

// ─── Growth queries ─────────────────────────────────────────────────────────

/// Can any writer still push a *new* state into this interface?
///
/// Walks outward through the leaf adjacency: a generator grows its
/// boundaries while candidates remain; a propagator grows its output side
/// while it has an unconsumed alive input or its own input side can still
/// grow. Connectors never mint states. The walk strictly moves toward a
/// terminal, so it terminates.
pub(crate) fn interface_can_grow(
    interface: InterfaceId,
    graph: &PlanGraph,
    ctx: &PruneCtx<'_>,
) -> bool {
    let boundary = &ctx.registry.boundaries[interface.index()];

    if let Some(left_path) = &boundary.left {
        let left = stage_at(ctx.root, left_path);
        match &left.kind {
            StageKind::Generator(g) => {
                if g.source.can_generate() {
                    return true;
                }
            }
            StageKind::Propagator(p) if p.forward_active => {
                if let Some(input) = left.starts {
                    if has_unconsumed_alive(input, graph)
                        || interface_can_grow(input, graph, ctx)
                    {
                        return true;
                    }
                }
            }
            _ => {}
        }
    }

    if let Some(right_path) = &boundary.right {
        let right = stage_at(ctx.root, right_path);
        match &right.kind {
            StageKind::Generator(g) => {
                if g.source.can_generate() {
                    return true;
                }
            }
            StageKind::Propagator(p) if p.backward_active => {
                if let Some(input) = right.ends {
                    if has_unconsumed_alive(input, graph)
                        || interface_can_grow(input, graph, ctx)
                    {
                        return true;
                    }
                }
            }
            _ => {}
        }
    }

    false
}

fn has_unconsumed_alive(interface: InterfaceId, graph: &PlanGraph) -> bool {
    graph
        .interface(interface)
        .iter()
        .any(|s| !graph.state(s).consumed && graph.alive(s))
}
