//! The pipeline: task assembly, wiring, and planning entry points.
//!
//! A [`Task`] owns the stage tree (rooted at a serial container), the plan
//! graph arena, and the sorted end-to-end solution list. `init()` validates
//! the wiring and allocates one shared interface per boundary of the
//! flattened stage sequence; `plan()` drives the scheduling loop in
//! [`runner`] until exhaustion or deadline.

pub mod observer;
pub(crate) mod runner;
pub mod validation;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::PipelineError;
use crate::graph::PlanGraph;
use crate::interface::{InterfaceDirection, InterfaceId};
use crate::solution::{ContainerId, Solution, SolutionBody, SolutionId};
use crate::stage::{SerialContainer, Stage, StageKind};
use crate::types::RobotModel;

use observer::{NoopObserver, PlanObserver};
use validation::{ValidationEngine, WiringLayout};

/// Index path of a stage inside the (possibly nested) stage tree.
pub(crate) type StagePath = Vec<usize>;

/// Leaf adjacency of one boundary: the leaf stage just left and just right
/// of it. Terminals have one side only. Container boundaries record the
/// *inner* leaves, which is what makes pruning cross container walls.
pub(crate) struct Boundary {
    pub left: Option<StagePath>,
    pub right: Option<StagePath>,
}

pub(crate) struct ContainerRecord {
    pub parent: Option<ContainerId>,
    pub starts: InterfaceId,
    pub ends: InterfaceId,
    /// Path of the wrapping stage; empty for the root.
    pub path: StagePath,
}

/// Side tables built at init time: boundary adjacency and the container
/// hierarchy, both phrased over leaf stages.
#[derive(Default)]
pub(crate) struct Registry {
    pub boundaries: Vec<Boundary>,
    pub containers: Vec<ContainerRecord>,
}

impl Registry {
    /// The container a leaf at `path` is a direct child of.
    pub fn container_of(&self, leaf_path: &[usize]) -> ContainerId {
        let prefix = &leaf_path[..leaf_path.len() - 1];
        let index = self
            .containers
            .iter()
            .position(|c| c.path == prefix)
            .unwrap_or(0);
        ContainerId(index as u16)
    }

    pub fn container(&self, id: ContainerId) -> &ContainerRecord {
        &self.containers[id.0 as usize]
    }
}

/// Walk the stage tree to the stage at `path`.
pub(crate) fn stage_at<'a>(root: &'a SerialContainer, path: &[usize]) -> &'a Stage {
    let mut stage = &root.children[path[0]];
    for &index in &path[1..] {
        match &stage.kind {
            StageKind::Container(inner) => stage = &inner.children[index],
            _ => break,
        }
    }
    stage
}

pub(crate) fn stage_at_mut<'a>(root: &'a mut SerialContainer, path: &[usize]) -> &'a mut Stage {
    let mut stage = &mut root.children[path[0]];
    for &index in &path[1..] {
        if !matches!(stage.kind, StageKind::Container(_)) {
            break;
        }
        match &mut stage.kind {
            StageKind::Container(inner) => stage = &mut inner.children[index],
            _ => unreachable!(),
        }
    }
    stage
}

/// Leaf stages in serial order, with their tree paths.
pub(crate) fn flatten_leaves(root: &SerialContainer) -> Vec<StagePath> {
    fn walk(container: &SerialContainer, prefix: &mut StagePath, out: &mut Vec<StagePath>) {
        for (i, child) in container.children.iter().enumerate() {
            prefix.push(i);
            match &child.kind {
                StageKind::Container(inner) => walk(inner, prefix, out),
                _ => out.push(prefix.clone()),
            }
            prefix.pop();
        }
    }
    let mut out = Vec::new();
    walk(root, &mut Vec::new(), &mut out);
    out
}

// ─── Task ───────────────────────────────────────────────────────────────────

/// The top-level pipeline.
pub struct Task {
    name: String,
    model: Arc<RobotModel>,
    root: SerialContainer,
    graph: PlanGraph,
    registry: Registry,
    /// End-to-end solutions, sorted ascending by cost.
    solutions: Vec<SolutionId>,
    initialized: bool,
}

impl Task {
    pub fn new(name: impl Into<String>, model: RobotModel) -> Self {
        Self {
            name: name.into(),
            model: Arc::new(model),
            root: SerialContainer::new(),
            graph: PlanGraph::new(),
            registry: Registry::default(),
            solutions: Vec::new(),
            initialized: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &Arc<RobotModel> {
        &self.model
    }

    /// Append a stage at the end of the pipeline; ownership transfers here.
    pub fn add(&mut self, stage: Stage) -> &mut Self {
        debug_assert!(!self.initialized, "stages cannot be added after init");
        self.root.add(stage);
        self
    }

    /// Validate the wiring and allocate the shared boundary interfaces.
    /// Idempotent; `plan()` calls it on demand.
    pub fn init(&mut self) -> Result<(), PipelineError> {
        if self.initialized {
            return Ok(());
        }
        if self.root.is_empty() {
            return Err(PipelineError::EmptyPipeline);
        }

        let layout = WiringLayout::build(&self.root, &self.model);
        let report = ValidationEngine::with_defaults().validate(&layout);
        if report.has_errors() {
            return Err(PipelineError::Validation(report.errors().cloned().collect()));
        }

        let leaves = flatten_leaves(&self.root);
        self.resolve_either_way(&leaves);
        self.wire(&leaves);
        self.init_plugs(&leaves);
        self.initialized = true;
        Ok(())
    }

    /// Plan until exhaustion or deadline. `Ok(true)` iff at least one
    /// end-to-end solution was enumerated.
    pub fn plan(&mut self, timeout: Duration) -> Result<bool, PipelineError> {
        self.plan_with_observer(timeout, &mut NoopObserver)
    }

    pub fn plan_with_observer(
        &mut self,
        timeout: Duration,
        observer: &mut dyn PlanObserver,
    ) -> Result<bool, PipelineError> {
        self.init()?;
        let deadline = Instant::now().checked_add(timeout);
        runner::run(
            &mut self.root,
            &mut self.graph,
            &self.registry,
            &mut self.solutions,
            deadline,
            observer,
        );
        Ok(!self.solutions.is_empty())
    }

    // ─── Introspection ──────────────────────────────────────────────────

    /// End-to-end solutions in ascending cost order.
    pub fn solutions(&self) -> impl Iterator<Item = &Solution> + '_ {
        self.solutions.iter().map(|&id| self.graph.solution(id))
    }

    pub fn num_solutions(&self) -> usize {
        self.solutions.len()
    }

    pub fn solution_costs(&self) -> Vec<f64> {
        self.solutions().map(|s| s.cost()).collect()
    }

    pub fn solution(&self, id: SolutionId) -> &Solution {
        self.graph.solution(id)
    }

    /// Depth-first lookup of a stage by name, containers included.
    pub fn find_stage(&self, name: &str) -> Option<&Stage> {
        self.root.find_stage(name)
    }

    pub fn graph(&self) -> &PlanGraph {
        &self.graph
    }

    /// The ordered atomic sub-trajectory solutions a composed solution
    /// flattens into.
    pub fn flattened(&self, id: SolutionId) -> Vec<SolutionId> {
        fn collect(graph: &PlanGraph, id: SolutionId, out: &mut Vec<SolutionId>) {
            match graph.solution(id).body() {
                SolutionBody::Atomic(_) => out.push(id),
                SolutionBody::Sequence(seq) => {
                    for &child in &seq.children {
                        collect(graph, child, out);
                    }
                }
                SolutionBody::Wrapped(w) => collect(graph, w.inner, out),
            }
        }
        let mut out = Vec::new();
        collect(&self.graph, id, &mut out);
        out
    }

    /// Clear all planning state so `plan` can run afresh. Stage delegates
    /// (candidate sources, propagation delegates) are not rewound.
    pub fn reset(&mut self) {
        self.graph.clear_planning_state();
        self.solutions.clear();
        fn reset_stages(container: &mut SerialContainer) {
            for child in &mut container.children {
                child.reset_runtime();
                if let StageKind::Container(inner) = &mut child.kind {
                    reset_stages(inner);
                }
            }
        }
        reset_stages(&mut self.root);
    }

    // ─── Wiring ─────────────────────────────────────────────────────────

    /// Resolve unrestricted either-way propagators against their neighbors:
    /// a side is active exactly when the neighbor on that side writes the
    /// shared boundary.
    fn resolve_either_way(&mut self, leaves: &[StagePath]) {
        for i in 0..leaves.len() {
            let is_either_way = matches!(
                &stage_at(&self.root, &leaves[i]).kind,
                StageKind::Propagator(p)
                    if p.direction() == crate::stage::PropagationDirection::EitherWay
            );
            if !is_either_way {
                continue;
            }
            let fed_from_left = i > 0 && writes_rightward(stage_at(&self.root, &leaves[i - 1]));
            let fed_from_right =
                i + 1 < leaves.len() && writes_leftward(stage_at(&self.root, &leaves[i + 1]));
            if let StageKind::Propagator(p) =
                &mut stage_at_mut(&mut self.root, &leaves[i]).kind
            {
                p.forward_active = fed_from_left;
                p.backward_active = fed_from_right;
            }
        }
    }

    fn wire(&mut self, leaves: &[StagePath]) {
        // One interface per boundary; ids equal boundary indices.
        for boundary in 0..=leaves.len() {
            let direction = boundary_direction(&self.root, leaves, boundary);
            self.graph.add_interface(direction);
        }

        // Leaf interface handles, container spans, and container records.
        self.registry.containers.push(ContainerRecord {
            parent: None,
            starts: InterfaceId(0),
            ends: InterfaceId(leaves.len() as u32),
            path: Vec::new(),
        });
        let mut next_leaf = 0usize;
        wire_container_children(
            &mut self.root,
            &mut Vec::new(),
            ContainerId(0),
            &mut next_leaf,
            &mut self.registry,
        );

        // Boundary adjacency over leaves.
        self.registry.boundaries.clear();
        for boundary in 0..=leaves.len() {
            self.registry.boundaries.push(Boundary {
                left: boundary.checked_sub(1).map(|i| leaves[i].clone()),
                right: (boundary < leaves.len()).then(|| leaves[boundary].clone()),
            });
        }
    }

    fn init_plugs(&mut self, leaves: &[StagePath]) {
        for path in leaves {
            match &mut stage_at_mut(&mut self.root, path).kind {
                StageKind::Generator(g) => g.source.init(&self.model),
                StageKind::Propagator(p) => p.delegate.init(&self.model),
                _ => {}
            }
        }
    }
}

/// Does this leaf write states into the boundary on its right?
fn writes_rightward(stage: &Stage) -> bool {
    match &stage.kind {
        StageKind::Generator(_) => true,
        StageKind::Propagator(p) => p.forward_active,
        _ => false,
    }
}

/// Does this leaf write states into the boundary on its left?
fn writes_leftward(stage: &Stage) -> bool {
    match &stage.kind {
        StageKind::Generator(_) => true,
        StageKind::Propagator(p) => p.backward_active,
        _ => false,
    }
}

fn boundary_direction(
    root: &SerialContainer,
    leaves: &[StagePath],
    boundary: usize,
) -> InterfaceDirection {
    if boundary > 0 {
        let left = stage_at(root, &leaves[boundary - 1]);
        if writes_rightward(left) {
            return match &left.kind {
                StageKind::Generator(_) => InterfaceDirection::Both,
                _ => InterfaceDirection::Forward,
            };
        }
    }
    if boundary < leaves.len() {
        let right = stage_at(root, &leaves[boundary]);
        if writes_leftward(right) {
            return match &right.kind {
                StageKind::Generator(_) => InterfaceDirection::Both,
                _ => InterfaceDirection::Backward,
            };
        }
    }
    InterfaceDirection::Both
}

/// Assign leaf interface handles in serial order and register nested
/// containers (with their spans) depth-first.
fn wire_container_children(
    container: &mut SerialContainer,
    path: &mut StagePath,
    container_id: ContainerId,
    next_leaf: &mut usize,
    registry: &mut Registry,
) {
    for i in 0..container.children.len() {
        path.push(i);
        let is_container = matches!(container.children[i].kind, StageKind::Container(_));
        if is_container {
            let child_id = ContainerId(registry.containers.len() as u16);
            let first = *next_leaf;
            registry.containers.push(ContainerRecord {
                parent: Some(container_id),
                starts: InterfaceId(first as u32),
                ends: InterfaceId(first as u32), // span end patched below
                path: path.clone(),
            });
            let child = &mut container.children[i];
            if let StageKind::Container(inner) = &mut child.kind {
                wire_container_children(inner, path, child_id, next_leaf, registry);
            }
            let ends = InterfaceId(*next_leaf as u32);
            registry.containers[child_id.0 as usize].ends = ends;
            let child = &mut container.children[i];
            child.starts = Some(InterfaceId(first as u32));
            child.ends = Some(ends);
        } else {
            let child = &mut container.children[i];
            child.starts = Some(InterfaceId(*next_leaf as u32));
            child.ends = Some(InterfaceId(*next_leaf as u32 + 1));
            *next_leaf += 1;
        }
        path.pop();
    }
}
