//! The plan graph arena.
//!
//! All interface states, solutions, and interfaces of one task live here,
//! addressed by typed ids. Solutions are edges between states; chains link
//! through shared endpoints. Because everything is id-indexed, endpoint
//! references are naturally non-owning and the whole cyclic-looking graph
//! tears down uniformly when the task drops.

use crate::interface::{Interface, InterfaceDirection, InterfaceId, InterfaceState, Priority, StateId};
use crate::pruning::DeadMarks;
use crate::solution::{Solution, SolutionId};
use crate::types::Scene;

#[derive(Default)]
pub struct PlanGraph {
    states: Vec<InterfaceState>,
    solutions: Vec<Solution>,
    interfaces: Vec<Interface>,
    /// Dead-end marks, one pair of bits per state. See [`crate::pruning`].
    pub(crate) dead: DeadMarks,
}

impl PlanGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Interfaces ─────────────────────────────────────────────────────

    pub(crate) fn add_interface(&mut self, direction: InterfaceDirection) -> InterfaceId {
        let id = InterfaceId(self.interfaces.len() as u32);
        self.interfaces.push(Interface::new(direction));
        id
    }

    pub fn interface(&self, id: InterfaceId) -> &Interface {
        &self.interfaces[id.index()]
    }

    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    // ─── States ─────────────────────────────────────────────────────────

    /// Mint a state belonging to `interface` without enqueueing it.
    ///
    /// Infeasible states stay detached forever: they are part of the graph
    /// (failures link to them) but never enter a consumption queue. Feasible
    /// states are enqueued once their final priority is known, via
    /// [`PlanGraph::enqueue_state`].
    pub(crate) fn new_state(&mut self, scene: Scene, interface: InterfaceId) -> StateId {
        let id = StateId(self.states.len() as u32);
        self.states
            .push(InterfaceState::new(scene, Priority::IDLE, interface));
        self.dead.grow_to(self.states.len());
        id
    }

    /// Assign the final priority and insert into the owning interface's
    /// sorted queue.
    pub(crate) fn enqueue_state(&mut self, id: StateId, priority: Priority) {
        self.states[id.index()].priority = priority;
        let interface = self.states[id.index()].interface;
        let states = &self.states;
        self.interfaces[interface.index()].insert_sorted(id, priority, |s| states[s.index()].priority);
    }

    pub fn state(&self, id: StateId) -> &InterfaceState {
        &self.states[id.index()]
    }

    pub(crate) fn state_mut(&mut self, id: StateId) -> &mut InterfaceState {
        &mut self.states[id.index()]
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// A state is alive while it is dead in neither direction.
    pub fn alive(&self, id: StateId) -> bool {
        !self.dead.forward(id) && !self.dead.backward(id)
    }

    // ─── Solutions ──────────────────────────────────────────────────────

    /// Store a solution and link it into its endpoints' in/out lists.
    /// Failures are linked too — the pruner reads them; enumeration skips
    /// them.
    pub(crate) fn add_solution(&mut self, solution: Solution) -> SolutionId {
        let id = SolutionId(self.solutions.len() as u32);
        let (start, end) = (solution.start(), solution.end());
        self.solutions.push(solution);
        self.states[start.index()].outgoing.push(id);
        self.states[end.index()].incoming.push(id);
        id
    }

    pub fn solution(&self, id: SolutionId) -> &Solution {
        &self.solutions[id.index()]
    }

    pub(crate) fn solution_mut(&mut self, id: SolutionId) -> &mut Solution {
        &mut self.solutions[id.index()]
    }

    pub fn solution_count(&self) -> usize {
        self.solutions.len()
    }

    /// Drop all planning state (interfaces keep their ids and directions).
    pub(crate) fn clear_planning_state(&mut self) {
        self.states.clear();
        self.solutions.clear();
        self.dead = DeadMarks::default();
        for iface in &mut self.interfaces {
            iface.states.clear();
        }
    }
}
