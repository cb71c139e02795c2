//! stageflow — a hierarchical planning-pipeline engine.
//!
//! Clients assemble a directed pipeline of *stages* — generators that spawn
//! candidate states, propagators that extend a state forward or backward,
//! connectors that join two existing states with a computed trajectory, and
//! serial containers that wrap sub-pipelines — then ask the engine to
//! enumerate end-to-end solutions in order of increasing cost.
//!
//! The engine owns the hard part: routing candidate states between stage
//! boundaries, lazily composing end-to-end solutions from stage-local
//! fragments, ranking them by accumulated cost, and propagating
//! infeasibility across the pipeline so no stage wastes compute on chains
//! already known to be dead. Geometric planners and the scene representation
//! stay opaque behind small traits.
//!
//! # Quick start
//!
//! ```
//! use std::time::Duration;
//! use stageflow::pipeline::Task;
//! use stageflow::solution::PredefinedCosts;
//! use stageflow::solvers::JointInterpolation;
//! use stageflow::stage::{FixedCandidates, Stage};
//! use stageflow::types::RobotModel;
//! use std::sync::Arc;
//!
//! let model = RobotModel::new("demo").with_group("arm", &["j1", "j2"]);
//! let planner = Arc::new(JointInterpolation::new());
//!
//! let mut task = Task::new("pick", model);
//! task.add(Stage::generator("start", FixedCandidates::new([1.0, 2.0])))
//!     .add(Stage::connector("join", vec![("arm".to_string(), planner as _)]))
//!     .add(Stage::generator("goal", FixedCandidates::new([10.0])));
//!
//! assert!(task.plan(Duration::from_secs(1)).unwrap());
//! assert_eq!(task.solution_costs(), vec![11.0, 12.0]);
//! ```

pub mod error;
pub mod graph;
pub mod interface;
pub mod pipeline;
pub mod pruning;
pub mod solution;
pub mod solvers;
pub mod stage;
pub mod types;

pub use error::{ErrorCode, PipelineError, WiringError};
pub use interface::{Direction, InterfaceDirection, Priority};
pub use pipeline::observer::{ComputeReport, NoopObserver, PlanObserver, TimingObserver};
pub use pipeline::Task;
pub use solution::{
    CostStream, CostTerm, PredefinedCosts, Solution, SolutionBody, SolutionSequence, SubTrajectory,
    WrappedSolution,
};
pub use solvers::{JointInterpolation, JoiningPlanner};
pub use stage::{
    CandidateSource, FixedCandidates, FixedExtensions, MergeMode, NoopPropagation, Propagation,
    PropagationDirection, SerialContainer, Stage,
};
pub use types::{RobotModel, Scene, Trajectory};
