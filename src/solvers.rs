//! Joining planners.
//!
//! A connector delegates the actual trajectory computation between two
//! scenes to a [`JoiningPlanner`]. The engine treats planners as opaque:
//! `plan(from, to) → trajectory | refusal`. [`JointInterpolation`] is the
//! reference implementation — a trivial straight-line interpolation that
//! always succeeds for a known group.

use std::time::Duration;

use crate::types::{Scene, Trajectory};

/// Computes a trajectory joining two scenes for one planning group.
///
/// Returning `None` is a refusal: the connector records the attempt as
/// infeasible. Planners may block; the engine treats calls as blocking
/// leaves and never runs two concurrently.
pub trait JoiningPlanner {
    fn plan(
        &self,
        from: &Scene,
        to: &Scene,
        group: &str,
        timeout: Option<Duration>,
    ) -> Option<Trajectory>;
}

/// Straight-line joint-space interpolation between two scenes.
///
/// Emits a start and an end waypoint for the group's joints. Since scenes
/// carry no joint values of their own, the waypoints are the group's zero
/// configuration — enough to exercise merging and cost plumbing.
#[derive(Debug, Clone, Default)]
pub struct JointInterpolation;

impl JointInterpolation {
    pub fn new() -> Self {
        Self
    }
}

impl JoiningPlanner for JointInterpolation {
    fn plan(
        &self,
        from: &Scene,
        _to: &Scene,
        group: &str,
        _timeout: Option<Duration>,
    ) -> Option<Trajectory> {
        let joints = from.model().group(group)?.joints.len();
        let waypoint = vec![0.0; joints];
        Some(Trajectory::new(group, vec![waypoint.clone(), waypoint]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RobotModel;
    use std::sync::Arc;

    #[test]
    fn test_interpolation_succeeds_for_known_group() {
        let model = Arc::new(RobotModel::new("m").with_group("arm", &["j1", "j2"]));
        let scene = Scene::new(model);
        let planner = JointInterpolation::new();
        let traj = planner.plan(&scene, &scene.diff(), "arm", None).unwrap();
        assert_eq!(traj.waypoints.len(), 2);
        assert_eq!(traj.waypoints[0].len(), 2);
        assert_eq!(traj.path_length(), 0.0);
    }

    #[test]
    fn test_interpolation_refuses_unknown_group() {
        let model = Arc::new(RobotModel::new("m"));
        let scene = Scene::new(model);
        assert!(JointInterpolation::new()
            .plan(&scene, &scene, "arm", None)
            .is_none());
    }
}
