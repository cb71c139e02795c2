//! Shared collaborator types: robot model, scenes, trajectories.
//!
//! The engine treats all of these as opaque values. A [`Scene`] is an
//! immutable snapshot that supports [`Scene::diff`]; a [`Trajectory`] is a
//! waypoint list produced by a joining planner. Nothing in this module knows
//! about stages or solutions.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A named joint group of the robot model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointGroup {
    pub name: String,
    pub joints: Vec<String>,
}

/// Kinematic model handed to [`crate::pipeline::Task::new`].
///
/// Connectors resolve their planning groups against this at init time;
/// a missing group is an init failure, not a planning failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RobotModel {
    pub name: String,
    pub groups: Vec<JointGroup>,
}

impl RobotModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: Vec::new(),
        }
    }

    /// Add a joint group (builder style).
    pub fn with_group(mut self, name: impl Into<String>, joints: &[&str]) -> Self {
        self.groups.push(JointGroup {
            name: name.into(),
            joints: joints.iter().map(|j| (*j).to_string()).collect(),
        });
        self
    }

    pub fn group(&self, name: &str) -> Option<&JointGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.group(name).is_some()
    }
}

// ─── Scene ──────────────────────────────────────────────────────────────────

struct SceneInner {
    model: Arc<RobotModel>,
    parent: Option<Scene>,
    generation: u32,
}

/// Immutable planning scene. Cloning is cheap; the payload is shared.
///
/// Many interface states reference the same scene. [`Scene::diff`] derives a
/// child scene, the way a propagator mints the scene of a successor state.
#[derive(Clone)]
pub struct Scene {
    inner: Arc<SceneInner>,
}

impl Scene {
    /// Root scene for a robot model.
    pub fn new(model: Arc<RobotModel>) -> Self {
        Self {
            inner: Arc::new(SceneInner {
                model,
                parent: None,
                generation: 0,
            }),
        }
    }

    /// Derive a child scene referencing this one as parent.
    pub fn diff(&self) -> Scene {
        Scene {
            inner: Arc::new(SceneInner {
                model: Arc::clone(&self.inner.model),
                parent: Some(self.clone()),
                generation: self.inner.generation + 1,
            }),
        }
    }

    pub fn model(&self) -> &RobotModel {
        &self.inner.model
    }

    /// Number of `diff` steps from the root scene.
    pub fn generation(&self) -> u32 {
        self.inner.generation
    }

    pub fn parent(&self) -> Option<&Scene> {
        self.inner.parent.as_ref()
    }
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("model", &self.inner.model.name)
            .field("generation", &self.inner.generation)
            .finish()
    }
}

// ─── Trajectory ─────────────────────────────────────────────────────────────

/// One waypoint: a joint position per joint of the group.
pub type Waypoint = Vec<f64>;

/// Opaque trajectory fragment produced by a joining planner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    pub group: String,
    pub waypoints: Vec<Waypoint>,
}

impl Trajectory {
    pub fn new(group: impl Into<String>, waypoints: Vec<Waypoint>) -> Self {
        Self {
            group: group.into(),
            waypoints,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Sum of Euclidean distances between consecutive waypoints.
    pub fn path_length(&self) -> f64 {
        self.waypoints
            .windows(2)
            .map(|w| {
                w[0].iter()
                    .zip(&w[1])
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f64>()
                    .sqrt()
            })
            .sum()
    }

    /// Concatenate per-group trajectories back to back.
    ///
    /// Used for parallel merging, where each group's fragment runs
    /// independently.
    pub fn concat(parts: &[Trajectory]) -> Trajectory {
        let group = parts
            .iter()
            .map(|p| p.group.as_str())
            .collect::<Vec<_>>()
            .join("+");
        let waypoints = parts.iter().flat_map(|p| p.waypoints.clone()).collect();
        Trajectory { group, waypoints }
    }

    /// Merge per-group trajectories waypoint-by-waypoint.
    ///
    /// All parts must have the same waypoint count; returns `None` when they
    /// are inconsistent. Used for sequential merging.
    pub fn zip_merge(parts: &[Trajectory]) -> Option<Trajectory> {
        let first = parts.first()?;
        let len = first.waypoints.len();
        if parts.iter().any(|p| p.waypoints.len() != len) {
            return None;
        }
        let group = parts
            .iter()
            .map(|p| p.group.as_str())
            .collect::<Vec<_>>()
            .join("+");
        let mut waypoints: Vec<Waypoint> = vec![Vec::new(); len];
        for part in parts {
            for (merged, wp) in waypoints.iter_mut().zip(&part.waypoints) {
                merged.extend_from_slice(wp);
            }
        }
        Some(Trajectory { group, waypoints })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> Arc<RobotModel> {
        Arc::new(RobotModel::new("pr2").with_group("arm", &["j1", "j2"]))
    }

    #[test]
    fn test_model_group_lookup() {
        let m = model();
        assert!(m.has_group("arm"));
        assert!(!m.has_group("legs"));
        assert_eq!(m.group("arm").map(|g| g.joints.len()), Some(2));
    }

    #[test]
    fn test_scene_diff_chains_generations() {
        let root = Scene::new(model());
        let child = root.diff();
        let grandchild = child.diff();
        assert_eq!(root.generation(), 0);
        assert_eq!(child.generation(), 1);
        assert_eq!(grandchild.generation(), 2);
        assert!(grandchild.parent().is_some());
        assert!(root.parent().is_none());
    }

    #[test]
    fn test_path_length() {
        let t = Trajectory::new("arm", vec![vec![0.0, 0.0], vec![3.0, 4.0]]);
        assert!((t.path_length() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_zip_merge_requires_consistent_lengths() {
        let a = Trajectory::new("arm", vec![vec![0.0], vec![1.0]]);
        let b = Trajectory::new("eef", vec![vec![2.0], vec![3.0]]);
        let merged = Trajectory::zip_merge(&[a.clone(), b]).unwrap();
        assert_eq!(merged.group, "arm+eef");
        assert_eq!(merged.waypoints, vec![vec![0.0, 2.0], vec![1.0, 3.0]]);

        let short = Trajectory::new("eef", vec![vec![2.0]]);
        assert!(Trajectory::zip_merge(&[a, short]).is_none());
    }

    #[test]
    fn test_concat_appends_segments() {
        let a = Trajectory::new("arm", vec![vec![0.0], vec![1.0]]);
        let b = Trajectory::new("eef", vec![vec![2.0]]);
        let joined = Trajectory::concat(&[a, b]);
        assert_eq!(joined.waypoints.len(), 3);
    }
}
