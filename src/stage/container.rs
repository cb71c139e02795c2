//! Serial container: an ordered sub-pipeline presented as a single stage.
//!
//! The container exposes its first child's starts and its last child's ends
//! as its own boundaries, so a parent cannot tell it from a leaf. Scheduling
//! and pruning recurse straight through it.

use super::Stage;

#[derive(Default)]
pub struct SerialContainer {
    pub(crate) children: Vec<Stage>,
}

impl SerialContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage at the end; ownership transfers to the container.
    pub fn add(&mut self, stage: Stage) -> &mut Self {
        self.children.push(stage);
        self
    }

    pub fn children(&self) -> &[Stage] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Depth-first search for a stage by name.
    pub fn find_stage(&self, name: &str) -> Option<&Stage> {
        for child in &self.children {
            if child.name() == name {
                return Some(child);
            }
            if let super::StageKind::Container(inner) = &child.kind {
                if let Some(found) = inner.find_stage(name) {
                    return Some(found);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{FixedCandidates, Stage};

    #[test]
    fn test_find_stage_recurses() {
        let mut inner = SerialContainer::new();
        inner.add(Stage::generator("GEN_IN", FixedCandidates::new([0.0])));
        let mut outer = SerialContainer::new();
        outer.add(Stage::generator("GEN_OUT", FixedCandidates::new([0.0])));
        outer.add(Stage::container("SC", inner));
        assert!(outer.find_stage("GEN_IN").is_some());
        assert!(outer.find_stage("GEN_OUT").is_some());
        assert!(outer.find_stage("MISSING").is_none());
    }
}
