//! Validation engine for pipeline wiring.
//!
//! The engine runs all registered [`ValidationRule`]s against the assembled
//! stage tree and collects every diagnostic into a [`ValidationReport`] — it
//! never short-circuits on the first error, so users see all problems at
//! once. It runs inside `Task::init()`, before any interface is allocated.

use serde::Serialize;

use crate::error::{ErrorCode, WiringError};
use crate::stage::{PropagationDirection, SerialContainer, Stage, StageKind};
use crate::types::RobotModel;

// ─── Severity ───────────────────────────────────────────────────────────────

/// Whether a diagnostic is a hard error or a soft warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

// ─── Diagnostic ─────────────────────────────────────────────────────────────

/// A single validation finding.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationDiagnostic {
    pub severity: Severity,
    #[serde(flatten)]
    pub error: WiringError,
}

impl ValidationDiagnostic {
    pub fn error(err: WiringError) -> Self {
        Self {
            severity: Severity::Error,
            error: err,
        }
    }

    pub fn warning(err: WiringError) -> Self {
        Self {
            severity: Severity::Warning,
            error: err,
        }
    }
}

// ─── Report ─────────────────────────────────────────────────────────────────

/// Collected diagnostics from running all validation rules.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub diagnostics: Vec<ValidationDiagnostic>,
}

impl ValidationReport {
    pub fn errors(&self) -> impl Iterator<Item = &WiringError> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| &d.error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &WiringError> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .map(|d| &d.error)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn is_valid(&self) -> bool {
        !self.has_errors()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

// ─── Layout view ────────────────────────────────────────────────────────────

/// Flattened view of the stage tree, in serial order, that rules inspect.
pub struct WiringLayout<'a> {
    pub model: &'a RobotModel,
    /// Leaf stages with their tree paths rendered as `/stages/i[/j…]`.
    pub leaves: Vec<(String, &'a Stage)>,
    /// Containers (path, reference), the root excluded.
    pub containers: Vec<(String, &'a SerialContainer)>,
}

impl<'a> WiringLayout<'a> {
    pub fn build(root: &'a SerialContainer, model: &'a RobotModel) -> Self {
        let mut layout = Self {
            model,
            leaves: Vec::new(),
            containers: Vec::new(),
        };
        collect(root, "/stages", &mut layout);
        layout
    }
}

fn collect<'a>(container: &'a SerialContainer, prefix: &str, layout: &mut WiringLayout<'a>) {
    for (i, child) in container.children().iter().enumerate() {
        let path = format!("{prefix}/{i}");
        match &child.kind {
            StageKind::Container(inner) => {
                layout.containers.push((path.clone(), inner));
                collect(inner, &path, layout);
            }
            _ => layout.leaves.push((path, child)),
        }
    }
}

/// A leaf's role at one of its boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Write,
    Read,
    /// An unrestricted either-way propagator adapts to its neighbors.
    Flex,
}

fn left_role(stage: &Stage) -> Role {
    match &stage.kind {
        StageKind::Generator(_) => Role::Write,
        StageKind::Connector(_) => Role::Read,
        StageKind::Propagator(p) => match p.direction() {
            PropagationDirection::Forward => Role::Read,
            PropagationDirection::Backward => Role::Write,
            PropagationDirection::EitherWay => Role::Flex,
        },
        StageKind::Container(_) => Role::Flex,
    }
}

fn right_role(stage: &Stage) -> Role {
    match &stage.kind {
        StageKind::Generator(_) => Role::Write,
        StageKind::Connector(_) => Role::Read,
        StageKind::Propagator(p) => match p.direction() {
            PropagationDirection::Forward => Role::Write,
            PropagationDirection::Backward => Role::Read,
            PropagationDirection::EitherWay => Role::Flex,
        },
        StageKind::Container(_) => Role::Flex,
    }
}

// ─── Rule trait ─────────────────────────────────────────────────────────────

/// A single validation rule inspecting the layout.
pub trait ValidationRule {
    /// Short, stable identifier for this rule (e.g. `"boundary_roles"`).
    fn name(&self) -> &str;

    fn validate(&self, layout: &WiringLayout<'_>) -> Vec<ValidationDiagnostic>;
}

// ─── Engine ─────────────────────────────────────────────────────────────────

/// Runs a set of [`ValidationRule`]s and collects all diagnostics.
pub struct ValidationEngine {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl ValidationEngine {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_defaults() -> Self {
        let mut engine = Self::new();
        engine.add_rule(Box::new(BoundaryRolesRule));
        engine.add_rule(Box::new(EmptyContainerRule));
        engine.add_rule(Box::new(ConnectorPlannersRule));
        engine.add_rule(Box::new(GroupExistsRule));
        engine
    }

    pub fn add_rule(&mut self, rule: Box<dyn ValidationRule>) {
        self.rules.push(rule);
    }

    pub fn validate(&self, layout: &WiringLayout<'_>) -> ValidationReport {
        let mut report = ValidationReport::default();
        for rule in &self.rules {
            report.diagnostics.extend(rule.validate(layout));
        }
        report
    }
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Concrete rules
// ═══════════════════════════════════════════════════════════════════════════

// ─── 1. every boundary needs one writer and one reader ──────────────────────

struct BoundaryRolesRule;

impl ValidationRule for BoundaryRolesRule {
    fn name(&self) -> &str {
        "boundary_roles"
    }

    fn validate(&self, layout: &WiringLayout<'_>) -> Vec<ValidationDiagnostic> {
        let mut out = Vec::new();
        let leaves = &layout.leaves;

        for window in leaves.windows(2) {
            let (left_path, left) = (&window[0].0, window[0].1);
            let (right_path, right) = (&window[1].0, window[1].1);
            match (right_role(left), left_role(right)) {
                (Role::Write, Role::Write) => out.push(ValidationDiagnostic::error(
                    WiringError::new(
                        ErrorCode::BoundaryConflict,
                        right_path.clone(),
                        format!(
                            "`{}` and `{}` both write the boundary between them; nothing consumes it",
                            left.name(),
                            right.name()
                        ),
                    )
                    .with_hint("insert a consuming stage (connector or propagator) between them"),
                )),
                (Role::Read, Role::Read) => out.push(ValidationDiagnostic::error(
                    WiringError::new(
                        ErrorCode::BoundaryConflict,
                        right_path.clone(),
                        format!(
                            "`{}` and `{}` both read the boundary between them; nothing feeds it",
                            left.name(),
                            right.name()
                        ),
                    )
                    .with_hint("insert a generator or propagator feeding this boundary"),
                )),
                (Role::Flex, Role::Flex) => out.push(ValidationDiagnostic::error(
                    WiringError::new(
                        ErrorCode::AmbiguousDirection,
                        left_path.clone(),
                        format!(
                            "direction of `{}` and `{}` cannot be inferred from each other",
                            left.name(),
                            right.name()
                        ),
                    )
                    .with_hint("restrict at least one propagator to forward or backward"),
                )),
                _ => {}
            }
        }

        if let Some((path, first)) = leaves.first() {
            if left_role(first) == Role::Read {
                out.push(ValidationDiagnostic::error(
                    WiringError::new(
                        ErrorCode::DanglingBoundary,
                        path.clone(),
                        format!(
                            "`{}` reads the pipeline start boundary, which nothing can feed",
                            first.name()
                        ),
                    )
                    .with_hint("start the pipeline with a generator or backward propagator"),
                ));
            }
        }
        if let Some((path, last)) = leaves.last() {
            if right_role(last) == Role::Read {
                out.push(ValidationDiagnostic::error(
                    WiringError::new(
                        ErrorCode::DanglingBoundary,
                        path.clone(),
                        format!(
                            "`{}` reads the pipeline end boundary, which nothing can feed",
                            last.name()
                        ),
                    )
                    .with_hint("end the pipeline with a generator or forward propagator"),
                ));
            }
        }
        out
    }
}

// ─── 2. containers must not be empty ────────────────────────────────────────

struct EmptyContainerRule;

impl ValidationRule for EmptyContainerRule {
    fn name(&self) -> &str {
        "empty_container"
    }

    fn validate(&self, layout: &WiringLayout<'_>) -> Vec<ValidationDiagnostic> {
        layout
            .containers
            .iter()
            .filter(|(_, c)| c.is_empty())
            .map(|(path, _)| {
                ValidationDiagnostic::error(WiringError::new(
                    ErrorCode::EmptyContainer,
                    path.clone(),
                    "serial container has no children",
                ))
            })
            .collect()
    }
}

// ─── 3. connectors need planners, without duplicate groups ──────────────────

struct ConnectorPlannersRule;

impl ValidationRule for ConnectorPlannersRule {
    fn name(&self) -> &str {
        "connector_planners"
    }

    fn validate(&self, layout: &WiringLayout<'_>) -> Vec<ValidationDiagnostic> {
        let mut out = Vec::new();
        for (path, stage) in &layout.leaves {
            let StageKind::Connector(conn) = &stage.kind else {
                continue;
            };
            if conn.planners.is_empty() {
                out.push(ValidationDiagnostic::error(
                    WiringError::new(
                        ErrorCode::MissingPlanner,
                        path.clone(),
                        format!("connector `{}` has no group planners", stage.name()),
                    )
                    .with_hint("pass at least one (group, planner) pair"),
                ));
            }
            for (i, (group, _)) in conn.planners.iter().enumerate() {
                if conn.planners[..i].iter().any(|(g, _)| g == group) {
                    out.push(ValidationDiagnostic::warning(WiringError::new(
                        ErrorCode::DuplicateGroup,
                        path.clone(),
                        format!(
                            "connector `{}` lists group `{}` more than once",
                            stage.name(),
                            group
                        ),
                    )));
                }
            }
        }
        out
    }
}

// ─── 4. connector groups must exist in the robot model ──────────────────────

struct GroupExistsRule;

impl ValidationRule for GroupExistsRule {
    fn name(&self) -> &str {
        "group_exists"
    }

    fn validate(&self, layout: &WiringLayout<'_>) -> Vec<ValidationDiagnostic> {
        let mut out = Vec::new();
        for (path, stage) in &layout.leaves {
            let StageKind::Connector(conn) = &stage.kind else {
                continue;
            };
            for (group, _) in &conn.planners {
                if !layout.model.has_group(group) {
                    out.push(ValidationDiagnostic::error(
                        WiringError::new(
                            ErrorCode::UnknownGroup,
                            path.clone(),
                            format!(
                                "connector `{}` plans for group `{}`, which the robot model does not define",
                                stage.name(),
                                group
                            ),
                        )
                        .with_hint("declare the group on the robot model or drop the planner"),
                    ));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solvers::JointInterpolation;
    use crate::stage::{FixedCandidates, FixedExtensions, GroupPlannerVec, PropagationDirection};
    use std::sync::Arc;

    fn planners() -> GroupPlannerVec {
        vec![("group".to_string(), Arc::new(JointInterpolation::new()) as _)]
    }

    fn model() -> RobotModel {
        RobotModel::new("m").with_group("group", &["j1"])
    }

    fn validate(root: &SerialContainer, model: &RobotModel) -> ValidationReport {
        let layout = WiringLayout::build(root, model);
        ValidationEngine::with_defaults().validate(&layout)
    }

    #[test]
    fn test_valid_pipeline_passes() {
        let model = model();
        let mut root = SerialContainer::new();
        root.add(Stage::generator("GEN1", FixedCandidates::new([0.0])));
        root.add(Stage::connector("CON1", planners()));
        root.add(Stage::generator("GEN2", FixedCandidates::new([0.0])));
        let report = validate(&root, &model);
        assert!(report.is_valid(), "{:?}", report);
        assert!(report.is_empty());
    }

    #[test]
    fn test_adjacent_generators_conflict() {
        let model = model();
        let mut root = SerialContainer::new();
        root.add(Stage::generator("GEN1", FixedCandidates::new([0.0])));
        root.add(Stage::generator("GEN2", FixedCandidates::new([0.0])));
        let report = validate(&root, &model);
        assert!(report.has_errors());
        let err = report.errors().next().unwrap();
        assert_eq!(err.code, ErrorCode::BoundaryConflict);
        assert_eq!(err.path, "/stages/1");
    }

    #[test]
    fn test_connector_beside_forward_propagator_conflict() {
        let model = model();
        let mut root = SerialContainer::new();
        root.add(Stage::generator("GEN1", FixedCandidates::new([0.0])));
        root.add(Stage::connector("CON1", planners()));
        root.add(Stage::propagator(
            "FW1",
            PropagationDirection::Forward,
            FixedExtensions::new([0.0]),
        ));
        // CON1 reads its right boundary, FW1 reads its left: nothing feeds it.
        let report = validate(&root, &model);
        assert!(report
            .errors()
            .any(|e| e.code == ErrorCode::BoundaryConflict && e.path == "/stages/2"));
    }

    #[test]
    fn test_terminal_reader_is_dangling() {
        let model = model();
        let mut root = SerialContainer::new();
        root.add(Stage::propagator(
            "FW1",
            PropagationDirection::Forward,
            FixedExtensions::new([0.0]),
        ));
        root.add(Stage::generator("GEN1", FixedCandidates::new([0.0])));
        let report = validate(&root, &model);
        assert!(report
            .errors()
            .any(|e| e.code == ErrorCode::DanglingBoundary && e.path == "/stages/0"));
    }

    #[test]
    fn test_empty_container_reported() {
        let model = model();
        let mut root = SerialContainer::new();
        root.add(Stage::generator("GEN1", FixedCandidates::new([0.0])));
        root.add(Stage::container("SC", SerialContainer::new()));
        let report = validate(&root, &model);
        assert!(report
            .errors()
            .any(|e| e.code == ErrorCode::EmptyContainer && e.path == "/stages/1"));
    }

    #[test]
    fn test_connector_without_planners() {
        let model = model();
        let mut root = SerialContainer::new();
        root.add(Stage::generator("GEN1", FixedCandidates::new([0.0])));
        root.add(Stage::connector("CON1", Vec::new()));
        root.add(Stage::generator("GEN2", FixedCandidates::new([0.0])));
        let report = validate(&root, &model);
        assert!(report.errors().any(|e| e.code == ErrorCode::MissingPlanner));
    }

    #[test]
    fn test_unknown_group_reported() {
        let model = RobotModel::new("m"); // defines no groups
        let mut root = SerialContainer::new();
        root.add(Stage::generator("GEN1", FixedCandidates::new([0.0])));
        root.add(Stage::connector("CON1", planners()));
        root.add(Stage::generator("GEN2", FixedCandidates::new([0.0])));
        let report = validate(&root, &model);
        assert!(report.errors().any(|e| e.code == ErrorCode::UnknownGroup));
    }

    #[test]
    fn test_duplicate_group_is_a_warning() {
        let model = model();
        let planner = Arc::new(JointInterpolation::new());
        let mut root = SerialContainer::new();
        root.add(Stage::generator("GEN1", FixedCandidates::new([0.0])));
        root.add(Stage::connector(
            "CON1",
            vec![
                ("group".to_string(), planner.clone() as _),
                ("group".to_string(), planner as _),
            ],
        ));
        root.add(Stage::generator("GEN2", FixedCandidates::new([0.0])));
        let report = validate(&root, &model);
        assert!(report.is_valid());
        assert!(report.warnings().any(|w| w.code == ErrorCode::DuplicateGroup));
    }

    #[test]
    fn test_report_serializes() {
        let model = model();
        let mut root = SerialContainer::new();
        root.add(Stage::generator("GEN1", FixedCandidates::new([0.0])));
        root.add(Stage::generator("GEN2", FixedCandidates::new([0.0])));
        let report = validate(&root, &model);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["diagnostics"][0]["severity"], "error");
        assert_eq!(json["diagnostics"][0]["code"], "boundary_conflict");
    }
}
