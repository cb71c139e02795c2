//! Error taxonomy.
//!
//! Wiring problems are collected as structured diagnostics (code + path +
//! message + optional hint) by the validation engine in
//! [`crate::pipeline::validation`] and surfaced together — the engine never
//! stops at the first finding. Compute-level infeasibility is *not* an
//! error: it is recorded locally at the stage and fed to the pruner.

use serde::Serialize;
use thiserror::Error;

/// Stable machine-readable code attached to each wiring diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Two stages write into (or read from) the same boundary.
    BoundaryConflict,
    /// A terminal boundary is read but nothing can ever feed it.
    DanglingBoundary,
    /// A serial container with no children.
    EmptyContainer,
    /// A connector without any group planner.
    MissingPlanner,
    /// A connector group the robot model does not define.
    UnknownGroup,
    /// A propagator whose direction cannot be inferred from its neighbors.
    AmbiguousDirection,
    /// A connector listing the same group twice.
    DuplicateGroup,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ErrorCode {
    /// User-facing name used in messages and serialized output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BoundaryConflict => "boundary_conflict",
            Self::DanglingBoundary => "dangling_boundary",
            Self::EmptyContainer => "empty_container",
            Self::MissingPlanner => "missing_planner",
            Self::UnknownGroup => "unknown_group",
            Self::AmbiguousDirection => "ambiguous_direction",
            Self::DuplicateGroup => "duplicate_group",
        }
    }
}

/// A single wiring problem found during `init()`.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{code} at {path}: {message}")]
pub struct WiringError {
    pub code: ErrorCode,
    /// Pointer into the stage tree, e.g. `/stages/2` or `/stages/3/0`.
    pub path: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl WiringError {
    pub fn new(code: ErrorCode, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            path: path.into(),
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Top-level error returned by [`crate::pipeline::Task`] entry points.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The pipeline has no stages at all.
    #[error("pipeline has no stages")]
    EmptyPipeline,

    /// One or more wiring problems; see the individual diagnostics.
    #[error("invalid pipeline wiring ({} problem(s))", .0.len())]
    Validation(Vec<WiringError>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wiring_error_display() {
        let err = WiringError::new(
            ErrorCode::MissingPlanner,
            "/stages/1",
            "connector has no group planners",
        )
        .with_hint("pass at least one (group, planner) pair");
        let text = err.to_string();
        assert!(text.contains("missing_planner"));
        assert!(text.contains("/stages/1"));
    }

    #[test]
    fn test_wiring_error_serializes_code_as_snake_case() {
        let err = WiringError::new(ErrorCode::BoundaryConflict, "/stages/0", "x");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "boundary_conflict");
        assert!(json.get("hint").is_none());
    }

    #[test]
    fn test_pipeline_error_counts_problems() {
        let err = PipelineError::Validation(vec![
            WiringError::new(ErrorCode::EmptyContainer, "/stages/2", "a"),
            WiringError::new(ErrorCode::UnknownGroup, "/stages/3", "b"),
        ]);
        assert!(err.to_string().contains("2 problem(s)"));
    }
}
