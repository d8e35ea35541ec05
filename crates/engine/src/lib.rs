//! Parametric study orchestration engine.
//!
//! The engine takes a workflow document (unit contracts plus ordered
//! placements), validates each unit's declared structure, resolves every
//! binding slot to exactly one source, and then drives study-by-study,
//! dataset-by-dataset sequential execution over a deterministic on-disk
//! workspace. Each stage halts with an error naming the exact artifact the
//! operator must fix before anything executes.

use std::path::Path;

use anyhow::Context;

use procflow_types::WorkflowDoc;

pub mod dataset;
pub mod error;
pub mod interpolate;
pub mod layout;
pub mod resolve;
pub mod runner;
pub mod scheduler;
pub mod study;
pub mod validate;

pub use dataset::{Dataset, IMPLICIT_DATASET_ID, expand_study};
pub use error::{BindingIssue, BindingIssueKind, EngineError, StudyIssue};
pub use layout::Layout;
pub use resolve::{ResolvedWorkflow, WorkflowInterface, resolve_workflow};
pub use runner::{NoopRunner, OperationRunner, ShellRunner, UnitExecution};
pub use scheduler::{RunReport, Scheduler, UnitOutcome};
pub use study::{require_configured, status_report, sync_run_config};
pub use validate::validate_structure;

/// Parses a workflow document from a YAML file.
pub fn parse_workflow_file(path: &Path) -> anyhow::Result<WorkflowDoc> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading workflow file {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing workflow file {}", path.display()))
}

/// Validates structure and resolves every binding in one pass.
pub fn assemble(doc: &WorkflowDoc) -> Result<ResolvedWorkflow, EngineError> {
    validate_structure(doc)?;
    resolve_workflow(doc)
}
