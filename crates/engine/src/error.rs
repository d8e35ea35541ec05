//! Engine error taxonomy.
//!
//! Every halting condition names the exact artifact (file, slot, or study)
//! the operator must act on. Binding problems are accumulated across the
//! whole workflow and reported together, grouped by unit in declaration
//! order.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// A single unresolved or conflicting binding slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingIssue {
    /// Unit whose entry carries the problem.
    pub unit: String,
    /// Declared slot (parameter, input path, or output label).
    pub slot: String,
    /// What went wrong.
    pub kind: BindingIssueKind,
}

/// Classification of a binding problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingIssueKind {
    /// The entry places a unit the workflow never declares.
    UnknownUnit,
    /// A parameter slot has neither `hard_params` nor `user_params`.
    MissingParamSource,
    /// A parameter slot is bound by both `hard_params` and `user_params`.
    ConflictingParamSources,
    /// An input-path slot has neither `user_paths` nor `required_paths`.
    MissingPathSource,
    /// An input-path slot is bound by both `user_paths` and `required_paths`.
    ConflictingPathSources,
    /// An output label has no literal name in `output_paths`.
    MissingOutputName,
    /// A binding map names a slot the unit never declares.
    UnknownSlot {
        /// Which binding map carries the stray key.
        map: &'static str,
    },
    /// A `required_paths` reference targets an entry declared at or after
    /// the referencing entry.
    ForwardReference {
        /// Rendered `unit.output` target.
        target: String,
    },
    /// A `required_paths` reference names a unit with no earlier entry.
    UnknownUpstreamUnit {
        /// Rendered `unit.output` target.
        target: String,
    },
    /// A `required_paths` reference names an output label the upstream unit
    /// does not declare.
    UnknownUpstreamOutput {
        /// Rendered `unit.output` target.
        target: String,
    },
}

impl fmt::Display for BindingIssue {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            BindingIssueKind::UnknownUnit => {
                write!(formatter, "entry places undeclared unit '{}'", self.unit)
            }
            BindingIssueKind::MissingParamSource => write!(
                formatter,
                "parameter '{}' has no source (bind it via hard_params or user_params)",
                self.slot
            ),
            BindingIssueKind::ConflictingParamSources => write!(
                formatter,
                "parameter '{}' is bound by both hard_params and user_params",
                self.slot
            ),
            BindingIssueKind::MissingPathSource => write!(
                formatter,
                "input path '{}' has no source (bind it via user_paths or required_paths)",
                self.slot
            ),
            BindingIssueKind::ConflictingPathSources => write!(
                formatter,
                "input path '{}' is bound by both user_paths and required_paths",
                self.slot
            ),
            BindingIssueKind::MissingOutputName => {
                write!(formatter, "output '{}' has no literal name in output_paths", self.slot)
            }
            BindingIssueKind::UnknownSlot { map } => {
                write!(formatter, "{} names '{}', which the unit does not declare", map, self.slot)
            }
            BindingIssueKind::ForwardReference { target } => write!(
                formatter,
                "input path '{}' references '{}', which is not declared earlier in the workflow",
                self.slot, target
            ),
            BindingIssueKind::UnknownUpstreamUnit { target } => write!(
                formatter,
                "input path '{}' references '{}', but no entry places that unit",
                self.slot, target
            ),
            BindingIssueKind::UnknownUpstreamOutput { target } => write!(
                formatter,
                "input path '{}' references '{}', but the unit declares no such output",
                self.slot, target
            ),
        }
    }
}

/// One study's unresolved configuration entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyIssue {
    /// Study name.
    pub study: String,
    /// Inputs whose variable flag is still null.
    pub inputs: Vec<String>,
}

/// Errors raised by the orchestration engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A unit's routine invokes an operation outside its declared set.
    #[error(
        "structural violation in unit '{unit}': call '{call}' is not a declared operation (declared: {})",
        declared.join(", ")
    )]
    StructuralViolation {
        /// Offending unit.
        unit: String,
        /// The undeclared call.
        call: String,
        /// The unit's full declared operation list.
        declared: Vec<String>,
    },

    /// A contract declares the same name twice within one section.
    #[error("unit '{unit}' declares duplicate {section} '{name}'")]
    DuplicateDeclaration {
        /// Offending unit.
        unit: String,
        /// Section of the contract (`parameter`, `input path`, `output`).
        section: &'static str,
        /// The duplicated name.
        name: String,
    },

    /// One or more slots could not be resolved to exactly one source.
    #[error("{}", render_binding_issues(.0))]
    UnresolvedBinding(Vec<BindingIssue>),

    /// At least one study still has null variable flags.
    #[error("{}", render_study_issues(.issues, .file))]
    StudyNotConfigured {
        /// Per-study unresolved inputs, in declaration order.
        issues: Vec<StudyIssue>,
        /// The configuration file the operator must edit.
        file: PathBuf,
    },

    /// A fixed value, table cell, or input path is still unset.
    #[error(
        "inputs for study '{study}' are not set:\n{}",
        missing.iter().map(|entry| format!("  - {entry}")).collect::<Vec<_>>().join("\n")
    )]
    InputsNotSet {
        /// Study whose inputs are incomplete.
        study: String,
        /// Exact entries (and file locations) the operator must edit.
        missing: Vec<String>,
    },

    /// A unit ran but did not produce a declared output.
    #[error("unit '{unit}' failed for study '{study}' dataset '{dataset}': {reason}")]
    UnitExecutionFailure {
        /// Study of the failing instance.
        study: String,
        /// Dataset of the failing instance.
        dataset: String,
        /// Failing unit.
        unit: String,
        /// Missing output or operation error.
        reason: String,
    },

    /// A persisted document failed to parse.
    #[error("malformed document {}: {source}", file.display())]
    MalformedDocument {
        /// The file the operator must fix.
        file: PathBuf,
        /// Underlying parse error with line/column detail.
        source: serde_yaml::Error,
    },

    /// Filesystem failure while maintaining the run root.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Malformed persisted document (configuration, table, or records).
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl EngineError {
    /// Wraps a YAML parse failure with the file it came from.
    pub fn malformed(file: impl Into<PathBuf>, source: serde_yaml::Error) -> Self {
        EngineError::MalformedDocument { file: file.into(), source }
    }
}

fn render_binding_issues(issues: &[BindingIssue]) -> String {
    let mut lines = vec!["unresolved bindings:".to_string()];
    let mut current_unit: Option<&str> = None;
    for issue in issues {
        if current_unit != Some(issue.unit.as_str()) {
            lines.push(format!("  unit '{}':", issue.unit));
            current_unit = Some(issue.unit.as_str());
        }
        lines.push(format!("    - {issue}"));
    }
    lines.join("\n")
}

fn render_study_issues(issues: &[StudyIssue], file: &PathBuf) -> String {
    let mut lines = vec!["study configuration required:".to_string()];
    for issue in issues {
        lines.push(format!("  study '{}': {}", issue.study, issue.inputs.join(", ")));
    }
    lines.push(format!("edit {} and set each flag to true (variable) or false (fixed)", file.display()));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_issues_render_grouped_by_unit() {
        let error = EngineError::UnresolvedBinding(vec![
            BindingIssue {
                unit: "mesh".into(),
                slot: "cell_size".into(),
                kind: BindingIssueKind::MissingParamSource,
            },
            BindingIssue {
                unit: "mesh".into(),
                slot: "geometry".into(),
                kind: BindingIssueKind::ConflictingPathSources,
            },
            BindingIssue {
                unit: "solve".into(),
                slot: "grid".into(),
                kind: BindingIssueKind::ForwardReference {
                    target: "mesh.grid".into(),
                },
            },
        ]);

        let rendered = error.to_string();
        assert!(rendered.contains("unit 'mesh':"));
        assert!(rendered.contains("unit 'solve':"));
        assert!(rendered.contains("both user_paths and required_paths"));
        let mesh_position = rendered.find("unit 'mesh':").unwrap();
        let solve_position = rendered.find("unit 'solve':").unwrap();
        assert!(mesh_position < solve_position);
    }

    #[test]
    fn study_error_names_the_file_to_edit() {
        let error = EngineError::StudyNotConfigured {
            issues: vec![StudyIssue {
                study: "Baseline".into(),
                inputs: vec!["ramp_rate".into()],
            }],
            file: PathBuf::from("/run/studies.yaml"),
        };
        let rendered = error.to_string();
        assert!(rendered.contains("study 'Baseline': ramp_rate"));
        assert!(rendered.contains("/run/studies.yaml"));
    }

    #[test]
    fn malformed_document_names_the_file() {
        let source = serde_yaml::from_str::<i32>("[").unwrap_err();
        let error = EngineError::malformed(PathBuf::from("/run/studies.yaml"), source);
        assert!(error.to_string().contains("/run/studies.yaml"));
    }

    #[test]
    fn structural_violation_names_call_and_declared_set() {
        let error = EngineError::StructuralViolation {
            unit: "mesh".into(),
            call: "upload_results".into(),
            declared: vec!["load_geometry".into(), "tessellate".into()],
        };
        let rendered = error.to_string();
        assert!(rendered.contains("'upload_results'"));
        assert!(rendered.contains("load_geometry, tessellate"));
    }
}
