//! Strongly typed workflow schema definitions shared across the engine and CLI.
//!
//! A workflow document declares the processing-unit contracts available to a
//! pipeline, the ordered placements (`entries`) that form the pipeline, and
//! the list of studies the pipeline runs under. Authoring order is preserved
//! everywhere (via `IndexMap`) because entry order determines execution order
//! and which upstream outputs later entries may reference.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Semantic type of a declared unit parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// Free-form string value.
    #[default]
    String,
    /// Numeric value (integer or float).
    Number,
    /// Boolean flag.
    Boolean,
    /// Arbitrary structured JSON.
    Json,
}

/// Declaration of a single unit parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParamSpec {
    /// Parameter name, unique within the owning contract.
    pub name: String,
    /// Semantic type used for documentation and future validation.
    #[serde(default)]
    pub kind: ParamKind,
}

/// Declared contract of a processing unit.
///
/// The engine treats a unit as opaque: a set of named parameters, named
/// input-path slots, named output labels, and the internal operations its
/// top-level routine is permitted to invoke. The `sequence` field records the
/// routine's actual call order as supplied by the unit author; the structural
/// validator checks it against `operations`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UnitContract {
    /// Ordered parameter declarations.
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    /// Ordered input-path slot names.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Ordered output labels. Each entry placing this unit maps every label
    /// to a literal file or folder name.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Internal operations this unit may invoke, in declaration order.
    #[serde(default)]
    pub operations: Vec<String>,
    /// Recorded call sequence of the unit's top-level routine. When empty the
    /// declared operation order is taken as the routine.
    #[serde(default)]
    pub sequence: Vec<String>,
    /// Optional shell command template per operation, consumed by the shell
    /// runner. Operations without a template are skipped by that runner.
    #[serde(default)]
    pub commands: IndexMap<String, String>,
}

impl UnitContract {
    /// The call sequence the unit's routine will execute.
    pub fn call_sequence(&self) -> &[String] {
        if self.sequence.is_empty() {
            &self.operations
        } else {
            &self.sequence
        }
    }
}

/// Reference to an output produced by an earlier entry in the workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpstreamRef {
    /// Unit name of the referenced entry.
    pub unit: String,
    /// Output label declared by that unit.
    pub output: String,
}

/// One unit's placement in a workflow, with its binding maps.
///
/// Each declared parameter slot must be bound by exactly one of `hard_params`
/// (literal) or `user_params` (named reference into the workflow-level
/// parameter pool); each input-path slot by exactly one of `user_paths`
/// (literal name under the study input tree) or `required_paths` (an earlier
/// entry's output); and each output label must appear in `output_paths`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WorkflowEntry {
    /// Name of the unit contract this entry places.
    pub unit: String,
    /// Literal parameter values keyed by parameter name.
    #[serde(default)]
    pub hard_params: IndexMap<String, JsonValue>,
    /// Parameter slot -> workflow-level parameter name.
    #[serde(default)]
    pub user_params: IndexMap<String, String>,
    /// Input-path slot -> literal file/folder name supplied by the operator.
    #[serde(default)]
    pub user_paths: IndexMap<String, String>,
    /// Input-path slot -> reference to an earlier entry's output.
    #[serde(default)]
    pub required_paths: IndexMap<String, UpstreamRef>,
    /// Output label -> literal file/folder name produced by the unit.
    #[serde(default)]
    pub output_paths: IndexMap<String, String>,
}

/// Complete workflow document: contracts, placements, and study list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WorkflowDoc {
    /// Workflow identifier used in reporting.
    #[serde(default)]
    pub workflow: String,
    /// Unit contracts keyed by unit name, preserving author order.
    #[serde(default)]
    pub units: IndexMap<String, UnitContract>,
    /// Ordered unit placements forming the pipeline.
    #[serde(default)]
    pub entries: Vec<WorkflowEntry>,
    /// Ordered study names this workflow executes under.
    #[serde(default)]
    pub studies: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_basic_workflow() {
        let yaml_text = r#"
workflow: thermal_sweep
units:
  mesh:
    params:
      - name: cell_size
        kind: number
    inputs: [geometry]
    outputs: [grid]
    operations: [load_geometry, tessellate, write_grid]
entries:
  - unit: mesh
    user_params:
      cell_size: mesh_cell_size
    user_paths:
      geometry: part.step
    output_paths:
      grid: grid.vtk
studies: [Baseline]
"#;

        let doc: WorkflowDoc = serde_yaml::from_str(yaml_text).expect("deserialize workflow");

        assert_eq!(doc.workflow, "thermal_sweep");
        assert!(doc.units.contains_key("mesh"));
        assert_eq!(doc.entries.len(), 1);
        assert_eq!(doc.entries[0].unit, "mesh");
        assert_eq!(doc.entries[0].user_params["cell_size"], "mesh_cell_size");
        assert_eq!(doc.studies, vec!["Baseline"]);
    }

    #[test]
    fn call_sequence_defaults_to_operation_order() {
        let mut contract = UnitContract::default();
        contract.operations = vec!["a".into(), "b".into()];
        assert_eq!(contract.call_sequence(), ["a", "b"]);

        contract.sequence = vec!["b".into(), "a".into(), "b".into()];
        assert_eq!(contract.call_sequence(), ["b", "a", "b"]);
    }

    #[test]
    fn repository_sample_workflow_parses() {
        let yaml_text = include_str!("../../../workflows/thermal_sweep.yaml");
        let doc: WorkflowDoc = serde_yaml::from_str(yaml_text).expect("parse sample workflow");
        assert_eq!(doc.workflow, "thermal_sweep");
        assert_eq!(doc.entries.len(), 2);
        assert_eq!(doc.studies.len(), 2);
    }
}
