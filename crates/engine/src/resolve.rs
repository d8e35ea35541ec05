//! Binding resolution.
//!
//! For each workflow entry, every declared parameter slot, input-path slot,
//! and output label is resolved to exactly one source:
//!
//! - parameters: `hard_params` (literal) or `user_params` (named reference
//!   into the workflow-level parameter pool)
//! - input paths: `user_paths` (literal name under the study input tree) or
//!   `required_paths` (an earlier entry's output)
//! - outputs: a literal name in `output_paths`
//!
//! Two sources for one slot, a missing source, a stray binding key, or an
//! upstream reference that is not strictly earlier in the sequence are all
//! assembly-time problems. They are accumulated across the whole workflow
//! and reported together; nothing executes until the full set resolves.

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tracing::debug;

use procflow_types::{UnitContract, WorkflowDoc, WorkflowEntry};

use crate::error::{BindingIssue, BindingIssueKind, EngineError};
use crate::layout::Layout;

/// Resolved source of one parameter slot.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamSource {
    /// Literal value fixed in the workflow declaration.
    Hard(JsonValue),
    /// Reference to a workflow-level parameter, valued per study/dataset.
    User(String),
}

/// Resolved target of a `required_paths` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    /// Unit name of the producing entry.
    pub unit: String,
    /// Output label on that unit.
    pub label: String,
    /// 1-based execution index of the producing entry.
    pub index: usize,
    /// Literal file/folder name the producing entry assigns to the label.
    pub literal: String,
}

/// Resolved source of one input-path slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSource {
    /// Operator-supplied file/folder under the study input tree.
    User(String),
    /// Output of an earlier entry, located through the workspace layout.
    Upstream(UpstreamTarget),
}

/// One entry with every slot bound to exactly one source.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEntry {
    /// 1-based execution position; also the unit directory prefix.
    pub index: usize,
    /// Unit name.
    pub unit: String,
    /// Parameter slot -> source, in contract declaration order.
    pub params: IndexMap<String, ParamSource>,
    /// Input-path slot -> source, in contract declaration order.
    pub input_paths: IndexMap<String, PathSource>,
    /// Output label -> literal name, in contract declaration order.
    pub outputs: IndexMap<String, String>,
}

/// The end-user-facing contract of the whole workflow: the union across all
/// units, deduplicated by name, in first-appearance order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkflowInterface {
    /// Workflow-level parameter names the operator must value.
    pub user_params: Vec<String>,
    /// User path names the operator must place under the study input tree.
    pub user_paths: Vec<String>,
    /// Literal output names the workflow produces.
    pub outputs: Vec<String>,
}

/// A fully resolved workflow, ready for study configuration and execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedWorkflow {
    /// Workflow identifier.
    pub name: String,
    /// Entries in execution order.
    pub entries: Vec<ResolvedEntry>,
    /// Deduplicated operator-facing interface.
    pub interface: WorkflowInterface,
}

/// Resolves every binding of every entry, or reports the complete list of
/// problems as [`EngineError::UnresolvedBinding`].
pub fn resolve_workflow(doc: &WorkflowDoc) -> Result<ResolvedWorkflow, EngineError> {
    let mut issues: Vec<BindingIssue> = Vec::new();
    let mut entries: Vec<ResolvedEntry> = Vec::new();

    for (position, entry) in doc.entries.iter().enumerate() {
        let index = position + 1;
        let Some(contract) = doc.units.get(&entry.unit) else {
            issues.push(BindingIssue {
                unit: entry.unit.clone(),
                slot: String::new(),
                kind: BindingIssueKind::UnknownUnit,
            });
            continue;
        };

        let params = resolve_params(entry, contract, &mut issues);
        let input_paths = resolve_input_paths(doc, entry, contract, index, &mut issues);
        let outputs = resolve_outputs(entry, contract, &mut issues);
        reject_stray_keys(entry, contract, &mut issues);

        entries.push(ResolvedEntry {
            index,
            unit: entry.unit.clone(),
            params,
            input_paths,
            outputs,
        });
    }

    if !issues.is_empty() {
        return Err(EngineError::UnresolvedBinding(issues));
    }

    let interface = build_interface(&entries);
    debug!(
        workflow = %doc.workflow,
        entries = entries.len(),
        user_params = interface.user_params.len(),
        user_paths = interface.user_paths.len(),
        "workflow bindings resolved"
    );

    Ok(ResolvedWorkflow {
        name: doc.workflow.clone(),
        entries,
        interface,
    })
}

fn resolve_params(entry: &WorkflowEntry, contract: &UnitContract, issues: &mut Vec<BindingIssue>) -> IndexMap<String, ParamSource> {
    let mut params = IndexMap::new();
    for spec in &contract.params {
        let hard = entry.hard_params.get(&spec.name);
        let user = entry.user_params.get(&spec.name);
        match (hard, user) {
            (Some(value), None) => {
                params.insert(spec.name.clone(), ParamSource::Hard(value.clone()));
            }
            (None, Some(pool_name)) => {
                params.insert(spec.name.clone(), ParamSource::User(pool_name.clone()));
            }
            (Some(_), Some(_)) => issues.push(BindingIssue {
                unit: entry.unit.clone(),
                slot: spec.name.clone(),
                kind: BindingIssueKind::ConflictingParamSources,
            }),
            (None, None) => issues.push(BindingIssue {
                unit: entry.unit.clone(),
                slot: spec.name.clone(),
                kind: BindingIssueKind::MissingParamSource,
            }),
        }
    }
    params
}

fn resolve_input_paths(
    doc: &WorkflowDoc,
    entry: &WorkflowEntry,
    contract: &UnitContract,
    index: usize,
    issues: &mut Vec<BindingIssue>,
) -> IndexMap<String, PathSource> {
    let mut input_paths = IndexMap::new();
    for slot in &contract.inputs {
        let user = entry.user_paths.get(slot);
        let required = entry.required_paths.get(slot);
        match (user, required) {
            (Some(literal), None) => {
                input_paths.insert(slot.clone(), PathSource::User(literal.clone()));
            }
            (None, Some(reference)) => {
                let target = format!("{}.{}", reference.unit, reference.output);
                match locate_upstream(doc, &reference.unit, &reference.output, index) {
                    UpstreamLookup::Found(upstream) => {
                        input_paths.insert(slot.clone(), PathSource::Upstream(upstream));
                    }
                    UpstreamLookup::Forward => issues.push(BindingIssue {
                        unit: entry.unit.clone(),
                        slot: slot.clone(),
                        kind: BindingIssueKind::ForwardReference { target },
                    }),
                    UpstreamLookup::NoSuchUnit => issues.push(BindingIssue {
                        unit: entry.unit.clone(),
                        slot: slot.clone(),
                        kind: BindingIssueKind::UnknownUpstreamUnit { target },
                    }),
                    UpstreamLookup::NoSuchOutput => issues.push(BindingIssue {
                        unit: entry.unit.clone(),
                        slot: slot.clone(),
                        kind: BindingIssueKind::UnknownUpstreamOutput { target },
                    }),
                }
            }
            (Some(_), Some(_)) => issues.push(BindingIssue {
                unit: entry.unit.clone(),
                slot: slot.clone(),
                kind: BindingIssueKind::ConflictingPathSources,
            }),
            (None, None) => issues.push(BindingIssue {
                unit: entry.unit.clone(),
                slot: slot.clone(),
                kind: BindingIssueKind::MissingPathSource,
            }),
        }
    }
    input_paths
}

fn resolve_outputs(entry: &WorkflowEntry, contract: &UnitContract, issues: &mut Vec<BindingIssue>) -> IndexMap<String, String> {
    let mut outputs = IndexMap::new();
    for label in &contract.outputs {
        match entry.output_paths.get(label) {
            Some(literal) => {
                outputs.insert(label.clone(), literal.clone());
            }
            None => issues.push(BindingIssue {
                unit: entry.unit.clone(),
                slot: label.clone(),
                kind: BindingIssueKind::MissingOutputName,
            }),
        }
    }
    outputs
}

enum UpstreamLookup {
    Found(UpstreamTarget),
    Forward,
    NoSuchUnit,
    NoSuchOutput,
}

/// Finds the producing entry for `unit.label`, requiring it to appear
/// strictly before execution position `before_index`.
fn locate_upstream(doc: &WorkflowDoc, unit: &str, label: &str, before_index: usize) -> UpstreamLookup {
    let mut found_later = false;
    for (position, candidate) in doc.entries.iter().enumerate() {
        if candidate.unit != unit {
            continue;
        }
        let candidate_index = position + 1;
        if candidate_index >= before_index {
            found_later = true;
            continue;
        }
        let declares_label = doc
            .units
            .get(unit)
            .map(|contract| contract.outputs.iter().any(|output| output == label))
            .unwrap_or(false);
        if !declares_label {
            return UpstreamLookup::NoSuchOutput;
        }
        let Some(literal) = candidate.output_paths.get(label) else {
            // The producing entry itself is missing the literal name; that is
            // reported against the producer, so treat the label as known here.
            return UpstreamLookup::NoSuchOutput;
        };
        return UpstreamLookup::Found(UpstreamTarget {
            unit: unit.to_string(),
            label: label.to_string(),
            index: candidate_index,
            literal: literal.clone(),
        });
    }
    if found_later {
        UpstreamLookup::Forward
    } else {
        UpstreamLookup::NoSuchUnit
    }
}

/// Binding keys must name declared slots; a stray key is a declaration error
/// caught at assembly time, not a silent no-op at run time.
fn reject_stray_keys(entry: &WorkflowEntry, contract: &UnitContract, issues: &mut Vec<BindingIssue>) {
    let declares_param = |name: &str| contract.params.iter().any(|spec| spec.name == name);
    let declares_input = |name: &str| contract.inputs.iter().any(|slot| slot == name);
    let declares_output = |name: &str| contract.outputs.iter().any(|label| label == name);

    let stray = |map: &'static str, name: &str| BindingIssue {
        unit: entry.unit.clone(),
        slot: name.to_string(),
        kind: BindingIssueKind::UnknownSlot { map },
    };

    issues.extend(entry.hard_params.keys().filter(|k| !declares_param(k)).map(|k| stray("hard_params", k)));
    issues.extend(entry.user_params.keys().filter(|k| !declares_param(k)).map(|k| stray("user_params", k)));
    issues.extend(entry.user_paths.keys().filter(|k| !declares_input(k)).map(|k| stray("user_paths", k)));
    issues.extend(
        entry
            .required_paths
            .keys()
            .filter(|k| !declares_input(k))
            .map(|k| stray("required_paths", k)),
    );
    issues.extend(
        entry
            .output_paths
            .keys()
            .filter(|k| !declares_output(k))
            .map(|k| stray("output_paths", k)),
    );
}

fn build_interface(entries: &[ResolvedEntry]) -> WorkflowInterface {
    let mut interface = WorkflowInterface::default();
    let mut push_unique = |list: &mut Vec<String>, name: &str| {
        if !list.iter().any(|existing| existing == name) {
            list.push(name.to_string());
        }
    };

    for entry in entries {
        for source in entry.params.values() {
            if let ParamSource::User(pool_name) = source {
                push_unique(&mut interface.user_params, pool_name);
            }
        }
        for source in entry.input_paths.values() {
            if let PathSource::User(literal) = source {
                push_unique(&mut interface.user_paths, literal);
            }
        }
        for literal in entry.outputs.values() {
            push_unique(&mut interface.outputs, literal);
        }
    }
    interface
}

impl ResolvedEntry {
    fn summary_rows(&self) -> Vec<(String, &'static str, String)> {
        let mut rows = Vec::new();
        for (slot, source) in &self.params {
            match source {
                ParamSource::Hard(value) => rows.push((slot.clone(), "hard", value.to_string())),
                ParamSource::User(pool_name) => rows.push((slot.clone(), "user", pool_name.clone())),
            }
        }
        for (slot, source) in &self.input_paths {
            match source {
                PathSource::User(literal) => rows.push((slot.clone(), "path", literal.clone())),
                PathSource::Upstream(target) => rows.push((
                    slot.clone(),
                    "required",
                    format!("{}.{} ({})", target.unit, target.label, target.literal),
                )),
            }
        }
        for (label, literal) in &self.outputs {
            rows.push((label.clone(), "output", literal.clone()));
        }
        rows
    }
}

impl fmt::Display for ResolvedWorkflow {
    /// Human-readable per-unit summary: slot name, originating source, and
    /// resolved value, followed by the deduplicated workflow interface.
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(formatter, "[{}] {}", Layout::unit_dir_name(entry.index, &entry.unit), entry.unit)?;
            let rows = entry.summary_rows();
            let slot_width = rows.iter().map(|(slot, _, _)| slot.len()).max().unwrap_or(0);
            for (slot, tag, value) in rows {
                writeln!(formatter, "  {slot:<slot_width$}  {tag:<8}  {value}")?;
            }
        }
        writeln!(formatter, "user parameters: {}", self.interface.user_params.join(", "))?;
        writeln!(formatter, "user paths:      {}", self.interface.user_paths.join(", "))?;
        writeln!(formatter, "outputs:         {}", self.interface.outputs.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procflow_types::{ParamSpec, UpstreamRef};
    use serde_json::json;

    fn mesh_contract() -> UnitContract {
        UnitContract {
            params: vec![ParamSpec {
                name: "cell_size".into(),
                kind: Default::default(),
            }],
            inputs: vec!["geometry".into()],
            outputs: vec!["grid".into()],
            operations: vec!["tessellate".into()],
            ..Default::default()
        }
    }

    fn solve_contract() -> UnitContract {
        UnitContract {
            params: vec![ParamSpec {
                name: "max_iter".into(),
                kind: Default::default(),
            }],
            inputs: vec!["grid".into()],
            outputs: vec!["field".into()],
            operations: vec!["iterate".into()],
            ..Default::default()
        }
    }

    fn mesh_entry() -> WorkflowEntry {
        let mut entry = WorkflowEntry::default();
        entry.unit = "mesh".into();
        entry.user_params.insert("cell_size".into(), "mesh_cell_size".into());
        entry.user_paths.insert("geometry".into(), "part.step".into());
        entry.output_paths.insert("grid".into(), "grid.vtk".into());
        entry
    }

    fn solve_entry() -> WorkflowEntry {
        let mut entry = WorkflowEntry::default();
        entry.unit = "solve".into();
        entry.hard_params.insert("max_iter".into(), json!(200));
        entry.required_paths.insert(
            "grid".into(),
            UpstreamRef {
                unit: "mesh".into(),
                output: "grid".into(),
            },
        );
        entry.output_paths.insert("field".into(), "temperature.vtk".into());
        entry
    }

    fn two_unit_doc() -> WorkflowDoc {
        let mut doc = WorkflowDoc::default();
        doc.workflow = "thermal".into();
        doc.units.insert("mesh".into(), mesh_contract());
        doc.units.insert("solve".into(), solve_contract());
        doc.entries = vec![mesh_entry(), solve_entry()];
        doc
    }

    #[test]
    fn full_coverage_resolves_every_slot_once() {
        let resolved = resolve_workflow(&two_unit_doc()).expect("resolve");
        assert_eq!(resolved.entries.len(), 2);

        let mesh = &resolved.entries[0];
        assert_eq!(mesh.index, 1);
        assert_eq!(mesh.params["cell_size"], ParamSource::User("mesh_cell_size".into()));
        assert_eq!(mesh.input_paths["geometry"], PathSource::User("part.step".into()));
        assert_eq!(mesh.outputs["grid"], "grid.vtk");

        let solve = &resolved.entries[1];
        assert_eq!(solve.params["max_iter"], ParamSource::Hard(json!(200)));
        match &solve.input_paths["grid"] {
            PathSource::Upstream(target) => {
                assert_eq!(target.unit, "mesh");
                assert_eq!(target.index, 1);
                assert_eq!(target.literal, "grid.vtk");
            }
            other => panic!("expected upstream source, got {other:?}"),
        }

        // Each slot appears exactly once in the summary.
        let total_slots: usize = resolved.entries.iter().map(|entry| entry.summary_rows().len()).sum();
        assert_eq!(total_slots, 6);
    }

    #[test]
    fn interface_unions_and_deduplicates() {
        let mut doc = two_unit_doc();
        // A second solve stage reusing the same pool parameter name.
        let mut extra = solve_entry();
        extra.hard_params.clear();
        extra.user_params.insert("max_iter".into(), "mesh_cell_size".into());
        extra.required_paths.insert(
            "grid".into(),
            UpstreamRef {
                unit: "mesh".into(),
                output: "grid".into(),
            },
        );
        extra.output_paths.insert("field".into(), "refined.vtk".into());
        doc.entries.push(extra);

        let resolved = resolve_workflow(&doc).expect("resolve");
        assert_eq!(resolved.interface.user_params, vec!["mesh_cell_size"]);
        assert_eq!(resolved.interface.user_paths, vec!["part.step"]);
        assert_eq!(resolved.interface.outputs, vec!["grid.vtk", "temperature.vtk", "refined.vtk"]);
    }

    #[test]
    fn dual_sources_fail_naming_both() {
        let mut doc = two_unit_doc();
        doc.entries[0].required_paths.insert(
            "geometry".into(),
            UpstreamRef {
                unit: "mesh".into(),
                output: "grid".into(),
            },
        );
        let error = resolve_workflow(&doc).expect_err("should conflict");
        let rendered = error.to_string();
        assert!(rendered.contains("geometry"));
        assert!(rendered.contains("both user_paths and required_paths"));
    }

    #[test]
    fn conflicting_param_sources_fail() {
        let mut doc = two_unit_doc();
        doc.entries[0].hard_params.insert("cell_size".into(), json!(0.5));
        let error = resolve_workflow(&doc).expect_err("should conflict");
        assert!(error.to_string().contains("both hard_params and user_params"));
    }

    #[test]
    fn missing_sources_are_listed_across_all_units() {
        let mut doc = two_unit_doc();
        doc.entries[0].user_params.clear();
        doc.entries[1].output_paths.clear();
        let error = resolve_workflow(&doc).expect_err("should report both");
        let rendered = error.to_string();
        assert!(rendered.contains("unit 'mesh':"));
        assert!(rendered.contains("parameter 'cell_size' has no source"));
        assert!(rendered.contains("unit 'solve':"));
        assert!(rendered.contains("output 'field' has no literal name"));
    }

    #[test]
    fn forward_reference_fails_at_assembly() {
        let mut doc = two_unit_doc();
        doc.entries.swap(0, 1);
        let error = resolve_workflow(&doc).expect_err("forward reference");
        assert!(error.to_string().contains("not declared earlier in the workflow"));
    }

    #[test]
    fn unknown_upstream_output_fails() {
        let mut doc = two_unit_doc();
        doc.entries[1].required_paths.insert(
            "grid".into(),
            UpstreamRef {
                unit: "mesh".into(),
                output: "surface".into(),
            },
        );
        let error = resolve_workflow(&doc).expect_err("unknown output label");
        assert!(error.to_string().contains("mesh.surface"));
    }

    #[test]
    fn stray_binding_key_fails_at_assembly() {
        let mut doc = two_unit_doc();
        doc.entries[0].user_params.insert("cellsize".into(), "typo_pool".into());
        let error = resolve_workflow(&doc).expect_err("stray key");
        assert!(error.to_string().contains("user_params names 'cellsize'"));
    }

    #[test]
    fn summary_display_tags_each_source() {
        let resolved = resolve_workflow(&two_unit_doc()).expect("resolve");
        let rendered = resolved.to_string();
        assert!(rendered.contains("[01_mesh]"));
        assert!(rendered.contains("hard"));
        assert!(rendered.contains("required"));
        assert!(rendered.contains("user parameters: mesh_cell_size"));
    }
}
