//! Sequential execution scheduler.
//!
//! Executes the resolved workflow for every executing study and every
//! dataset within it, one unit at a time in entry order. Per (study,
//! dataset, unit) triple the scheduler consults the persisted records: a
//! unit whose record says completed and whose declared outputs are all still
//! on disk is skipped without touching anything; everything else reruns
//! fully. A failing unit blocks the remaining units of its own dataset only;
//! other datasets and studies proceed.

use std::fs;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use procflow_types::{DatasetRecords, RecordStatus, RunConfig, UnitContract, WorkflowDoc};

use crate::dataset::{Dataset, expand_study};
use crate::error::EngineError;
use crate::layout::Layout;
use crate::resolve::{ParamSource, PathSource, ResolvedEntry, ResolvedWorkflow};
use crate::runner::{OperationRunner, UnitExecution};

/// Drives unit execution over a run root.
pub struct Scheduler<'a> {
    layout: Layout,
    runner: &'a dyn OperationRunner,
}

/// What happened to one (study, dataset, unit) triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Record said completed and every output was still present; skipped.
    AlreadyCompleted,
    /// Ran this time and every declared output was verified present.
    Completed,
    /// Ran and failed; the reason names the operation error or missing output.
    Failed(String),
    /// Not attempted because an earlier unit of the same dataset failed.
    Blocked(String),
}

impl UnitOutcome {
    fn describe(&self) -> String {
        match self {
            UnitOutcome::AlreadyCompleted => "already completed".to_string(),
            UnitOutcome::Completed => "completed".to_string(),
            UnitOutcome::Failed(reason) => format!("failed ({reason})"),
            UnitOutcome::Blocked(reason) => format!("blocked ({reason})"),
        }
    }
}

/// Report line for one executed (or skipped) triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripleReport {
    /// Study of the instance.
    pub study: String,
    /// Dataset of the instance.
    pub dataset: String,
    /// Numbered unit directory name, for example `01_mesh`.
    pub unit_dir: String,
    /// Outcome of this triple.
    pub outcome: UnitOutcome,
}

/// Full run summary, one line per triple in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunReport {
    /// Per-triple outcomes.
    pub triples: Vec<TripleReport>,
}

impl RunReport {
    /// Whether any triple failed outright.
    pub fn any_failed(&self) -> bool {
        self.triples.iter().any(|triple| matches!(triple.outcome, UnitOutcome::Failed(_)))
    }

    /// The first failure as an [`EngineError`], if any triple failed.
    pub fn failure(&self) -> Option<EngineError> {
        self.triples.iter().find_map(|triple| match &triple.outcome {
            UnitOutcome::Failed(reason) => Some(EngineError::UnitExecutionFailure {
                study: triple.study.clone(),
                dataset: triple.dataset.clone(),
                unit: triple.unit_dir.clone(),
                reason: reason.clone(),
            }),
            _ => None,
        })
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for triple in &self.triples {
            writeln!(
                formatter,
                "{}/{} {}: {}",
                triple.study,
                triple.dataset,
                triple.unit_dir,
                triple.outcome.describe()
            )?;
        }
        Ok(())
    }
}

impl<'a> Scheduler<'a> {
    /// Creates a scheduler over `layout` delegating operations to `runner`.
    pub fn new(layout: Layout, runner: &'a dyn OperationRunner) -> Self {
        Self { layout, runner }
    }

    /// Runs every executing study of the configuration.
    ///
    /// All studies are expanded before anything executes, so scaffolds and
    /// input complaints for every study land in one pass; the first
    /// expansion error is returned after the others are logged.
    pub fn run(&self, doc: &WorkflowDoc, resolved: &ResolvedWorkflow, config: &RunConfig) -> Result<RunReport, EngineError> {
        let mut expansions: Vec<(&str, Vec<Dataset>)> = Vec::new();
        let mut first_error: Option<EngineError> = None;
        for study_name in &doc.studies {
            let Some(study) = config.studies.get(study_name) else {
                warn!(study = %study_name, "study has no configuration entry; skipping");
                continue;
            };
            if !study.execute {
                debug!(study = %study_name, "study marked skip");
                continue;
            }
            match expand_study(&self.layout, study_name, study) {
                Ok(datasets) => expansions.push((study_name.as_str(), datasets)),
                Err(error) => {
                    warn!(study = %study_name, %error, "study expansion failed");
                    first_error.get_or_insert(error);
                }
            }
        }
        if let Some(error) = first_error {
            return Err(error);
        }

        let mut report = RunReport::default();
        for (study_name, datasets) in &expansions {
            for dataset in datasets {
                self.run_dataset(doc, resolved, study_name, dataset, &mut report)?;
            }
        }
        Ok(report)
    }

    fn run_dataset(
        &self,
        doc: &WorkflowDoc,
        resolved: &ResolvedWorkflow,
        study_name: &str,
        dataset: &Dataset,
        report: &mut RunReport,
    ) -> Result<(), EngineError> {
        let records_file = self.layout.records_file(study_name, &dataset.id);
        let mut records: DatasetRecords = if records_file.exists() {
            serde_yaml::from_str(&fs::read_to_string(&records_file)?)
                .map_err(|source| EngineError::malformed(&records_file, source))?
        } else {
            DatasetRecords::default()
        };

        let mut blocked: Option<String> = None;
        for entry in &resolved.entries {
            let unit_dir = Layout::unit_dir_name(entry.index, &entry.unit);
            if let Some(reason) = &blocked {
                report.triples.push(TripleReport {
                    study: study_name.to_string(),
                    dataset: dataset.id.clone(),
                    unit_dir,
                    outcome: UnitOutcome::Blocked(reason.clone()),
                });
                continue;
            }

            // Resolution already checked every entry against a declared unit.
            let Some(contract) = doc.units.get(&entry.unit) else {
                continue;
            };

            let outputs: IndexMap<String, PathBuf> = entry
                .outputs
                .iter()
                .map(|(label, literal)| {
                    (
                        label.clone(),
                        self.layout.unit_output(study_name, &dataset.id, entry.index, &entry.unit, literal),
                    )
                })
                .collect();

            let recorded = records.units.get(&unit_dir).map(|record| record.status);
            if recorded == Some(RecordStatus::Completed) && outputs.values().all(|location| location.exists()) {
                debug!(study = %study_name, dataset = %dataset.id, unit = %unit_dir, "outputs present; skipping");
                report.triples.push(TripleReport {
                    study: study_name.to_string(),
                    dataset: dataset.id.clone(),
                    unit_dir,
                    outcome: UnitOutcome::AlreadyCompleted,
                });
                continue;
            }

            fs::create_dir_all(self.layout.unit_dir(study_name, &dataset.id, entry.index, &entry.unit))?;
            records.units.entry(unit_dir.clone()).or_default().begin();
            write_records(&records_file, &records)?;

            info!(study = %study_name, dataset = %dataset.id, unit = %unit_dir, "executing unit");
            let outcome = match self.execute_unit(study_name, dataset, entry, contract, outputs) {
                Ok(()) => {
                    if let Some(record) = records.units.get_mut(&unit_dir) {
                        record.complete();
                    }
                    UnitOutcome::Completed
                }
                Err(reason) => {
                    warn!(study = %study_name, dataset = %dataset.id, unit = %unit_dir, reason, "unit failed");
                    if let Some(record) = records.units.get_mut(&unit_dir) {
                        record.fail(reason.clone());
                    }
                    blocked = Some(format!("{unit_dir} failed"));
                    UnitOutcome::Failed(reason)
                }
            };
            write_records(&records_file, &records)?;

            report.triples.push(TripleReport {
                study: study_name.to_string(),
                dataset: dataset.id.clone(),
                unit_dir,
                outcome,
            });
        }
        Ok(())
    }

    /// Runs the contract's call sequence and verifies every declared output
    /// landed on disk.
    fn execute_unit(
        &self,
        study_name: &str,
        dataset: &Dataset,
        entry: &ResolvedEntry,
        contract: &UnitContract,
        outputs: IndexMap<String, PathBuf>,
    ) -> Result<(), String> {
        let execution = self.materialize(study_name, dataset, entry, contract, outputs)?;
        for operation in contract.call_sequence() {
            self.runner
                .run(&entry.unit, operation, &execution)
                .map_err(|error| format!("operation '{operation}' failed: {error:#}"))?;
        }
        for (label, location) in &execution.outputs {
            if !location.exists() {
                return Err(format!("output '{label}' missing at {}", location.display()));
            }
        }
        Ok(())
    }

    /// Values every parameter and makes every path concrete for one triple.
    fn materialize(
        &self,
        study_name: &str,
        dataset: &Dataset,
        entry: &ResolvedEntry,
        contract: &UnitContract,
        outputs: IndexMap<String, PathBuf>,
    ) -> Result<UnitExecution, String> {
        let mut params: IndexMap<String, JsonValue> = IndexMap::new();
        for (slot, source) in &entry.params {
            let value = match source {
                ParamSource::Hard(value) => value.clone(),
                ParamSource::User(pool_name) => dataset
                    .params
                    .get(pool_name)
                    .cloned()
                    .ok_or_else(|| format!("parameter '{pool_name}' has no value for this dataset"))?,
            };
            params.insert(slot.clone(), value);
        }

        let mut inputs: IndexMap<String, PathBuf> = IndexMap::new();
        for (slot, source) in &entry.input_paths {
            let location = match source {
                PathSource::User(literal) => dataset
                    .paths
                    .get(literal)
                    .cloned()
                    .ok_or_else(|| format!("user path '{literal}' has no location for this dataset"))?,
                PathSource::Upstream(target) => {
                    self.layout
                        .unit_output(study_name, &dataset.id, target.index, &target.unit, &target.literal)
                }
            };
            inputs.insert(slot.clone(), location);
        }

        Ok(UnitExecution {
            study: study_name.to_string(),
            dataset: dataset.id.clone(),
            unit: entry.unit.clone(),
            params,
            inputs,
            outputs,
            commands: contract.commands.clone(),
        })
    }
}

fn write_records(file: &std::path::Path, records: &DatasetRecords) -> Result<(), EngineError> {
    fs::write(file, serde_yaml::to_string(records)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::IMPLICIT_DATASET_ID;
    use crate::resolve::resolve_workflow;
    use crate::runner::NoopRunner;
    use procflow_types::{ParamSpec, StudyConfig, UpstreamRef, WorkflowEntry};
    use serde_json::json;

    fn pipeline_doc() -> WorkflowDoc {
        let mut doc = WorkflowDoc::default();
        doc.workflow = "thermal".into();

        let mut mesh = UnitContract::default();
        mesh.params = vec![ParamSpec {
            name: "cell_size".into(),
            kind: Default::default(),
        }];
        mesh.inputs = vec!["geometry".into()];
        mesh.outputs = vec!["grid".into()];
        mesh.operations = vec!["tessellate".into()];
        doc.units.insert("mesh".into(), mesh);

        let mut solve = UnitContract::default();
        solve.params = vec![ParamSpec {
            name: "max_iter".into(),
            kind: Default::default(),
        }];
        solve.inputs = vec!["grid".into()];
        solve.outputs = vec!["field".into()];
        solve.operations = vec!["iterate".into()];
        doc.units.insert("solve".into(), solve);

        let mut mesh_entry = WorkflowEntry::default();
        mesh_entry.unit = "mesh".into();
        mesh_entry.user_params.insert("cell_size".into(), "mesh_cell_size".into());
        mesh_entry.user_paths.insert("geometry".into(), "part.step".into());
        mesh_entry.output_paths.insert("grid".into(), "grid.vtk".into());

        let mut solve_entry = WorkflowEntry::default();
        solve_entry.unit = "solve".into();
        solve_entry.hard_params.insert("max_iter".into(), json!(200));
        solve_entry.required_paths.insert(
            "grid".into(),
            UpstreamRef {
                unit: "mesh".into(),
                output: "grid".into(),
            },
        );
        solve_entry.output_paths.insert("field".into(), "temperature.vtk".into());

        doc.entries = vec![mesh_entry, solve_entry];
        doc.studies = vec!["Baseline".into()];
        doc
    }

    fn fixed_config() -> RunConfig {
        let mut study = StudyConfig::default();
        study.user_params.insert("mesh_cell_size".into(), Some(false));
        study.user_paths.insert("part.step".into(), Some(false));
        let mut config = RunConfig::default();
        config.studies.insert("Baseline".into(), study);
        config
    }

    fn seed_inputs(layout: &Layout) {
        fs::create_dir_all(layout.study_inputs_dir("Baseline")).unwrap();
        fs::write(layout.fixed_inputs_file("Baseline"), "mesh_cell_size: 0.5\n").unwrap();
        fs::write(layout.fixed_user_path("Baseline", "part.step"), "solid part\n").unwrap();
    }

    /// Noop for every unit except one, which fails its operations.
    struct FailUnit(&'static str);

    impl OperationRunner for FailUnit {
        fn run(&self, unit: &str, operation: &str, execution: &UnitExecution) -> anyhow::Result<()> {
            if unit == self.0 {
                anyhow::bail!("simulated operation failure");
            }
            NoopRunner.run(unit, operation, execution)
        }
    }

    #[test]
    fn pipeline_runs_end_to_end_with_upstream_wiring() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(temp_dir.path());
        let doc = pipeline_doc();
        let resolved = resolve_workflow(&doc).expect("resolve");
        seed_inputs(&layout);

        let scheduler = Scheduler::new(layout.clone(), &NoopRunner);
        let report = scheduler.run(&doc, &resolved, &fixed_config()).expect("run");

        assert!(!report.any_failed());
        assert_eq!(report.triples.len(), 2);
        assert!(report.triples.iter().all(|triple| triple.outcome == UnitOutcome::Completed));
        assert!(layout.unit_output("Baseline", IMPLICIT_DATASET_ID, 1, "mesh", "grid.vtk").exists());
        assert!(layout.unit_output("Baseline", IMPLICIT_DATASET_ID, 2, "solve", "temperature.vtk").exists());

        let records: DatasetRecords =
            serde_yaml::from_str(&fs::read_to_string(layout.records_file("Baseline", IMPLICIT_DATASET_ID)).unwrap()).unwrap();
        assert_eq!(records.units["01_mesh"].status, RecordStatus::Completed);
        assert_eq!(records.units["02_solve"].status, RecordStatus::Completed);
    }

    #[test]
    fn second_run_skips_completed_units_without_writes() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(temp_dir.path());
        let doc = pipeline_doc();
        let resolved = resolve_workflow(&doc).expect("resolve");
        seed_inputs(&layout);

        let scheduler = Scheduler::new(layout.clone(), &NoopRunner);
        scheduler.run(&doc, &resolved, &fixed_config()).expect("first run");

        let records_file = layout.records_file("Baseline", IMPLICIT_DATASET_ID);
        let grid = layout.unit_output("Baseline", IMPLICIT_DATASET_ID, 1, "mesh", "grid.vtk");
        let records_before = fs::read_to_string(&records_file).unwrap();
        let grid_before = fs::read_to_string(&grid).unwrap();
        let records_mtime = fs::metadata(&records_file).unwrap().modified().unwrap();
        let grid_mtime = fs::metadata(&grid).unwrap().modified().unwrap();

        let report = scheduler.run(&doc, &resolved, &fixed_config()).expect("second run");

        assert!(
            report
                .triples
                .iter()
                .all(|triple| triple.outcome == UnitOutcome::AlreadyCompleted)
        );
        assert_eq!(fs::read_to_string(&records_file).unwrap(), records_before);
        assert_eq!(fs::read_to_string(&grid).unwrap(), grid_before);
        assert_eq!(fs::metadata(&records_file).unwrap().modified().unwrap(), records_mtime);
        assert_eq!(fs::metadata(&grid).unwrap().modified().unwrap(), grid_mtime);
    }

    #[test]
    fn malformed_records_name_the_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(temp_dir.path());
        let doc = pipeline_doc();
        let resolved = resolve_workflow(&doc).expect("resolve");
        seed_inputs(&layout);

        let records_file = layout.records_file("Baseline", IMPLICIT_DATASET_ID);
        fs::create_dir_all(records_file.parent().unwrap()).unwrap();
        fs::write(&records_file, "units: [broken\n").unwrap();

        let scheduler = Scheduler::new(layout.clone(), &NoopRunner);
        let error = scheduler.run(&doc, &resolved, &fixed_config()).expect_err("parse failure");
        assert!(error.to_string().contains("records.yaml"));
    }

    #[test]
    fn missing_output_forces_a_full_rerun_of_that_unit() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(temp_dir.path());
        let doc = pipeline_doc();
        let resolved = resolve_workflow(&doc).expect("resolve");
        seed_inputs(&layout);

        let scheduler = Scheduler::new(layout.clone(), &NoopRunner);
        scheduler.run(&doc, &resolved, &fixed_config()).expect("first run");
        fs::remove_file(layout.unit_output("Baseline", IMPLICIT_DATASET_ID, 1, "mesh", "grid.vtk")).unwrap();

        let report = scheduler.run(&doc, &resolved, &fixed_config()).expect("second run");
        assert_eq!(report.triples[0].outcome, UnitOutcome::Completed);
        assert_eq!(report.triples[1].outcome, UnitOutcome::AlreadyCompleted);
        assert!(layout.unit_output("Baseline", IMPLICIT_DATASET_ID, 1, "mesh", "grid.vtk").exists());
    }

    #[test]
    fn skipped_study_touches_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(temp_dir.path());
        let doc = pipeline_doc();
        let resolved = resolve_workflow(&doc).expect("resolve");

        let mut config = fixed_config();
        config.studies.get_mut("Baseline").unwrap().execute = false;

        let scheduler = Scheduler::new(layout.clone(), &NoopRunner);
        let report = scheduler.run(&doc, &resolved, &config).expect("run");

        assert!(report.triples.is_empty());
        assert!(!temp_dir.path().join("output").exists());
    }

    #[test]
    fn failure_blocks_downstream_units_of_the_dataset() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(temp_dir.path());
        let doc = pipeline_doc();
        let resolved = resolve_workflow(&doc).expect("resolve");
        seed_inputs(&layout);

        let runner = FailUnit("mesh");
        let scheduler = Scheduler::new(layout.clone(), &runner);
        let report = scheduler.run(&doc, &resolved, &fixed_config()).expect("run");

        assert!(report.any_failed());
        assert!(matches!(report.triples[0].outcome, UnitOutcome::Failed(_)));
        assert!(matches!(report.triples[1].outcome, UnitOutcome::Blocked(_)));
        assert!(report.failure().is_some());

        let records: DatasetRecords =
            serde_yaml::from_str(&fs::read_to_string(layout.records_file("Baseline", IMPLICIT_DATASET_ID)).unwrap()).unwrap();
        assert_eq!(records.units["01_mesh"].status, RecordStatus::Failed);
        assert!(!records.units.contains_key("02_solve"));
    }
}
