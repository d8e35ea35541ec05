//! Study configuration management.
//!
//! The persisted configuration (`studies.yaml` at the run root) is
//! operator-authored ground truth: per study, an `execute` switch plus a
//! tri-state variable flag for every bound input. The manager synchronizes
//! the file with the declared study list and the resolved workflow interface
//! (adding null placeholders for anything new, dropping stale keys), reports
//! the resulting state, and refuses to proceed while any flag is null.

use std::fmt;
use std::fs;

use indexmap::IndexMap;
use tracing::{debug, info};

use procflow_types::{InputState, RunConfig, StudyConfig};

use crate::error::{EngineError, StudyIssue};
use crate::layout::Layout;
use crate::resolve::WorkflowInterface;

/// Loads `studies.yaml` (or starts empty), synchronizes it against the
/// declared studies and the workflow interface, and writes it back.
///
/// Flags the operator already set are preserved; new studies and newly
/// discovered inputs get null placeholders; entries for inputs no longer in
/// the interface are dropped. Studies present in the file but absent from
/// the declaration are kept untouched for the operator to clean up.
pub fn sync_run_config(layout: &Layout, studies: &[String], interface: &WorkflowInterface) -> Result<RunConfig, EngineError> {
    let file = layout.run_config_file();
    let mut config: RunConfig = if file.exists() {
        serde_yaml::from_str(&fs::read_to_string(&file)?).map_err(|source| EngineError::malformed(&file, source))?
    } else {
        RunConfig::default()
    };

    for study_name in studies {
        let study = config.studies.entry(study_name.clone()).or_insert_with(|| {
            info!(study = %study_name, "adding study to configuration");
            StudyConfig::default()
        });
        study.user_params = synced_flags(&study.user_params, &interface.user_params);
        study.user_paths = synced_flags(&study.user_paths, &interface.user_paths);
    }

    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&file, serde_yaml::to_string(&config)?)?;
    debug!(file = %file.display(), studies = config.studies.len(), "study configuration synchronized");
    Ok(config)
}

/// Rebuilds a flag map in interface order, preserving operator-set flags and
/// inserting null placeholders for newly discovered inputs.
fn synced_flags(existing: &IndexMap<String, Option<bool>>, names: &[String]) -> IndexMap<String, Option<bool>> {
    names
        .iter()
        .map(|name| (name.clone(), existing.get(name).copied().flatten()))
        .collect()
}

/// Per-study resolution report, printable for the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyStatus {
    /// Study name.
    pub study: String,
    /// Whether the study participates in execution.
    pub execute: bool,
    /// Parameter name -> resolution state.
    pub params: Vec<(String, InputState)>,
    /// User path name -> resolution state.
    pub paths: Vec<(String, InputState)>,
}

impl fmt::Display for StudyStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.execute { "execute" } else { "skip" };
        writeln!(formatter, "study '{}' [{marker}]", self.study)?;
        for (name, state) in &self.params {
            writeln!(formatter, "  param {name}: {state}")?;
        }
        for (name, state) in &self.paths {
            writeln!(formatter, "  path  {name}: {state}")?;
        }
        Ok(())
    }
}

/// Resolution state of every input, per declared study.
pub fn status_report(config: &RunConfig, studies: &[String]) -> Vec<StudyStatus> {
    studies
        .iter()
        .map(|study_name| {
            let study = config.studies.get(study_name).cloned().unwrap_or_default();
            StudyStatus {
                study: study_name.clone(),
                execute: study.execute,
                params: study
                    .user_params
                    .keys()
                    .map(|name| (name.clone(), study.param_state(name)))
                    .collect(),
                paths: study
                    .user_paths
                    .keys()
                    .map(|name| (name.clone(), study.path_state(name)))
                    .collect(),
            }
        })
        .collect()
}

/// Fails with [`EngineError::StudyNotConfigured`] while any declared,
/// executing study still carries a null flag. The error lists every
/// unresolved input, grouped per study, and names the file to edit.
pub fn require_configured(layout: &Layout, config: &RunConfig, studies: &[String]) -> Result<(), EngineError> {
    let mut issues = Vec::new();
    for study_name in studies {
        let Some(study) = config.studies.get(study_name) else {
            continue;
        };
        if !study.execute {
            continue;
        }
        let unresolved = study.unconfigured();
        if !unresolved.is_empty() {
            issues.push(StudyIssue {
                study: study_name.clone(),
                inputs: unresolved,
            });
        }
    }
    if issues.is_empty() {
        Ok(())
    } else {
        Err(EngineError::StudyNotConfigured {
            issues,
            file: layout.run_config_file(),
        })
    }
}
