//! Dataset expansion.
//!
//! For a configured study, the fixed-input record (`fixed_inputs.yaml`) holds
//! one value per fixed parameter and the variable-input table
//! (`datasets.yaml`) holds one row per dataset ID, one column per variable
//! parameter. Variable user paths are not table cells: a path is "set" once
//! its dataset-scoped location exists on disk. Expansion merges each row
//! with the study's fixed values into concrete [`Dataset`] instances; a
//! study with nothing variable expands to a single implicit dataset.
//!
//! Missing records are scaffolded with null placeholders so the error can
//! point at the exact file and entry the operator must edit.

use std::fs;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tracing::debug;

use procflow_types::StudyConfig;

use crate::error::EngineError;
use crate::layout::Layout;

/// Dataset ID used when a study has no variable inputs.
pub const IMPLICIT_DATASET_ID: &str = "single";

/// One concrete combination of input values within a study: the union of the
/// study's fixed values and one table row's variable values.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Operator-chosen identifier (verbatim table key), or
    /// [`IMPLICIT_DATASET_ID`].
    pub id: String,
    /// Parameter name -> concrete value, fixed and variable merged.
    pub params: IndexMap<String, JsonValue>,
    /// User path name -> concrete on-disk location, fixed and variable merged.
    pub paths: IndexMap<String, PathBuf>,
}

type FixedRecord = IndexMap<String, JsonValue>;
type VariableTable = IndexMap<String, IndexMap<String, JsonValue>>;

/// Expands one configured study into datasets, or fails with
/// [`EngineError::InputsNotSet`] naming every unset entry and its file.
///
/// Assumes the study passed `require_configured`: every flag is decided, so
/// inputs partition cleanly into fixed and variable.
pub fn expand_study(layout: &Layout, study_name: &str, study: &StudyConfig) -> Result<Vec<Dataset>, EngineError> {
    let fixed_params: Vec<&String> = study.user_params.iter().filter(|(_, f)| **f != Some(true)).map(|(n, _)| n).collect();
    let variable_params: Vec<&String> = study.user_params.iter().filter(|(_, f)| **f == Some(true)).map(|(n, _)| n).collect();
    let fixed_paths: Vec<&String> = study.user_paths.iter().filter(|(_, f)| **f != Some(true)).map(|(n, _)| n).collect();
    let variable_paths: Vec<&String> = study.user_paths.iter().filter(|(_, f)| **f == Some(true)).map(|(n, _)| n).collect();

    fs::create_dir_all(layout.study_inputs_dir(study_name))?;
    let mut missing: Vec<String> = Vec::new();

    let fixed_values = load_fixed_record(layout, study_name, &fixed_params, &mut missing)?;

    let has_variable = !variable_params.is_empty() || !variable_paths.is_empty();
    let table = if has_variable {
        Some(load_variable_table(layout, study_name, &variable_params, &mut missing)?)
    } else {
        None
    };

    let fixed_locations = check_fixed_paths(layout, study_name, &fixed_paths, &mut missing);
    if let Some(table) = &table {
        check_variable_paths(layout, study_name, table, &variable_paths, &mut missing)?;
    }

    if !missing.is_empty() {
        return Err(EngineError::InputsNotSet {
            study: study_name.to_string(),
            missing,
        });
    }

    let datasets = match table {
        None => vec![Dataset {
            id: IMPLICIT_DATASET_ID.to_string(),
            params: fixed_values,
            paths: fixed_locations,
        }],
        Some(table) => table
            .into_iter()
            .map(|(dataset_id, row)| {
                let mut params = fixed_values.clone();
                for name in &variable_params {
                    if let Some(value) = row.get(*name) {
                        params.insert((*name).clone(), value.clone());
                    }
                }
                let mut paths = fixed_locations.clone();
                for name in &variable_paths {
                    paths.insert((*name).clone(), layout.variable_user_path(study_name, &dataset_id, name));
                }
                Dataset {
                    id: dataset_id,
                    params,
                    paths,
                }
            })
            .collect(),
    };

    debug!(study = %study_name, datasets = datasets.len(), "study expanded");
    Ok(datasets)
}

/// Loads the fixed-input record, scaffolding null placeholders for missing
/// parameters and collecting every still-null entry.
fn load_fixed_record(
    layout: &Layout,
    study_name: &str,
    fixed_params: &[&String],
    missing: &mut Vec<String>,
) -> Result<FixedRecord, EngineError> {
    let file = layout.fixed_inputs_file(study_name);
    let mut record: FixedRecord = if file.exists() {
        serde_yaml::from_str(&fs::read_to_string(&file)?).map_err(|source| EngineError::malformed(&file, source))?
    } else {
        FixedRecord::new()
    };

    let mut changed = !file.exists() && !fixed_params.is_empty();
    for name in fixed_params {
        if !record.contains_key(*name) {
            record.insert((*name).clone(), JsonValue::Null);
            changed = true;
        }
    }
    if changed {
        fs::write(&file, serde_yaml::to_string(&record)?)?;
    }

    let mut values = FixedRecord::new();
    for name in fixed_params {
        match record.get(*name) {
            Some(JsonValue::Null) | None => missing.push(format!("parameter '{}' is unset in {}", name, file.display())),
            Some(value) => {
                values.insert((*name).clone(), value.clone());
            }
        }
    }
    Ok(values)
}

/// Loads the variable-input table, scaffolding null cells for missing
/// columns and collecting every empty row/column coordinate.
fn load_variable_table(
    layout: &Layout,
    study_name: &str,
    variable_params: &[&String],
    missing: &mut Vec<String>,
) -> Result<VariableTable, EngineError> {
    let file = layout.dataset_table_file(study_name);
    let mut table: VariableTable = if file.exists() {
        serde_yaml::from_str(&fs::read_to_string(&file)?).map_err(|source| EngineError::malformed(&file, source))?
    } else {
        VariableTable::new()
    };

    if table.is_empty() {
        if !file.exists() {
            fs::write(&file, serde_yaml::to_string(&table)?)?;
        }
        missing.push(format!("dataset table {} is empty; add one row per dataset", file.display()));
        return Ok(table);
    }

    let mut changed = false;
    for (dataset_id, row) in table.iter_mut() {
        for name in variable_params {
            match row.get(*name) {
                Some(JsonValue::Null) | None => {
                    if !row.contains_key(*name) {
                        row.insert((*name).clone(), JsonValue::Null);
                        changed = true;
                    }
                    missing.push(format!("row '{}' column '{}' is unset in {}", dataset_id, name, file.display()));
                }
                Some(_) => {}
            }
        }
    }
    if changed {
        fs::write(&file, serde_yaml::to_string(&table)?)?;
    }
    Ok(table)
}

fn check_fixed_paths(
    layout: &Layout,
    study_name: &str,
    fixed_paths: &[&String],
    missing: &mut Vec<String>,
) -> IndexMap<String, PathBuf> {
    let mut locations = IndexMap::new();
    for name in fixed_paths {
        let location = layout.fixed_user_path(study_name, name);
        if location.exists() {
            locations.insert((*name).clone(), location);
        } else {
            missing.push(format!("expected path {} does not exist", location.display()));
        }
    }
    locations
}

/// A variable path is set once its dataset-scoped location exists. The
/// per-dataset directories are created so the operator sees exactly where to
/// place each file.
fn check_variable_paths(
    layout: &Layout,
    study_name: &str,
    table: &VariableTable,
    variable_paths: &[&String],
    missing: &mut Vec<String>,
) -> Result<(), EngineError> {
    for dataset_id in table.keys() {
        if !variable_paths.is_empty() {
            fs::create_dir_all(layout.dataset_inputs_dir(study_name, dataset_id))?;
        }
        for name in variable_paths {
            let location = layout.variable_user_path(study_name, dataset_id, name);
            if !location.exists() {
                missing.push(format!("expected path {} does not exist", location.display()));
            }
        }
    }
    Ok(())
}
