//! Operation runners.
//!
//! The engine treats a unit's operations as opaque: the scheduler walks the
//! contract's call sequence and hands each operation to an
//! [`OperationRunner`]. Implementations decide what an operation actually
//! does — the shell runner executes the contract's command template, the noop
//! runner just materializes the declared outputs for previews and tests.

use std::path::PathBuf;
use std::process::Command;

use anyhow::{Result, bail};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::interpolate::interpolate;

/// Fully materialized execution context for one (study, dataset, unit)
/// triple: every parameter valued, every path concrete.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitExecution {
    /// Study this instance belongs to.
    pub study: String,
    /// Dataset identifier within the study.
    pub dataset: String,
    /// Unit name.
    pub unit: String,
    /// Resolved parameter values.
    pub params: IndexMap<String, JsonValue>,
    /// Concrete input path per declared slot.
    pub inputs: IndexMap<String, PathBuf>,
    /// Concrete output location per declared label.
    pub outputs: IndexMap<String, PathBuf>,
    /// Operation name -> shell command template, copied from the contract.
    pub commands: IndexMap<String, String>,
}

/// Executes one declared operation of one unit instance.
pub trait OperationRunner {
    /// Runs `operation` of `unit` against the materialized `execution`.
    fn run(&self, unit: &str, operation: &str, execution: &UnitExecution) -> Result<()>;
}

/// Runner that performs no work beyond touching the declared outputs, so the
/// scheduler's completion verification has something to find. Used for
/// previews and tests.
pub struct NoopRunner;

impl OperationRunner for NoopRunner {
    fn run(&self, unit: &str, operation: &str, execution: &UnitExecution) -> Result<()> {
        debug!(unit, operation, "noop runner touching declared outputs");
        for (label, location) in &execution.outputs {
            if let Some(parent) = location.parent() {
                std::fs::create_dir_all(parent)?;
            }
            if !location.exists() {
                std::fs::write(location, format!("{label}\n"))?;
            }
        }
        Ok(())
    }
}

/// Runner that executes each operation's command template through `sh -c`,
/// after interpolating `${{ ... }}` expressions against the execution
/// context. Operations without a template are skipped.
pub struct ShellRunner;

impl OperationRunner for ShellRunner {
    fn run(&self, unit: &str, operation: &str, execution: &UnitExecution) -> Result<()> {
        let Some(template) = execution.commands.get(operation) else {
            warn!(unit, operation, "operation has no command template; skipping");
            return Ok(());
        };

        let command_line = interpolate(template, execution);
        debug!(unit, operation, command = %command_line, "shell runner executing operation");

        let status = Command::new("sh").arg("-c").arg(&command_line).status()?;
        if !status.success() {
            bail!("operation '{operation}' of unit '{unit}' exited with {status}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn execution_in(dir: &std::path::Path) -> UnitExecution {
        let mut execution = UnitExecution {
            study: "Baseline".into(),
            dataset: "single".into(),
            unit: "mesh".into(),
            params: IndexMap::new(),
            inputs: IndexMap::new(),
            outputs: IndexMap::new(),
            commands: IndexMap::new(),
        };
        execution.params.insert("cell_size".into(), json!(0.5));
        execution.outputs.insert("grid".into(), dir.join("01_mesh/grid.vtk"));
        execution
    }

    #[test]
    fn noop_runner_materializes_outputs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let execution = execution_in(temp_dir.path());

        NoopRunner.run("mesh", "tessellate", &execution).expect("noop run");
        assert!(temp_dir.path().join("01_mesh/grid.vtk").exists());
    }

    #[test]
    fn shell_runner_interpolates_and_executes() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut execution = execution_in(temp_dir.path());
        std::fs::create_dir_all(temp_dir.path().join("01_mesh")).unwrap();
        execution
            .commands
            .insert("tessellate".into(), "printf '%s' 'cell=${{ params.cell_size }}' > '${{ outputs.grid }}'".into());

        ShellRunner.run("mesh", "tessellate", &execution).expect("shell run");
        let written = std::fs::read_to_string(temp_dir.path().join("01_mesh/grid.vtk")).unwrap();
        assert_eq!(written, "cell=0.5");
    }

    #[test]
    fn shell_runner_fails_on_nonzero_exit() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut execution = execution_in(temp_dir.path());
        execution.commands.insert("tessellate".into(), "exit 3".into());

        let error = ShellRunner.run("mesh", "tessellate", &execution).expect_err("should fail");
        assert!(error.to_string().contains("'tessellate'"));
    }

    #[test]
    fn shell_runner_skips_operations_without_template() {
        let temp_dir = tempfile::tempdir().unwrap();
        let execution = execution_in(temp_dir.path());
        ShellRunner.run("mesh", "untemplated", &execution).expect("skip is ok");
    }
}
