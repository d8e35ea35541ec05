//! Deterministic on-disk layout for a run root.
//!
//! Every study, dataset, and unit output location is a pure function of
//! (root, study, dataset, entry index, unit name, literal name). Upstream
//! path references resolve through these functions and never through
//! hand-maintained aliases, which is what keeps `required_paths` wiring
//! purely declarative.
//!
//! ```text
//! <root>/
//!   studies.yaml
//!   inputs/<study>/
//!     fixed_inputs.yaml
//!     datasets.yaml
//!     <fixed user paths>
//!     datasets/<dataset>/<variable user paths>
//!   output/<study>/<dataset>/
//!     records.yaml
//!     <NN_unit>/<declared outputs>
//! ```

use std::path::{Path, PathBuf};

/// Path derivation for one run root.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// Creates a layout rooted at `root`. Nothing is created on disk.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The run root itself.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persisted study configuration (`studies.yaml`).
    pub fn run_config_file(&self) -> PathBuf {
        self.root.join("studies.yaml")
    }

    /// Input tree for a study.
    pub fn study_inputs_dir(&self, study: &str) -> PathBuf {
        self.root.join("inputs").join(study)
    }

    /// Fixed-input record for a study.
    pub fn fixed_inputs_file(&self, study: &str) -> PathBuf {
        self.study_inputs_dir(study).join("fixed_inputs.yaml")
    }

    /// Variable-input table for a study.
    pub fn dataset_table_file(&self, study: &str) -> PathBuf {
        self.study_inputs_dir(study).join("datasets.yaml")
    }

    /// Dataset-scoped input subtree holding variable user paths.
    pub fn dataset_inputs_dir(&self, study: &str, dataset: &str) -> PathBuf {
        self.study_inputs_dir(study).join("datasets").join(dataset)
    }

    /// A fixed user path, stored verbatim under the study input tree.
    pub fn fixed_user_path(&self, study: &str, name: &str) -> PathBuf {
        self.study_inputs_dir(study).join(name)
    }

    /// A variable user path, nested under its dataset's input subtree.
    pub fn variable_user_path(&self, study: &str, dataset: &str, name: &str) -> PathBuf {
        self.dataset_inputs_dir(study, dataset).join(name)
    }

    /// Output tree for one (study, dataset) instance.
    pub fn dataset_output_dir(&self, study: &str, dataset: &str) -> PathBuf {
        self.root.join("output").join(study).join(dataset)
    }

    /// Execution records for one (study, dataset) instance.
    pub fn records_file(&self, study: &str, dataset: &str) -> PathBuf {
        self.dataset_output_dir(study, dataset).join("records.yaml")
    }

    /// Directory name of a unit placement: 1-based execution index, zero
    /// padded, prefixed to the unit name.
    pub fn unit_dir_name(index: usize, unit: &str) -> String {
        format!("{index:02}_{unit}")
    }

    /// Output directory of one unit placement within a dataset instance.
    pub fn unit_dir(&self, study: &str, dataset: &str, index: usize, unit: &str) -> PathBuf {
        self.dataset_output_dir(study, dataset).join(Self::unit_dir_name(index, unit))
    }

    /// Concrete location of a unit's declared output, by its literal name.
    pub fn unit_output(&self, study: &str, dataset: &str, index: usize, unit: &str, literal: &str) -> PathBuf {
        self.unit_dir(study, dataset, index, unit).join(literal)
    }
}
