//! Execution records persisted alongside each (study, dataset) output tree.
//!
//! A record tracks one unit's completion state for one dataset instance. A
//! unit is only skipped on a later run when its record says `Completed` and
//! every declared output is still present on disk; any other combination
//! (including partial outputs left by an interrupted run) reruns the unit
//! fully.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Completion state of one (study, dataset, unit) triple.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Created but not yet started.
    #[default]
    Pending,
    /// Unit is currently executing (or was interrupted mid-run).
    Running,
    /// Every declared output was produced and verified present.
    Completed,
    /// The unit ran but at least one declared output is missing.
    Failed,
}

/// Persisted record for a single unit execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UnitRecord {
    /// Current lifecycle status.
    #[serde(default)]
    pub status: RecordStatus,
    /// When the unit last started executing.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the unit last finished (completed or failed).
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure detail, naming the missing output or the operation error.
    #[serde(default)]
    pub error: Option<String>,
}

impl UnitRecord {
    /// Starts (or restarts) the record.
    pub fn begin(&mut self) {
        self.status = RecordStatus::Running;
        self.started_at = Some(Utc::now());
        self.finished_at = None;
        self.error = None;
    }

    /// Marks the record completed.
    pub fn complete(&mut self) {
        self.status = RecordStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.error = None;
    }

    /// Marks the record failed with a reason.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = RecordStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(reason.into());
    }
}

/// All unit records for one (study, dataset) instance, keyed by the unit's
/// numbered output directory name (for example `01_mesh`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DatasetRecords {
    /// Record per executed unit, in execution order.
    #[serde(default)]
    pub units: IndexMap<String, UnitRecord>,
}
