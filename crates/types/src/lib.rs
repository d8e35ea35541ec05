//! Shared type definitions for the procflow workspace.
//!
//! Three families live here:
//!
//! - [`workflow`]: the declared workflow document — unit contracts, ordered
//!   placements with their binding maps, and the study list.
//! - [`study`]: the persisted per-study configuration (fixed vs. variable
//!   flags, execute switch).
//! - [`record`]: disk-backed execution records that make reruns idempotent.
//!
//! Everything is plain data with serde derives; behavior lives in
//! `procflow-engine`.

pub mod record;
pub mod study;
pub mod workflow;

pub use record::{DatasetRecords, RecordStatus, UnitRecord};
pub use study::{InputState, RunConfig, StudyConfig};
pub use workflow::{ParamKind, ParamSpec, UnitContract, UpstreamRef, WorkflowDoc, WorkflowEntry};
