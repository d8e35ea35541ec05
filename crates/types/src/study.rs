//! Persisted study configuration.
//!
//! A study partitions a workflow run: per study, the operator decides which
//! bound inputs are fixed (one value for the whole study) and which are
//! variable (swept across the dataset table). The record is operator-authored
//! ground truth — the engine scaffolds placeholders but never infers a flag.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tri-state resolution of a single bound input within a study.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    /// Swept across the study's dataset table.
    Variable,
    /// One value shared by every dataset of the study.
    Fixed,
    /// Flag is still null; the operator has not decided yet.
    NotConfigured,
}

impl InputState {
    fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => InputState::Variable,
            Some(false) => InputState::Fixed,
            None => InputState::NotConfigured,
        }
    }
}

impl fmt::Display for InputState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputState::Variable => formatter.write_str("variable"),
            InputState::Fixed => formatter.write_str("fixed"),
            InputState::NotConfigured => formatter.write_str("not configured"),
        }
    }
}

fn default_execute() -> bool {
    true
}

/// Per-study configuration record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudyConfig {
    /// When false the study is skipped entirely downstream.
    #[serde(default = "default_execute")]
    pub execute: bool,
    /// Bound parameter name -> variable flag (`true` variable, `false` fixed,
    /// `null` undecided).
    #[serde(default)]
    pub user_params: IndexMap<String, Option<bool>>,
    /// Bound user path name -> variable flag, same tri-state.
    #[serde(default)]
    pub user_paths: IndexMap<String, Option<bool>>,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            execute: true,
            user_params: IndexMap::new(),
            user_paths: IndexMap::new(),
        }
    }
}

impl StudyConfig {
    /// Resolution state of a bound parameter.
    pub fn param_state(&self, name: &str) -> InputState {
        InputState::from_flag(self.user_params.get(name).copied().flatten())
    }

    /// Resolution state of a bound user path.
    pub fn path_state(&self, name: &str) -> InputState {
        InputState::from_flag(self.user_paths.get(name).copied().flatten())
    }

    /// Names of inputs whose flag is still null, parameters first.
    pub fn unconfigured(&self) -> Vec<String> {
        self.user_params
            .iter()
            .chain(self.user_paths.iter())
            .filter(|(_, flag)| flag.is_none())
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Root configuration record persisted at the run root (`studies.yaml`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RunConfig {
    /// Study configurations keyed by study name, preserving declaration order.
    #[serde(default)]
    pub studies: IndexMap<String, StudyConfig>,
}
