//! Structural validation of unit contracts.
//!
//! A unit's top-level routine (its recorded call sequence) may only invoke
//! operations the contract declares. This keeps every side effect
//! attributable to a declared, inspectable operation; a violation is fatal
//! and halts workflow assembly before any resolution or execution.

use std::collections::HashSet;

use procflow_types::{UnitContract, WorkflowDoc};

use crate::error::EngineError;

/// Validates every unit contract in the workflow document.
///
/// Checks, per unit: no duplicate parameter/input/output names, and every
/// call in the routine's sequence targets a declared operation. The first
/// violation halts assembly.
pub fn validate_structure(doc: &WorkflowDoc) -> Result<(), EngineError> {
    for (unit_name, contract) in &doc.units {
        validate_contract(unit_name, contract)?;
    }
    Ok(())
}

fn validate_contract(unit_name: &str, contract: &UnitContract) -> Result<(), EngineError> {
    reject_duplicates(unit_name, "parameter", contract.params.iter().map(|p| p.name.as_str()))?;
    reject_duplicates(unit_name, "input path", contract.inputs.iter().map(String::as_str))?;
    reject_duplicates(unit_name, "output", contract.outputs.iter().map(String::as_str))?;
    reject_duplicates(unit_name, "operation", contract.operations.iter().map(String::as_str))?;

    let declared: HashSet<&str> = contract.operations.iter().map(String::as_str).collect();
    for call in contract.call_sequence() {
        if !declared.contains(call.as_str()) {
            return Err(EngineError::StructuralViolation {
                unit: unit_name.to_string(),
                call: call.clone(),
                declared: contract.operations.clone(),
            });
        }
    }
    Ok(())
}

fn reject_duplicates<'a>(
    unit_name: &str,
    section: &'static str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), EngineError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(EngineError::DuplicateDeclaration {
                unit: unit_name.to_string(),
                section,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}
