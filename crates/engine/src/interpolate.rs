//! `${{ ... }}` template interpolation scoped to one unit execution.
//!
//! Supported expressions:
//!
//! - `${{ study }}` / `${{ dataset }}` — identifiers of the instance
//! - `${{ params.<name> }}` — resolved parameter value
//! - `${{ inputs.<slot> }}` — concrete input path
//! - `${{ outputs.<label> }}` — concrete output location
//!
//! Unresolvable expressions are left verbatim and logged, so a typo surfaces
//! in the executed command rather than silently vanishing.

use serde_json::Value as JsonValue;
use tracing::warn;

use crate::runner::UnitExecution;

/// Interpolates every `${{ ... }}` expression in `template` against the
/// execution context.
pub fn interpolate(template: &str, execution: &UnitExecution) -> String {
    let mut output = String::with_capacity(template.len());
    let mut remainder = template;

    while let Some(start) = remainder.find("${{") {
        output.push_str(&remainder[..start]);
        let after_open = &remainder[start + 3..];
        let Some(end) = after_open.find("}}") else {
            // Unterminated expression; emit the rest verbatim.
            output.push_str(&remainder[start..]);
            return output;
        };
        let expression = after_open[..end].trim();
        match resolve_expression(expression, execution) {
            Some(resolved) => output.push_str(&resolved),
            None => {
                warn!(expression, unit = %execution.unit, "unresolvable template expression left verbatim");
                output.push_str(&remainder[start..start + 3 + end + 2]);
            }
        }
        remainder = &after_open[end + 2..];
    }
    output.push_str(remainder);
    output
}

fn resolve_expression(expression: &str, execution: &UnitExecution) -> Option<String> {
    if expression == "study" {
        return Some(execution.study.clone());
    }
    if expression == "dataset" {
        return Some(execution.dataset.clone());
    }
    if let Some(name) = expression.strip_prefix("params.") {
        return execution.params.get(name).map(format_json_value);
    }
    if let Some(slot) = expression.strip_prefix("inputs.") {
        return execution.inputs.get(slot).map(|path| path.display().to_string());
    }
    if let Some(label) = expression.strip_prefix("outputs.") {
        return execution.outputs.get(label).map(|path| path.display().to_string());
    }
    None
}

/// Strings render without quotes; everything else uses its JSON rendering.
fn format_json_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(text) => text.clone(),
        other => other.to_string(),
    }
}
