//! Removes congestion terms left behind in transit time functions
//!
//! The congestion variable `us3` belongs to this crate: a congested run
//! appends `*(1+us3)` to transit time functions. Healing strips that suffix so
//! every run starts from the uncongested expression, and rejects any other use
//! of the variable.

use tracing::info;

use crate::error::{Error, Result};
use crate::scenario::{FunctionKind, Scenario};

pub const CONGESTION_VARIABLE: &str = "us3";
pub const CONGESTION_SUFFIX: &str = "*(1+us3)";

#[derive(Debug, PartialEq)]
pub enum Healing {
    Untouched,
    Healed(String),
}

/// Decides what to do with one transit time function expression.
///
/// Returns `None` when the congestion variable is used outside the recognised
/// suffix.
pub fn heal_expression(expression: &str) -> Option<Healing> {
    let cleaned: String = expression.chars().filter(|c| !c.is_whitespace()).collect();
    if !references_variable(&cleaned, CONGESTION_VARIABLE) {
        return Some(Healing::Untouched);
    }

    let healed = cleaned.strip_suffix(CONGESTION_SUFFIX)?;
    if references_variable(healed, CONGESTION_VARIABLE) {
        return None;
    }
    Some(Healing::Healed(healed.to_string()))
}

/// True when `variable` appears in `expression` as a whole identifier.
fn references_variable(expression: &str, variable: &str) -> bool {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '@';
    expression.match_indices(variable).any(|(start, _)| {
        let before = expression[..start].chars().next_back();
        let after = expression[start + variable.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

/// Heals every transit time function of the scenario and returns how many
/// were rewritten.
pub fn heal_travel_time_functions<S: Scenario + ?Sized>(scenario: &S) -> Result<usize> {
    let mut changes = 0;
    for function in scenario.functions() {
        if function.id.kind != FunctionKind::TransitTime {
            continue;
        }
        match heal_expression(&function.expression) {
            Some(Healing::Untouched) => {}
            Some(Healing::Healed(healed)) => {
                info!(
                    function = %function.id,
                    original = %function.expression,
                    healed = %healed,
                    "detected function with existing congestion term"
                );
                scenario.set_function_expression(function.id, &healed)?;
                changes += 1;
            }
            None => {
                return Err(Error::ReservedCongestionVariable {
                    function: function.id,
                });
            }
        }
    }
    Ok(changes)
}
