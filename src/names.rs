//! Validation of user-chosen names and operator symbols.
//!
//! Four disjoint namespaces share the same syntax rule: automaton names,
//! input names, output names and the control-signal names scoped to one
//! automaton. Uniqueness is checked case-insensitively within a namespace.
//! Signal names additionally must not collide with the reserved z-variable
//! scheme, so generated z-variable identifiers stay unambiguous in equations.
//!
//! Every check exists in a query form (a plain boolean) and a strict form
//! (reporting the [NameError]); [compute_signal_name] wraps the strict form
//! into the fallback pattern used across the crate: an invalid candidate
//! keeps the previous valid name and records the rejection.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::efmt::{OperatorKind, Operators};
use crate::error::{NameError, NameResult};

static RE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_{}]*$").unwrap());

// reserved z-variable scheme, anchored on the suffix
static RE_RESERVED_Z: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)z[0-9]+$").unwrap());

// operator symbols must stay disjoint from the name alphabet, whitespace and '.'
static RE_OPERATOR_FORBIDDEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.\sa-zA-Z0-9_{}]").unwrap());

/// Whether a name satisfies the shared syntax rule.
pub fn is_valid_name(name: &str) -> bool {
    RE_NAME.is_match(name)
}

/// Whether a name matches the reserved z-variable scheme.
pub(crate) fn matches_z_scheme(name: &str) -> bool {
    RE_RESERVED_Z.is_match(name)
}

/// Strict check of a signal name against its namespace.
pub fn check_signal_name<'a, I>(existing: I, candidate: &str) -> Result<(), NameError>
where
    I: IntoIterator<Item = &'a str>,
{
    if !is_valid_name(candidate) || matches_z_scheme(candidate) {
        return Err(NameError::InvalidSyntax(candidate.into()));
    }
    check_unused(existing, candidate)
}

/// Query check of a signal name against its namespace.
pub fn is_usable_signal_name<'a, I>(existing: I, candidate: &str) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    check_signal_name(existing, candidate).is_ok()
}

/// Strict check of an automaton name against the automaton namespace.
pub fn check_automaton_name<'a, I>(existing: I, candidate: &str) -> Result<(), NameError>
where
    I: IntoIterator<Item = &'a str>,
{
    if !is_valid_name(candidate) {
        return Err(NameError::InvalidSyntax(candidate.into()));
    }
    check_unused(existing, candidate)
}

/// Query check of an automaton name.
pub fn is_usable_automaton_name<'a, I>(existing: I, candidate: &str) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    check_automaton_name(existing, candidate).is_ok()
}

fn check_unused<'a, I>(existing: I, candidate: &str) -> Result<(), NameError>
where
    I: IntoIterator<Item = &'a str>,
{
    for name in existing {
        if name.eq_ignore_ascii_case(candidate) {
            return Err(NameError::Duplicate(candidate.into()));
        }
    }
    Ok(())
}

/// Validate a signal name, falling back to the previous valid one.
pub fn compute_signal_name<'a, I>(candidate: &str, existing: I, fallback: &str) -> NameResult
where
    I: IntoIterator<Item = &'a str>,
{
    match check_signal_name(existing, candidate) {
        Ok(()) => NameResult::ok(candidate),
        Err(e) => NameResult::with_error(fallback, e),
    }
}

/// Validate an automaton name, falling back to the previous valid one.
pub fn compute_automaton_name<'a, I>(candidate: &str, existing: I, fallback: &str) -> NameResult
where
    I: IntoIterator<Item = &'a str>,
{
    match check_automaton_name(existing, candidate) {
        Ok(()) => NameResult::ok(candidate),
        Err(e) => NameResult::with_error(fallback, e),
    }
}

/// Strict check of a new symbol for one of the four connectives.
///
/// A candidate is valid when it contains no whitespace, no `.`, no character
/// of the name alphabet, does not match the z-variable scheme, and is
/// bidirectionally substring-disjoint from the three other current symbols.
/// The symbol being replaced is compared as the always-invalid `"."`, so
/// re-setting an operator to its current value is not a self-collision.
pub fn check_operator_symbol(
    operators: &Operators,
    candidate: &str,
    changed: OperatorKind,
) -> Result<(), NameError> {
    if candidate.is_empty()
        || RE_OPERATOR_FORBIDDEN.is_match(candidate)
        || matches_z_scheme(candidate)
    {
        return Err(NameError::InvalidSyntax(candidate.into()));
    }

    let candidate_lower = candidate.to_lowercase();
    for kind in [
        OperatorKind::And,
        OperatorKind::Or,
        OperatorKind::Not,
        OperatorKind::Xor,
    ] {
        let other = match kind == changed {
            true => ".".to_string(),
            false => operators.symbol(kind).to_lowercase(),
        };
        if other.contains(&candidate_lower) || candidate_lower.contains(&other) {
            return Err(NameError::Duplicate(candidate.into()));
        }
    }
    Ok(())
}
