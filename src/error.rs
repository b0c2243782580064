//! Error types and the value-with-recorded-error tuples used across the crate.
//!
//! Validation failures are data, not control flow: a rejected name, number or
//! equation keeps the previous valid value and records the failure next to it.
//! Only entity lookups (asking for an automaton or node that does not exist)
//! surface as a [Result] from the operation itself.

use crate::expr::Expr;
use thiserror::Error;

/// Error in the name of a signal, automaton or operator symbol.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum NameError {
    /// The name does not meet the syntax requirements
    #[error("The name '{0}' does not meet the syntax requirements")]
    InvalidSyntax(String),

    /// The name is already taken in its namespace
    #[error("The name '{0}' is already taken")]
    Duplicate(String),
}

/// Error in a user-visible number (state numbers, initial states).
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum NumberError {
    /// The number can not be represented with the current encoding
    #[error("The number '{0}' is out of range")]
    OutOfRange(u32),

    /// The number is already used by another state of the same automaton
    #[error("The state number '{0}' is already taken in this automaton")]
    Duplicate(u32),

    /// The number was reset after a structural change, the old value is kept here
    #[error("The number '{0}' has been reset")]
    Reset(u32),
}

/// Error raised when parsing or assigning a typed-in equation.
///
/// The equation text that triggered the error is always carried along so it
/// can be surfaced next to the input field it came from.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ExpressionError {
    /// The text could not be parsed
    #[error("The expression '{0}' does not meet the syntax requirements")]
    Syntax(String),

    /// The expression uses a name which is not defined anywhere
    #[error("The expression '{expression}' contains the unknown variable '{name}'")]
    UnknownVariable { expression: String, name: String },

    /// Output variables can not appear on the right-hand side of an equation
    #[error("The expression '{expression}' contains the output variable '{name}'")]
    OutputVariable { expression: String, name: String },

    /// z-variables are forbidden in this context
    #[error("The expression '{0}' contains z-variables")]
    DisallowedZVariable(String),

    /// Control signals are forbidden in this context
    #[error("The expression '{0}' contains control signals")]
    DisallowedControlSignal(String),

    /// A control signal of the automaton the equation belongs to
    #[error("The expression '{0}' contains a control signal of its own automaton")]
    OwnControlSignal(String),
}

/// Lookup failure in the operation API of the [crate::Network].
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum FsmkitError {
    #[error("There is no automaton with id {0}")]
    NoSuchAutomaton(u32),

    #[error("There is no node with id {0}")]
    NoSuchNode(u32),

    #[error("There is no transition with id {0}")]
    NoSuchTransition(u32),

    #[error("There is no input named '{0}'")]
    NoSuchInput(String),

    #[error("There is no output named '{0}'")]
    NoSuchOutput(String),

    #[error("There is no control signal named '{0}' in this automaton")]
    NoSuchControlSignal(String),

    #[error("Nodes {0} and {1} do not belong to the requested automaton")]
    CrossAutomatonTransition(u32, u32),
}

/// A name together with the last error recorded while setting it.
///
/// `value` always holds a usable name: when a candidate is rejected the
/// previous valid name is retained and the rejection is stored in `error`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameResult {
    pub value: String,
    pub error: Option<NameError>,
}

impl NameResult {
    pub fn ok(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            error: None,
        }
    }

    pub fn with_error(value: impl Into<String>, error: NameError) -> Self {
        Self {
            value: value.into(),
            error: Some(error),
        }
    }
}

/// A number together with the last error recorded while setting it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NumberResult {
    pub value: u32,
    pub error: Option<NumberError>,
}

impl NumberResult {
    pub fn ok(value: u32) -> Self {
        Self { value, error: None }
    }

    pub fn with_error(value: u32, error: NumberError) -> Self {
        Self {
            value,
            error: Some(error),
        }
    }
}

/// An expression together with the last error recorded while assigning it.
///
/// `expr` always holds a valid expression: when a typed-in equation is
/// rejected the previously assigned expression is retained.
#[derive(Clone, Debug, PartialEq)]
pub struct ExprResult {
    pub expr: Expr,
    pub error: Option<ExpressionError>,
}

impl ExprResult {
    pub fn ok(expr: Expr) -> Self {
        Self { expr, error: None }
    }

    pub fn with_error(expr: Expr, error: ExpressionError) -> Self {
        Self {
            expr,
            error: Some(error),
        }
    }
}
