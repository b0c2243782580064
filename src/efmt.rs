//! Custom rendering of expressions.
//!
//! The four logical connectives carry user-chosen symbols, validated by
//! [crate::names::check_operator_symbol] so that equations stay unambiguous.
//! A [CustomNames] snapshot associates entity ids with their current display
//! names; rendering an expression through it inserts parentheses only where
//! operator precedence would otherwise be ambiguous, plus the explicit
//! brackets recorded on the nodes.

use std::fmt;

use crate::error::NameResult;
use crate::expr::{ControlSignal, Expr, ExprNode, Operator};

pub const DEFAULT_AND_OPERATOR: &str = "&";
pub const DEFAULT_OR_OPERATOR: &str = "+";
pub const DEFAULT_NOT_OPERATOR: &str = "/";
pub const DEFAULT_XOR_OPERATOR: &str = "*";
pub const LOGIC_ONE: &str = "1";
pub const LOGIC_ZERO: &str = "0";

/// The four customizable connectives.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OperatorKind {
    And,
    Or,
    Not,
    Xor,
}

/// The current operator symbols, each with its last recorded name error.
#[derive(Clone, Debug, PartialEq)]
pub struct Operators {
    pub and: NameResult,
    pub or: NameResult,
    pub not: NameResult,
    pub xor: NameResult,
}

impl Default for Operators {
    fn default() -> Self {
        Self {
            and: NameResult::ok(DEFAULT_AND_OPERATOR),
            or: NameResult::ok(DEFAULT_OR_OPERATOR),
            not: NameResult::ok(DEFAULT_NOT_OPERATOR),
            xor: NameResult::ok(DEFAULT_XOR_OPERATOR),
        }
    }
}

impl Operators {
    pub fn get(&self, kind: OperatorKind) -> &NameResult {
        match kind {
            OperatorKind::And => &self.and,
            OperatorKind::Or => &self.or,
            OperatorKind::Not => &self.not,
            OperatorKind::Xor => &self.xor,
        }
    }

    pub(crate) fn get_mut(&mut self, kind: OperatorKind) -> &mut NameResult {
        match kind {
            OperatorKind::And => &mut self.and,
            OperatorKind::Or => &mut self.or,
            OperatorKind::Not => &mut self.not,
            OperatorKind::Xor => &mut self.xor,
        }
    }

    /// The current symbol of a connective.
    pub fn symbol(&self, kind: OperatorKind) -> &str {
        &self.get(kind).value
    }

    pub(crate) fn binary_symbol(&self, op: Operator) -> &str {
        match op {
            Operator::And => self.symbol(OperatorKind::And),
            Operator::Or => self.symbol(OperatorKind::Or),
            Operator::Xor => self.symbol(OperatorKind::Xor),
        }
    }
}

/// A read-only snapshot of every user-visible name in the network.
///
/// Used both directions: rendering expressions for display and resolving the
/// names found in typed-in equations. All name comparisons are
/// case-insensitive. Entities missing from the snapshot render with their
/// generic id-based names (`x3`, `y0`, `automaton1.s0`).
#[derive(Clone, Debug, Default)]
pub struct CustomNames {
    pub(crate) automata: Vec<(u32, String)>,
    pub(crate) inputs: Vec<(u32, String)>,
    pub(crate) outputs: Vec<(u32, String)>,
    pub(crate) control_signals: Vec<(ControlSignal, String)>,
    pub(crate) operators: Operators,
}

impl CustomNames {
    pub fn operators(&self) -> &Operators {
        &self.operators
    }

    pub fn automaton_name(&self, id: u32) -> Option<&str> {
        self.automata
            .iter()
            .find(|(a, _)| *a == id)
            .map(|(_, n)| n.as_str())
    }

    pub fn input_name(&self, id: u32) -> Option<&str> {
        self.inputs
            .iter()
            .find(|(i, _)| *i == id)
            .map(|(_, n)| n.as_str())
    }

    pub fn output_name(&self, id: u32) -> Option<&str> {
        self.outputs
            .iter()
            .find(|(o, _)| *o == id)
            .map(|(_, n)| n.as_str())
    }

    pub fn control_signal_name(&self, cs: ControlSignal) -> Option<&str> {
        self.control_signals
            .iter()
            .find(|(c, _)| *c == cs)
            .map(|(_, n)| n.as_str())
    }

    pub fn automaton_named(&self, name: &str) -> Option<u32> {
        self.automata
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(id, _)| *id)
    }

    pub fn input_named(&self, name: &str) -> Option<u32> {
        self.inputs
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(id, _)| *id)
    }

    pub fn output_named(&self, name: &str) -> Option<u32> {
        self.outputs
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(id, _)| *id)
    }

    pub fn control_signal_named(&self, automaton: u32, name: &str) -> Option<ControlSignal> {
        self.control_signals
            .iter()
            .find(|(c, n)| c.automaton == automaton && n.eq_ignore_ascii_case(name))
            .map(|(c, _)| *c)
    }

    /// Wrap an expression for display with the names of this snapshot.
    pub fn named<'a>(&'a self, expr: &'a Expr) -> impl fmt::Display + 'a {
        NamedExpr { names: self, expr }
    }

    /// Render an expression to a string with the names of this snapshot.
    pub fn render(&self, expr: &Expr) -> String {
        self.named(expr).to_string()
    }

    pub(crate) fn fmt_expr(&self, f: &mut fmt::Formatter<'_>, e: &Expr) -> fmt::Result {
        self.write_expr(f, e, 0)
    }

    fn write_expr(&self, f: &mut fmt::Formatter<'_>, e: &Expr, parent_priority: u8) -> fmt::Result {
        // a child is parenthesized only when its operator binds strictly
        // weaker than the surrounding one
        let required = match e.node() {
            ExprNode::Operation(op, _) => op.priority() < parent_priority,
            _ => false,
        };
        let parens = e.brackets().max(required as u16);
        for _ in 0..parens {
            write!(f, "(")?;
        }
        match e.node() {
            ExprNode::Const(b) => write!(f, "{}", if *b { LOGIC_ONE } else { LOGIC_ZERO })?,
            ExprNode::Input(id) => match self.input_name(*id) {
                Some(name) => write!(f, "{}", name)?,
                None => write!(f, "x{}", id)?,
            },
            ExprNode::Output(id) => match self.output_name(*id) {
                Some(name) => write!(f, "{}", name)?,
                None => write!(f, "y{}", id)?,
            },
            ExprNode::ZVariable(z) => write!(f, "{}", z)?,
            ExprNode::ControlSignal(cs) => {
                match self.automaton_name(cs.automaton) {
                    Some(name) => write!(f, "{}.", name)?,
                    None => write!(f, "automaton{}.", cs.automaton)?,
                }
                match self.control_signal_name(*cs) {
                    Some(name) => write!(f, "{}", name)?,
                    None => write!(f, "s{}", cs.signal)?,
                }
            }
            ExprNode::Not(child) => {
                write!(f, "{}", self.operators.symbol(OperatorKind::Not))?;
                // negated operations always need their parentheses
                self.write_expr(f, child, 3)?;
            }
            ExprNode::Operation(op, children) => {
                let mut first = true;
                for child in children.iter() {
                    if !first {
                        write!(f, " {} ", self.operators.binary_symbol(*op))?;
                    }
                    first = false;
                    self.write_expr(f, child, op.priority())?;
                }
            }
        }
        for _ in 0..parens {
            write!(f, ")")?;
        }
        Ok(())
    }
}

struct NamedExpr<'a> {
    names: &'a CustomNames,
    expr: &'a Expr,
}

impl fmt::Display for NamedExpr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.names.fmt_expr(f, self.expr)
    }
}
