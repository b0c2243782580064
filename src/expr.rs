//! Boolean expressions over the shared variable space of the network.
//!
//! An [Expr] is an immutable tree: internal nodes are Boolean operators and
//! leaves reference entities of the network by identity (inputs, outputs,
//! control signals and z-variables). Two structural flags are computed once
//! at construction and never recomputed: whether the tree contains
//! z-variables and whether it contains control signals. Transformations
//! (minimization, bracket reset) build new trees.
//!
//! Expressions overload the ```&```, ```|```, ```^``` and ```!``` operators to
//! facilitate their definition as readable rust statements; these entry points
//! eliminate fixed values and flatten nested identical operators. The plain
//! constructors ([Expr::and], [Expr::or], ...) build the tree exactly as
//! requested, which is what the equation parser uses to preserve the shape of
//! typed-in equations.
//!
//! ```
//! use fsmkit::{BaseAssignment, Expr, ZVariable};
//!
//! let x0 = Expr::input(0);
//! let z1 = Expr::z_variable(ZVariable { automaton: 0, bit: 1 });
//! let e = x0 & !z1;
//!
//! let mut assignment = BaseAssignment::default();
//! assignment.set_input(0, true);
//! assert!(e.eval_without_cs(&assignment));
//! assert!(e.contains_z_variables());
//! assert!(!e.contains_control_signals());
//! ```

use core::ops::{BitAnd, BitOr, BitXor, Not};
use std::fmt;
use std::sync::Arc;

use crate::assignment::{BaseAssignment, DerivedAssignment, FullAssignment, Valuation};
use crate::efmt::CustomNames;

/// A control signal leaf: the signal id together with the owning automaton.
///
/// Control-signal ids are only unique within their automaton, so the pair is
/// the identity used by evaluation and by the corruption checks.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ControlSignal {
    pub automaton: u32,
    pub signal: u32,
}

/// A z-variable leaf: one bit of the binary state encoding of an automaton.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ZVariable {
    pub automaton: u32,
    pub bit: u32,
}

impl fmt::Display for ZVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "z{}", self.bit)
    }
}

/// Any variable leaf, used for extraction and by the minimizer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum VarRef {
    Input(u32),
    Output(u32),
    ControlSignal(ControlSignal),
    ZVariable(ZVariable),
}

/// A Boolean expression tree.
///
/// Cloning is cheap: operator nodes share their children through [Arc].
/// Every node carries a bracket counter, a display-only annotation recording
/// how many explicit parentheses the user wrote around it (0 means only the
/// parentheses required by operator precedence are emitted).
#[derive(Clone, PartialEq, Debug)]
pub struct Expr {
    brackets: u16,
    z: bool,
    cs: bool,
    node: ExprNode,
}

/// A node in an expression tree.
#[derive(Clone, PartialEq, Debug)]
pub enum ExprNode {
    /// A fixed Boolean value
    Const(bool),
    /// A global input, by id
    Input(u32),
    /// A global output, by id
    Output(u32),
    /// A control signal of some automaton
    ControlSignal(ControlSignal),
    /// One bit of an automaton's state encoding
    ZVariable(ZVariable),
    /// Negation of a single child
    Not(Arc<Expr>),
    /// An n-ary operator applied to two or more children
    Operation(Operator, Arc<Vec<Expr>>),
}

/// The binary operators available in expression trees.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Operator {
    /// All children need to be true
    And,
    /// At least one child needs to be true
    Or,
    /// An odd number of children needs to be true
    Xor,
}

impl Operator {
    /// Binding priority, controlling the necessary parentheses when rendering.
    ///
    /// AND binds tighter than OR and XOR; OR and XOR share the same level.
    pub fn priority(self) -> u8 {
        match self {
            Operator::And => 2,
            Operator::Or | Operator::Xor => 1,
        }
    }
}

impl Expr {
    fn new(node: ExprNode) -> Self {
        let (z, cs) = match &node {
            ExprNode::ZVariable(_) => (true, false),
            ExprNode::ControlSignal(_) => (false, true),
            ExprNode::Not(c) => (c.z, c.cs),
            ExprNode::Operation(_, children) => (
                children.iter().any(|c| c.z),
                children.iter().any(|c| c.cs),
            ),
            _ => (false, false),
        };
        Self {
            brackets: 0,
            z,
            cs,
            node,
        }
    }

    /// A global input leaf.
    pub fn input(id: u32) -> Self {
        Self::new(ExprNode::Input(id))
    }

    /// A global output leaf.
    pub fn output(id: u32) -> Self {
        Self::new(ExprNode::Output(id))
    }

    /// A control signal leaf.
    pub fn control_signal(cs: ControlSignal) -> Self {
        Self::new(ExprNode::ControlSignal(cs))
    }

    /// A z-variable leaf.
    pub fn z_variable(z: ZVariable) -> Self {
        Self::new(ExprNode::ZVariable(z))
    }

    /// Negate an expression, keeping the child tree as it is.
    pub fn negation(child: Expr) -> Self {
        Self::new(ExprNode::Not(Arc::new(child)))
    }

    /// Conjunction of the given children, built exactly as requested.
    ///
    /// An empty list collapses to the constant `1`, a single child is
    /// returned unchanged.
    pub fn and(children: Vec<Expr>) -> Self {
        Self::operation(Operator::And, children, true)
    }

    /// Disjunction of the given children (empty list: constant `0`).
    pub fn or(children: Vec<Expr>) -> Self {
        Self::operation(Operator::Or, children, false)
    }

    /// Exclusive-or of the given children (empty list: constant `0`).
    pub fn xor(children: Vec<Expr>) -> Self {
        Self::operation(Operator::Xor, children, false)
    }

    fn operation(op: Operator, mut children: Vec<Expr>, empty: bool) -> Self {
        match children.len() {
            0 => Expr::from(empty),
            1 => children.pop().unwrap(),
            _ => Self::new(ExprNode::Operation(op, Arc::new(children))),
        }
    }

    /// Build a possibly negated leaf for any variable kind.
    pub(crate) fn literal(var: VarRef, value: bool) -> Expr {
        let leaf = match var {
            VarRef::Input(id) => Expr::input(id),
            VarRef::Output(id) => Expr::output(id),
            VarRef::ControlSignal(cs) => Expr::control_signal(cs),
            VarRef::ZVariable(z) => Expr::z_variable(z),
        };
        match value {
            true => leaf,
            false => Expr::negation(leaf),
        }
    }

    /// Get access to the inner node.
    pub fn node(&self) -> &ExprNode {
        &self.node
    }

    /// Whether the tree contains at least one z-variable (O(1), cached).
    pub fn contains_z_variables(&self) -> bool {
        self.z
    }

    /// Whether the tree contains at least one control signal (O(1), cached).
    pub fn contains_control_signals(&self) -> bool {
        self.cs
    }

    /// The number of explicit brackets recorded around this node.
    pub fn brackets(&self) -> u16 {
        self.brackets
    }

    /// Record `n` explicit brackets around this node.
    pub fn with_brackets(mut self, n: u16) -> Self {
        self.brackets = n;
        self
    }

    /// Record one more explicit bracket around this node.
    pub(crate) fn bracketed(mut self) -> Self {
        self.brackets = self.brackets.saturating_add(1);
        self
    }

    /// Return the same expression with every bracket counter reset to 0.
    ///
    /// The result renders with only the parentheses required by operator
    /// precedence. This is a display-only transformation.
    pub fn reset_brackets(&self) -> Expr {
        let node = match &self.node {
            ExprNode::Not(c) => ExprNode::Not(Arc::new(c.reset_brackets())),
            ExprNode::Operation(op, children) => ExprNode::Operation(
                *op,
                Arc::new(children.iter().map(|c| c.reset_brackets()).collect()),
            ),
            other => other.clone(),
        };
        Self::new(node)
    }

    /// Evaluate against inputs, z-variables and control signals.
    pub fn eval(&self, assignment: &DerivedAssignment) -> bool {
        self.eval_in(assignment)
    }

    /// Evaluate against a full assignment, additionally resolving output leaves.
    pub fn eval_full(&self, assignment: &FullAssignment) -> bool {
        self.eval_in(assignment)
    }

    /// Evaluate against inputs and z-variables only.
    ///
    /// This entry point exists so control-signal equations can be evaluated
    /// before any control signal has a value. The expressions it is used on
    /// never contain control-signal leaves; should one be present anyway it
    /// reads as `false`.
    pub fn eval_without_cs(&self, assignment: &BaseAssignment) -> bool {
        self.eval_in(assignment)
    }

    pub(crate) fn eval_in<V: Valuation>(&self, v: &V) -> bool {
        match &self.node {
            ExprNode::Const(b) => *b,
            ExprNode::Input(id) => v.input(*id),
            ExprNode::Output(id) => v.output(*id),
            ExprNode::ControlSignal(cs) => v.control_signal(*cs),
            ExprNode::ZVariable(z) => v.z_variable(*z),
            ExprNode::Not(c) => !c.eval_in(v),
            ExprNode::Operation(op, children) => match op {
                Operator::And => children.iter().all(|c| c.eval_in(v)),
                Operator::Or => children.iter().any(|c| c.eval_in(v)),
                Operator::Xor => children.iter().filter(|c| c.eval_in(v)).count() % 2 == 1,
            },
        }
    }

    /// Every variable leaf of the tree, without duplicates, in first-use order.
    pub fn variables(&self) -> Vec<VarRef> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut Vec<VarRef>) {
        let leaf = match &self.node {
            ExprNode::Input(id) => Some(VarRef::Input(*id)),
            ExprNode::Output(id) => Some(VarRef::Output(*id)),
            ExprNode::ControlSignal(cs) => Some(VarRef::ControlSignal(*cs)),
            ExprNode::ZVariable(z) => Some(VarRef::ZVariable(*z)),
            ExprNode::Const(_) => None,
            ExprNode::Not(c) => {
                c.collect_variables(out);
                None
            }
            ExprNode::Operation(_, children) => {
                for c in children.iter() {
                    c.collect_variables(out);
                }
                None
            }
        };
        if let Some(var) = leaf {
            if !out.contains(&var) {
                out.push(var);
            }
        }
    }

    /// Every input used in the tree, without duplicates.
    pub fn inputs(&self) -> Vec<u32> {
        self.variables()
            .into_iter()
            .filter_map(|v| match v {
                VarRef::Input(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Every control signal used in the tree, without duplicates.
    pub fn control_signals(&self) -> Vec<ControlSignal> {
        self.variables()
            .into_iter()
            .filter_map(|v| match v {
                VarRef::ControlSignal(cs) => Some(cs),
                _ => None,
            })
            .collect()
    }

    /// Every z-variable used in the tree, without duplicates.
    pub fn z_variables(&self) -> Vec<ZVariable> {
        self.variables()
            .into_iter()
            .filter_map(|v| match v {
                VarRef::ZVariable(z) => Some(z),
                _ => None,
            })
            .collect()
    }

    /// Corruption check after removing the input with this id.
    pub fn references_input(&self, id: u32) -> bool {
        self.variables().contains(&VarRef::Input(id))
    }

    /// Corruption check after removing the output with this id.
    pub fn references_output(&self, id: u32) -> bool {
        self.variables().contains(&VarRef::Output(id))
    }

    /// Corruption check after removing this control signal.
    pub fn references_control_signal(&self, cs: ControlSignal) -> bool {
        if !self.cs {
            return false;
        }
        self.variables().contains(&VarRef::ControlSignal(cs))
    }

    /// Corruption check after removing a whole automaton: true if any
    /// z-variable or control signal of that automaton appears in the tree.
    pub fn references_automaton(&self, automaton: u32) -> bool {
        if !self.z && !self.cs {
            return false;
        }
        self.variables().iter().any(|v| match v {
            VarRef::ControlSignal(cs) => cs.automaton == automaton,
            VarRef::ZVariable(z) => z.automaton == automaton,
            _ => false,
        })
    }

    /// Return a logically equivalent expression with a reduced number of
    /// literals.
    ///
    /// The result is a disjunctive normal form covering the same truth table
    /// over the free variables of the expression; see [crate::minimize].
    pub fn minimize(&self) -> Expr {
        crate::minimize::minimize(self)
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Self::new(ExprNode::Const(b))
    }
}

impl From<ZVariable> for Expr {
    fn from(z: ZVariable) -> Self {
        Self::z_variable(z)
    }
}

impl From<ControlSignal> for Expr {
    fn from(cs: ControlSignal) -> Self {
        Self::control_signal(cs)
    }
}

impl From<&Expr> for Expr {
    fn from(e: &Expr) -> Self {
        e.clone()
    }
}

// Render with internal names and the default operator symbols.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        CustomNames::default().fmt_expr(f, self)
    }
}

/* ************************************************************************* */
/* **************************  Operator overloading  *********************** */
/* ************************************************************************* */

fn join(op: Operator, a: Expr, b: Expr) -> Expr {
    // Fixed values never make it into an operation node
    if let ExprNode::Const(v) = &a.node {
        return fold_const(op, *v, b);
    }
    if let ExprNode::Const(v) = &b.node {
        return fold_const(op, *v, a);
    }
    let mut children = flatten(op, a);
    children.extend(flatten(op, b));
    Expr::new(ExprNode::Operation(op, Arc::new(children)))
}

fn fold_const(op: Operator, value: bool, other: Expr) -> Expr {
    match (op, value) {
        (Operator::And, false) => Expr::from(false),
        (Operator::And, true) => other,
        (Operator::Or, true) => Expr::from(true),
        (Operator::Or, false) => other,
        (Operator::Xor, false) => other,
        (Operator::Xor, true) => !other,
    }
}

fn flatten(op: Operator, e: Expr) -> Vec<Expr> {
    let brackets = e.brackets;
    match e.node {
        // only merge undecorated nodes: explicit brackets pin the subtree
        ExprNode::Operation(o, children) if o == op && brackets == 0 => {
            Arc::try_unwrap(children).unwrap_or_else(|c| Vec::clone(&c))
        }
        node => vec![Expr {
            brackets,
            ..Expr::new(node)
        }],
    }
}

impl Not for Expr {
    type Output = Expr;
    fn not(self) -> Self::Output {
        match &self.node {
            // double negations disappear, fixed values are folded directly
            ExprNode::Const(b) => Expr::from(!*b),
            ExprNode::Not(c) => Expr::clone(c),
            _ => Expr::negation(self),
        }
    }
}

impl Not for &Expr {
    type Output = Expr;
    fn not(self) -> Self::Output {
        !self.clone()
    }
}

impl<T: Into<Expr>> BitAnd<T> for Expr {
    type Output = Expr;
    fn bitand(self, rhs: T) -> Self::Output {
        join(Operator::And, self, rhs.into())
    }
}

impl<T: Into<Expr>> BitAnd<T> for &Expr {
    type Output = Expr;
    fn bitand(self, rhs: T) -> Self::Output {
        join(Operator::And, self.clone(), rhs.into())
    }
}

impl<T: Into<Expr>> BitOr<T> for Expr {
    type Output = Expr;
    fn bitor(self, rhs: T) -> Self::Output {
        join(Operator::Or, self, rhs.into())
    }
}

impl<T: Into<Expr>> BitOr<T> for &Expr {
    type Output = Expr;
    fn bitor(self, rhs: T) -> Self::Output {
        join(Operator::Or, self.clone(), rhs.into())
    }
}

impl<T: Into<Expr>> BitXor<T> for Expr {
    type Output = Expr;
    fn bitxor(self, rhs: T) -> Self::Output {
        join(Operator::Xor, self, rhs.into())
    }
}

impl<T: Into<Expr>> BitXor<T> for &Expr {
    type Output = Expr;
    fn bitxor(self, rhs: T) -> Self::Output {
        join(Operator::Xor, self.clone(), rhs.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(inputs: &[(u32, bool)]) -> BaseAssignment {
        let mut a = BaseAssignment::default();
        for (id, v) in inputs {
            a.set_input(*id, *v);
        }
        a
    }

    #[test]
    fn construct_and_eval() {
        let e = Expr::input(0) & (Expr::input(1) | !Expr::input(2));

        assert!(!e.eval_without_cs(&base(&[(1, true)])));
        assert!(e.eval_without_cs(&base(&[(0, true), (1, true)])));
        assert!(e.eval_without_cs(&base(&[(0, true)])));
        assert!(!e.eval_without_cs(&base(&[(0, true), (2, true)])));
    }

    #[test]
    fn xor_is_odd_parity() {
        let e = Expr::xor(vec![Expr::input(0), Expr::input(1), Expr::input(2)]);
        assert!(!e.eval_without_cs(&base(&[])));
        assert!(e.eval_without_cs(&base(&[(0, true)])));
        assert!(!e.eval_without_cs(&base(&[(0, true), (1, true)])));
        assert!(e.eval_without_cs(&base(&[(0, true), (1, true), (2, true)])));
    }

    #[test]
    fn cached_flags() {
        let z = Expr::z_variable(ZVariable {
            automaton: 3,
            bit: 0,
        });
        let s = Expr::control_signal(ControlSignal {
            automaton: 1,
            signal: 0,
        });
        let e = (Expr::input(0) & z) | s;

        assert!(e.contains_z_variables());
        assert!(e.contains_control_signals());
        assert!(!Expr::input(0).contains_z_variables());
        assert!(e.references_automaton(3));
        assert!(e.references_automaton(1));
        assert!(!e.references_automaton(2));
    }

    #[test]
    fn constant_folding_in_overloads() {
        let e = Expr::input(0) & Expr::from(true);
        assert_eq!(e, Expr::input(0));

        let e = Expr::input(0) & Expr::from(false);
        assert_eq!(e, Expr::from(false));

        let e = Expr::input(0) | Expr::from(true);
        assert_eq!(e, Expr::from(true));

        let e = !!Expr::input(4);
        assert_eq!(e, Expr::input(4));
    }

    #[test]
    fn extraction_deduplicates() {
        let e = (Expr::input(0) & Expr::input(1)) | (Expr::input(0) & !Expr::input(2));
        assert_eq!(e.inputs(), vec![0, 1, 2]);

        let cs = ControlSignal {
            automaton: 0,
            signal: 2,
        };
        let e = Expr::control_signal(cs) & Expr::control_signal(cs);
        assert_eq!(e.control_signals(), vec![cs]);
    }

    #[test]
    fn corruption_checks() {
        let e = Expr::input(0) | Expr::input(5);
        assert!(e.references_input(5));
        assert!(!e.references_input(1));
        assert!(!e.references_output(0));

        let cs = ControlSignal {
            automaton: 2,
            signal: 0,
        };
        let e = Expr::input(0) & Expr::control_signal(cs);
        assert!(e.references_control_signal(cs));
        assert!(!e.references_control_signal(ControlSignal {
            automaton: 2,
            signal: 1
        }));
    }

    #[test]
    fn bracket_reset_builds_a_new_tree() {
        let inner = (Expr::input(0) & Expr::input(1)).with_brackets(2);
        let e = inner | Expr::input(2);
        let reset = e.reset_brackets();

        // same semantics, no recorded brackets anywhere
        assert_eq!(format!("{}", reset), "x0 & x1 + x2");
        assert!(format!("{}", e).starts_with("(("));
    }
}
