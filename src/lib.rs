//! Model a network of finite-state machines whose transitions, outputs and
//! control signals are Boolean equations over a shared variable space.
//!
//! The [Network] is a normalized entity store: global inputs and outputs,
//! automata, and the nodes (states) and transitions of every automaton, all
//! keyed by recycled integer ids. Equations are [expression trees](Expr)
//! whose leaves reference those entities by identity; the store keeps both
//! sides consistent, resetting any expression whose variables disappear and
//! re-validating the binary state encoding after every structural edit.
//!
//! ```
//! use fsmkit::{FsmkitError, Network};
//! # fn main() -> Result<(), FsmkitError> {
//!
//! let mut net = Network::new();
//! net.add_input(Some("start"));
//! let run = net.add_output(Some("run"));
//!
//! // a two-state machine: off (0) and on (1)
//! let a = net.add_automaton(Some("main"));
//! let off = net.add_node(a, Some(0))?;
//! let on = net.add_node(a, Some(1))?;
//! net.add_transition(a, off, on, Some("start"))?;
//! net.add_transition(a, on, on, Some("start"))?;
//! net.add_transition(a, on, off, Some("/start"))?;
//! net.set_output_equation(on, "run", "1")?;
//!
//! // drive it: set the input, advance the synchronous clock
//! net.set_input_value("start", true)?;
//! net.advance_clock();
//! assert_eq!(net.automaton(a).unwrap().current_state(), 1);
//! assert!(net.full_assignment().output(run));
//! # Ok(())
//! # }
//! ```
//!
//! # Expressions
//!
//! Expressions are immutable trees built from typed leaves and the AND, OR,
//! NOT and XOR operators, with structural flags cached at construction.
//! They can be composed with the usual rust operators, rendered with
//! user-chosen names and symbols, and minimized:
//!
//! ```
//! use fsmkit::Expr;
//!
//! let e = Expr::input(0) & !Expr::input(1);
//! assert_eq!(format!("{}", e), "x0 & /x1");
//!
//! let e = (Expr::input(0) & Expr::input(1)) | Expr::input(0);
//! assert_eq!(e.minimize(), Expr::input(0));
//! ```
//!
//! # Errors are data
//!
//! Renaming an entity to a taken name, typing an equation that references a
//! deleted signal, choosing an operator symbol that collides with another
//! one: none of these abort the operation. The previous valid value is kept
//! and the failure is recorded next to it, for the caller to surface:
//!
//! ```
//! use fsmkit::{NameError, Network};
//!
//! let mut net = Network::new();
//! net.add_input(Some("go"));
//! let id = net.add_input(Some("GO"));
//!
//! let signal = net.input(id).unwrap();
//! assert_eq!(signal.name().value, "x0");
//! assert!(matches!(signal.name().error, Some(NameError::Duplicate(_))));
//! ```

mod assignment;
mod efmt;
mod encoding;
mod equations;
mod error;
mod expr;
mod ids;
mod minimize;
pub mod names;
mod network;
mod parse;

#[macro_use]
extern crate pest_derive;

// Export public structures and API
pub use assignment::{BaseAssignment, DerivedAssignment, FullAssignment, Valuation};
pub use efmt::{CustomNames, OperatorKind, Operators};
pub use encoding::{bit_needed, max_representable, needed_bits, state_to_expression};
pub use equations::{
    next_state_from_equations, ControlSignalEquation, EquationSet, OutputEquation, ZEquation,
};
pub use error::{
    ExprResult, ExpressionError, FsmkitError, NameError, NameResult, NumberError, NumberResult,
};
pub use expr::{ControlSignal, Expr, ExprNode, Operator, VarRef, ZVariable};
pub use ids::IdSet;
pub use network::{Automaton, InputSignal, Network, Node, Transition};
pub use parse::{compute_equation, parse_equation, EquationContext};
