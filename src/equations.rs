//! Per-automaton equation synthesis.
//!
//! From the node/transition graph of one automaton, three equation families
//! are derived:
//!
//! * one z-equation per encoding bit: the OR, over every transition entering
//!   a state whose encoding sets that bit, of the minterm of the source state
//!   ANDed with the transition condition;
//! * one equation per global output assigned somewhere in the automaton: the
//!   OR, over every node assigning it, of the node's minterm ANDed with the
//!   authored expression;
//! * one equation per control signal assigned somewhere in the automaton,
//!   built the same way. These never contain control signals, so they can be
//!   evaluated against the base layer alone.
//!
//! This is the simple sum-over-the-graph construction used for simulation;
//! producing a *minimal* next-state equation set is the job of the external
//! synthesis pipeline and out of scope here.

use crate::assignment::DerivedAssignment;
use crate::encoding::{bit_needed, needed_bits, state_to_expression};
use crate::expr::{ControlSignal, Expr, ZVariable};

/// The equation of one z-variable.
#[derive(Clone, Debug)]
pub struct ZEquation {
    pub variable: ZVariable,
    pub expr: Expr,
}

/// The equation of one global output, within one automaton.
#[derive(Clone, Debug)]
pub struct OutputEquation {
    pub output: u32,
    pub expr: Expr,
}

/// The equation of one control signal.
#[derive(Clone, Debug)]
pub struct ControlSignalEquation {
    pub signal: ControlSignal,
    pub expr: Expr,
}

/// All equations derived from one automaton's graph.
#[derive(Clone, Debug)]
pub struct EquationSet {
    pub automaton: u32,
    pub z: Vec<ZEquation>,
    pub outputs: Vec<OutputEquation>,
    pub control_signals: Vec<ControlSignalEquation>,
}

impl EquationSet {
    pub fn new(automaton: u32) -> Self {
        Self {
            automaton,
            z: Vec::new(),
            outputs: Vec::new(),
            control_signals: Vec::new(),
        }
    }
}

// Flat view of one node, as the synthesis needs it.
pub(crate) struct StructureNode<'a> {
    pub state: u32,
    pub outputs: Vec<(u32, &'a Expr)>,
    pub control_signals: Vec<(u32, &'a Expr)>,
}

// Flat view of one transition, endpoints already resolved to state numbers.
pub(crate) struct StructureTransition<'a> {
    pub from_state: u32,
    pub to_state: u32,
    pub condition: &'a Expr,
}

pub(crate) fn compute_equation_set(
    automaton: u32,
    nodes: &[StructureNode],
    transitions: &[StructureTransition],
) -> EquationSet {
    let max_state = nodes.iter().map(|n| n.state).max().unwrap_or(0);
    let bits = needed_bits(max_state);

    let mut set = EquationSet::new(automaton);

    for bit in 0..bits {
        let mut right = Expr::from(false);
        for t in transitions {
            if bit_needed(t.to_state, bit) {
                let source = state_to_expression(automaton, t.from_state, bits);
                right = right | (source & t.condition.clone());
            }
        }
        set.z.push(ZEquation {
            variable: ZVariable { automaton, bit },
            expr: right,
        });
    }

    // outputs in id order, each OR-ed over the nodes assigning it
    let mut output_ids: Vec<u32> = Vec::new();
    for node in nodes {
        for (id, _) in &node.outputs {
            if !output_ids.contains(id) {
                output_ids.push(*id);
            }
        }
    }
    output_ids.sort_unstable();
    for id in output_ids {
        let mut right = Expr::from(false);
        for node in nodes {
            for (output, expr) in &node.outputs {
                if *output == id {
                    let minterm = state_to_expression(automaton, node.state, bits);
                    right = right | (minterm & (*expr).clone());
                }
            }
        }
        set.outputs.push(OutputEquation { output: id, expr: right });
    }

    let mut signal_ids: Vec<u32> = Vec::new();
    for node in nodes {
        for (id, _) in &node.control_signals {
            if !signal_ids.contains(id) {
                signal_ids.push(*id);
            }
        }
    }
    signal_ids.sort_unstable();
    for id in signal_ids {
        let mut right = Expr::from(false);
        for node in nodes {
            for (signal, expr) in &node.control_signals {
                if *signal == id {
                    let minterm = state_to_expression(automaton, node.state, bits);
                    right = right | (minterm & (*expr).clone());
                }
            }
        }
        set.control_signals.push(ControlSignalEquation {
            signal: ControlSignal {
                automaton,
                signal: id,
            },
            expr: right,
        });
    }

    set
}

/// Evaluate a z-equation set and assemble the next state number.
///
/// Every equation contributes its bit when it evaluates to true; bits without
/// an equation (or whose equation is false) stay 0. All equations read the
/// same snapshot, so the caller can advance every automaton from one
/// consistent assignment.
pub fn next_state_from_equations(equations: &[ZEquation], assignment: &DerivedAssignment) -> u32 {
    let mut next = 0;
    for eq in equations {
        if eq.expr.eval(assignment) {
            next |= 1 << eq.variable.bit;
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::BaseAssignment;

    #[test]
    fn two_state_toggle() {
        let go = Expr::input(0);
        let stay = Expr::negation(Expr::input(0));
        let nodes = [
            StructureNode {
                state: 0,
                outputs: vec![],
                control_signals: vec![],
            },
            StructureNode {
                state: 1,
                outputs: vec![],
                control_signals: vec![],
            },
        ];
        let transitions = [
            StructureTransition {
                from_state: 0,
                to_state: 1,
                condition: &go,
            },
            StructureTransition {
                from_state: 1,
                to_state: 0,
                condition: &stay,
            },
        ];
        let set = compute_equation_set(0, &nodes, &transitions);
        assert_eq!(set.z.len(), 1);

        // in state 0 with the input set, the single z-equation fires
        let mut base = BaseAssignment::default();
        base.set_input(0, true);
        base.set_z_variable(
            ZVariable {
                automaton: 0,
                bit: 0,
            },
            false,
        );
        let derived = DerivedAssignment::from_base(base, &[]);
        assert_eq!(next_state_from_equations(&set.z, &derived), 1);

        // in state 1 it does not: the automaton falls back to state 0
        let mut base = BaseAssignment::default();
        base.set_input(0, true);
        base.set_z_variable(
            ZVariable {
                automaton: 0,
                bit: 0,
            },
            true,
        );
        let derived = DerivedAssignment::from_base(base, &[]);
        assert_eq!(next_state_from_equations(&set.z, &derived), 0);
    }

    #[test]
    fn output_equation_is_guarded_by_the_state_minterm() {
        let always = Expr::from(true);
        let nodes = [
            StructureNode {
                state: 0,
                outputs: vec![],
                control_signals: vec![],
            },
            StructureNode {
                state: 1,
                outputs: vec![(4, &always)],
                control_signals: vec![],
            },
        ];
        let set = compute_equation_set(0, &nodes, &[]);
        assert_eq!(set.outputs.len(), 1);
        assert_eq!(set.outputs[0].output, 4);

        let z0 = ZVariable {
            automaton: 0,
            bit: 0,
        };
        let mut base = BaseAssignment::default();
        base.set_z_variable(z0, false);
        let derived = DerivedAssignment::from_base(base, &[]);
        assert!(!set.outputs[0].expr.eval(&derived));

        let mut base = BaseAssignment::default();
        base.set_z_variable(z0, true);
        let derived = DerivedAssignment::from_base(base, &[]);
        assert!(set.outputs[0].expr.eval(&derived));
    }

    #[test]
    fn empty_graph_still_has_one_bit() {
        let set = compute_equation_set(3, &[], &[]);
        assert_eq!(set.z.len(), 1);
        assert_eq!(set.z[0].variable.bit, 0);
        let derived = DerivedAssignment::from_base(BaseAssignment::default(), &[]);
        assert_eq!(next_state_from_equations(&set.z, &derived), 0);
    }
}
