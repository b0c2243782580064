//! The three layered variable bindings used to evaluate the network.
//!
//! A [BaseAssignment] holds what is directly observable: the user-set inputs
//! and the z-variables encoding the current state of every automaton. A
//! [DerivedAssignment] adds the control signals, computed from the base layer
//! only. A [FullAssignment] adds the outputs, which may read control signals.
//! Data flows strictly upwards: each layer is built from the one below it and
//! a set of per-automaton equations, see [crate::equations].
//!
//! Every lookup falls back to `false` for a variable without an explicit
//! binding: a signal nobody assigned is inactive.

use std::collections::HashMap;

use delegate::delegate;

use crate::equations::EquationSet;
use crate::expr::{ControlSignal, ZVariable};

/// Variable lookups shared by the assignment layers.
pub trait Valuation {
    fn input(&self, id: u32) -> bool;
    fn z_variable(&self, z: ZVariable) -> bool;
    fn control_signal(&self, cs: ControlSignal) -> bool;
    fn output(&self, id: u32) -> bool;
}

/// Directly observable values: user-set inputs and encoded current states.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BaseAssignment {
    inputs: HashMap<u32, bool>,
    z_variables: HashMap<ZVariable, bool>,
}

impl BaseAssignment {
    pub fn set_input(&mut self, id: u32, value: bool) {
        self.inputs.insert(id, value);
    }

    pub fn set_z_variable(&mut self, z: ZVariable, value: bool) {
        self.z_variables.insert(z, value);
    }

    pub fn input(&self, id: u32) -> bool {
        self.inputs.get(&id).copied().unwrap_or(false)
    }

    pub fn z_variable(&self, z: ZVariable) -> bool {
        self.z_variables.get(&z).copied().unwrap_or(false)
    }

    /// Iterate over the explicitly bound inputs.
    pub fn iter_inputs(&self) -> impl Iterator<Item = (u32, bool)> + '_ {
        self.inputs.iter().map(|(k, v)| (*k, *v))
    }

    /// Iterate over the explicitly bound z-variables.
    pub fn iter_z_variables(&self) -> impl Iterator<Item = (ZVariable, bool)> + '_ {
        self.z_variables.iter().map(|(k, v)| (*k, *v))
    }
}

impl Valuation for BaseAssignment {
    fn input(&self, id: u32) -> bool {
        BaseAssignment::input(self, id)
    }
    fn z_variable(&self, z: ZVariable) -> bool {
        BaseAssignment::z_variable(self, z)
    }
    // the base layer predates control-signal evaluation
    fn control_signal(&self, _cs: ControlSignal) -> bool {
        false
    }
    fn output(&self, _id: u32) -> bool {
        false
    }
}

/// Base layer plus the evaluated control signals.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DerivedAssignment {
    base: BaseAssignment,
    control_signals: HashMap<ControlSignal, bool>,
}

impl DerivedAssignment {
    /// Evaluate every control-signal equation against the base layer.
    ///
    /// Control-signal equations contain no control signals, so the base
    /// layer is all they need. A control signal without an authored equation
    /// stays implicitly `false`.
    pub fn from_base(base: BaseAssignment, sets: &[EquationSet]) -> Self {
        let mut control_signals = HashMap::new();
        for set in sets {
            for eq in &set.control_signals {
                control_signals.insert(eq.signal, eq.expr.eval_without_cs(&base));
            }
        }
        Self {
            base,
            control_signals,
        }
    }

    pub fn base(&self) -> &BaseAssignment {
        &self.base
    }

    pub fn control_signal(&self, cs: ControlSignal) -> bool {
        self.control_signals.get(&cs).copied().unwrap_or(false)
    }

    /// Iterate over the control signals with an authored equation.
    pub fn iter_control_signals(&self) -> impl Iterator<Item = (ControlSignal, bool)> + '_ {
        self.control_signals.iter().map(|(k, v)| (*k, *v))
    }

    delegate! {
        to self.base {
            pub fn input(&self, id: u32) -> bool;
            pub fn z_variable(&self, z: ZVariable) -> bool;
        }
    }
}

impl Valuation for DerivedAssignment {
    fn input(&self, id: u32) -> bool {
        DerivedAssignment::input(self, id)
    }
    fn z_variable(&self, z: ZVariable) -> bool {
        DerivedAssignment::z_variable(self, z)
    }
    fn control_signal(&self, cs: ControlSignal) -> bool {
        DerivedAssignment::control_signal(self, cs)
    }
    fn output(&self, _id: u32) -> bool {
        false
    }
}

/// Derived layer plus the evaluated outputs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FullAssignment {
    derived: DerivedAssignment,
    outputs: HashMap<u32, bool>,
}

impl FullAssignment {
    /// Evaluate every output equation against the derived layer.
    ///
    /// When several automata assign the same global output, their
    /// contributions are combined with logical OR.
    pub fn from_derived(derived: DerivedAssignment, sets: &[EquationSet]) -> Self {
        let mut outputs: HashMap<u32, bool> = HashMap::new();
        for set in sets {
            for eq in &set.outputs {
                let value = eq.expr.eval(&derived);
                let slot = outputs.entry(eq.output).or_insert(false);
                *slot = *slot || value;
            }
        }
        Self { derived, outputs }
    }

    pub fn derived(&self) -> &DerivedAssignment {
        &self.derived
    }

    pub fn output(&self, id: u32) -> bool {
        self.outputs.get(&id).copied().unwrap_or(false)
    }

    /// Iterate over the outputs assigned somewhere in the network.
    pub fn iter_outputs(&self) -> impl Iterator<Item = (u32, bool)> + '_ {
        self.outputs.iter().map(|(k, v)| (*k, *v))
    }

    delegate! {
        to self.derived {
            pub fn input(&self, id: u32) -> bool;
            pub fn z_variable(&self, z: ZVariable) -> bool;
            pub fn control_signal(&self, cs: ControlSignal) -> bool;
        }
    }
}

impl Valuation for FullAssignment {
    fn input(&self, id: u32) -> bool {
        FullAssignment::input(self, id)
    }
    fn z_variable(&self, z: ZVariable) -> bool {
        FullAssignment::z_variable(self, z)
    }
    fn control_signal(&self, cs: ControlSignal) -> bool {
        FullAssignment::control_signal(self, cs)
    }
    fn output(&self, id: u32) -> bool {
        FullAssignment::output(self, id)
    }
}
