//! The normalized entity store and its operations.
//!
//! A [Network] owns every entity by integer id: global inputs and outputs,
//! automata, and the nodes and transitions of all automata in flat stores.
//! An automaton holds its nodes, transitions and control signals by
//! id-membership only; the payloads live in the global stores, so a node's
//! automaton is found by a reverse scan and never stored twice.
//!
//! Every mutating operation leaves the store consistent even when a sub-step
//! fails: names, numbers and equations fall back to their previous valid
//! value with the failure recorded next to them. Structural deletions are
//! followed, before anything else can observe the store, by the corruption
//! sweep over every stored expression and by the re-validation of the
//! affected automaton's initial state; any structural change ends with a
//! global reset of every automaton to its initial state, since the edit
//! invalidates whatever simulation was in progress.

use std::collections::BTreeMap;

use crate::assignment::{BaseAssignment, DerivedAssignment, FullAssignment};
use crate::efmt::{CustomNames, OperatorKind, Operators};
use crate::encoding::{bit_needed, max_representable, needed_bits};
use crate::equations::{
    compute_equation_set, next_state_from_equations, EquationSet, StructureNode,
    StructureTransition,
};
use crate::error::{
    ExprResult, FsmkitError, NameResult, NumberError, NumberResult,
};
use crate::expr::{ControlSignal, Expr, ZVariable};
use crate::ids::{next_free_id, IdSet};
use crate::names;
use crate::parse::{compute_equation, EquationContext};

const AUTOMATON_NAME_PREFIX: &str = "automaton";
const INPUT_NAME_PREFIX: &str = "x";
const OUTPUT_NAME_PREFIX: &str = "y";
const CONTROL_SIGNAL_NAME_PREFIX: &str = "s";

/// One finite-state machine of the network.
#[derive(Clone, Debug)]
pub struct Automaton {
    name: NameResult,
    info: String,
    initial_state: NumberResult,
    current_state: u32,
    nodes: IdSet,
    transitions: IdSet,
    control_signals: BTreeMap<u32, NameResult>,
}

impl Automaton {
    pub fn name(&self) -> &NameResult {
        &self.name
    }

    pub fn info(&self) -> &str {
        &self.info
    }

    pub fn initial_state(&self) -> &NumberResult {
        &self.initial_state
    }

    /// The state the automaton is currently in (simulation).
    pub fn current_state(&self) -> u32 {
        self.current_state
    }

    pub fn node_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.nodes.iter()
    }

    pub fn transition_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.transitions.iter()
    }

    pub fn control_signals(&self) -> impl Iterator<Item = (u32, &NameResult)> {
        self.control_signals.iter().map(|(id, name)| (*id, name))
    }

    fn control_signal_named(&self, name: &str) -> Option<u32> {
        self.control_signals
            .iter()
            .find(|(_, n)| n.value.eq_ignore_ascii_case(name))
            .map(|(id, _)| *id)
    }
}

/// A global input with its user-set simulation value.
#[derive(Clone, Debug)]
pub struct InputSignal {
    name: NameResult,
    value: bool,
}

impl InputSignal {
    pub fn name(&self) -> &NameResult {
        &self.name
    }

    pub fn value(&self) -> bool {
        self.value
    }
}

/// A state of one automaton.
///
/// The user-visible state number is independent of the node id and is the
/// value entering the binary encoding. The display name is free text.
#[derive(Clone, Debug)]
pub struct Node {
    state_number: NumberResult,
    name: String,
    outputs: BTreeMap<u32, ExprResult>,
    control_signals: BTreeMap<u32, ExprResult>,
}

impl Node {
    pub fn state_number(&self) -> &NumberResult {
        &self.state_number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output_equation(&self, output: u32) -> Option<&ExprResult> {
        self.outputs.get(&output)
    }

    pub fn output_equations(&self) -> impl Iterator<Item = (u32, &ExprResult)> {
        self.outputs.iter().map(|(id, e)| (*id, e))
    }

    pub fn control_signal_equation(&self, signal: u32) -> Option<&ExprResult> {
        self.control_signals.get(&signal)
    }

    pub fn control_signal_equations(&self) -> impl Iterator<Item = (u32, &ExprResult)> {
        self.control_signals.iter().map(|(id, e)| (*id, e))
    }
}

/// An edge between two nodes of the same automaton.
#[derive(Clone, Debug)]
pub struct Transition {
    from: u32,
    to: u32,
    condition: ExprResult,
}

impl Transition {
    pub fn from(&self) -> u32 {
        self.from
    }

    pub fn to(&self) -> u32 {
        self.to
    }

    pub fn condition(&self) -> &ExprResult {
        &self.condition
    }
}

/// The network of automata with its shared variable space.
#[derive(Clone, Debug, Default)]
pub struct Network {
    automata: BTreeMap<u32, Automaton>,
    nodes: BTreeMap<u32, Node>,
    transitions: BTreeMap<u32, Transition>,
    inputs: BTreeMap<u32, InputSignal>,
    outputs: BTreeMap<u32, NameResult>,
    operators: Operators,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /* *********************************  automata  ********************************* */

    /// Create an automaton.
    ///
    /// Without a name (or with an invalid one) the smallest free
    /// `automaton<N>` is used; a rejected candidate is recorded as the
    /// automaton's name error.
    pub fn add_automaton(&mut self, name: Option<&str>) -> u32 {
        let existing: Vec<String> = self
            .automata
            .values()
            .map(|a| a.name.value.clone())
            .collect();
        let mut n = 0;
        let generated = loop {
            let candidate = format!("{}{}", AUTOMATON_NAME_PREFIX, n);
            if names::is_usable_automaton_name(existing.iter().map(|s| s.as_str()), &candidate) {
                break candidate;
            }
            n += 1;
        };
        let name = match name {
            None => NameResult::ok(generated),
            Some(candidate) => names::compute_automaton_name(
                candidate,
                existing.iter().map(|s| s.as_str()),
                &generated,
            ),
        };

        let id = next_free_id(self.automata.keys().copied());
        let info = name.value.clone();
        self.automata.insert(
            id,
            Automaton {
                name,
                info,
                initial_state: NumberResult::ok(0),
                current_state: 0,
                nodes: IdSet::new(),
                transitions: IdSet::new(),
                control_signals: BTreeMap::new(),
            },
        );
        self.reset_to_initial_states();
        id
    }

    /// Remove an automaton with all its nodes, transitions and control
    /// signals, then reset every expression that referenced it.
    pub fn remove_automaton(&mut self, id: u32) -> Result<(), FsmkitError> {
        let automaton = self
            .automata
            .remove(&id)
            .ok_or(FsmkitError::NoSuchAutomaton(id))?;
        for transition in automaton.transitions.iter() {
            self.transitions.remove(&transition);
        }
        for node in automaton.nodes.iter() {
            self.nodes.remove(&node);
        }
        self.sweep_corrupted(|e| e.references_automaton(id));
        self.reset_to_initial_states();
        Ok(())
    }

    /// Rename an automaton, keeping the current name on rejection.
    pub fn rename_automaton(&mut self, id: u32, name: &str) -> Result<(), FsmkitError> {
        if !self.automata.contains_key(&id) {
            return Err(FsmkitError::NoSuchAutomaton(id));
        }
        let existing: Vec<String> = self
            .automata
            .values()
            .map(|a| a.name.value.clone())
            .collect();
        let automaton = self.automata.get_mut(&id).unwrap();
        automaton.name = names::compute_automaton_name(
            name,
            existing.iter().map(|s| s.as_str()),
            &automaton.name.value.clone(),
        );
        Ok(())
    }

    pub fn set_automaton_info(&mut self, id: u32, info: &str) -> Result<(), FsmkitError> {
        let automaton = self
            .automata
            .get_mut(&id)
            .ok_or(FsmkitError::NoSuchAutomaton(id))?;
        automaton.info = info.into();
        Ok(())
    }

    /// Set the initial state of an automaton.
    ///
    /// The number must be representable with the automaton's current
    /// z-variables; it does not need a node of its own. An unrepresentable
    /// number keeps the current initial state and records the rejection.
    pub fn set_initial_state(&mut self, id: u32, state: u32) -> Result<(), FsmkitError> {
        if !self.automata.contains_key(&id) {
            return Err(FsmkitError::NoSuchAutomaton(id));
        }
        let bound = max_representable(needed_bits(self.max_state_number(id)));
        let automaton = self.automata.get_mut(&id).unwrap();
        if state <= bound {
            automaton.initial_state = NumberResult::ok(state);
            self.reset_to_initial_states();
        } else {
            automaton.initial_state.error = Some(NumberError::OutOfRange(state));
        }
        Ok(())
    }

    pub fn automaton(&self, id: u32) -> Option<&Automaton> {
        self.automata.get(&id)
    }

    pub fn automata(&self) -> impl Iterator<Item = (u32, &Automaton)> {
        self.automata.iter().map(|(id, a)| (*id, a))
    }

    /* **********************************  nodes  *********************************** */

    /// Add a state to an automaton.
    ///
    /// Without a state number the smallest unused number of the automaton is
    /// taken. A number already present in the automaton is rejected: the
    /// generated number is used instead and the clash is recorded on the
    /// node.
    pub fn add_node(&mut self, automaton: u32, state: Option<u32>) -> Result<u32, FsmkitError> {
        if !self.automata.contains_key(&automaton) {
            return Err(FsmkitError::NoSuchAutomaton(automaton));
        }
        let used: Vec<u32> = self.state_numbers(automaton);
        let generated = next_free_id(used.iter().copied());
        let number = match state {
            None => NumberResult::ok(generated),
            Some(n) if used.contains(&n) => {
                NumberResult::with_error(generated, NumberError::Duplicate(n))
            }
            Some(n) => NumberResult::ok(n),
        };

        let id = next_free_id(self.nodes.keys().copied());
        let name = format!("Z{}", number.value);
        self.nodes.insert(
            id,
            Node {
                state_number: number,
                name,
                outputs: BTreeMap::new(),
                control_signals: BTreeMap::new(),
            },
        );
        self.automata.get_mut(&automaton).unwrap().nodes.insert(id);
        self.revalidate_initial_state(automaton);
        self.reset_to_initial_states();
        Ok(id)
    }

    /// Remove a node together with every transition touching it.
    ///
    /// Shrinking the automaton can shrink its encoding: an initial state that
    /// is no longer representable is forced back to 0 with a recorded reset.
    pub fn remove_node(&mut self, node: u32) -> Result<(), FsmkitError> {
        let owner = self
            .automaton_of_node(node)
            .ok_or(FsmkitError::NoSuchNode(node))?;
        self.nodes.remove(&node);

        let automaton = self.automata.get_mut(&owner).unwrap();
        automaton.nodes.remove(node);

        let dangling: Vec<u32> = self
            .transitions
            .iter()
            .filter(|(_, t)| t.from == node || t.to == node)
            .map(|(id, _)| *id)
            .collect();
        for id in dangling {
            self.transitions.remove(&id);
            self.automata.get_mut(&owner).unwrap().transitions.remove(id);
        }

        self.revalidate_initial_state(owner);
        self.reset_to_initial_states();
        Ok(())
    }

    /// Change the user-visible state number of a node.
    ///
    /// A number already taken in the automaton keeps the current one and
    /// records the clash.
    pub fn set_state_number(&mut self, node: u32, state: u32) -> Result<(), FsmkitError> {
        let owner = self
            .automaton_of_node(node)
            .ok_or(FsmkitError::NoSuchNode(node))?;
        let taken = self
            .automata[&owner]
            .nodes
            .iter()
            .filter(|id| *id != node)
            .filter_map(|id| self.nodes.get(&id))
            .any(|n| n.state_number.value == state);

        let entry = self.nodes.get_mut(&node).unwrap();
        if taken {
            entry.state_number.error = Some(NumberError::Duplicate(state));
            return Ok(());
        }
        entry.state_number = NumberResult::ok(state);
        self.revalidate_initial_state(owner);
        self.reset_to_initial_states();
        Ok(())
    }

    /// Set the display name of a node. Any text is accepted.
    pub fn set_node_name(&mut self, node: u32, name: &str) -> Result<(), FsmkitError> {
        let entry = self
            .nodes
            .get_mut(&node)
            .ok_or(FsmkitError::NoSuchNode(node))?;
        entry.name = name.into();
        Ok(())
    }

    pub fn node(&self, id: u32) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// The automaton owning a node, found by reverse scan.
    pub fn automaton_of_node(&self, node: u32) -> Option<u32> {
        self.automata
            .iter()
            .find(|(_, a)| a.nodes.contains(node))
            .map(|(id, _)| *id)
    }

    /* **********************************  inputs  ********************************** */

    /// Create a global input; without a usable name the smallest free `x<N>`.
    pub fn add_input(&mut self, name: Option<&str>) -> u32 {
        let existing: Vec<String> = self.inputs.values().map(|s| s.name.value.clone()).collect();
        let name = Self::signal_name(name, &existing, INPUT_NAME_PREFIX);
        let id = next_free_id(self.inputs.keys().copied());
        self.inputs.insert(id, InputSignal { name, value: false });
        id
    }

    /// Remove the input with this name and reset every expression using it.
    pub fn remove_input(&mut self, name: &str) -> Result<(), FsmkitError> {
        let id = self
            .input_id_named(name)
            .ok_or_else(|| FsmkitError::NoSuchInput(name.into()))?;
        self.inputs.remove(&id);
        self.sweep_corrupted(|e| e.references_input(id));
        self.reset_to_initial_states();
        Ok(())
    }

    pub fn rename_input(&mut self, old: &str, new: &str) -> Result<(), FsmkitError> {
        let id = self
            .input_id_named(old)
            .ok_or_else(|| FsmkitError::NoSuchInput(old.into()))?;
        let existing: Vec<String> = self.inputs.values().map(|s| s.name.value.clone()).collect();
        let entry = self.inputs.get_mut(&id).unwrap();
        entry.name = names::compute_signal_name(
            new,
            existing.iter().map(|s| s.as_str()),
            &entry.name.value.clone(),
        );
        Ok(())
    }

    /// Set the simulation value of an input.
    pub fn set_input_value(&mut self, name: &str, value: bool) -> Result<(), FsmkitError> {
        let id = self
            .input_id_named(name)
            .ok_or_else(|| FsmkitError::NoSuchInput(name.into()))?;
        self.inputs.get_mut(&id).unwrap().value = value;
        Ok(())
    }

    /// Reset the simulation value of an input to `false`.
    pub fn reset_input_value(&mut self, name: &str) -> Result<(), FsmkitError> {
        self.set_input_value(name, false)
    }

    pub fn input(&self, id: u32) -> Option<&InputSignal> {
        self.inputs.get(&id)
    }

    pub fn inputs(&self) -> impl Iterator<Item = (u32, &InputSignal)> {
        self.inputs.iter().map(|(id, s)| (*id, s))
    }

    fn input_id_named(&self, name: &str) -> Option<u32> {
        self.inputs
            .iter()
            .find(|(_, s)| s.name.value.eq_ignore_ascii_case(name))
            .map(|(id, _)| *id)
    }

    /* *********************************  outputs  ********************************** */

    /// Create a global output; without a usable name the smallest free `y<N>`.
    pub fn add_output(&mut self, name: Option<&str>) -> u32 {
        let existing: Vec<String> = self.outputs.values().map(|n| n.value.clone()).collect();
        let name = Self::signal_name(name, &existing, OUTPUT_NAME_PREFIX);
        let id = next_free_id(self.outputs.keys().copied());
        self.outputs.insert(id, name);
        id
    }

    /// Remove the output with this name.
    ///
    /// Output assignments keyed by it disappear from every node, and any
    /// expression referencing it is reset.
    pub fn remove_output(&mut self, name: &str) -> Result<(), FsmkitError> {
        let id = self
            .output_id_named(name)
            .ok_or_else(|| FsmkitError::NoSuchOutput(name.into()))?;
        self.outputs.remove(&id);
        for node in self.nodes.values_mut() {
            node.outputs.remove(&id);
        }
        self.sweep_corrupted(|e| e.references_output(id));
        self.reset_to_initial_states();
        Ok(())
    }

    pub fn rename_output(&mut self, old: &str, new: &str) -> Result<(), FsmkitError> {
        let id = self
            .output_id_named(old)
            .ok_or_else(|| FsmkitError::NoSuchOutput(old.into()))?;
        let existing: Vec<String> = self.outputs.values().map(|n| n.value.clone()).collect();
        let entry = self.outputs.get_mut(&id).unwrap();
        *entry = names::compute_signal_name(
            new,
            existing.iter().map(|s| s.as_str()),
            &entry.value.clone(),
        );
        Ok(())
    }

    pub fn output(&self, id: u32) -> Option<&NameResult> {
        self.outputs.get(&id)
    }

    pub fn outputs(&self) -> impl Iterator<Item = (u32, &NameResult)> {
        self.outputs.iter().map(|(id, n)| (*id, n))
    }

    fn output_id_named(&self, name: &str) -> Option<u32> {
        self.outputs
            .iter()
            .find(|(_, n)| n.value.eq_ignore_ascii_case(name))
            .map(|(id, _)| *id)
    }

    /* ******************************  control signals  ***************************** */

    /// Create a control signal inside an automaton; its name lives in the
    /// automaton's own namespace (`s<N>` when generated).
    pub fn add_control_signal(
        &mut self,
        automaton: u32,
        name: Option<&str>,
    ) -> Result<u32, FsmkitError> {
        let entry = self
            .automata
            .get_mut(&automaton)
            .ok_or(FsmkitError::NoSuchAutomaton(automaton))?;
        let existing: Vec<String> = entry
            .control_signals
            .values()
            .map(|n| n.value.clone())
            .collect();
        let name = Self::signal_name(name, &existing, CONTROL_SIGNAL_NAME_PREFIX);
        let id = next_free_id(entry.control_signals.keys().copied());
        entry.control_signals.insert(id, name);
        Ok(id)
    }

    /// Remove a control signal from an automaton.
    ///
    /// Every expression using it anywhere in the network is reset, and the
    /// control-signal assignments keyed by it disappear from the automaton's
    /// nodes.
    pub fn remove_control_signal(
        &mut self,
        automaton: u32,
        name: &str,
    ) -> Result<(), FsmkitError> {
        let entry = self
            .automata
            .get_mut(&automaton)
            .ok_or(FsmkitError::NoSuchAutomaton(automaton))?;
        let id = entry
            .control_signal_named(name)
            .ok_or_else(|| FsmkitError::NoSuchControlSignal(name.into()))?;
        entry.control_signals.remove(&id);

        let removed = ControlSignal {
            automaton,
            signal: id,
        };
        let owned: Vec<u32> = self.automata[&automaton].nodes.iter().collect();
        for node in owned {
            if let Some(n) = self.nodes.get_mut(&node) {
                n.control_signals.remove(&id);
            }
        }
        self.sweep_corrupted(|e| e.references_control_signal(removed));
        self.reset_to_initial_states();
        Ok(())
    }

    pub fn rename_control_signal(
        &mut self,
        automaton: u32,
        old: &str,
        new: &str,
    ) -> Result<(), FsmkitError> {
        let entry = self
            .automata
            .get_mut(&automaton)
            .ok_or(FsmkitError::NoSuchAutomaton(automaton))?;
        let id = entry
            .control_signal_named(old)
            .ok_or_else(|| FsmkitError::NoSuchControlSignal(old.into()))?;
        let existing: Vec<String> = entry
            .control_signals
            .values()
            .map(|n| n.value.clone())
            .collect();
        let name = entry.control_signals.get_mut(&id).unwrap();
        *name = names::compute_signal_name(
            new,
            existing.iter().map(|s| s.as_str()),
            &name.value.clone(),
        );
        Ok(())
    }

    /* ******************************  node equations  ****************************** */

    /// Assign an output equation inside a node.
    ///
    /// The equation may read control signals but no z-variables. A rejected
    /// equation keeps the previously assigned one (or the constant `1` for a
    /// fresh assignment) and records the error on the assignment.
    pub fn set_output_equation(
        &mut self,
        node: u32,
        output: &str,
        equation: &str,
    ) -> Result<(), FsmkitError> {
        let automaton = self
            .automaton_of_node(node)
            .ok_or(FsmkitError::NoSuchNode(node))?;
        let id = self
            .output_id_named(output)
            .ok_or_else(|| FsmkitError::NoSuchOutput(output.into()))?;
        let names = self.custom_names();
        let fallback = self.nodes[&node]
            .outputs
            .get(&id)
            .map(|e| e.expr.clone())
            .unwrap_or_else(|| Expr::from(true));
        let result = compute_equation(
            equation,
            &names,
            EquationContext::OutputEquation { automaton },
            &fallback,
        );
        self.nodes.get_mut(&node).unwrap().outputs.insert(id, result);
        self.reset_to_initial_states();
        Ok(())
    }

    /// Drop the output assignment of a node (the output falls back to 0
    /// in this state).
    pub fn reset_output_equation(&mut self, node: u32, output: &str) -> Result<(), FsmkitError> {
        if !self.nodes.contains_key(&node) {
            return Err(FsmkitError::NoSuchNode(node));
        }
        let id = self
            .output_id_named(output)
            .ok_or_else(|| FsmkitError::NoSuchOutput(output.into()))?;
        self.nodes.get_mut(&node).unwrap().outputs.remove(&id);
        self.reset_to_initial_states();
        Ok(())
    }

    /// Assign a control-signal equation inside a node.
    ///
    /// The equation may read inputs only: neither z-variables nor control
    /// signals of any automaton, which breaks dependency cycles between
    /// control signals by construction.
    pub fn set_control_signal_equation(
        &mut self,
        node: u32,
        signal: &str,
        equation: &str,
    ) -> Result<(), FsmkitError> {
        let automaton = self
            .automaton_of_node(node)
            .ok_or(FsmkitError::NoSuchNode(node))?;
        let id = self.automata[&automaton]
            .control_signal_named(signal)
            .ok_or_else(|| FsmkitError::NoSuchControlSignal(signal.into()))?;
        let names = self.custom_names();
        let fallback = self.nodes[&node]
            .control_signals
            .get(&id)
            .map(|e| e.expr.clone())
            .unwrap_or_else(|| Expr::from(true));
        let result = compute_equation(
            equation,
            &names,
            EquationContext::ControlSignalEquation { automaton },
            &fallback,
        );
        self.nodes
            .get_mut(&node)
            .unwrap()
            .control_signals
            .insert(id, result);
        self.reset_to_initial_states();
        Ok(())
    }

    /// Drop the control-signal assignment of a node.
    pub fn reset_control_signal_equation(
        &mut self,
        node: u32,
        signal: &str,
    ) -> Result<(), FsmkitError> {
        let automaton = self
            .automaton_of_node(node)
            .ok_or(FsmkitError::NoSuchNode(node))?;
        let id = self.automata[&automaton]
            .control_signal_named(signal)
            .ok_or_else(|| FsmkitError::NoSuchControlSignal(signal.into()))?;
        self.nodes
            .get_mut(&node)
            .unwrap()
            .control_signals
            .remove(&id);
        self.reset_to_initial_states();
        Ok(())
    }

    /* ********************************  transitions  ******************************* */

    /// Create a transition between two nodes of an automaton, or overwrite
    /// the condition of the existing edge between them.
    ///
    /// Without a condition the edge carries the constant `1`. The condition
    /// must be decidable before the clock edge: no z-variables, and no
    /// control signal owned by the automaton itself. A rejected condition
    /// keeps the previous one with the error recorded on the edge.
    pub fn add_transition(
        &mut self,
        automaton: u32,
        from: u32,
        to: u32,
        condition: Option<&str>,
    ) -> Result<u32, FsmkitError> {
        if !self.automata.contains_key(&automaton) {
            return Err(FsmkitError::NoSuchAutomaton(automaton));
        }
        for node in [from, to] {
            if !self.nodes.contains_key(&node) {
                return Err(FsmkitError::NoSuchNode(node));
            }
        }
        if self.automaton_of_node(from) != Some(automaton)
            || self.automaton_of_node(to) != Some(automaton)
        {
            return Err(FsmkitError::CrossAutomatonTransition(from, to));
        }

        let names = self.custom_names();
        let context = EquationContext::TransitionCondition { automaton };

        if let Some(existing) = self.transition_between(from, to) {
            if let Some(text) = condition {
                let fallback = self.transitions[&existing].condition.expr.clone();
                let result = compute_equation(text, &names, context, &fallback);
                self.transitions.get_mut(&existing).unwrap().condition = result;
            }
            self.reset_to_initial_states();
            return Ok(existing);
        }

        let result = match condition {
            None => ExprResult::ok(Expr::from(true)),
            Some(text) => compute_equation(text, &names, context, &Expr::from(true)),
        };
        let id = next_free_id(self.transitions.keys().copied());
        self.transitions.insert(
            id,
            Transition {
                from,
                to,
                condition: result,
            },
        );
        self.automata
            .get_mut(&automaton)
            .unwrap()
            .transitions
            .insert(id);
        self.reset_to_initial_states();
        Ok(id)
    }

    /// Change the condition of the edge between two nodes.
    ///
    /// Empty (or blank) text deletes the edge; text on a missing edge
    /// creates it.
    pub fn change_transition_condition(
        &mut self,
        from: u32,
        to: u32,
        condition: &str,
    ) -> Result<(), FsmkitError> {
        let automaton = self
            .automaton_of_node(from)
            .ok_or(FsmkitError::NoSuchNode(from))?;
        if condition.trim().is_empty() {
            if let Some(id) = self.transition_between(from, to) {
                self.remove_transition(id)?;
            }
            return Ok(());
        }
        self.add_transition(automaton, from, to, Some(condition))?;
        Ok(())
    }

    /// Remove a transition.
    pub fn remove_transition(&mut self, id: u32) -> Result<(), FsmkitError> {
        self.transitions
            .remove(&id)
            .ok_or(FsmkitError::NoSuchTransition(id))?;
        for automaton in self.automata.values_mut() {
            automaton.transitions.remove(id);
        }
        self.reset_to_initial_states();
        Ok(())
    }

    pub fn transition(&self, id: u32) -> Option<&Transition> {
        self.transitions.get(&id)
    }

    pub fn transitions(&self) -> impl Iterator<Item = (u32, &Transition)> {
        self.transitions.iter().map(|(id, t)| (*id, t))
    }

    /// The edge between two nodes, at most one per ordered pair.
    pub fn transition_between(&self, from: u32, to: u32) -> Option<u32> {
        self.transitions
            .iter()
            .find(|(_, t)| t.from == from && t.to == to)
            .map(|(id, _)| *id)
    }

    /* *********************************  operators  ******************************** */

    /// Change one of the four operator symbols.
    ///
    /// An invalid or colliding symbol keeps the current one, with the error
    /// recorded on the operator.
    pub fn set_operator(&mut self, kind: OperatorKind, symbol: &str) {
        match names::check_operator_symbol(&self.operators, symbol, kind) {
            Ok(()) => *self.operators.get_mut(kind) = NameResult::ok(symbol),
            Err(e) => self.operators.get_mut(kind).error = Some(e),
        }
    }

    pub fn operators(&self) -> &Operators {
        &self.operators
    }

    /* ****************************  evaluation & views  **************************** */

    /// Snapshot of every user-visible name, for rendering and parsing.
    pub fn custom_names(&self) -> CustomNames {
        CustomNames {
            automata: self
                .automata
                .iter()
                .map(|(id, a)| (*id, a.name.value.clone()))
                .collect(),
            inputs: self
                .inputs
                .iter()
                .map(|(id, s)| (*id, s.name.value.clone()))
                .collect(),
            outputs: self
                .outputs
                .iter()
                .map(|(id, n)| (*id, n.value.clone()))
                .collect(),
            control_signals: self
                .automata
                .iter()
                .flat_map(|(aid, a)| {
                    a.control_signals.iter().map(|(sid, n)| {
                        (
                            ControlSignal {
                                automaton: *aid,
                                signal: *sid,
                            },
                            n.value.clone(),
                        )
                    })
                })
                .collect(),
            operators: self.operators.clone(),
        }
    }

    /// Render an expression with the current names and operator symbols.
    pub fn render(&self, expr: &Expr) -> String {
        self.custom_names().render(expr)
    }

    /// The z-variables an automaton currently needs (for diagram captions).
    pub fn z_variables(&self, automaton: u32) -> Result<Vec<ZVariable>, FsmkitError> {
        if !self.automata.contains_key(&automaton) {
            return Err(FsmkitError::NoSuchAutomaton(automaton));
        }
        let bits = needed_bits(self.max_state_number(automaton));
        Ok((0..bits)
            .map(|bit| ZVariable { automaton, bit })
            .collect())
    }

    /// The equations derived from one automaton's graph.
    pub fn equation_set(&self, automaton: u32) -> Result<EquationSet, FsmkitError> {
        let entry = self
            .automata
            .get(&automaton)
            .ok_or(FsmkitError::NoSuchAutomaton(automaton))?;
        let nodes: Vec<StructureNode> = entry
            .nodes
            .iter()
            .filter_map(|id| self.nodes.get(&id))
            .map(|n| StructureNode {
                state: n.state_number.value,
                outputs: n.outputs.iter().map(|(id, e)| (*id, &e.expr)).collect(),
                control_signals: n
                    .control_signals
                    .iter()
                    .map(|(id, e)| (*id, &e.expr))
                    .collect(),
            })
            .collect();
        let transitions: Vec<StructureTransition> = entry
            .transitions
            .iter()
            .filter_map(|id| self.transitions.get(&id))
            .filter_map(|t| {
                let from = self.nodes.get(&t.from)?;
                let to = self.nodes.get(&t.to)?;
                Some(StructureTransition {
                    from_state: from.state_number.value,
                    to_state: to.state_number.value,
                    condition: &t.condition.expr,
                })
            })
            .collect();
        Ok(compute_equation_set(automaton, &nodes, &transitions))
    }

    /// The equations of every automaton.
    pub fn equation_sets(&self) -> Vec<EquationSet> {
        self.automata
            .keys()
            .filter_map(|id| self.equation_set(*id).ok())
            .collect()
    }

    /// The directly observable layer: input values and encoded current states.
    pub fn base_assignment(&self) -> BaseAssignment {
        let mut base = BaseAssignment::default();
        for (id, signal) in &self.inputs {
            base.set_input(*id, signal.value);
        }
        for (id, automaton) in &self.automata {
            let bits = needed_bits(self.max_state_number(*id));
            for bit in 0..bits {
                base.set_z_variable(
                    ZVariable {
                        automaton: *id,
                        bit,
                    },
                    bit_needed(automaton.current_state, bit),
                );
            }
        }
        base
    }

    /// Base layer plus the evaluated control signals.
    pub fn derived_assignment(&self) -> DerivedAssignment {
        DerivedAssignment::from_base(self.base_assignment(), &self.equation_sets())
    }

    /// The full evaluation of the network, as the UI renders it.
    pub fn full_assignment(&self) -> FullAssignment {
        let sets = self.equation_sets();
        let derived = DerivedAssignment::from_base(self.base_assignment(), &sets);
        FullAssignment::from_derived(derived, &sets)
    }

    /// Advance every automaton by one synchronous clock step.
    ///
    /// All next states are computed from one snapshot of the prior state
    /// before any of them is applied: no automaton sees another automaton's
    /// post-tick state during the same tick.
    pub fn advance_clock(&mut self) {
        let sets = self.equation_sets();
        let derived = DerivedAssignment::from_base(self.base_assignment(), &sets);
        let next: Vec<(u32, u32)> = sets
            .iter()
            .map(|set| (set.automaton, next_state_from_equations(&set.z, &derived)))
            .collect();
        for (id, state) in next {
            if let Some(automaton) = self.automata.get_mut(&id) {
                automaton.current_state = state;
            }
        }
    }

    /// Put every automaton back into its initial state.
    ///
    /// Called at the end of every structural mutation: an edit invalidates
    /// any simulation in progress.
    pub fn reset_to_initial_states(&mut self) {
        for automaton in self.automata.values_mut() {
            automaton.current_state = automaton.initial_state.value;
        }
    }

    /* **************************  expression maintenance  ************************** */

    /// Minimize every stored expression in place.
    pub fn minimize_all(&mut self) {
        self.map_expressions(|e| e.minimize());
    }

    /// Drop the recorded explicit brackets of every stored expression.
    pub fn reset_all_brackets(&mut self) {
        self.map_expressions(|e| e.reset_brackets());
    }

    fn map_expressions(&mut self, f: impl Fn(&Expr) -> Expr) {
        for transition in self.transitions.values_mut() {
            transition.condition.expr = f(&transition.condition.expr);
        }
        for node in self.nodes.values_mut() {
            for result in node
                .outputs
                .values_mut()
                .chain(node.control_signals.values_mut())
            {
                result.expr = f(&result.expr);
            }
        }
    }

    /* *********************************  internals  ******************************** */

    // Reset every expression matching the predicate to the constant 1.
    // A partially valid remainder of a deleted-variable expression has no
    // well-defined meaning, so the whole tree is replaced.
    fn sweep_corrupted(&mut self, corrupted: impl Fn(&Expr) -> bool) {
        for transition in self.transitions.values_mut() {
            if corrupted(&transition.condition.expr) {
                transition.condition = ExprResult::ok(Expr::from(true));
            }
        }
        for node in self.nodes.values_mut() {
            for result in node
                .outputs
                .values_mut()
                .chain(node.control_signals.values_mut())
            {
                if corrupted(&result.expr) {
                    *result = ExprResult::ok(Expr::from(true));
                }
            }
        }
    }

    // Force the initial state back to 0 when the encoding no longer covers it.
    fn revalidate_initial_state(&mut self, automaton: u32) {
        let bound = max_representable(needed_bits(self.max_state_number(automaton)));
        if let Some(entry) = self.automata.get_mut(&automaton) {
            if entry.initial_state.value > bound {
                let old = entry.initial_state.value;
                entry.initial_state = NumberResult::with_error(0, NumberError::Reset(old));
            }
        }
    }

    fn max_state_number(&self, automaton: u32) -> u32 {
        self.automata
            .get(&automaton)
            .map(|a| {
                a.nodes
                    .iter()
                    .filter_map(|id| self.nodes.get(&id))
                    .map(|n| n.state_number.value)
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    fn state_numbers(&self, automaton: u32) -> Vec<u32> {
        self.automata
            .get(&automaton)
            .map(|a| {
                a.nodes
                    .iter()
                    .filter_map(|id| self.nodes.get(&id))
                    .map(|n| n.state_number.value)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn signal_name(candidate: Option<&str>, existing: &[String], prefix: &str) -> NameResult {
        let mut n = 0;
        let generated = loop {
            let name = format!("{}{}", prefix, n);
            if names::is_usable_signal_name(existing.iter().map(|s| s.as_str()), &name) {
                break name;
            }
            n += 1;
        };
        match candidate {
            None => NameResult::ok(generated),
            Some(name) => {
                names::compute_signal_name(name, existing.iter().map(|s| s.as_str()), &generated)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExpressionError, NameError};
    use crate::expr::ExprNode;

    #[test]
    fn ids_are_recycled_smallest_first() {
        let mut net = Network::new();
        let a0 = net.add_automaton(None);
        let a1 = net.add_automaton(None);
        let a2 = net.add_automaton(None);
        assert_eq!((a0, a1, a2), (0, 1, 2));

        net.remove_automaton(a1).unwrap();
        assert_eq!(net.add_automaton(None), 1);
        assert_eq!(net.add_automaton(None), 3);
    }

    #[test]
    fn generated_names_fill_gaps() {
        let mut net = Network::new();
        net.add_input(Some("x1"));
        let id = net.add_input(None);
        assert_eq!(net.input(id).unwrap().name().value, "x0");
        let id = net.add_input(None);
        assert_eq!(net.input(id).unwrap().name().value, "x2");
    }

    #[test]
    fn duplicate_signal_name_keeps_generated_one() {
        let mut net = Network::new();
        net.add_input(Some("x0"));
        let id = net.add_input(Some("X0"));
        let signal = net.input(id).unwrap();
        assert_eq!(signal.name().value, "x1");
        assert!(matches!(signal.name().error, Some(NameError::Duplicate(_))));
    }

    #[test]
    fn rename_falls_back_on_conflict() {
        let mut net = Network::new();
        net.add_input(Some("go"));
        net.add_input(Some("halt"));
        net.rename_input("halt", "GO").unwrap();
        let (_, signal) = net.inputs().nth(1).unwrap();
        assert_eq!(signal.name().value, "halt");
        assert!(matches!(signal.name().error, Some(NameError::Duplicate(_))));
    }

    #[test]
    fn corruption_sweep_after_input_removal() {
        let mut net = Network::new();
        net.add_input(Some("x0"));
        net.add_input(Some("other"));
        net.add_output(Some("y0"));

        let a = net.add_automaton(None);
        let n_a = net.add_node(a, None).unwrap();
        net.set_output_equation(n_a, "y0", "x0").unwrap();

        let b = net.add_automaton(None);
        let n_b = net.add_node(b, None).unwrap();
        net.set_output_equation(n_b, "y0", "other").unwrap();

        net.remove_input("x0").unwrap();

        // the equation referencing x0 was reset to 1 ...
        let reset = net.node(n_a).unwrap().output_equation(0).unwrap();
        assert_eq!(reset.expr, Expr::from(true));
        // ... the unrelated one on automaton B is untouched
        let kept = net.node(n_b).unwrap().output_equation(0).unwrap();
        assert!(matches!(kept.expr.node(), ExprNode::Input(_)));
    }

    #[test]
    fn removing_an_automaton_resets_foreign_references() {
        let mut net = Network::new();
        let a = net.add_automaton(Some("a"));
        let n_a = net.add_node(a, None).unwrap();
        net.add_control_signal(a, Some("sig")).unwrap();
        net.set_control_signal_equation(n_a, "sig", "1").unwrap();

        let b = net.add_automaton(Some("b"));
        let n_b0 = net.add_node(b, None).unwrap();
        let n_b1 = net.add_node(b, None).unwrap();
        net.add_transition(b, n_b0, n_b1, Some("a.sig")).unwrap();

        net.remove_automaton(a).unwrap();
        let t = net.transition_between(n_b0, n_b1).unwrap();
        assert_eq!(net.transition(t).unwrap().condition().expr, Expr::from(true));
    }

    #[test]
    fn shrinking_encoding_resets_initial_state() {
        let mut net = Network::new();
        let a = net.add_automaton(None);
        net.add_node(a, Some(0)).unwrap();
        net.add_node(a, Some(1)).unwrap();
        let top = net.add_node(a, Some(2)).unwrap();

        // three states need 2 bits, so state 2 is a valid initial state
        net.set_initial_state(a, 2).unwrap();
        assert_eq!(net.automaton(a).unwrap().initial_state().value, 2);

        // dropping the node with state 2 shrinks the bound to 1
        net.remove_node(top).unwrap();
        let initial = net.automaton(a).unwrap().initial_state();
        assert_eq!(initial.value, 0);
        assert_eq!(initial.error, Some(NumberError::Reset(2)));
    }

    #[test]
    fn initial_state_beyond_the_encoding_is_rejected() {
        let mut net = Network::new();
        let a = net.add_automaton(None);
        net.add_node(a, Some(0)).unwrap();
        net.add_node(a, Some(1)).unwrap();

        // 1 bit: states 0 and 1 are representable, 2 is not
        net.set_initial_state(a, 2).unwrap();
        let initial = net.automaton(a).unwrap().initial_state();
        assert_eq!(initial.value, 0);
        assert_eq!(initial.error, Some(NumberError::OutOfRange(2)));

        // a representable state without a node of its own is accepted
        net.add_node(a, Some(2)).unwrap();
        net.set_initial_state(a, 3).unwrap();
        assert_eq!(net.automaton(a).unwrap().initial_state().value, 3);
    }

    #[test]
    fn duplicate_state_numbers_are_rejected() {
        let mut net = Network::new();
        let a = net.add_automaton(None);
        net.add_node(a, Some(0)).unwrap();
        let n1 = net.add_node(a, Some(0)).unwrap();

        // the clash fell back to the next free number
        let node = net.node(n1).unwrap();
        assert_eq!(node.state_number().value, 1);
        assert_eq!(node.state_number().error, Some(NumberError::Duplicate(0)));

        net.set_state_number(n1, 0).unwrap();
        let node = net.node(n1).unwrap();
        assert_eq!(node.state_number().value, 1);
        assert_eq!(node.state_number().error, Some(NumberError::Duplicate(0)));

        net.set_state_number(n1, 5).unwrap();
        assert_eq!(net.node(n1).unwrap().state_number().value, 5);
    }

    #[test]
    fn transition_conditions_reject_z_variables() {
        let mut net = Network::new();
        net.add_input(Some("go"));
        let a = net.add_automaton(None);
        let n0 = net.add_node(a, None).unwrap();
        let n1 = net.add_node(a, None).unwrap();

        let t = net.add_transition(a, n0, n1, Some("z0 & go")).unwrap();
        let condition = net.transition(t).unwrap().condition();
        assert_eq!(condition.expr, Expr::from(true));
        assert!(matches!(
            condition.error,
            Some(ExpressionError::DisallowedZVariable(_))
        ));

        // a failed overwrite keeps the previous condition
        net.add_transition(a, n0, n1, Some("go")).unwrap();
        net.add_transition(a, n0, n1, Some("z0")).unwrap();
        let condition = net.transition(t).unwrap().condition();
        assert!(matches!(condition.expr.node(), ExprNode::Input(_)));
        assert!(condition.error.is_some());
    }

    #[test]
    fn transitions_stay_within_one_automaton() {
        let mut net = Network::new();
        let a = net.add_automaton(None);
        let b = net.add_automaton(None);
        let n_a = net.add_node(a, None).unwrap();
        let n_b = net.add_node(b, None).unwrap();

        assert_eq!(
            net.add_transition(a, n_a, n_b, None),
            Err(FsmkitError::CrossAutomatonTransition(n_a, n_b))
        );
    }

    #[test]
    fn empty_condition_deletes_the_edge() {
        let mut net = Network::new();
        net.add_input(Some("go"));
        let a = net.add_automaton(None);
        let n0 = net.add_node(a, None).unwrap();
        let n1 = net.add_node(a, None).unwrap();

        net.change_transition_condition(n0, n1, "go").unwrap();
        assert!(net.transition_between(n0, n1).is_some());

        net.change_transition_condition(n0, n1, "   ").unwrap();
        assert!(net.transition_between(n0, n1).is_none());
    }

    #[test]
    fn clock_step_advances_the_whole_network() {
        let mut net = Network::new();
        net.add_input(Some("go"));
        let a = net.add_automaton(None);
        let off = net.add_node(a, Some(0)).unwrap();
        let on = net.add_node(a, Some(1)).unwrap();
        net.add_transition(a, off, on, Some("go")).unwrap();
        net.add_transition(a, on, on, Some("go")).unwrap();
        net.add_transition(a, on, off, Some("/go")).unwrap();

        assert_eq!(net.automaton(a).unwrap().current_state(), 0);

        net.set_input_value("go", true).unwrap();
        net.advance_clock();
        assert_eq!(net.automaton(a).unwrap().current_state(), 1);
        net.advance_clock();
        assert_eq!(net.automaton(a).unwrap().current_state(), 1);

        net.set_input_value("go", false).unwrap();
        net.advance_clock();
        assert_eq!(net.automaton(a).unwrap().current_state(), 0);
    }

    #[test]
    fn structural_edits_reset_the_simulation() {
        let mut net = Network::new();
        net.add_input(Some("go"));
        let a = net.add_automaton(None);
        let n0 = net.add_node(a, Some(0)).unwrap();
        let n1 = net.add_node(a, Some(1)).unwrap();
        net.add_transition(a, n0, n1, Some("go")).unwrap();

        net.set_input_value("go", true).unwrap();
        net.advance_clock();
        assert_eq!(net.automaton(a).unwrap().current_state(), 1);

        // any structural change puts every automaton back to its initial state
        net.add_automaton(None);
        assert_eq!(net.automaton(a).unwrap().current_state(), 0);
    }

    #[test]
    fn outputs_and_control_signals_evaluate_in_layers() {
        let mut net = Network::new();
        net.add_input(Some("go"));
        let run = net.add_output(Some("run"));

        let a = net.add_automaton(Some("main"));
        let n0 = net.add_node(a, Some(0)).unwrap();
        net.add_control_signal(a, Some("busy")).unwrap();
        net.set_control_signal_equation(n0, "busy", "go").unwrap();
        // the output reads the control signal through the derived layer
        net.set_output_equation(n0, "run", "main.busy").unwrap();

        let full = net.full_assignment();
        assert!(!full.output(run));

        net.set_input_value("go", true).unwrap();
        let full = net.full_assignment();
        assert!(full.output(run));
        assert!(full.control_signal(ControlSignal {
            automaton: a,
            signal: 0
        }));
    }

    #[test]
    fn same_output_from_two_automata_is_or_combined() {
        let mut net = Network::new();
        net.add_input(Some("go"));
        let y = net.add_output(Some("y0"));

        let a = net.add_automaton(None);
        let n_a = net.add_node(a, None).unwrap();
        net.set_output_equation(n_a, "y0", "0").unwrap();

        let b = net.add_automaton(None);
        let n_b = net.add_node(b, None).unwrap();
        net.set_output_equation(n_b, "y0", "go").unwrap();

        net.set_input_value("go", true).unwrap();
        assert!(net.full_assignment().output(y));
    }

    #[test]
    fn changing_an_operator_symbol_changes_parsing_and_rendering() {
        let mut net = Network::new();
        net.add_input(Some("a"));
        net.add_input(Some("b"));
        let auto = net.add_automaton(None);
        let n0 = net.add_node(auto, None).unwrap();
        let n1 = net.add_node(auto, None).unwrap();

        net.set_operator(OperatorKind::And, "&&");
        let t = net.add_transition(auto, n0, n1, Some("a && b")).unwrap();
        let rendered = net.render(&net.transition(t).unwrap().condition().expr);
        assert_eq!(rendered, "a && b");

        // the colliding candidate keeps the current symbol and records it
        net.set_operator(OperatorKind::Or, "&");
        assert_eq!(net.operators().or.value, "+");
        assert!(net.operators().or.error.is_some());
    }

    #[test]
    fn removing_a_control_signal_cleans_assignments_and_expressions() {
        let mut net = Network::new();
        net.add_input(Some("go"));
        net.add_output(Some("y0"));
        let a = net.add_automaton(Some("a"));
        let n_a = net.add_node(a, None).unwrap();
        net.add_control_signal(a, Some("sig")).unwrap();
        net.set_control_signal_equation(n_a, "sig", "go").unwrap();

        let b = net.add_automaton(Some("b"));
        let n_b = net.add_node(b, None).unwrap();
        net.set_output_equation(n_b, "y0", "a.sig").unwrap();

        net.remove_control_signal(a, "sig").unwrap();

        assert!(net.node(n_a).unwrap().control_signal_equation(0).is_none());
        let swept = net.node(n_b).unwrap().output_equation(0).unwrap();
        assert_eq!(swept.expr, Expr::from(true));
    }

    #[test]
    fn minimize_all_preserves_the_full_assignment() {
        let mut net = Network::new();
        net.add_input(Some("a"));
        net.add_input(Some("b"));
        let y = net.add_output(Some("y0"));
        let auto = net.add_automaton(None);
        let n0 = net.add_node(auto, None).unwrap();
        net.set_output_equation(n0, "y0", "a & b + a & /b").unwrap();

        net.set_input_value("a", true).unwrap();
        let before = net.full_assignment().output(y);
        net.minimize_all();
        assert_eq!(net.full_assignment().output(y), before);

        // the redundant b disappeared
        let minimized = &net.node(n0).unwrap().output_equation(0).unwrap().expr;
        assert_eq!(minimized.inputs(), vec![0]);
    }

    #[test]
    fn z_variable_listing_follows_the_graph() {
        let mut net = Network::new();
        let a = net.add_automaton(None);
        assert_eq!(net.z_variables(a).unwrap().len(), 1);
        net.add_node(a, Some(0)).unwrap();
        net.add_node(a, Some(1)).unwrap();
        assert_eq!(net.z_variables(a).unwrap().len(), 1);
        net.add_node(a, Some(2)).unwrap();
        assert_eq!(net.z_variables(a).unwrap().len(), 2);
    }
}
