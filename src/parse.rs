//! Parsing of typed-in equations.
//!
//! Equations are written with the *current* operator symbols. Because symbol
//! characters and name characters are disjoint classes (see [crate::names]),
//! the text can be canonicalised — every custom symbol replaced by a fixed
//! internal one — before it reaches the grammar, which therefore stays
//! static. Explicit parentheses beyond the ones operator precedence requires
//! are recorded as bracket counters on the parsed nodes, so the typed shape
//! survives a render round-trip.
//!
//! Name resolution depends on the context the equation is written in: a bare
//! name is an input, `automaton.signal` is a control signal and `z<i>` is a
//! z-variable of the context automaton. The context also decides which
//! variable kinds are allowed at all; a rejected equation reports one
//! [ExpressionError] and leaves the previously assigned expression in place.

use once_cell::sync::Lazy;
use pest::{iterators::Pair, Parser};
use regex::Regex;

use crate::efmt::{CustomNames, OperatorKind};
use crate::error::{ExprResult, ExpressionError};
use crate::expr::{Expr, ExprNode, Operator, ZVariable};

#[derive(Parser)]
#[grammar_inline = r####"
equation = { SOI ~ expr ~ EOI }
expr     = _{ disj }
disj     =  { conj ~ (dop ~ conj)* }
dop      =  { "+" | "*" }
conj     =  { term ~ ("&" ~ term)* }
term     = _{ neg | grp }
neg      =  { "/" ~ term }
grp      = _{ bt | bf | paren | qlit | lit }
paren    =  { "(" ~ expr ~ ")" }
bt       =  { "1" }
bf       =  { "0" }
qlit     = ${ uid ~ "." ~ uid }
lit      = @{ uid }
uid      = @{ ASCII_ALPHA ~ (ASCII_ALPHANUMERIC | "_" | "{" | "}")* }

WHITESPACE = _{ " " | "\t" }
"####]
struct EquationParser;

static RE_Z_FULL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^z([0-9]+)$").unwrap());

/// Where an equation is being assigned, deciding name scope and allowed kinds.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EquationContext {
    /// Condition of a transition inside the given automaton: no z-variables,
    /// no control signals owned by that same automaton.
    TransitionCondition { automaton: u32 },
    /// Control-signal equation of a node of the given automaton: no
    /// z-variables and no control signals at all.
    ControlSignalEquation { automaton: u32 },
    /// Output equation of a node of the given automaton: no z-variables.
    OutputEquation { automaton: u32 },
}

impl EquationContext {
    fn automaton(self) -> u32 {
        match self {
            EquationContext::TransitionCondition { automaton }
            | EquationContext::ControlSignalEquation { automaton }
            | EquationContext::OutputEquation { automaton } => automaton,
        }
    }
}

/// Parse an equation in the given context.
pub fn parse_equation(
    text: &str,
    names: &CustomNames,
    context: EquationContext,
) -> Result<Expr, ExpressionError> {
    let canonical = canonicalize(text, names);
    let mut parsed = EquationParser::parse(Rule::equation, &canonical)
        .map_err(|_| ExpressionError::Syntax(text.into()))?;
    let equation = parsed.next().ok_or_else(|| ExpressionError::Syntax(text.into()))?;
    let inner = equation
        .into_inner()
        .next()
        .ok_or_else(|| ExpressionError::Syntax(text.into()))?;
    let expr = load_expr(inner, text, names, context)?;
    check_context(&expr, text, context)?;
    Ok(expr)
}

/// Parse an equation, falling back to the previously assigned expression.
///
/// This is the entry point the store uses: the result can be written back
/// unconditionally, carrying either the new expression or the old one with
/// the recorded error.
pub fn compute_equation(
    text: &str,
    names: &CustomNames,
    context: EquationContext,
    fallback: &Expr,
) -> ExprResult {
    match parse_equation(text, names, context) {
        Ok(expr) => ExprResult::ok(expr),
        Err(e) => ExprResult::with_error(fallback.clone(), e),
    }
}

/// Replace the current operator symbols by the canonical grammar alphabet.
///
/// Symbols are matched longest-first; a canonical character that does not
/// correspond to a live symbol is neutralised so it cannot be mistaken for
/// an operator the user did not type.
fn canonicalize(src: &str, names: &CustomNames) -> String {
    let operators = names.operators();
    let mut symbols = [
        (operators.symbol(OperatorKind::And), '&'),
        (operators.symbol(OperatorKind::Or), '+'),
        (operators.symbol(OperatorKind::Not), '/'),
        (operators.symbol(OperatorKind::Xor), '*'),
    ];
    symbols.sort_by_key(|(s, _)| std::cmp::Reverse(s.len()));

    let mut out = String::with_capacity(src.len());
    let mut rest = src;
    'scan: while !rest.is_empty() {
        for (symbol, canonical) in &symbols {
            if !symbol.is_empty() && rest.starts_with(symbol) {
                out.push(*canonical);
                rest = &rest[symbol.len()..];
                continue 'scan;
            }
        }
        let c = rest.chars().next().unwrap();
        out.push(match c {
            '&' | '+' | '/' | '*' => '#',
            other => other,
        });
        rest = &rest[c.len_utf8()..];
    }
    out
}

fn load_expr(
    pair: Pair<Rule>,
    text: &str,
    names: &CustomNames,
    context: EquationContext,
) -> Result<Expr, ExpressionError> {
    match pair.as_rule() {
        Rule::bt => Ok(Expr::from(true)),
        Rule::bf => Ok(Expr::from(false)),
        Rule::lit => load_name(pair.as_str(), text, names, context),
        Rule::qlit => load_qualified(pair, text, names),
        Rule::neg => {
            let inner = pair
                .into_inner()
                .next()
                .ok_or_else(|| ExpressionError::Syntax(text.into()))?;
            Ok(Expr::negation(load_expr(inner, text, names, context)?))
        }
        Rule::paren => {
            let inner = pair
                .into_inner()
                .next()
                .ok_or_else(|| ExpressionError::Syntax(text.into()))?;
            Ok(load_expr(inner, text, names, context)?.bracketed())
        }
        Rule::conj => {
            let mut inner = pair.into_inner();
            let first = inner
                .next()
                .ok_or_else(|| ExpressionError::Syntax(text.into()))?;
            let mut expr = load_expr(first, text, names, context)?;
            for next in inner {
                let rhs = load_expr(next, text, names, context)?;
                expr = join_literal(Operator::And, expr, rhs);
            }
            Ok(expr)
        }
        Rule::disj => {
            let mut inner = pair.into_inner();
            let first = inner
                .next()
                .ok_or_else(|| ExpressionError::Syntax(text.into()))?;
            let mut expr = load_expr(first, text, names, context)?;
            while let Some(op_pair) = inner.next() {
                let op = match op_pair.as_str() {
                    "+" => Operator::Or,
                    _ => Operator::Xor,
                };
                let rhs_pair = inner
                    .next()
                    .ok_or_else(|| ExpressionError::Syntax(text.into()))?;
                let rhs = load_expr(rhs_pair, text, names, context)?;
                expr = join_literal(op, expr, rhs);
            }
            Ok(expr)
        }
        _ => Err(ExpressionError::Syntax(text.into())),
    }
}

// Join two parsed operands without folding constants: the typed shape is kept.
// Successive identical operators collapse into one n-ary node.
fn join_literal(op: Operator, lhs: Expr, rhs: Expr) -> Expr {
    let mut children = match lhs.node() {
        ExprNode::Operation(o, existing) if *o == op && lhs.brackets() == 0 => {
            existing.as_ref().clone()
        }
        _ => vec![lhs],
    };
    children.push(rhs);
    match op {
        Operator::And => Expr::and(children),
        Operator::Or => Expr::or(children),
        Operator::Xor => Expr::xor(children),
    }
}

fn load_name(
    name: &str,
    text: &str,
    names: &CustomNames,
    context: EquationContext,
) -> Result<Expr, ExpressionError> {
    if let Some(cap) = RE_Z_FULL.captures(name) {
        let bit: u32 = cap
            .get(1)
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(|| ExpressionError::UnknownVariable {
                expression: text.into(),
                name: name.into(),
            })?;
        return Ok(Expr::z_variable(ZVariable {
            automaton: context.automaton(),
            bit,
        }));
    }
    if let Some(id) = names.input_named(name) {
        return Ok(Expr::input(id));
    }
    if names.output_named(name).is_some() {
        return Err(ExpressionError::OutputVariable {
            expression: text.into(),
            name: name.into(),
        });
    }
    Err(ExpressionError::UnknownVariable {
        expression: text.into(),
        name: name.into(),
    })
}

fn load_qualified(
    pair: Pair<Rule>,
    text: &str,
    names: &CustomNames,
) -> Result<Expr, ExpressionError> {
    let full = pair.as_str().to_string();
    let mut inner = pair.into_inner();
    let unknown = |name: String| ExpressionError::UnknownVariable {
        expression: text.into(),
        name,
    };
    let automaton_name = inner.next().ok_or_else(|| unknown(full.clone()))?.as_str();
    let signal_name = inner.next().ok_or_else(|| unknown(full.clone()))?.as_str();
    let automaton = names
        .automaton_named(automaton_name)
        .ok_or_else(|| unknown(full.clone()))?;
    let cs = names
        .control_signal_named(automaton, signal_name)
        .ok_or_else(|| unknown(full.clone()))?;
    Ok(Expr::control_signal(cs))
}

fn check_context(
    expr: &Expr,
    text: &str,
    context: EquationContext,
) -> Result<(), ExpressionError> {
    if expr.contains_z_variables() {
        return Err(ExpressionError::DisallowedZVariable(text.into()));
    }
    match context {
        EquationContext::TransitionCondition { automaton } => {
            if expr
                .control_signals()
                .iter()
                .any(|cs| cs.automaton == automaton)
            {
                return Err(ExpressionError::OwnControlSignal(text.into()));
            }
        }
        EquationContext::ControlSignalEquation { .. } => {
            if expr.contains_control_signals() {
                return Err(ExpressionError::DisallowedControlSignal(text.into()));
            }
        }
        EquationContext::OutputEquation { .. } => (),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::efmt::Operators;
    use crate::error::NameResult;
    use crate::expr::ControlSignal;

    fn names() -> CustomNames {
        CustomNames {
            automata: vec![(0, "counter".into()), (1, "timer".into())],
            inputs: vec![(0, "start".into()), (1, "stop".into())],
            outputs: vec![(0, "running".into())],
            control_signals: vec![(
                ControlSignal {
                    automaton: 1,
                    signal: 0,
                },
                "tick".into(),
            )],
            operators: Operators::default(),
        }
    }

    const IN_COUNTER: EquationContext = EquationContext::TransitionCondition { automaton: 0 };

    #[test]
    fn parse_and_render_round_trip() {
        let names = names();
        for text in [
            "start & stop",
            "start + stop",
            "(start + stop) & /start",
            "start * stop + 1",
            "/(start & stop)",
            "timer.tick & start",
        ] {
            let e = parse_equation(text, &names, IN_COUNTER).unwrap();
            assert_eq!(names.render(&e), text);
        }
    }

    #[test]
    fn explicit_brackets_survive() {
        let names = names();
        let e = parse_equation("((start)) & stop", &names, IN_COUNTER).unwrap();
        assert_eq!(names.render(&e), "((start)) & stop");
    }

    #[test]
    fn custom_operator_symbols() {
        let mut names = names();
        names.operators.and = NameResult::ok("&&");
        names.operators.or = NameResult::ok("#");

        let e = parse_equation("start && stop # /start", &names, IN_COUNTER).unwrap();
        assert_eq!(names.render(&e), "start && stop # /start");

        // the default symbols are no longer recognised
        assert!(matches!(
            parse_equation("start + stop", &names, IN_COUNTER),
            Err(ExpressionError::Syntax(_))
        ));
    }

    #[test]
    fn syntax_errors() {
        let names = names();
        for text in ["", "start &", "& start", "(start", "start stop", "st%rt"] {
            assert!(matches!(
                parse_equation(text, &names, IN_COUNTER),
                Err(ExpressionError::Syntax(_))
            ));
        }
    }

    #[test]
    fn unknown_and_output_variables() {
        let names = names();
        assert!(matches!(
            parse_equation("nonsense", &names, IN_COUNTER),
            Err(ExpressionError::UnknownVariable { .. })
        ));
        assert!(matches!(
            parse_equation("running", &names, IN_COUNTER),
            Err(ExpressionError::OutputVariable { .. })
        ));
        assert!(matches!(
            parse_equation("counter.tick", &names, IN_COUNTER),
            Err(ExpressionError::UnknownVariable { .. })
        ));
    }

    #[test]
    fn transition_conditions_reject_z_and_own_signals() {
        let names = names();
        assert!(matches!(
            parse_equation("z0 & start", &names, IN_COUNTER),
            Err(ExpressionError::DisallowedZVariable(_))
        ));
        // a foreign control signal is fine ...
        assert!(parse_equation("timer.tick", &names, IN_COUNTER).is_ok());
        // ... the automaton's own one is not
        assert!(matches!(
            parse_equation(
                "timer.tick",
                &names,
                EquationContext::TransitionCondition { automaton: 1 }
            ),
            Err(ExpressionError::OwnControlSignal(_))
        ));
    }

    #[test]
    fn control_signal_equations_reject_all_control_signals() {
        let names = names();
        let ctx = EquationContext::ControlSignalEquation { automaton: 0 };
        assert!(matches!(
            parse_equation("timer.tick", &names, ctx),
            Err(ExpressionError::DisallowedControlSignal(_))
        ));
        assert!(parse_equation("start & /stop", &names, ctx).is_ok());
    }

    #[test]
    fn output_equations_accept_control_signals() {
        let names = names();
        let ctx = EquationContext::OutputEquation { automaton: 1 };
        // even the automaton's own control signal may drive an output
        assert!(parse_equation("timer.tick & start", &names, ctx).is_ok());
        assert!(matches!(
            parse_equation("z1", &names, ctx),
            Err(ExpressionError::DisallowedZVariable(_))
        ));
    }

    #[test]
    fn fallback_keeps_previous_expression() {
        let names = names();
        let previous = Expr::input(0);
        let result = compute_equation("z0", &names, IN_COUNTER, &previous);
        assert_eq!(result.expr, previous);
        assert!(matches!(
            result.error,
            Some(ExpressionError::DisallowedZVariable(_))
        ));
    }
}
