//! Two-level minimization of expression trees.
//!
//! The expression is tabulated over its own free variables, the prime
//! implicants of the resulting truth table are computed with the classical
//! Quine–McCluskey merging rounds, and a cover is selected (essential primes
//! first, then greedily by coverage). The result is rebuilt as a disjunction
//! of conjunctions of literals.
//!
//! The only contract callers may rely on is semantic: the returned tree
//! evaluates identically to the original under every assignment of its free
//! variables.

use itertools::Itertools;

use crate::assignment::Valuation;
use crate::expr::{ControlSignal, Expr, VarRef, ZVariable};

// Tabulating is exponential in the variable count; expressions wider than
// this are returned unchanged, which still satisfies the contract.
const MAX_VARIABLES: usize = 16;

/// An implicant over an ordered variable list: `care` marks the fixed
/// positions, `values` their required polarity.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct Implicant {
    values: u32,
    care: u32,
}

impl Implicant {
    fn covers(&self, minterm: u32) -> bool {
        minterm & self.care == self.values & self.care
    }
}

// Bind the free variables of an expression to the bits of a table index.
struct IndexValuation<'a> {
    vars: &'a [VarRef],
    bits: u32,
}

impl IndexValuation<'_> {
    fn lookup(&self, var: VarRef) -> bool {
        self.vars
            .iter()
            .position(|v| *v == var)
            .map(|i| self.bits >> i & 1 == 1)
            .unwrap_or(false)
    }
}

impl Valuation for IndexValuation<'_> {
    fn input(&self, id: u32) -> bool {
        self.lookup(VarRef::Input(id))
    }
    fn output(&self, id: u32) -> bool {
        self.lookup(VarRef::Output(id))
    }
    fn control_signal(&self, cs: ControlSignal) -> bool {
        self.lookup(VarRef::ControlSignal(cs))
    }
    fn z_variable(&self, z: ZVariable) -> bool {
        self.lookup(VarRef::ZVariable(z))
    }
}

pub(crate) fn minimize(e: &Expr) -> Expr {
    let vars = e.variables();
    let n = vars.len();
    if n == 0 {
        let fixed = e.eval_in(&IndexValuation {
            vars: &vars,
            bits: 0,
        });
        return Expr::from(fixed);
    }
    if n > MAX_VARIABLES {
        return e.clone();
    }

    let minterms: Vec<u32> = (0..1u32 << n)
        .filter(|idx| {
            e.eval_in(&IndexValuation {
                vars: &vars,
                bits: *idx,
            })
        })
        .collect();

    if minterms.is_empty() {
        return Expr::from(false);
    }
    if minterms.len() == 1usize << n {
        return Expr::from(true);
    }

    let primes = prime_implicants(&minterms, n);
    let cover = select_cover(&minterms, &primes);
    Expr::or(
        cover
            .iter()
            .map(|imp| implicant_to_expr(imp, &vars))
            .collect(),
    )
}

fn prime_implicants(minterms: &[u32], n: usize) -> Vec<Implicant> {
    let full_care = (1u32 << n) - 1;
    let mut current: Vec<Implicant> = minterms
        .iter()
        .map(|m| Implicant {
            values: *m,
            care: full_care,
        })
        .collect();
    let mut primes: Vec<Implicant> = Vec::new();

    while !current.is_empty() {
        let mut merged = vec![false; current.len()];
        let mut next: Vec<Implicant> = Vec::new();

        for ((i, a), (j, b)) in current.iter().copied().enumerate().tuple_combinations() {
            // implicants with the same fixed positions merge when they
            // disagree on exactly one of them
            if a.care == b.care && (a.values ^ b.values).count_ones() == 1 {
                let diff = a.values ^ b.values;
                merged[i] = true;
                merged[j] = true;
                let joined = Implicant {
                    values: a.values & !diff,
                    care: a.care & !diff,
                };
                if !next.contains(&joined) {
                    next.push(joined);
                }
            }
        }
        for (i, imp) in current.iter().enumerate() {
            if !merged[i] && !primes.contains(imp) {
                primes.push(*imp);
            }
        }
        current = next;
    }
    primes
}

fn select_cover(minterms: &[u32], primes: &[Implicant]) -> Vec<Implicant> {
    let mut chosen: Vec<Implicant> = Vec::new();

    // essential primes: sole cover of at least one minterm
    for &m in minterms {
        let mut covering = primes.iter().filter(|p| p.covers(m));
        if let (Some(only), None) = (covering.next(), covering.next()) {
            if !chosen.contains(only) {
                chosen.push(*only);
            }
        }
    }

    let mut uncovered: Vec<u32> = minterms
        .iter()
        .copied()
        .filter(|&m| !chosen.iter().any(|p| p.covers(m)))
        .collect();

    while !uncovered.is_empty() {
        let best = primes
            .iter()
            .filter(|p| !chosen.contains(p))
            .max_by_key(|p| uncovered.iter().filter(|&&m| p.covers(m)).count());
        match best {
            Some(p) if uncovered.iter().any(|&m| p.covers(m)) => {
                chosen.push(*p);
                uncovered.retain(|&m| !p.covers(m));
            }
            // the primes always cover every minterm, this is unreachable
            _ => break,
        }
    }
    chosen
}

fn implicant_to_expr(imp: &Implicant, vars: &[VarRef]) -> Expr {
    let literals = (0..vars.len())
        .filter(|i| imp.care >> i & 1 == 1)
        .map(|i| Expr::literal(vars[i], imp.values >> i & 1 == 1))
        .collect();
    Expr::and(literals)
}
