//! Binary encoding of user-visible state numbers into z-variables.
//!
//! Every automaton encodes its current state as a vector of z-variables; the
//! vector is kept as short as the largest state number in use allows. The
//! functions here are the single source of truth for that encoding: the
//! equation synthesis, the assignment pipeline and the initial-state
//! revalidation all go through them.

use crate::expr::{Expr, ZVariable};

/// The number of z-variables needed to encode states up to `max_state_number`.
///
/// Representing state 0 still takes one bit, so the result is always >= 1.
pub fn needed_bits(max_state_number: u32) -> u32 {
    match max_state_number {
        0 => 1,
        n => 32 - n.leading_zeros(),
    }
}

/// The largest state number representable with the given number of bits.
pub fn max_representable(bits: u32) -> u32 {
    match bits >= 32 {
        true => u32::MAX,
        false => (1u32 << bits) - 1,
    }
}

/// Whether bit `bit` is set in the binary encoding of `state_number`.
pub fn bit_needed(state_number: u32, bit: u32) -> bool {
    match bit >= 32 {
        true => false,
        false => (state_number >> bit) & 1 == 1,
    }
}

/// The minterm identifying exactly `state_number` over `bits` z-variables.
///
/// Builds the conjunction of, for each bit from `bits - 1` down to 0, the
/// z-variable literal, negated when the bit is not set in the encoding.
pub fn state_to_expression(automaton: u32, state_number: u32, bits: u32) -> Expr {
    let literals = (0..bits)
        .rev()
        .map(|bit| {
            let z = Expr::z_variable(ZVariable { automaton, bit });
            match bit_needed(state_number, bit) {
                true => z,
                false => Expr::negation(z),
            }
        })
        .collect();
    Expr::and(literals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::BaseAssignment;

    #[test]
    fn needed_bits_is_minimal() {
        assert_eq!(needed_bits(0), 1);
        assert_eq!(needed_bits(1), 1);
        assert_eq!(needed_bits(2), 2);
        assert_eq!(needed_bits(3), 2);
        assert_eq!(needed_bits(4), 3);
        assert_eq!(needed_bits(255), 8);
        assert_eq!(needed_bits(256), 9);

        for n in 0..1000u32 {
            let bits = needed_bits(n);
            assert!(max_representable(bits) >= n);
            if bits > 1 {
                assert!(max_representable(bits - 1) < n);
            }
        }
    }

    #[test]
    fn max_representable_values() {
        assert_eq!(max_representable(1), 1);
        assert_eq!(max_representable(2), 3);
        assert_eq!(max_representable(8), 255);
    }

    #[test]
    fn bit_needed_matches_shift() {
        for s in 0..64u32 {
            for i in 0..8u32 {
                assert_eq!(bit_needed(s, i), (s >> i) & 1 == 1);
            }
        }
    }

    fn encoded(automaton: u32, state: u32, bits: u32) -> BaseAssignment {
        let mut a = BaseAssignment::default();
        for bit in 0..bits {
            a.set_z_variable(ZVariable { automaton, bit }, bit_needed(state, bit));
        }
        a
    }

    #[test]
    fn minterm_identifies_exactly_one_state() {
        let bits = needed_bits(5);
        let e = state_to_expression(2, 5, bits);

        for candidate in 0..=max_representable(bits) {
            let assignment = encoded(2, candidate, bits);
            assert_eq!(e.eval_without_cs(&assignment), candidate == 5);
        }
    }

    #[test]
    fn single_bit_minterm() {
        let e = state_to_expression(0, 0, 1);
        assert!(e.eval_without_cs(&encoded(0, 0, 1)));
        assert!(!e.eval_without_cs(&encoded(0, 1, 1)));
    }
}
