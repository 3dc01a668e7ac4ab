//! Shift/reduce conflict resolution via operator precedences and
//! associativities.

use rascent::table::{Assoc, ERROR_VAL};

use crate::grammar::Grammar;
use rascent::index::TermIndex;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictSolution {
    DoShift,
    DoReduce,
    NotFound,
}

/// Tries to solve a shift/reduce conflict between one look-back terminal
/// and the lookahead terminal.
///
/// A strictly lower look-back precedence shifts, a strictly higher one
/// reduces; equal precedences fall through to associativity, where
/// right-associative operators shift and left-associative ones reduce.
pub fn solve_shift_reduce(
    lookback_prec: Option<u32>,
    lookback_assoc: Option<Assoc>,
    lookahead_prec: Option<u32>,
    lookahead_assoc: Option<Assoc>,
) -> ConflictSolution {
    if let (Some(prec_back), Some(prec_ahead)) = (lookback_prec, lookahead_prec) {
        if prec_back < prec_ahead {
            return ConflictSolution::DoShift;
        }
        if prec_back > prec_ahead {
            return ConflictSolution::DoReduce;
        }
        // same precedence, try associativity next
    }

    if let (Some(assoc_back), Some(assoc_ahead)) = (lookback_assoc, lookahead_assoc) {
        if assoc_back == assoc_ahead {
            return match assoc_back {
                Assoc::Right => ConflictSolution::DoShift,
                Assoc::Left => ConflictSolution::DoReduce,
            };
        }
    }

    ConflictSolution::NotFound
}

/// Applies [`solve_shift_reduce`] over all look-back terminals of a state,
/// erasing the losing table entry on the first solution found.
///
/// Returns whether a solution was found (trivially `true` when there is no
/// conflict to begin with).
pub fn solve_shift_reduce_entries(
    grammar: &Grammar,
    lookahead: TermIndex,
    lookbacks: &BTreeSet<TermIndex>,
    shift_entry: &mut usize,
    reduce_entry: &mut usize,
) -> bool {
    // no conflict?
    if *shift_entry == ERROR_VAL || *reduce_entry == ERROR_VAL {
        return true;
    }

    let ahead = grammar.terminal(lookahead);
    for &lookback in lookbacks {
        let back = grammar.terminal(lookback);
        match solve_shift_reduce(
            back.precedence(),
            back.associativity(),
            ahead.precedence(),
            ahead.associativity(),
        ) {
            ConflictSolution::DoShift => {
                *reduce_entry = ERROR_VAL;
                return true;
            }
            ConflictSolution::DoReduce => {
                *shift_entry = ERROR_VAL;
                return true;
            }
            ConflictSolution::NotFound => {}
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_lookahead_precedence_shifts() {
        assert_eq!(
            solve_shift_reduce(Some(70), Some(Assoc::Left), Some(80), Some(Assoc::Left)),
            ConflictSolution::DoShift
        );
    }

    #[test]
    fn higher_lookback_precedence_reduces() {
        assert_eq!(
            solve_shift_reduce(Some(80), Some(Assoc::Left), Some(70), Some(Assoc::Left)),
            ConflictSolution::DoReduce
        );
    }

    #[test]
    fn equal_precedence_uses_associativity() {
        assert_eq!(
            solve_shift_reduce(Some(70), Some(Assoc::Left), Some(70), Some(Assoc::Left)),
            ConflictSolution::DoReduce
        );
        assert_eq!(
            solve_shift_reduce(Some(110), Some(Assoc::Right), Some(110), Some(Assoc::Right)),
            ConflictSolution::DoShift
        );
    }

    #[test]
    fn mixed_associativity_stays_unsolved() {
        assert_eq!(
            solve_shift_reduce(None, Some(Assoc::Left), None, Some(Assoc::Right)),
            ConflictSolution::NotFound
        );
        assert_eq!(
            solve_shift_reduce(None, None, None, None),
            ConflictSolution::NotFound
        );
    }
}
