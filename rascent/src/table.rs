//! Parse-table model: the matrices the generator produces and both parser
//! runtimes consume.

use std::collections::HashMap;
use std::fmt;

use crate::index::{SemanticId, SymbolId};

/// Table entry marking an error (no action defined).
pub const ERROR_VAL: usize = usize::MAX;

/// Table entry marking acceptance of the input.
pub const ACCEPT_VAL: usize = usize::MAX - 1;

/// Operator associativity of a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
}

/// Row-major `state x symbol` matrix with error/accept sentinels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table<T> {
    data: Vec<T>,
    rows: usize,
    cols: usize,
    error_val: T,
    accept_val: T,
}

impl<T: Copy + PartialEq> Table<T> {
    pub fn new(rows: usize, cols: usize, error_val: T, accept_val: T, fill_val: T) -> Self {
        Self {
            data: vec![fill_val; rows * cols],
            rows,
            cols,
            error_val,
            accept_val,
        }
    }

    /// Builds a table from row vectors; missing cells become `fill_val`.
    pub fn from_rows(
        rows: Vec<Vec<T>>,
        error_val: T,
        accept_val: T,
        fill_val: T,
        num_rows: usize,
        num_cols: usize,
    ) -> Self {
        let mut table = Self::new(num_rows, num_cols, error_val, accept_val, fill_val);
        for (r, row) in rows.into_iter().enumerate().take(num_rows) {
            for (c, val) in row.into_iter().enumerate().take(num_cols) {
                *table.at_mut(r, c) = val;
            }
        }
        table
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn at(&self, row: usize, col: usize) -> T {
        self.data[row * self.cols + col]
    }

    pub fn at_mut(&mut self, row: usize, col: usize) -> &mut T {
        &mut self.data[row * self.cols + col]
    }

    pub fn error_val(&self) -> T {
        self.error_val
    }

    pub fn accept_val(&self) -> T {
        self.accept_val
    }

    /// Merges the defined entries of another table into this one; returns
    /// the cells that were already occupied.
    pub fn merge(&mut self, other: &Table<T>) -> Vec<(usize, usize)> {
        let rows = self.rows.min(other.rows);
        let cols = self.cols.min(other.cols);
        let mut occupied = Vec::new();

        for row in 0..rows {
            for col in 0..cols {
                let val = other.at(row, col);
                if val == other.error_val {
                    continue;
                }
                let error_val = self.error_val;
                let old = self.at_mut(row, col);
                if *old != error_val {
                    occupied.push((row, col));
                }
                *old = val;
            }
        }

        occupied
    }
}

impl fmt::Display for Table<usize> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.rows {
            for col in 0..self.cols {
                let entry = self.at(row, col);
                if entry == self.error_val {
                    write!(f, "{:<7}", "err")?;
                } else if entry == self.accept_val {
                    write!(f, "{:<7}", "acc")?;
                } else {
                    write!(f, "{:<7}", entry)?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// The complete, language-agnostic output of table generation.
///
/// Matrix rows are parser states; columns are table indices assigned in
/// first-encounter order during the transition walk. The index maps relate
/// user-visible symbol/semantic ids to those columns.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSet {
    pub num_states: usize,
    pub num_terminals: usize,
    pub num_nonterminals: usize,

    /// `shift[state][term]` -> target state.
    pub shift: Table<usize>,
    /// `reduce[state][term]` -> semantic-rule table index, `ACCEPT_VAL` for
    /// the accepting rule.
    pub reduce: Table<usize>,
    /// `jump[state][nonterm]` -> target state.
    pub jump: Table<usize>,

    /// Unique partial match on a terminal transition: rule index and number
    /// of symbols already matched.
    pub partials_rule_term: Table<usize>,
    pub partials_len_term: Table<usize>,
    /// Unique partial match on a non-terminal transition, plus the id of the
    /// matched rule's left-hand side.
    pub partials_rule_nonterm: Table<usize>,
    pub partials_len_nonterm: Table<usize>,
    pub partials_lhs_nonterm: Table<usize>,

    /// Symbol id -> table index maps.
    pub term_index: HashMap<SymbolId, usize>,
    pub nonterm_index: HashMap<SymbolId, usize>,
    pub semantic_index: HashMap<SemanticId, usize>,

    /// Per rule (indexed by semantic table index): number of right-hand-side
    /// symbols excluding epsilon, and the table index of the left-hand side.
    pub num_rhs_per_rule: Vec<usize>,
    pub lhs_index_per_rule: Vec<usize>,

    /// Operator precedence and associativity per terminal id.
    pub precedences: HashMap<SymbolId, u32>,
    pub associativities: HashMap<SymbolId, Assoc>,

    pub accepting_rule: SemanticId,
    pub starting_state: usize,
}

impl TableSet {
    /// Inverse of the semantic index map: table index -> semantic id.
    /// Falls back to the index itself when no id is mapped.
    pub fn rule_id(&self, rule_index: usize) -> SemanticId {
        self.semantic_index
            .iter()
            .find(|(_, &idx)| idx == rule_index)
            .map(|(&id, _)| id)
            .unwrap_or(rule_index)
    }

    /// Table index of a terminal symbol id.
    pub fn term_table_index(&self, id: SymbolId) -> Option<usize> {
        self.term_index.get(&id).copied()
    }
}
