//! Runtime parse errors.

use std::fmt;

use crate::ast::LineRange;
use crate::index::{SemanticId, StateId, SymbolId};

/// Errors raised while a generated or table-driven parser runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Neither a shift nor a reduce entry is defined.
    UndefinedAction {
        state: StateId,
        token_id: SymbolId,
        line_range: Option<LineRange>,
    },
    /// Both a shift and a reduce entry survived table construction.
    AmbiguousAction {
        state: StateId,
        shift_state: StateId,
        rule_id: SemanticId,
        token_id: SymbolId,
        line_range: Option<LineRange>,
    },
    /// A state of the recursive-ascent parser has no transition for the
    /// current stack top and lookahead.
    Transition {
        state: StateId,
        top_symbol: Option<(bool, SymbolId)>,
        lookahead: SymbolId,
    },
    /// No semantic rule registered under this id.
    MissingRule(SemanticId),
    /// A semantic rule returned no symbol and no expected id is tracked.
    MissingSymbol { state: StateId, lookahead: SymbolId },
    /// The token stream ran out before the grammar accepted.
    InputUnderflow { line_range: Option<LineRange> },
    /// An input token carries no parse-table index.
    TokenWithoutIndex { id: SymbolId },
    /// The parser returned without accepting the input.
    NotAccepted,
}

fn write_lines(f: &mut fmt::Formatter<'_>, lines: &Option<LineRange>) -> fmt::Result {
    if let Some((start, end)) = lines {
        if start == end {
            write!(f, " (line {start})")?;
        } else {
            write!(f, " (lines {start}...{end})")?;
        }
    }
    Ok(())
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UndefinedAction {
                state,
                token_id,
                line_range,
            } => {
                write!(
                    f,
                    "undefined shift and reduce entries from state {state}, token id {token_id}"
                )?;
                write_lines(f, line_range)
            }
            Self::AmbiguousAction {
                state,
                shift_state,
                rule_id,
                token_id,
                line_range,
            } => {
                write!(
                    f,
                    "shift/reduce conflict between shift from state {state} to state \
                     {shift_state} and reduce using rule {rule_id}, token id {token_id}"
                )?;
                write_lines(f, line_range)
            }
            Self::Transition {
                state,
                top_symbol,
                lookahead,
            } => {
                write!(f, "no transition from state {state}, ")?;
                match top_symbol {
                    Some((true, id)) => write!(f, "top-level terminal {id}, ")?,
                    Some((false, id)) => write!(f, "top-level non-terminal {id}, ")?,
                    None => {}
                }
                write!(f, "lookahead terminal {lookahead}")
            }
            Self::MissingRule(id) => write!(f, "no semantic rule #{id} defined"),
            Self::MissingSymbol { state, lookahead } => write!(
                f,
                "no lhs symbol id available in state {state}, lookahead terminal {lookahead}"
            ),
            Self::InputUnderflow { line_range } => {
                write!(f, "input buffer underflow")?;
                write_lines(f, line_range)
            }
            Self::TokenWithoutIndex { id } => {
                write!(f, "input token with id {id} carries no table index")
            }
            Self::NotAccepted => write!(f, "input was not accepted"),
        }
    }
}

impl std::error::Error for ParseError {}
