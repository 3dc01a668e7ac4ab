//! Generator errors.

use std::fmt;

use rascent::index::{StateId, SymbolId};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Ill-formed grammar construction (duplicate ids, unknown symbols, ...).
    Grammar(String),
    /// A symbol id was registered twice.
    DuplicateSymbol(SymbolId),
    /// A reducible element carries no semantic rule id.
    MissingSemanticRule(String),
    /// No table index has been assigned for this id.
    NoTableIndex { kind: &'static str, id: usize },
    /// Conflicts found after transition closure; all conflicting states are
    /// collected before aborting.
    Conflicts {
        reduce_reduce: Vec<StateId>,
        shift_reduce: Vec<StateId>,
    },
    /// Unresolvable shift/reduce conflicts found during table generation.
    TableConflicts(Vec<String>),
    Io(std::io::Error),
}

fn write_states(f: &mut fmt::Formatter<'_>, states: &[StateId]) -> fmt::Result {
    write!(f, "state")?;
    if states.len() > 1 {
        write!(f, "s")?;
    }
    write!(f, " ")?;
    for (idx, state) in states.iter().enumerate() {
        write!(f, "{state}")?;
        if idx < states.len() - 1 {
            write!(f, ", ")?;
        }
    }
    Ok(())
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grammar(msg) => write!(f, "{msg}"),
            Self::DuplicateSymbol(id) => {
                write!(f, "a symbol with id {id} has already been registered")
            }
            Self::MissingSemanticRule(elem) => {
                write!(f, "no semantic rule assigned to element {elem}")
            }
            Self::NoTableIndex { kind, id } => {
                write!(f, "no table index is available for {kind} with id {id}")
            }
            Self::Conflicts {
                reduce_reduce,
                shift_reduce,
            } => {
                write!(f, "the grammar has conflicts:")?;
                if !reduce_reduce.is_empty() {
                    write!(f, " reduce/reduce in ")?;
                    write_states(f, reduce_reduce)?;
                    write!(f, ".")?;
                }
                if !shift_reduce.is_empty() {
                    write!(f, " shift/reduce in ")?;
                    write_states(f, shift_reduce)?;
                    write!(f, ".")?;
                }
                Ok(())
            }
            Self::TableConflicts(msgs) => {
                writeln!(f, "unresolvable shift/reduce conflicts:")?;
                for msg in msgs {
                    writeln!(f, "  {msg}")?;
                }
                Ok(())
            }
            Self::Io(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
