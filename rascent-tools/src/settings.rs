//! Table/code generator settings.

use rascent::index::{SemanticId, StateId};

#[derive(Debug, Clone)]
pub struct Settings {
    /// Generate the partial-match tables and callbacks.
    pub gen_partial_matches: bool,
    /// Emit debug messages into the generated parser.
    pub gen_debug_code: bool,
    /// Emit error handling (default match arms) into the generated parser.
    pub gen_error_code: bool,
    /// Name state functions after their first element's lhs non-terminal.
    pub use_state_names: bool,
    /// Semantic rule which leads to accepting the grammar.
    pub accepting_rule: SemanticId,
    /// Parser starting state.
    pub starting_state: StateId,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gen_partial_matches: true,
            gen_debug_code: true,
            gen_error_code: true,
            use_state_names: false,
            accepting_rule: 0,
            starting_state: 0,
        }
    }
}
