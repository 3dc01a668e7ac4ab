//! Support core for generated recursive-ascent parsers.
//!
//! The emitted source only contains the state functions specialised to one
//! automaton. Everything state-independent (lookahead bookkeeping, the
//! symbol stacks, active partial rules and the rule application machinery)
//! lives here and is driven through an [`AscentCore`] embedded in the
//! generated parser struct.

use std::collections::HashMap;

use colored::Colorize;

use crate::ast::{AstPtr, SemanticArgs, SemanticRules};
use crate::error::ParseError;
use crate::index::{SemanticId, StateId, SymbolId};
use crate::stack::ParseStack;
use crate::table::ERROR_VAL;
use crate::{log, logn};

/// A partially recognised rule instance.
#[derive(Debug, Clone)]
struct ActiveRule {
    /// Number of tokens already seen in the partial match.
    seen_tokens: usize,
    /// Distinguishes nested instances of the same rule.
    handle: usize,
    /// Accumulated return value of the partial invocations.
    retval: Option<AstPtr>,
}

/// State-independent half of a recursive-ascent parser.
pub struct AscentCore {
    semantics: SemanticRules,
    input: Vec<AstPtr>,

    /// Currently active symbols. `None` where a semantic rule aborted.
    symbols: ParseStack<Option<AstPtr>>,
    /// Expected non-terminal ids, kept in lockstep with `symbols` so a jump
    /// can still dispatch when a rule returned no node.
    symbols_exp: ParseStack<SymbolId>,

    active_rules: HashMap<SemanticId, Vec<ActiveRule>>,
    cur_rule_handle: usize,

    lookahead: Option<AstPtr>,
    lookahead_idx: usize,

    debug: bool,
    accepted: bool,

    /// Return count between a reduction and its jump.
    dist_to_jump: usize,

    end_id: SymbolId,
}

impl AscentCore {
    pub fn new(end_id: SymbolId) -> Self {
        Self {
            semantics: SemanticRules::new(),
            input: Vec::new(),
            symbols: ParseStack::new(),
            symbols_exp: ParseStack::new(),
            active_rules: HashMap::new(),
            cur_rule_handle: 0,
            lookahead: None,
            lookahead_idx: 0,
            debug: false,
            accepted: false,
            dist_to_jump: 0,
            end_id,
        }
    }

    pub fn set_semantic_rules(&mut self, rules: SemanticRules) {
        self.semantics = rules;
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Prepares for a fresh parse of the given token stream.
    pub fn reset(&mut self, input: &[AstPtr]) {
        self.input = input.to_vec();
        self.symbols.clear();
        self.symbols_exp.clear();
        self.active_rules.clear();
        self.cur_rule_handle = 0;
        self.lookahead = None;
        self.lookahead_idx = 0;
        self.accepted = false;
        self.dist_to_jump = 0;
    }

    /// Advances to the next lookahead terminal.
    pub fn next_lookahead(&mut self) {
        self.lookahead = self.input.get(self.lookahead_idx).cloned();
        self.lookahead_idx += 1;
    }

    /// Id of the current lookahead, or [`ERROR_VAL`] when the input is
    /// exhausted.
    pub fn lookahead_id(&self) -> SymbolId {
        self.lookahead.as_ref().map_or(ERROR_VAL, |tok| tok.id())
    }

    /// Shifts the lookahead onto the symbol stack and advances the input.
    pub fn push_lookahead(&mut self) -> Result<(), ParseError> {
        let tok = self
            .lookahead
            .take()
            .ok_or(ParseError::InputUnderflow { line_range: None })?;
        self.symbols.push(Some(tok));
        // placeholder, only non-terminals are tracked through symbols_exp
        self.symbols_exp.push(SymbolId::default());
        self.next_lookahead();
        Ok(())
    }

    pub fn accepted(&self) -> bool {
        self.accepted
    }

    pub fn set_accepted(&mut self) {
        self.accepted = true;
    }

    pub fn set_dist_to_jump(&mut self, dist: usize) {
        self.dist_to_jump = dist;
    }

    /// True while the state function should dispatch jump transitions.
    pub fn jump_ready(&self) -> bool {
        self.dist_to_jump == 0 && !self.symbols.is_empty() && !self.accepted
    }

    /// Terminal-ness and id of the stack top. Falls back to the expected
    /// non-terminal id when the top rule aborted.
    pub fn top_symbol(&self, state: StateId) -> Result<(bool, SymbolId), ParseError> {
        match self.symbols.top() {
            Some(Some(node)) => Ok((node.is_terminal(), node.id())),
            Some(None) => self
                .symbols_exp
                .top()
                .map(|id| (false, *id))
                .ok_or(ParseError::MissingSymbol {
                    state,
                    lookahead: self.lookahead_id(),
                }),
            None => Err(ParseError::MissingSymbol {
                state,
                lookahead: self.lookahead_id(),
            }),
        }
    }

    /// The topmost terminal on the symbol stack.
    fn lookback(&self) -> Option<AstPtr> {
        for sym in self.symbols.iter_topdown().flatten() {
            if sym.is_terminal() {
                return Some(sym.clone());
            }
        }
        None
    }

    /// Takes `num_rhs` symbols off the stack, in grammar order.
    fn take_args(&mut self, num_rhs: usize) -> SemanticArgs {
        let num_rhs = num_rhs.min(self.symbols.len());
        let args = self.symbols.take_n(num_rhs);
        self.symbols_exp.take_n(num_rhs);
        args
    }

    /// Reads `num_rhs` symbols without changing the stack.
    fn copy_args(&self, num_rhs: usize) -> SemanticArgs {
        self.symbols.top_n(num_rhs)
    }

    /// Verifies that a semantic rule returned the expected lhs symbol id,
    /// correcting the node when it did not.
    fn check_return_symbol(
        &self,
        retsym: &Option<AstPtr>,
        expected_id: SymbolId,
        rule_id: SemanticId,
    ) -> bool {
        if let Some(node) = retsym {
            if node.id() != expected_id {
                if self.debug {
                    eprintln!(
                        "Warning: expected return symbol id {expected_id} in semantic rule \
                         #{rule_id}, but received id {}.",
                        node.id()
                    );
                }
                node.set_id(expected_id);
                return false;
            }
        }
        true
    }

    /// Executes a partially recognised semantic rule.
    ///
    /// Before a shift the lookahead terminal is already known and passed as
    /// an extra argument. Returns whether the rule was invoked; a repeat
    /// invocation on an identical prefix is suppressed.
    pub fn apply_partial_rule(
        &mut self,
        before_shift: bool,
        rule_id: SemanticId,
        rule_len: usize,
        lhs_id: SymbolId,
    ) -> Result<bool, ParseError> {
        let rule = self
            .semantics
            .get(&rule_id)
            .ok_or(ParseError::MissingRule(rule_id))?
            .clone();

        let arg_len = rule_len;
        // include the lookahead terminal
        let rule_len = if before_shift { rule_len + 1 } else { rule_len };

        let mut already_seen = false;
        let mut insert_new = false;
        let mut seen_tokens_old: Option<usize> = None;

        {
            let stack = self.active_rules.entry(rule_id).or_default();
            match stack.last_mut() {
                Some(active) => {
                    seen_tokens_old = Some(active.seen_tokens);
                    if before_shift {
                        if active.seen_tokens < rule_len {
                            active.seen_tokens = rule_len; // update seen length
                        } else {
                            insert_new = true; // start of a new rule instance
                        }
                    } else if active.seen_tokens == rule_len {
                        already_seen = true;
                    } else {
                        active.seen_tokens = rule_len;
                    }
                }
                None => insert_new = true,
            }

            if insert_new {
                seen_tokens_old = None;
                let handle = self.cur_rule_handle;
                self.cur_rule_handle += 1;
                stack.push(ActiveRule {
                    seen_tokens: rule_len,
                    handle,
                    retval: None,
                });
            }
        }

        if already_seen {
            return Ok(false);
        }

        let mut args = self.copy_args(arg_len);
        let mut retval = self
            .active_rules
            .get(&rule_id)
            .and_then(|stack| stack.last())
            .and_then(|active| active.retval.clone());

        if !before_shift || seen_tokens_old.map_or(true, |old| old + 1 < rule_len) {
            retval = rule(false, &args, retval);
            self.check_return_symbol(&retval, lhs_id, rule_id);
        }

        if before_shift {
            args.push(self.lookahead.clone());
            retval = rule(false, &args, retval);
            self.check_return_symbol(&retval, lhs_id, rule_id);
        }

        if let Some(active) = self
            .active_rules
            .get_mut(&rule_id)
            .and_then(|stack| stack.last_mut())
        {
            active.retval = retval;
        }

        Ok(true)
    }

    /// Applies a fully recognised semantic rule and pushes its result.
    ///
    /// For the accepting rule the arguments stay on the stack so the parse
    /// result can be returned afterwards.
    pub fn apply_rule(
        &mut self,
        rule_id: SemanticId,
        num_rhs: usize,
        lhs_id: SymbolId,
        accepted: bool,
    ) -> Result<(), ParseError> {
        let popped = self
            .active_rules
            .get_mut(&rule_id)
            .and_then(|stack| stack.pop());

        let rule = self
            .semantics
            .get(&rule_id)
            .ok_or(ParseError::MissingRule(rule_id))?
            .clone();

        let args = if accepted {
            self.copy_args(num_rhs)
        } else {
            self.take_args(num_rhs)
        };
        let retval = popped.and_then(|active| active.retval);

        let retsym = rule(true, &args, retval);
        self.check_return_symbol(&retsym, lhs_id, rule_id);
        if let Some(node) = &retsym {
            node.set_terminal_override(false);
        }

        self.symbols.push(retsym);
        self.symbols_exp.push(lhs_id);
        Ok(())
    }

    /// Builds the transition error for a state with no matching dispatch.
    pub fn transition_error(&self, state: StateId) -> ParseError {
        let top_symbol = match self.symbols.top() {
            Some(Some(node)) => Some((node.is_terminal(), node.id())),
            Some(None) => self.symbols_exp.top().map(|id| (false, *id)),
            None => None,
        };
        ParseError::Transition {
            state,
            top_symbol,
            lookahead: self.lookahead_id(),
        }
    }

    /// Returns the accepted parse result.
    pub fn finish(&mut self) -> Result<AstPtr, ParseError> {
        if !self.accepted {
            return Err(ParseError::NotAccepted);
        }
        self.symbols
            .top()
            .cloned()
            .flatten()
            .ok_or(ParseError::NotAccepted)
    }

    // ------------------------------------------------------------------
    // debug messages
    // ------------------------------------------------------------------

    pub fn debug_state(&self, state: StateId, state_name: &str) {
        if !self.debug {
            return;
        }
        println!("\nRunning state {state} function \"{state_name}\"...");
        if let Some(tok) = &self.lookahead {
            println!(
                "Lookahead [{}]: {}.",
                self.lookahead_idx - 1,
                self.describe_symbol(tok)
            );
        }
        if let Some(lookback) = self.lookback() {
            println!("Lookback: {}.", self.describe_symbol(&lookback));
        }
        self.print_symbols();
    }

    /// Decrements the jump distance on leaving a state function.
    pub fn leave_state(&mut self, state: StateId) {
        if self.dist_to_jump > 0 {
            self.dist_to_jump -= 1;
        }
        log!(
            self.debug,
            "Returning from state {}, distance to jump: {}.",
            state,
            self.dist_to_jump
        );
    }

    /// Reports a reduction that happened without reaching its jump first.
    pub fn debug_jump_check(&self, state: StateId) {
        if self.dist_to_jump != 0 {
            eprintln!("Error: expected distance to jump to be zero (state {state}).");
        }
    }

    pub fn debug_reduce(&self, num_rhs: usize, rule_id: SemanticId, rule_descr: &str) {
        if !self.debug {
            return;
        }
        let handle = self
            .active_rules
            .get(&rule_id)
            .and_then(|stack| stack.last())
            .map(|active| active.handle);
        logn!(
            self.debug,
            "{} {} symbol(s) using rule #{}",
            "Reducing".red(),
            num_rhs,
            rule_id
        );
        if let Some(handle) = handle {
            logn!(self.debug, " (handle id {handle})");
        }
        log!(self.debug, " ({rule_descr}).");
    }

    pub fn debug_partial_rule(&self, before_shift: bool, rule_len: usize, rule_id: SemanticId) {
        if !self.debug {
            return;
        }
        let handle = self
            .active_rules
            .get(&rule_id)
            .and_then(|stack| stack.last())
            .map(|active| active.handle);
        let rule_len = if before_shift { rule_len + 1 } else { rule_len };
        logn!(self.debug, "Partially matched rule #{rule_id}");
        if let Some(handle) = handle {
            logn!(self.debug, " (handle id {handle})");
        }
        log!(
            self.debug,
            " of length {} ({}).",
            rule_len,
            if before_shift {
                "before terminal"
            } else {
                "before non-terminal"
            }
        );
    }

    fn describe_symbol(&self, node: &AstPtr) -> String {
        let id = if node.is_terminal() && node.id() == self.end_id {
            "end".to_string()
        } else {
            node.id().to_string()
        };
        let kind = if node.is_terminal() { "[t]" } else { "[nt]" };
        format!("{id} {kind}")
    }

    fn print_symbols(&self) {
        logn!(self.debug, "Symbol stack [{}]: ", self.symbols.len());
        let dump = self
            .symbols
            .iter_topdown()
            .zip(self.symbols_exp.iter_topdown())
            .map(|(sym, exp)| match sym {
                Some(node) => self.describe_symbol(node),
                None => format!("{exp} [exp nt]"),
            })
            .collect::<Vec<_>>()
            .join(", ");
        log!(self.debug, "{dump}.");
    }
}
