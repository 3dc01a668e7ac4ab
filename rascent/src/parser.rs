//! Table-driven LALR(1) parser.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use colored::Colorize;

use crate::ast::{AstPtr, SemanticArgs, SemanticRules};
use crate::error::ParseError;
use crate::stack::ParseStack;
use crate::table::{TableSet, ACCEPT_VAL, ERROR_VAL};
use crate::{log, logn};

/// Entry of the symbol stack. The node is `None` where a semantic rule
/// aborted its branch; the table index is known regardless, from the rule's
/// left-hand side.
#[derive(Debug, Clone)]
struct StackSym {
    node: Option<AstPtr>,
    table_index: usize,
    terminal: bool,
}

/// Drives a token stream through a [`TableSet`], invoking the user's
/// semantic rules on every (partial) reduction.
pub struct Parser {
    tables: TableSet,
    semantics: SemanticRules,
    debug: bool,
}

impl Parser {
    pub fn new(tables: TableSet) -> Self {
        Self {
            tables,
            semantics: SemanticRules::new(),
            debug: false,
        }
    }

    pub fn set_semantic_rules(&mut self, rules: SemanticRules) {
        self.semantics = rules;
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn tables(&self) -> &TableSet {
        &self.tables
    }

    /// Parses the input tokens using the LALR(1) tables.
    ///
    /// Every token must carry its terminal table index; the end token has
    /// to be present at the end of the stream.
    pub fn parse(&self, input: &[AstPtr]) -> Result<AstPtr, ParseError> {
        let mut states: ParseStack<usize> = ParseStack::new();
        let mut symbols: ParseStack<StackSym> = ParseStack::new();
        let mut seen_partials: HashSet<u64> = HashSet::new();

        states.push(self.tables.starting_state);

        let mut input_idx = 0usize;
        let mut curtok = input
            .first()
            .cloned()
            .ok_or(ParseError::InputUnderflow { line_range: None })?;
        input_idx += 1;

        loop {
            let topstate = *states.top().unwrap();
            let tok_idx = curtok
                .table_index()
                .ok_or(ParseError::TokenWithoutIndex { id: curtok.id() })?;

            let newstate = self.tables.shift.at(topstate, tok_idx);
            let rule_idx = self.tables.reduce.at(topstate, tok_idx);

            if self.debug {
                self.print_active_state(topstate, input_idx, &curtok, &states, &symbols);
            }

            // neither a shift nor a reduce defined
            if newstate == ERROR_VAL && rule_idx == ERROR_VAL {
                return Err(ParseError::UndefinedAction {
                    state: topstate,
                    token_id: curtok.id(),
                    line_range: curtok.line_range(),
                });
            }

            // both a shift and a reduce would be possible; table
            // construction should have erased one of them
            if newstate != ERROR_VAL && rule_idx != ERROR_VAL {
                return Err(ParseError::AmbiguousAction {
                    state: topstate,
                    shift_state: newstate,
                    rule_id: self.tables.rule_id(rule_idx),
                    token_id: curtok.id(),
                    line_range: curtok.line_range(),
                });
            }

            if rule_idx == ACCEPT_VAL {
                log!(self.debug, "\t{}", "Accepting.".green());
                return symbols
                    .top()
                    .and_then(|sym| sym.node.clone())
                    .ok_or(ParseError::NotAccepted);
            }

            self.apply_partial_rule(true, topstate, tok_idx, &states, &symbols, &mut seen_partials)?;

            if newstate != ERROR_VAL {
                // shift
                log!(
                    self.debug,
                    "\t{} state {}.",
                    "Shifting".green(),
                    newstate
                );

                if input_idx >= input.len() {
                    return Err(ParseError::InputUnderflow {
                        line_range: curtok.line_range(),
                    });
                }

                states.push(newstate);
                symbols.push(StackSym {
                    node: Some(curtok),
                    table_index: tok_idx,
                    terminal: true,
                });

                curtok = input[input_idx].clone();
                input_idx += 1;
            } else {
                // reduce
                let num_rhs = self.tables.num_rhs_per_rule[rule_idx];
                let rule_id = self.tables.rule_id(rule_idx);
                log!(
                    self.debug,
                    "\t{} {} symbol(s) via rule #{}.",
                    "Reducing".red(),
                    num_rhs,
                    rule_id
                );

                let mut args: SemanticArgs = Vec::with_capacity(num_rhs);
                for _ in 0..num_rhs {
                    let sym = symbols.pop().expect("symbol stack underflow on reduce");
                    args.push(sym.node);
                    states.pop();
                }
                args.reverse();

                let rule = self
                    .semantics
                    .get(&rule_id)
                    .ok_or(ParseError::MissingRule(rule_id))?
                    .clone();
                let reduced = rule(true, &args, None);

                let lhs_idx = self.tables.lhs_index_per_rule[rule_idx];
                if let Some(node) = &reduced {
                    node.set_table_index(lhs_idx);
                    node.set_terminal_override(false);
                }

                let topstate = *states.top().unwrap();
                let jumpstate = self.tables.jump.at(topstate, lhs_idx);

                symbols.push(StackSym {
                    node: reduced,
                    table_index: lhs_idx,
                    terminal: false,
                });

                self.apply_partial_rule(
                    false,
                    topstate,
                    tok_idx,
                    &states,
                    &symbols,
                    &mut seen_partials,
                )?;

                states.push(jumpstate);

                log!(
                    self.debug,
                    "\t{} from state {} to state {}.",
                    "Jumping".blue(),
                    topstate,
                    jumpstate
                );
            }
        }
    }

    /// Runs a partial rule related to either a terminal or a non-terminal
    /// transition, at most once per (rule, length, stack) configuration.
    fn apply_partial_rule(
        &self,
        term: bool,
        topstate: usize,
        tok_idx: usize,
        states: &ParseStack<usize>,
        symbols: &ParseStack<StackSym>,
        seen: &mut HashSet<u64>,
    ) -> Result<(), ParseError> {
        let (rule_idx, match_len) = if term {
            (
                self.tables.partials_rule_term.at(topstate, tok_idx),
                self.tables.partials_len_term.at(topstate, tok_idx),
            )
        } else {
            match symbols.top() {
                Some(top) if !top.terminal => (
                    self.tables.partials_rule_nonterm.at(topstate, top.table_index),
                    self.tables.partials_len_nonterm.at(topstate, top.table_index),
                ),
                _ => return Ok(()),
            }
        };

        if rule_idx == ERROR_VAL {
            return Ok(());
        }

        let hash = Self::partial_rule_hash(rule_idx, match_len, states, symbols);
        if seen.contains(&hash) {
            return Ok(());
        }

        let rule_id = self.tables.rule_id(rule_idx);
        let rule = self
            .semantics
            .get(&rule_id)
            .ok_or(ParseError::MissingRule(rule_id))?
            .clone();

        let args: SemanticArgs = symbols
            .top_n(match_len)
            .into_iter()
            .map(|sym| sym.node)
            .collect();
        rule(false, &args, None);

        seen.insert(hash);

        log!(
            self.debug,
            "\tPartially matched rule #{} of length {}.",
            rule_id,
            match_len
        );

        Ok(())
    }

    /// A unique fingerprint of a partial-rule application: the rule, the
    /// match length and the full parser configuration.
    fn partial_rule_hash(
        rule_idx: usize,
        match_len: usize,
        states: &ParseStack<usize>,
        symbols: &ParseStack<StackSym>,
    ) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        rule_idx.hash(&mut hasher);
        match_len.hash(&mut hasher);
        for state in states.iter() {
            state.hash(&mut hasher);
        }
        for sym in symbols.iter() {
            match &sym.node {
                Some(node) => node.hash_value().hash(&mut hasher),
                None => sym.table_index.hash(&mut hasher),
            }
        }
        hasher.finish()
    }

    fn print_active_state(
        &self,
        topstate: usize,
        input_idx: usize,
        curtok: &AstPtr,
        states: &ParseStack<usize>,
        symbols: &ParseStack<StackSym>,
    ) {
        println!("\nState {topstate} active.");

        logn!(
            self.debug,
            "\tCurrent token [{}]: {}",
            input_idx - 1,
            curtok.id()
        );
        log!(
            self.debug,
            " (terminal index {}).",
            curtok.table_index().unwrap_or(ERROR_VAL)
        );

        logn!(self.debug, "\tState stack [{}]: ", states.len());
        let state_dump = states
            .iter_topdown()
            .map(|state| state.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        log!(self.debug, "{state_dump}.");

        logn!(self.debug, "\tSymbol stack [{}]: ", symbols.len());
        let sym_dump = symbols
            .iter_topdown()
            .map(|sym| {
                let kind = if sym.terminal { "[t]" } else { "[nt]" };
                format!("{} {}", sym.table_index, kind)
            })
            .collect::<Vec<_>>()
            .join(", ");
        log!(self.debug, "{sym_dump}.");
    }
}
