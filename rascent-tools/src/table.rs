//! Generating LALR(1) parse tables from a collection.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use rascent::index::{SemanticId, SymbolId, TermIndex};
use rascent::table::{Table, TableSet, ACCEPT_VAL, ERROR_VAL};

use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::grammar::SymbolRef;
use crate::settings::Settings;

/// Flattens the automaton into the shift/reduce/jump/partial-match tables.
pub fn generate_tables(collection: &Collection, settings: &Settings) -> Result<TableSet> {
    TableGen::new(collection, settings).create()
}

struct TableGen<'c, 'g> {
    collection: &'c Collection<'g>,
    settings: &'c Settings,

    /// Table indices, assigned in order of first sighting.
    term_index: IndexMap<SymbolId, usize>,
    nonterm_index: IndexMap<SymbolId, usize>,
    semantic_index: IndexMap<SemanticId, usize>,

    /// Terminals in table-index order.
    seen_terminals: Vec<TermIndex>,
}

impl<'c, 'g> TableGen<'c, 'g> {
    fn new(collection: &'c Collection<'g>, settings: &'c Settings) -> Self {
        Self {
            collection,
            settings,
            term_index: IndexMap::new(),
            nonterm_index: IndexMap::new(),
            semantic_index: IndexMap::new(),
            seen_terminals: Vec::new(),
        }
    }

    /// Creates indices for the parse tables from the symbol ids.
    fn create_table_indices(&mut self) {
        let grammar = self.collection.grammar();

        // terminals, in transition order
        for transition in self.collection.transitions() {
            let term = match transition.symbol {
                SymbolRef::Term(t) => t,
                SymbolRef::NonTerm(_) => continue,
            };
            let id = grammar.terminal(term).id();
            let next = self.term_index.len();
            if let indexmap::map::Entry::Vacant(entry) = self.term_index.entry(id) {
                entry.insert(next);
                self.seen_terminals.push(term);
            }
        }

        // the end symbol always gets an index
        let end_id = grammar.terminal(grammar.end()).id();
        let next = self.term_index.len();
        if let indexmap::map::Entry::Vacant(entry) = self.term_index.entry(end_id) {
            entry.insert(next);
            self.seen_terminals.push(grammar.end());
        }

        // non-terminals and semantic rules, from reducible elements
        for closure in self.collection.closures() {
            for &e in closure.elements() {
                let elem = &self.collection.arena()[e];
                if !elem.is_reducible(grammar) {
                    continue;
                }

                let lhs_id = grammar.nonterminal(elem.lhs()).id();
                let next = self.nonterm_index.len();
                self.nonterm_index.entry(lhs_id).or_insert(next);

                if let Some(semantic_id) = elem.semantic_id() {
                    let next = self.semantic_index.len();
                    self.semantic_index.entry(semantic_id).or_insert(next);
                }
            }
        }
    }

    fn term_table_index(&self, id: SymbolId) -> Result<usize> {
        self.term_index
            .get(&id)
            .copied()
            .ok_or(Error::NoTableIndex { kind: "terminal", id })
    }

    fn nonterm_table_index(&self, id: SymbolId) -> Result<usize> {
        self.nonterm_index.get(&id).copied().ok_or(Error::NoTableIndex {
            kind: "non-terminal",
            id,
        })
    }

    fn semantic_table_index(&self, id: SemanticId) -> Result<usize> {
        self.semantic_index.get(&id).copied().ok_or(Error::NoTableIndex {
            kind: "semantic rule",
            id,
        })
    }

    /// Creates the LALR(1) parse tables for exporting.
    fn create(mut self) -> Result<TableSet> {
        let collection = self.collection;
        let grammar = collection.grammar();
        collection.report_progress("Creating parse tables...", false);

        self.create_table_indices();

        let num_states = collection.closures().len();
        let num_terminals = self.term_index.len();
        let num_nonterminals = self.nonterm_index.len();
        let num_rules = self.semantic_index.len();

        let mut shift = Table::new(num_states, num_terminals, ERROR_VAL, ACCEPT_VAL, ERROR_VAL);
        let mut reduce = Table::new(num_states, num_terminals, ERROR_VAL, ACCEPT_VAL, ERROR_VAL);
        let mut jump = Table::new(num_states, num_nonterminals, ERROR_VAL, ACCEPT_VAL, ERROR_VAL);

        let mut partials_rule_term =
            Table::new(num_states, num_terminals, ERROR_VAL, ACCEPT_VAL, ERROR_VAL);
        let mut partials_len_term =
            Table::new(num_states, num_terminals, ERROR_VAL, ACCEPT_VAL, 0);
        let mut partials_rule_nonterm =
            Table::new(num_states, num_nonterminals, ERROR_VAL, ACCEPT_VAL, ERROR_VAL);
        let mut partials_len_nonterm =
            Table::new(num_states, num_nonterminals, ERROR_VAL, ACCEPT_VAL, 0);
        let mut partials_lhs_nonterm =
            Table::new(num_states, num_nonterminals, ERROR_VAL, ACCEPT_VAL, ERROR_VAL);

        let mut num_rhs_per_rule = vec![0usize; num_rules];
        let mut lhs_index_per_rule = vec![0usize; num_rules];

        // shift and jump entries, plus partial matches per transition
        collection.report_progress("Calculating shift and jump entries...", false);

        for transition in collection.transitions() {
            let from = collection.closures()[transition.from].id();
            let to = collection.closures()[transition.to].id();

            let is_term = transition.symbol.is_term();
            let sym_id = grammar.symbol_id(transition.symbol);

            if is_term {
                let idx = self.term_table_index(sym_id)?;
                *shift.at_mut(from, idx) = to;
            } else {
                let idx = self.nonterm_table_index(sym_id)?;
                *jump.at_mut(from, idx) = to;
            }

            if self.settings.gen_partial_matches {
                if let Some(partial) =
                    collection.unique_partial_match(&transition.from_elements, true)
                {
                    let idx = self.term_table_index(sym_id)?;
                    let rule_idx = self.semantic_table_index(partial.rule_id)?;
                    *partials_rule_term.at_mut(from, idx) = rule_idx;
                    *partials_len_term.at_mut(from, idx) = partial.match_len;
                }
                if let Some(partial) =
                    collection.unique_partial_match(&transition.from_elements, false)
                {
                    let idx = self.nonterm_table_index(sym_id)?;
                    let rule_idx = self.semantic_table_index(partial.rule_id)?;
                    *partials_rule_nonterm.at_mut(from, idx) = rule_idx;
                    *partials_len_nonterm.at_mut(from, idx) = partial.match_len;
                    *partials_lhs_nonterm.at_mut(from, idx) = partial.lhs_id;
                }
            }
        }

        // reduce entries
        collection.report_progress("Calculating reduce entries...", false);

        for closure in collection.closures() {
            for &e in closure.elements() {
                let elem = &collection.arena()[e];
                if !elem.is_reducible(grammar) {
                    continue;
                }

                let semantic_id = elem.semantic_id().ok_or_else(|| {
                    Error::MissingSemanticRule(elem.describe(grammar))
                })?;

                let rule_idx = self.semantic_table_index(semantic_id)?;
                num_rhs_per_rule[rule_idx] = grammar.num_symbols(elem.rhs(grammar), false);

                let lhs_id = grammar.nonterminal(elem.lhs()).id();
                lhs_index_per_rule[rule_idx] = self.nonterm_table_index(lhs_id)?;

                // in the extended grammar the accepting production reduces
                // to the accept marker instead of a rule index
                let entry = if semantic_id == self.settings.accepting_rule {
                    ACCEPT_VAL
                } else {
                    rule_idx
                };

                if let Some(lookaheads) = elem.lookaheads() {
                    for &la in lookaheads {
                        let la_idx = self.term_table_index(grammar.terminal(la).id())?;
                        *reduce.at_mut(closure.id(), la_idx) = entry;
                    }
                }
            }
        }

        // try to resolve shift/reduce conflicts
        collection.report_progress("Solving shift/reduce conflicts...", false);

        let mut conflict_msgs: Vec<String> = Vec::new();

        for (pos, closure) in collection.closures().iter().enumerate() {
            let state = closure.id();
            let mut lookbacks: Option<BTreeSet<TermIndex>> = None;

            for term_idx in 0..num_terminals {
                let mut shift_entry = shift.at(state, term_idx);
                let mut reduce_entry = reduce.at(state, term_idx);
                if shift_entry == ERROR_VAL || reduce_entry == ERROR_VAL {
                    continue;
                }

                let term = self.seen_terminals[term_idx];
                let conflict_elem = match collection.element_with_cursor_at(pos, term) {
                    Some(elem) => elem,
                    None => continue,
                };

                if lookbacks.is_none() {
                    lookbacks = Some(if collection.generate_lookbacks() {
                        collection.lookback_terminals(pos)
                    } else {
                        BTreeSet::new()
                    });
                }
                let lookbacks = lookbacks.as_ref().unwrap();

                if collection.solve_shift_reduce(term, lookbacks, &mut shift_entry, &mut reduce_entry)
                {
                    *shift.at_mut(state, term_idx) = shift_entry;
                    *reduce.at_mut(state, term_idx) = reduce_entry;
                    continue;
                }

                let mut msg = format!(
                    "shift/reduce conflict in state {state}: {}",
                    collection.arena()[conflict_elem].describe(grammar)
                );
                if !lookbacks.is_empty() {
                    msg.push_str(" with look-back terminal(s): ");
                    let names: Vec<&str> = lookbacks
                        .iter()
                        .map(|&lb| grammar.terminal(lb).name())
                        .collect();
                    msg.push_str(&names.join(", "));
                }
                msg.push_str(&format!(
                    " and look-ahead terminal {} (can either shift to state {shift_entry} or \
                     reduce using rule {reduce_entry})",
                    grammar.terminal(term).name()
                ));
                conflict_msgs.push(msg);
            }
        }

        if !conflict_msgs.is_empty() {
            // only a fail state when look-backs were available; otherwise
            // the user wants the conflict solved at runtime
            let fatal = collection.generate_lookbacks() && collection.stop_on_conflicts();
            if fatal {
                collection.report_progress("Failed creating parse tables.", true);
                return Err(Error::TableConflicts(conflict_msgs));
            }
            for msg in &conflict_msgs {
                eprintln!("Error: {msg}.");
            }
        }

        collection.report_progress("Created parse tables.", true);

        // operator precedences and associativities
        let mut precedences = std::collections::HashMap::new();
        let mut associativities = std::collections::HashMap::new();
        for &term in &self.seen_terminals {
            let terminal = grammar.terminal(term);
            if let Some(prec) = terminal.precedence() {
                precedences.insert(terminal.id(), prec);
            }
            if let Some(assoc) = terminal.associativity() {
                associativities.insert(terminal.id(), assoc);
            }
        }

        let accepting_rule_idx = self
            .semantic_table_index(self.settings.accepting_rule)
            .unwrap_or(self.settings.accepting_rule);

        Ok(TableSet {
            num_states,
            num_terminals,
            num_nonterminals,
            shift,
            reduce,
            jump,
            partials_rule_term,
            partials_len_term,
            partials_rule_nonterm,
            partials_len_nonterm,
            partials_lhs_nonterm,
            term_index: self.term_index.into_iter().collect(),
            nonterm_index: self.nonterm_index.into_iter().collect(),
            semantic_index: self.semantic_index.into_iter().collect(),
            num_rhs_per_rule,
            lhs_index_per_rule,
            precedences,
            associativities,
            accepting_rule: accepting_rule_idx,
            starting_state: self.settings.starting_state,
        })
    }
}
