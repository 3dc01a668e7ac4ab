//! The LALR(1) collection: the graph of closures joined by transitions.
//!
//! Construction follows the canonical worklist algorithm. Target closures
//! with a core already in the collection are not added again; instead their
//! elements' lookahead dependencies are merged into the existing closure's
//! elements, and the lookahead sets are resolved to a fixed point over the
//! dependency graph afterwards.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;

use colored::Colorize;

use rascent::index::{NonTermIndex, SemanticId, StateId, SymbolId, TermIndex};

use crate::closure::Closure;
use crate::conflicts;
use crate::element::{DepKind, ElemIndex, Element, ElementArena};
use crate::error::{Error, Result};
use crate::grammar::{FirstSets, Grammar, SymbolRef};

/// A transition between two closures, by their positions in the
/// collection. The originating elements are preserved because unique
/// partial-match analysis needs them.
#[derive(Debug)]
pub struct Transition {
    pub from: usize,
    pub to: usize,
    pub symbol: SymbolRef,
    pub from_elements: Vec<ElemIndex>,
}

/// A uniquely identified partial rule match on a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialMatch {
    pub rule_id: SemanticId,
    pub match_len: usize,
    pub lhs_id: SymbolId,
}

pub type ProgressObserver = Box<dyn Fn(&str, bool)>;

type FirstCacheKey = (NonTermIndex, usize, usize, Option<TermIndex>);

pub struct Collection<'g> {
    grammar: &'g Grammar,
    first_sets: FirstSets,

    arena: ElementArena,
    closures: Vec<Closure>,
    transitions: Vec<Transition>,
    seen_transitions: HashSet<(usize, usize, SymbolRef)>,

    next_state_id: StateId,

    stop_on_conflicts: bool,
    try_solve_reduce_conflicts: bool,
    generate_lookbacks: bool,

    progress_observer: Option<ProgressObserver>,

    /// FIRST(remainder . trailing) results, keyed by
    /// (lhs, production, offset, trailing).
    first_cache: HashMap<FirstCacheKey, BTreeSet<TermIndex>>,
}

impl<'g> Collection<'g> {
    /// Seeds the collection with the augmented start item
    /// `start -> . rhs, {end}` in a fresh closure.
    pub fn new(grammar: &'g Grammar, start: NonTermIndex) -> Result<Self> {
        if grammar.nonterminal(start).num_productions() == 0 {
            return Err(Error::Grammar(format!(
                "start symbol {} has no productions",
                grammar.nonterminal(start).name()
            )));
        }

        let first_sets = FirstSets::new(grammar);
        let mut arena = ElementArena::new();
        let mut seed = Closure::new(0);

        let elem = Element::with_lookaheads(
            start,
            0,
            0,
            grammar,
            BTreeSet::from([grammar.end()]),
        );
        seed.add_element(&mut arena, grammar, elem);

        Ok(Self {
            grammar,
            first_sets,
            arena,
            closures: vec![seed],
            transitions: Vec::new(),
            seen_transitions: HashSet::new(),
            next_state_id: 1,
            stop_on_conflicts: true,
            try_solve_reduce_conflicts: false,
            generate_lookbacks: true,
            progress_observer: None,
            first_cache: HashMap::new(),
        })
    }

    pub fn grammar(&self) -> &'g Grammar {
        self.grammar
    }

    pub fn arena(&self) -> &ElementArena {
        &self.arena
    }

    pub fn closures(&self) -> &[Closure] {
        &self.closures
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn first_sets(&self) -> &FirstSets {
        &self.first_sets
    }

    /// Stop table/code generation on conflicts (default) or report and
    /// continue.
    pub fn set_stop_on_conflicts(&mut self, stop: bool) {
        self.stop_on_conflicts = stop;
    }

    pub fn stop_on_conflicts(&self) -> bool {
        self.stop_on_conflicts
    }

    /// Opt into the longest-match fallback for reduce/reduce conflicts.
    pub fn set_solve_reduce_conflicts(&mut self, solve: bool) {
        self.try_solve_reduce_conflicts = solve;
    }

    /// Skip look-back generation; unresolved shift/reduce conflicts are
    /// then reported but not fatal, leaving both table entries for a
    /// runtime operator-precedence solution.
    pub fn set_generate_lookbacks(&mut self, generate: bool) {
        self.generate_lookbacks = generate;
    }

    pub fn generate_lookbacks(&self) -> bool {
        self.generate_lookbacks
    }

    pub fn set_progress_observer(&mut self, observer: ProgressObserver) {
        self.progress_observer = Some(observer);
    }

    pub fn report_progress(&self, msg: &str, finished: bool) {
        if let Some(observer) = &self.progress_observer {
            observer(msg, finished);
        }
    }

    /// Performs all possible LALR(1) transitions from all closures and
    /// resolves the lookaheads.
    pub fn do_transitions(&mut self) -> Result<()> {
        let mut core_cache: HashMap<u64, usize> = HashMap::new();
        core_cache.insert(self.closures[0].core_hash(&self.arena), 0);

        let mut queue: VecDeque<usize> = VecDeque::from([0]);

        while let Some(pos) = queue.pop_front() {
            let results =
                self.closures[pos].do_transitions(&mut self.arena, self.grammar, &mut self.next_state_id);

            for (sym, target, from_elements) in results {
                let hash = target.core_hash(&self.arena);

                match core_cache.get(&hash).copied() {
                    Some(existing) => {
                        // reuse the closure with the same core: unite the
                        // lookahead dependencies
                        self.merge_lookahead_dependencies(existing, &target);
                        self.record_transition(pos, existing, sym, from_elements);
                    }
                    None => {
                        let new_pos = self.closures.len();
                        core_cache.insert(hash, new_pos);
                        self.closures.push(target);
                        queue.push_back(new_pos);
                        self.record_transition(pos, new_pos, sym, from_elements);
                    }
                }

                self.report_progress(
                    &format!(
                        "Calculating transitions. Total closures: {}, total transitions: {}.",
                        self.closures.len(),
                        self.transitions.len()
                    ),
                    false,
                );
            }
        }
        self.report_progress("Calculated transitions.", true);

        self.resolve_lookaheads();
        self.report_progress("Calculated lookaheads.", true);

        if self.try_solve_reduce_conflicts {
            for closure in &self.closures {
                closure.solve_reduce_conflicts(&mut self.arena, self.grammar);
            }
        }

        self.simplify();
        self.report_progress("Simplified transitions.", true);

        let reduce_reduce = self.reduce_conflict_states();
        let shift_reduce = self.shift_reduce_conflict_states();
        if !reduce_reduce.is_empty() || !shift_reduce.is_empty() {
            let error = Error::Conflicts {
                reduce_reduce,
                shift_reduce,
            };
            if self.stop_on_conflicts {
                return Err(error);
            }
            eprintln!("{} {error}", "Error:".red());
        }

        Ok(())
    }

    fn record_transition(
        &mut self,
        from: usize,
        to: usize,
        symbol: SymbolRef,
        from_elements: Vec<ElemIndex>,
    ) {
        if self.seen_transitions.insert((from, to, symbol)) {
            self.transitions.push(Transition {
                from,
                to,
                symbol,
                from_elements,
            });
        }
    }

    /// Merges the lookahead dependencies of a tentative closure into the
    /// existing closure with the same core, matching elements by core hash.
    fn merge_lookahead_dependencies(&mut self, existing_pos: usize, tentative: &Closure) {
        let existing_elems: Vec<ElemIndex> = self.closures[existing_pos].elements().to_vec();

        for &te in tentative.elements() {
            let core = self.arena[te].core_hash();
            let matching = existing_elems
                .iter()
                .copied()
                .find(|&ee| self.arena[ee].core_hash() == core);

            if let Some(ee) = matching {
                for (pred, kind) in self.arena[te].dependencies().to_vec() {
                    self.arena.add_dependency(ee, pred, kind);
                }
            }
        }
    }

    /// Resolves every element's lookahead set to a fixed point of its
    /// dependency graph. Additions invalidate dependent elements, so the
    /// outer loop runs until a full pass finds everything valid.
    fn resolve_lookaheads(&mut self) {
        loop {
            let mut all_valid = true;

            for pos in 0..self.closures.len() {
                self.report_progress(
                    &format!("Calculating lookaheads for state {pos}."),
                    false,
                );
                let elems: Vec<ElemIndex> = self.closures[pos].elements().to_vec();
                for e in elems {
                    if self.arena[e].lookaheads_valid_flag() {
                        continue;
                    }
                    all_valid = false;
                    self.resolve_element(e, 0);
                }
            }

            if all_valid {
                break;
            }
        }
    }

    /// Walks the lookahead dependency graph of one element.
    ///
    /// Copy-mode predecessors contribute their lookaheads directly;
    /// FIRST-mode predecessors contribute FIRST of their remainder with
    /// each of their lookaheads as trailing symbol. The already-resolved
    /// short-circuit is bypassed at recursion depth zero, because cycles in
    /// the production rules may have produced an incomplete set on the
    /// first pass.
    fn resolve_element(&mut self, elem: ElemIndex, depth: usize) {
        if self.arena[elem].dependencies().is_empty() {
            self.arena[elem].set_lookaheads_valid(true);
            return;
        }

        if depth > 0 && self.arena[elem].has_lookaheads() {
            return;
        }

        let deps: Vec<(ElemIndex, DepKind)> = self.arena[elem].dependencies().to_vec();

        // copy lookaheads from the predecessor elements
        let mut seen: HashSet<ElemIndex> = HashSet::new();
        for &(pred, kind) in &deps {
            if kind != DepKind::Copy || !seen.insert(pred) {
                continue;
            }

            if !self.arena[pred].are_lookaheads_valid() && pred != elem {
                self.resolve_element(pred, depth + 1);
            }

            let pred_lookaheads: Vec<TermIndex> = match self.arena[pred].lookaheads() {
                Some(las) => las.iter().copied().collect(),
                None => Vec::new(),
            };

            let mut invalidate = false;
            for la in pred_lookaheads {
                if self.arena[elem].add_lookahead(la) {
                    invalidate = true;
                }
            }
            if invalidate {
                self.arena.invalidate_forward(elem);
            }
            self.arena[elem].set_lookaheads_valid(true);
        }

        // calculate FIRST sets from the predecessor elements
        seen.clear();
        for &(pred, kind) in &deps {
            if kind != DepKind::First || !seen.insert(pred) {
                continue;
            }

            if !self.arena[pred].are_lookaheads_valid() && pred != elem {
                self.resolve_element(pred, depth + 1);
            }

            let pred_lookaheads: Vec<TermIndex> = match self.arena[pred].lookaheads() {
                Some(las) => las.iter().copied().collect(),
                None => Vec::new(),
            };
            let (lhs, production, cursor) = self.arena[pred].core();

            let grammar = self.grammar;
            let mut invalidate = false;
            for la in pred_lookaheads {
                let key = (lhs, production, cursor + 1, Some(la));
                let firsts = match self.first_cache.get(&key) {
                    Some(cached) => cached.clone(),
                    None => {
                        let word = &grammar.nonterminal(lhs).production(production).rhs;
                        let firsts =
                            self.first_sets
                                .first_of_seq(grammar, word, cursor + 1, Some(la));
                        self.first_cache.insert(key, firsts.clone());
                        firsts
                    }
                };

                for term in firsts {
                    if term == self.grammar.eps() {
                        continue;
                    }
                    if self.arena[elem].add_lookahead(term) {
                        invalidate = true;
                    }
                }
            }
            if invalidate {
                self.arena.invalidate_forward(elem);
            }
            self.arena[elem].set_lookaheads_valid(true);
        }
    }

    /// Renumbers closure ids contiguously starting at zero, deduping by
    /// full hash. The collection is kept in creation order, which is id
    /// order by construction.
    fn simplify(&mut self) {
        let mut already_seen: HashSet<u64> = HashSet::new();
        let mut idmap: HashMap<StateId, StateId> = HashMap::new();
        let mut newid: StateId = 0;

        for pos in 0..self.closures.len() {
            let hash = self.closures[pos].full_hash(&self.arena);
            if !already_seen.insert(hash) {
                continue;
            }

            let oldid = self.closures[pos].id();
            let mapped = *idmap.entry(oldid).or_insert_with(|| {
                let id = newid;
                newid += 1;
                id
            });
            self.closures[pos].set_id(mapped);
        }
    }

    /// Closures with reduce/reduce conflicts.
    pub fn reduce_conflict_states(&self) -> Vec<StateId> {
        let mut states: Vec<StateId> = self
            .closures
            .iter()
            .filter(|closure| closure.has_reduce_conflict(&self.arena, self.grammar))
            .map(|closure| closure.id())
            .collect();
        states.sort_unstable();
        states
    }

    /// Closures with shift/reduce conflicts that precedence or
    /// associativity cannot solve.
    pub fn shift_reduce_conflict_states(&self) -> Vec<StateId> {
        let mut states = BTreeSet::new();

        for (pos, closure) in self.closures.iter().enumerate() {
            // all terminals leading to a reduction
            let mut reduce_lookaheads: BTreeSet<TermIndex> = BTreeSet::new();
            for &e in closure.elements() {
                if !self.arena[e].is_reducible(self.grammar) {
                    continue;
                }
                if let Some(las) = self.arena[e].lookaheads() {
                    reduce_lookaheads.extend(las.iter().copied());
                }
            }

            // all terminals leading to a shift
            for transition in &self.transitions {
                if transition.from != pos {
                    continue;
                }
                let term = match transition.symbol {
                    SymbolRef::Term(t) => t,
                    SymbolRef::NonTerm(_) => continue,
                };
                let terminal = self.grammar.terminal(term);
                let has_solution =
                    terminal.precedence().is_some() || terminal.associativity().is_some();
                if reduce_lookaheads.contains(&term) && !has_solution {
                    states.insert(closure.id());
                }
            }
        }

        states.into_iter().collect()
    }

    /// Terminals on some transition path entering the given closure,
    /// walking backwards through non-terminal transitions.
    pub fn lookback_terminals(&self, pos: usize) -> BTreeSet<TermIndex> {
        let mut seen: HashSet<usize> = HashSet::new();
        self.lookback_terminals_impl(pos, &mut seen)
    }

    fn lookback_terminals_impl(
        &self,
        pos: usize,
        seen: &mut HashSet<usize>,
    ) -> BTreeSet<TermIndex> {
        let mut terms = BTreeSet::new();

        for transition in &self.transitions {
            if transition.to != pos {
                continue;
            }
            match transition.symbol {
                SymbolRef::Term(t) => {
                    terms.insert(t);
                }
                SymbolRef::NonTerm(_) => {
                    if seen.insert(transition.from) {
                        terms.extend(self.lookback_terminals_impl(transition.from, seen));
                    }
                }
            }
        }

        terms
    }

    /// Terminal or non-terminal transitions originating from a closure.
    pub fn transitions_from(&self, pos: usize, term: bool) -> Vec<&Transition> {
        self.transitions
            .iter()
            .filter(|t| t.from == pos && t.symbol.is_term() == term)
            .collect()
    }

    /// The rule number and match length of a unique partial match.
    ///
    /// Groups the originating elements by semantic rule, keeping the
    /// longest cursor per rule. Terminal transitions match with a minimum
    /// length of zero because the terminal lookahead is already known;
    /// non-terminal transitions need a cursor of at least one, since the
    /// same non-terminal sits at position zero of multiple generated
    /// elements.
    pub fn unique_partial_match(
        &self,
        from_elements: &[ElemIndex],
        term_trans: bool,
    ) -> Option<PartialMatch> {
        let mut matching: HashMap<SemanticId, (usize, NonTermIndex)> = HashMap::new();

        for &e in from_elements {
            let elem = &self.arena[e];

            let is_term = match elem.transition_symbol(self.grammar) {
                Some(sym) => sym.is_term(),
                None => continue,
            };
            if is_term != term_trans {
                continue;
            }

            let match_len = elem.cursor();
            if !term_trans && match_len == 0 {
                continue;
            }

            let rule_id = match elem.semantic_id() {
                Some(rule) => rule,
                None => continue,
            };

            matching
                .entry(rule_id)
                .and_modify(|entry| {
                    // longer match with the same rule?
                    if match_len > entry.0 {
                        *entry = (match_len, elem.lhs());
                    }
                })
                .or_insert((match_len, elem.lhs()));
        }

        if matching.len() == 1 {
            let (&rule_id, &(match_len, lhs)) = matching.iter().next().unwrap();
            return Some(PartialMatch {
                rule_id,
                match_len,
                lhs_id: self.grammar.nonterminal(lhs).id(),
            });
        }

        None
    }

    /// The element of a closure whose cursor points at the given terminal.
    pub fn element_with_cursor_at(&self, pos: usize, term: TermIndex) -> Option<ElemIndex> {
        self.closures[pos].element_with_cursor_at(&self.arena, self.grammar, SymbolRef::Term(term))
    }

    /// Tries to solve a shift/reduce conflict between two table entries,
    /// erasing the losing entry. See [`conflicts::solve_shift_reduce_entries`].
    pub fn solve_shift_reduce(
        &self,
        lookahead: TermIndex,
        lookbacks: &BTreeSet<TermIndex>,
        shift_entry: &mut usize,
        reduce_entry: &mut usize,
    ) -> bool {
        conflicts::solve_shift_reduce_entries(
            self.grammar,
            lookahead,
            lookbacks,
            shift_entry,
            reduce_entry,
        )
    }
}

impl fmt::Display for Collection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "Collection".bold())?;
        for (pos, closure) in self.closures.iter().enumerate() {
            write!(f, "{}", closure.describe(&self.arena, self.grammar))?;

            let lookbacks = self.lookback_terminals(pos);
            if !lookbacks.is_empty() {
                write!(f, "Lookback terminals: ")?;
                for &lb in &lookbacks {
                    write!(f, "{} ", self.grammar.terminal(lb).name())?;
                }
                writeln!(f)?;
            }
            writeln!(f)?;
        }

        writeln!(f, "{}", "Transitions".bold())?;
        for transition in &self.transitions {
            let line = format!(
                "state {} \u{2192} {} via {}",
                self.closures[transition.from].id(),
                self.closures[transition.to].id(),
                self.grammar.symbol_name(transition.symbol)
            );
            if transition.symbol.is_term() {
                writeln!(f, "{}", line.green())?;
            } else {
                writeln!(f, "{}", line.blue())?;
            }
        }
        writeln!(f)?;

        writeln!(f, "{}", "Tables".bold())?;
        for transition in &self.transitions {
            let from = self.closures[transition.from].id();
            let to = self.closures[transition.to].id();
            let name = self.grammar.symbol_name(transition.symbol);
            if transition.symbol.is_term() {
                writeln!(f, "{}", format!("shift[ state {from}, {name} ] = state {to}").green())?;
            } else {
                writeln!(f, "{}", format!("jump[ state {from}, {name} ] = state {to}").blue())?;
            }
        }
        for closure in &self.closures {
            for &e in closure.elements() {
                if !self.arena[e].is_reducible(self.grammar) {
                    continue;
                }
                let elem = &self.arena[e];
                let mut line = format!("reduce[ state {}, ", closure.id());
                if let Some(las) = elem.lookaheads() {
                    for &la in las {
                        line.push_str(self.grammar.terminal(la).name());
                        line.push(' ');
                    }
                }
                line.push_str("] = ");
                if let Some(rule) = elem.semantic_id() {
                    line.push_str(&format!("[rule {rule}] "));
                }
                line.push_str(&self.grammar.production_string(elem.lhs(), elem.production()));
                writeln!(f, "{}", line.red())?;
            }
        }

        Ok(())
    }
}
