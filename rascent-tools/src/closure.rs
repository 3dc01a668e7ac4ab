//! Closures: sets of elements forming one parser state.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use rascent::index::{StateId, TermIndex};

use crate::element::{DepKind, ElemIndex, Element, ElementArena};
use crate::grammar::{Grammar, SymbolRef};

/// A set of elements plus a monotonic state id.
///
/// Two fingerprints identify a closure: the core hash ignores lookaheads
/// and identifies LALR-mergeable states, the full hash includes them.
#[derive(Debug)]
pub struct Closure {
    id: StateId,
    elements: Vec<ElemIndex>,
    cached_core_hash: Cell<Option<u64>>,
}

impl Closure {
    pub fn new(id: StateId) -> Self {
        Self {
            id,
            elements: Vec::new(),
            cached_core_hash: Cell::new(None),
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn set_id(&mut self, id: StateId) {
        self.id = id;
    }

    pub fn elements(&self) -> &[ElemIndex] {
        &self.elements
    }

    /// Finds an element with the same core already in the closure.
    pub fn find_by_core(&self, arena: &ElementArena, elem: &Element) -> Option<ElemIndex> {
        self.elements
            .iter()
            .copied()
            .find(|&e| arena[e].is_equal(elem, true))
    }

    /// Adds an element and generates the rest of the closure.
    ///
    /// If an element with the same core is already present, only the new
    /// element's lookahead dependencies are merged into it. Otherwise the
    /// element is inserted and, when its cursor stands before a
    /// non-terminal, that non-terminal's productions are added as fresh
    /// cursor-0 elements with a FIRST-mode dependency on the inserted one.
    pub fn add_element(
        &mut self,
        arena: &mut ElementArena,
        grammar: &Grammar,
        elem: Element,
    ) -> ElemIndex {
        if let Some(existing) = self.find_by_core(arena, &elem) {
            for &(pred, kind) in elem.dependencies() {
                arena.add_dependency(existing, pred, kind);
            }
            return existing;
        }

        let mut elem = elem;
        elem.set_parent(self.id);
        let deps: Vec<(ElemIndex, DepKind)> = elem.dependencies().to_vec();
        let idx = arena.alloc(elem);
        for (pred, _) in deps {
            arena[pred].push_forward_dependency(idx);
        }
        self.elements.push(idx);
        self.cached_core_hash.set(None);

        if let Some(SymbolRef::NonTerm(nonterm)) = arena[idx].symbol_at_cursor(grammar) {
            for prod_idx in 0..grammar.nonterminal(nonterm).num_productions() {
                let mut child = Element::new(nonterm, prod_idx, 0, grammar);
                child.push_dependency(idx, DepKind::First);
                self.add_element(arena, grammar, child);
            }
        }

        idx
    }

    /// The element whose cursor directly points at the given symbol.
    pub fn element_with_cursor_at(
        &self,
        arena: &ElementArena,
        grammar: &Grammar,
        sym: SymbolRef,
    ) -> Option<ElemIndex> {
        self.elements
            .iter()
            .copied()
            .find(|&e| arena[e].symbol_at_cursor(grammar) == Some(sym))
    }

    /// All possible transition symbols, sorted by symbol id for
    /// reproducible enumeration. Epsilon never appears.
    pub fn possible_transition_symbols(
        &self,
        arena: &ElementArena,
        grammar: &Grammar,
    ) -> Vec<SymbolRef> {
        let mut syms: Vec<SymbolRef> = self
            .elements
            .iter()
            .filter_map(|&e| arena[e].transition_symbol(grammar))
            .collect();
        syms.sort_by_key(|&sym| grammar.symbol_id(sym));
        syms.dedup();
        syms
    }

    /// Performs a transition on one symbol.
    ///
    /// Every element whose transition symbol matches is copied with an
    /// advanced cursor and a copy-mode dependency on its original, then
    /// inserted into a fresh target closure. Returns the target closure and
    /// the originating elements.
    pub fn do_transition(
        &self,
        arena: &mut ElementArena,
        grammar: &Grammar,
        trans_sym: SymbolRef,
        new_id: StateId,
    ) -> (Closure, Vec<ElemIndex>) {
        let mut target = Closure::new(new_id);
        let mut from_elements = Vec::new();

        for &e in &self.elements {
            if arena[e].transition_symbol(grammar) != Some(trans_sym) {
                continue;
            }

            // save the element this transition comes from
            from_elements.push(e);

            let mut advanced = arena[e].advanced(grammar);
            advanced.push_dependency(e, DepKind::Copy);
            target.add_element(arena, grammar, advanced);
        }

        (target, from_elements)
    }

    /// Performs all possible transitions from this closure.
    pub fn do_transitions(
        &self,
        arena: &mut ElementArena,
        grammar: &Grammar,
        next_id: &mut StateId,
    ) -> Vec<(SymbolRef, Closure, Vec<ElemIndex>)> {
        self.possible_transition_symbols(arena, grammar)
            .into_iter()
            .map(|sym| {
                let id = *next_id;
                *next_id += 1;
                let (target, from_elements) = self.do_transition(arena, grammar, sym, id);
                (sym, target, from_elements)
            })
            .collect()
    }

    /// Lookahead terminals shared between two or more reducible elements.
    pub fn reduce_conflicts(
        &self,
        arena: &ElementArena,
        grammar: &Grammar,
    ) -> BTreeMap<TermIndex, Vec<ElemIndex>> {
        let mut seen: BTreeMap<TermIndex, Vec<ElemIndex>> = BTreeMap::new();

        for &e in &self.elements {
            if !arena[e].is_reducible(grammar) {
                continue;
            }
            let lookaheads = match arena[e].lookaheads() {
                Some(las) => las.clone(),
                None => continue,
            };
            for la in lookaheads {
                seen.entry(la).or_default().push(e);
            }
        }

        seen.retain(|_, elems| elems.len() > 1);
        seen
    }

    pub fn has_reduce_conflict(&self, arena: &ElementArena, grammar: &Grammar) -> bool {
        !self.reduce_conflicts(arena, grammar).is_empty()
    }

    /// Tries to solve reduce/reduce conflicts by keeping the element with
    /// the longest match and discarding the shared lookahead from the
    /// others.
    ///
    /// This is a fallback without correctness guarantee on general
    /// grammars; it reports `true` as "attempted" even when nothing was
    /// merged.
    pub fn solve_reduce_conflicts(&self, arena: &mut ElementArena, grammar: &Grammar) -> bool {
        for (la, elems) in self.reduce_conflicts(arena, grammar) {
            let keep = elems.iter().copied().max_by_key(|&e| arena[e].cursor());
            for e in elems {
                if Some(e) != keep {
                    arena[e].remove_lookahead(la);
                }
            }
        }
        true
    }

    pub fn are_lookaheads_valid(&self, arena: &ElementArena) -> bool {
        self.elements.iter().all(|&e| arena[e].are_lookaheads_valid())
    }

    /// Fingerprint of the element cores, independent of lookaheads. The
    /// cores of a closure never change once built, so this is cached.
    pub fn core_hash(&self, arena: &ElementArena) -> u64 {
        if let Some(hash) = self.cached_core_hash.get() {
            return hash;
        }
        let hash = Self::combined_hash(self.elements.iter().map(|&e| arena[e].core_hash()));
        self.cached_core_hash.set(Some(hash));
        hash
    }

    /// Fingerprint including lookaheads; recomputed on demand since the
    /// sets grow during resolution.
    pub fn full_hash(&self, arena: &ElementArena) -> u64 {
        Self::combined_hash(self.elements.iter().map(|&e| arena[e].full_hash()))
    }

    fn combined_hash(hashes: impl Iterator<Item = u64>) -> u64 {
        // sort element hashes before combining them
        let mut sorted: Vec<u64> = hashes.collect();
        sorted.sort_unstable();

        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for hash in sorted {
            hash.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Multi-line state dump.
    pub fn describe(&self, arena: &ElementArena, grammar: &Grammar) -> String {
        let mut out = format!("State {}:\n", self.id);
        for &e in &self.elements {
            out.push('\t');
            out.push_str(&arena[e].describe(grammar));
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    /// S' -> S;  S -> L = R | R;  L -> * R | id;  R -> L
    fn test_grammar() -> (Grammar, rascent::index::NonTermIndex) {
        let mut g = Grammar::new();
        let eq = g.add_terminal(b'=' as usize, "=").unwrap();
        let deref = g.add_terminal(b'*' as usize, "*").unwrap();
        let id = g.add_terminal(1000, "id").unwrap();

        let start = g.add_nonterminal(2000, "S'").unwrap();
        let s = g.add_nonterminal(2001, "S").unwrap();
        let l = g.add_nonterminal(2002, "L").unwrap();
        let r = g.add_nonterminal(2003, "R").unwrap();

        use SymbolRef::{NonTerm as N, Term as T};
        g.add_production(start, vec![N(s)], Some(0));
        g.add_production(s, vec![N(l), T(eq), N(r)], Some(1));
        g.add_production(s, vec![N(r)], Some(2));
        g.add_production(l, vec![T(deref), N(r)], Some(3));
        g.add_production(l, vec![T(id)], Some(4));
        g.add_production(r, vec![N(l)], Some(5));

        (g, start)
    }

    fn seed_closure(grammar: &Grammar, start: rascent::index::NonTermIndex) -> (Closure, ElementArena) {
        let mut arena = ElementArena::new();
        let mut closure = Closure::new(0);
        let elem = Element::with_lookaheads(
            start,
            0,
            0,
            grammar,
            BTreeSet::from([grammar.end()]),
        );
        closure.add_element(&mut arena, grammar, elem);
        (closure, arena)
    }

    #[test]
    fn closure_expansion_adds_all_productions() {
        let (g, start) = test_grammar();
        let (closure, arena) = seed_closure(&g, start);

        // S' -> .S, S -> .L=R, S -> .R, L -> .*R, L -> .id, R -> .L
        assert_eq!(closure.elements().len(), 6);

        // children carry FIRST-mode dependencies
        let with_first_deps = closure
            .elements()
            .iter()
            .filter(|&&e| {
                arena[e]
                    .dependencies()
                    .iter()
                    .any(|&(_, kind)| kind == DepKind::First)
            })
            .count();
        assert_eq!(with_first_deps, 5);
    }

    #[test]
    fn duplicate_cores_are_merged() {
        let (g, start) = test_grammar();
        let (mut closure, mut arena) = seed_closure(&g, start);

        let before = closure.elements().len();
        let dup = Element::new(start, 0, 0, &g);
        closure.add_element(&mut arena, &g, dup);
        assert_eq!(closure.elements().len(), before);
    }

    #[test]
    fn transition_symbols_are_sorted_and_deduped() {
        let (g, start) = test_grammar();
        let (closure, arena) = seed_closure(&g, start);

        let syms = closure.possible_transition_symbols(&arena, &g);
        // transitions on: *, id, S, L, R
        assert_eq!(syms.len(), 5);
        let ids: Vec<usize> = syms.iter().map(|&s| g.symbol_id(s)).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn transition_advances_cursor_and_keeps_sources() {
        let (g, start) = test_grammar();
        let (closure, mut arena) = seed_closure(&g, start);

        let l = g.nonterm_by_id(2002).unwrap();
        let (target, from) = closure.do_transition(&mut arena, &g, SymbolRef::NonTerm(l), 1);

        // S -> L.=R and R -> L.
        assert_eq!(from.len(), 2);
        assert_eq!(target.elements().len(), 2);
        for &e in target.elements() {
            assert_eq!(arena[e].cursor(), 1);
            assert!(arena[e]
                .dependencies()
                .iter()
                .any(|&(_, kind)| kind == DepKind::Copy));
        }
    }

    #[test]
    fn core_hash_ignores_lookaheads() {
        let (g, start) = test_grammar();
        let (closure_a, mut arena_a) = seed_closure(&g, start);
        let hash_a = closure_a.core_hash(&arena_a);

        // same cores, different lookaheads
        let (closure_b, arena_b) = {
            let mut arena = ElementArena::new();
            let mut closure = Closure::new(7);
            let elem = Element::new(start, 0, 0, &g);
            closure.add_element(&mut arena, &g, elem);
            (closure, arena)
        };

        assert_eq!(hash_a, closure_b.core_hash(&arena_b));
        assert_ne!(closure_a.full_hash(&arena_a), closure_b.full_hash(&arena_b));

        // adding a lookahead changes the full hash only
        let first = closure_a.elements()[0];
        arena_a[first].add_lookahead(g.eps());
        assert_eq!(closure_a.core_hash(&arena_a), hash_a);
    }
}
