//! LR elements (items) and the arena that owns them.
//!
//! An element is a production with a cursor, a lookahead set and the
//! dependency edges along which lookaheads propagate during LALR merging.
//! Elements of all closures live in one arena owned by the collection and
//! reference each other through [`ElemIndex`] handles, so the dependency
//! graph can span closures without shared ownership.

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::ops::{Index, IndexMut};
use std::slice::{Iter, IterMut};

use rascent::create_index;
use rascent::index::{NonTermIndex, SemanticId, StateId, TermIndex};

use crate::grammar::{Grammar, SymbolRef, Word};

create_index!(ElemIndex, ElemVec);

/// How lookaheads flow from a predecessor element into this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepKind {
    /// Copy the predecessor's lookaheads (cursor advance within a
    /// transition).
    Copy,
    /// Take FIRST of the predecessor's remainder with each predecessor
    /// lookahead as trailing symbol (closure expansion).
    First,
}

/// An LR item: `lhs -> alpha . beta` with a lookahead set.
#[derive(Debug, Clone)]
pub struct Element {
    lhs: NonTermIndex,
    production: usize,
    cursor: usize,
    semantic_id: Option<SemanticId>,

    /// Tentatively absent while the fixpoint is running.
    lookaheads: Option<BTreeSet<TermIndex>>,
    lookaheads_valid: bool,

    /// Predecessors this element's lookaheads are computed from.
    dependencies: Vec<(ElemIndex, DepKind)>,
    /// Elements in other closures whose lookaheads depend on this one.
    forward_dependencies: Vec<ElemIndex>,

    parent: StateId,
}

impl Element {
    pub fn new(lhs: NonTermIndex, production: usize, cursor: usize, grammar: &Grammar) -> Self {
        Self {
            lhs,
            production,
            cursor,
            semantic_id: grammar.nonterminal(lhs).production(production).semantic_id,
            lookaheads: None,
            lookaheads_valid: false,
            dependencies: Vec::new(),
            forward_dependencies: Vec::new(),
            parent: StateId::MAX,
        }
    }

    pub fn with_lookaheads(
        lhs: NonTermIndex,
        production: usize,
        cursor: usize,
        grammar: &Grammar,
        lookaheads: BTreeSet<TermIndex>,
    ) -> Self {
        let mut elem = Self::new(lhs, production, cursor, grammar);
        elem.lookaheads = Some(lookaheads);
        elem
    }

    pub fn lhs(&self) -> NonTermIndex {
        self.lhs
    }

    pub fn production(&self) -> usize {
        self.production
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn semantic_id(&self) -> Option<SemanticId> {
        self.semantic_id
    }

    pub fn parent(&self) -> StateId {
        self.parent
    }

    pub fn set_parent(&mut self, closure: StateId) {
        self.parent = closure;
    }

    pub fn rhs<'g>(&self, grammar: &'g Grammar) -> &'g Word {
        &grammar.nonterminal(self.lhs).production(self.production).rhs
    }

    /// The symbol directly at the cursor, without skipping epsilon.
    pub fn symbol_at_cursor(&self, grammar: &Grammar) -> Option<SymbolRef> {
        self.rhs(grammar).get(self.cursor)
    }

    /// The first non-epsilon symbol at or after the cursor; `None` once the
    /// cursor is past the end.
    pub fn transition_symbol(&self, grammar: &Grammar) -> Option<SymbolRef> {
        let rhs = self.rhs(grammar);
        let mut idx = self.cursor;
        while let Some(sym) = rhs.get(idx) {
            if grammar.is_eps(sym) {
                idx += 1;
                continue;
            }
            return Some(sym);
        }
        None
    }

    /// A copy with the cursor advanced by one.
    pub fn advanced(&self, grammar: &Grammar) -> Self {
        let mut cursor = self.cursor;
        if cursor < self.rhs(grammar).len() {
            cursor += 1;
        }
        Self::new(self.lhs, self.production, cursor, grammar)
    }

    /// Is the cursor at the end, so the full handle can be reduced?
    /// Trailing epsilon symbols are skipped.
    pub fn is_reducible(&self, grammar: &Grammar) -> bool {
        self.transition_symbol(grammar).is_none()
    }

    /// Inserts a lookahead terminal; returns whether it is newly added.
    pub fn add_lookahead(&mut self, term: TermIndex) -> bool {
        self.lookaheads
            .get_or_insert_with(BTreeSet::new)
            .insert(term)
    }

    pub fn remove_lookahead(&mut self, term: TermIndex) {
        if let Some(lookaheads) = &mut self.lookaheads {
            lookaheads.remove(&term);
        }
    }

    pub fn has_lookaheads(&self) -> bool {
        self.lookaheads.is_some()
    }

    pub fn lookaheads(&self) -> Option<&BTreeSet<TermIndex>> {
        self.lookaheads.as_ref()
    }

    /// The validity flag alone.
    pub fn lookaheads_valid_flag(&self) -> bool {
        self.lookaheads_valid
    }

    /// Valid means the flag is set and a lookahead set exists.
    pub fn are_lookaheads_valid(&self) -> bool {
        self.lookaheads_valid && self.has_lookaheads()
    }

    pub fn set_lookaheads_valid(&mut self, valid: bool) {
        self.lookaheads_valid = valid;
    }

    pub fn dependencies(&self) -> &[(ElemIndex, DepKind)] {
        &self.dependencies
    }

    pub fn forward_dependencies(&self) -> &[ElemIndex] {
        &self.forward_dependencies
    }

    pub(crate) fn push_dependency(&mut self, pred: ElemIndex, kind: DepKind) -> bool {
        if self.dependencies.contains(&(pred, kind)) {
            return false;
        }
        self.dependencies.push((pred, kind));
        true
    }

    pub(crate) fn push_forward_dependency(&mut self, elem: ElemIndex) {
        if !self.forward_dependencies.contains(&elem) {
            self.forward_dependencies.push(elem);
        }
    }

    /// The core of the item, ignoring lookaheads.
    pub fn core(&self) -> (NonTermIndex, usize, usize) {
        (self.lhs, self.production, self.cursor)
    }

    pub fn core_hash(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.core().hash(&mut hasher);
        hasher.finish()
    }

    /// Hash including the lookahead set.
    pub fn full_hash(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.core().hash(&mut hasher);
        if let Some(lookaheads) = &self.lookaheads {
            for la in lookaheads {
                la.hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    /// Core equality; full equality additionally requires all of `other`'s
    /// lookaheads to be contained in this element's set.
    pub fn is_equal(&self, other: &Element, only_core: bool) -> bool {
        if self.core() != other.core() {
            return false;
        }
        if only_core {
            return true;
        }
        match (&self.lookaheads, &other.lookaheads) {
            (_, None) => true,
            (None, Some(others)) => others.is_empty(),
            (Some(ours), Some(others)) => others.is_subset(ours),
        }
    }

    /// `"lhs -> [ alpha . beta | lookaheads | rule n ]"`
    pub fn describe(&self, grammar: &Grammar) -> String {
        let rhs = self.rhs(grammar);
        let mut out = format!("{} \u{2192} [ ", grammar.nonterminal(self.lhs).name());

        for (idx, &sym) in rhs.symbols().iter().enumerate() {
            if idx == self.cursor {
                out.push('\u{2022}');
            }
            out.push_str(grammar.symbol_name(sym));
            if idx < rhs.len() - 1 {
                out.push(' ');
            }
        }
        if self.cursor >= rhs.len() {
            out.push('\u{2022}');
        }

        if let Some(lookaheads) = &self.lookaheads {
            out.push_str(" | ");
            for &la in lookaheads {
                out.push_str(grammar.terminal(la).name());
                out.push(' ');
            }
            if let Some(rule) = self.semantic_id {
                out.push_str(&format!("| rule {rule} "));
            }
        } else {
            out.push(' ');
        }

        out.push(']');
        out
    }
}

/// Arena owning the elements of every closure of a collection.
#[derive(Debug, Default)]
pub struct ElementArena {
    elems: ElemVec<Element>,
}

impl ElementArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, elem: Element) -> ElemIndex {
        self.elems.push(elem)
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// Records that `elem`'s lookaheads depend on `pred`, maintaining the
    /// predecessor's forward link for cache invalidation.
    pub fn add_dependency(&mut self, elem: ElemIndex, pred: ElemIndex, kind: DepKind) {
        if self.elems[elem].push_dependency(pred, kind) {
            self.elems[pred].push_forward_dependency(elem);
        }
    }

    /// Invalidates the lookaheads of all elements that transitively depend
    /// on this one. The sets are kept; only the validity flag flips.
    pub fn invalidate_forward(&mut self, elem: ElemIndex) {
        let mut stack: Vec<ElemIndex> = self.elems[elem].forward_dependencies().to_vec();
        while let Some(next) = stack.pop() {
            if self.elems[next].are_lookaheads_valid() {
                self.elems[next].set_lookaheads_valid(false);
                stack.extend(self.elems[next].forward_dependencies());
            }
        }
    }
}

impl Index<ElemIndex> for ElementArena {
    type Output = Element;

    fn index(&self, index: ElemIndex) -> &Element {
        &self.elems[index]
    }
}

impl IndexMut<ElemIndex> for ElementArena {
    fn index_mut(&mut self, index: ElemIndex) -> &mut Element {
        &mut self.elems[index]
    }
}
