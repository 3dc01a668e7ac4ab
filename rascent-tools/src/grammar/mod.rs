//! Grammar model: terminals, non-terminals, words and productions.
//!
//! All symbols live in a [`Grammar`] context and are referenced through
//! typed indices; the epsilon and end-of-input sentinels are members of the
//! grammar, created with it. A grammar is assembled once and treated as
//! immutable while a collection is being built from it.

use std::collections::HashMap;
use std::fmt;

use rascent::index::{
    NonTermIndex, NonTermVec, SemanticId, SymbolId, TermIndex, TermVec, END_ID, EPS_ID,
};
use rascent::table::Assoc;

use crate::error::{Error, Result};

mod first;
pub use first::{FirstSets, FollowSets};

/// Reference to a symbol owned by the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolRef {
    Term(TermIndex),
    NonTerm(NonTermIndex),
}

impl SymbolRef {
    pub fn is_term(&self) -> bool {
        matches!(self, Self::Term(_))
    }
}

/// Ordered sequence of symbols forming a production right-hand side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Word {
    syms: Vec<SymbolRef>,
}

impl Word {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a symbol and returns its position.
    pub fn add_symbol(&mut self, sym: SymbolRef) -> usize {
        self.syms.push(sym);
        self.syms.len() - 1
    }

    pub fn remove_symbol(&mut self, idx: usize) {
        self.syms.remove(idx);
    }

    pub fn get(&self, idx: usize) -> Option<SymbolRef> {
        self.syms.get(idx).copied()
    }

    pub fn symbols(&self) -> &[SymbolRef] {
        &self.syms
    }

    pub fn len(&self) -> usize {
        self.syms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.syms.is_empty()
    }
}

impl From<Vec<SymbolRef>> for Word {
    fn from(syms: Vec<SymbolRef>) -> Self {
        Self { syms }
    }
}

impl FromIterator<SymbolRef> for Word {
    fn from_iter<I: IntoIterator<Item = SymbolRef>>(iter: I) -> Self {
        Self {
            syms: iter.into_iter().collect(),
        }
    }
}

/// A production alternative of a non-terminal: a right-hand side word and
/// the id of the semantic rule applied when it is reduced.
#[derive(Debug, Clone)]
pub struct Production {
    pub rhs: Word,
    pub semantic_id: Option<SemanticId>,
}

#[derive(Debug, Clone)]
pub struct Terminal {
    id: SymbolId,
    name: String,
    eps: bool,
    end: bool,
    precedence: Option<u32>,
    associativity: Option<Assoc>,
}

impl Terminal {
    pub fn id(&self) -> SymbolId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_eps(&self) -> bool {
        self.eps
    }

    pub fn is_end(&self) -> bool {
        self.end
    }

    pub fn precedence(&self) -> Option<u32> {
        self.precedence
    }

    pub fn associativity(&self) -> Option<Assoc> {
        self.associativity
    }
}

#[derive(Debug, Clone)]
pub struct NonTerminal {
    id: SymbolId,
    name: String,
    productions: Vec<Production>,
}

impl NonTerminal {
    pub fn id(&self) -> SymbolId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_productions(&self) -> usize {
        self.productions.len()
    }

    pub fn production(&self, idx: usize) -> &Production {
        &self.productions[idx]
    }

    pub fn productions(&self) -> &[Production] {
        &self.productions
    }

    /// Finds a production by its semantic rule id.
    pub fn production_by_semantic_id(&self, semantic_id: SemanticId) -> Option<&Production> {
        self.productions
            .iter()
            .find(|prod| prod.semantic_id == Some(semantic_id))
    }
}

/// The grammar context owning all terminals and non-terminals.
#[derive(Debug, Clone)]
pub struct Grammar {
    terminals: TermVec<Terminal>,
    nonterminals: NonTermVec<NonTerminal>,
    terms_by_id: HashMap<SymbolId, TermIndex>,
    nonterms_by_id: HashMap<SymbolId, NonTermIndex>,
    eps: TermIndex,
    end: TermIndex,
}

impl Grammar {
    /// Creates a grammar with its epsilon and end-of-input terminals.
    pub fn new() -> Self {
        let mut terminals = TermVec::new();
        let eps = terminals.push(Terminal {
            id: EPS_ID,
            name: "\u{03b5}".to_string(),
            eps: true,
            end: false,
            precedence: None,
            associativity: None,
        });
        let end = terminals.push(Terminal {
            id: END_ID,
            name: "\u{03c9}".to_string(),
            eps: false,
            end: true,
            precedence: None,
            associativity: None,
        });

        let mut terms_by_id = HashMap::new();
        terms_by_id.insert(EPS_ID, eps);
        terms_by_id.insert(END_ID, end);

        Self {
            terminals,
            nonterminals: NonTermVec::new(),
            terms_by_id,
            nonterms_by_id: HashMap::new(),
            eps,
            end,
        }
    }

    /// The epsilon terminal.
    pub fn eps(&self) -> TermIndex {
        self.eps
    }

    /// The end-of-input terminal.
    pub fn end(&self) -> TermIndex {
        self.end
    }

    pub fn add_terminal(&mut self, id: SymbolId, name: &str) -> Result<TermIndex> {
        if self.terms_by_id.contains_key(&id) || self.nonterms_by_id.contains_key(&id) {
            return Err(Error::DuplicateSymbol(id));
        }
        let name = if name.is_empty() {
            id.to_string()
        } else {
            name.to_string()
        };
        let idx = self.terminals.push(Terminal {
            id,
            name,
            eps: false,
            end: false,
            precedence: None,
            associativity: None,
        });
        self.terms_by_id.insert(id, idx);
        Ok(idx)
    }

    pub fn add_nonterminal(&mut self, id: SymbolId, name: &str) -> Result<NonTermIndex> {
        if self.terms_by_id.contains_key(&id) || self.nonterms_by_id.contains_key(&id) {
            return Err(Error::DuplicateSymbol(id));
        }
        let name = if name.is_empty() {
            id.to_string()
        } else {
            name.to_string()
        };
        let idx = self.nonterminals.push(NonTerminal {
            id,
            name,
            productions: Vec::new(),
        });
        self.nonterms_by_id.insert(id, idx);
        Ok(idx)
    }

    pub fn set_precedence(&mut self, term: TermIndex, prec: u32) {
        self.terminals[term].precedence = Some(prec);
    }

    pub fn set_associativity(&mut self, term: TermIndex, assoc: Assoc) {
        self.terminals[term].associativity = Some(assoc);
    }

    /// Adds an alternative production rule to a non-terminal.
    pub fn add_production(
        &mut self,
        nonterm: NonTermIndex,
        rhs: impl Into<Word>,
        semantic_id: Option<SemanticId>,
    ) {
        self.nonterminals[nonterm].productions.push(Production {
            rhs: rhs.into(),
            semantic_id,
        });
    }

    pub fn terminal(&self, idx: TermIndex) -> &Terminal {
        &self.terminals[idx]
    }

    pub fn nonterminal(&self, idx: NonTermIndex) -> &NonTerminal {
        &self.nonterminals[idx]
    }

    pub fn terminals(&self) -> impl Iterator<Item = (TermIndex, &Terminal)> {
        self.terminals.indexed()
    }

    pub fn nonterminals(&self) -> impl Iterator<Item = (NonTermIndex, &NonTerminal)> {
        self.nonterminals.indexed()
    }

    pub fn term_by_id(&self, id: SymbolId) -> Option<TermIndex> {
        self.terms_by_id.get(&id).copied()
    }

    pub fn nonterm_by_id(&self, id: SymbolId) -> Option<NonTermIndex> {
        self.nonterms_by_id.get(&id).copied()
    }

    pub fn symbol_id(&self, sym: SymbolRef) -> SymbolId {
        match sym {
            SymbolRef::Term(t) => self.terminals[t].id,
            SymbolRef::NonTerm(n) => self.nonterminals[n].id,
        }
    }

    pub fn symbol_name(&self, sym: SymbolRef) -> &str {
        match sym {
            SymbolRef::Term(t) => &self.terminals[t].name,
            SymbolRef::NonTerm(n) => &self.nonterminals[n].name,
        }
    }

    pub fn is_eps(&self, sym: SymbolRef) -> bool {
        matches!(sym, SymbolRef::Term(t) if self.terminals[t].eps)
    }

    /// Number of symbols in a word, optionally not counting epsilon.
    pub fn num_symbols(&self, word: &Word, count_eps: bool) -> usize {
        if count_eps {
            word.len()
        } else {
            word.symbols()
                .iter()
                .filter(|&&sym| !self.is_eps(sym))
                .count()
        }
    }

    /// Does this non-terminal have a rule which produces epsilon?
    pub fn has_eps_production(&self, nonterm: NonTermIndex) -> bool {
        self.nonterminals[nonterm].productions.iter().any(|prod| {
            prod.rhs.len() == 1 && self.is_eps(prod.rhs.symbols()[0])
        })
    }

    /// Removes left recursion from a non-terminal's rules.
    ///
    /// Left-recursive tails move to a synthesised right-recursive
    /// non-terminal (named with the `prime` suffix, id offset by
    /// `new_id_begin`) that also gets an epsilon production. All rewritten
    /// rules are renumbered through the caller-supplied semantic counter.
    /// Returns the added non-terminal, or `None` when there was no left
    /// recursion.
    pub fn remove_left_recursion(
        &mut self,
        nonterm: NonTermIndex,
        new_id_begin: SymbolId,
        prime: &str,
        semantic_id: &mut Option<SemanticId>,
    ) -> Result<Option<NonTermIndex>> {
        let mut recursive = Vec::new();
        let mut non_recursive = Vec::new();

        for prod in &self.nonterminals[nonterm].productions {
            if prod.rhs.get(0) == Some(SymbolRef::NonTerm(nonterm)) {
                recursive.push(prod.rhs.clone());
            } else {
                non_recursive.push(prod.rhs.clone());
            }
        }

        if recursive.is_empty() {
            return Ok(None);
        }

        let new_id = self.nonterminals[nonterm].id + new_id_begin;
        let new_name = format!("{}{}", self.nonterminals[nonterm].name, prime);
        let new_nonterm = self.add_nonterminal(new_id, &new_name)?;

        let next_semantic = |semantic_id: &mut Option<SemanticId>| {
            let id = *semantic_id;
            if let Some(ctr) = semantic_id {
                *ctr += 1;
            }
            id
        };

        for mut word in recursive {
            word.remove_symbol(0); // drop the left-recursive head
            word.add_symbol(SymbolRef::NonTerm(new_nonterm)); // right-recurse instead
            let sem = next_semantic(semantic_id);
            self.add_production(new_nonterm, word, sem);
        }

        let eps_word = Word::from(vec![SymbolRef::Term(self.eps)]);
        let sem = next_semantic(semantic_id);
        self.add_production(new_nonterm, eps_word, sem);

        self.nonterminals[nonterm].productions.clear();
        for mut word in non_recursive {
            word.add_symbol(SymbolRef::NonTerm(new_nonterm));
            let sem = next_semantic(semantic_id);
            self.add_production(nonterm, word, sem);
        }

        Ok(Some(new_nonterm))
    }

    /// `"sym1 sym2 ..."` for a word.
    pub fn word_string(&self, word: &Word) -> String {
        word.symbols()
            .iter()
            .map(|&sym| self.symbol_name(sym))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `"lhs -> rhs"` for one production of a non-terminal.
    pub fn production_string(&self, nonterm: NonTermIndex, prod_idx: usize) -> String {
        format!(
            "{} -> {}",
            self.nonterminals[nonterm].name,
            self.word_string(&self.nonterminals[nonterm].productions[prod_idx].rhs)
        )
    }
}

impl Default for Grammar {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (_, nonterm) in self.nonterminals() {
            writeln!(f, "{} \u{2192}", nonterm.name())?;
            for (prod_idx, prod) in nonterm.productions().iter().enumerate() {
                let sep = if prod_idx == 0 { "\t  " } else { "\t| " };
                write!(f, "{sep}")?;
                if let Some(rule) = prod.semantic_id {
                    write!(f, "[rule {rule}] ")?;
                }
                writeln!(f, "{}", self.word_string(&prod.rhs))?;
            }
        }
        Ok(())
    }
}
