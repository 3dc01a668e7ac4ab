//! FIRST and FOLLOW set calculation.
//!
//! The Dragon book p. 221. Both sets are computed as iterative fixpoints so
//! mutually recursive non-terminals converge to complete sets. Epsilon
//! membership is represented by the grammar's epsilon terminal appearing in
//! a set.

use std::collections::BTreeSet;

use rascent::index::{NonTermIndex, NonTermVec, TermIndex};

use super::{Grammar, SymbolRef, Word};

/// FIRST sets of all non-terminals, with per-production sets as a side
/// output.
#[derive(Debug, Clone)]
pub struct FirstSets {
    first: NonTermVec<BTreeSet<TermIndex>>,
    per_production: NonTermVec<Vec<BTreeSet<TermIndex>>>,
}

impl FirstSets {
    pub fn new(grammar: &Grammar) -> Self {
        let num_nonterms = grammar.nonterminals().count();
        let mut first: NonTermVec<BTreeSet<TermIndex>> =
            (0..num_nonterms).map(|_| BTreeSet::new()).collect();

        let mut additions = true;
        while additions {
            additions = false;
            for (nt, nonterm) in grammar.nonterminals() {
                for prod in nonterm.productions() {
                    let adds = seq_first(grammar, &first, prod.rhs.symbols());
                    let before = first[nt].len();
                    first[nt].extend(adds);
                    if first[nt].len() > before {
                        additions = true;
                    }
                }
            }
        }

        // per-production side output, using the converged sets
        let per_production = grammar
            .nonterminals()
            .map(|(_, nonterm)| {
                nonterm
                    .productions()
                    .iter()
                    .map(|prod| seq_first(grammar, &first, prod.rhs.symbols()))
                    .collect()
            })
            .collect();

        Self {
            first,
            per_production,
        }
    }

    /// FIRST set of a non-terminal.
    pub fn first(&self, nonterm: NonTermIndex) -> &BTreeSet<TermIndex> {
        &self.first[nonterm]
    }

    /// FIRST set contributed by a single production.
    pub fn first_of_production(&self, nonterm: NonTermIndex, prod_idx: usize) -> &BTreeSet<TermIndex> {
        &self.per_production[nonterm][prod_idx]
    }

    /// Whether a non-terminal can derive epsilon.
    pub fn nullable(&self, grammar: &Grammar, nonterm: NonTermIndex) -> bool {
        self.first[nonterm].contains(&grammar.eps())
    }

    /// FIRST of the symbol sequence `word[offs..]` with an optional trailing
    /// terminal appended.
    pub fn first_of_seq(
        &self,
        grammar: &Grammar,
        word: &Word,
        offs: usize,
        trailing: Option<TermIndex>,
    ) -> BTreeSet<TermIndex> {
        let mut syms: Vec<SymbolRef> = word.symbols()[offs.min(word.len())..].to_vec();
        if let Some(term) = trailing {
            syms.push(SymbolRef::Term(term));
        }
        seq_first(grammar, &self.first, &syms)
    }
}

/// FIRST of a symbol sequence against the given (possibly still growing)
/// non-terminal sets. Walks left to right, stopping at the first
/// non-nullable symbol; epsilon is added when every symbol is nullable.
fn seq_first(
    grammar: &Grammar,
    first: &NonTermVec<BTreeSet<TermIndex>>,
    syms: &[SymbolRef],
) -> BTreeSet<TermIndex> {
    let mut result = BTreeSet::new();
    let num_syms = syms.len();

    for (idx, &sym) in syms.iter().enumerate() {
        match sym {
            // reached a terminal symbol -> end
            SymbolRef::Term(t) => {
                result.insert(t);
                break;
            }
            SymbolRef::NonTerm(nt) => {
                let mut has_eps = false;
                for &t in &first[nt] {
                    if t == grammar.eps() {
                        has_eps = true;
                        // only the last symbol may contribute epsilon
                        if idx == num_syms - 1 {
                            result.insert(t);
                        }
                    } else {
                        result.insert(t);
                    }
                }
                // no epsilon in the production -> end
                if !has_eps {
                    break;
                }
            }
        }
    }

    result
}

/// FOLLOW sets of all non-terminals.
#[derive(Debug, Clone)]
pub struct FollowSets {
    follow: NonTermVec<BTreeSet<TermIndex>>,
}

impl FollowSets {
    pub fn new(grammar: &Grammar, first: &FirstSets, start: NonTermIndex) -> Self {
        let num_nonterms = grammar.nonterminals().count();
        let mut follow: NonTermVec<BTreeSet<TermIndex>> =
            (0..num_nonterms).map(|_| BTreeSet::new()).collect();

        // the end marker follows the start symbol
        follow[start].insert(grammar.end());

        let mut additions = true;
        while additions {
            additions = false;

            for (lhs, nonterm) in grammar.nonterminals() {
                for prod in nonterm.productions() {
                    let rhs = prod.rhs.symbols();
                    for (idx, &sym) in rhs.iter().enumerate() {
                        let nt = match sym {
                            SymbolRef::NonTerm(nt) => nt,
                            SymbolRef::Term(_) => continue,
                        };

                        let before = follow[nt].len();
                        let mut broke = false;

                        // everything in FIRST(beta) except epsilon
                        for &next in &rhs[idx + 1..] {
                            let (next_first, next_nullable) = match next {
                                SymbolRef::Term(t) => {
                                    let nullable = t == grammar.eps();
                                    let mut set = BTreeSet::new();
                                    if !nullable {
                                        set.insert(t);
                                    }
                                    (set, nullable)
                                }
                                SymbolRef::NonTerm(m) => {
                                    let set: BTreeSet<TermIndex> = first
                                        .first(m)
                                        .iter()
                                        .copied()
                                        .filter(|&t| t != grammar.eps())
                                        .collect();
                                    (set, first.nullable(grammar, m))
                                }
                            };

                            follow[nt].extend(next_first);
                            if !next_nullable {
                                broke = true;
                                break;
                            }
                        }

                        // beta is empty or nullable: FOLLOW(lhs) follows too
                        if !broke {
                            let lhs_follow: Vec<TermIndex> =
                                follow[lhs].iter().copied().collect();
                            follow[nt].extend(lhs_follow);
                        }

                        if follow[nt].len() > before {
                            additions = true;
                        }
                    }
                }
            }
        }

        Self { follow }
    }

    pub fn follow(&self, nonterm: NonTermIndex) -> &BTreeSet<TermIndex> {
        &self.follow[nonterm]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Grammar;
    use rascent::index::TermIndex;

    struct TestGrammar {
        grammar: Grammar,
        terms: Vec<TermIndex>,
        nonterms: Vec<NonTermIndex>,
    }

    /// E: T Ep;  Ep: "+" T Ep | EMPTY;  T: F Tp;  Tp: "*" F Tp | EMPTY;
    /// F: "(" E ")" | "id";
    fn test_grammar() -> TestGrammar {
        let mut g = Grammar::new();
        let plus = g.add_terminal(b'+' as usize, "+").unwrap();
        let mult = g.add_terminal(b'*' as usize, "*").unwrap();
        let lpar = g.add_terminal(b'(' as usize, "(").unwrap();
        let rpar = g.add_terminal(b')' as usize, ")").unwrap();
        let id = g.add_terminal(1000, "id").unwrap();

        let expr = g.add_nonterminal(2000, "E").unwrap();
        let expr_p = g.add_nonterminal(2001, "Ep").unwrap();
        let term = g.add_nonterminal(2002, "T").unwrap();
        let term_p = g.add_nonterminal(2003, "Tp").unwrap();
        let factor = g.add_nonterminal(2004, "F").unwrap();

        use SymbolRef::{NonTerm as N, Term as T};
        g.add_production(expr, vec![N(term), N(expr_p)], Some(0));
        g.add_production(expr_p, vec![T(plus), N(term), N(expr_p)], Some(1));
        g.add_production(expr_p, vec![T(g.eps())], Some(2));
        g.add_production(term, vec![N(factor), N(term_p)], Some(3));
        g.add_production(term_p, vec![T(mult), N(factor), N(term_p)], Some(4));
        g.add_production(term_p, vec![T(g.eps())], Some(5));
        g.add_production(factor, vec![T(lpar), N(expr), T(rpar)], Some(6));
        g.add_production(factor, vec![T(id)], Some(7));

        TestGrammar {
            grammar: g,
            terms: vec![plus, mult, lpar, rpar, id],
            nonterms: vec![expr, expr_p, term, term_p, factor],
        }
    }

    #[test]
    fn first_sets_of_the_expression_grammar() {
        let tg = test_grammar();
        let g = &tg.grammar;
        let &[plus, mult, lpar, _rpar, id] = &tg.terms[..] else {
            unreachable!()
        };
        let &[expr, expr_p, term, term_p, factor] = &tg.nonterms[..] else {
            unreachable!()
        };

        let first = FirstSets::new(g);

        assert_eq!(first.first(factor), &BTreeSet::from([lpar, id]));
        assert_eq!(first.first(term), &BTreeSet::from([lpar, id]));
        assert_eq!(first.first(expr), &BTreeSet::from([lpar, id]));
        assert_eq!(first.first(expr_p), &BTreeSet::from([plus, g.eps()]));
        assert_eq!(first.first(term_p), &BTreeSet::from([mult, g.eps()]));

        // per-production side output
        assert_eq!(
            first.first_of_production(factor, 1),
            &BTreeSet::from([id])
        );
        assert_eq!(
            first.first_of_production(expr_p, 1),
            &BTreeSet::from([plus])
        );
    }

    #[test]
    fn follow_sets_of_the_expression_grammar() {
        let tg = test_grammar();
        let g = &tg.grammar;
        let &[plus, mult, _lpar, rpar, _id] = &tg.terms[..] else {
            unreachable!()
        };
        let &[expr, expr_p, term, term_p, factor] = &tg.nonterms[..] else {
            unreachable!()
        };

        let first = FirstSets::new(g);
        let follow = FollowSets::new(g, &first, expr);

        assert_eq!(follow.follow(expr), &BTreeSet::from([rpar, g.end()]));
        assert_eq!(follow.follow(expr_p), &BTreeSet::from([rpar, g.end()]));
        assert_eq!(
            follow.follow(term),
            &BTreeSet::from([plus, rpar, g.end()])
        );
        assert_eq!(
            follow.follow(term_p),
            &BTreeSet::from([plus, rpar, g.end()])
        );
        assert_eq!(
            follow.follow(factor),
            &BTreeSet::from([plus, mult, rpar, g.end()])
        );
    }

    #[test]
    fn first_of_seq_with_trailing_terminal() {
        let tg = test_grammar();
        let g = &tg.grammar;
        let &[plus, mult, _lpar, _rpar, _id] = &tg.terms[..] else {
            unreachable!()
        };
        let &[_, expr_p, _, term_p, _] = &tg.nonterms[..] else {
            unreachable!()
        };

        let first = FirstSets::new(g);

        // FIRST(Tp Ep . +) = {*, +} since both Tp and Ep are nullable
        let word = Word::from(vec![
            SymbolRef::NonTerm(term_p),
            SymbolRef::NonTerm(expr_p),
        ]);
        let set = first.first_of_seq(g, &word, 0, Some(plus));
        assert_eq!(set, BTreeSet::from([mult, plus]));

        // FIRST of an exhausted sequence with trailing t is {t}
        let set = first.first_of_seq(g, &word, 2, Some(plus));
        assert_eq!(set, BTreeSet::from([plus]));
    }

    #[test]
    fn first_monotonicity_under_production_changes() {
        // adding a production can only enlarge FIRST sets
        let tg = test_grammar();
        let mut g = tg.grammar.clone();
        let &[expr, ..] = &tg.nonterms[..] else {
            unreachable!()
        };

        let before = FirstSets::new(&g);

        let minus = g.add_terminal(b'-' as usize, "-").unwrap();
        g.add_production(expr, vec![SymbolRef::Term(minus)], Some(99));
        let after = FirstSets::new(&g);

        for (nt, _) in g.nonterminals() {
            if before.first.get(nt).is_none() {
                continue;
            }
            assert!(
                before.first(nt).is_subset(after.first(nt)),
                "FIRST set shrank after adding a production"
            );
        }
    }
}
