//! Conflict detection and resolution scenarios.

mod common;

use common::*;

use rascent::ast::SemanticRules;
use rascent::index::SymbolId;
use rascent::parser::Parser;
use rascent_tools::error::Error;
use rascent_tools::grammar::SymbolRef;
use rascent_tools::{Collection, Grammar};

use SymbolRef::{NonTerm as N, Term as T};

/// S' -> S;  S -> A | B;  A -> x;  B -> x
fn reduce_reduce_grammar() -> (Grammar, rascent::index::NonTermIndex) {
    let mut g = Grammar::new();
    let x = g.add_terminal(b'x' as usize, "x").unwrap();
    let start = g.add_nonterminal(2000, "S'").unwrap();
    let s = g.add_nonterminal(2001, "S").unwrap();
    let a = g.add_nonterminal(2002, "A").unwrap();
    let b = g.add_nonterminal(2003, "B").unwrap();

    g.add_production(start, vec![N(s)], Some(0));
    g.add_production(s, vec![N(a)], Some(1));
    g.add_production(s, vec![N(b)], Some(2));
    g.add_production(a, vec![T(x)], Some(3));
    g.add_production(b, vec![T(x)], Some(4));

    (g, start)
}

#[test]
fn reduce_reduce_conflict_is_reported() {
    let (grammar, start) = reduce_reduce_grammar();
    let mut collection = Collection::new(&grammar, start).unwrap();

    match collection.do_transitions() {
        Err(Error::Conflicts { reduce_reduce, .. }) => {
            assert!(
                !reduce_reduce.is_empty(),
                "the state with A -> x. and B -> x. must be reported"
            );
        }
        other => panic!("expected a reduce/reduce conflict, got {other:?}"),
    }
}

#[test]
fn reduce_reduce_conflicts_survive_when_not_stopping() {
    let (grammar, start) = reduce_reduce_grammar();
    let mut collection = Collection::new(&grammar, start).unwrap();
    collection.set_stop_on_conflicts(false);

    collection.do_transitions().unwrap();
    assert!(!collection.reduce_conflict_states().is_empty());
}

#[test]
fn longest_match_fallback_discards_the_shared_lookahead() {
    // opt-in fallback: attempted, without a correctness guarantee
    let (grammar, start) = reduce_reduce_grammar();
    let mut collection = Collection::new(&grammar, start).unwrap();
    collection.set_solve_reduce_conflicts(true);

    collection.do_transitions().unwrap();
    assert!(collection.reduce_conflict_states().is_empty());
}

/// The canonical dangling-else grammar:
///
/// ```text
/// start -> stmt
/// stmt  -> if stmt | if stmt else stmt | x
/// ```
///
/// `else` has a higher precedence than `if`, so the conflict resolves in
/// favour of shift and the `else` attaches to the nearest `if`.
fn dangling_else_grammar() -> (Grammar, rascent::index::NonTermIndex) {
    let mut g = Grammar::new();
    let tok_if = g.add_terminal(b'i' as usize, "if").unwrap();
    let tok_else = g.add_terminal(b'e' as usize, "else").unwrap();
    let x = g.add_terminal(b'x' as usize, "x").unwrap();

    g.set_precedence(tok_if, 10);
    g.set_precedence(tok_else, 20);

    let start = g.add_nonterminal(2000, "start").unwrap();
    let stmt = g.add_nonterminal(2001, "stmt").unwrap();

    g.add_production(start, vec![N(stmt)], Some(0));
    g.add_production(stmt, vec![T(tok_if), N(stmt)], Some(1));
    g.add_production(
        stmt,
        vec![T(tok_if), N(stmt), T(tok_else), N(stmt)],
        Some(2),
    );
    g.add_production(stmt, vec![T(x)], Some(3));

    (g, start)
}

#[test]
fn dangling_else_resolves_in_favour_of_shift() {
    let (grammar, start) = dangling_else_grammar();
    let tables = build_tables(&grammar, start);

    let recorder = Recorder::new();
    let mut rules = SemanticRules::new();
    for rule in 0..4 {
        rules.insert(rule, passthrough(&recorder, rule));
    }

    let mut parser = Parser::new(tables);
    parser.set_semantic_rules(rules);

    // if if x else x: the else belongs to the inner if
    let input = tokens(
        parser.tables(),
        &[
            b'i' as usize,
            b'i' as usize,
            b'x' as usize,
            b'e' as usize,
            b'x' as usize,
        ],
    );
    parser.parse(&input).expect("the dangling else is accepted");

    // inner if-else (rule 2) reduces before the outer if (rule 1)
    assert_eq!(recorder.full_order(), vec![3, 3, 2, 1]);
}

/// S -> L = R | R;  L -> * R | id;  R -> L
///
/// SLR construction conflicts here; LALR(1) lookaheads must not.
#[test]
fn lalr_grammar_generates_without_conflicts() {
    let mut g = Grammar::new();
    let eq = g.add_terminal(b'=' as usize, "=").unwrap();
    let deref = g.add_terminal(b'*' as usize, "*").unwrap();
    let id = g.add_terminal(1000, "id").unwrap();

    let start = g.add_nonterminal(2000, "S'").unwrap();
    let s = g.add_nonterminal(2001, "S").unwrap();
    let l = g.add_nonterminal(2002, "L").unwrap();
    let r = g.add_nonterminal(2003, "R").unwrap();

    g.add_production(start, vec![N(s)], Some(0));
    g.add_production(s, vec![N(l), T(eq), N(r)], Some(1));
    g.add_production(s, vec![N(r)], Some(2));
    g.add_production(l, vec![T(deref), N(r)], Some(3));
    g.add_production(l, vec![T(id)], Some(4));
    g.add_production(r, vec![N(l)], Some(5));

    let tables = build_tables(&g, start);

    // parse *id = id
    let recorder = Recorder::new();
    let mut rules = SemanticRules::new();
    for rule in 0..6 {
        rules.insert(rule, passthrough(&recorder, rule));
    }
    let mut parser = Parser::new(tables);
    parser.set_semantic_rules(rules);

    let input = tokens(
        parser.tables(),
        &[b'*' as usize, 1000, b'=' as usize, 1000],
    );
    parser.parse(&input).expect("*id = id is accepted");
    assert_eq!(recorder.full_order(), vec![4, 5, 3, 4, 5, 1]);
}

#[test]
fn equal_precedence_uses_declared_associativity() {
    // a + a + a with left-associative + reduces left to right
    let (grammar, start) = expr_grammar();
    let tables = build_tables(&grammar, start);

    let recorder = Recorder::new();
    let mut parser = Parser::new(tables);
    parser.set_semantic_rules(expr_rules(&recorder));

    let input = tokens(parser.tables(), &[ID, PLUS, ID, PLUS, ID]);
    let result = parser.parse(&input).expect("id + id + id is accepted");

    match result.kind() {
        rascent::ast::AstKind::Binary { op, lhs, rhs } => {
            assert_eq!(*op, PLUS as SymbolId);
            // left-leaning tree
            assert!(matches!(
                lhs.kind(),
                rascent::ast::AstKind::Binary { .. }
            ));
            assert!(matches!(rhs.kind(), rascent::ast::AstKind::Token { .. }));
        }
        other => panic!("expected a binary node, got {other:?}"),
    }
}
