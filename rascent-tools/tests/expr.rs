//! End-to-end tests of the table-driven parser on the expression grammar.

mod common;

use common::*;

use rascent::ast::AstKind;
use rascent::index::SymbolId;
use rascent::parser::Parser;
use rascent::ParseError;
use rascent_tools::grammar::SymbolRef;
use rascent_tools::{table, Collection, Settings};

#[test]
fn precedence_reduces_multiplication_first() {
    let (grammar, start) = expr_grammar();
    let tables = build_tables(&grammar, start);

    let recorder = Recorder::new();
    let mut parser = Parser::new(tables);
    parser.set_semantic_rules(expr_rules(&recorder));

    let input = tokens(parser.tables(), &[ID, PLUS, ID, MULT, ID]);
    let result = parser.parse(&input).expect("id + id * id is accepted");

    // the inner id*id reduces first, then id + _
    assert_eq!(
        recorder.full_order(),
        vec![RULE_ID, RULE_ID, RULE_ID, RULE_MULT, RULE_PLUS]
    );

    // the tree is + at the root with * on the right
    match result.kind() {
        AstKind::Binary { op, lhs, rhs } => {
            assert_eq!(*op, PLUS);
            assert!(matches!(lhs.kind(), AstKind::Token { .. }));
            assert!(matches!(rhs.kind(), AstKind::Binary { op, .. } if *op == MULT));
        }
        other => panic!("expected a binary node, got {other:?}"),
    }
}

#[test]
fn power_is_right_associative() {
    let (grammar, start) = expr_grammar();
    let tables = build_tables(&grammar, start);

    let recorder = Recorder::new();
    let mut parser = Parser::new(tables);
    parser.set_semantic_rules(expr_rules(&recorder));

    let input = tokens(parser.tables(), &[ID, POW, ID, POW, ID]);
    let result = parser.parse(&input).expect("id ^ id ^ id is accepted");

    // reduces right to left: id ^ (id ^ id)
    assert_eq!(
        recorder.full_order(),
        vec![RULE_ID, RULE_ID, RULE_ID, RULE_POW, RULE_POW]
    );
    match result.kind() {
        AstKind::Binary { op, lhs, rhs } => {
            assert_eq!(*op, POW);
            assert!(matches!(lhs.kind(), AstKind::Token { .. }));
            assert!(matches!(rhs.kind(), AstKind::Binary { op, .. } if *op == POW));
        }
        other => panic!("expected a binary node, got {other:?}"),
    }
}

#[test]
fn higher_precedence_binds_regardless_of_associativity() {
    // parsing a op2 b op1 c with prec(op1) > prec(op2) applies op2 to
    // (a, op1(b, c))
    let (grammar, start) = expr_grammar();
    let tables = build_tables(&grammar, start);

    let recorder = Recorder::new();
    let mut parser = Parser::new(tables);
    parser.set_semantic_rules(expr_rules(&recorder));

    let input = tokens(parser.tables(), &[ID, MULT, ID, POW, ID]);
    let result = parser.parse(&input).expect("id * id ^ id is accepted");

    match result.kind() {
        AstKind::Binary { op, rhs, .. } => {
            assert_eq!(*op, MULT);
            assert!(matches!(rhs.kind(), AstKind::Binary { op, .. } if *op == POW));
        }
        other => panic!("expected a binary node, got {other:?}"),
    }
}

#[test]
fn brackets_override_precedence() {
    let (grammar, start) = expr_grammar();
    let tables = build_tables(&grammar, start);

    let recorder = Recorder::new();
    let mut parser = Parser::new(tables);
    parser.set_semantic_rules(expr_rules(&recorder));

    let input = tokens(parser.tables(), &[LPAREN, ID, PLUS, ID, RPAREN, MULT, ID]);
    let result = parser.parse(&input).expect("( id + id ) * id is accepted");

    match result.kind() {
        AstKind::Binary { op, lhs, .. } => {
            assert_eq!(*op, MULT);
            assert!(matches!(lhs.kind(), AstKind::Binary { op, .. } if *op == PLUS));
        }
        other => panic!("expected a binary node, got {other:?}"),
    }
}

#[test]
fn undefined_transition_is_reported() {
    let (grammar, start) = expr_grammar();
    let tables = build_tables(&grammar, start);

    let recorder = Recorder::new();
    let mut parser = Parser::new(tables);
    parser.set_semantic_rules(expr_rules(&recorder));

    let input = tokens(parser.tables(), &[ID, ID]);
    match parser.parse(&input) {
        Err(ParseError::UndefinedAction { token_id, .. }) => assert_eq!(token_id, ID),
        other => panic!("expected an undefined-action error, got {other:?}"),
    }
}

#[test]
fn acceptance_and_input_underflow() {
    // start -> S;  S -> a b
    let mut grammar = rascent_tools::Grammar::new();
    let a = grammar.add_terminal(b'a' as usize, "a").unwrap();
    let b = grammar.add_terminal(b'b' as usize, "b").unwrap();
    let start = grammar.add_nonterminal(2000, "start").unwrap();
    let s = grammar.add_nonterminal(2001, "S").unwrap();

    use SymbolRef::{NonTerm as N, Term as T};
    grammar.add_production(start, vec![N(s)], Some(0));
    grammar.add_production(s, vec![T(a), T(b)], Some(1));

    let tables = build_tables(&grammar, start);

    let recorder = Recorder::new();
    let mut rules = rascent::ast::SemanticRules::new();
    rules.insert(0, passthrough(&recorder, 0));
    rules.insert(1, passthrough(&recorder, 1));

    let mut parser = Parser::new(tables);
    parser.set_semantic_rules(rules);

    // [a, b, end] accepts after reducing S
    let input = tokens(parser.tables(), &[b'a' as usize, b'b' as usize]);
    let result = parser.parse(&input).expect("a b is accepted");
    assert_eq!(recorder.full_order(), vec![1]);
    assert_eq!(result.id(), b'a' as SymbolId);

    // running off the end without the end marker underflows
    let short: Vec<_> = input[..2].to_vec();
    match parser.parse(&short) {
        Err(ParseError::InputUnderflow { .. }) => {}
        other => panic!("expected input underflow, got {other:?}"),
    }
}

#[test]
fn table_generation_is_deterministic() {
    let (grammar, start) = expr_grammar();

    let tables_a = build_tables(&grammar, start);
    let tables_b = build_tables(&grammar, start);
    assert_eq!(tables_a, tables_b);
}

#[test]
fn shift_reduce_erasure_holds() {
    // with default settings and no conflicts left, at most one of shift
    // and reduce is defined per state and terminal
    let (grammar, start) = expr_grammar();
    let tables = build_tables(&grammar, start);

    for state in 0..tables.num_states {
        for term in 0..tables.num_terminals {
            let shift = tables.shift.at(state, term);
            let reduce = tables.reduce.at(state, term);
            assert!(
                shift == tables.shift.error_val() || reduce == tables.reduce.error_val(),
                "state {state}, terminal {term}: both shift and reduce defined"
            );
        }
    }
}

#[test]
fn reduce_entries_are_sound() {
    let (grammar, start) = expr_grammar();
    let mut collection = Collection::new(&grammar, start).unwrap();
    collection.do_transitions().unwrap();
    let tables = table::generate_tables(&collection, &Settings::default()).unwrap();

    let accept = tables.reduce.accept_val();
    for state in 0..tables.num_states {
        for term in 0..tables.num_terminals {
            let rule = tables.reduce.at(state, term);
            if rule == tables.reduce.error_val() || rule == accept {
                continue;
            }
            let lhs = tables.lhs_index_per_rule[rule];
            assert!(lhs < tables.num_nonterminals);
            // the recorded rhs length matches the grammar production
            let rule_id = tables.rule_id(rule);
            let (_, nonterm) = grammar
                .nonterminals()
                .find(|(_, nt)| nt.production_by_semantic_id(rule_id).is_some())
                .expect("rule belongs to some non-terminal");
            let prod = nonterm.production_by_semantic_id(rule_id).unwrap();
            assert_eq!(
                tables.num_rhs_per_rule[rule],
                grammar.num_symbols(&prod.rhs, false)
            );
        }
    }
}
