//! Shared grammars and semantic-rule helpers for the integration tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use rascent::ast::{AstKind, AstNode, AstPtr, SemanticRules};
use rascent::index::{NonTermIndex, SemanticId, SymbolId, END_ID};
use rascent::table::{Assoc, TableSet};
use rascent_tools::grammar::{Grammar, SymbolRef};
use rascent_tools::{table, Collection, Settings};

pub const ID: SymbolId = 1000;
pub const PLUS: SymbolId = b'+' as usize;
pub const MULT: SymbolId = b'*' as usize;
pub const POW: SymbolId = b'^' as usize;
pub const LPAREN: SymbolId = b'(' as usize;
pub const RPAREN: SymbolId = b')' as usize;

pub const RULE_START: SemanticId = 0;
pub const RULE_PLUS: SemanticId = 1;
pub const RULE_MULT: SemanticId = 2;
pub const RULE_BRACKETS: SemanticId = 3;
pub const RULE_ID: SemanticId = 4;
pub const RULE_POW: SemanticId = 5;

/// The arithmetic expression grammar:
///
/// ```text
/// start -> expr
/// expr  -> expr + expr | expr * expr | expr ^ expr | ( expr ) | id
/// ```
///
/// with `+` 70 left, `*` 80 left and `^` 110 right.
pub fn expr_grammar() -> (Grammar, NonTermIndex) {
    let mut g = Grammar::new();
    let plus = g.add_terminal(PLUS, "+").unwrap();
    let mult = g.add_terminal(MULT, "*").unwrap();
    let pow = g.add_terminal(POW, "^").unwrap();
    let lpar = g.add_terminal(LPAREN, "(").unwrap();
    let rpar = g.add_terminal(RPAREN, ")").unwrap();
    let id = g.add_terminal(ID, "id").unwrap();

    g.set_precedence(plus, 70);
    g.set_associativity(plus, Assoc::Left);
    g.set_precedence(mult, 80);
    g.set_associativity(mult, Assoc::Left);
    g.set_precedence(pow, 110);
    g.set_associativity(pow, Assoc::Right);

    let start = g.add_nonterminal(2000, "start").unwrap();
    let expr = g.add_nonterminal(2001, "expr").unwrap();

    use SymbolRef::{NonTerm as N, Term as T};
    g.add_production(start, vec![N(expr)], Some(RULE_START));
    g.add_production(expr, vec![N(expr), T(plus), N(expr)], Some(RULE_PLUS));
    g.add_production(expr, vec![N(expr), T(mult), N(expr)], Some(RULE_MULT));
    g.add_production(expr, vec![N(expr), T(pow), N(expr)], Some(RULE_POW));
    g.add_production(expr, vec![T(lpar), N(expr), T(rpar)], Some(RULE_BRACKETS));
    g.add_production(expr, vec![T(id)], Some(RULE_ID));

    (g, start)
}

/// Builds the collection and flattens it into tables with default settings.
pub fn build_tables(grammar: &Grammar, start: NonTermIndex) -> TableSet {
    let mut collection = Collection::new(grammar, start).unwrap();
    collection.do_transitions().unwrap();
    table::generate_tables(&collection, &Settings::default()).unwrap()
}

/// Records the order of semantic-rule invocations.
#[derive(Default)]
pub struct Recorder {
    /// Full-match invocations, in order.
    pub full: RefCell<Vec<SemanticId>>,
    /// Partial-match invocations as (rule, argument count), in order.
    pub partial: RefCell<Vec<(SemanticId, usize)>>,
}

impl Recorder {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn full_order(&self) -> Vec<SemanticId> {
        self.full.borrow().clone()
    }

    pub fn partial_calls(&self) -> Vec<(SemanticId, usize)> {
        self.partial.borrow().clone()
    }
}

/// A recording rule that passes its first argument through.
pub fn passthrough(recorder: &Rc<Recorder>, rule_id: SemanticId) -> rascent::ast::SemanticRule {
    let recorder = Rc::clone(recorder);
    Rc::new(move |full, args, retval| {
        if full {
            recorder.full.borrow_mut().push(rule_id);
            args.first().cloned().flatten()
        } else {
            recorder.partial.borrow_mut().push((rule_id, args.len()));
            retval
        }
    })
}

/// A recording rule that builds a binary node from `args[0] op args[2]`.
pub fn binary(
    recorder: &Rc<Recorder>,
    rule_id: SemanticId,
    op: SymbolId,
    result_id: SymbolId,
) -> rascent::ast::SemanticRule {
    let recorder = Rc::clone(recorder);
    Rc::new(move |full, args, retval| {
        if full {
            recorder.full.borrow_mut().push(rule_id);
            let lhs = args[0].clone()?;
            let rhs = args[2].clone()?;
            Some(AstNode::new(result_id, AstKind::Binary { op, lhs, rhs }))
        } else {
            recorder.partial.borrow_mut().push((rule_id, args.len()));
            retval
        }
    })
}

/// A recording rule that passes through the bracketed middle argument.
pub fn middle(recorder: &Rc<Recorder>, rule_id: SemanticId) -> rascent::ast::SemanticRule {
    let recorder = Rc::clone(recorder);
    Rc::new(move |full, args, retval| {
        if full {
            recorder.full.borrow_mut().push(rule_id);
            args.get(1).cloned().flatten()
        } else {
            recorder.partial.borrow_mut().push((rule_id, args.len()));
            retval
        }
    })
}

/// The semantic rules of the expression grammar.
pub fn expr_rules(recorder: &Rc<Recorder>) -> SemanticRules {
    let expr_id = 2001;
    let mut rules = SemanticRules::new();
    rules.insert(RULE_START, passthrough(recorder, RULE_START));
    rules.insert(RULE_PLUS, binary(recorder, RULE_PLUS, PLUS, expr_id));
    rules.insert(RULE_MULT, binary(recorder, RULE_MULT, MULT, expr_id));
    rules.insert(RULE_POW, binary(recorder, RULE_POW, POW, expr_id));
    rules.insert(RULE_BRACKETS, middle(recorder, RULE_BRACKETS));
    rules.insert(RULE_ID, passthrough(recorder, RULE_ID));
    rules
}

/// An input token carrying its table index.
pub fn token(tables: &TableSet, id: SymbolId) -> AstPtr {
    let index = tables
        .term_table_index(id)
        .unwrap_or_else(|| panic!("no table index for terminal id {id}"));
    AstNode::token(id, index, None)
}

pub fn end_token(tables: &TableSet) -> AstPtr {
    token(tables, END_ID)
}

/// Token stream for a sequence of terminal ids, end marker appended.
pub fn tokens(tables: &TableSet, ids: &[SymbolId]) -> Vec<AstPtr> {
    let mut stream: Vec<AstPtr> = ids.iter().map(|&id| token(tables, id)).collect();
    stream.push(end_token(tables));
    stream
}
