//! Emits the source of a recursive-ascent parser specialised to one
//! automaton.
//!
//! Each closure becomes one state function dispatching on the current
//! lookahead id: shift actions pick the next state function, reduce
//! actions apply the semantic rule and record the distance to their jump,
//! and a trailing loop dispatches the jump on the non-terminal that was
//! pushed. The state-independent machinery lives in `rascent::ascent`; the
//! emitted file only contains the dispatch specialised to the grammar.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::Local;
use convert_case::{Case, Casing};
use indexmap::IndexMap;
use indoc::{formatdoc, indoc};
use rascent::index::{StateId, TermIndex};
use rascent::table::ERROR_VAL;
use regex::Regex;

use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::grammar::{Grammar, SymbolRef};
use crate::settings::Settings;

macro_rules! geni {
    ($w:expr, $($args:tt)*) => {
        ($w).write_indented(&::std::fmt::format(format_args!($($args)*)))?
    }
}

struct RustWrite<W: Write> {
    write: W,
    indent: usize,
}

const DEFAULT_INDENT: usize = 4;

impl<W: Write> RustWrite<W> {
    fn new(write: W) -> Self {
        Self { write, indent: 0 }
    }

    fn inc_indent(&mut self) {
        self.indent += DEFAULT_INDENT;
    }

    fn dec_indent(&mut self) {
        self.indent -= DEFAULT_INDENT;
    }

    fn write_indented(&mut self, out: &str) -> io::Result<()> {
        if out.is_empty() {
            return writeln!(self.write);
        }
        for line in out.lines() {
            if line.is_empty() {
                writeln!(self.write)?;
            } else {
                writeln!(self.write, "{0:1$}{line}", "", self.indent)?;
            }
        }
        Ok(())
    }
}

/// Generates the parser source and writes it to `out_path`.
pub fn generate_parser(
    collection: &Collection,
    settings: &Settings,
    class_name: &str,
    out_path: &Path,
) -> Result<()> {
    let file = File::create(out_path)?;
    write_parser(collection, settings, class_name, BufWriter::new(file))
}

/// Generates the parser source into any writer.
pub fn write_parser<W: Write>(
    collection: &Collection,
    settings: &Settings,
    class_name: &str,
    out: W,
) -> Result<()> {
    let mut out = RustWrite::new(out);

    let state_names = state_function_names(collection, settings);
    let start_name = state_names
        .get(&settings.starting_state)
        .ok_or_else(|| Error::Grammar("starting state does not exist".to_string()))?;

    geni!(
        out,
        "// Parser generated by rascent on {}.",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    geni!(out, "");

    geni!(
        out,
        indoc! {r#"
            use rascent::ascent::AscentCore;
            use rascent::ast::{{AstPtr, SemanticRules}};
            use rascent::error::ParseError;
            use rascent::index::END_ID;
        "#}
    );

    geni!(
        out,
        "{}",
        formatdoc! {r#"
            type StateFn = fn(&mut {class}) -> Result<(), ParseError>;

            pub struct {class} {{
                core: AscentCore,
            }}

            impl Default for {class} {{
                fn default() -> Self {{
                    Self::new()
                }}
            }}

            impl {class} {{
        "#, class = class_name}
    );

    out.inc_indent();
    geni!(
        out,
        "{}",
        formatdoc! {r#"
            pub fn new() -> Self {{
                Self {{ core: AscentCore::new(END_ID) }}
            }}

            pub fn set_debug(&mut self, debug: bool) {{
                self.core.set_debug(debug);
            }}

            pub fn set_semantic_rules(&mut self, rules: SemanticRules) {{
                self.core.set_semantic_rules(rules);
            }}

            pub fn parse(&mut self, input: &[AstPtr]) -> Result<AstPtr, ParseError> {{
                self.core.reset(input);
                self.core.next_lookahead();
                self.{start}()?;
                self.core.finish()
            }}
        "#, start = start_name}
    );

    for (pos, closure) in collection.closures().iter().enumerate() {
        let state = closure.id();
        let name = &state_names[&state];
        collection.report_progress(&format!("Creating state \"{name}\"..."), false);
        geni!(out, "");
        write_state_comment(&mut out, collection, pos, &state_names)?;
        write_state_fn(&mut out, collection, settings, pos, &state_names)?;
    }

    out.dec_indent();
    geni!(out, "}}");

    collection.report_progress("Created all state functions.", true);
    Ok(())
}

/// Names every state function, either `state_N` or, when enabled and the
/// name is a valid identifier, after the first element's lhs non-terminal.
fn state_function_names(
    collection: &Collection,
    settings: &Settings,
) -> BTreeMap<StateId, String> {
    let ident = Regex::new("^[_A-Za-z][_A-Za-z0-9]*$").unwrap();
    let grammar = collection.grammar();

    let mut names = BTreeMap::new();
    let mut name_counts: IndexMap<String, usize> = IndexMap::new();

    for closure in collection.closures() {
        let state = closure.id();
        let mut name = None;

        if settings.use_state_names {
            if let Some(&first) = closure.elements().first() {
                let lhs = collection.arena()[first].lhs();
                let lhs_name = grammar.nonterminal(lhs).name().to_case(Case::Snake);
                let count = name_counts.entry(lhs_name.clone()).or_insert(0);
                let candidate = format!("{lhs_name}_{count}");
                *count += 1;
                if ident.is_match(&candidate) {
                    name = Some(candidate);
                }
            }
        }

        names.insert(state, name.unwrap_or_else(|| format!("state_{state}")));
    }

    names
}

/// Writes the comment block describing a state: its elements, look-backs
/// and outgoing transitions.
fn write_state_comment<W: Write>(
    out: &mut RustWrite<W>,
    collection: &Collection,
    pos: usize,
    state_names: &BTreeMap<StateId, String>,
) -> Result<()> {
    let grammar = collection.grammar();
    let closure = &collection.closures()[pos];

    let mut comment = String::new();
    comment.push_str(&closure.describe(collection.arena(), grammar));

    let lookbacks = collection.lookback_terminals(pos);
    if !lookbacks.is_empty() {
        comment.push_str("Lookback terminals:");
        for &lb in &lookbacks {
            comment.push(' ');
            comment.push_str(grammar.terminal(lb).name());
        }
        comment.push('\n');
    }

    for term in [true, false] {
        let transitions = collection.transitions_from(pos, term);
        if transitions.is_empty() {
            continue;
        }
        comment.push_str(if term {
            "Terminal transitions:\n"
        } else {
            "Non-terminal transitions:\n"
        });
        for transition in transitions {
            let to = collection.closures()[transition.to].id();
            let _ = writeln!(
                comment,
                "\t- to {} via symbol {} (id = {})",
                state_names[&to],
                grammar.symbol_name(transition.symbol),
                grammar.symbol_id(transition.symbol)
            );
        }
    }

    geni!(out, "/*");
    geni!(out, "{comment}");
    geni!(out, "*/");
    Ok(())
}

/// Pattern text for a lookahead terminal in a generated match arm.
fn term_pattern(grammar: &Grammar, term: TermIndex) -> String {
    if grammar.terminal(term).is_end() {
        "END_ID".to_string()
    } else {
        grammar.terminal(term).id().to_string()
    }
}

struct ShiftAction {
    pattern: String,
    comment: String,
    body: String,
}

struct ReduceAction {
    lookaheads: BTreeSet<TermIndex>,
    body: String,
}

fn write_state_fn<W: Write>(
    out: &mut RustWrite<W>,
    collection: &Collection,
    settings: &Settings,
    pos: usize,
    state_names: &BTreeMap<StateId, String>,
) -> Result<()> {
    let grammar = collection.grammar();
    let closure = &collection.closures()[pos];
    let state = closure.id();
    let name = &state_names[&state];

    let mut lookbacks: Option<BTreeSet<TermIndex>> = None;

    // shift actions
    let mut shifts: IndexMap<TermIndex, ShiftAction> = IndexMap::new();

    for transition in collection.transitions_from(pos, true) {
        let term = match transition.symbol {
            SymbolRef::Term(t) => t,
            SymbolRef::NonTerm(_) => continue,
        };
        let target = collection.closures()[transition.to].id();
        let target_name = &state_names[&target];

        let mut body = String::new();
        if settings.gen_partial_matches {
            if let Some(partial) = collection.unique_partial_match(&transition.from_elements, true)
            {
                let _ = writeln!(
                    body,
                    "// partial semantic rule {} with {} recognised argument(s)",
                    partial.rule_id, partial.match_len
                );
                let _ = writeln!(
                    body,
                    "let applied = self.core.apply_partial_rule(true, {}, {}, {})?;",
                    partial.rule_id, partial.match_len, partial.lhs_id
                );
                if settings.gen_debug_code {
                    let _ = writeln!(body, "if applied {{");
                    let _ = writeln!(
                        body,
                        "    self.core.debug_partial_rule(true, {}, {});",
                        partial.match_len, partial.rule_id
                    );
                    let _ = writeln!(body, "}}");
                }
            }
        }
        let _ = writeln!(body, "next_state = Some(Self::{target_name});");

        shifts.insert(
            term,
            ShiftAction {
                pattern: term_pattern(grammar, term),
                comment: grammar.terminal(term).name().to_string(),
                body,
            },
        );
    }

    // reduce actions
    let mut reduces: Vec<ReduceAction> = Vec::new();

    for &e in closure.elements() {
        let elem = &collection.arena()[e];
        if !elem.is_reducible(grammar) {
            continue;
        }

        let rule_id = elem
            .semantic_id()
            .ok_or_else(|| Error::MissingSemanticRule(elem.describe(grammar)))?;
        let lookaheads: BTreeSet<TermIndex> = match elem.lookaheads() {
            Some(las) if !las.is_empty() => las.clone(),
            _ => continue,
        };

        let accepted = rule_id == settings.accepting_rule;
        let rule_descr = grammar.production_string(elem.lhs(), elem.production());
        let num_rhs = grammar.num_symbols(elem.rhs(grammar), false);
        let lhs_id = grammar.nonterminal(elem.lhs()).id();

        let mut body = String::new();
        if accepted {
            let _ = writeln!(body, "self.core.set_accepted();");
        } else {
            if settings.gen_debug_code {
                let _ = writeln!(body, "self.core.debug_jump_check({state});");
            }
            let _ = writeln!(body, "self.core.set_dist_to_jump({num_rhs});");
        }
        let _ = writeln!(body, "// semantic rule {rule_id}: {rule_descr}");
        if settings.gen_debug_code {
            let _ = writeln!(
                body,
                "self.core.debug_reduce({num_rhs}, {rule_id}, \"{rule_descr}\");"
            );
        }
        let _ = writeln!(
            body,
            "self.core.apply_rule({rule_id}, {num_rhs}, {lhs_id}, {accepted})?;"
        );

        reduces.push(ReduceAction { lookaheads, body });
    }

    // try to solve shift/reduce conflicts between the collected actions
    for reduce in &mut reduces {
        let conflicting: Vec<TermIndex> = reduce
            .lookaheads
            .iter()
            .copied()
            .filter(|la| shifts.contains_key(la))
            .collect();

        for la in conflicting {
            if collection.element_with_cursor_at(pos, la).is_none() {
                continue;
            }
            if lookbacks.is_none() {
                lookbacks = Some(if collection.generate_lookbacks() {
                    collection.lookback_terminals(pos)
                } else {
                    BTreeSet::new()
                });
            }

            // dummy entries, only the erasure matters here
            let mut shift_entry = 0usize;
            let mut reduce_entry = 0usize;
            if collection.solve_shift_reduce(
                la,
                lookbacks.as_ref().unwrap(),
                &mut shift_entry,
                &mut reduce_entry,
            ) {
                if shift_entry == ERROR_VAL {
                    shifts.shift_remove(&la);
                } else if reduce_entry == ERROR_VAL {
                    reduce.lookaheads.remove(&la);
                }
            } else {
                let msg = format!(
                    "shift/reduce conflict in state {state} on lookahead terminal {}",
                    grammar.terminal(la).name()
                );
                if collection.stop_on_conflicts() {
                    return Err(Error::TableConflicts(vec![msg]));
                }
                eprintln!("Error: {msg}.");
            }
        }
    }

    // function header
    geni!(out, "fn {name}(&mut self) -> Result<(), ParseError> {{");
    out.inc_indent();
    if settings.gen_debug_code {
        geni!(out, "self.core.debug_state({state}, \"{name}\");");
    }
    if !shifts.is_empty() {
        geni!(out, "let mut next_state: Option<StateFn> = None;");
    }

    // lookahead dispatch
    geni!(out, "match self.core.lookahead_id() {{");
    out.inc_indent();

    for (_, shift) in &shifts {
        geni!(out, "{} => {{ // {}", shift.pattern, shift.comment);
        out.inc_indent();
        geni!(out, "{}", shift.body);
        out.dec_indent();
        geni!(out, "}}");
    }

    for reduce in &reduces {
        if reduce.lookaheads.is_empty() {
            continue;
        }
        let mut ordered: Vec<TermIndex> = reduce.lookaheads.iter().copied().collect();
        ordered.sort_by_key(|&la| grammar.terminal(la).id());
        let patterns: Vec<String> = ordered
            .iter()
            .map(|&la| term_pattern(grammar, la))
            .collect();
        let names: Vec<&str> = ordered
            .iter()
            .map(|&la| grammar.terminal(la).name())
            .collect();
        geni!(
            out,
            "{} => {{ // lookaheads: {}",
            patterns.join(" | "),
            names.join(" ")
        );
        out.inc_indent();
        geni!(out, "{}", reduce.body);
        out.dec_indent();
        geni!(out, "}}");
    }

    if settings.gen_error_code {
        geni!(out, "_ => {{");
        out.inc_indent();
        geni!(out, "return Err(self.core.transition_error({state}));");
        out.dec_indent();
        geni!(out, "}}");
    } else {
        geni!(out, "_ => {{}}");
    }

    out.dec_indent();
    geni!(out, "}}");

    if !shifts.is_empty() {
        geni!(
            out,
            "{}",
            formatdoc! {r#"
                if let Some(next_state) = next_state {{
                    self.core.push_lookahead()?;
                    next_state(self)?;
                }}
            "#}
        );
    }

    // jump to the new closure after a reduce
    let jumps = collection.transitions_from(pos, false);
    if !jumps.is_empty() {
        geni!(out, "while self.core.jump_ready() {{");
        out.inc_indent();
        geni!(out, "let (is_term, top_id) = self.core.top_symbol({state})?;");
        geni!(out, "if is_term {{");
        geni!(out, "    break;");
        geni!(out, "}}");
        geni!(out, "match top_id {{");
        out.inc_indent();

        for transition in &jumps {
            let nonterm = match transition.symbol {
                SymbolRef::NonTerm(nt) => nt,
                SymbolRef::Term(_) => continue,
            };
            let target = collection.closures()[transition.to].id();
            let target_name = &state_names[&target];

            geni!(
                out,
                "{} => {{ // {}",
                grammar.nonterminal(nonterm).id(),
                grammar.nonterminal(nonterm).name()
            );
            out.inc_indent();

            if settings.gen_partial_matches {
                if let Some(partial) =
                    collection.unique_partial_match(&transition.from_elements, false)
                {
                    geni!(
                        out,
                        "// partial semantic rule {} with {} argument(s)",
                        partial.rule_id,
                        partial.match_len
                    );
                    geni!(
                        out,
                        "let applied = self.core.apply_partial_rule(false, {}, {}, {})?;",
                        partial.rule_id,
                        partial.match_len,
                        partial.lhs_id
                    );
                    if settings.gen_debug_code {
                        geni!(out, "if applied {{");
                        geni!(
                            out,
                            "    self.core.debug_partial_rule(false, {}, {});",
                            partial.match_len,
                            partial.rule_id
                        );
                        geni!(out, "}}");
                    }
                }
            }

            geni!(out, "self.{target_name}()?;");
            out.dec_indent();
            geni!(out, "}}");
        }

        if settings.gen_error_code {
            geni!(out, "_ => {{");
            out.inc_indent();
            geni!(out, "return Err(self.core.transition_error({state}));");
            out.dec_indent();
            geni!(out, "}}");
        } else {
            geni!(out, "_ => {{}}");
        }

        out.dec_indent();
        geni!(out, "}}");
        out.dec_indent();
        geni!(out, "}}");
    }

    geni!(out, "self.core.leave_state({state});");
    geni!(out, "Ok(())");
    out.dec_indent();
    geni!(out, "}}");

    Ok(())
}
