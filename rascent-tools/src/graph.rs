//! Graphviz export of the transition graph.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::process::Command;

use petgraph::dot::Dot;
use petgraph::Graph;

use crate::collection::Collection;
use crate::error::Result;

/// Builds the transition graph with one node per closure.
///
/// With `write_full_coll` the node labels carry the complete element
/// listing of each state, otherwise just the state id.
fn build_graph(collection: &Collection, write_full_coll: bool) -> Graph<String, String> {
    let grammar = collection.grammar();
    let mut graph: Graph<String, String> = Graph::new();

    let nodes: Vec<_> = collection
        .closures()
        .iter()
        .map(|closure| {
            let label = if write_full_coll {
                closure.describe(collection.arena(), grammar)
            } else {
                format!("State {}", closure.id())
            };
            graph.add_node(label)
        })
        .collect();

    for transition in collection.transitions() {
        graph.add_edge(
            nodes[transition.from],
            nodes[transition.to],
            grammar.symbol_name(transition.symbol).to_string(),
        );
    }

    graph
}

/// Writes the transition graph in dot format.
pub fn write_graph<W: Write>(
    collection: &Collection,
    write_full_coll: bool,
    mut out: W,
) -> io::Result<()> {
    let graph = build_graph(collection, write_full_coll);
    write!(out, "{}", Dot::new(&graph))
}

/// Writes `<file>.graph` and renders it to `<file>.svg` by invoking the
/// external `dot` process.
pub fn save_graph(collection: &Collection, file: &Path, write_full_coll: bool) -> Result<()> {
    let graph_file = file.with_extension("graph");
    let svg_file = file.with_extension("svg");

    let out = File::create(&graph_file)?;
    let mut out = BufWriter::new(out);
    write_graph(collection, write_full_coll, &mut out)?;
    out.flush()?;

    let status = Command::new("dot")
        .arg("-Tsvg")
        .arg(&graph_file)
        .arg("-o")
        .arg(&svg_file)
        .status()?;
    if !status.success() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("dot exited with {status}"),
        )
        .into());
    }

    Ok(())
}
