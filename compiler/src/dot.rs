// dot.rs — Graphviz DOT output for block graphs
//
// Renders a BlockGraph and a solver result into DOT format suitable for
// `dot`, `neato`, or other Graphviz layout engines. Each block becomes a
// cluster, each port a node labeled with its resolved cardinality, and
// ports named by a diagnostic are flagged in red.
//
// Preconditions: `result` came from solving the same graph.
// Postconditions: returns a valid DOT string representing the graph.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::collections::BTreeSet;
use std::fmt::Write;

use crate::graph::{BlockGraph, CardinalityBehavior, PortDir, PortKey, PreservePolicy};
use crate::solve::SolveResult;
use crate::types::CanonicalType;

/// Emit the block graph and its solved port types as a Graphviz DOT string.
pub fn emit_dot(graph: &BlockGraph, result: &SolveResult) -> String {
    let mut buf = String::new();
    writeln!(buf, "digraph weft {{").unwrap();
    writeln!(buf, "    rankdir=LR;").unwrap();
    writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10];").unwrap();
    writeln!(buf, "    edge [fontname=\"Helvetica\", fontsize=9];").unwrap();

    // Ports named by any diagnostic get flagged styling.
    let mut flagged: BTreeSet<&PortKey> = BTreeSet::new();
    for diag in &result.diagnostics {
        flagged.extend(diag.involved.iter());
    }

    for (idx, block) in graph.blocks.iter().enumerate() {
        let block_idx = crate::graph::BlockIndex(idx as u32);
        writeln!(buf).unwrap();
        writeln!(buf, "    subgraph cluster_b{idx} {{").unwrap();
        writeln!(
            buf,
            "        label=\"{} (b{idx})\\n{}\";",
            block.name,
            behavior_word(block.behavior)
        )
        .unwrap();
        writeln!(buf, "        style=rounded;").unwrap();
        writeln!(buf, "        color=gray50;").unwrap();
        for port in &block.inputs {
            let key = PortKey::input(block_idx, port.name.clone());
            write_port(&mut buf, &key, result, flagged.contains(&key));
        }
        for port in &block.outputs {
            let key = PortKey::output(block_idx, port.name.clone());
            write_port(&mut buf, &key, result, flagged.contains(&key));
        }
        writeln!(buf, "    }}").unwrap();
    }

    if !graph.edges.is_empty() {
        writeln!(buf).unwrap();
        for edge in &graph.edges {
            let src_key = PortKey::output(edge.source.block, edge.source.port.clone());
            let tgt_key = PortKey::input(edge.target.block, edge.target.port.clone());
            let src = dot_port_id(&src_key);
            let tgt = dot_port_id(&tgt_key);
            match port_type(result, &src_key) {
                Some(ty) => {
                    writeln!(buf, "    {src} -> {tgt} [label=\"{}\"];", ty.cardinality).unwrap()
                }
                None => writeln!(buf, "    {src} -> {tgt};").unwrap(),
            }
        }
    }

    writeln!(buf, "}}").unwrap();
    buf
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn write_port(buf: &mut String, key: &PortKey, result: &SolveResult, flagged: bool) {
    let id = dot_port_id(key);
    let mut label = key.port.clone();
    if let Some(ty) = port_type(result, key) {
        let _ = write!(label, "\\n{}", ty.cardinality);
    }
    let fill = match key.dir {
        PortDir::Input => "lightblue",
        PortDir::Output => "lightyellow",
    };
    if flagged {
        writeln!(
            buf,
            "        {id} [shape=box, style=filled, fillcolor=lightsalmon, color=red, penwidth=2, label=\"{label}\"];"
        )
        .unwrap();
    } else {
        writeln!(
            buf,
            "        {id} [shape=box, style=filled, fillcolor={fill}, label=\"{label}\"];"
        )
        .unwrap();
    }
}

fn port_type<'a>(result: &'a SolveResult, key: &PortKey) -> Option<&'a CanonicalType> {
    result.port_types.as_ref().and_then(|m| m.get(key))
}

/// Build the DOT node ID for a port: `b<idx>_<dir>_<name>`.
fn dot_port_id(key: &PortKey) -> String {
    format!("b{}_{}_{}", key.block.0, key.dir, sanitize(&key.port))
}

/// Sanitize a name to valid DOT identifier characters.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn behavior_word(behavior: CardinalityBehavior) -> &'static str {
    match behavior {
        CardinalityBehavior::SignalOnly => "signal-only",
        CardinalityBehavior::Transform { .. } => "transform",
        CardinalityBehavior::Preserve(PreservePolicy::Strict) => "preserve",
        CardinalityBehavior::Preserve(PreservePolicy::AllowZipSignal) => "preserve+zip",
        CardinalityBehavior::FieldOnly => "field-only",
    }
}
