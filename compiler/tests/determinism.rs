// Determinism tests for the cardinality solver.
//
// These tests verify that solving produces byte-identical output for
// identical inputs, independent of edge insertion order, so results can
// be cached and diffed by fingerprint alone.

use std::collections::BTreeMap;

use weft::fingerprint::{canonical_json, result_fingerprint};
use weft::graph::{Block, BlockGraph, CardinalityBehavior, PortRef, PreservePolicy};
use weft::solve::{resolve_cardinality, SolveResult};
use weft::types::{DomainTypeId, SignalAxes};

fn scalar() -> SignalAxes {
    SignalAxes::default()
}

/// A graph exercising every constraint kind: a collection source, a zip
/// block, a strict chain, a field consumer, and plain signals.
fn mixed_graph(edges: &[(u32, &str, u32, &str)]) -> BlockGraph {
    let mut g = BlockGraph::new();
    g.add_block(
        Block::new(
            "array",
            CardinalityBehavior::Transform {
                domain: DomainTypeId(0),
            },
        )
        .with_output("items", scalar()),
    );
    g.add_block(
        Block::new(
            "mix",
            CardinalityBehavior::Preserve(PreservePolicy::AllowZipSignal),
        )
        .with_input("a", scalar())
        .with_input("b", scalar())
        .with_output("blend", scalar()),
    );
    g.add_block(
        Block::new("offset", CardinalityBehavior::Preserve(PreservePolicy::Strict))
            .with_input("value", scalar())
            .with_output("shifted", scalar()),
    );
    g.add_block(
        Block::new("render", CardinalityBehavior::FieldOnly).with_input("position", scalar()),
    );
    for (src_block, src_port, tgt_block, tgt_port) in edges {
        g.connect(
            PortRef::new(*src_block, *src_port),
            PortRef::new(*tgt_block, *tgt_port),
        );
    }
    g
}

const EDGES: [(u32, &str, u32, &str); 3] = [
    (0, "items", 1, "a"),
    (1, "blend", 2, "value"),
    (2, "shifted", 3, "position"),
];

fn run(graph: &BlockGraph) -> SolveResult {
    resolve_cardinality(graph, &BTreeMap::new()).expect("graph is well-formed")
}

/// Solving the same graph twice produces byte-identical canonical JSON.
#[test]
fn same_graph_solves_byte_identical() {
    let g = mixed_graph(&EDGES);
    let first = canonical_json(&run(&g));
    let second = canonical_json(&run(&g));
    assert_eq!(
        first, second,
        "solver output should be byte-identical across runs"
    );
}

/// Edge insertion order is irrelevant: any permutation of the same edge
/// set yields byte-identical output and the same fingerprint.
#[test]
fn edge_insertion_order_does_not_matter() {
    let forward = mixed_graph(&EDGES);
    let mut reversed_edges = EDGES;
    reversed_edges.reverse();
    let reversed = mixed_graph(&reversed_edges);

    let a = run(&forward);
    let b = run(&reversed);
    assert_eq!(
        canonical_json(&a),
        canonical_json(&b),
        "edge order leaked into the solver output"
    );
    assert_eq!(result_fingerprint(&a), result_fingerprint(&b));
}

/// Duplicate edges collapse: connecting the same ports twice changes
/// nothing about the result.
#[test]
fn duplicate_edges_do_not_change_the_result() {
    let plain = mixed_graph(&EDGES);
    let mut doubled_edges = EDGES.to_vec();
    doubled_edges.push(EDGES[0]);
    let doubled = mixed_graph(&doubled_edges);

    assert_eq!(canonical_json(&run(&plain)), canonical_json(&run(&doubled)));
}

/// Diagnostic order is stable across runs, including the diagnostics-only
/// rendering used by snapshots.
#[test]
fn diagnostic_order_is_stable() {
    // Two independent conflicts.
    let mut g = BlockGraph::new();
    g.add_block(
        Block::new(
            "array",
            CardinalityBehavior::Transform {
                domain: DomainTypeId(0),
            },
        )
        .with_output("items", scalar()),
    );
    g.add_block(Block::new("osc", CardinalityBehavior::SignalOnly).with_input("freq", scalar()));
    g.add_block(Block::new("lfo", CardinalityBehavior::SignalOnly).with_output("wave", scalar()));
    g.add_block(
        Block::new("render", CardinalityBehavior::FieldOnly).with_input("position", scalar()),
    );
    g.connect(PortRef::new(0, "items"), PortRef::new(1, "freq"));
    g.connect(PortRef::new(2, "wave"), PortRef::new(3, "position"));

    let first = run(&g);
    let second = run(&g);
    assert_eq!(first.diagnostics.len(), 2);
    assert_eq!(first.diagnostics, second.diagnostics);
    assert_eq!(first.snapshot_summary(), second.snapshot_summary());
}

/// Different pre-resolved inputs produce different fingerprints.
#[test]
fn fingerprint_tracks_the_input() {
    let mut g = BlockGraph::new();
    g.add_block(
        Block::new("lag", CardinalityBehavior::Preserve(PreservePolicy::Strict))
            .with_input("value", scalar())
            .with_output("smoothed", scalar()),
    );
    let key = weft::graph::PortKey::input(weft::graph::BlockIndex(0), "value");

    let mut one_pin = BTreeMap::new();
    one_pin.insert(key.clone(), weft::types::CanonicalType::one(scalar()));
    let mut zero_pin = BTreeMap::new();
    zero_pin.insert(key, weft::types::CanonicalType::zero(scalar()));

    let a = resolve_cardinality(&g, &one_pin).expect("well-formed");
    let b = resolve_cardinality(&g, &zero_pin).expect("well-formed");
    assert_ne!(result_fingerprint(&a), result_fingerprint(&b));
}
