// Property-based tests for solver invariants.
//
// Three categories:
// 1. Determinism: identical graphs solve byte-identically, in any edge order
// 2. Behavior pairs: exhaustive outcome matrix over all two-block chains
// 3. Result shape: null-on-error, full port coverage, and idempotence
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use proptest::prelude::*;
use std::collections::BTreeMap;

use weft::fingerprint::canonical_json;
use weft::graph::{Block, BlockGraph, CardinalityBehavior, PortRef, PreservePolicy};
use weft::solve::{resolve_cardinality, SolveResult};
use weft::types::{CardinalityValue, DomainTypeId, SignalAxes};

// ── Graph generator ─────────────────────────────────────────────────────────

fn arb_behavior() -> impl Strategy<Value = CardinalityBehavior> {
    prop_oneof![
        Just(CardinalityBehavior::SignalOnly),
        (0u32..3).prop_map(|d| CardinalityBehavior::Transform {
            domain: DomainTypeId(d)
        }),
        Just(CardinalityBehavior::Preserve(PreservePolicy::Strict)),
        Just(CardinalityBehavior::Preserve(PreservePolicy::AllowZipSignal)),
        Just(CardinalityBehavior::FieldOnly),
    ]
}

/// Generate a small well-formed block graph: every edge connects an output
/// port that exists to an input port that exists, so validation always
/// passes and any diagnostic comes from the solver itself.
fn arb_block_graph() -> impl Strategy<Value = BlockGraph> {
    let block = (arb_behavior(), 0usize..=2, 0usize..=2);
    (
        prop::collection::vec(block, 1..=6),
        prop::collection::vec((0usize..6, 0usize..2, 0usize..6, 0usize..2), 0..=8),
    )
        .prop_map(|(blocks, raw_edges)| {
            let mut g = BlockGraph::new();
            for (i, (behavior, n_in, n_out)) in blocks.iter().enumerate() {
                let mut b = Block::new(format!("blk{i}"), *behavior);
                for k in 0..*n_in {
                    b = b.with_input(format!("in{k}"), SignalAxes::default());
                }
                for k in 0..*n_out {
                    b = b.with_output(format!("out{k}"), SignalAxes::default());
                }
                g.add_block(b);
            }
            for (src, src_out, tgt, tgt_in) in raw_edges {
                let src = src % blocks.len();
                let tgt = tgt % blocks.len();
                let n_out = blocks[src].2;
                let n_in = blocks[tgt].1;
                if n_out == 0 || n_in == 0 {
                    continue;
                }
                g.connect(
                    PortRef::new(src as u32, format!("out{}", src_out % n_out)),
                    PortRef::new(tgt as u32, format!("in{}", tgt_in % n_in)),
                );
            }
            g
        })
}

fn run(graph: &BlockGraph) -> SolveResult {
    resolve_cardinality(graph, &BTreeMap::new()).expect("generated graphs are well-formed")
}

fn port_count(graph: &BlockGraph) -> usize {
    graph
        .blocks
        .iter()
        .map(|b| b.inputs.len() + b.outputs.len())
        .sum()
}

// ── 1. Determinism ──────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 200,
        .. ProptestConfig::default()
    })]

    #[test]
    fn solver_is_deterministic(graph in arb_block_graph()) {
        let first = run(&graph);
        let second = run(&graph);
        prop_assert_eq!(canonical_json(&first), canonical_json(&second));
    }

    #[test]
    fn edge_order_never_leaks_into_the_result(graph in arb_block_graph()) {
        let mut reversed = graph.clone();
        reversed.edges.reverse();
        prop_assert_eq!(
            canonical_json(&run(&graph)),
            canonical_json(&run(&reversed))
        );
    }
}

// ── 2. Behavior pairs (exhaustive) ──────────────────────────────────────────

/// Outcome of every two-block chain `A.out0 -> B.in0`, for all behavior
/// pairs. Locks down the interaction rules: which pairs resolve to `one`,
/// which carry a collection through, and which fail with what code.
#[test]
fn behavior_pair_matrix() {
    let behaviors = [
        CardinalityBehavior::SignalOnly,
        CardinalityBehavior::Transform {
            domain: DomainTypeId(0),
        },
        CardinalityBehavior::Preserve(PreservePolicy::Strict),
        CardinalityBehavior::Preserve(PreservePolicy::AllowZipSignal),
        CardinalityBehavior::FieldOnly,
    ];
    #[rustfmt::skip]
    let expected = [
        // B: signal            transform                preserve                 preserve+zip             field
        ["one",                 "one",                   "one",                   "one",                   "CardinalityConflict"],   // A: signal
        ["CardinalityConflict", "many",                  "many",                  "many",                  "many"],                  // A: transform
        ["one",                 "UnresolvedCardinality", "UnresolvedCardinality", "UnresolvedCardinality", "UnresolvedInstanceVar"], // A: preserve
        ["one",                 "UnresolvedCardinality", "UnresolvedCardinality", "UnresolvedCardinality", "UnresolvedInstanceVar"], // A: preserve+zip
        ["one",                 "UnresolvedCardinality", "UnresolvedCardinality", "UnresolvedCardinality", "UnresolvedInstanceVar"], // A: field
    ];

    for (i, &a) in behaviors.iter().enumerate() {
        for (j, &b) in behaviors.iter().enumerate() {
            let mut g = BlockGraph::new();
            g.add_block(Block::new("a", a).with_output("out0", SignalAxes::default()));
            g.add_block(Block::new("b", b).with_input("in0", SignalAxes::default()));
            g.connect(PortRef::new(0, "out0"), PortRef::new(1, "in0"));

            let r = run(&g);
            assert_eq!(
                classify(&r),
                expected[i][j],
                "pair ({:?} -> {:?}) produced {:?}",
                a,
                b,
                r.diagnostics,
            );
        }
    }
}

fn classify(r: &SolveResult) -> &'static str {
    match &r.port_types {
        Some(types) => {
            if types
                .values()
                .all(|t| t.cardinality == CardinalityValue::One)
            {
                "one"
            } else if types
                .values()
                .all(|t| matches!(t.cardinality, CardinalityValue::Many(_)))
            {
                "many"
            } else {
                "mixed"
            }
        }
        None => r.diagnostics[0].kind.code(),
    }
}

// ── 3. Result shape ─────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 200,
        .. ProptestConfig::default()
    })]

    #[test]
    fn diagnostics_and_null_type_map_coincide(graph in arb_block_graph()) {
        let r = run(&graph);
        prop_assert_eq!(r.has_errors(), r.port_types.is_none());
    }

    #[test]
    fn a_clean_result_covers_every_port_exactly(graph in arb_block_graph()) {
        let r = run(&graph);
        if let Some(types) = &r.port_types {
            prop_assert_eq!(types.len(), port_count(&graph));
        }
    }

    #[test]
    fn resolving_an_already_resolved_graph_is_a_no_op(graph in arb_block_graph()) {
        let first = run(&graph);
        if let Some(types) = first.port_types {
            let second = resolve_cardinality(&graph, &types)
                .expect("generated graphs are well-formed");
            prop_assert!(
                !second.has_errors(),
                "re-solve produced diagnostics: {:?}",
                second.diagnostics
            );
            prop_assert_eq!(second.port_types, Some(types));
        }
    }
}
