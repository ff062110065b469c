// constraints.rs — Cardinality constraint graph and its builder
//
// Lowers a BlockGraph into the flat form the solver consumes: one node per
// (block, port, direction) triple, four constraint kinds, and a port-key
// index. Emission is mechanical per block behavior; every edge emits
// exactly one Equal. There is no per-edge broadcast flag: all broadcast
// semantics live in the block-level ZipBroadcast constraint, so nothing
// downstream can depend on edge traversal order.
//
// Preconditions: `graph` satisfies `BlockGraph::validate` (checked here).
// Postconditions: node ids are dense in (block, inputs-then-outputs,
//                 declaration) order; every declared port has exactly one
//                 node; the constraint list is sorted and deduplicated;
//                 Equal pairs carry the smaller node first.
// Failure modes: contract violations surface as `GraphError`.
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt;

use crate::graph::{BlockGraph, BlockIndex, CardinalityBehavior, GraphError, PortKey, PreservePolicy};
use crate::types::{
    InferenceInstanceTerm, InstanceId, InstanceRef, InstanceVarId, SignalAxes,
};

// ── Nodes ────────────────────────────────────────────────────────────────

/// Solver node id, one per port. Dense and allocated in declaration order,
/// so ids are a deterministic function of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// One solver node, carrying the provenance needed to name it in
/// diagnostics and the pass-through axes for the final type.
#[derive(Debug, Clone)]
pub struct CardNode {
    pub id: NodeId,
    pub key: PortKey,
    pub axes: SignalAxes,
}

// ── Constraints ──────────────────────────────────────────────────────────

/// A single cardinality constraint. The derived ordering (variant rank,
/// then node ids) is the normalized sort key for the constraint list.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum CardConstraint {
    /// The node's group must resolve to `one`.
    ClampOne(NodeId),
    /// The node's group must resolve to `many` carrying this term.
    ForceMany(NodeId, InferenceInstanceTerm),
    /// Both nodes share one cardinality. Only edges and strict preserve
    /// blocks emit these; the broadcast phase never adds more.
    Equal(NodeId, NodeId),
    /// Block-level zip set: if any member group resolves to `many`, every
    /// member becomes `many` with one unified term. Never forces `one`.
    ZipBroadcast(Vec<NodeId>),
}

/// Flat constraint form of one block graph, consumed once by `solve`.
#[derive(Debug, Clone)]
pub struct CardinalityConstraintGraph {
    pub nodes: Vec<CardNode>,
    pub constraints: Vec<CardConstraint>,
    pub port_nodes: BTreeMap<PortKey, NodeId>,
    /// Number of existential instance variables allocated by the builder.
    pub var_count: u32,
    /// Origin port of each existential variable, for diagnostics.
    pub var_origins: BTreeMap<InstanceVarId, PortKey>,
}

impl CardinalityConstraintGraph {
    pub fn node(&self, id: NodeId) -> Option<&CardNode> {
        self.nodes.get(id.0 as usize)
    }
}

// ── Builder ──────────────────────────────────────────────────────────────

/// Lower a validated block graph into constraints.
pub fn build_constraints(graph: &BlockGraph) -> Result<CardinalityConstraintGraph, GraphError> {
    graph.validate()?;

    let mut b = ConstraintBuilder::default();

    // First pass: allocate one node per declared port, inputs before
    // outputs, in declaration order.
    for (idx, block) in graph.blocks.iter().enumerate() {
        let idx = BlockIndex(idx as u32);
        for decl in &block.inputs {
            b.add_node(PortKey::input(idx, decl.name.clone()), decl.axes);
        }
        for decl in &block.outputs {
            b.add_node(PortKey::output(idx, decl.name.clone()), decl.axes);
        }
    }

    // Second pass: behavior constraints per block.
    for (idx, block) in graph.blocks.iter().enumerate() {
        let idx = BlockIndex(idx as u32);
        match block.behavior {
            CardinalityBehavior::SignalOnly => {
                for id in b.block_nodes(idx, graph) {
                    b.constraints.push(CardConstraint::ClampOne(id));
                }
            }
            CardinalityBehavior::Transform { domain } => {
                let own = InstanceRef {
                    domain,
                    instance: InstanceId(idx.0),
                };
                for decl in &block.outputs {
                    if let Some(id) = b.port_node(&PortKey::output(idx, decl.name.clone())) {
                        b.constraints.push(CardConstraint::ForceMany(
                            id,
                            InferenceInstanceTerm::Inst(own),
                        ));
                    }
                }
            }
            CardinalityBehavior::Preserve(PreservePolicy::Strict) => {
                let ids = b.block_nodes(idx, graph);
                for pair in ids.windows(2) {
                    b.constraints.push(equal(pair[0], pair[1]));
                }
            }
            CardinalityBehavior::Preserve(PreservePolicy::AllowZipSignal) => {
                let ids = b.block_nodes(idx, graph);
                if !ids.is_empty() {
                    b.constraints.push(CardConstraint::ZipBroadcast(ids));
                }
            }
            CardinalityBehavior::FieldOnly => {
                for decl in &block.inputs {
                    let key = PortKey::input(idx, decl.name.clone());
                    if let Some(id) = b.port_node(&key) {
                        let var = b.fresh_var(key);
                        b.constraints.push(CardConstraint::ForceMany(
                            id,
                            InferenceInstanceTerm::Var(var),
                        ));
                    }
                }
            }
        }
    }

    // Third pass: one Equal per edge.
    for edge in &graph.edges {
        let from = PortKey::output(edge.source.block, edge.source.port.clone());
        let to = PortKey::input(edge.target.block, edge.target.port.clone());
        if let (Some(a), Some(b_id)) = (b.port_node(&from), b.port_node(&to)) {
            b.constraints.push(equal(a, b_id));
        }
    }

    // Canonical order: sort by the normalized key, drop duplicates from
    // parallel edges.
    b.constraints.sort();
    b.constraints.dedup();

    Ok(CardinalityConstraintGraph {
        nodes: b.nodes,
        constraints: b.constraints,
        port_nodes: b.port_nodes,
        var_count: b.next_var,
        var_origins: b.var_origins,
    })
}

fn equal(a: NodeId, b: NodeId) -> CardConstraint {
    if a <= b {
        CardConstraint::Equal(a, b)
    } else {
        CardConstraint::Equal(b, a)
    }
}

#[derive(Default)]
struct ConstraintBuilder {
    nodes: Vec<CardNode>,
    constraints: Vec<CardConstraint>,
    port_nodes: BTreeMap<PortKey, NodeId>,
    next_var: u32,
    var_origins: BTreeMap<InstanceVarId, PortKey>,
}

impl ConstraintBuilder {
    fn add_node(&mut self, key: PortKey, axes: SignalAxes) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(CardNode {
            id,
            key: key.clone(),
            axes,
        });
        self.port_nodes.insert(key, id);
        id
    }

    fn port_node(&self, key: &PortKey) -> Option<NodeId> {
        self.port_nodes.get(key).copied()
    }

    /// Node ids of every port of `idx`, inputs before outputs, in
    /// declaration order.
    fn block_nodes(&self, idx: BlockIndex, graph: &BlockGraph) -> Vec<NodeId> {
        let mut ids = Vec::new();
        if let Some(block) = graph.block(idx) {
            for decl in &block.inputs {
                if let Some(id) = self.port_node(&PortKey::input(idx, decl.name.clone())) {
                    ids.push(id);
                }
            }
            for decl in &block.outputs {
                if let Some(id) = self.port_node(&PortKey::output(idx, decl.name.clone())) {
                    ids.push(id);
                }
            }
        }
        ids
    }

    fn fresh_var(&mut self, origin: PortKey) -> InstanceVarId {
        let var = InstanceVarId(self.next_var);
        self.next_var += 1;
        self.var_origins.insert(var, origin);
        var
    }
}
