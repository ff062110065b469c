// graph.rs — Block-graph front model for the cardinality solver
//
// A BlockGraph is the normalized form handed over by the lowering pass:
// blocks with declared ports and a cardinality behavior, plus directed
// edges between output and input ports. Graphs may contain cycles;
// nothing here assumes acyclicity.
//
// Preconditions: none (types plus structural validation only).
// Postconditions: `validate` accepts exactly the graphs whose edges name
//                 existing blocks/ports with correct direction and whose
//                 port names are unique per side.
// Failure modes: contract violations are reported as `GraphError`.
// Side effects: none.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::types::{DomainTypeId, SignalAxes};

// ── Identifiers and keys ─────────────────────────────────────────────────

/// Position of a block in the graph's block list. Stable for the lifetime
/// of one compilation; used as provenance in diagnostics and as the
/// instance id of transform blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BlockIndex(pub u32);

impl fmt::Display for BlockIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PortDir {
    Input,
    Output,
}

impl fmt::Display for PortDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDir::Input => write!(f, "in"),
            PortDir::Output => write!(f, "out"),
        }
    }
}

/// Addresses one port of one block. The derived ordering (block, then
/// direction, then name) is the anchor ordering used when a diagnostic
/// must pick a representative port for a whole group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortKey {
    pub block: BlockIndex,
    pub dir: PortDir,
    pub port: String,
}

impl PortKey {
    pub fn input(block: BlockIndex, port: impl Into<String>) -> Self {
        Self {
            block,
            dir: PortDir::Input,
            port: port.into(),
        }
    }

    pub fn output(block: BlockIndex, port: impl Into<String>) -> Self {
        Self {
            block,
            dir: PortDir::Output,
            port: port.into(),
        }
    }
}

impl fmt::Display for PortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.block, self.dir, self.port)
    }
}

// Ports key JSON maps in the output contract, so they serialize as their
// display form ("b0.in.x") rather than as a struct.
impl Serialize for PortKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ── Blocks ───────────────────────────────────────────────────────────────

/// How strict a preserve block is about mixing signals and fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreservePolicy {
    /// All ports share one cardinality exactly.
    Strict,
    /// Scalar inputs may zip with per-instance inputs; the whole port set
    /// is promoted together if any member is per-instance.
    AllowZipSignal,
}

/// Declared cardinality behavior of a block, from its registry metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardinalityBehavior {
    /// Every port is a scalar signal.
    SignalOnly,
    /// Spawns a fresh collection: outputs are per-instance over the
    /// block's own identity in `domain`.
    Transform { domain: DomainTypeId },
    Preserve(PreservePolicy),
    /// Consumes per-instance data only; inputs must end up `many`.
    FieldOnly,
}

/// One declared port.
#[derive(Debug, Clone)]
pub struct PortDecl {
    pub name: String,
    pub axes: SignalAxes,
}

/// One block of the normalized graph.
#[derive(Debug, Clone)]
pub struct Block {
    pub name: String,
    pub behavior: CardinalityBehavior,
    pub inputs: Vec<PortDecl>,
    pub outputs: Vec<PortDecl>,
}

impl Block {
    pub fn new(name: impl Into<String>, behavior: CardinalityBehavior) -> Self {
        Self {
            name: name.into(),
            behavior,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Append an input port declaration.
    pub fn with_input(mut self, name: impl Into<String>, axes: SignalAxes) -> Self {
        self.inputs.push(PortDecl {
            name: name.into(),
            axes,
        });
        self
    }

    /// Append an output port declaration.
    pub fn with_output(mut self, name: impl Into<String>, axes: SignalAxes) -> Self {
        self.outputs.push(PortDecl {
            name: name.into(),
            axes,
        });
        self
    }

    pub fn input(&self, name: &str) -> Option<&PortDecl> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&PortDecl> {
        self.outputs.iter().find(|p| p.name == name)
    }
}

// ── Edges ────────────────────────────────────────────────────────────────

/// Endpoint of an edge: a block plus a port name. Which side of the block
/// it names is implied by edge position (sources are outputs, targets are
/// inputs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortRef {
    pub block: BlockIndex,
    pub port: String,
}

impl PortRef {
    pub fn new(block: u32, port: impl Into<String>) -> Self {
        Self {
            block: BlockIndex(block),
            port: port.into(),
        }
    }
}

/// A directed connection from an output port to an input port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub source: PortRef,
    pub target: PortRef,
}

// ── Graph ────────────────────────────────────────────────────────────────

/// The normalized block graph consumed by constraint building.
#[derive(Debug, Clone, Default)]
pub struct BlockGraph {
    pub blocks: Vec<Block>,
    pub edges: Vec<Edge>,
}

impl BlockGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block and return its index.
    pub fn add_block(&mut self, block: Block) -> BlockIndex {
        let idx = BlockIndex(self.blocks.len() as u32);
        self.blocks.push(block);
        idx
    }

    /// Append an edge from an output port to an input port.
    pub fn connect(&mut self, source: PortRef, target: PortRef) {
        self.edges.push(Edge { source, target });
    }

    pub fn block(&self, idx: BlockIndex) -> Option<&Block> {
        self.blocks.get(idx.0 as usize)
    }

    /// Check the input contract: unique port names per side, and every
    /// edge naming an existing output as source and an existing input as
    /// target. Reports the first violation in declaration order.
    pub fn validate(&self) -> Result<(), GraphError> {
        for (idx, block) in self.blocks.iter().enumerate() {
            let idx = BlockIndex(idx as u32);
            check_unique(idx, PortDir::Input, &block.inputs)?;
            check_unique(idx, PortDir::Output, &block.outputs)?;
        }
        for edge in &self.edges {
            let source_block = self
                .block(edge.source.block)
                .ok_or(GraphError::UnknownBlock {
                    block: edge.source.block,
                })?;
            if source_block.output(&edge.source.port).is_none() {
                return Err(GraphError::UnknownPort {
                    key: PortKey::output(edge.source.block, edge.source.port.clone()),
                });
            }
            let target_block = self
                .block(edge.target.block)
                .ok_or(GraphError::UnknownBlock {
                    block: edge.target.block,
                })?;
            if target_block.input(&edge.target.port).is_none() {
                return Err(GraphError::UnknownPort {
                    key: PortKey::input(edge.target.block, edge.target.port.clone()),
                });
            }
        }
        Ok(())
    }
}

fn check_unique(block: BlockIndex, dir: PortDir, ports: &[PortDecl]) -> Result<(), GraphError> {
    let mut seen = BTreeSet::new();
    for p in ports {
        if !seen.insert(p.name.as_str()) {
            return Err(GraphError::DuplicatePort {
                block,
                dir,
                port: p.name.clone(),
            });
        }
    }
    Ok(())
}

// ── Errors ───────────────────────────────────────────────────────────────

/// Input-contract violation in a handed-over block graph. These are caller
/// bugs, distinct from the solver's own diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    UnknownBlock {
        block: BlockIndex,
    },
    UnknownPort {
        key: PortKey,
    },
    DuplicatePort {
        block: BlockIndex,
        dir: PortDir,
        port: String,
    },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::UnknownBlock { block } => {
                write!(f, "edge references unknown block {block}")
            }
            GraphError::UnknownPort { key } => {
                write!(f, "edge endpoint references unknown port {key}")
            }
            GraphError::DuplicatePort { block, dir, port } => {
                let side = match dir {
                    PortDir::Input => "input",
                    PortDir::Output => "output",
                };
                write!(f, "duplicate {side} port '{port}' on block {block}")
            }
        }
    }
}

impl std::error::Error for GraphError {}
