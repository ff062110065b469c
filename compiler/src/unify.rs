// unify.rs — Union-find machinery for equality groups and instance terms
//
// Two independent union-finds. EqualityGroups collapses solver nodes
// connected by Equal constraints into equivalence classes; InstanceTable
// merges existential instance variables and binds their classes to
// concrete refs. Conflicts come back as values, never panics, so callers
// can keep collecting diagnostics past the first failure.
//
// Preconditions: ids passed in are within the size given at construction.
// Postconditions: representative choice is deterministic — union by rank,
//                 and on equal rank the smaller id becomes the root.
// Failure modes: incompatible concrete bindings are reported via
//                `UnifyOutcome::Conflict`.
// Side effects: none beyond internal state.

use std::collections::BTreeMap;

use crate::constraints::NodeId;
use crate::types::{InferenceInstanceTerm, InstanceRef, InstanceVarId};

// ── Unification outcome ──────────────────────────────────────────────────

/// Result of one unification step. `Changed` means a material change (a
/// new union or a new binding) happened; the broadcast fixpoint keeps
/// iterating exactly as long as steps keep reporting it. A `Conflict`
/// leaves the table untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnifyOutcome {
    Unchanged,
    Changed,
    Conflict {
        left: InstanceRef,
        right: InstanceRef,
    },
}

impl UnifyOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, UnifyOutcome::Changed)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, UnifyOutcome::Conflict { .. })
    }
}

// ── Equality groups ──────────────────────────────────────────────────────

/// Union-find over solver nodes, path compression plus union by rank.
#[derive(Debug)]
pub struct EqualityGroups {
    parent: Vec<u32>,
    rank: Vec<u8>,
}

impl EqualityGroups {
    pub fn new(node_count: usize) -> Self {
        Self {
            parent: (0..node_count as u32).collect(),
            rank: vec![0; node_count],
        }
    }

    /// Representative of `node`'s group, compressing the path walked.
    pub fn find(&mut self, node: NodeId) -> NodeId {
        let mut root = node.0;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        let mut cur = node.0;
        while cur != root {
            let next = self.parent[cur as usize];
            self.parent[cur as usize] = root;
            cur = next;
        }
        NodeId(root)
    }

    /// Merge the groups of `a` and `b`. Returns true when the groups were
    /// distinct (a material change).
    pub fn union(&mut self, a: NodeId, b: NodeId) -> bool {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return false;
        }
        let (root, child) = pick_root(ra.0, rb.0, &self.rank);
        self.parent[child as usize] = root;
        if self.rank[root as usize] == self.rank[child as usize] {
            self.rank[root as usize] += 1;
        }
        true
    }
}

// ── Instance table ───────────────────────────────────────────────────────

/// Union-find over existential instance variables, augmented with a
/// binding map from class representative to concrete ref. A class binds
/// at most once; a second, different ref is a conflict.
#[derive(Debug)]
pub struct InstanceTable {
    parent: Vec<u32>,
    rank: Vec<u8>,
    bound: BTreeMap<u32, InstanceRef>,
}

impl InstanceTable {
    pub fn new(var_count: u32) -> Self {
        Self {
            parent: (0..var_count).collect(),
            rank: vec![0; var_count as usize],
            bound: BTreeMap::new(),
        }
    }

    pub fn find(&mut self, var: InstanceVarId) -> InstanceVarId {
        let mut root = var.0;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        let mut cur = var.0;
        while cur != root {
            let next = self.parent[cur as usize];
            self.parent[cur as usize] = root;
            cur = next;
        }
        InstanceVarId(root)
    }

    /// Concrete ref the variable's class is bound to, if any.
    pub fn binding(&mut self, var: InstanceVarId) -> Option<InstanceRef> {
        let root = self.find(var);
        self.bound.get(&root.0).copied()
    }

    /// Merge two variable classes. Conflicts when both classes are bound
    /// to different refs; otherwise the merged class keeps the surviving
    /// binding.
    pub fn union(&mut self, a: InstanceVarId, b: InstanceVarId) -> UnifyOutcome {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return UnifyOutcome::Unchanged;
        }
        if let (Some(x), Some(y)) = (
            self.bound.get(&ra.0).copied(),
            self.bound.get(&rb.0).copied(),
        ) {
            if x != y {
                return UnifyOutcome::Conflict { left: x, right: y };
            }
        }
        let carried = self.bound.remove(&ra.0).or(self.bound.remove(&rb.0));
        let (root, child) = pick_root(ra.0, rb.0, &self.rank);
        self.parent[child as usize] = root;
        if self.rank[root as usize] == self.rank[child as usize] {
            self.rank[root as usize] += 1;
        }
        if let Some(r) = carried {
            self.bound.insert(root, r);
        }
        UnifyOutcome::Changed
    }

    /// Bind a variable's class to a concrete ref.
    pub fn resolve_to_ref(&mut self, var: InstanceVarId, reference: InstanceRef) -> UnifyOutcome {
        let root = self.find(var);
        match self.bound.get(&root.0).copied() {
            None => {
                self.bound.insert(root.0, reference);
                UnifyOutcome::Changed
            }
            Some(existing) if existing == reference => UnifyOutcome::Unchanged,
            Some(existing) => UnifyOutcome::Conflict {
                left: existing,
                right: reference,
            },
        }
    }

    /// General entry point over terms: concrete refs compare directly,
    /// variables union or bind.
    pub fn unify_terms(
        &mut self,
        t1: InferenceInstanceTerm,
        t2: InferenceInstanceTerm,
    ) -> UnifyOutcome {
        use InferenceInstanceTerm::*;
        match (t1, t2) {
            (Inst(a), Inst(b)) if a == b => UnifyOutcome::Unchanged,
            (Inst(a), Inst(b)) => UnifyOutcome::Conflict { left: a, right: b },
            (Var(v), Inst(r)) | (Inst(r), Var(v)) => self.resolve_to_ref(v, r),
            (Var(a), Var(b)) => self.union(a, b),
        }
    }

    /// Canonical form of a term: a bound variable collapses to its ref,
    /// an unbound one to its class representative.
    pub fn resolve_term(&mut self, term: InferenceInstanceTerm) -> InferenceInstanceTerm {
        match term {
            InferenceInstanceTerm::Inst(r) => InferenceInstanceTerm::Inst(r),
            InferenceInstanceTerm::Var(v) => {
                let root = self.find(v);
                match self.bound.get(&root.0).copied() {
                    Some(r) => InferenceInstanceTerm::Inst(r),
                    None => InferenceInstanceTerm::Var(root),
                }
            }
        }
    }
}

// Root selection shared by both tables: higher rank wins, smaller id
// breaks ties. Returns (root, absorbed child).
fn pick_root(a: u32, b: u32, rank: &[u8]) -> (u32, u32) {
    let (ra, rb) = (rank[a as usize], rank[b as usize]);
    if ra > rb {
        (a, b)
    } else if rb > ra {
        (b, a)
    } else if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
