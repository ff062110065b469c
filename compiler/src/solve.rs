// solve.rs — Cardinality and instance-identity resolution
//
// The solver proper. Equal constraints are collapsed into equality groups,
// per-group demands are folded and decided locally, zip sets are iterated
// to a fixpoint, and every port is finalized into a canonical type or a
// fatal diagnostic. One call owns all working state; nothing persists
// across calls, and nothing here performs I/O.
//
// Preconditions: `cg` was produced by `build_constraints`; `existing` pins
//                ports already resolved by earlier passes.
// Postconditions: on a clean run `port_types` covers every port of the
//                 graph; on any finding `port_types` is None and the full
//                 diagnostic list is returned, never just the first.
// Failure modes: CardinalityConflict, ZipBroadcastInstanceMismatch,
//                UnresolvedInstanceVar, UnresolvedCardinality.
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use serde::Serialize;

use crate::constraints::{build_constraints, CardConstraint, CardinalityConstraintGraph, NodeId};
use crate::diag::{CardDiagKind, CardDiagnostic};
use crate::graph::{BlockGraph, GraphError, PortKey};
use crate::types::{
    CanonicalType, CardinalityValue, InferenceCardinality, InferenceInstanceTerm, InstanceRef,
};
use crate::unify::{EqualityGroups, InstanceTable, UnifyOutcome};

// ── Public types ─────────────────────────────────────────────────────────

/// Outcome of one solver run.
#[derive(Debug, Serialize)]
pub struct SolveResult {
    /// Canonical type per port. None when any diagnostic was emitted; a
    /// partial type map is never handed downstream.
    pub port_types: Option<BTreeMap<PortKey, CanonicalType>>,
    pub diagnostics: Vec<CardDiagnostic>,
}

impl SolveResult {
    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    /// Deterministic line-oriented rendering for snapshot tests: resolved
    /// port types in key order, then diagnostics in emission order.
    pub fn snapshot_summary(&self) -> String {
        let mut out = String::new();
        match &self.port_types {
            Some(types) => {
                let _ = writeln!(out, "status: resolved");
                for (key, ty) in types {
                    let _ = writeln!(out, "{key}: {ty}");
                }
            }
            None => {
                let _ = writeln!(out, "status: fatal");
            }
        }
        if !self.diagnostics.is_empty() {
            let _ = writeln!(out, "diagnostics:");
            for d in &self.diagnostics {
                let _ = writeln!(out, "  [{}] {} at {}", d.kind, d.message, d.anchor);
            }
        }
        out
    }
}

// ── Entry points ─────────────────────────────────────────────────────────

/// Build constraints for `graph` and solve them in one step.
pub fn resolve_cardinality(
    graph: &BlockGraph,
    existing: &BTreeMap<PortKey, CanonicalType>,
) -> Result<SolveResult, GraphError> {
    let cg = build_constraints(graph)?;
    Ok(solve(&cg, existing))
}

/// Solve a prebuilt constraint graph against pre-pinned port types.
pub fn solve(
    cg: &CardinalityConstraintGraph,
    existing: &BTreeMap<PortKey, CanonicalType>,
) -> SolveResult {
    let mut ctx = SolveCtx::new(cg, existing);
    ctx.group_nodes();
    ctx.fold_facts();
    ctx.solve_local();
    ctx.run_broadcast();
    ctx.finalize()
}

// ── Group facts ──────────────────────────────────────────────────────────

/// Accumulated demands on one equality group. The forced vectors keep the
/// originating port of each demand so conflict messages can name it.
#[derive(Debug, Default)]
struct GroupFacts {
    forced_one: Vec<PortKey>,
    forced_zero: Vec<PortKey>,
    forced_many: Vec<(InferenceInstanceTerm, PortKey)>,
    final_card: Option<InferenceCardinality>,
    /// Set once a conflict touched this group; later phases and the
    /// finalizer skip tainted groups so one root cause yields one
    /// diagnostic instead of a cascade.
    tainted: bool,
}

// ── Internal context ─────────────────────────────────────────────────────

struct SolveCtx<'a> {
    cg: &'a CardinalityConstraintGraph,
    existing: &'a BTreeMap<PortKey, CanonicalType>,
    groups: EqualityGroups,
    instances: InstanceTable,
    /// Keyed by group representative.
    facts: BTreeMap<NodeId, GroupFacts>,
    /// Port keys of each group, keyed by representative. First element is
    /// the group's diagnostic anchor.
    members: BTreeMap<NodeId, BTreeSet<PortKey>>,
    diagnostics: Vec<CardDiagnostic>,
}

impl<'a> SolveCtx<'a> {
    fn new(cg: &'a CardinalityConstraintGraph, existing: &'a BTreeMap<PortKey, CanonicalType>) -> Self {
        Self {
            cg,
            existing,
            groups: EqualityGroups::new(cg.nodes.len()),
            instances: InstanceTable::new(cg.var_count),
            facts: BTreeMap::new(),
            members: BTreeMap::new(),
            diagnostics: Vec::new(),
        }
    }

    // ── Phase 1: equality grouping ───────────────────────────────────────

    /// Union all Equal constraints, then materialize a facts entry and the
    /// member port set for every group. Every node maps to a group entry
    /// afterward, even an empty one.
    fn group_nodes(&mut self) {
        let cg = self.cg;
        for c in &cg.constraints {
            if let CardConstraint::Equal(a, b) = c {
                self.groups.union(*a, *b);
            }
        }
        for node in &cg.nodes {
            let rep = self.groups.find(node.id);
            self.facts.entry(rep).or_default();
            self.members.entry(rep).or_default().insert(node.key.clone());
        }
    }

    // ── Phase 2: fact folding ────────────────────────────────────────────

    /// Fold ClampOne/ForceMany constraints and pre-pinned types into the
    /// per-group demand vectors.
    fn fold_facts(&mut self) {
        let cg = self.cg;
        for c in &cg.constraints {
            match c {
                CardConstraint::ClampOne(n) => {
                    if let Some(node) = cg.node(*n) {
                        let key = node.key.clone();
                        let rep = self.groups.find(*n);
                        self.fact_mut(rep).forced_one.push(key);
                    }
                }
                CardConstraint::ForceMany(n, term) => {
                    if let Some(node) = cg.node(*n) {
                        let key = node.key.clone();
                        let term = *term;
                        let rep = self.groups.find(*n);
                        self.fact_mut(rep).forced_many.push((term, key));
                    }
                }
                CardConstraint::Equal(..) | CardConstraint::ZipBroadcast(..) => {}
            }
        }
        for (key, ty) in self.existing {
            if let Some(&node) = cg.port_nodes.get(key) {
                let rep = self.groups.find(node);
                match ty.cardinality {
                    CardinalityValue::One => self.fact_mut(rep).forced_one.push(key.clone()),
                    CardinalityValue::Zero => self.fact_mut(rep).forced_zero.push(key.clone()),
                    CardinalityValue::Many(r) => self
                        .fact_mut(rep)
                        .forced_many
                        .push((InferenceInstanceTerm::Inst(r), key.clone())),
                }
            }
        }
    }

    // ── Phase 3: local group decisions ───────────────────────────────────

    /// Decide each group from its own demands, before any broadcast. A
    /// group with no demands stays undecided for the fixpoint to settle.
    fn solve_local(&mut self) {
        let reps: Vec<NodeId> = self.facts.keys().copied().collect();
        for rep in reps {
            let (ones, zeros, manys) = match self.facts.get(&rep) {
                Some(f) => (
                    f.forced_one.clone(),
                    f.forced_zero.clone(),
                    f.forced_many.clone(),
                ),
                None => continue,
            };

            if let Some((_, many_port)) = manys.first() {
                let scalar = ones.first().map(|p| (p, "a single value"));
                let scalar = scalar.or_else(|| zeros.first().map(|p| (p, "no value")));
                if let Some((scalar_port, wording)) = scalar {
                    let message = format!(
                        "conflicting cardinality on connected ports: {scalar_port} requires {wording}, {many_port} requires one value per instance"
                    );
                    self.emit(
                        CardDiagKind::CardinalityConflict,
                        self.group_ports(rep),
                        message,
                    );
                    self.taint(rep);
                    continue;
                }
            }

            if let (Some(one_port), Some(zero_port)) = (ones.first(), zeros.first()) {
                let message = format!(
                    "conflicting cardinality on connected ports: {one_port} requires a single value, {zero_port} carries no value"
                );
                self.emit(
                    CardDiagKind::CardinalityConflict,
                    self.group_ports(rep),
                    message,
                );
                self.taint(rep);
                continue;
            }

            if !ones.is_empty() {
                self.set_final(rep, InferenceCardinality::One);
                continue;
            }
            if !zeros.is_empty() {
                self.set_final(rep, InferenceCardinality::Zero);
                continue;
            }
            if let Some((first_term, first_port)) = manys.first() {
                let mut acc = *first_term;
                let mut conflict = None;
                for (term, port) in &manys[1..] {
                    if let UnifyOutcome::Conflict { left, right } =
                        self.instances.unify_terms(acc, *term)
                    {
                        conflict = Some((left, right, first_port.clone(), port.clone()));
                        break;
                    }
                    acc = self.instances.resolve_term(acc);
                }
                if let Some((left, right, p1, p2)) = conflict {
                    let message = format!(
                        "connected ports are bound to different instance collections: {left} via {p1}, {right} via {p2}"
                    );
                    self.emit(
                        CardDiagKind::CardinalityConflict,
                        self.group_ports(rep),
                        message,
                    );
                    self.taint(rep);
                    continue;
                }
                let resolved = self.instances.resolve_term(acc);
                self.set_final(rep, InferenceCardinality::Many(resolved));
            }
        }
    }

    // ── Phase 4: broadcast fixpoint ──────────────────────────────────────

    /// Evaluate every zip set repeatedly until a full pass reports no
    /// material change. Terminates: each change is a one-way transition
    /// (undecided group to many, free variable to bound, distinct classes
    /// to merged) over finite state.
    fn run_broadcast(&mut self) {
        let cg = self.cg;
        let zips: Vec<&Vec<NodeId>> = cg
            .constraints
            .iter()
            .filter_map(|c| match c {
                CardConstraint::ZipBroadcast(nodes) => Some(nodes),
                _ => None,
            })
            .collect();
        loop {
            let mut changed = false;
            for nodes in &zips {
                changed |= self.apply_zip(nodes);
            }
            if !changed {
                break;
            }
        }
    }

    /// One evaluation of one zip set. Returns whether it caused a material
    /// change.
    fn apply_zip(&mut self, nodes: &[NodeId]) -> bool {
        let mut rep_set = BTreeSet::new();
        for n in nodes {
            rep_set.insert(self.groups.find(*n));
        }
        let reps: Vec<NodeId> = rep_set
            .into_iter()
            .filter(|r| !self.is_tainted(*r))
            .collect();

        let mut many_groups: Vec<(NodeId, InferenceInstanceTerm)> = Vec::new();
        for rep in &reps {
            if let Some(f) = self.facts.get(rep) {
                if let Some(InferenceCardinality::Many(t)) = f.final_card {
                    many_groups.push((*rep, t));
                }
            }
        }
        // Broadcast never invents many-ness from nothing.
        let (first_rep, first_term) = match many_groups.first() {
            Some(&(rep, term)) => (rep, term),
            None => return false,
        };

        let mut changed = false;
        let mut candidate = first_term;
        for (rep, term) in &many_groups[1..] {
            match self.instances.unify_terms(candidate, *term) {
                UnifyOutcome::Conflict { left, right } => {
                    self.zip_mismatch(&reps, left, first_rep, right, *rep);
                    return changed;
                }
                UnifyOutcome::Changed => changed = true,
                UnifyOutcome::Unchanged => {}
            }
            candidate = self.instances.resolve_term(candidate);
        }
        candidate = self.instances.resolve_term(candidate);

        for rep in &reps {
            let current = self.facts.get(rep).and_then(|f| f.final_card);
            match current {
                None => {
                    self.set_final(*rep, InferenceCardinality::Many(candidate));
                    changed = true;
                }
                Some(InferenceCardinality::Many(term)) => {
                    match self.instances.unify_terms(term, candidate) {
                        UnifyOutcome::Conflict { left, right } => {
                            self.zip_mismatch(&reps, left, *rep, right, first_rep);
                            return changed;
                        }
                        UnifyOutcome::Changed => changed = true,
                        UnifyOutcome::Unchanged => {}
                    }
                }
                Some(InferenceCardinality::One) | Some(InferenceCardinality::Zero) => {
                    let anchor = self.group_anchor(*rep);
                    let card = match current {
                        Some(InferenceCardinality::Zero) => "zero",
                        _ => "one",
                    };
                    let message = format!(
                        "cannot zip per-instance values with {anchor}: it already resolved to '{card}'"
                    );
                    let mut involved = self.set_ports(&reps);
                    involved.extend(self.group_ports(*rep));
                    self.emit(CardDiagKind::CardinalityConflict, involved, message);
                    self.taint(*rep);
                }
            }
        }
        changed
    }

    /// Report a concrete instance mismatch inside a zip set and taint the
    /// whole set so the finding cannot re-fire on later passes.
    fn zip_mismatch(
        &mut self,
        reps: &[NodeId],
        left: InstanceRef,
        left_rep: NodeId,
        right: InstanceRef,
        right_rep: NodeId,
    ) {
        let left_port = self.group_anchor(left_rep);
        let right_port = self.group_anchor(right_rep);
        let message = format!(
            "cannot zip fields over different instance collections: {left} via {left_port}, {right} via {right_port}"
        );
        let involved = self.set_ports(reps);
        self.emit(CardDiagKind::ZipBroadcastInstanceMismatch, involved, message);
        for rep in reps {
            self.taint(*rep);
        }
    }

    // ── Phase 5: finalization ────────────────────────────────────────────

    /// Convert every port's group decision into a canonical type or a
    /// fatal diagnostic. Every port goes through its group exactly once;
    /// unresolved groups are reported once with the full member set.
    fn finalize(mut self) -> SolveResult {
        let cg = self.cg;
        let mut port_types = BTreeMap::new();
        let mut reported: BTreeSet<NodeId> = BTreeSet::new();

        for (key, node_id) in &cg.port_nodes {
            // Pre-pinned ports pass through byte-for-byte.
            if let Some(existing_ty) = self.existing.get(key) {
                port_types.insert(key.clone(), *existing_ty);
                continue;
            }

            let rep = self.groups.find(*node_id);
            let (final_card, tainted) = match self.facts.get(&rep) {
                Some(f) => (f.final_card, f.tainted),
                None => (None, false),
            };
            if tainted {
                continue;
            }

            let axes = match cg.node(*node_id) {
                Some(n) => n.axes,
                None => continue,
            };

            match final_card {
                None => {
                    if reported.insert(rep) {
                        let anchor = self.group_anchor(rep);
                        let message = format!(
                            "cannot decide whether {anchor} carries a signal or a field; nothing constrains its cardinality"
                        );
                        self.emit(
                            CardDiagKind::UnresolvedCardinality,
                            self.group_ports(rep),
                            message,
                        );
                    }
                }
                Some(InferenceCardinality::One) => {
                    port_types.insert(key.clone(), CanonicalType::one(axes));
                }
                Some(InferenceCardinality::Zero) => {
                    port_types.insert(key.clone(), CanonicalType::zero(axes));
                }
                Some(InferenceCardinality::Many(term)) => {
                    match self.instances.resolve_term(term) {
                        InferenceInstanceTerm::Inst(r) => {
                            port_types.insert(key.clone(), CanonicalType::many(axes, r));
                        }
                        InferenceInstanceTerm::Var(v) => {
                            if reported.insert(rep) {
                                let anchor = self.group_anchor(rep);
                                let mut message = format!(
                                    "port {anchor} is per-instance but no concrete instance collection was determined"
                                );
                                match cg.var_origins.get(&v) {
                                    Some(origin) if *origin != anchor => {
                                        let _ = write!(
                                            message,
                                            "; the demand originates at {origin}"
                                        );
                                    }
                                    _ => {}
                                }
                                self.emit(
                                    CardDiagKind::UnresolvedInstanceVar,
                                    self.group_ports(rep),
                                    message,
                                );
                            }
                        }
                    }
                }
            }
        }

        let port_types = if self.diagnostics.is_empty() {
            Some(port_types)
        } else {
            None
        };
        SolveResult {
            port_types,
            diagnostics: self.diagnostics,
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn fact_mut(&mut self, rep: NodeId) -> &mut GroupFacts {
        self.facts.entry(rep).or_default()
    }

    fn set_final(&mut self, rep: NodeId, card: InferenceCardinality) {
        if let Some(f) = self.facts.get_mut(&rep) {
            f.final_card = Some(card);
        }
    }

    fn taint(&mut self, rep: NodeId) {
        if let Some(f) = self.facts.get_mut(&rep) {
            f.tainted = true;
        }
    }

    fn is_tainted(&self, rep: NodeId) -> bool {
        self.facts.get(&rep).map(|f| f.tainted).unwrap_or(false)
    }

    /// Port keys of one group.
    fn group_ports(&self, rep: NodeId) -> BTreeSet<PortKey> {
        self.members.get(&rep).cloned().unwrap_or_default()
    }

    /// Smallest port key of one group, the diagnostic anchor.
    fn group_anchor(&self, rep: NodeId) -> PortKey {
        self.members
            .get(&rep)
            .and_then(|m| m.iter().next().cloned())
            .unwrap_or_else(|| PortKey::input(crate::graph::BlockIndex(0), "?"))
    }

    /// Union of port keys across several groups.
    fn set_ports(&self, reps: &[NodeId]) -> BTreeSet<PortKey> {
        let mut ports = BTreeSet::new();
        for rep in reps {
            ports.extend(self.group_ports(*rep));
        }
        ports
    }

    fn emit(&mut self, kind: CardDiagKind, involved: BTreeSet<PortKey>, message: String) {
        if let Some(anchor) = involved.iter().next().cloned() {
            self.diagnostics
                .push(CardDiagnostic::new(kind, anchor, involved, message));
        }
    }
}
