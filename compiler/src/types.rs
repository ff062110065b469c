// types.rs — Value types for cardinality resolution
//
// Canonical types are what the solver hands downstream: a bundle of opaque
// signal axes plus a concrete CardinalityValue per port. The Inference*
// forms exist only while solving: they add existential instance variables,
// and finalization must eliminate every one of them before a canonical type
// is emitted.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use serde::Serialize;

// ── Stable identifiers ───────────────────────────────────────────────────

/// Identifies a domain type: the kind of collection instances belong to
/// (particles, strokes, grid cells, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DomainTypeId(pub u32);

/// Identifies one concrete instantiation of a domain within a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InstanceId(pub u32);

/// Solver-internal existential instance variable. Allocated during
/// constraint building, resolved (or reported fatal) before finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceVarId(pub u32);

impl fmt::Display for DomainTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

impl fmt::Display for InstanceVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?v{}", self.0)
    }
}

// ── Instance references ──────────────────────────────────────────────────

/// A concrete, compile-time-stable identity naming which collection of
/// instances a `many` port ranges over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InstanceRef {
    pub domain: DomainTypeId,
    pub instance: InstanceId,
}

impl InstanceRef {
    pub fn new(domain: u32, instance: u32) -> Self {
        Self {
            domain: DomainTypeId(domain),
            instance: InstanceId(instance),
        }
    }
}

impl fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.domain, self.instance.0)
    }
}

// ── Opaque signal axes ───────────────────────────────────────────────────
//
// The remaining type axes are resolved by earlier passes and flow through
// the solver untouched. They are carried so a CanonicalType is complete,
// never inspected.

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    #[default]
    Scalar,
    Vec2,
    Vec3,
    Color,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Temporality {
    #[default]
    Continuous,
    Sampled,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Binding {
    #[default]
    Unbound,
    Spatial,
    Temporal,
}

/// The pass-through axes of a port type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize,
)]
pub struct SignalAxes {
    pub payload: PayloadKind,
    pub temporality: Temporality,
    pub binding: Binding,
}

impl SignalAxes {
    pub fn new(payload: PayloadKind, temporality: Temporality, binding: Binding) -> Self {
        Self {
            payload,
            temporality,
            binding,
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PayloadKind::Scalar => "scalar",
            PayloadKind::Vec2 => "vec2",
            PayloadKind::Vec3 => "vec3",
            PayloadKind::Color => "color",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for Temporality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Temporality::Continuous => "continuous",
            Temporality::Sampled => "sampled",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Binding::Unbound => "unbound",
            Binding::Spatial => "spatial",
            Binding::Temporal => "temporal",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for SignalAxes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.payload, self.temporality, self.binding)
    }
}

// ── Canonical cardinality ────────────────────────────────────────────────

/// Canonical cardinality of a port. Output-only: there is no variable slot,
/// so an unresolved instance identity cannot leak past finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CardinalityValue {
    Zero,
    One,
    Many(InstanceRef),
}

impl fmt::Display for CardinalityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardinalityValue::Zero => write!(f, "zero"),
            CardinalityValue::One => write!(f, "one"),
            CardinalityValue::Many(r) => write!(f, "many({r})"),
        }
    }
}

// ── Inference forms ──────────────────────────────────────────────────────

/// An instance term during solving: either a known collection identity or
/// an existential variable. A variable asserts "exactly one identity exists
/// here, to be determined by unification" — it is not a wildcard, and one
/// that survives to finalization is a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InferenceInstanceTerm {
    Inst(InstanceRef),
    Var(InstanceVarId),
}

impl fmt::Display for InferenceInstanceTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceInstanceTerm::Inst(r) => write!(f, "{r}"),
            InferenceInstanceTerm::Var(v) => write!(f, "{v}"),
        }
    }
}

/// Cardinality of an equality group while solving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceCardinality {
    Zero,
    One,
    Many(InferenceInstanceTerm),
}

impl fmt::Display for InferenceCardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceCardinality::Zero => write!(f, "zero"),
            InferenceCardinality::One => write!(f, "one"),
            InferenceCardinality::Many(t) => write!(f, "many({t})"),
        }
    }
}

// ── Canonical port type ──────────────────────────────────────────────────

/// Fully resolved type of one port: pass-through axes plus a concrete
/// cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CanonicalType {
    pub axes: SignalAxes,
    pub cardinality: CardinalityValue,
}

impl CanonicalType {
    pub fn one(axes: SignalAxes) -> Self {
        Self {
            axes,
            cardinality: CardinalityValue::One,
        }
    }

    pub fn many(axes: SignalAxes, instance: InstanceRef) -> Self {
        Self {
            axes,
            cardinality: CardinalityValue::Many(instance),
        }
    }

    pub fn zero(axes: SignalAxes) -> Self {
        Self {
            axes,
            cardinality: CardinalityValue::Zero,
        }
    }
}

impl fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.cardinality, self.axes)
    }
}
