// diag.rs — Solver diagnostics
//
// The diagnostic surface of the cardinality solver: a closed kind set with
// stable codes, consumed by the editor's diagnostics panel. Every kind is
// fatal for the compile; the solver still collects all of them before
// returning.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::graph::{BlockIndex, PortKey};

// ── Diagnostic kind ──────────────────────────────────────────────────────

/// Kind of a solver finding.
///
/// The variant names double as stable codes via `code()`. Once assigned, a
/// code must never be reassigned to a different semantic meaning — external
/// consumers match on the string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CardDiagKind {
    /// Incompatible cardinality demands met on one equality group.
    CardinalityConflict,
    /// A zip set gathered two different concrete instance identities.
    ZipBroadcastInstanceMismatch,
    /// A port is per-instance, but no concrete identity was ever
    /// determined for it.
    UnresolvedInstanceVar,
    /// No constraint decided whether a port is a signal or a field.
    UnresolvedCardinality,
}

impl CardDiagKind {
    pub fn code(&self) -> &'static str {
        match self {
            CardDiagKind::CardinalityConflict => "CardinalityConflict",
            CardDiagKind::ZipBroadcastInstanceMismatch => "ZipBroadcastInstanceMismatch",
            CardDiagKind::UnresolvedInstanceVar => "UnresolvedInstanceVar",
            CardDiagKind::UnresolvedCardinality => "UnresolvedCardinality",
        }
    }
}

impl fmt::Display for CardDiagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl Serialize for CardDiagKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// One solver finding.
///
/// `anchor` is the lexicographically smallest port key among the affected
/// ports; `involved` lists every affected port so a consumer can highlight
/// all of them, not just one. `block` and `port` repeat the anchor's
/// coordinates for consumers that address the graph by block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardDiagnostic {
    pub kind: CardDiagKind,
    pub anchor: PortKey,
    pub involved: BTreeSet<PortKey>,
    pub block: BlockIndex,
    pub port: String,
    pub message: String,
}

impl CardDiagnostic {
    /// Build a diagnostic anchored at `anchor` over the `involved` set.
    pub fn new(
        kind: CardDiagKind,
        anchor: PortKey,
        involved: BTreeSet<PortKey>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            block: anchor.block,
            port: anchor.port.clone(),
            anchor,
            involved,
            message: message.into(),
        }
    }
}

impl fmt::Display for CardDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error[{}]: {}", self.kind, self.message)?;
        if self.involved.len() > 1 {
            let ports: Vec<String> = self.involved.iter().map(|k| k.to_string()).collect();
            write!(f, "\n  ports: {}", ports.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor() -> PortKey {
        PortKey::input(BlockIndex(1), "values")
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            CardDiagKind::CardinalityConflict.code(),
            "CardinalityConflict"
        );
        assert_eq!(
            CardDiagKind::ZipBroadcastInstanceMismatch.code(),
            "ZipBroadcastInstanceMismatch"
        );
        assert_eq!(
            CardDiagKind::UnresolvedInstanceVar.code(),
            "UnresolvedInstanceVar"
        );
        assert_eq!(
            CardDiagKind::UnresolvedCardinality.code(),
            "UnresolvedCardinality"
        );
    }

    #[test]
    fn display_single_port() {
        let d = CardDiagnostic::new(
            CardDiagKind::UnresolvedCardinality,
            anchor(),
            BTreeSet::from([anchor()]),
            "cannot decide signal vs field",
        );
        assert_eq!(
            format!("{d}"),
            "error[UnresolvedCardinality]: cannot decide signal vs field"
        );
    }

    #[test]
    fn display_lists_involved_ports() {
        let other = PortKey::output(BlockIndex(2), "result");
        let d = CardDiagnostic::new(
            CardDiagKind::CardinalityConflict,
            anchor(),
            BTreeSet::from([anchor(), other]),
            "conflicting demands",
        );
        assert_eq!(
            format!("{d}"),
            "error[CardinalityConflict]: conflicting demands\n  ports: b1.in.values, b2.out.result"
        );
    }

    #[test]
    fn anchor_coordinates_are_duplicated() {
        let d = CardDiagnostic::new(
            CardDiagKind::UnresolvedInstanceVar,
            anchor(),
            BTreeSet::from([anchor()]),
            "m",
        );
        assert_eq!(d.block, BlockIndex(1));
        assert_eq!(d.port, "values");
    }

    #[test]
    fn kind_serializes_as_code_string() {
        let json = serde_json::to_string(&CardDiagKind::UnresolvedInstanceVar)
            .expect("kind serializes");
        assert_eq!(json, "\"UnresolvedInstanceVar\"");
    }
}
