// fingerprint.rs — Stable hash of a solver result
//
// Hashes the canonical JSON form of a SolveResult with SHA-256 so two runs
// can be compared without diffing the full type map. The reproducibility
// tests lean on this: identical graphs must hash identically across runs
// and across edge orderings.

use sha2::{Digest, Sha256};

use crate::solve::SolveResult;

/// SHA-256 over the canonical JSON rendering of `result`, as a
/// 64-character lowercase hex string.
pub fn result_fingerprint(result: &SolveResult) -> String {
    let canonical = canonical_json(result);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&digest);
    bytes_to_hex(&hash)
}

/// Compact JSON, no whitespace, port keys in sorted order. Serializing a
/// SolveResult cannot fail: every map key renders as a string and every
/// value is a plain tree.
pub fn canonical_json(result: &SolveResult) -> String {
    serde_json::to_string(result).unwrap_or_default()
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}
