// weft — Weft compiler core
//
// Library root. Cardinality and instance-identity resolution for
// signal/field block graphs.

pub mod constraints;
pub mod diag;
pub mod dot;
pub mod fingerprint;
pub mod graph;
pub mod solve;
pub mod types;
pub mod unify;
