//! Core cryptographic primitives.
//!
//! Scalar/point wrappers over the Stark curve and the Poseidon hashing
//! that board construction and match proofs are built on.

pub mod curve;
pub mod hash;
pub mod stark;

// Re-export core types
pub use curve::{CurvePoint, FieldElement, Scalar, ScalarError};
pub use hash::{tile_secret, PoseidonHasher};
