//! Poseidon Hashing
//!
//! Poseidon over felts, reduced into the scalar field. Used for:
//! - Per-attribute tile secrets (`Hash(server_seed, attribute_id)`)
//! - Match proof challenges (Fiat-Shamir)
//!
//! Both are the plain `poseidon_hash_many` of the absorbed felts, so a
//! Cairo contract recomputes them with the chain's builtin.

use starknet_crypto::poseidon_hash_many;
use starknet_types_core::felt::Felt;

use super::curve::{CurvePoint, Scalar};

/// Hasher that absorbs scalars and points in a fixed order.
///
/// Order of updates is part of the protocol: a verifier must absorb the
/// same values in the same order to recompute a challenge.
#[derive(Debug, Default, Clone)]
pub struct PoseidonHasher {
    inputs: Vec<Felt>,
}

impl PoseidonHasher {
    /// Empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb a u64 value.
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.inputs.push(Felt::from(value));
    }

    /// Absorb a scalar.
    #[inline]
    pub fn update_scalar(&mut self, value: &Scalar) {
        self.inputs.push(value.to_felt());
    }

    /// Absorb a point as its affine `x`, then `y`.
    #[inline]
    pub fn update_point(&mut self, value: &CurvePoint) {
        self.inputs.extend(value.to_felts());
    }

    /// Hash the transcript.
    pub fn finalize(self) -> Felt {
        poseidon_hash_many(&self.inputs)
    }

    /// Hash the transcript and reduce it into a scalar.
    pub fn finalize_scalar(self) -> Scalar {
        Scalar::from_felt(&self.finalize())
    }
}

/// `Hash(server_seed, attribute_id)`: the secret shared by both tiles of a pair.
pub fn tile_secret(server_seed: &Scalar, attribute_id: u64) -> Scalar {
    let mut hasher = PoseidonHasher::new();
    hasher.update_scalar(server_seed);
    hasher.update_u64(attribute_id);
    hasher.finalize_scalar()
}
