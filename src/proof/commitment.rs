//! Tile Commitment Keys
//!
//! The server holds two trapdoor scalars `priv_g1`, `priv_g2` and publishes
//! the bases `G1 = priv_g1 * G`, `G2 = priv_g2 * G`. A tile's commitment is
//! its pair secret multiplied onto one of the two bases, chosen by side:
//!
//! ```text
//! side = false (original)  -> secret * G2
//! side = true  (duplicate) -> secret * G1
//! ```
//!
//! Both tiles of a pair commit to the same secret over different bases,
//! which is the relation a match proof later demonstrates.

use std::fmt;

use rand::{CryptoRng, Rng};
use serde::Serialize;

use crate::core::curve::{CurvePoint, Scalar, ScalarError};

/// Public bases a verifier needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PublicBases {
    /// `priv_g1 * G`
    pub g1: CurvePoint,
    /// `priv_g2 * G`
    pub g2: CurvePoint,
}

/// Trapdoor scalars and the bases derived from them.
///
/// The private scalars are never serialized or logged.
#[derive(Clone)]
pub struct CommitmentEngine {
    priv_g1: Scalar,
    priv_g2: Scalar,
    bases: PublicBases,
}

impl CommitmentEngine {
    /// Draw two independent trapdoor scalars in `[1, n)`.
    pub fn generate<R: Rng + CryptoRng + ?Sized>(rng: &mut R) -> Self {
        let priv_g1 = Scalar::random_nonzero(rng);
        let priv_g2 = Scalar::random_nonzero(rng);
        Self::with_scalars(priv_g1, priv_g2)
    }

    /// Build from known trapdoor scalars. Both must be non-zero.
    pub fn from_scalars(priv_g1: Scalar, priv_g2: Scalar) -> Result<Self, ScalarError> {
        if priv_g1.is_zero() || priv_g2.is_zero() {
            return Err(ScalarError::Zero);
        }
        Ok(Self::with_scalars(priv_g1, priv_g2))
    }

    fn with_scalars(priv_g1: Scalar, priv_g2: Scalar) -> Self {
        let g = CurvePoint::generator();
        let bases = PublicBases {
            g1: g.mul(&priv_g1),
            g2: g.mul(&priv_g2),
        };
        Self { priv_g1, priv_g2, bases }
    }

    /// Public bases `(G1, G2)`.
    pub fn bases(&self) -> &PublicBases {
        &self.bases
    }

    /// Commitment for a tile holding `secret` on the given side.
    pub fn derive(&self, secret: &Scalar, side: bool) -> CurvePoint {
        derive(secret, side, &self.priv_g1, &self.priv_g2)
    }
}

impl fmt::Debug for CommitmentEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitmentEngine")
            .field("bases", &self.bases)
            .finish_non_exhaustive()
    }
}

/// Stand-alone form of [`CommitmentEngine::derive`] taking the trapdoors directly.
pub fn derive(secret: &Scalar, side: bool, priv_g1: &Scalar, priv_g2: &Scalar) -> CurvePoint {
    let g = CurvePoint::generator();
    let base = if side { g.mul(priv_g1) } else { g.mul(priv_g2) };
    base.mul(secret)
}
