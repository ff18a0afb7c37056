//! Scalar and Curve Point Types
//!
//! Thin wrappers over the Stark curve group used for tile commitments and
//! match proofs. All arithmetic is modular; there is no floating point.
//!
//! Scalars are validated when they are constructed from external bytes,
//! so code further down (board construction, proof generation) can assume
//! every [`Scalar`] is a canonical member of the scalar field.
//!
//! Encodings are big-endian, matching how felts are written on Starknet.

use std::fmt;

use ark_ec::{CurveGroup, PrimeGroup};
use ark_ff::{BigInteger, PrimeField, UniformRand, Zero};
use ark_serialize::CanonicalDeserialize;
use rand::{CryptoRng, Rng};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use starknet_types_core::felt::Felt;

use super::stark::{Fq, Fr, StarkProjective};

/// Encoded scalar size (big-endian canonical form).
pub const SCALAR_BYTES: usize = 32;

/// Encoded point size (affine `x || y`, big-endian coordinates).
pub const POINT_BYTES: usize = 64;

/// Errors raised when building scalars from untrusted input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScalarError {
    /// Wrong encoded length.
    #[error("Scalar encoding must be {SCALAR_BYTES} bytes, got {0}")]
    InvalidLength(usize),

    /// Value is at or above the group order.
    #[error("Value is not a canonical member of the scalar field")]
    NonCanonical,

    /// Zero where a non-zero scalar is required.
    #[error("Scalar must be non-zero")]
    Zero,

    /// Input is not valid hex.
    #[error("Invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Element of the curve's scalar field, `[0, n)`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Scalar(Fr);

/// Field elements that are not used as multipliers (the server seed)
/// share the scalar representation; they enter hashes as felts via
/// [`Scalar::to_felt`].
pub type FieldElement = Scalar;

impl Scalar {
    /// Zero scalar.
    pub fn zero() -> Self {
        Self(Fr::zero())
    }

    /// Uniform scalar in `[0, n)`.
    pub fn random<R: Rng + CryptoRng + ?Sized>(rng: &mut R) -> Self {
        Self(Fr::rand(rng))
    }

    /// Uniform scalar in `[1, n)`.
    pub fn random_nonzero<R: Rng + CryptoRng + ?Sized>(rng: &mut R) -> Self {
        loop {
            let value = Fr::rand(rng);
            if !value.is_zero() {
                return Self(value);
            }
        }
    }

    /// Small integer as a scalar.
    pub fn from_u64(value: u64) -> Self {
        Self(Fr::from(value))
    }

    /// Reduce a felt (a value below the field prime) modulo the group order.
    pub fn from_felt(value: &Felt) -> Self {
        Self(Fr::from_be_bytes_mod_order(&value.to_bytes_be()))
    }

    /// The scalar as a felt. Exact, since `n < p`.
    pub fn to_felt(&self) -> Felt {
        Felt::from_bytes_be(&self.to_bytes())
    }

    /// Decode a canonical big-endian encoding.
    ///
    /// Rejects encodings of values `>= n` instead of reducing them.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ScalarError> {
        if bytes.len() != SCALAR_BYTES {
            return Err(ScalarError::InvalidLength(bytes.len()));
        }
        let mut le = [0u8; SCALAR_BYTES];
        le.copy_from_slice(bytes);
        le.reverse();
        Fr::deserialize_compressed(&le[..])
            .map(Self)
            .map_err(|_| ScalarError::NonCanonical)
    }

    /// Decode a hex string of the canonical encoding.
    pub fn from_hex(s: &str) -> Result<Self, ScalarError> {
        let bytes = hex::decode(s.trim_start_matches("0x"))?;
        Self::from_bytes(&bytes)
    }

    /// Like [`Scalar::from_bytes`], additionally rejecting zero.
    pub fn nonzero_from_bytes(bytes: &[u8]) -> Result<Self, ScalarError> {
        let value = Self::from_bytes(bytes)?;
        if value.is_zero() {
            return Err(ScalarError::Zero);
        }
        Ok(value)
    }

    /// Canonical big-endian encoding.
    pub fn to_bytes(&self) -> [u8; SCALAR_BYTES] {
        let mut out = [0u8; SCALAR_BYTES];
        out.copy_from_slice(&self.0.into_bigint().to_bytes_be());
        out
    }

    /// Hex of the canonical encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Whether this is the zero scalar.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub(crate) fn from_fr(value: Fr) -> Self {
        Self(value)
    }

    pub(crate) fn fr(&self) -> Fr {
        self.0
    }
}

impl fmt::Debug for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scalar({})", self.to_hex())
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Point on the Stark curve.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CurvePoint(StarkProjective);

impl CurvePoint {
    /// The fixed public generator `G`.
    pub fn generator() -> Self {
        Self(StarkProjective::generator())
    }

    /// Identity element.
    pub fn identity() -> Self {
        Self(StarkProjective::zero())
    }

    /// `scalar * self`.
    pub fn mul(&self, scalar: &Scalar) -> Self {
        Self(self.0 * scalar.fr())
    }

    /// `self + other`.
    pub fn add(&self, other: &CurvePoint) -> Self {
        Self(self.0 + other.0)
    }

    /// `self - other`.
    pub fn sub(&self, other: &CurvePoint) -> Self {
        Self(self.0 - other.0)
    }

    /// Whether this is the identity.
    pub fn is_identity(&self) -> bool {
        self.0.is_zero()
    }

    /// Affine coordinates as felts. The identity is `(0, 0)`, which is
    /// not on the curve.
    pub fn to_felts(&self) -> [Felt; 2] {
        let affine = self.0.into_affine();
        if affine.infinity {
            return [Felt::ZERO, Felt::ZERO];
        }
        [coordinate_felt(affine.x), coordinate_felt(affine.y)]
    }

    /// Affine `x || y` with big-endian coordinates. The identity encodes
    /// as all zeros.
    pub fn to_bytes(&self) -> [u8; POINT_BYTES] {
        let [x, y] = self.to_felts();
        let mut out = [0u8; POINT_BYTES];
        out[..32].copy_from_slice(&x.to_bytes_be());
        out[32..].copy_from_slice(&y.to_bytes_be());
        out
    }

    /// Hex of [`CurvePoint::to_bytes`].
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

fn coordinate_felt(value: Fq) -> Felt {
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&value.into_bigint().to_bytes_be());
    Felt::from_bytes_be(&bytes)
}

impl fmt::Debug for CurvePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CurvePoint({})", self.to_hex())
    }
}

impl Serialize for CurvePoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}
