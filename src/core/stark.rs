//! The Stark Curve
//!
//! `y^2 = x^3 + x + beta` over the Starknet prime field, with the standard
//! generator. Commitments and match proofs live in its prime-order group,
//! so an on-chain verifier can recompute them with the chain's native
//! curve operations.

use ark_ec::{
    models::{short_weierstrass::SWCurveConfig, CurveConfig},
    short_weierstrass::{Affine, Projective},
};
use ark_ff::fields::{Fp256, MontBackend, MontConfig};
use ark_ff::{Field, MontFp};

/// Base field modulus `p = 2^251 + 17 * 2^192 + 1`.
#[derive(MontConfig)]
#[modulus = "3618502788666131213697322783095070105623107215331596699973092056135872020481"]
#[generator = "3"]
pub struct FqConfig;
/// Coordinates of curve points (the felt field).
pub type Fq = Fp256<MontBackend<FqConfig, 4>>;

/// Group order `n`.
#[derive(MontConfig)]
#[modulus = "3618502788666131213697322783095070105526743751716087489154079457884512865583"]
#[generator = "3"]
pub struct FrConfig;
/// Scalars of the curve group.
pub type Fr = Fp256<MontBackend<FrConfig, 4>>;

/// Curve parameters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StarkConfig;

/// Affine point.
pub type StarkAffine = Affine<StarkConfig>;
/// Projective point.
pub type StarkProjective = Projective<StarkConfig>;

impl CurveConfig for StarkConfig {
    type BaseField = Fq;
    type ScalarField = Fr;

    /// COFACTOR = 1
    const COFACTOR: &'static [u64] = &[0x1];

    /// COFACTOR_INV = 1
    const COFACTOR_INV: Fr = Fr::ONE;
}

impl SWCurveConfig for StarkConfig {
    /// COEFF_A = 1
    const COEFF_A: Fq = Fq::ONE;

    /// COEFF_B = beta
    const COEFF_B: Fq =
        MontFp!("3141592653589793238462643383279502884197169399375105820974944592307816406665");

    const GENERATOR: StarkAffine = StarkAffine::new_unchecked(GENERATOR_X, GENERATOR_Y);

    #[inline]
    fn is_in_correct_subgroup_assuming_on_curve(_p: &StarkAffine) -> bool {
        true
    }
}

/// GENERATOR_X = 0x1ef15c18599971b7beced415a40f0c7deacfd9b0d1819e03d723d8bc943cfca
pub const GENERATOR_X: Fq =
    MontFp!("874739451078007766457464989774322083649278607533249481151382481072868806602");

/// GENERATOR_Y = 0x5668060aa49730b7be4801df46ec62de53ecd11abe43a32873000c36e8dc1f
pub const GENERATOR_Y: Fq =
    MontFp!("152666792071518830868575557812948353041420400780739481342941381225525861407");

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ec::{CurveGroup, PrimeGroup};
    use ark_ff::{BigInteger, PrimeField};

    #[test]
    fn test_generator_on_curve() {
        let g = StarkAffine::new_unchecked(GENERATOR_X, GENERATOR_Y);
        assert!(g.is_on_curve());
        assert_eq!(
            hex::encode(GENERATOR_X.into_bigint().to_bytes_be()),
            "01ef15c18599971b7beced415a40f0c7deacfd9b0d1819e03d723d8bc943cfca"
        );
    }

    #[test]
    fn test_order_annihilates_generator() {
        let g = StarkProjective::generator();
        // (n - 1) * G = -G
        let minus_one = -Fr::ONE;
        assert_eq!((g * minus_one).into_affine(), (-g).into_affine());
    }
}
