//! Match Proofs
//!
//! Schnorr-style proof that two tile commitments hide the same secret
//! over the two trapdoor bases:
//!
//! ```text
//! k          <- [1, n)
//! A, B       =  k * G1, k * G2
//! c          =  Hash(G1, G2, pub_true, pub_false, A, B)
//! response   =  k + c * secret
//! ```
//!
//! `pub_true` is the commitment of the `side = true` tile and always fills
//! the first slot. A verifier recomputes
//! `A' = response * G1 - c * pub_true`, `B' = response * G2 - c * pub_false`
//! and accepts iff the challenge over `(A', B')` equals `c`.

use rand::{CryptoRng, Rng};
use serde::{Deserialize, Serialize};

use crate::core::curve::{CurvePoint, Scalar};
use crate::core::hash::PoseidonHasher;
use crate::game::board::{Board, Position, Side};
use crate::proof::commitment::PublicBases;

/// Proof for one declared match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchProof {
    /// Fiat-Shamir challenge `c`.
    pub challenge: Scalar,
    /// `k + c * secret`.
    pub response: Scalar,
}

/// Commitments of a pair, in challenge order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PairCommitments {
    /// Commitment of the `side = true` tile (over `G1`).
    pub side_true: CurvePoint,
    /// Commitment of the `side = false` tile (over `G2`).
    pub side_false: CurvePoint,
}

/// Reasons a proof cannot be built for two positions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProofError {
    /// A position is outside the grid.
    #[error("Position {0} is outside the board")]
    OutOfRange(Position),

    /// The two tiles are not the two members of one pair.
    #[error("Tiles at {0} and {1} are not a pair")]
    NotAPair(Position, Position),
}

/// Order the commitments of `i` and `j` with the `side = true` tile first.
pub fn pair_commitments(board: &Board, i: Position, j: Position) -> Result<PairCommitments, ProofError> {
    let ti = board.tile(i).ok_or(ProofError::OutOfRange(i))?;
    let tj = board.tile(j).ok_or(ProofError::OutOfRange(j))?;

    if i == j || ti.attribute.id != tj.attribute.id {
        return Err(ProofError::NotAPair(i, j));
    }

    match (ti.side, tj.side) {
        (Side::Duplicate, Side::Original) => Ok(PairCommitments {
            side_true: ti.commitment,
            side_false: tj.commitment,
        }),
        (Side::Original, Side::Duplicate) => Ok(PairCommitments {
            side_true: tj.commitment,
            side_false: ti.commitment,
        }),
        _ => Err(ProofError::NotAPair(i, j)),
    }
}

/// Prove that the tiles at `i` and `j` commit to `secret`.
pub fn prove_match<R: Rng + CryptoRng + ?Sized>(
    board: &Board,
    i: Position,
    j: Position,
    secret: &Scalar,
    rng: &mut R,
) -> Result<MatchProof, ProofError> {
    let commitments = pair_commitments(board, i, j)?;
    let nonce = Scalar::random_nonzero(rng);
    Ok(prove_with_nonce(board.engine().bases(), &commitments, secret, &nonce))
}

/// Proof construction with an explicit nonce.
pub fn prove_with_nonce(
    bases: &PublicBases,
    commitments: &PairCommitments,
    secret: &Scalar,
    nonce: &Scalar,
) -> MatchProof {
    let a = bases.g1.mul(nonce);
    let b = bases.g2.mul(nonce);
    let challenge = match_challenge(bases, commitments, &a, &b);
    let response = Scalar::from_fr(nonce.fr() + challenge.fr() * secret.fr());
    MatchProof { challenge, response }
}

/// `Hash(G1, G2, pub_true, pub_false, A, B)`.
pub fn match_challenge(
    bases: &PublicBases,
    commitments: &PairCommitments,
    a: &CurvePoint,
    b: &CurvePoint,
) -> Scalar {
    let mut hasher = PoseidonHasher::new();
    hasher.update_point(&bases.g1);
    hasher.update_point(&bases.g2);
    hasher.update_point(&commitments.side_true);
    hasher.update_point(&commitments.side_false);
    hasher.update_point(a);
    hasher.update_point(b);
    hasher.finalize_scalar()
}

/// The verifier's check, as an external settlement contract performs it.
pub fn verify_match(bases: &PublicBases, commitments: &PairCommitments, proof: &MatchProof) -> bool {
    let a = bases.g1.mul(&proof.response).sub(&commitments.side_true.mul(&proof.challenge));
    let b = bases.g2.mul(&proof.response).sub(&commitments.side_false.mul(&proof.challenge));
    match_challenge(bases, commitments, &a, &b) == proof.challenge
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::attribute::Attribute;
    use crate::proof::commitment::CommitmentEngine;
    use proptest::prelude::*;
    use rand::rngs::OsRng;

    fn board() -> Board {
        let attributes = (1..=6).map(|i| Attribute::named(i, format!("Blobert #{i}"))).collect();
        Board::from_attributes(attributes, 3, 4, &mut OsRng).unwrap()
    }

    fn pair(board: &Board, id: u64) -> (Position, Position) {
        let p = board.positions_of(id);
        (p[0], p[1])
    }

    #[test]
    fn test_prove_and_verify_pair() {
        let board = board();
        for id in 1..=6 {
            let (i, j) = pair(&board, id);
            let secret = *board.tile(i).unwrap().secret();
            let proof = prove_match(&board, i, j, &secret, &mut OsRng).unwrap();
            let commitments = pair_commitments(&board, i, j).unwrap();
            assert!(verify_match(board.engine().bases(), &commitments, &proof));
        }
    }

    #[test]
    fn test_argument_order_does_not_matter() {
        let board = board();
        let (i, j) = pair(&board, 2);
        assert_eq!(pair_commitments(&board, i, j), pair_commitments(&board, j, i));

        let secret = *board.tile(i).unwrap().secret();
        let proof = prove_match(&board, j, i, &secret, &mut OsRng).unwrap();
        let commitments = pair_commitments(&board, i, j).unwrap();
        assert!(verify_match(board.engine().bases(), &commitments, &proof));
    }

    #[test]
    fn test_swapped_slots_fail_verification() {
        let board = board();
        let (i, j) = pair(&board, 4);
        let secret = *board.tile(i).unwrap().secret();
        let proof = prove_match(&board, i, j, &secret, &mut OsRng).unwrap();

        let c = pair_commitments(&board, i, j).unwrap();
        let swapped = PairCommitments { side_true: c.side_false, side_false: c.side_true };
        assert!(!verify_match(board.engine().bases(), &swapped, &proof));
    }

    #[test]
    fn test_wrong_secret_fails_verification() {
        let board = board();
        let (i, j) = pair(&board, 1);
        let proof = prove_match(&board, i, j, &Scalar::from_u64(42), &mut OsRng).unwrap();
        let commitments = pair_commitments(&board, i, j).unwrap();
        assert!(!verify_match(board.engine().bases(), &commitments, &proof));
    }

    #[test]
    fn test_non_pair_rejected() {
        let board = board();
        let (i, _) = pair(&board, 1);
        let (k, _) = pair(&board, 2);
        let secret = *board.tile(i).unwrap().secret();

        assert_eq!(prove_match(&board, i, k, &secret, &mut OsRng), Err(ProofError::NotAPair(i, k)));
        assert_eq!(prove_match(&board, i, i, &secret, &mut OsRng), Err(ProofError::NotAPair(i, i)));

        let outside = Position::new(3, 0);
        assert_eq!(
            prove_match(&board, i, outside, &secret, &mut OsRng),
            Err(ProofError::OutOfRange(outside))
        );
    }

    #[test]
    fn test_tampered_proof_rejected() {
        let board = board();
        let (i, j) = pair(&board, 5);
        let secret = *board.tile(i).unwrap().secret();
        let mut proof = prove_match(&board, i, j, &secret, &mut OsRng).unwrap();
        proof.response = Scalar::from_fr(proof.response.fr() + Scalar::from_u64(1).fr());

        let commitments = pair_commitments(&board, i, j).unwrap();
        assert!(!verify_match(board.engine().bases(), &commitments, &proof));
    }

    #[test]
    fn test_challenge_is_poseidon_over_coordinates() {
        use starknet_crypto::poseidon_hash_many;

        let engine = CommitmentEngine::from_scalars(Scalar::from_u64(3), Scalar::from_u64(5)).unwrap();
        let secret = Scalar::from_u64(11);
        let commitments = PairCommitments {
            side_true: engine.derive(&secret, true),
            side_false: engine.derive(&secret, false),
        };
        let nonce = Scalar::from_u64(7);
        let a = engine.bases().g1.mul(&nonce);
        let b = engine.bases().g2.mul(&nonce);

        let transcript: Vec<_> = [
            engine.bases().g1,
            engine.bases().g2,
            commitments.side_true,
            commitments.side_false,
            a,
            b,
        ]
        .iter()
        .flat_map(CurvePoint::to_felts)
        .collect();
        assert_eq!(transcript.len(), 12);
        assert_eq!(
            match_challenge(engine.bases(), &commitments, &a, &b),
            Scalar::from_felt(&poseidon_hash_many(&transcript))
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_proof_identity_holds(
            secret in any::<u64>(),
            p1 in 1u64..,
            p2 in 1u64..,
            nonce in 1u64..,
        ) {
            let engine = CommitmentEngine::from_scalars(Scalar::from_u64(p1), Scalar::from_u64(p2)).unwrap();
            let secret = Scalar::from_u64(secret);
            let commitments = PairCommitments {
                side_true: engine.derive(&secret, true),
                side_false: engine.derive(&secret, false),
            };
            let nonce = Scalar::from_u64(nonce);
            let proof = prove_with_nonce(engine.bases(), &commitments, &secret, &nonce);

            prop_assert!(verify_match(engine.bases(), &commitments, &proof));

            // response = k + c * secret, computed independently
            let expected = nonce.fr() + proof.challenge.fr() * secret.fr();
            prop_assert_eq!(proof.response, Scalar::from_fr(expected));
        }
    }
}
