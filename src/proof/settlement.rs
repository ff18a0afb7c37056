//! Match Settlement Records
//!
//! Every declared match produces a record holding the public values an
//! on-chain verifier needs: the two commitments in challenge order, the
//! public bases, and the proof. Submission itself happens elsewhere.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use serde::Serialize;
use tracing::{error, info};

use crate::game::attribute::AttributeId;
use crate::game::board::{Board, Position};
use crate::proof::commitment::PublicBases;
use crate::proof::match_proof::{
    pair_commitments, prove_match, verify_match, MatchProof, PairCommitments, ProofError,
};

/// Public settlement data for one match.
#[derive(Debug, Clone, Serialize)]
pub struct MatchRecord {
    /// First revealed cell.
    pub first: Position,
    /// Second revealed cell.
    pub second: Position,
    /// Matched attribute.
    pub attribute_id: AttributeId,
    /// Bases the proof is relative to.
    pub bases: PublicBases,
    /// Pair commitments, `side = true` first.
    pub commitments: PairCommitments,
    /// The proof.
    pub proof: MatchProof,
    /// Whether the server's own verifier accepted the proof.
    pub verified: bool,
    /// When the match was declared.
    pub matched_at: DateTime<Utc>,
}

/// Append-only log of settlement records.
#[derive(Debug, Default)]
pub struct SettlementLog {
    records: Mutex<Vec<MatchRecord>>,
}

impl SettlementLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prove the match between `first` and `second` and append the record.
    pub fn settle(&self, board: &Board, first: Position, second: Position) -> Result<MatchRecord, ProofError> {
        let tile = board.tile(first).ok_or(ProofError::OutOfRange(first))?;
        let commitments = pair_commitments(board, first, second)?;
        let proof = prove_match(board, first, second, tile.secret(), &mut OsRng)?;

        let bases = *board.engine().bases();
        let verified = verify_match(&bases, &commitments, &proof);
        if verified {
            info!(
                "Match {} <-> {} (attribute {}) proven: c={} s={}",
                first,
                second,
                tile.attribute.id,
                proof.challenge.to_hex(),
                proof.response.to_hex()
            );
        } else {
            error!("Self-verification failed for match {} <-> {}", first, second);
        }

        let record = MatchRecord {
            first,
            second,
            attribute_id: tile.attribute.id,
            bases,
            commitments,
            proof,
            verified,
            matched_at: Utc::now(),
        };
        self.records.lock().push(record.clone());
        Ok(record)
    }

    /// Copy of all records so far.
    pub fn records(&self) -> Vec<MatchRecord> {
        self.records.lock().clone()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether no match has been settled yet.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::attribute::Attribute;

    fn board() -> Board {
        let attributes = (1..=2).map(|i| Attribute::named(i, format!("Blobert #{i}"))).collect();
        Board::from_attributes(attributes, 2, 2, &mut OsRng).unwrap()
    }

    #[test]
    fn test_settle_records_verified_proof() {
        let board = board();
        let log = SettlementLog::new();
        let pair = board.positions_of(2);

        let record = log.settle(&board, pair[0], pair[1]).unwrap();
        assert!(record.verified);
        assert_eq!(record.attribute_id, 2);
        assert_eq!(log.len(), 1);
        assert_eq!(log.records()[0].proof, record.proof);
    }

    #[test]
    fn test_settle_rejects_non_pair() {
        let board = board();
        let log = SettlementLog::new();
        let a = board.positions_of(1)[0];
        let b = board.positions_of(2)[0];

        assert!(matches!(log.settle(&board, a, b), Err(ProofError::NotAPair(..))));
        assert!(log.is_empty());
    }

    #[test]
    fn test_record_serializes_without_secret() {
        let board = board();
        let log = SettlementLog::new();
        let pair = board.positions_of(1);
        let record = log.settle(&board, pair[0], pair[1]).unwrap();

        let json = serde_json::to_string(&record).unwrap();
        let secret = board.tile(pair[0]).unwrap().secret().to_hex();
        assert!(json.contains(&record.proof.challenge.to_hex()));
        assert!(!json.contains(&secret));
    }
}
