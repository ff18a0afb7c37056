//! Commitment and Match Proof System
//!
//! Lets the server prove to an external verifier that a declared match is
//! genuine without publishing the tile secrets in advance.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PROOF SYSTEM                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  commitment.rs   - Trapdoor keys and tile commitments       │
//! │  match_proof.rs  - Schnorr-style pair proofs + verifier     │
//! │  settlement.rs   - Records handed to the on-chain submitter │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod commitment;
pub mod match_proof;
pub mod settlement;

// Re-export key types
pub use commitment::{CommitmentEngine, PublicBases};
pub use match_proof::{
    pair_commitments, prove_match, verify_match, MatchProof, PairCommitments, ProofError,
};
pub use settlement::{MatchRecord, SettlementLog};
