//! # Memo Game Server
//!
//! Real-time multiplayer memory game over NFT artwork. Every player sees the
//! same board of face-down tiles; flipping two tiles with the same attribute
//! reveals them for good and yields a proof that the pair matches.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       MEMO SERVER                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Cryptographic primitives                  │
//! │  ├── curve.rs    - Scalars and points on the Stark curve     │
//! │  ├── hash.rs     - Poseidon hashing to scalars               │
//! │  └── stark.rs    - Stark curve parameters                    │
//! │                                                              │
//! │  game/           - Game logic (no I/O)                       │
//! │  ├── attribute.rs- Token attributes and collections          │
//! │  ├── board.rs    - Tile grid and revealed overlay            │
//! │  └── reveal.rs   - Per-connection reveal state machine       │
//! │                                                              │
//! │  proof/          - Match proofs                              │
//! │  ├── commitment.rs  - Public bases and tile commitments      │
//! │  ├── match_proof.rs - Schnorr-style pair proof               │
//! │  └── settlement.rs  - Records of proven matches              │
//! │                                                              │
//! │  network/        - Networking                                │
//! │  ├── server.rs   - WebSocket server                          │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── registry.rs - Connection registry and broadcast         │
//! │  └── session.rs  - Shared game and per-connection actors     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Secrets
//!
//! The server seed, the two trapdoor scalars and every per-attribute secret
//! stay in process memory. Only commitments, public bases and proofs are
//! ever logged or sent.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

use std::time::Duration;

pub mod core;
pub mod game;
pub mod network;
pub mod proof;

// Re-export commonly used types
pub use crate::core::curve::{CurvePoint, FieldElement, Scalar, ScalarError};
pub use crate::game::attribute::{Attribute, AttributeSource, Collection};
pub use crate::game::board::{Board, Position};
pub use crate::network::server::{GameServer, ServerConfig};
pub use crate::network::session::{GameConfig, GameSession};
pub use crate::proof::match_proof::MatchProof;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Board rows
pub const ROWS: usize = 6;

/// Board columns
pub const COLS: usize = 10;

/// Distinct attributes on a full board
pub const PAIR_COUNT: usize = ROWS * COLS / 2;

/// How long an unpaired reveal stays face up
pub const REVEAL_TIMEOUT: Duration = Duration::from_secs(2);
