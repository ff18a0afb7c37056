//! Game Logic Module
//!
//! Board state and per-connection reveal rules. Nothing here performs I/O;
//! the network layer drives these types and fans out the results.
//!
//! ## Module Structure
//!
//! - `attribute`: Tile attributes and the collection they are sampled from
//! - `board`: Tile grid, commitments, revealed overlay, join snapshots
//! - `reveal`: Per-connection reveal/hide state machine

pub mod attribute;
pub mod board;
pub mod reveal;

// Re-export key types
pub use attribute::{Attribute, AttributeId, AttributeSource, Collection, CollectionError, Trait};
pub use board::{Board, BoardError, BoardSnapshot, CellView, Overlay, Position, RevealState, Side, Tile};
pub use reveal::{Pending, RevealOutcome, RevealStep, SessionState};
