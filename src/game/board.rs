//! Game Board
//!
//! The grid of tiles is fixed at construction. Each tile carries its
//! attribute, the per-pair secret and a public commitment to that secret.
//! The only mutable part is the revealed overlay, guarded by a short-lived
//! lock that the reveal state machine holds while it checks or writes cells.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use rand::seq::SliceRandom;
use rand::{CryptoRng, Rng};
use serde::{Deserialize, Serialize};

use crate::core::curve::{CurvePoint, FieldElement, Scalar};
use crate::core::hash::tile_secret;
use crate::game::attribute::{Attribute, AttributeId, AttributeSource, CollectionError};
use crate::proof::commitment::CommitmentEngine;

/// Grid coordinate. Always validated against the board before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Row index.
    pub row: usize,
    /// Column index.
    pub col: usize,
}

impl Position {
    /// Create a position (unchecked).
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Which member of a pair a tile is.
///
/// Selects the trapdoor base its commitment is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// First copy (`side = false`), committed over `G2`.
    Original,
    /// Second copy (`side = true`), committed over `G1`.
    Duplicate,
}

impl Side {
    /// Boolean form used by the commitment scheme.
    pub fn as_bool(self) -> bool {
        matches!(self, Side::Duplicate)
    }
}

/// A placed tile.
#[derive(Clone)]
pub struct Tile {
    /// Attribute shown when revealed.
    pub attribute: Arc<Attribute>,
    /// Pair secret, `Hash(server_seed, attribute.id)`.
    secret: Scalar,
    /// Pair member.
    pub side: Side,
    /// Public commitment to `secret`.
    pub commitment: CurvePoint,
}

impl Tile {
    /// The pair secret. Never leaves the server except through a proof.
    pub fn secret(&self) -> &Scalar {
        &self.secret
    }
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tile")
            .field("attribute", &self.attribute.id)
            .field("side", &self.side)
            .field("commitment", &self.commitment)
            .finish_non_exhaustive()
    }
}

/// Per-cell reveal flag. `revealed = true` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealState {
    /// Permanently revealed (matched).
    pub revealed: bool,
    /// The cell this one was matched with.
    pub matched_with: Option<Position>,
}

/// Mutable revealed layer over the grid.
#[derive(Debug, Clone)]
pub struct Overlay {
    cols: usize,
    cells: Vec<RevealState>,
    matched_pairs: usize,
}

impl Overlay {
    fn new(rows: usize, cols: usize) -> Self {
        Self {
            cols,
            cells: vec![RevealState::default(); rows * cols],
            matched_pairs: 0,
        }
    }

    /// Cell state, `None` if out of range.
    pub fn get(&self, pos: Position) -> Option<&RevealState> {
        if pos.col >= self.cols {
            return None;
        }
        self.cells.get(pos.row * self.cols + pos.col)
    }

    /// Whether a cell is permanently revealed. Out-of-range cells are not.
    pub fn is_revealed(&self, pos: Position) -> bool {
        self.get(pos).map(|c| c.revealed).unwrap_or(false)
    }

    /// Permanently reveal a matched pair.
    ///
    /// Returns false (and changes nothing) if either cell is out of range,
    /// already revealed, or both positions are the same cell.
    pub fn mark_matched(&mut self, a: Position, b: Position) -> bool {
        if a == b || self.get(a).is_none() || self.get(b).is_none() {
            return false;
        }
        if self.is_revealed(a) || self.is_revealed(b) {
            return false;
        }
        let cols = self.cols;
        self.cells[a.row * cols + a.col] = RevealState { revealed: true, matched_with: Some(b) };
        self.cells[b.row * cols + b.col] = RevealState { revealed: true, matched_with: Some(a) };
        self.matched_pairs += 1;
        true
    }

    /// Number of pairs matched so far.
    pub fn matched_pairs(&self) -> usize {
        self.matched_pairs
    }

    /// Whether every cell is revealed.
    pub fn is_complete(&self) -> bool {
        self.cells.iter().all(|c| c.revealed)
    }
}

/// Board construction errors. All are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    /// Not enough distinct attributes for the grid.
    #[error("Board needs {needed} distinct attributes, got {available}")]
    InsufficientAttributes {
        /// Distinct attributes required.
        needed: usize,
        /// Distinct attributes supplied.
        available: usize,
    },

    /// Grid cannot be tiled with pairs.
    #[error("A {rows}x{cols} grid has an odd or zero cell count")]
    InvalidDimensions {
        /// Rows.
        rows: usize,
        /// Columns.
        cols: usize,
    },

    /// Attribute source failure.
    #[error("Attribute source error: {0}")]
    Source(#[from] CollectionError),
}

/// The shared game board.
pub struct Board {
    rows: usize,
    cols: usize,
    tiles: Vec<Tile>,
    server_seed: FieldElement,
    engine: CommitmentEngine,
    overlay: Mutex<Overlay>,
}

impl Board {
    /// Build a board by sampling `rows * cols / 2` attributes from `source`.
    pub fn generate<R: Rng + CryptoRng>(
        source: &dyn AttributeSource,
        rows: usize,
        cols: usize,
        rng: &mut R,
    ) -> Result<Self, BoardError> {
        let pairs = pair_count(rows, cols)?;
        let attributes = source.pick_random_pairs(pairs).map_err(|e| match e {
            CollectionError::Insufficient { needed, available } => {
                BoardError::InsufficientAttributes { needed, available }
            }
            other => BoardError::Source(other),
        })?;
        Self::from_attributes(attributes, rows, cols, rng)
    }

    /// Build a board from exactly `rows * cols / 2` distinct attributes.
    pub fn from_attributes<R: Rng + CryptoRng>(
        attributes: Vec<Attribute>,
        rows: usize,
        cols: usize,
        rng: &mut R,
    ) -> Result<Self, BoardError> {
        let pairs = pair_count(rows, cols)?;

        let mut distinct: Vec<Attribute> = Vec::with_capacity(pairs);
        for attribute in attributes {
            if !distinct.iter().any(|a| a.id == attribute.id) {
                distinct.push(attribute);
            }
        }
        if distinct.len() < pairs {
            return Err(BoardError::InsufficientAttributes {
                needed: pairs,
                available: distinct.len(),
            });
        }
        distinct.truncate(pairs);

        let server_seed = Scalar::random(rng);
        let engine = CommitmentEngine::generate(rng);

        let mut entries: Vec<(Arc<Attribute>, Side)> = Vec::with_capacity(pairs * 2);
        for attribute in distinct {
            let attribute = Arc::new(attribute);
            entries.push((attribute.clone(), Side::Original));
            entries.push((attribute, Side::Duplicate));
        }
        entries.shuffle(rng);

        let tiles = entries
            .into_iter()
            .map(|(attribute, side)| {
                let secret = tile_secret(&server_seed, attribute.id);
                let commitment = engine.derive(&secret, side.as_bool());
                Tile { attribute, secret, side, commitment }
            })
            .collect();

        Ok(Self {
            rows,
            cols,
            tiles,
            server_seed,
            engine,
            overlay: Mutex::new(Overlay::new(rows, cols)),
        })
    }

    /// Row count.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Column count.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Validated position.
    pub fn position(&self, row: usize, col: usize) -> Option<Position> {
        (row < self.rows && col < self.cols).then_some(Position::new(row, col))
    }

    /// Tile at a position.
    pub fn tile(&self, pos: Position) -> Option<&Tile> {
        if pos.row >= self.rows || pos.col >= self.cols {
            return None;
        }
        self.tiles.get(pos.row * self.cols + pos.col)
    }

    /// Attribute at a position.
    pub fn attribute(&self, pos: Position) -> Option<&Attribute> {
        self.tile(pos).map(|t| t.attribute.as_ref())
    }

    /// Whether two distinct cells hold the same attribute.
    pub fn same_attribute(&self, a: Position, b: Position) -> bool {
        if a == b {
            return false;
        }
        match (self.tile(a), self.tile(b)) {
            (Some(ta), Some(tb)) => ta.attribute.id == tb.attribute.id,
            _ => false,
        }
    }

    /// Every position holding the given attribute.
    pub fn positions_of(&self, id: AttributeId) -> Vec<Position> {
        self.positions()
            .filter(|p| self.attribute(*p).map(|a| a.id) == Some(id))
            .collect()
    }

    /// All positions, row-major.
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        (0..self.rows).flat_map(move |row| (0..self.cols).map(move |col| Position::new(row, col)))
    }

    /// Total pair count.
    pub fn pair_count(&self) -> usize {
        self.tiles.len() / 2
    }

    /// Commitment keys.
    pub fn engine(&self) -> &CommitmentEngine {
        &self.engine
    }

    /// The server seed tile secrets are derived from.
    pub fn server_seed(&self) -> &FieldElement {
        &self.server_seed
    }

    /// Lock the overlay. Hold only for the duration of a check or write.
    pub fn overlay(&self) -> MutexGuard<'_, Overlay> {
        self.overlay.lock()
    }

    /// Snapshot for a joining client. Attributes of unrevealed cells are withheld.
    pub fn snapshot(&self) -> BoardSnapshot {
        let overlay = self.overlay();
        let cells = self
            .positions()
            .map(|pos| {
                let state = overlay.get(pos).copied().unwrap_or_default();
                CellView {
                    row: pos.row,
                    col: pos.col,
                    revealed: state.revealed,
                    matched_with: state.matched_with,
                    attribute: if state.revealed { self.attribute(pos).cloned() } else { None },
                }
            })
            .collect();

        BoardSnapshot {
            rows: self.rows,
            cols: self.cols,
            matched_pairs: overlay.matched_pairs(),
            cells,
        }
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Board")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("tiles", &self.tiles)
            .finish_non_exhaustive()
    }
}

fn pair_count(rows: usize, cols: usize) -> Result<usize, BoardError> {
    let cells = rows * cols;
    if cells == 0 || cells % 2 != 0 {
        return Err(BoardError::InvalidDimensions { rows, cols });
    }
    Ok(cells / 2)
}

/// Board state sent to a client on join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    /// Row count.
    pub rows: usize,
    /// Column count.
    pub cols: usize,
    /// Pairs matched so far.
    pub matched_pairs: usize,
    /// Cells, row-major.
    pub cells: Vec<CellView>,
}

/// One cell of a [`BoardSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellView {
    /// Row index.
    pub row: usize,
    /// Column index.
    pub col: usize,
    /// Permanently revealed.
    pub revealed: bool,
    /// Matched partner.
    pub matched_with: Option<Position>,
    /// Attribute, only present once revealed.
    pub attribute: Option<Attribute>,
}
