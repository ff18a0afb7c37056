//! Reveal State Machine
//!
//! Per-connection reveal logic:
//!
//! ```text
//! Idle ──reveal(p)──► Armed(p) ──reveal(q), match────► Idle
//!                        │      ──reveal(q), no match─► Cooling(p, q) ──timeout──► Idle
//!                        └──timeout──► Idle
//! ```
//!
//! `Cooling` is the tail of the no-match branch: the session is back to
//! accepting a first reveal, but a single timeout is still live to hide the
//! two cards. A new reveal during cooling supersedes it and hands the two
//! positions back to the caller to hide immediately.
//!
//! Reveals carry the instant they were received. A second reveal that
//! arrived after the live timeout's deadline does not pair with the first,
//! even when the timer has not been processed yet: the first card is
//! flushed and the new one starts a fresh attempt.
//!
//! The state machine itself performs no I/O. Callers hold the session lock
//! and the board overlay lock while calling it and apply the returned step.

use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::game::board::{Board, Overlay, Position};

/// Pending reveal of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending {
    /// No pending reveal.
    Idle,
    /// One card revealed, waiting for a second.
    Armed {
        /// The revealed cell.
        pos: Position,
    },
    /// Two non-matching cards revealed, waiting to be hidden.
    Cooling {
        /// Both cells.
        positions: [Position; 2],
    },
}

/// The single live timeout of a session.
#[derive(Debug)]
pub struct Deadline {
    generation: u64,
    expires_at: Instant,
    handle: AbortHandle,
}

impl Deadline {
    /// Generation tag carried by the timer's expiry message.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// When the timer fires.
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    fn lapsed_by(&self, at: Instant) -> bool {
        at >= self.expires_at
    }
}

/// What a reveal did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealOutcome {
    /// Rejected; nothing to broadcast.
    Ignored,
    /// First card of a pair attempt. Caller arms a timeout.
    Armed(Position),
    /// Second card matched the first. Caller marks both revealed.
    Matched {
        /// First card.
        first: Position,
        /// Second card.
        second: Position,
    },
    /// Second card did not match. Caller arms a timeout for both.
    Mismatched {
        /// First card.
        first: Position,
        /// Second card.
        second: Position,
    },
}

/// Result of [`SessionState::reveal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealStep {
    /// Cells from a superseded or lapsed attempt to hide now.
    pub flushed: Vec<Position>,
    /// Decision for the revealed cell.
    pub outcome: RevealOutcome,
}

impl RevealStep {
    fn ignored() -> Self {
        Self { flushed: Vec::new(), outcome: RevealOutcome::Ignored }
    }
}

/// State of one live connection.
#[derive(Debug)]
pub struct SessionState {
    name: Option<String>,
    pending: Pending,
    deadline: Option<Deadline>,
    next_generation: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    /// Fresh idle state.
    pub fn new() -> Self {
        Self {
            name: None,
            pending: Pending::Idle,
            deadline: None,
            next_generation: 0,
        }
    }

    /// Display name from the player's hello, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Set the display name.
    pub fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    /// Current pending reveal.
    pub fn pending(&self) -> Pending {
        self.pending
    }

    /// Whether a timeout is live.
    pub fn has_deadline(&self) -> bool {
        self.deadline.is_some()
    }

    /// Handle a reveal of `pos` received at `received_at`.
    ///
    /// Cancels the live timeout whenever the reveal is accepted. Permanently
    /// revealed cells and a repeat of the armed cell are ignored without
    /// touching the pending state.
    pub fn reveal(
        &mut self,
        pos: Position,
        received_at: Instant,
        board: &Board,
        overlay: &Overlay,
    ) -> RevealStep {
        if board.tile(pos).is_none() || overlay.is_revealed(pos) {
            return RevealStep::ignored();
        }

        let lapsed = self.deadline.as_ref().is_some_and(|d| d.lapsed_by(received_at));
        match self.pending {
            Pending::Armed { pos: first } if first == pos => RevealStep::ignored(),
            Pending::Armed { pos: first } if lapsed => {
                self.cancel_deadline();
                self.pending = Pending::Armed { pos };
                RevealStep { flushed: vec![first], outcome: RevealOutcome::Armed(pos) }
            }
            Pending::Armed { pos: first } => {
                self.cancel_deadline();
                let outcome = if board.same_attribute(first, pos) {
                    self.pending = Pending::Idle;
                    RevealOutcome::Matched { first, second: pos }
                } else {
                    self.pending = Pending::Cooling { positions: [first, pos] };
                    RevealOutcome::Mismatched { first, second: pos }
                };
                RevealStep { flushed: Vec::new(), outcome }
            }
            Pending::Cooling { positions } => {
                self.cancel_deadline();
                self.pending = Pending::Armed { pos };
                RevealStep { flushed: positions.to_vec(), outcome: RevealOutcome::Armed(pos) }
            }
            Pending::Idle => {
                self.cancel_deadline();
                self.pending = Pending::Armed { pos };
                RevealStep { flushed: Vec::new(), outcome: RevealOutcome::Armed(pos) }
            }
        }
    }

    /// Reserve the generation for the next timeout.
    pub fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// The live timeout, if any.
    pub fn deadline(&self) -> Option<&Deadline> {
        self.deadline.as_ref()
    }

    /// Install the live timeout, cancelling any previous one.
    pub fn set_deadline(&mut self, generation: u64, expires_at: Instant, handle: AbortHandle) {
        self.cancel_deadline();
        self.deadline = Some(Deadline { generation, expires_at, handle });
    }

    /// Abort and drop the live timeout, if any.
    pub fn cancel_deadline(&mut self) {
        if let Some(deadline) = self.deadline.take() {
            deadline.handle.abort();
        }
    }

    /// Handle a timeout firing.
    ///
    /// Returns the positions to hide, or nothing if `generation` is not the
    /// live timeout (it was cancelled or superseded after it fired).
    pub fn expire(&mut self, generation: u64) -> Vec<Position> {
        match &self.deadline {
            Some(d) if d.generation == generation => {}
            _ => return Vec::new(),
        }
        self.deadline = None;

        let positions = match self.pending {
            Pending::Idle => Vec::new(),
            Pending::Armed { pos } => vec![pos],
            Pending::Cooling { positions } => positions.to_vec(),
        };
        self.pending = Pending::Idle;
        positions
    }

    /// Drop all pending state; used on disconnect.
    pub fn reset(&mut self) {
        self.cancel_deadline();
        self.pending = Pending::Idle;
    }
}
