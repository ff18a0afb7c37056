//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every message is a JSON object tagged by its `event` field.

use serde::{Deserialize, Serialize};

use crate::game::attribute::Attribute;
use crate::game::board::{BoardSnapshot, Position};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Actions sent by a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ClientMessage {
    /// Introduce the player.
    #[serde(rename = "user.hello")]
    Hello {
        /// Display name.
        name: String,
    },

    /// Pointer entered a card.
    #[serde(rename = "user.hover-card")]
    HoverCard {
        /// Row index.
        row: usize,
        /// Column index.
        col: usize,
    },

    /// Pointer left a card.
    #[serde(rename = "user.leave-card")]
    LeaveCard {
        /// Row index.
        row: usize,
        /// Column index.
        col: usize,
    },

    /// Flip a card.
    #[serde(rename = "user.reveal-card")]
    RevealCard {
        /// Row index.
        row: usize,
        /// Column index.
        col: usize,
    },

    /// Any other event name. Ignored.
    #[serde(other)]
    Unknown,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Events fanned out to every connected player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ServerMessage {
    /// Board state, sent once on join.
    #[serde(rename = "system.board")]
    Board(BoardSnapshot),

    /// Someone is hovering a card.
    #[serde(rename = "system.hover-card")]
    HoverCard {
        /// Row index.
        row: usize,
        /// Column index.
        col: usize,
    },

    /// Someone stopped hovering a card.
    #[serde(rename = "system.leave-card")]
    LeaveCard {
        /// Row index.
        row: usize,
        /// Column index.
        col: usize,
    },

    /// A card is face up.
    #[serde(rename = "system.reveal-card")]
    RevealCard {
        /// Row index.
        row: usize,
        /// Column index.
        col: usize,
        /// The card's attribute.
        attribute: Attribute,
    },

    /// A card is face down again.
    #[serde(rename = "system.hide-card")]
    HideCard {
        /// Row index.
        row: usize,
        /// Column index.
        col: usize,
        /// Always absent.
        attribute: Option<Attribute>,
    },

    /// Every pair has been matched.
    #[serde(rename = "system.game-finished")]
    GameFinished {
        /// Pairs matched.
        pairs: usize,
    },
}

impl ServerMessage {
    /// Hover notification.
    pub fn hover(pos: Position) -> Self {
        Self::HoverCard { row: pos.row, col: pos.col }
    }

    /// Leave notification.
    pub fn leave(pos: Position) -> Self {
        Self::LeaveCard { row: pos.row, col: pos.col }
    }

    /// Reveal with the card's attribute.
    pub fn reveal(pos: Position, attribute: Attribute) -> Self {
        Self::RevealCard { row: pos.row, col: pos.col, attribute }
    }

    /// Hide, attribute withheld.
    pub fn hide(pos: Position) -> Self {
        Self::HideCard { row: pos.row, col: pos.col, attribute: None }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
