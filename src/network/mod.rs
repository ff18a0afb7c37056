//! Network Layer
//!
//! WebSocket server, wire messages, the connection registry and the shared
//! game session that drives the board from player actions.

pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;

pub use protocol::{ClientMessage, ServerMessage};
pub use registry::{ConnectionId, RegistryError, SessionRegistry};
pub use server::{GameServer, GameServerError, ServerConfig};
pub use session::{ActionSender, GameConfig, GameSession, PlayerHandle};
