//! Network Layer
//!
//! WebSocket server, text-line protocol, and the live session registry.

pub mod auth;
pub mod dispatcher;
pub mod protocol;
pub mod server;
pub mod session;

pub use dispatcher::{DispatchError, Dispatcher};
pub use protocol::{ClientCommand, ProtocolError, ServerMessage};
pub use server::{GameServer, GameServerError, ServerConfig};
pub use session::{Outbound, SessionId, SessionRegistry, SharedPlayer};
