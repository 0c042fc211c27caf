//! # RSPS Game Server
//!
//! Tick-driven multiplayer game server speaking a text-line protocol over
//! WebSocket.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       RSPS SERVER                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Plain value types                         │
//! │  └── position.rs - Tiles and octant directions               │
//! │                                                              │
//! │  game/           - Simulation                                │
//! │  ├── player.rs   - Player entity and movement state machine  │
//! │  ├── skill.rs    - Experience table and combat level         │
//! │  ├── inventory.rs- Inventory slots and equipment             │
//! │  └── engine.rs   - 600 ms game loop and idle reaping         │
//! │                                                              │
//! │  network/        - Connections                               │
//! │  ├── server.rs   - WebSocket server                          │
//! │  ├── protocol.rs - Line-oriented messages                    │
//! │  ├── dispatcher.rs- Command routing, login, registration     │
//! │  ├── auth.rs     - Credential rules and password digest      │
//! │  └── session.rs  - Concurrent session registry               │
//! │                                                              │
//! │  persistence/    - Player storage                            │
//! │  └── sqlite.rs   - SQLite store                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Tick Model
//!
//! Every tick updates all players and then flushes all pending position
//! updates. Commands are applied as they arrive, between ticks, and show
//! up in the next flush at the latest.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod config;

pub mod core;
pub mod game;
pub mod network;
pub mod persistence;

// Re-export commonly used types
pub use crate::core::position::{Direction, Position};
pub use game::engine::{EngineConfig, GameEngine};
pub use game::player::{Player, PlayerId};
pub use network::server::{GameServer, ServerConfig};
pub use network::session::SessionRegistry;
pub use persistence::{PlayerStore, SqliteStore, StoreError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Tick period in milliseconds
pub const TICK_RATE_MS: u64 = 600;
