//! Game Logic Module
//!
//! All game simulation code.
//!
//! ## Module Structure
//!
//! - `player`: Player entity and movement state machine
//! - `skill`: Skills, experience table, combat level
//! - `inventory`: Inventory slots and equipment
//! - `engine`: Fixed-period game loop and idle reaping

pub mod engine;
pub mod inventory;
pub mod player;
pub mod skill;

// Re-export key types
pub use engine::{EngineConfig, GameEngine, TickReport};
pub use inventory::{Equipment, Inventory, ItemStack};
pub use player::{Appearance, MovementState, Player, PlayerId};
pub use skill::{Skill, Skills};
