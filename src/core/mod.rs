//! Core primitives.
//!
//! Plain value types shared by the simulation and the wire layer.

pub mod position;

pub use position::{Direction, Position, SPAWN_POSITION};
