//! Player State
//!
//! The authoritative per-player simulation entity and its movement state
//! machine:
//!
//! ```text
//!            move_to                 destination reached
//!   Idle ──────────────▶ Moving ─────────────────────────▶ Idle
//!     ▲                    │
//!     │      teleport      │ teleport (cancels destination)
//!     └─── Teleporting ◀───┘
//! ```
//!
//! `Teleporting` resolves within the `teleport` call and is never observed
//! across a tick. Busy is an orthogonal guard that blocks `move_to`.

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::core::position::{Direction, Position, SPAWN_POSITION};
use crate::game::inventory::{Equipment, Inventory};
use crate::game::skill::Skills;
use crate::network::protocol::ServerMessage;
use crate::network::session::{Outbound, SendError, SessionId};

/// Health and run energy ceiling.
pub const MAX_VITAL: u8 = 100;

/// Persistent player identifier, assigned by storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayerId(pub i64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Movement state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MovementState {
    /// Standing still.
    Idle,
    /// Walking toward a destination.
    Moving,
    /// Mid-teleport.
    Teleporting,
}

/// Why a move command was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveRejected {
    /// Another action holds the busy guard.
    #[error("player is busy")]
    Busy,
    /// A teleport is resolving.
    #[error("player is teleporting")]
    Teleporting,
}

/// Character look. Values are opaque model/colour ids.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Appearance {
    /// 0 = male, 1 = female.
    pub gender: i32,
    /// Head model.
    pub head: i32,
    /// Torso model.
    pub body: i32,
    /// Leg model.
    pub legs: i32,
    /// Feet model.
    pub feet: i32,
    /// Hand model.
    pub hands: i32,
    /// Hair colour.
    pub hair_color: i32,
    /// Body colour.
    pub body_color: i32,
}

/// A player.
#[derive(Clone, Debug)]
pub struct Player {
    session_id: SessionId,
    outbound: Option<Outbound>,

    /// Storage id, `None` until the first save.
    pub id: Option<PlayerId>,
    /// Account name, `None` while anonymous.
    pub username: Option<String>,
    /// Account creation time.
    pub created_at: Option<DateTime<Utc>>,
    /// Most recent login.
    pub last_login: Option<DateTime<Utc>>,

    position: Position,
    direction: Direction,
    destination: Option<(i32, i32)>,
    moving: bool,
    teleporting: bool,
    busy: bool,

    health: u8,
    run_energy: u8,
    running: bool,
    combat_level: u8,

    /// Look.
    pub appearance: Appearance,
    /// Skill levels and experience.
    pub skills: Skills,
    /// Carried items.
    pub inventory: Inventory,
    /// Worn items.
    pub equipment: Equipment,

    needs_position_update: bool,
}

impl Player {
    /// New anonymous player at the spawn tile.
    pub fn new(session_id: impl Into<SessionId>, outbound: Option<Outbound>) -> Self {
        let skills = Skills::new();
        let combat_level = skills.combat_level();
        Self {
            session_id: session_id.into(),
            outbound,
            id: None,
            username: None,
            created_at: None,
            last_login: None,
            position: SPAWN_POSITION,
            direction: Direction::North,
            destination: None,
            moving: false,
            teleporting: false,
            busy: false,
            health: MAX_VITAL,
            run_energy: MAX_VITAL,
            running: false,
            combat_level,
            appearance: Appearance::default(),
            skills,
            inventory: Inventory::new(),
            equipment: Equipment::new(),
            needs_position_update: false,
        }
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Session this player is attached to.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Outbound handle, if attached to a live connection.
    pub fn outbound(&self) -> Option<&Outbound> {
        self.outbound.as_ref()
    }

    /// Point this player at a live connection.
    pub fn attach_session(&mut self, session_id: impl Into<SessionId>, outbound: Outbound) {
        self.session_id = session_id.into();
        self.outbound = Some(outbound);
    }

    // =========================================================================
    // Movement
    // =========================================================================

    /// Current tile.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Place the player without touching movement state. Used when loading.
    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    /// Current facing.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Pending walk target.
    pub fn destination(&self) -> Option<(i32, i32)> {
        self.destination
    }

    /// Derived movement state.
    pub fn state(&self) -> MovementState {
        if self.teleporting {
            MovementState::Teleporting
        } else if self.moving {
            MovementState::Moving
        } else {
            MovementState::Idle
        }
    }

    /// Walking toward a destination.
    pub fn is_moving(&self) -> bool {
        self.moving
    }

    /// Busy guard.
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Set or clear the busy guard.
    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    /// Start walking toward `(x, y)` on the current plane.
    pub fn move_to(&mut self, x: i32, y: i32) -> Result<(), MoveRejected> {
        if self.busy {
            return Err(MoveRejected::Busy);
        }
        if self.teleporting {
            return Err(MoveRejected::Teleporting);
        }
        self.destination = Some((x, y));
        self.moving = true;
        self.needs_position_update = true;
        Ok(())
    }

    /// Jump straight to `target`, cancelling any walk.
    pub fn teleport(&mut self, target: Position) {
        self.teleporting = true;
        self.destination = None;
        self.moving = false;

        self.position = target;
        self.needs_position_update = true;

        self.teleporting = false;
    }

    /// Advance one tile toward the destination; arriving returns to idle.
    fn process_movement(&mut self) {
        let Some((dest_x, dest_y)) = self.destination else {
            self.moving = false;
            return;
        };

        let (dx, dy) = self.position.step_toward(dest_x, dest_y);
        if let Some(direction) = Direction::from_step(dx, dy) {
            self.position = self.position.translate(dx, dy);
            self.direction = direction;
            self.needs_position_update = true;
        }

        if self.position.x == dest_x && self.position.y == dest_y {
            self.destination = None;
            self.moving = false;
        }
    }

    // =========================================================================
    // Vitals
    // =========================================================================

    /// Current health (0-100).
    pub fn health(&self) -> u8 {
        self.health
    }

    /// Set health, clamped to 0-100.
    pub fn set_health(&mut self, health: u8) {
        self.health = health.min(MAX_VITAL);
    }

    /// Lose health, stopping at 0.
    pub fn damage(&mut self, amount: u8) {
        self.health = self.health.saturating_sub(amount);
    }

    /// Regain health, stopping at 100.
    pub fn heal(&mut self, amount: u8) {
        self.health = self.health.saturating_add(amount).min(MAX_VITAL);
    }

    /// Current run energy (0-100).
    pub fn run_energy(&self) -> u8 {
        self.run_energy
    }

    /// Set run energy, clamped to 0-100.
    pub fn set_run_energy(&mut self, energy: u8) {
        self.run_energy = energy.min(MAX_VITAL);
    }

    /// Preferred speed. Does not change per-tick displacement.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Toggle run mode.
    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    fn regenerate(&mut self) {
        if !self.moving && !self.running && self.run_energy < MAX_VITAL {
            self.run_energy += 1;
        }
    }

    // =========================================================================
    // Skills
    // =========================================================================

    /// Cached combat level.
    pub fn combat_level(&self) -> u8 {
        self.combat_level
    }

    /// Recompute the combat level from skills (after loading).
    pub fn refresh_combat_level(&mut self) {
        self.combat_level = self.skills.combat_level();
    }

    /// Add experience; returns the new level on a level-up.
    pub fn add_experience(&mut self, skill: u8, amount: f64) -> Option<u8> {
        let new_level = self.skills.add_experience(skill, amount)?;
        self.refresh_combat_level();
        Some(new_level)
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// One simulation step: movement first, then passive regeneration.
    pub fn update(&mut self) {
        self.process_movement();
        self.regenerate();
        // Combat and other timed systems are not simulated.
    }

    /// Force a position broadcast on the next flush.
    pub fn mark_for_update(&mut self) {
        self.needs_position_update = true;
    }

    /// Unflushed position change pending.
    pub fn needs_position_update(&self) -> bool {
        self.needs_position_update
    }

    /// The position line for this player.
    pub fn position_message(&self) -> ServerMessage {
        ServerMessage::Position {
            x: self.position.x,
            y: self.position.y,
            z: self.position.z,
            direction: self.direction.index(),
        }
    }

    /// Push a pending position update without waiting.
    ///
    /// Returns `Ok(true)` when a message was queued. The dirty flag stays set
    /// on failure so the next tick retries.
    pub fn flush_updates(&mut self) -> Result<bool, SendError> {
        if !self.needs_position_update {
            return Ok(false);
        }
        let Some(outbound) = &self.outbound else {
            return Ok(false);
        };
        outbound.push(self.position_message())?;
        self.needs_position_update = false;
        Ok(true)
    }
}
