//! Tile Positions and Facing
//!
//! Integer world coordinates and the 8-way compass used for facing.
//! North is `+y`, east is `+x`; `z` selects the plane.

use std::fmt;

/// Default spawn tile for new characters.
pub const SPAWN_POSITION: Position = Position::new(3222, 3222, 0);

/// A tile in the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Position {
    /// East-west coordinate.
    pub x: i32,
    /// North-south coordinate.
    pub y: i32,
    /// Plane (0 = ground level).
    pub z: i32,
}

impl Position {
    /// Create a position.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Single-tile step toward `(dest_x, dest_y)`, each axis clamped to `[-1, 1]`.
    ///
    /// Returns `(0, 0)` once the destination is reached.
    pub fn step_toward(&self, dest_x: i32, dest_y: i32) -> (i32, i32) {
        let dx = (i64::from(dest_x) - i64::from(self.x)).signum() as i32;
        let dy = (i64::from(dest_y) - i64::from(self.y)).signum() as i32;
        (dx, dy)
    }

    /// Position shifted by `(dx, dy)` on the same plane.
    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
            z: self.z,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

// =============================================================================
// DIRECTION
// =============================================================================

/// Octant facing, numbered clockwise from north.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Direction {
    /// +y
    #[default]
    North = 0,
    /// +x, +y
    NorthEast = 1,
    /// +x
    East = 2,
    /// +x, -y
    SouthEast = 3,
    /// -y
    South = 4,
    /// -x, -y
    SouthWest = 5,
    /// -x
    West = 6,
    /// -x, +y
    NorthWest = 7,
}

impl Direction {
    /// Facing for a single step. `None` for the zero step.
    pub fn from_step(dx: i32, dy: i32) -> Option<Direction> {
        match (dx.signum(), dy.signum()) {
            (0, 1) => Some(Direction::North),
            (1, 1) => Some(Direction::NorthEast),
            (1, 0) => Some(Direction::East),
            (1, -1) => Some(Direction::SouthEast),
            (0, -1) => Some(Direction::South),
            (-1, -1) => Some(Direction::SouthWest),
            (-1, 0) => Some(Direction::West),
            (-1, 1) => Some(Direction::NorthWest),
            _ => None,
        }
    }

    /// Wire index (0-7).
    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }
}
