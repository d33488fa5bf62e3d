//! 2D positions in engine world coordinates.
//!
//! The engine reports positions in its own planar coordinate system
//! (meters, origin chosen by the scenario). Nothing here converts to
//! screen space; that is the renderer's concern.

use serde::{Deserialize, Serialize};

/// A point in engine world coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// East-west coordinate in meters.
    pub x: f64,
    /// North-south coordinate in meters.
    pub y: f64,
}

impl Position {
    /// Create a position from its coordinates.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another position.
    pub fn distance_to(&self, other: &Self) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx.hypot(dy)
    }
}
