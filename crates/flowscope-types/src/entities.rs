//! Per-step vehicle and signal state records.
//!
//! One record of each kind is built per entity per step, owned by the
//! [`FrameSnapshot`](crate::snapshot::FrameSnapshot) that contains it,
//! and never mutated after construction. Entity ids are the engine's own
//! opaque string identifiers, stable for the lifetime of the entity.

use serde::{Deserialize, Serialize};

use crate::color::{Rgb, SignalColor};
use crate::geometry::Position;

/// The state of one vehicle at one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    /// Engine-issued vehicle id, unique per simulation run.
    pub id: String,
    /// Current position in world coordinates.
    pub position: Position,
    /// Heading angle in degrees, engine convention (0 = north, clockwise).
    pub angle_deg: f64,
    /// Current scalar speed in meters per second.
    pub speed: f64,
    /// Vehicle length in meters.
    pub length: f64,
    /// Id of the route the vehicle is following.
    pub route_id: String,
    /// Display color reported by the engine.
    pub color: Rgb,
    /// CO2 emitted during the last step, in milligrams.
    pub co2_mg: f64,
    /// Fuel consumed during the last step, in microliters.
    pub fuel_ul: f64,
}

/// The display state of one controlled signal index at one step.
///
/// One instance exists per (signal system, controlled index) pair; the
/// position and angle come from the static geometry computed at load
/// time, the color from the per-step state string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalState {
    /// Id of the signal system this index belongs to.
    pub signal_id: String,
    /// World position of this controlled index.
    pub position: Position,
    /// Orientation angle in degrees for rendering the signal head.
    pub angle_deg: f64,
    /// Current display aspect.
    pub color: SignalColor,
}

/// One phase of a signal program: the state string shown and how long.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSpec {
    /// Per-index state string (one character per controlled index).
    pub state: String,
    /// Phase duration in seconds.
    pub duration_s: f64,
}

impl PhaseSpec {
    /// Create a phase from its state string and duration.
    pub const fn new(state: String, duration_s: f64) -> Self {
        Self { state, duration_s }
    }
}
