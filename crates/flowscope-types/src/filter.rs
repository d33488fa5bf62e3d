//! Display filter applied to vehicles at the UI boundary.
//!
//! The filter never removes vehicles from a frame; it only decides which
//! vehicles count as "visible" for the dashboard. A disabled filter
//! matches everything.

use serde::{Deserialize, Serialize};

use crate::color::Rgb;
use crate::entities::VehicleState;

/// Speed below which a vehicle counts as stopped, in meters per second.
pub const STOP_SPEED_THRESHOLD: f64 = 0.1;

/// Predicate deciding which vehicles are visible on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleFilter {
    /// Whether the filter is applied at all.
    pub enabled: bool,
    /// Minimum speed in meters per second (inclusive).
    pub min_speed: f64,
    /// Maximum speed in meters per second (inclusive).
    pub max_speed: f64,
    /// When set, only vehicles with exactly this color match.
    pub color: Option<Rgb>,
    /// When true, only vehicles below the stop threshold match.
    pub stopped_only: bool,
}

impl Default for VehicleFilter {
    fn default() -> Self {
        Self {
            enabled: false,
            min_speed: 0.0,
            max_speed: 200.0,
            color: None,
            stopped_only: false,
        }
    }
}

impl VehicleFilter {
    /// Whether the given vehicle passes this filter.
    pub fn matches(&self, vehicle: &VehicleState) -> bool {
        if !self.enabled {
            return true;
        }
        if vehicle.speed < self.min_speed || vehicle.speed > self.max_speed {
            return false;
        }
        if let Some(color) = self.color {
            if vehicle.color != color {
                return false;
            }
        }
        !self.stopped_only || vehicle.speed < STOP_SPEED_THRESHOLD
    }
}
