//! Immutable per-step frame and statistics bundles.
//!
//! A [`FrameSnapshot`] is the complete dynamic state handed to the
//! rendering boundary after each engine step; a [`StatsSnapshot`] is the
//! aggregate view computed alongside it. Both are built fresh every step
//! and never mutated after publication -- the previous snapshot is simply
//! discarded, there is no diffing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entities::{SignalState, VehicleState};

/// Point-in-time bundle of all dynamic entity state after one step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    /// Simulated time in seconds at the end of the step.
    pub sim_time_s: f64,
    /// Every vehicle currently in the simulation.
    pub vehicles: Vec<VehicleState>,
    /// One entry per (signal system, controlled index) pair.
    pub signals: Vec<SignalState>,
    /// Route ids currently defined in the engine, cached for dialogs.
    pub available_routes: Vec<String>,
    /// Vehicle type ids currently defined in the engine, cached for dialogs.
    pub available_types: Vec<String>,
}

/// Aggregate metrics for one road segment at one step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentSnapshot {
    /// Number of vehicles on the segment during the last step.
    pub vehicle_count: u32,
    /// Mean speed on the segment in meters per second.
    pub mean_speed: f64,
    /// Occupancy in percent (0-100), or `-1.0` when the engine could not
    /// report it. Consumers averaging occupancy must exclude negative
    /// values, never fold them in as zero.
    pub occupancy_percent: f64,
    /// Vehicles per kilometer; `0.0` when the segment length is unknown.
    pub density_per_km: f64,
}

/// Global aggregate statistics for one step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Simulated time in seconds at the end of the step.
    pub sim_time_s: f64,
    /// Arithmetic mean of per-vehicle speed, `0.0` for an empty set.
    pub global_avg_speed: f64,
    /// Number of vehicles currently in the simulation.
    pub total_vehicles: u32,
    /// Vehicles with speed strictly below the stop threshold.
    pub stopped_vehicles: u32,
    /// Running CO2 total in kilograms accumulated across steps.
    pub total_co2_kg: f64,
    /// Running fuel total in liters accumulated across steps.
    pub total_fuel_l: f64,
    /// Cumulative count of vehicles that completed their route.
    pub arrived_total: u64,
    /// Mean of per-segment density over all segments, `0.0` for none.
    pub avg_density_per_km: f64,
    /// Mean of per-segment occupancy over the segments that reported one;
    /// negative sentinels are excluded, `0.0` when nothing reported.
    pub avg_occupancy_percent: f64,
    /// Per-segment metrics keyed by segment id.
    pub segments: BTreeMap<String, SegmentSnapshot>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_frame_has_no_entities() {
        let frame = FrameSnapshot::default();
        assert!(frame.vehicles.is_empty());
        assert!(frame.signals.is_empty());
        assert!(frame.available_routes.is_empty());
    }

    #[test]
    fn stats_snapshot_round_trips_with_segments() {
        let mut segments = BTreeMap::new();
        segments.insert(
            String::from("edge_a"),
            SegmentSnapshot {
                vehicle_count: 4,
                mean_speed: 8.5,
                occupancy_percent: -1.0,
                density_per_km: 13.3,
            },
        );
        let snap = StatsSnapshot {
            sim_time_s: 12.3,
            global_avg_speed: 9.9,
            total_vehicles: 4,
            stopped_vehicles: 1,
            total_co2_kg: 0.004,
            total_fuel_l: 0.001,
            arrived_total: 2,
            avg_density_per_km: 13.3,
            avg_occupancy_percent: 21.0,
            segments,
        };
        let json = serde_json::to_string(&snap).unwrap();
        let back: StatsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
