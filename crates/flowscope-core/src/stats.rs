//! Aggregate traffic statistics, computed once per frame.
//!
//! Per-vehicle values come from the frame that was just read, so the
//! aggregator issues no vehicle reads of its own. Segment metrics are read
//! here, per cached segment id, and degrade per field: a failed occupancy
//! read becomes the `-1.0` sentinel instead of poisoning the frame.

use std::collections::BTreeMap;

use flowscope_types::filter::STOP_SPEED_THRESHOLD;
use flowscope_types::{SegmentSnapshot, StatsSnapshot, VehicleState};

use crate::gateway::{EngineGateway, EntityKind, Field};
use crate::topology::NetworkTopology;

const MG_PER_KG: f64 = 1_000_000.0;
const UL_PER_L: f64 = 1_000_000.0;
const M_PER_KM: f64 = 1_000.0;

/// Marks a segment whose occupancy the engine could not report.
const OCCUPANCY_UNAVAILABLE: f64 = -1.0;

/// Builds one [`StatsSnapshot`] per frame and carries the running totals.
///
/// Emission and fuel totals accumulate across every [`StatsAggregator::collect`]
/// call, so one aggregator must live exactly as long as one engine session.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    total_co2_kg: f64,
    total_fuel_l: f64,
}

impl StatsAggregator {
    /// Creates an aggregator with zeroed totals.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Zeroes the running totals for a fresh session.
    pub const fn reset(&mut self) {
        self.total_co2_kg = 0.0;
        self.total_fuel_l = 0.0;
    }

    /// Folds one frame into the totals and returns the full snapshot.
    pub fn collect(
        &mut self,
        gateway: &mut dyn EngineGateway,
        topology: &NetworkTopology,
        sim_time_s: f64,
        vehicles: &[VehicleState],
        arrived_total: u64,
    ) -> StatsSnapshot {
        let mut stopped_vehicles = 0_u32;
        let mut speed_sum = 0.0;
        let mut step_co2_mg = 0.0;
        let mut step_fuel_ul = 0.0;
        for vehicle in vehicles {
            if vehicle.speed < STOP_SPEED_THRESHOLD {
                stopped_vehicles = stopped_vehicles.saturating_add(1);
            }
            speed_sum += vehicle.speed;
            step_co2_mg += vehicle.co2_mg;
            step_fuel_ul += vehicle.fuel_ul;
        }
        self.total_co2_kg += step_co2_mg / MG_PER_KG;
        self.total_fuel_l += step_fuel_ul / UL_PER_L;

        let total_vehicles = u32::try_from(vehicles.len()).unwrap_or(u32::MAX);
        let global_avg_speed = if vehicles.is_empty() {
            0.0
        } else {
            speed_sum / f64::from(total_vehicles)
        };

        let mut segments = BTreeMap::new();
        let mut density_sum = 0.0;
        let mut density_count = 0.0;
        let mut occupancy_sum = 0.0;
        let mut occupancy_count = 0.0;
        for (segment_id, length_m) in &topology.segment_lengths {
            let segment = read_segment(gateway, segment_id, *length_m);
            density_sum += segment.density_per_km;
            density_count += 1.0;
            if segment.occupancy_percent >= 0.0 {
                occupancy_sum += segment.occupancy_percent;
                occupancy_count += 1.0;
            }
            segments.insert(segment_id.clone(), segment);
        }
        let avg_density_per_km = if density_count > 0.0 {
            density_sum / density_count
        } else {
            0.0
        };
        let avg_occupancy_percent = if occupancy_count > 0.0 {
            occupancy_sum / occupancy_count
        } else {
            0.0
        };

        StatsSnapshot {
            sim_time_s,
            global_avg_speed,
            total_vehicles,
            stopped_vehicles,
            total_co2_kg: self.total_co2_kg,
            total_fuel_l: self.total_fuel_l,
            arrived_total,
            avg_density_per_km,
            avg_occupancy_percent,
            segments,
        }
    }
}

fn read_segment(
    gateway: &mut dyn EngineGateway,
    segment_id: &str,
    length_m: f64,
) -> SegmentSnapshot {
    let vehicle_count = gateway
        .get_field(EntityKind::Segment, segment_id, Field::VehicleCount)
        .ok()
        .and_then(|value| value.as_int())
        .and_then(|count| u32::try_from(count).ok())
        .unwrap_or(0);
    let mean_speed = gateway
        .get_field(EntityKind::Segment, segment_id, Field::MeanSpeed)
        .ok()
        .and_then(|value| value.as_float())
        .unwrap_or(0.0);
    let occupancy_percent = gateway
        .get_field(EntityKind::Segment, segment_id, Field::Occupancy)
        .ok()
        .and_then(|value| value.as_float())
        .unwrap_or(OCCUPANCY_UNAVAILABLE);
    let density_per_km = if length_m > 0.0 {
        f64::from(vehicle_count) / (length_m / M_PER_KM)
    } else {
        0.0
    };
    SegmentSnapshot {
        vehicle_count,
        mean_speed,
        occupancy_percent,
        density_per_km,
    }
}
