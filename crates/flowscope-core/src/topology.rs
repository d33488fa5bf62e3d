//! Static network topology, loaded once per engine session.
//!
//! Lane polylines, signal marker geometry, segment lengths, and the route and
//! vehicle-type catalogs never change while a scenario runs, so they are read
//! in full at startup and served from memory afterwards. Individual entities
//! that fail to load degrade to placeholders instead of failing the session.

use std::collections::BTreeMap;

use flowscope_types::{Position, SignalColor, SignalState};
use tracing::{info, warn};

use crate::gateway::{EngineGateway, EntityKind, Field, GatewayError};

/// Lateral spacing between markers that share a lane end, in meters.
const MARKER_SPACING_M: f64 = 1.5;

/// Lane width assumed when the engine does not report one.
const DEFAULT_LANE_WIDTH_M: f64 = 3.2;

/// Static geometry of one lane.
#[derive(Debug, Clone, PartialEq)]
pub struct LaneGeometry {
    /// Centerline polyline in scenario coordinates.
    pub shape: Vec<Position>,
    /// Lane width in meters.
    pub width_m: f64,
    /// Lane length in meters.
    pub length_m: f64,
}

/// Where one controlled index of a signal is drawn.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SignalMarker {
    /// Marker position in scenario coordinates.
    pub position: Position,
    /// Angle of the lane-end perpendicular the marker sits on, in degrees.
    pub angle_deg: f64,
}

/// Marker layout of one signal, index-aligned with its controlled indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalLayout {
    /// One marker per controlled index, placeholders included.
    pub markers: Vec<SignalMarker>,
}

/// Everything static about the loaded scenario.
#[derive(Debug, Clone, Default)]
pub struct NetworkTopology {
    /// Lane geometry by lane id.
    pub lanes: BTreeMap<String, LaneGeometry>,
    /// Signal marker layouts by signal id.
    pub signals: BTreeMap<String, SignalLayout>,
    /// Segment lengths in meters by segment id, `0.0` when unknown.
    pub segment_lengths: BTreeMap<String, f64>,
    /// Route ids vehicles can be inserted onto.
    pub routes: Vec<String>,
    /// Vehicle type ids available for insertion.
    pub vehicle_types: Vec<String>,
}

impl NetworkTopology {
    /// Reads the full static topology from the engine.
    ///
    /// Listing failures propagate since nothing useful can be drawn without
    /// them. Per-entity read failures are logged and leave that entity
    /// degraded: the lane is skipped, or the signal keeps placeholder markers.
    pub fn load(gateway: &mut dyn EngineGateway) -> Result<Self, GatewayError> {
        let mut lanes = BTreeMap::new();
        for lane_id in gateway.list_entities(EntityKind::Lane)? {
            let shape = match gateway.get_field(EntityKind::Lane, &lane_id, Field::Shape) {
                Ok(value) => value.as_shape().map(<[Position]>::to_vec),
                Err(error) => {
                    warn!(error = %error, lane = %lane_id, "Skipping lane without shape");
                    continue;
                }
            };
            let Some(shape) = shape else {
                warn!(lane = %lane_id, "Skipping lane with non-polyline shape");
                continue;
            };
            let width_m = gateway
                .get_field(EntityKind::Lane, &lane_id, Field::Width)
                .ok()
                .and_then(|value| value.as_float())
                .unwrap_or(DEFAULT_LANE_WIDTH_M);
            let length_m = gateway
                .get_field(EntityKind::Lane, &lane_id, Field::LaneLength)
                .ok()
                .and_then(|value| value.as_float())
                .unwrap_or(0.0);
            lanes.insert(
                lane_id,
                LaneGeometry {
                    shape,
                    width_m,
                    length_m,
                },
            );
        }

        let mut signals = BTreeMap::new();
        for signal_id in gateway.list_entities(EntityKind::Signal)? {
            let controlled = match gateway.get_field(
                EntityKind::Signal,
                &signal_id,
                Field::ControlledLanes,
            ) {
                Ok(value) => value.as_ids().map(<[String]>::to_vec).unwrap_or_default(),
                Err(error) => {
                    warn!(error = %error, signal = %signal_id, "Signal has no controlled lane list");
                    Vec::new()
                }
            };
            let markers = compute_markers(&controlled, &lanes);
            signals.insert(signal_id, SignalLayout { markers });
        }

        let mut segment_lengths = BTreeMap::new();
        for segment_id in gateway.list_entities(EntityKind::Segment)? {
            let reference_lane = format!("{segment_id}_0");
            let length_m = lanes
                .get(&reference_lane)
                .map_or(0.0, |geometry| geometry.length_m);
            segment_lengths.insert(segment_id, length_m);
        }

        let routes = gateway.list_entities(EntityKind::Route)?;
        let vehicle_types = gateway.list_entities(EntityKind::VehicleType)?;

        info!(
            lanes = lanes.len(),
            signals = signals.len(),
            segments = segment_lengths.len(),
            routes = routes.len(),
            "Network topology loaded"
        );

        Ok(Self {
            lanes,
            signals,
            segment_lengths,
            routes,
            vehicle_types,
        })
    }

    /// Number of controlled indices of a signal, which is also the state
    /// string length its programs must use.
    #[must_use]
    pub fn required_state_len(&self, signal_id: &str) -> Option<usize> {
        self.signals.get(signal_id).map(|layout| layout.markers.len())
    }

    /// Cached length of a segment in meters, `0.0` when unknown.
    #[must_use]
    pub fn segment_length_m(&self, segment_id: &str) -> f64 {
        self.segment_lengths.get(segment_id).copied().unwrap_or(0.0)
    }

    /// Builds the per-frame marker states of one signal from its current
    /// state string.
    ///
    /// Codes and markers are paired positionally; when their counts differ
    /// the extra entries on either side are dropped.
    #[must_use]
    pub fn signal_states(&self, signal_id: &str, state: &str) -> Vec<SignalState> {
        let Some(layout) = self.signals.get(signal_id) else {
            return Vec::new();
        };
        state
            .chars()
            .zip(layout.markers.iter())
            .map(|(code, marker)| SignalState {
                signal_id: signal_id.to_owned(),
                position: marker.position,
                angle_deg: marker.angle_deg,
                color: SignalColor::from_state_code(code),
            })
            .collect()
    }
}

/// Places one marker per controlled index at the end of its lane.
///
/// Indices sharing a lane are spread laterally along the unit perpendicular
/// of the lane's final segment, centered on the lane end; the perpendicular's
/// angle becomes every marker's orientation. Lanes with fewer
/// than two shape points, a degenerate final segment, or no geometry at all
/// keep zero placeholders at their indices.
fn compute_markers(
    controlled: &[String],
    lanes: &BTreeMap<String, LaneGeometry>,
) -> Vec<SignalMarker> {
    let mut markers = vec![SignalMarker::default(); controlled.len()];

    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (global_index, lane_id) in controlled.iter().enumerate() {
        groups.entry(lane_id.as_str()).or_default().push(global_index);
    }

    for (lane_id, indices) in groups {
        let Some(geometry) = lanes.get(lane_id) else {
            continue;
        };
        let [.., prev, end] = geometry.shape.as_slice() else {
            continue;
        };
        let dx = end.x - prev.x;
        let dy = end.y - prev.y;
        let length = dx.hypot(dy);
        if length <= f64::EPSILON {
            continue;
        }
        let perp_x = -dy / length;
        let perp_y = dx / length;
        let angle_deg = perp_y.atan2(perp_x).to_degrees();

        let count = u32::try_from(indices.len()).unwrap_or(u32::MAX);
        let mut offset = -MARKER_SPACING_M * f64::from(count.saturating_sub(1)) / 2.0;
        for global_index in indices {
            if let Some(slot) = markers.get_mut(global_index) {
                *slot = SignalMarker {
                    position: Position::new(end.x + perp_x * offset, end.y + perp_y * offset),
                    angle_deg,
                };
            }
            offset += MARKER_SPACING_M;
        }
    }

    markers
}
