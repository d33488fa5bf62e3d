//! Typed access to the external engine.
//!
//! The control loop never speaks a wire protocol directly. Everything goes
//! through [`EngineGateway`], a synchronous surface of entity listing, field
//! reads and writes, vehicle insertion, stepping, clock reads, and shutdown.
//! [`ScriptedGateway`] is the in-memory implementation backing the test suite.

use std::collections::BTreeMap;

use flowscope_types::{PhaseSpec, Position, Rgb};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised at the engine boundary.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport-level failure while talking to the engine.
    #[error("engine i/o failed: {source}")]
    Io {
        /// Underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The engine answered with something the wire protocol does not allow.
    #[error("protocol violation: {message}")]
    Protocol {
        /// Description of the malformed exchange.
        message: String,
    },

    /// The engine understood the request and refused it.
    #[error("engine rejected request: {message}")]
    Rejected {
        /// Engine-supplied rejection reason.
        message: String,
    },
}

/// The classes of engine entity the gateway can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// A moving vehicle currently present in the scenario.
    Vehicle,
    /// A traffic signal controlling one or more lanes.
    Signal,
    /// A route a vehicle can be inserted onto.
    Route,
    /// A vehicle type definition.
    VehicleType,
    /// A single lane with geometry.
    Lane,
    /// An aggregated road segment.
    Segment,
}

/// The per-entity fields the gateway can read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    /// Vehicle position in scenario coordinates.
    Position,
    /// Vehicle heading in degrees.
    Angle,
    /// Vehicle speed in m/s.
    Speed,
    /// Vehicle length in meters.
    Length,
    /// Identifier of the route the vehicle follows.
    RouteId,
    /// Vehicle display color.
    Color,
    /// CO2 emitted by the vehicle during the last step, in mg.
    Co2,
    /// Fuel consumed by the vehicle during the last step, in microliters.
    Fuel,
    /// Maximum speed the vehicle is allowed to reach, in m/s.
    MaxSpeed,
    /// Current signal state string, one code character per controlled index.
    StateString,
    /// Lane identifiers controlled by a signal, one per controlled index.
    ControlledLanes,
    /// Remaining duration of the current signal phase, in seconds.
    PhaseDuration,
    /// Index of the active phase within the signal program.
    PhaseIndex,
    /// Number of phases in the active signal program.
    PhaseCount,
    /// The full signal program as an ordered phase list.
    Program,
    /// Lane centerline geometry.
    Shape,
    /// Lane width in meters.
    Width,
    /// Lane or segment length in meters.
    LaneLength,
    /// Number of vehicles currently on a segment.
    VehicleCount,
    /// Mean speed on a segment, in m/s.
    MeanSpeed,
    /// Segment occupancy in percent.
    Occupancy,
}

/// A dynamically typed field value crossing the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// A floating point scalar.
    Float(f64),
    /// An integer scalar.
    Int(i64),
    /// A free-form string.
    Text(String),
    /// An ordered list of entity identifiers.
    Ids(Vec<String>),
    /// A single point in scenario coordinates.
    Position(Position),
    /// An ordered polyline in scenario coordinates.
    Shape(Vec<Position>),
    /// An RGB color.
    Color(Rgb),
    /// An ordered list of signal phases.
    Phases(Vec<PhaseSpec>),
}

impl FieldValue {
    /// Returns the contained float, if this value is a [`FieldValue::Float`].
    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the contained integer, if this value is a [`FieldValue::Int`].
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the contained text, if this value is a [`FieldValue::Text`].
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Returns the contained id list, if this value is a [`FieldValue::Ids`].
    #[must_use]
    pub fn as_ids(&self) -> Option<&[String]> {
        match self {
            Self::Ids(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Returns the contained point, if this value is a [`FieldValue::Position`].
    #[must_use]
    pub const fn as_position(&self) -> Option<Position> {
        match self {
            Self::Position(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the contained polyline, if this value is a [`FieldValue::Shape`].
    #[must_use]
    pub fn as_shape(&self) -> Option<&[Position]> {
        match self {
            Self::Shape(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Returns the contained color, if this value is a [`FieldValue::Color`].
    #[must_use]
    pub const fn as_color(&self) -> Option<Rgb> {
        match self {
            Self::Color(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the contained phase list, if this value is a [`FieldValue::Phases`].
    #[must_use]
    pub fn as_phases(&self) -> Option<&[PhaseSpec]> {
        match self {
            Self::Phases(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

/// Everything the engine needs to insert a new vehicle.
///
/// Cosmetic attributes such as color or length are applied with follow-up
/// [`EngineGateway::set_field`] calls after insertion succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySpec {
    /// Identifier the new vehicle will carry.
    pub id: String,
    /// Route the vehicle is inserted onto.
    pub route_id: String,
    /// Vehicle type definition to instantiate.
    pub type_id: String,
}

/// Synchronous engine boundary used by the control loop.
///
/// Implementations translate these calls into whatever the concrete engine
/// speaks. All methods take `&mut self` since real transports carry
/// connection state.
pub trait EngineGateway: Send {
    /// Lists the identifiers of all entities of the given kind.
    fn list_entities(&mut self, kind: EntityKind) -> Result<Vec<String>, GatewayError>;

    /// Reads one field of one entity.
    fn get_field(&mut self, kind: EntityKind, id: &str, field: Field)
    -> Result<FieldValue, GatewayError>;

    /// Writes one field of one entity.
    fn set_field(
        &mut self,
        kind: EntityKind,
        id: &str,
        field: Field,
        value: FieldValue,
    ) -> Result<(), GatewayError>;

    /// Inserts a new vehicle into the running scenario.
    fn add_entity(&mut self, spec: &EntitySpec) -> Result<(), GatewayError>;

    /// Advances the engine by exactly one step.
    fn step(&mut self) -> Result<(), GatewayError>;

    /// Reads the current simulation clock, in seconds.
    fn current_time(&mut self) -> Result<f64, GatewayError>;

    /// Number of vehicles that reached their destination during the last step.
    fn arrived_last_step(&mut self) -> Result<u64, GatewayError>;

    /// Shuts the engine session down.
    fn close(&mut self) -> Result<(), GatewayError>;
}

/// One recorded mutation on a [`ScriptedGateway`].
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    /// A field write.
    Set {
        /// Addressed entity kind.
        kind: EntityKind,
        /// Addressed entity id.
        id: String,
        /// Written field.
        field: Field,
        /// Written value.
        value: FieldValue,
    },
    /// A vehicle insertion.
    Add {
        /// The submitted spec.
        spec: EntitySpec,
    },
    /// One engine step.
    Step,
    /// Session shutdown.
    Close,
}

/// A scripted vehicle held by the in-memory gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedVehicle {
    /// Position in scenario coordinates.
    pub position: Position,
    /// Heading in degrees.
    pub angle_deg: f64,
    /// Speed in m/s.
    pub speed: f64,
    /// Length in meters.
    pub length: f64,
    /// Route the vehicle follows.
    pub route_id: String,
    /// Vehicle type it was instantiated from.
    pub type_id: String,
    /// Display color.
    pub color: Rgb,
    /// Maximum speed in m/s.
    pub max_speed: f64,
    /// CO2 emitted during the last step, in mg.
    pub co2_mg: f64,
    /// Fuel consumed during the last step, in microliters.
    pub fuel_ul: f64,
}

impl Default for ScriptedVehicle {
    fn default() -> Self {
        Self {
            position: Position::default(),
            angle_deg: 0.0,
            speed: 0.0,
            length: 5.0,
            route_id: String::new(),
            type_id: String::new(),
            color: Rgb::new(255, 255, 0),
            max_speed: 55.0,
            co2_mg: 0.0,
            fuel_ul: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
struct ScriptedSignal {
    state: String,
    controlled_lanes: Vec<String>,
    phases: Vec<PhaseSpec>,
    phase_index: i64,
    phase_duration: f64,
}

#[derive(Debug, Clone)]
struct ScriptedLane {
    shape: Vec<Position>,
    width: f64,
    length: f64,
}

#[derive(Debug, Clone)]
struct ScriptedSegment {
    vehicle_count: i64,
    mean_speed: f64,
    /// `None` makes occupancy reads fail, exercising degraded-read paths.
    occupancy: Option<f64>,
}

/// In-memory [`EngineGateway`] with a mutation journal.
///
/// Built up through `with_*` calls, then handed to the code under test.
/// Every write, insertion, step, and close lands in [`ScriptedGateway::calls`]
/// so tests can assert ordering as well as content.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    vehicles: BTreeMap<String, ScriptedVehicle>,
    signals: BTreeMap<String, ScriptedSignal>,
    lanes: BTreeMap<String, ScriptedLane>,
    segments: BTreeMap<String, ScriptedSegment>,
    routes: Vec<String>,
    vehicle_types: Vec<String>,
    time_s: f64,
    step_length_s: f64,
    steps_done: u64,
    arrivals: Vec<u64>,
    last_arrived: u64,
    reject_adds: Option<String>,
    fail_step_after: Option<u64>,
    closed: bool,
    calls: Vec<GatewayCall>,
}

impl ScriptedGateway {
    /// Creates an empty gateway advancing its clock by `step_length_s` per step.
    #[must_use]
    pub fn new(step_length_s: f64) -> Self {
        Self {
            step_length_s,
            ..Self::default()
        }
    }

    /// Adds a lane with the given centerline, width, and length.
    #[must_use]
    pub fn with_lane(mut self, id: &str, shape: Vec<Position>, width: f64, length: f64) -> Self {
        self.lanes.insert(
            id.to_owned(),
            ScriptedLane {
                shape,
                width,
                length,
            },
        );
        self
    }

    /// Adds a signal with the given state string and controlled lane list.
    #[must_use]
    pub fn with_signal(mut self, id: &str, state: &str, controlled_lanes: &[&str]) -> Self {
        self.signals.insert(
            id.to_owned(),
            ScriptedSignal {
                state: state.to_owned(),
                controlled_lanes: controlled_lanes.iter().map(|l| (*l).to_owned()).collect(),
                phases: Vec::new(),
                phase_index: 0,
                phase_duration: 30.0,
            },
        );
        self
    }

    /// Replaces the phase program of an already scripted signal.
    #[must_use]
    pub fn with_signal_program(mut self, id: &str, phases: Vec<PhaseSpec>) -> Self {
        if let Some(signal) = self.signals.get_mut(id) {
            signal.phases = phases;
        }
        self
    }

    /// Adds a loadable route id.
    #[must_use]
    pub fn with_route(mut self, id: &str) -> Self {
        self.routes.push(id.to_owned());
        self
    }

    /// Defines another route while the scenario is already running.
    pub fn define_route(&mut self, id: &str) {
        self.routes.push(id.to_owned());
    }

    /// Adds an instantiable vehicle type id.
    #[must_use]
    pub fn with_vehicle_type(mut self, id: &str) -> Self {
        self.vehicle_types.push(id.to_owned());
        self
    }

    /// Adds a vehicle already present in the scenario.
    #[must_use]
    pub fn with_vehicle(mut self, id: &str, vehicle: ScriptedVehicle) -> Self {
        self.vehicles.insert(id.to_owned(), vehicle);
        self
    }

    /// Adds an aggregated segment. `occupancy: None` makes occupancy reads fail.
    #[must_use]
    pub fn with_segment(
        mut self,
        id: &str,
        vehicle_count: i64,
        mean_speed: f64,
        occupancy: Option<f64>,
    ) -> Self {
        self.segments.insert(
            id.to_owned(),
            ScriptedSegment {
                vehicle_count,
                mean_speed,
                occupancy,
            },
        );
        self
    }

    /// Schedules per-step arrival counts, consumed front to back.
    #[must_use]
    pub fn with_arrivals(mut self, arrivals: Vec<u64>) -> Self {
        self.arrivals = arrivals;
        self
    }

    /// Makes every subsequent insertion fail with the given reason.
    #[must_use]
    pub fn with_add_rejection(mut self, message: &str) -> Self {
        self.reject_adds = Some(message.to_owned());
        self
    }

    /// Makes [`EngineGateway::step`] fail once `succeeding` steps have run.
    #[must_use]
    pub const fn with_step_failure_after(mut self, succeeding: u64) -> Self {
        self.fail_step_after = Some(succeeding);
        self
    }

    /// The recorded mutation journal, in call order.
    #[must_use]
    pub fn calls(&self) -> &[GatewayCall] {
        &self.calls
    }

    /// Looks up a vehicle by id.
    #[must_use]
    pub fn vehicle(&self, id: &str) -> Option<&ScriptedVehicle> {
        self.vehicles.get(id)
    }

    /// Whether [`EngineGateway::close`] has been called.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of steps executed so far.
    #[must_use]
    pub const fn steps_done(&self) -> u64 {
        self.steps_done
    }

    fn unknown(kind: EntityKind, id: &str) -> GatewayError {
        GatewayError::Rejected {
            message: format!("unknown {kind:?} '{id}'"),
        }
    }

    fn unsupported(kind: EntityKind, id: &str, field: Field) -> GatewayError {
        GatewayError::Rejected {
            message: format!("field {field:?} not available on {kind:?} '{id}'"),
        }
    }

    fn get_vehicle_field(&self, id: &str, field: Field) -> Result<FieldValue, GatewayError> {
        let vehicle = self
            .vehicles
            .get(id)
            .ok_or_else(|| Self::unknown(EntityKind::Vehicle, id))?;
        match field {
            Field::Position => Ok(FieldValue::Position(vehicle.position)),
            Field::Angle => Ok(FieldValue::Float(vehicle.angle_deg)),
            Field::Speed => Ok(FieldValue::Float(vehicle.speed)),
            Field::Length => Ok(FieldValue::Float(vehicle.length)),
            Field::RouteId => Ok(FieldValue::Text(vehicle.route_id.clone())),
            Field::Color => Ok(FieldValue::Color(vehicle.color)),
            Field::Co2 => Ok(FieldValue::Float(vehicle.co2_mg)),
            Field::Fuel => Ok(FieldValue::Float(vehicle.fuel_ul)),
            Field::MaxSpeed => Ok(FieldValue::Float(vehicle.max_speed)),
            _ => Err(Self::unsupported(EntityKind::Vehicle, id, field)),
        }
    }

    fn get_signal_field(&self, id: &str, field: Field) -> Result<FieldValue, GatewayError> {
        let signal = self
            .signals
            .get(id)
            .ok_or_else(|| Self::unknown(EntityKind::Signal, id))?;
        match field {
            Field::StateString => Ok(FieldValue::Text(signal.state.clone())),
            Field::ControlledLanes => Ok(FieldValue::Ids(signal.controlled_lanes.clone())),
            Field::PhaseDuration => Ok(FieldValue::Float(signal.phase_duration)),
            Field::PhaseIndex => Ok(FieldValue::Int(signal.phase_index)),
            Field::PhaseCount => Ok(FieldValue::Int(
                i64::try_from(signal.phases.len()).unwrap_or(i64::MAX),
            )),
            Field::Program => Ok(FieldValue::Phases(signal.phases.clone())),
            _ => Err(Self::unsupported(EntityKind::Signal, id, field)),
        }
    }

    fn get_lane_field(&self, id: &str, field: Field) -> Result<FieldValue, GatewayError> {
        let lane = self
            .lanes
            .get(id)
            .ok_or_else(|| Self::unknown(EntityKind::Lane, id))?;
        match field {
            Field::Shape => Ok(FieldValue::Shape(lane.shape.clone())),
            Field::Width => Ok(FieldValue::Float(lane.width)),
            Field::LaneLength => Ok(FieldValue::Float(lane.length)),
            _ => Err(Self::unsupported(EntityKind::Lane, id, field)),
        }
    }

    fn get_segment_field(&self, id: &str, field: Field) -> Result<FieldValue, GatewayError> {
        let segment = self
            .segments
            .get(id)
            .ok_or_else(|| Self::unknown(EntityKind::Segment, id))?;
        match field {
            Field::VehicleCount => Ok(FieldValue::Int(segment.vehicle_count)),
            Field::MeanSpeed => Ok(FieldValue::Float(segment.mean_speed)),
            Field::Occupancy => segment.occupancy.map(FieldValue::Float).ok_or_else(|| {
                GatewayError::Rejected {
                    message: format!("occupancy unavailable for segment '{id}'"),
                }
            }),
            _ => Err(Self::unsupported(EntityKind::Segment, id, field)),
        }
    }

    fn set_signal_field(
        &mut self,
        id: &str,
        field: Field,
        value: &FieldValue,
    ) -> Result<(), GatewayError> {
        let signal = self
            .signals
            .get_mut(id)
            .ok_or_else(|| Self::unknown(EntityKind::Signal, id))?;
        match (field, value) {
            (Field::PhaseDuration, FieldValue::Float(duration)) => {
                signal.phase_duration = *duration;
                Ok(())
            }
            (Field::PhaseIndex, FieldValue::Int(index)) => {
                signal.phase_index = *index;
                Ok(())
            }
            (Field::Program, FieldValue::Phases(phases)) => {
                signal.phases.clone_from(phases);
                Ok(())
            }
            _ => Err(Self::unsupported(EntityKind::Signal, id, field)),
        }
    }

    fn set_vehicle_field(
        &mut self,
        id: &str,
        field: Field,
        value: &FieldValue,
    ) -> Result<(), GatewayError> {
        let vehicle = self
            .vehicles
            .get_mut(id)
            .ok_or_else(|| Self::unknown(EntityKind::Vehicle, id))?;
        match (field, value) {
            (Field::Color, FieldValue::Color(color)) => {
                vehicle.color = *color;
                Ok(())
            }
            (Field::Length, FieldValue::Float(length)) => {
                vehicle.length = *length;
                Ok(())
            }
            (Field::MaxSpeed, FieldValue::Float(max_speed)) => {
                vehicle.max_speed = *max_speed;
                Ok(())
            }
            (Field::Speed, FieldValue::Float(speed)) => {
                vehicle.speed = *speed;
                Ok(())
            }
            _ => Err(Self::unsupported(EntityKind::Vehicle, id, field)),
        }
    }
}

impl EngineGateway for ScriptedGateway {
    fn list_entities(&mut self, kind: EntityKind) -> Result<Vec<String>, GatewayError> {
        let ids = match kind {
            EntityKind::Vehicle => self.vehicles.keys().cloned().collect(),
            EntityKind::Signal => self.signals.keys().cloned().collect(),
            EntityKind::Route => self.routes.clone(),
            EntityKind::VehicleType => self.vehicle_types.clone(),
            EntityKind::Lane => self.lanes.keys().cloned().collect(),
            EntityKind::Segment => self.segments.keys().cloned().collect(),
        };
        Ok(ids)
    }

    fn get_field(
        &mut self,
        kind: EntityKind,
        id: &str,
        field: Field,
    ) -> Result<FieldValue, GatewayError> {
        match kind {
            EntityKind::Vehicle => self.get_vehicle_field(id, field),
            EntityKind::Signal => self.get_signal_field(id, field),
            EntityKind::Lane => self.get_lane_field(id, field),
            EntityKind::Segment => self.get_segment_field(id, field),
            EntityKind::Route | EntityKind::VehicleType => {
                Err(Self::unsupported(kind, id, field))
            }
        }
    }

    fn set_field(
        &mut self,
        kind: EntityKind,
        id: &str,
        field: Field,
        value: FieldValue,
    ) -> Result<(), GatewayError> {
        let applied = match kind {
            EntityKind::Signal => self.set_signal_field(id, field, &value),
            EntityKind::Vehicle => self.set_vehicle_field(id, field, &value),
            _ => Err(Self::unsupported(kind, id, field)),
        };
        if applied.is_ok() {
            self.calls.push(GatewayCall::Set {
                kind,
                id: id.to_owned(),
                field,
                value,
            });
        }
        applied
    }

    fn add_entity(&mut self, spec: &EntitySpec) -> Result<(), GatewayError> {
        if let Some(message) = &self.reject_adds {
            return Err(GatewayError::Rejected {
                message: message.clone(),
            });
        }
        if !self.routes.contains(&spec.route_id) {
            return Err(Self::unknown(EntityKind::Route, &spec.route_id));
        }
        if self.vehicles.contains_key(&spec.id) {
            return Err(GatewayError::Rejected {
                message: format!("vehicle '{}' already exists", spec.id),
            });
        }
        self.vehicles.insert(
            spec.id.clone(),
            ScriptedVehicle {
                route_id: spec.route_id.clone(),
                type_id: spec.type_id.clone(),
                ..ScriptedVehicle::default()
            },
        );
        self.calls.push(GatewayCall::Add { spec: spec.clone() });
        Ok(())
    }

    fn step(&mut self) -> Result<(), GatewayError> {
        if let Some(limit) = self.fail_step_after {
            if self.steps_done >= limit {
                return Err(GatewayError::Protocol {
                    message: "engine connection lost".to_owned(),
                });
            }
        }
        self.time_s += self.step_length_s;
        self.last_arrived = if self.arrivals.is_empty() {
            0
        } else {
            self.arrivals.remove(0)
        };
        self.steps_done = self.steps_done.saturating_add(1);
        self.calls.push(GatewayCall::Step);
        Ok(())
    }

    fn current_time(&mut self) -> Result<f64, GatewayError> {
        Ok(self.time_s)
    }

    fn arrived_last_step(&mut self) -> Result<u64, GatewayError> {
        Ok(self.last_arrived)
    }

    fn close(&mut self) -> Result<(), GatewayError> {
        self.closed = true;
        self.calls.push(GatewayCall::Close);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn scripted_lists_entities_per_kind() {
        let mut gateway = ScriptedGateway::new(0.1)
            .with_route("r_main")
            .with_vehicle_type("car")
            .with_lane("e1_0", vec![Position::new(0.0, 0.0)], 3.2, 100.0)
            .with_signal("tl1", "GrYr", &["e1_0"])
            .with_vehicle("veh_a", ScriptedVehicle::default());

        assert_eq!(
            gateway.list_entities(EntityKind::Route).unwrap(),
            vec!["r_main".to_owned()]
        );
        assert_eq!(
            gateway.list_entities(EntityKind::Vehicle).unwrap(),
            vec!["veh_a".to_owned()]
        );
        assert_eq!(
            gateway.list_entities(EntityKind::Signal).unwrap(),
            vec!["tl1".to_owned()]
        );
        assert!(gateway.list_entities(EntityKind::Segment).unwrap().is_empty());
    }

    #[test]
    fn get_field_rejects_unknown_ids() {
        let mut gateway = ScriptedGateway::new(0.1);
        let err = gateway
            .get_field(EntityKind::Vehicle, "ghost", Field::Speed)
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { .. }));
    }

    #[test]
    fn add_entity_then_set_field_lands_in_journal() {
        let mut gateway = ScriptedGateway::new(0.1).with_route("r_main");
        let spec = EntitySpec {
            id: "manual_0".to_owned(),
            route_id: "r_main".to_owned(),
            type_id: "car".to_owned(),
        };

        gateway.add_entity(&spec).unwrap();
        gateway
            .set_field(
                EntityKind::Vehicle,
                "manual_0",
                Field::Color,
                FieldValue::Color(Rgb::new(0, 0, 255)),
            )
            .unwrap();

        assert_eq!(gateway.vehicle("manual_0").unwrap().color, Rgb::new(0, 0, 255));
        assert_eq!(
            gateway.calls(),
            &[
                GatewayCall::Add { spec: spec.clone() },
                GatewayCall::Set {
                    kind: EntityKind::Vehicle,
                    id: "manual_0".to_owned(),
                    field: Field::Color,
                    value: FieldValue::Color(Rgb::new(0, 0, 255)),
                },
            ]
        );
    }

    #[test]
    fn add_entity_rejects_unknown_route_and_duplicate_id() {
        let mut gateway = ScriptedGateway::new(0.1).with_route("r_main");
        let spec = EntitySpec {
            id: "manual_0".to_owned(),
            route_id: "nowhere".to_owned(),
            type_id: "car".to_owned(),
        };
        assert!(gateway.add_entity(&spec).is_err());

        let good = EntitySpec {
            route_id: "r_main".to_owned(),
            ..spec
        };
        gateway.add_entity(&good).unwrap();
        assert!(gateway.add_entity(&good).is_err());
    }

    #[test]
    fn stepping_advances_clock_and_consumes_arrivals() {
        let mut gateway = ScriptedGateway::new(0.5).with_arrivals(vec![2, 0, 1]);

        gateway.step().unwrap();
        assert!((gateway.current_time().unwrap() - 0.5).abs() < 1e-9);
        assert_eq!(gateway.arrived_last_step().unwrap(), 2);

        gateway.step().unwrap();
        gateway.step().unwrap();
        assert_eq!(gateway.arrived_last_step().unwrap(), 1);

        // Schedule exhausted, later steps report no arrivals.
        gateway.step().unwrap();
        assert_eq!(gateway.arrived_last_step().unwrap(), 0);
    }

    #[test]
    fn step_failure_kicks_in_after_configured_count() {
        let mut gateway = ScriptedGateway::new(0.1).with_step_failure_after(2);
        gateway.step().unwrap();
        gateway.step().unwrap();
        assert!(matches!(
            gateway.step().unwrap_err(),
            GatewayError::Protocol { .. }
        ));
    }

    #[test]
    fn occupancy_read_fails_when_scripted_unavailable() {
        let mut gateway = ScriptedGateway::new(0.1)
            .with_segment("e_ok", 3, 10.0, Some(12.5))
            .with_segment("e_bad", 1, 5.0, None);

        let ok = gateway
            .get_field(EntityKind::Segment, "e_ok", Field::Occupancy)
            .unwrap();
        assert_eq!(ok.as_float(), Some(12.5));
        assert!(gateway
            .get_field(EntityKind::Segment, "e_bad", Field::Occupancy)
            .is_err());
    }

    #[test]
    fn field_value_decoders_are_type_checked() {
        assert_eq!(FieldValue::Float(3.5).as_float(), Some(3.5));
        assert_eq!(FieldValue::Int(7).as_int(), Some(7));
        assert_eq!(FieldValue::Float(3.5).as_int(), None);
        assert_eq!(
            FieldValue::Text("abc".to_owned()).as_text(),
            Some("abc")
        );
        assert_eq!(
            FieldValue::Color(Rgb::new(1, 2, 3)).as_color(),
            Some(Rgb::new(1, 2, 3))
        );
        assert!(FieldValue::Ids(vec![]).as_shape().is_none());
    }
}
